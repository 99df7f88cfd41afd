//! GPU resource cache with deferred release
//!
//! Caches GPU-resident objects (textures, compiled programs, vertex buffers)
//! under a byte budget. Evicted and removed resources are never dropped
//! silently: they are queued for release and handed to the rendering thread,
//! which is the only execution context allowed to issue GPU deletion calls.

use std::any::Any;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::BoundedCache;

/// Resource class tag, part of every cache key.
///
/// Keys are category-tagged so unrelated resource classes never collide even
/// when their numeric ids do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Program,
    VertexBuffer,
}

/// Cache key for a GPU resource: a resource class plus an opaque 64-bit id
/// (tile keys hash to the id for textures).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GpuKey {
    pub kind: ResourceKind,
    pub id: u64,
}

impl GpuKey {
    pub fn texture(id: u64) -> Self {
        Self {
            kind: ResourceKind::Texture,
            id,
        }
    }

    pub fn program(id: u64) -> Self {
        Self {
            kind: ResourceKind::Program,
            id,
        }
    }

    pub fn vertex_buffer(id: u64) -> Self {
        Self {
            kind: ResourceKind::VertexBuffer,
            id,
        }
    }
}

/// A GPU-resident object held by the cache.
///
/// The handle is an opaque, platform-specific object (a GL texture name
/// wrapper, a compiled program, a buffer object) stored behind `dyn Any` so
/// the cache supports any backend.
#[derive(Clone)]
pub struct GpuResource {
    kind: ResourceKind,
    handle: Arc<dyn Any + Send + Sync>,
    size_bytes: usize,
    // (width, height) for textures, None for other resource classes
    dimensions: Option<(u32, u32)>,
}

impl GpuResource {
    /// Wrap an already type-erased handle
    pub fn new(kind: ResourceKind, handle: Arc<dyn Any + Send + Sync>, size_bytes: usize) -> Self {
        Self {
            kind,
            handle,
            size_bytes,
            dimensions: None,
        }
    }

    /// Wrap a texture handle, recording its pixel dimensions
    pub fn texture(
        handle: Arc<dyn Any + Send + Sync>,
        width: u32,
        height: u32,
        size_bytes: usize,
    ) -> Self {
        Self {
            kind: ResourceKind::Texture,
            handle,
            size_bytes,
            dimensions: Some((width, height)),
        }
    }

    /// Wrap a concrete handle value
    pub fn from_value<T: Send + Sync + 'static>(
        kind: ResourceKind,
        handle: T,
        size_bytes: usize,
    ) -> Self {
        Self::new(kind, Arc::new(handle), size_bytes)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Pixel dimensions, present for textures only
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    /// Downcast the handle to its concrete type.
    ///
    /// Returns `None` if the type doesn't match.
    pub fn handle<T: 'static>(&self) -> Option<&T> {
        self.handle.downcast_ref::<T>()
    }
}

/// A GPU release failure. Logged and treated as non-fatal: the entry is
/// removed from bookkeeping regardless, since retaining a reference to a
/// possibly-invalid handle is worse than leaking one GPU name.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("invalid GPU handle: {0}")]
    InvalidHandle(String),
    #[error("release failed: {0}")]
    Failed(String),
}

/// The single owner of GPU deletion calls.
///
/// Implemented by whatever owns the active graphics context. The rendering
/// thread drains the cache's pending releases through this trait at a defined
/// point each frame; no other code path deletes GPU objects.
pub trait GpuReleaser {
    fn release(&mut self, resource: &GpuResource) -> Result<(), ReleaseError>;
}

/// Byte-budget cache of GPU-resident objects.
///
/// Wraps a [`BoundedCache`] keyed by [`GpuKey`] with typed accessors per
/// resource class. Any operation may evict (a `put` from a loader thread
/// included), but eviction only queues the displaced resource; the actual GPU
/// deletion happens when the rendering thread calls
/// [`drain_releases`](Self::drain_releases).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use globestream_cache::{BoundedCache, GpuResourceCache, GpuReleaser, GpuResource, ReleaseError};
///
/// struct NoopReleaser;
/// impl GpuReleaser for NoopReleaser {
///     fn release(&mut self, _resource: &GpuResource) -> Result<(), ReleaseError> {
///         Ok(())
///     }
/// }
///
/// let cache = GpuResourceCache::new(Arc::new(BoundedCache::new(1024, 768).unwrap()));
/// cache.put_texture(42, Arc::new(7u32), 256, 256, 512);
/// assert!(cache.contains_texture(42));
///
/// // End of frame: the render thread disposes anything evicted
/// let released = cache.drain_releases(&mut NoopReleaser);
/// assert_eq!(released, 0);
/// ```
pub struct GpuResourceCache {
    cache: Arc<BoundedCache<GpuKey, GpuResource>>,
    pending_release: Mutex<Vec<GpuResource>>,
}

impl GpuResourceCache {
    /// Wrap a bounded cache (typically obtained from the registry under the
    /// `"GPU Resources"` name)
    pub fn new(cache: Arc<BoundedCache<GpuKey, GpuResource>>) -> Self {
        Self {
            cache,
            pending_release: Mutex::new(Vec::new()),
        }
    }

    fn queue_releases(&self, displaced: Vec<(GpuKey, GpuResource)>) {
        if displaced.is_empty() {
            return;
        }
        let mut pending = self.pending_release.lock().unwrap();
        pending.extend(displaced.into_iter().map(|(_, resource)| resource));
    }

    /// Insert a texture, evicting older resources if over budget
    pub fn put_texture(
        &self,
        id: u64,
        handle: Arc<dyn Any + Send + Sync>,
        width: u32,
        height: u32,
        size_bytes: usize,
    ) {
        self.put(
            GpuKey::texture(id),
            GpuResource::texture(handle, width, height, size_bytes),
        );
    }

    /// Insert a compiled program
    pub fn put_program(&self, id: u64, handle: Arc<dyn Any + Send + Sync>, size_bytes: usize) {
        self.put(
            GpuKey::program(id),
            GpuResource::new(ResourceKind::Program, handle, size_bytes),
        );
    }

    /// Insert a vertex buffer
    pub fn put_vertex_buffer(&self, id: u64, handle: Arc<dyn Any + Send + Sync>, size_bytes: usize) {
        self.put(
            GpuKey::vertex_buffer(id),
            GpuResource::new(ResourceKind::VertexBuffer, handle, size_bytes),
        );
    }

    fn put(&self, key: GpuKey, resource: GpuResource) {
        let size = resource.size_bytes();
        let displaced = self.cache.put(key, resource, size);
        self.queue_releases(displaced);
    }

    /// Fetch a resident texture, touching it in the LRU order
    pub fn texture(&self, id: u64) -> Option<GpuResource> {
        self.cache.get(&GpuKey::texture(id))
    }

    /// Fetch a resident program
    pub fn program(&self, id: u64) -> Option<GpuResource> {
        self.cache.get(&GpuKey::program(id))
    }

    /// Fetch a resident vertex buffer
    pub fn vertex_buffer(&self, id: u64) -> Option<GpuResource> {
        self.cache.get(&GpuKey::vertex_buffer(id))
    }

    /// Non-touching residency check for a texture
    pub fn contains_texture(&self, id: u64) -> bool {
        self.cache.contains(&GpuKey::texture(id))
    }

    /// Remove one resource, queueing it for release
    pub fn remove(&self, key: &GpuKey) {
        if let Some(resource) = self.cache.remove(key) {
            self.queue_releases(vec![(key.clone(), resource)]);
        }
    }

    /// Remove everything, queueing each resource for release
    pub fn clear(&self) {
        let removed = self.cache.clear();
        self.queue_releases(removed);
    }

    /// Pin a texture for the current frame so eviction cannot take it out
    /// from under an active draw
    pub fn pin_texture(&self, id: u64) {
        self.cache.pin(&GpuKey::texture(id));
    }

    /// Clear all pins; called at the start of each frame
    pub fn unpin_all(&self) {
        self.cache.unpin_all();
    }

    /// Dispose every queued resource through the releaser.
    ///
    /// Must be called from the thread that owns the graphics context. A
    /// failed release is logged and skipped; the resource stays removed from
    /// bookkeeping either way. Returns the number of resources drained.
    pub fn drain_releases(&self, releaser: &mut dyn GpuReleaser) -> usize {
        let queued: Vec<GpuResource> = {
            let mut pending = self.pending_release.lock().unwrap();
            pending.drain(..).collect()
        };

        let count = queued.len();
        for resource in &queued {
            if let Err(err) = releaser.release(resource) {
                log::warn!("GPU release failed for {:?}: {err}", resource.kind());
            }
        }
        count
    }

    /// Number of resources awaiting release
    pub fn pending_release_count(&self) -> usize {
        self.pending_release.lock().unwrap().len()
    }

    /// Current byte usage of the underlying cache
    pub fn used_bytes(&self) -> usize {
        self.cache.used_bytes()
    }

    /// Statistics of the underlying cache
    pub fn stats(&self) -> crate::CacheStats {
        self.cache.stats()
    }
}
