//! Frame orchestration for the tile-streaming engine
//!
//! [`FrameContext`] ties the pieces together for one rendering engine: the
//! texture-tile and GPU caches out of a [`CacheRegistry`], the depth-ordered
//! drawable queue, and the pick coordinator. A frame runs as
//! `begin_frame` -> `assemble_tiles` -> `draw_tiles` / `add_shape` ->
//! replay (or pick) -> `end_frame`, with `end_frame` as the single point
//! where deferred GPU deletions happen.

pub mod assemble;

pub use assemble::DetailSelector;

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use globestream_cache::{
    BoundedCache, CacheError, CacheRegistry, GpuKey, GpuReleaser, GpuResource, GpuResourceCache,
    GPU_RESOURCE_CACHE, TEXTURE_TILE_CACHE,
};
use globestream_frame::{next_batch, FrameQueue, PickBatchable, PickCoordinator, PickReadback, PickedObject};
use globestream_pyramid::{
    LevelSet, TextureTile, TextureUploader, TileBinding, TileKey, TileLocator,
};

#[derive(Debug, Error)]
pub enum SceneError {
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Raw imagery bytes to decoded pixels.
///
/// Implemented by the format layer (PNG, JPEG, compressed-texture archives);
/// called on loader threads.
pub trait TileDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<globestream_pyramid::PixelData, DecodeError>;
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized image format")]
    UnknownFormat,
    #[error("decode failed: {0}")]
    Malformed(String),
}

/// One entry in the frame's drawable queue.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneDrawable {
    /// A terrain-clamped surface tile and how it draws this frame
    SurfaceTile {
        key: TileKey,
        binding: TileBinding,
        layer: u64,
    },
    /// An ordered shape owned by a layer. `batchable` shapes share a pick
    /// color with same-layer neighbors.
    Shape {
        object_id: u64,
        layer: u64,
        batchable: bool,
    },
}

impl SceneDrawable {
    pub fn layer(&self) -> u64 {
        match self {
            SceneDrawable::SurfaceTile { layer, .. } => *layer,
            SceneDrawable::Shape { layer, .. } => *layer,
        }
    }

    pub fn object_id(&self) -> u64 {
        match self {
            SceneDrawable::SurfaceTile { key, .. } => key.cache_key(),
            SceneDrawable::Shape { object_id, .. } => *object_id,
        }
    }

    pub fn is_terrain(&self) -> bool {
        matches!(self, SceneDrawable::SurfaceTile { .. })
    }
}

impl PickBatchable for SceneDrawable {
    fn batch_group(&self) -> Option<u64> {
        match self {
            SceneDrawable::SurfaceTile { layer, .. } => Some(*layer),
            SceneDrawable::Shape {
                layer,
                batchable: true,
                ..
            } => Some(*layer),
            SceneDrawable::Shape {
                batchable: false, ..
            } => None,
        }
    }
}

/// Everything one engine needs across a frame.
///
/// Not `Sync`: one `FrameContext` belongs to the rendering thread. Loader
/// threads interact only through the `Arc<TextureTile>` handles and the
/// shared caches.
pub struct FrameContext {
    registry: CacheRegistry,
    tile_cache: Arc<BoundedCache<u64, Arc<TextureTile>>>,
    gpu: GpuResourceCache,
    queue: FrameQueue<SceneDrawable>,
    pick: PickCoordinator,
    frame_millis: u64,
    picking: bool,
    requested: Vec<(TileKey, String)>,
    requested_keys: HashSet<u64>,
}

impl FrameContext {
    pub fn new(registry: CacheRegistry) -> Result<Self, SceneError> {
        let tile_cache = registry.cache::<u64, Arc<TextureTile>>(TEXTURE_TILE_CACHE)?;
        let gpu_cache = registry.cache::<GpuKey, GpuResource>(GPU_RESOURCE_CACHE)?;
        Ok(Self {
            registry,
            tile_cache,
            gpu: GpuResourceCache::new(gpu_cache),
            queue: FrameQueue::new(),
            pick: PickCoordinator::new(),
            frame_millis: 0,
            picking: false,
            requested: Vec::new(),
            requested_keys: HashSet::new(),
        })
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn gpu(&self) -> &GpuResourceCache {
        &self.gpu
    }

    pub fn frame_millis(&self) -> u64 {
        self.frame_millis
    }

    pub fn is_picking(&self) -> bool {
        self.picking
    }

    /// Start a frame: empty the queue, release last frame's pins, reset the
    /// pick table, and forget last frame's tile requests.
    pub fn begin_frame(&mut self, now_millis: u64, picking: bool, clear_color: u32) {
        self.frame_millis = now_millis;
        self.picking = picking;
        self.queue.clear();
        self.gpu.unpin_all();
        self.pick.begin_frame(clear_color);
        self.requested.clear();
        self.requested_keys.clear();
    }

    /// Finish a frame by disposing every GPU resource evicted since the last
    /// drain. This is the only place GPU deletions happen, so it must run on
    /// the thread owning the graphics context. Returns the number released.
    pub fn end_frame(&mut self, releaser: &mut dyn GpuReleaser) -> usize {
        self.gpu.drain_releases(releaser)
    }

    /// Pick this frame's tiles from the pyramid, nearest first
    pub fn assemble_tiles(
        &self,
        level_set: &LevelSet,
        detail: &dyn DetailSelector,
    ) -> Vec<Arc<TextureTile>> {
        assemble::assemble(&self.tile_cache, level_set, detail)
    }

    /// Resolve and queue each assembled tile.
    ///
    /// Tiles that resolve resident or to an ancestor fallback are queued
    /// behind all ordered shapes. Tiles drawing a fallback, drawing stale
    /// imagery, or drawing nothing are recorded as needing a load via the
    /// locator; tiles the locator has no source for are skipped. Uploads
    /// happen inside, so this runs on the rendering thread.
    pub fn draw_tiles(
        &mut self,
        tiles: &[Arc<TextureTile>],
        uploader: &mut dyn TextureUploader,
        locator: &dyn TileLocator,
        layer: u64,
    ) {
        for texture_tile in tiles {
            let binding = texture_tile.resolve(&self.gpu, uploader, self.frame_millis);
            let key = texture_tile.tile().key().clone();

            match &binding {
                TileBinding::Resident { stale, .. } => {
                    if *stale {
                        self.request_tile(&key, locator);
                    }
                }
                TileBinding::Fallback { .. } | TileBinding::Unavailable => {
                    self.request_tile(&key, locator);
                }
            }

            if binding != TileBinding::Unavailable {
                self.queue.add_to_back(SceneDrawable::SurfaceTile {
                    key,
                    binding,
                    layer,
                });
            }
        }
    }

    fn request_tile(&mut self, key: &TileKey, locator: &dyn TileLocator) {
        if !self.requested_keys.insert(key.cache_key()) {
            return;
        }
        match locator.locate(key) {
            Some(source) => self.requested.push((key.clone(), source)),
            None => log::debug!("no source for tile {key:?}"),
        }
    }

    /// Tiles that need loading this frame, in the order they were found
    /// (nearest first when tiles came from `assemble_tiles`)
    pub fn requested_tiles(&self) -> &[(TileKey, String)] {
        &self.requested
    }

    /// Queue an ordered shape at its eye distance
    pub fn add_shape(&mut self, object_id: u64, layer: u64, batchable: bool, distance: f64) {
        self.queue.add(
            SceneDrawable::Shape {
                object_id,
                layer,
                batchable,
            },
            distance,
        );
    }

    pub fn queued_drawables(&self) -> usize {
        self.queue.len()
    }

    /// Next drawable in replay order, for a normal render pass
    pub fn next_drawable(&mut self) -> Option<SceneDrawable> {
        self.queue.poll()
    }

    /// Next batch for a pick pass, already assigned a color and registered.
    ///
    /// A grouped batch registers under its layer id; a lone ungrouped
    /// drawable registers under its own object id.
    pub fn next_pick_batch(&mut self) -> Option<(u32, Vec<SceneDrawable>)> {
        let batch = next_batch(&mut self.queue)?;
        let color = self.pick.next_color();
        let is_terrain = batch.iter().all(SceneDrawable::is_terrain);
        let object_id = match batch[0].batch_group() {
            Some(group) => group,
            None => batch[0].object_id(),
        };
        self.pick.register(color, object_id, is_terrain);
        Some((color, batch))
    }

    /// Resolve a pick readback at (x, y) against this frame's registrations
    pub fn resolve_pick(
        &self,
        readback: &dyn PickReadback,
        x: u32,
        y: u32,
    ) -> Option<PickedObject> {
        self.pick.resolve(readback, x, y)
    }
}
