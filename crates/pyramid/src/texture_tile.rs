//! Texture-bearing tiles and the resident/fallback resolution walk

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use globestream_cache::GpuResourceCache;

use crate::Tile;

/// Decoded imagery awaiting upload.
///
/// Either a plain RGBA bitmap or a pre-compressed mip chain; either way the
/// byte size is known so caches can account for it before upload.
#[derive(Debug, Clone)]
pub enum PixelData {
    Rgba {
        width: u32,
        height: u32,
        bytes: Vec<u8>,
    },
    /// Compressed levels, finest first. `format` is a backend-defined code.
    CompressedMips {
        format: u32,
        width: u32,
        height: u32,
        levels: Vec<Vec<u8>>,
    },
}

impl PixelData {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            PixelData::Rgba { bytes, .. } => bytes.len(),
            PixelData::CompressedMips { levels, .. } => levels.iter().map(Vec::len).sum(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            PixelData::Rgba { width, height, .. } => (*width, *height),
            PixelData::CompressedMips { width, height, .. } => (*width, *height),
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no GPU context current on this thread")]
    NoContext,
    #[error("texture upload failed: {0}")]
    Failed(String),
}

/// A texture created by the backend: the opaque handle plus its GPU
/// footprint in bytes.
pub struct UploadedTexture {
    pub handle: Arc<dyn Any + Send + Sync>,
    pub size_bytes: usize,
}

/// Creates GPU textures from decoded pixel data.
///
/// Implemented by the rendering backend; called only from the thread that
/// owns the graphics context.
pub trait TextureUploader {
    fn upload(&mut self, data: &PixelData) -> Result<UploadedTexture, UploadError>;
}

/// Notified when a tile's cache-accountable byte size changes.
///
/// The texture-tile cache registers itself here so every deposit into (and
/// take out of) the pending slot re-accounts the tile's cache entry, keeping
/// decoded pixel bytes inside the cache budget rather than invisible to it.
pub trait TileSizeObserver: Send + Sync {
    fn tile_resized(&self, cache_key: u64, size_bytes: usize);
}

/// Texture-coordinate transform that maps a tile onto the sub-rectangle of
/// an ancestor's texture covering the same ground.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl FallbackTransform {
    /// Transform for a tile at `(row, column)` drawing with the texture of
    /// its ancestor `level_delta` levels up. Returns `None` when the delta
    /// is zero, where no transform applies.
    pub fn for_level_delta(level_delta: usize, row: usize, column: usize) -> Option<Self> {
        if level_delta == 0 {
            return None;
        }
        let two_n = (1u64 << level_delta) as f64;
        Some(Self {
            scale: 1.0 / two_n,
            offset_x: (column as u64 % (1u64 << level_delta)) as f64 / two_n,
            offset_y: (row as u64 % (1u64 << level_delta)) as f64 / two_n,
        })
    }

    /// Post-multiply a column-major 4x4 texture-coordinate matrix by
    /// translate(offset) * scale.
    pub fn apply_to(&self, matrix: &mut [f64; 16]) {
        let s = self.scale;
        let (tx, ty) = (self.offset_x, self.offset_y);
        for r in 0..4 {
            let c0 = matrix[r];
            let c1 = matrix[4 + r];
            let c3 = matrix[12 + r];
            matrix[r] = c0 * s;
            matrix[4 + r] = c1 * s;
            matrix[12 + r] = c0 * tx + c1 * ty + c3;
        }
    }
}

/// How a tile draws this frame.
#[derive(Debug, Clone, PartialEq)]
pub enum TileBinding {
    /// The tile's own texture is resident. `stale` means it is past expiry
    /// but still drawable while a refresh is in flight.
    Resident { id: u64, stale: bool },
    /// An ancestor's texture stands in, addressed through `transform`.
    Fallback { id: u64, transform: FallbackTransform },
    /// Nothing drawable anywhere up the ancestor chain.
    Unavailable,
}

/// A tile plus its imagery lifecycle.
///
/// The pending slot is the one cross-thread handoff point: a loader thread
/// deposits decoded pixel data, and the render thread takes it during
/// [`resolve`](Self::resolve) to upload. Everything else is immutable or
/// atomic, so `TextureTile` is shared as `Arc<TextureTile>` between the
/// assembly pass, the caches, and the loaders.
pub struct TextureTile {
    tile: Tile,
    expiry_millis: u64,
    pending: Mutex<Option<PixelData>>,
    last_update_millis: AtomicU64,
    size_observer: Option<Arc<dyn TileSizeObserver>>,
}

impl TextureTile {
    pub fn new(tile: Tile, expiry_millis: u64) -> Self {
        Self {
            tile,
            expiry_millis,
            pending: Mutex::new(None),
            last_update_millis: AtomicU64::new(0),
            size_observer: None,
        }
    }

    /// Attach an observer that tracks this tile's byte size as pixel data
    /// comes and goes
    pub fn with_size_observer(mut self, observer: Arc<dyn TileSizeObserver>) -> Self {
        self.size_observer = Some(observer);
        self
    }

    pub fn tile(&self) -> &Tile {
        &self.tile
    }

    /// Bytes this tile accounts for in the host-side tile cache: the fixed
    /// struct footprint plus whatever sits in the pending slot
    pub fn size_in_bytes(&self) -> usize {
        let pending = self
            .pending
            .lock()
            .unwrap()
            .as_ref()
            .map_or(0, PixelData::size_in_bytes);
        std::mem::size_of::<Self>() + pending
    }

    /// Deposit decoded imagery for the render thread to upload. Replaces any
    /// data already waiting.
    pub fn set_pixel_data(&self, data: PixelData) {
        let size = std::mem::size_of::<Self>() + data.size_in_bytes();
        *self.pending.lock().unwrap() = Some(data);
        self.notify_resized(size);
    }

    /// Take the waiting imagery, leaving the slot empty
    pub fn take_pixel_data(&self) -> Option<PixelData> {
        let data = self.pending.lock().unwrap().take();
        if data.is_some() {
            self.notify_resized(std::mem::size_of::<Self>());
        }
        data
    }

    fn notify_resized(&self, size_bytes: usize) {
        if let Some(observer) = &self.size_observer {
            observer.tile_resized(self.tile.key().cache_key(), size_bytes);
        }
    }

    pub fn has_pixel_data(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    /// Millisecond timestamp of the last successful upload, 0 if never
    pub fn last_update_millis(&self) -> u64 {
        self.last_update_millis.load(Ordering::Relaxed)
    }

    /// Whether the resident texture (if any) is past its level's expiry
    pub fn is_expired(&self, now_millis: u64) -> bool {
        let updated = self.last_update_millis();
        updated != 0 && now_millis.saturating_sub(updated) > self.expiry_millis
    }

    /// Resolve what this tile draws with this frame.
    ///
    /// Freshly delivered pixel data is uploaded first so a refreshed tile
    /// replaces its stale texture on the next draw; a failed upload is
    /// logged, the data goes back in the slot, and resolution continues with
    /// whatever else is available. Then the tile's own texture is preferred,
    /// and failing that the ancestor chain is walked coarsest-ward for the
    /// nearest resident texture to stand in. Whatever texture is chosen gets
    /// pinned for the remainder of the frame.
    ///
    /// Must be called from the thread owning the graphics context, since it
    /// may upload.
    pub fn resolve(
        &self,
        gpu: &GpuResourceCache,
        uploader: &mut dyn TextureUploader,
        now_millis: u64,
    ) -> TileBinding {
        let id = self.tile.key().cache_key();

        if let Some(data) = self.take_pixel_data() {
            match uploader.upload(&data) {
                Ok(uploaded) => {
                    let (width, height) = data.dimensions();
                    gpu.put_texture(id, uploaded.handle, width, height, uploaded.size_bytes);
                    self.last_update_millis.store(now_millis, Ordering::Relaxed);
                }
                Err(err) => {
                    log::warn!("upload failed for {:?}: {err}", self.tile.key());
                    self.set_pixel_data(data);
                }
            }
        }

        if gpu.contains_texture(id) {
            gpu.pin_texture(id);
            return TileBinding::Resident {
                id,
                stale: self.is_expired(now_millis),
            };
        }

        let mut ancestor = self.tile.key().parent();
        let mut delta = 1;
        while let Some(key) = ancestor {
            let ancestor_id = key.cache_key();
            if gpu.contains_texture(ancestor_id) {
                if let Some(transform) =
                    FallbackTransform::for_level_delta(delta, self.tile.row(), self.tile.column())
                {
                    gpu.pin_texture(ancestor_id);
                    return TileBinding::Fallback {
                        id: ancestor_id,
                        transform,
                    };
                }
            }
            ancestor = key.parent();
            delta += 1;
        }

        TileBinding::Unavailable
    }
}
