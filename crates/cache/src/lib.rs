//! Byte-budget caching for tile streaming
//!
//! Everything that holds memory on behalf of the globe — decoded tile
//! imagery, GPU textures, compiled programs — goes through a
//! [`BoundedCache`]: an LRU cache measured in bytes rather than entry count.
//! A [`CacheRegistry`] owns the named caches for one rendering engine, and
//! [`GpuResourceCache`] layers deferred release on top so GPU objects are
//! only ever deleted from the rendering thread.
//!
//! Capacities come from a [`CacheConfig`], loadable from a file or from
//! environment variables.

pub mod bounded;
pub mod config;
pub mod gpu;
pub mod registry;

pub use bounded::{BoundedCache, CacheStats};
pub use config::{CacheConfig, ConfigError, GPU_RESOURCE_CACHE, TEXTURE_TILE_CACHE};
pub use gpu::{GpuKey, GpuReleaser, GpuResource, GpuResourceCache, ReleaseError, ResourceKind};
pub use registry::CacheRegistry;

use thiserror::Error;

/// Errors from cache construction and registry lookups.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache capacity must be greater than zero")]
    ZeroCapacity,

    #[error("low-water mark {low_water} exceeds capacity {capacity}")]
    LowWaterAboveCapacity { low_water: usize, capacity: usize },

    #[error("cache `{0}` already exists with a different entry type")]
    WrongType(String),
}
