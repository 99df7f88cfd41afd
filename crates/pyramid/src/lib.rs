//! Tile pyramid model for a virtual globe
//!
//! A globe's imagery is organized as a quadtree of geographic tiles: a
//! [`LevelSet`] describes the resolutions, a [`Tile`] is one cell of one
//! level, and a [`TextureTile`] carries that cell's imagery from loader
//! thread to GPU. Tiles are addressed by [`TileKey`], which doubles as the
//! cache key across every cache in the engine.
//!
//! Nothing here touches a GPU directly: uploads go through the
//! [`TextureUploader`] trait and resolved bindings come back as
//! [`TileBinding`] values for the renderer to act on.

pub mod level;
pub mod locator;
pub mod sector;
pub mod tile;
pub mod texture_tile;

pub use level::{Level, LevelSet};
pub use locator::TileLocator;
pub use sector::Sector;
pub use tile::{Tile, TileKey};
pub use texture_tile::{
    FallbackTransform, PixelData, TextureTile, TextureUploader, TileBinding, TileSizeObserver,
    UploadError, UploadedTexture,
};

use thiserror::Error;

/// Errors from pyramid construction.
#[derive(Debug, Error)]
pub enum PyramidError {
    #[error("a level set requires at least one level")]
    NoLevels,

    #[error("level-zero tile delta must be positive, got ({0}, {1})")]
    InvalidTileDelta(f64, f64),

    #[error("tile dimensions must be positive, got {0}x{1}")]
    InvalidTileDimensions(u32, u32),

    #[error("sector has no area: {0:?}")]
    EmptySector(Sector),

    #[error("cache namespace must not be empty")]
    EmptyNamespace,

    #[error("no level {0} in this level set")]
    NoSuchLevel(usize),
}
