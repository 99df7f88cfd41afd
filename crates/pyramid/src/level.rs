//! Resolution levels of a tile pyramid

use std::sync::Arc;
use std::time::Duration;

use crate::{PyramidError, Sector};

/// One resolution level.
///
/// `tile_delta` is the geographic extent of a single tile at this level, in
/// degrees (latitude, longitude). Each successive level halves it, so level
/// `n + 1` carries four times the tiles of level `n`.
#[derive(Debug, Clone)]
pub struct Level {
    /// Zero-based level index; 0 is the coarsest
    pub number: usize,
    /// Per-tile extent in degrees, (latitude, longitude)
    pub tile_delta: (f64, f64),
    /// Tile texture width in pixels
    pub tile_width: u32,
    /// Tile texture height in pixels
    pub tile_height: u32,
    /// Cache namespace shared by every tile of this pyramid
    pub cache_namespace: Arc<str>,
    /// How long this level's imagery stays fresh once uploaded
    pub expiry: Duration,
    /// Marks a level known to have no imagery, so assembly skips requests
    pub empty: bool,
}

impl Level {
    /// Number of tile rows needed to span `sector` at this level
    pub fn rows_for(&self, sector: &Sector) -> usize {
        (sector.delta_latitude() / self.tile_delta.0).ceil() as usize
    }

    /// Number of tile columns needed to span `sector` at this level
    pub fn columns_for(&self, sector: &Sector) -> usize {
        (sector.delta_longitude() / self.tile_delta.1).ceil() as usize
    }
}

/// The full stack of levels for one tile pyramid.
///
/// Immutable once built, apart from per-level expiry overrides applied
/// before use.
///
/// # Example
///
/// ```
/// use globestream_pyramid::{LevelSet, Sector};
///
/// let levels = LevelSet::new(Sector::FULL_SPHERE, (90.0, 90.0), 5, 256, 256, "blue-marble")
///     .unwrap();
/// assert_eq!(levels.num_levels(), 5);
/// assert_eq!(levels.first_level().tile_delta, (90.0, 90.0));
/// assert_eq!(levels.last_level().tile_delta, (5.625, 5.625));
/// ```
#[derive(Debug, Clone)]
pub struct LevelSet {
    sector: Sector,
    levels: Vec<Level>,
}

impl LevelSet {
    pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(60 * 60);

    /// Build a pyramid over `sector`, starting from `level_zero_delta`
    /// degrees per tile and halving through `num_levels` levels.
    pub fn new(
        sector: Sector,
        level_zero_delta: (f64, f64),
        num_levels: usize,
        tile_width: u32,
        tile_height: u32,
        namespace: &str,
    ) -> Result<Self, PyramidError> {
        if num_levels == 0 {
            return Err(PyramidError::NoLevels);
        }
        if level_zero_delta.0 <= 0.0 || level_zero_delta.1 <= 0.0 {
            return Err(PyramidError::InvalidTileDelta(
                level_zero_delta.0,
                level_zero_delta.1,
            ));
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(PyramidError::InvalidTileDimensions(tile_width, tile_height));
        }
        if sector.is_empty() {
            return Err(PyramidError::EmptySector(sector));
        }
        if namespace.is_empty() {
            return Err(PyramidError::EmptyNamespace);
        }

        let namespace: Arc<str> = Arc::from(namespace);
        let levels = (0..num_levels)
            .map(|number| {
                let divisor = (1u64 << number) as f64;
                Level {
                    number,
                    tile_delta: (level_zero_delta.0 / divisor, level_zero_delta.1 / divisor),
                    tile_width,
                    tile_height,
                    cache_namespace: namespace.clone(),
                    expiry: Self::DEFAULT_EXPIRY,
                    empty: false,
                }
            })
            .collect();

        Ok(Self { sector, levels })
    }

    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Coarsest level
    pub fn first_level(&self) -> &Level {
        &self.levels[0]
    }

    /// Finest level
    pub fn last_level(&self) -> &Level {
        &self.levels[self.levels.len() - 1]
    }

    pub fn level(&self, number: usize) -> Option<&Level> {
        self.levels.get(number)
    }

    /// Whether `number` is the finest level, where subdivision stops
    pub fn is_final_level(&self, number: usize) -> bool {
        number + 1 == self.levels.len()
    }

    /// Override the expiry of one level
    pub fn set_level_expiry(&mut self, number: usize, expiry: Duration) -> Result<(), PyramidError> {
        match self.levels.get_mut(number) {
            Some(level) => {
                level.expiry = expiry;
                Ok(())
            }
            None => Err(PyramidError::NoSuchLevel(number)),
        }
    }

    /// Mark a level as having no imagery
    pub fn set_level_empty(&mut self, number: usize, empty: bool) -> Result<(), PyramidError> {
        match self.levels.get_mut(number) {
            Some(level) => {
                level.empty = empty;
                Ok(())
            }
            None => Err(PyramidError::NoSuchLevel(number)),
        }
    }
}
