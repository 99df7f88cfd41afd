//! Tile addressing and quadtree subdivision

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::{Level, LevelSet, Sector};

/// Globally unique tile address: pyramid namespace, level, row, column.
///
/// Rows count northward from the pyramid sector's minimum latitude, columns
/// eastward from its minimum longitude. The same key addresses the tile in
/// every cache in the engine via [`cache_key`](Self::cache_key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub level: usize,
    pub row: usize,
    pub column: usize,
    pub namespace: Arc<str>,
}

impl TileKey {
    pub fn new(level: usize, row: usize, column: usize, namespace: Arc<str>) -> Self {
        Self {
            level,
            row,
            column,
            namespace,
        }
    }

    /// Stable 64-bit digest used as the cache key everywhere
    pub fn cache_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.namespace.hash(&mut hasher);
        self.level.hash(&mut hasher);
        self.row.hash(&mut hasher);
        self.column.hash(&mut hasher);
        hasher.finish()
    }

    /// The enclosing tile one level up, or `None` at level zero
    pub fn parent(&self) -> Option<TileKey> {
        self.ancestor(1)
    }

    /// The enclosing tile `generations` levels up
    pub fn ancestor(&self, generations: usize) -> Option<TileKey> {
        if generations == 0 || generations > self.level {
            return None;
        }
        Some(TileKey {
            level: self.level - generations,
            row: self.row >> generations,
            column: self.column >> generations,
            namespace: self.namespace.clone(),
        })
    }
}

/// One cell of the pyramid: an immutable sector/address pair.
///
/// Tiles carry no imagery and no child links; descent happens by
/// [`subdivide`](Self::subdivide) and ancestry by key arithmetic, so a tile
/// can be dropped and rebuilt at any time without invalidating others.
#[derive(Debug, Clone)]
pub struct Tile {
    sector: Sector,
    key: TileKey,
}

impl Tile {
    pub fn new(sector: Sector, level: &Level, row: usize, column: usize) -> Self {
        Self {
            sector,
            key: TileKey::new(level.number, row, column, level.cache_namespace.clone()),
        }
    }

    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn level_number(&self) -> usize {
        self.key.level
    }

    pub fn row(&self) -> usize {
        self.key.row
    }

    pub fn column(&self) -> usize {
        self.key.column
    }

    /// Row index of the tile containing `latitude`
    pub fn row_for_latitude(latitude: f64, min_latitude: f64, delta_latitude: f64) -> usize {
        ((latitude - min_latitude) / delta_latitude).floor().max(0.0) as usize
    }

    /// Column index of the tile containing `longitude`
    pub fn column_for_longitude(longitude: f64, min_longitude: f64, delta_longitude: f64) -> usize {
        ((longitude - min_longitude) / delta_longitude).floor().max(0.0) as usize
    }

    /// Every tile of one level across the level set's sector, row-major from
    /// the southwest corner.
    pub fn tiles_for_level(level_set: &LevelSet, level: &Level) -> Vec<Tile> {
        let sector = level_set.sector();
        let rows = level.rows_for(sector);
        let columns = level.columns_for(sector);
        let (delta_lat, delta_lon) = level.tile_delta;

        let mut tiles = Vec::with_capacity(rows * columns);
        for row in 0..rows {
            let min_lat = sector.min_latitude + row as f64 * delta_lat;
            let max_lat = (min_lat + delta_lat).min(sector.max_latitude);
            for column in 0..columns {
                let min_lon = sector.min_longitude + column as f64 * delta_lon;
                let max_lon = (min_lon + delta_lon).min(sector.max_longitude);
                tiles.push(Tile::new(
                    Sector::new(min_lat, max_lat, min_lon, max_lon),
                    level,
                    row,
                    column,
                ));
            }
        }
        tiles
    }

    /// The four children of this tile at `next_level`: `[SW, SE, NW, NE]`.
    ///
    /// Child addresses double the parent's: `(2r, 2c)`, `(2r, 2c+1)`,
    /// `(2r+1, 2c)`, `(2r+1, 2c+1)`. Child sectors tile the parent exactly.
    pub fn subdivide(&self, next_level: &Level) -> [Tile; 4] {
        let [sw, se, nw, ne] = self.sector.subdivide();
        let (r, c) = (self.key.row, self.key.column);
        [
            Tile::new(sw, next_level, 2 * r, 2 * c),
            Tile::new(se, next_level, 2 * r, 2 * c + 1),
            Tile::new(nw, next_level, 2 * r + 1, 2 * c),
            Tile::new(ne, next_level, 2 * r + 1, 2 * c + 1),
        ]
    }
}
