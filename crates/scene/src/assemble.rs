//! Quadtree tile assembly

use std::sync::{Arc, Weak};

use globestream_cache::BoundedCache;
use globestream_pyramid::{Level, LevelSet, Tile, TextureTile, TileSizeObserver};

/// View-dependent refinement policy.
///
/// Keeps eye position, frustum, and screen-resolution math out of the
/// engine: the selector answers per tile whether it is worth drawing at all,
/// whether a finer level is warranted, and how far it is from the eye.
pub trait DetailSelector {
    fn is_visible(&self, tile: &Tile) -> bool;
    fn needs_subdivision(&self, tile: &Tile) -> bool;
    fn distance_to_eye(&self, tile: &Tile) -> f64;
}

/// Walk the pyramid and pick the tiles to draw this frame.
///
/// Starts from the coarsest level's full tile grid and descends wherever the
/// selector wants more detail, stopping at the finest level and before any
/// level marked empty. Selected tiles are interned in `cache` by their
/// `cache_key`, so a tile that stays in view keeps its pending-upload state
/// across frames. Results come back nearest first, which is also the request
/// priority for anything that turns out to need loading.
pub(crate) fn assemble(
    cache: &Arc<BoundedCache<u64, Arc<TextureTile>>>,
    level_set: &LevelSet,
    detail: &dyn DetailSelector,
) -> Vec<Arc<TextureTile>> {
    let mut selected = Vec::new();
    for top in Tile::tiles_for_level(level_set, level_set.first_level()) {
        if detail.is_visible(&top) {
            add_tile_or_descendants(cache, level_set, top, detail, &mut selected);
        }
    }

    selected.sort_by(|a, b| {
        detail
            .distance_to_eye(a.tile())
            .total_cmp(&detail.distance_to_eye(b.tile()))
    });
    selected
}

fn add_tile_or_descendants(
    cache: &Arc<BoundedCache<u64, Arc<TextureTile>>>,
    level_set: &LevelSet,
    tile: Tile,
    detail: &dyn DetailSelector,
    selected: &mut Vec<Arc<TextureTile>>,
) {
    let level_number = tile.level_number();
    let next_level = if level_set.is_final_level(level_number) {
        None
    } else {
        level_set.level(level_number + 1).filter(|next| !next.empty)
    };

    match next_level {
        Some(next) if detail.needs_subdivision(&tile) => {
            for child in tile.subdivide(next) {
                if detail.is_visible(&child) {
                    add_tile_or_descendants(cache, level_set, child, detail, selected);
                }
            }
        }
        _ => {
            let level = level_set
                .level(level_number)
                .unwrap_or_else(|| level_set.last_level());
            selected.push(intern(cache, tile, level));
        }
    }
}

/// Re-accounts a tile's cache entry as decoded pixel data comes and goes,
/// so loader deposits count against the tile-cache byte budget
struct TileCacheAccounting {
    cache: Weak<BoundedCache<u64, Arc<TextureTile>>>,
}

impl TileSizeObserver for TileCacheAccounting {
    fn tile_resized(&self, cache_key: u64, size_bytes: usize) {
        if let Some(cache) = self.cache.upgrade() {
            // Displaced tiles hold host memory only; dropping them is the
            // release
            let _ = cache.update_size(&cache_key, size_bytes);
        }
    }
}

/// Fetch the tile's shared state from the cache, creating it on first sight
fn intern(
    cache: &Arc<BoundedCache<u64, Arc<TextureTile>>>,
    tile: Tile,
    level: &Level,
) -> Arc<TextureTile> {
    let key = tile.key().cache_key();
    if let Some(existing) = cache.get(&key) {
        return existing;
    }
    let expiry_millis = level.expiry.as_millis() as u64;
    let texture_tile = Arc::new(TextureTile::new(tile, expiry_millis).with_size_observer(
        Arc::new(TileCacheAccounting {
            cache: Arc::downgrade(cache),
        }),
    ));
    let _ = cache.put(key, texture_tile.clone(), texture_tile.size_in_bytes());
    texture_tile
}

#[cfg(test)]
mod tests {
    use super::*;
    use globestream_pyramid::Sector;

    struct DescendInto {
        target: Sector,
        max_level: usize,
    }

    impl DetailSelector for DescendInto {
        fn is_visible(&self, tile: &Tile) -> bool {
            tile.sector().intersects(&self.target)
        }

        fn needs_subdivision(&self, tile: &Tile) -> bool {
            tile.level_number() < self.max_level
        }

        fn distance_to_eye(&self, tile: &Tile) -> f64 {
            let (lat, lon) = tile.sector().centroid();
            let (tlat, tlon) = self.target.centroid();
            ((lat - tlat).powi(2) + (lon - tlon).powi(2)).sqrt()
        }
    }

    fn levels() -> LevelSet {
        LevelSet::new(Sector::FULL_SPHERE, (90.0, 90.0), 3, 256, 256, "t").unwrap()
    }

    fn tile_cache() -> Arc<BoundedCache<u64, Arc<TextureTile>>> {
        Arc::new(BoundedCache::new(1 << 20, 1 << 19).unwrap())
    }

    #[test]
    fn test_no_subdivision_yields_top_level() {
        let cache = tile_cache();
        let detail = DescendInto {
            target: Sector::FULL_SPHERE,
            max_level: 0,
        };
        let tiles = assemble(&cache, &levels(), &detail);

        assert_eq!(tiles.len(), 8); // 2 x 4 grid at 90 degrees
        assert!(tiles.iter().all(|t| t.tile().level_number() == 0));
    }

    #[test]
    fn test_descends_only_where_visible() {
        let cache = tile_cache();
        // A point target: only the tiles containing it subdivide
        let detail = DescendInto {
            target: Sector::new(10.0, 10.0001, 10.0, 10.0001),
            max_level: 2,
        };
        let tiles = assemble(&cache, &levels(), &detail);

        // One visible chain all the way down to level 2
        assert!(tiles.iter().all(|t| t.tile().level_number() == 2));
        assert_eq!(tiles.len(), 1);
        assert!(tiles[0].tile().sector().contains(10.0, 10.0));
    }

    #[test]
    fn test_subdivision_stops_at_final_level() {
        let cache = tile_cache();
        let detail = DescendInto {
            target: Sector::new(10.0, 10.0001, 10.0, 10.0001),
            max_level: 99,
        };
        let tiles = assemble(&cache, &levels(), &detail);
        assert!(tiles.iter().all(|t| t.tile().level_number() == 2));
    }

    #[test]
    fn test_empty_level_is_not_entered() {
        let cache = tile_cache();
        let mut level_set = levels();
        level_set.set_level_empty(2, true).unwrap();

        let detail = DescendInto {
            target: Sector::new(10.0, 10.0001, 10.0, 10.0001),
            max_level: 99,
        };
        let tiles = assemble(&cache, &level_set, &detail);
        assert!(tiles.iter().all(|t| t.tile().level_number() == 1));
    }

    #[test]
    fn test_tiles_are_interned_across_frames() {
        let cache = tile_cache();
        let level_set = levels();
        let detail = DescendInto {
            target: Sector::new(10.0, 10.0001, 10.0, 10.0001),
            max_level: 2,
        };

        let first = assemble(&cache, &level_set, &detail);
        first[0].set_pixel_data(globestream_pyramid::PixelData::Rgba {
            width: 1,
            height: 1,
            bytes: vec![0; 4],
        });

        // Same frame inputs return the same shared tile, data intact
        let second = assemble(&cache, &level_set, &detail);
        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert!(second[0].has_pixel_data());
    }

    #[test]
    fn test_pending_pixel_data_counts_against_budget() {
        // A budget that fits the bare tile structs but not a decoded image
        let cache: Arc<BoundedCache<u64, Arc<TextureTile>>> =
            Arc::new(BoundedCache::new(4000, 3200).unwrap());
        let level_set = levels();
        let detail = DescendInto {
            target: Sector::FULL_SPHERE,
            max_level: 0,
        };

        let tiles = assemble(&cache, &level_set, &detail);
        assert_eq!(tiles.len(), 8);
        assert_eq!(cache.entry_count(), 8);
        let base_used = cache.used_bytes();

        let pixels = 4096usize;
        for tile in &tiles {
            tile.set_pixel_data(globestream_pyramid::PixelData::Rgba {
                width: 32,
                height: 32,
                bytes: vec![0; pixels],
            });
        }

        // Deposits are accounted the moment they land: the first one blew
        // the budget and evicted the other tiles instead of letting eight
        // decoded images sit invisible to the cache.
        assert!(cache.used_bytes() > base_used);
        assert_eq!(cache.entry_count(), 1);
        assert!(cache.contains(&tiles[0].tile().key().cache_key()));
        assert_eq!(
            cache.used_bytes(),
            std::mem::size_of::<TextureTile>() + pixels
        );
    }

    #[test]
    fn test_results_sorted_nearest_first() {
        let cache = tile_cache();
        let detail = DescendInto {
            target: Sector::new(40.0, 50.0, 40.0, 50.0),
            max_level: 0,
        };
        let tiles = assemble(&cache, &levels(), &detail);

        let distances: Vec<f64> = tiles
            .iter()
            .map(|t| detail.distance_to_eye(t.tile()))
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }
}
