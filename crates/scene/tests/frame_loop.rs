//! End-to-end frame loop: assemble, load, upload, draw, evict, release.

use std::sync::Arc;

use globestream_cache::{
    CacheConfig, CacheRegistry, GpuReleaser, GpuResource, ReleaseError,
};
use globestream_frame::PickReadback;
use globestream_pyramid::{
    LevelSet, PixelData, Sector, TextureUploader, Tile, TileBinding, TileKey, TileLocator,
    UploadError, UploadedTexture,
};
use globestream_scene::{DecodeError, DetailSelector, FrameContext, SceneDrawable, TileDecoder};

struct CountingUploader {
    uploads: usize,
}

impl TextureUploader for CountingUploader {
    fn upload(&mut self, data: &PixelData) -> Result<UploadedTexture, UploadError> {
        self.uploads += 1;
        Ok(UploadedTexture {
            handle: Arc::new(self.uploads as u32),
            size_bytes: data.size_in_bytes(),
        })
    }
}

struct CountingReleaser {
    released: usize,
}

impl GpuReleaser for CountingReleaser {
    fn release(&mut self, _resource: &GpuResource) -> Result<(), ReleaseError> {
        self.released += 1;
        Ok(())
    }
}

struct UrlLocator;

impl TileLocator for UrlLocator {
    fn locate(&self, key: &TileKey) -> Option<String> {
        Some(format!(
            "https://tiles.example/{}/{}/{}/{}",
            key.namespace, key.level, key.row, key.column
        ))
    }
}

/// Subdivides down to `target_level` everywhere, eye at the origin
struct FixedDetail {
    target_level: usize,
}

impl DetailSelector for FixedDetail {
    fn is_visible(&self, _tile: &Tile) -> bool {
        true
    }

    fn needs_subdivision(&self, tile: &Tile) -> bool {
        tile.level_number() < self.target_level
    }

    fn distance_to_eye(&self, tile: &Tile) -> f64 {
        let (lat, lon) = tile.sector().centroid();
        (lat * lat + lon * lon).sqrt()
    }
}

/// Treats the input as raw pixels of a square RGBA image
struct RawRgbaDecoder;

impl TileDecoder for RawRgbaDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<PixelData, DecodeError> {
        let side = ((bytes.len() / 4) as f64).sqrt() as u32;
        if (side * side * 4) as usize != bytes.len() {
            return Err(DecodeError::Malformed("not a square RGBA image".into()));
        }
        Ok(PixelData::Rgba {
            width: side,
            height: side,
            bytes: bytes.to_vec(),
        })
    }
}

fn rgba_for(side: u32) -> PixelData {
    RawRgbaDecoder
        .decode(&vec![0u8; (side * side * 4) as usize])
        .unwrap()
}

fn level_set() -> LevelSet {
    LevelSet::new(Sector::FULL_SPHERE, (90.0, 90.0), 3, 256, 256, "earth").unwrap()
}

#[test]
fn tiles_progress_from_unavailable_to_resident() {
    let mut ctx = FrameContext::new(CacheRegistry::new(CacheConfig::default())).unwrap();
    let levels = level_set();
    let detail = FixedDetail { target_level: 0 };
    let mut uploader = CountingUploader { uploads: 0 };
    let mut releaser = CountingReleaser { released: 0 };

    // Frame 1: nothing loaded yet, so nothing draws and every tile is
    // requested from the locator.
    ctx.begin_frame(100, false, 0);
    let tiles = ctx.assemble_tiles(&levels, &detail);
    assert_eq!(tiles.len(), 8);
    ctx.draw_tiles(&tiles, &mut uploader, &UrlLocator, 1);

    assert_eq!(ctx.queued_drawables(), 0);
    assert_eq!(ctx.requested_tiles().len(), 8);
    assert!(ctx.requested_tiles()[0].1.starts_with("https://tiles.example/earth/0/"));
    assert_eq!(ctx.end_frame(&mut releaser), 0);

    // Loader threads deliver imagery between frames.
    for tile in &tiles {
        tile.set_pixel_data(rgba_for(4));
    }

    // Frame 2: uploads happen during the draw pass and every tile becomes
    // resident; nothing needs requesting.
    ctx.begin_frame(200, false, 0);
    let tiles = ctx.assemble_tiles(&levels, &detail);
    ctx.draw_tiles(&tiles, &mut uploader, &UrlLocator, 1);

    assert_eq!(uploader.uploads, 8);
    assert_eq!(ctx.queued_drawables(), 8);
    assert!(ctx.requested_tiles().is_empty());

    let mut bindings = Vec::new();
    while let Some(drawable) = ctx.next_drawable() {
        if let SceneDrawable::SurfaceTile { binding, .. } = drawable {
            bindings.push(binding);
        }
    }
    assert!(bindings
        .iter()
        .all(|b| matches!(b, TileBinding::Resident { stale: false, .. })));
    assert_eq!(ctx.end_frame(&mut releaser), 0);
}

#[test]
fn fine_tiles_fall_back_to_coarse_ancestors() {
    let mut ctx = FrameContext::new(CacheRegistry::new(CacheConfig::default())).unwrap();
    let levels = level_set();
    let mut uploader = CountingUploader { uploads: 0 };
    let mut releaser = CountingReleaser { released: 0 };

    // Load the whole coarse level first.
    ctx.begin_frame(100, false, 0);
    let coarse = ctx.assemble_tiles(&levels, &FixedDetail { target_level: 0 });
    for tile in &coarse {
        tile.set_pixel_data(rgba_for(4));
    }
    ctx.draw_tiles(&coarse, &mut uploader, &UrlLocator, 1);
    ctx.end_frame(&mut releaser);

    // Zoom in: level-2 tiles have no textures of their own, so they draw
    // their level-0 ancestors through a quarter-scale transform, while
    // still being requested for real loading.
    ctx.begin_frame(200, false, 0);
    let fine = ctx.assemble_tiles(&levels, &FixedDetail { target_level: 2 });
    assert!(fine.iter().all(|t| t.tile().level_number() == 2));
    ctx.draw_tiles(&fine, &mut uploader, &UrlLocator, 1);

    assert_eq!(ctx.queued_drawables(), fine.len());
    assert_eq!(ctx.requested_tiles().len(), fine.len());

    while let Some(drawable) = ctx.next_drawable() {
        match drawable {
            SceneDrawable::SurfaceTile {
                binding: TileBinding::Fallback { transform, .. },
                ..
            } => assert_eq!(transform.scale, 0.25),
            other => panic!("expected fallback binding, got {other:?}"),
        }
    }
    ctx.end_frame(&mut releaser);
}

#[test]
fn eviction_releases_through_end_frame() {
    // A GPU budget that fits only two 4x4 RGBA textures.
    let tile_bytes = 4 * 4 * 4;
    let config = CacheConfig::default().with_named_cache("GPU Resources", 2 * tile_bytes);
    let mut ctx = FrameContext::new(CacheRegistry::new(config)).unwrap();
    let levels = level_set();
    let mut uploader = CountingUploader { uploads: 0 };
    let mut releaser = CountingReleaser { released: 0 };

    // Frame 1: the coarse level uploads way past budget, but every drawn
    // texture is pinned for the frame, so nothing can be evicted yet.
    ctx.begin_frame(100, false, 0);
    let coarse = ctx.assemble_tiles(&levels, &FixedDetail { target_level: 0 });
    for tile in &coarse {
        tile.set_pixel_data(rgba_for(4));
    }
    ctx.draw_tiles(&coarse, &mut uploader, &UrlLocator, 1);
    assert_eq!(uploader.uploads, 8);
    assert_eq!(ctx.end_frame(&mut releaser), 0);

    // Frame 2: zooming in unpins the coarse textures; the fine uploads push
    // them out, and end_frame is where the deletions actually happen.
    ctx.begin_frame(200, false, 0);
    let fine = ctx.assemble_tiles(&levels, &FixedDetail { target_level: 1 });
    assert_eq!(fine.len(), 32);
    for tile in &fine {
        tile.set_pixel_data(rgba_for(4));
    }
    ctx.draw_tiles(&fine, &mut uploader, &UrlLocator, 1);

    let released = ctx.end_frame(&mut releaser);
    assert!(released >= 8, "coarse textures should have been displaced");
    assert_eq!(releaser.released, released);
    assert_eq!(ctx.gpu().pending_release_count(), 0);
}

#[test]
fn pick_frame_resolves_terrain_and_shapes() {
    struct FixedReadback(u32);
    impl PickReadback for FixedReadback {
        fn color_at(&self, _x: u32, _y: u32) -> u32 {
            self.0
        }
    }

    let mut ctx = FrameContext::new(CacheRegistry::new(CacheConfig::default())).unwrap();
    let levels = level_set();
    let mut uploader = CountingUploader { uploads: 0 };
    let mut releaser = CountingReleaser { released: 0 };

    // Make the coarse level resident first.
    ctx.begin_frame(100, false, 0);
    let tiles = ctx.assemble_tiles(&levels, &FixedDetail { target_level: 0 });
    for tile in &tiles {
        tile.set_pixel_data(rgba_for(4));
    }
    ctx.draw_tiles(&tiles, &mut uploader, &UrlLocator, 1);
    ctx.end_frame(&mut releaser);

    // Pick frame: terrain tiles batch under the layer, the shape picks alone.
    ctx.begin_frame(200, true, 0);
    let tiles = ctx.assemble_tiles(&levels, &FixedDetail { target_level: 0 });
    ctx.draw_tiles(&tiles, &mut uploader, &UrlLocator, 1);
    ctx.add_shape(77, 2, false, 10.0);

    let mut terrain_color = None;
    let mut shape_color = None;
    while let Some((color, batch)) = ctx.next_pick_batch() {
        if batch.iter().all(SceneDrawable::is_terrain) {
            terrain_color = Some(color);
            assert_eq!(batch.len(), 8);
        } else {
            shape_color = Some(color);
        }
    }

    let terrain = ctx
        .resolve_pick(&FixedReadback(terrain_color.unwrap()), 0, 0)
        .unwrap();
    assert!(terrain.is_terrain);
    assert_eq!(terrain.object_id, 1); // the layer

    let shape = ctx
        .resolve_pick(&FixedReadback(shape_color.unwrap()), 0, 0)
        .unwrap();
    assert!(!shape.is_terrain);
    assert_eq!(shape.object_id, 77);

    assert_eq!(ctx.resolve_pick(&FixedReadback(0), 0, 0), None);
    ctx.end_frame(&mut releaser);
}
