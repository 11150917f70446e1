//! Texture cache unit tests.
//!
//! This module validates grid geometry, update planning, border padding,
//! format negotiation fallbacks, and the tile upload path against a real
//! device when one is available.

use canvas_protocol::{
    ColorDepth, ColorModel, FilterMode, ImageRect, ProjectionSource, WorkingColorSpace,
};

use bitvec::prelude::Lsb0;

use super::*;
use crate::image_textures::{grid_size, isolate_channels};
use crate::tile::pack_rows_aligned;
use crate::update_info::BoundaryEdges;

const BOUNDS_512: ImageRect = ImageRect {
    x: 0,
    y: 0,
    width: 512,
    height: 512,
};

#[test]
fn grid_size_covers_bounds_exactly() {
    assert_eq!(grid_size(BOUNDS_512, 256), (2, 2));
    assert_eq!(grid_size(ImageRect::from_size(1024, 512), 256), (4, 2));
    assert_eq!(grid_size(ImageRect::from_size(513, 512), 256), (3, 2));
    assert_eq!(grid_size(ImageRect::from_size(1, 1), 256), (1, 1));
}

#[test]
fn interior_patch_plans_one_partial_tile_update() {
    let plans = plan_tile_updates(ImageRect::new(20, 20, 10, 10), BOUNDS_512, 256, 4, 0);

    assert_eq!(plans.len(), 1);
    let plan = &plans[0];
    assert_eq!((plan.col, plan.row), (0, 0));
    assert!(!plan.entire_tile);
    assert_eq!(plan.boundary_edges, BoundaryEdges::NONE);
    assert_eq!(plan.read_rect, ImageRect::new(20, 20, 10, 10));
    // Storage origin sits `border` pixels above and left of the tile rect.
    assert_eq!((plan.dest_x, plan.dest_y), (24, 24));
    assert_eq!((plan.dest_width, plan.dest_height), (10, 10));
}

#[test]
fn seam_patch_pokes_all_overlapping_tiles() {
    // A dirty rect straddling the grid center, stretched by the border,
    // reaches the border stripes of all four tiles.
    let plans = plan_tile_updates(ImageRect::new(250, 250, 12, 12), BOUNDS_512, 256, 4, 0);

    let mut touched: Vec<(u32, u32)> = plans.iter().map(|plan| (plan.col, plan.row)).collect();
    touched.sort_unstable();
    assert_eq!(touched, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
}

#[test]
fn edit_clear_of_tile_border_stays_within_one_tile() {
    // Far enough from every seam that stretching changes nothing.
    let plans = plan_tile_updates(ImageRect::new(100, 300, 50, 50), BOUNDS_512, 256, 4, 0);
    assert_eq!(plans.len(), 1);
    assert_eq!((plans[0].col, plans[0].row), (0, 1));
}

#[test]
fn full_image_update_marks_every_tile_entire() {
    let plans = plan_tile_updates(BOUNDS_512, BOUNDS_512, 256, 4, 0);

    assert_eq!(plans.len(), 4);
    for plan in &plans {
        assert!(plan.entire_tile, "tile ({}, {}) not entire", plan.col, plan.row);
    }

    let corner = plans
        .iter()
        .find(|plan| plan.col == 0 && plan.row == 0)
        .unwrap();
    assert!(corner.boundary_edges.left);
    assert!(corner.boundary_edges.top);
    assert!(!corner.boundary_edges.right);
    assert!(!corner.boundary_edges.bottom);

    let opposite = plans
        .iter()
        .find(|plan| plan.col == 1 && plan.row == 1)
        .unwrap();
    assert!(opposite.boundary_edges.right);
    assert!(opposite.boundary_edges.bottom);
}

#[test]
fn update_outside_bounds_plans_nothing() {
    let plans = plan_tile_updates(ImageRect::new(600, 600, 10, 10), BOUNDS_512, 256, 4, 0);
    assert!(plans.is_empty());
}

#[test]
fn reduced_resolution_patch_halves_destination_coordinates() {
    let plans = plan_tile_updates(ImageRect::new(21, 21, 10, 10), BOUNDS_512, 256, 4, 1);

    assert_eq!(plans.len(), 1);
    let plan = &plans[0];
    assert_eq!(plan.level_of_detail, 1);
    // Read rect grows to the level-1 alignment grid.
    assert_eq!(plan.read_rect, ImageRect::new(20, 20, 12, 12));
    assert_eq!((plan.dest_x, plan.dest_y), (12, 12));
    assert_eq!((plan.dest_width, plan.dest_height), (6, 6));
}

#[test]
fn boundary_patch_at_reduced_resolution_keeps_offsets_in_plane_texels() {
    // Destination offsets are plane-1 texels, so a border pad scaled to
    // the same plane must not push the upload origin negative.
    let plans = plan_tile_updates(ImageRect::new(0, 0, 10, 10), BOUNDS_512, 256, 4, 1);

    assert_eq!(plans.len(), 1);
    let plan = &plans[0];
    assert!(plan.boundary_edges.left && plan.boundary_edges.top);
    assert_eq!((plan.dest_x, plan.dest_y), (2, 2));
    let plane_border = 4u32 >> plan.level_of_detail;
    assert!(plane_border <= plan.dest_x && plane_border <= plan.dest_y);
}

#[test]
fn border_padding_replicates_edge_texels() {
    // 2x2 single-byte pixels: a b / c d, padded 1 pixel on left and top.
    let pixels = vec![b'a', b'b', b'c', b'd'];
    let padded = pad_patch_edges(
        &pixels,
        2,
        2,
        1,
        1,
        BoundaryEdges {
            left: true,
            top: true,
            right: false,
            bottom: false,
        },
    );

    assert_eq!((padded.width, padded.height), (3, 3));
    assert_eq!((padded.shift_x, padded.shift_y), (1, 1));
    assert_eq!(
        padded.pixels,
        vec![b'a', b'a', b'b', b'a', b'a', b'b', b'c', b'c', b'd']
    );
}

#[test]
fn border_padding_is_a_pure_function() {
    let pixels: Vec<u8> = (0..4 * 3 * 3).map(|byte| byte as u8).collect();
    let edges = BoundaryEdges {
        left: false,
        top: true,
        right: true,
        bottom: true,
    };
    let first = pad_patch_edges(&pixels, 3, 3, 4, 2, edges);
    let second = pad_patch_edges(&pixels, 3, 3, 4, 2, edges);
    assert_eq!(first, second);
}

#[test]
fn padding_without_flagged_edges_copies_through() {
    let pixels = vec![1u8, 2, 3, 4];
    let padded = pad_patch_edges(&pixels, 2, 2, 1, 4, BoundaryEdges::NONE);
    assert_eq!(padded.pixels, pixels);
    assert_eq!((padded.shift_x, padded.shift_y), (0, 0));
}

#[test]
fn row_packing_aligns_to_copy_requirement() {
    let pixels = vec![0xabu8; 10 * 4 * 3];
    let packed = pack_rows_aligned(&pixels, 10, 3, 4);
    assert_eq!(packed.bytes_per_row % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT, 0);
    assert_eq!(packed.bytes.len(), packed.bytes_per_row as usize * 3);
    // Row starts carry the payload, the tail of each row is padding.
    assert_eq!(&packed.bytes[0..40], &pixels[0..40]);
    assert_eq!(
        &packed.bytes[packed.bytes_per_row as usize..packed.bytes_per_row as usize + 40],
        &pixels[40..80]
    );
}

#[test]
fn row_packing_keeps_already_aligned_rows() {
    let pixels = vec![0x11u8; 64 * 4 * 2];
    let packed = pack_rows_aligned(&pixels, 64, 2, 4);
    assert_eq!(packed.bytes_per_row, 256);
    assert_eq!(packed.bytes, pixels);
}

#[test]
fn pool_buffers_fit_an_aligned_full_tile_upload() {
    let geometry = TileGeometry {
        texture_size: 264,
        border: 4,
        format: TileTextureFormat {
            format: wgpu::TextureFormat::Rgba8Unorm,
            bytes_per_pixel: 4,
            destination: WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8),
        },
        mip_level_count: 1,
    };
    // An entire-tile refresh must stage through the pool, so the buffer
    // size covers the row-aligned payload, not just the tight one.
    let pixels = vec![0u8; 264 * 264 * 4];
    let packed = pack_rows_aligned(&pixels, 264, 264, 4);
    assert!(packed.bytes.len() as u64 <= geometry.tile_byte_size());
}

#[test]
fn negotiation_prefers_narrowest_supported_format() {
    let rgba8 = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let rgba16 = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer16);
    let rgba32f = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Float32);

    let baseline = GpuCapabilities::baseline();
    let wide = GpuCapabilities::all_features();

    assert_eq!(
        negotiate_tile_format(rgba8, false, false, &baseline).tile_format.format,
        wgpu::TextureFormat::Rgba8Unorm
    );
    // 16-bit integer falls back to half float without the norm feature.
    assert_eq!(
        negotiate_tile_format(rgba16, false, false, &baseline).tile_format.format,
        wgpu::TextureFormat::Rgba16Float
    );
    assert_eq!(
        negotiate_tile_format(rgba16, false, false, &wide).tile_format.format,
        wgpu::TextureFormat::Rgba16Unorm
    );
    // Unfilterable 32-bit float steps down rather than breaking sampling.
    assert_eq!(
        negotiate_tile_format(rgba32f, false, false, &baseline).tile_format.format,
        wgpu::TextureFormat::Rgba16Float
    );
    assert_eq!(
        negotiate_tile_format(rgba32f, false, false, &wide).tile_format.format,
        wgpu::TextureFormat::Rgba32Float
    );
}

#[test]
fn hdr_request_widens_eight_bit_sources() {
    let rgba8 = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let negotiated = negotiate_tile_format(rgba8, true, false, &GpuCapabilities::baseline());
    assert_eq!(negotiated.tile_format.format, wgpu::TextureFormat::Rgba16Float);
}

#[test]
fn non_rgba_image_forces_internal_color_management() {
    let cmyk = WorkingColorSpace::new(ColorModel::Cmyk, ColorDepth::Integer8);
    let negotiated = negotiate_tile_format(cmyk, false, true, &GpuCapabilities::all_features());
    assert!(negotiated.forced_internal_color_management);
    assert_eq!(
        negotiated.tile_format.destination.model,
        ColorModel::Rgba
    );

    let rgba = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let negotiated = negotiate_tile_format(rgba, false, true, &GpuCapabilities::all_features());
    assert!(!negotiated.forced_internal_color_management);
}

#[test]
fn deselected_channels_are_zeroed() {
    let dst = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let mut pixels = vec![10u8, 20, 30, 40, 50, 60, 70, 80];
    let flags = bitvec::bitvec![1, 1, 0, 0];
    isolate_channels(&flags, dst, &mut pixels);
    assert_eq!(pixels, vec![10, 20, 0, 0, 50, 60, 0, 0]);
}

#[test]
fn single_selected_channel_shows_as_grayscale() {
    // The channel docker's solo mode: one channel replicated across the
    // whole pixel instead of three channels blanked.
    let dst = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let mut pixels = vec![10u8, 20, 30, 40, 1, 2, 3, 4];
    let flags = bitvec::bitvec![0, 1, 0, 0];
    isolate_channels(&flags, dst, &mut pixels);
    assert_eq!(pixels, vec![20, 20, 20, 20, 2, 2, 2, 2]);
}

#[test]
fn mismatched_channel_flags_leave_pixels_alone() {
    let dst = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let mut pixels = vec![10u8, 20, 30, 40];
    let flags = bitvec::bitvec![0, 1];
    isolate_channels(&flags, dst, &mut pixels);
    assert_eq!(pixels, vec![10, 20, 30, 40]);
}

struct SolidSource {
    bounds: ImageRect,
    space: WorkingColorSpace,
    value: u8,
}

impl ProjectionSource for SolidSource {
    fn bounds(&self) -> ImageRect {
        self.bounds
    }

    fn color_space(&self) -> WorkingColorSpace {
        self.space
    }

    fn read_rect(&self, rect: ImageRect, out: &mut Vec<u8>) {
        out.clear();
        let byte_len =
            (rect.width as usize) * (rect.height as usize) * self.space.pixel_size() as usize;
        out.resize(byte_len, self.value);
    }
}

/// Solid-color source standing in for a compositor running at a reduced
/// resolution: patches carry `level` and plane-sized pixel payloads.
struct LodSource {
    bounds: ImageRect,
    space: WorkingColorSpace,
    level: u32,
    value: u8,
}

impl ProjectionSource for LodSource {
    fn bounds(&self) -> ImageRect {
        self.bounds
    }

    fn color_space(&self) -> WorkingColorSpace {
        self.space
    }

    fn current_level_of_detail(&self) -> u32 {
        self.level
    }

    fn read_rect(&self, rect: ImageRect, out: &mut Vec<u8>) {
        out.clear();
        let width = (rect.width >> self.level) as usize;
        let height = (rect.height >> self.level) as usize;
        out.resize(width * height * self.space.pixel_size() as usize, self.value);
    }
}

fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: true,
            })
            .await
            .ok()?;
        adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("texture_cache.test_device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .ok()
    })
}

fn scenario_config() -> CanvasConfig {
    CanvasConfig {
        // 264 texels with a 4 pixel border on each side: 256 effective.
        preferred_texture_size: 264,
        texture_border: 4,
        filter_mode: FilterMode::Bilinear,
        ..CanvasConfig::default()
    }
}

#[test]
fn grid_builds_and_rebuilds_on_resize() {
    let Some((device, queue)) = test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let space = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let caps = GpuCapabilities::from_device(&device);

    let mut textures = ImageTextures::new(
        &device,
        &queue,
        BOUNDS_512,
        space,
        caps,
        scenario_config(),
    );
    assert_eq!((textures.num_cols(), textures.num_rows()), (2, 2));
    assert_eq!(textures.tile_count(), 4);
    assert_eq!(textures.tile_geometry().effective_size(), 256);

    textures.image_size_changed(&device, &queue, ImageRect::from_size(1024, 512));
    assert_eq!((textures.num_cols(), textures.num_rows()), (4, 2));
    assert_eq!(textures.tile_count(), 8);
}

#[test]
fn unconverted_update_round_trips_to_tiles() {
    let Some((device, queue)) = test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let space = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let caps = GpuCapabilities::from_device(&device);
    let mut textures = ImageTextures::new(
        &device,
        &queue,
        BOUNDS_512,
        space,
        caps,
        scenario_config(),
    );
    let source = SolidSource {
        bounds: BOUNDS_512,
        space,
        value: 0x7f,
    };

    let batch = textures.update_cache_no_conversion(ImageRect::new(20, 20, 10, 10), &source);
    assert_eq!(batch.patches.len(), 1);
    assert!(!batch.patches[0].entire_tile);
    assert_eq!(batch.patches[0].pixels.len(), 10 * 10 * 4);

    textures.recalculate_cache(&device, &queue, &batch, false);
    let (tile, mut ctx) = textures.draw_context(&device, &queue, 0, 0);
    assert_eq!(tile.prepare_for_draw(&mut ctx, false), 0);
    assert_eq!(tile.lod_state(), LodState::Clean { level: 0 });
}

#[test]
fn full_image_recalculate_survives_pool_rotation() {
    let Some((device, queue)) = test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let space = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let caps = GpuCapabilities::from_device(&device);
    let mut config = scenario_config();
    // A one-buffer pool forces the fence throttle on every tile.
    config.pool_buffer_count = 1;
    let mut textures =
        ImageTextures::new(&device, &queue, BOUNDS_512, space, caps, config);
    let source = SolidSource {
        bounds: BOUNDS_512,
        space,
        value: 0x40,
    };

    let batch = textures.update_cache_no_conversion(BOUNDS_512, &source);
    assert_eq!(batch.patches.len(), 4);
    for patch in &batch.patches {
        assert!(patch.entire_tile);
    }
    textures.recalculate_cache(&device, &queue, &batch, false);

    device
        .poll(wgpu::PollType::wait_indefinitely())
        .expect("drain test device");
}

#[test]
fn reduced_resolution_boundary_patch_lands_on_its_plane() {
    let Some((device, queue)) = test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let space = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let caps = GpuCapabilities::from_device(&device);
    let mut textures = ImageTextures::new(
        &device,
        &queue,
        BOUNDS_512,
        space,
        caps,
        scenario_config(),
    );
    // Planes come from the configuration even though bilinear never
    // samples past the base level.
    assert!(textures.tile_geometry().mip_level_count > 1);

    let preview = LodSource {
        bounds: BOUNDS_512,
        space,
        level: 1,
        value: 0x55,
    };
    let batch = textures.update_cache_no_conversion(ImageRect::new(0, 0, 10, 10), &preview);
    assert_eq!(batch.patches.len(), 1);
    let patch = &batch.patches[0];
    assert_eq!(patch.patch_level_of_detail, 1);
    assert!(patch.boundary_edges.left && patch.boundary_edges.top);

    textures.recalculate_cache(&device, &queue, &batch, true);
    assert_eq!(
        textures.texture_tile_cr(0, 0).lod_state(),
        LodState::Clean { level: 1 }
    );

    device
        .poll(wgpu::PollType::wait_indefinitely())
        .expect("drain test device");
}

#[test]
fn patch_beyond_allocated_planes_is_dropped() {
    let Some((device, queue)) = test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let space = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let caps = GpuCapabilities::from_device(&device);
    let mut config = scenario_config();
    config.mip_level_count = 1;
    let mut textures =
        ImageTextures::new(&device, &queue, BOUNDS_512, space, caps, config);

    let preview = LodSource {
        bounds: BOUNDS_512,
        space,
        level: 1,
        value: 0x55,
    };
    let batch = textures.update_cache_no_conversion(ImageRect::new(20, 20, 10, 10), &preview);
    assert_eq!(batch.patches.len(), 1);

    // Nowhere for a plane-1 patch to land; the tile keeps its state.
    textures.recalculate_cache(&device, &queue, &batch, true);
    assert_eq!(
        textures.texture_tile_cr(0, 0).lod_state(),
        LodState::Clean { level: 0 }
    );
}

#[test]
fn mipmap_state_tracks_preview_and_partial_updates() {
    let Some((device, queue)) = test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let space = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let caps = GpuCapabilities::from_device(&device);
    let mut config = scenario_config();
    config.filter_mode = FilterMode::Trilinear;
    let mut textures =
        ImageTextures::new(&device, &queue, BOUNDS_512, space, caps, config);
    if textures.effective_filter() != FilterMode::Trilinear {
        eprintln!("mipmap generation unavailable, skipping");
        return;
    }

    // Fresh tiles carry a seeded base plane and a stale chain; the first
    // draw regenerates it.
    {
        let (tile, mut ctx) = textures.draw_context(&device, &queue, 0, 0);
        assert_eq!(tile.lod_state(), LodState::MipmapsDirty);
        assert_eq!(tile.prepare_for_draw(&mut ctx, false), 0);
        assert_eq!(tile.lod_state(), LodState::Clean { level: 0 });
    }

    // A reduced-resolution preview patch parks the tile at its plane,
    // and drawing samples that plane directly.
    let preview = LodSource {
        bounds: BOUNDS_512,
        space,
        level: 1,
        value: 0x20,
    };
    let batch = textures.update_cache_no_conversion(ImageRect::new(20, 20, 10, 10), &preview);
    assert_eq!(batch.patches.len(), 1);
    textures.recalculate_cache(&device, &queue, &batch, true);
    assert_eq!(
        textures.texture_tile_cr(0, 0).lod_state(),
        LodState::Clean { level: 1 }
    );
    {
        let (tile, mut ctx) = textures.draw_context(&device, &queue, 0, 0);
        assert_eq!(tile.prepare_for_draw(&mut ctx, true), 1);
    }

    // A full-resolution partial edit on the parked tile regenerates the
    // chain before uploading, then marks it stale for the next draw.
    let source = SolidSource {
        bounds: BOUNDS_512,
        space,
        value: 0x7f,
    };
    let batch = textures.update_cache_no_conversion(ImageRect::new(30, 30, 8, 8), &source);
    textures.recalculate_cache(&device, &queue, &batch, false);
    assert_eq!(
        textures.texture_tile_cr(0, 0).lod_state(),
        LodState::MipmapsDirty
    );

    // Mid-stroke draws leave the stale marker in place; a settled draw
    // clears it.
    {
        let (tile, mut ctx) = textures.draw_context(&device, &queue, 0, 0);
        assert_eq!(tile.prepare_for_draw(&mut ctx, true), 0);
        assert_eq!(tile.lod_state(), LodState::MipmapsDirty);
        assert_eq!(tile.prepare_for_draw(&mut ctx, false), 0);
        assert_eq!(tile.lod_state(), LodState::Clean { level: 0 });
    }

    device
        .poll(wgpu::PollType::wait_indefinitely())
        .expect("drain test device");
}
