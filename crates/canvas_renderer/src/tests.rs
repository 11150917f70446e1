use canvas_protocol::{
    ColorDepth, ColorModel, FilterMode, ImageRect, Viewport, WorkingColorSpace, WrapAroundAxis,
};
use texture_cache::{CanvasConfig, GpuCapabilities, ImageTextures};

use crate::tiling::{select_tile_sampling, visible_tile_spans, TileFilter};
use crate::{scissor_for, CanvasRenderer, FrameParams, OutlinePath, ViewState};

const BOUNDS_512: ImageRect = ImageRect {
    x: 0,
    y: 0,
    width: 512,
    height: 512,
};

#[test]
fn non_wrap_view_clips_to_image_bounds() {
    let visible = ImageRect::new(-100, -100, 1000, 1000);
    let spans = visible_tile_spans(visible, BOUNDS_512, 256, None);
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!((span.clone_x, span.clone_y), (0, 0));
    assert_eq!((span.first_col, span.last_col), (0, 1));
    assert_eq!((span.first_row, span.last_row), (0, 1));
}

#[test]
fn view_inside_one_tile_spans_one_tile() {
    let visible = ImageRect::new(300, 10, 100, 100);
    let spans = visible_tile_spans(visible, BOUNDS_512, 256, None);
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!((span.first_col, span.last_col), (1, 1));
    assert_eq!((span.first_row, span.last_row), (0, 0));
    assert_eq!(span.tiles().collect::<Vec<_>>(), vec![(1, 0)]);
}

#[test]
fn view_outside_bounds_without_wrap_is_empty() {
    let visible = ImageRect::new(600, 0, 100, 100);
    assert!(visible_tile_spans(visible, BOUNDS_512, 256, None).is_empty());
}

// A viewport two image-widths wide centered on the image must touch the
// clones at offsets -1, 0 and 1 and nothing further out.
#[test]
fn wide_wrap_view_spans_three_horizontal_clones() {
    let visible = ImageRect::new(-256, 0, 1024, 512);
    let spans = visible_tile_spans(visible, BOUNDS_512, 256, Some(WrapAroundAxis::Both));

    let mut clone_xs: Vec<i32> = spans.iter().map(|s| s.clone_x).collect();
    clone_xs.sort_unstable();
    clone_xs.dedup();
    assert_eq!(clone_xs, vec![-1, 0, 1]);
    assert!(spans.iter().all(|s| s.clone_y == 0));

    // Edge clones carry partial column ranges, the middle clone is full.
    for span in &spans {
        match span.clone_x {
            -1 => assert_eq!((span.first_col, span.last_col), (1, 1)),
            0 => assert_eq!((span.first_col, span.last_col), (0, 1)),
            1 => assert_eq!((span.first_col, span.last_col), (0, 0)),
            other => panic!("unexpected clone {other}"),
        }
        assert_eq!((span.first_row, span.last_row), (0, 1));
    }
}

// Stitching all spans back into image space must tile the visible rect
// exactly once: full coverage, no tile drawn twice at the same offset.
#[test]
fn wrap_spans_cover_without_overlap() {
    let visible = ImageRect::new(-300, -120, 1100, 800);
    let spans = visible_tile_spans(visible, BOUNDS_512, 256, Some(WrapAroundAxis::Both));

    let mut seen = std::collections::HashSet::new();
    for span in &spans {
        for (col, row) in span.tiles() {
            assert!(
                seen.insert((span.clone_x, span.clone_y, col, row)),
                "tile ({col},{row}) drawn twice at clone ({},{})",
                span.clone_x,
                span.clone_y
            );
        }
    }

    // Every visible image point must fall inside some span's tiles.
    for &(x, y) in &[(-300, -120), (0, 0), (511, 511), (799, 679), (-1, 600)] {
        let hit = spans.iter().any(|span| {
            let offset_x = i64::from(span.clone_x) * 512;
            let offset_y = i64::from(span.clone_y) * 512;
            let local_x = i64::from(x) - offset_x;
            let local_y = i64::from(y) - offset_y;
            (0..512).contains(&local_x)
                && (0..512).contains(&local_y)
                && span.tiles().any(|(col, row)| {
                    let tile = ImageRect::new(col as i32 * 256, row as i32 * 256, 256, 256)
                        .intersect(BOUNDS_512);
                    tile.contains_point(local_x as i32, local_y as i32)
                })
        });
        assert!(hit, "({x},{y}) not covered");
    }
}

#[test]
fn horizontal_wrap_clamps_rows_to_image() {
    let visible = ImageRect::new(-256, -100, 1024, 800);
    let spans = visible_tile_spans(visible, BOUNDS_512, 256, Some(WrapAroundAxis::Horizontal));
    assert!(!spans.is_empty());
    assert!(spans.iter().all(|s| s.clone_y == 0));
    assert!(spans.iter().any(|s| s.clone_x != 0));
}

#[test]
fn vertical_wrap_clamps_cols_to_image() {
    let visible = ImageRect::new(-100, -256, 800, 1024);
    let spans = visible_tile_spans(visible, BOUNDS_512, 256, Some(WrapAroundAxis::Vertical));
    assert!(!spans.is_empty());
    assert!(spans.iter().all(|s| s.clone_x == 0));
    assert!(spans.iter().any(|s| s.clone_y != 0));
}

#[test]
fn high_magnification_forces_nearest() {
    for mode in [
        FilterMode::Nearest,
        FilterMode::Bilinear,
        FilterMode::Trilinear,
        FilterMode::HighQuality,
    ] {
        let sampling = select_tile_sampling(mode, 0, 2.0);
        assert_eq!(sampling.filter, TileFilter::Nearest);
        assert_eq!(sampling.fixed_lod, None);
    }
}

#[test]
fn reduced_resolution_plane_pins_the_sampled_level() {
    let sampling = select_tile_sampling(FilterMode::Bilinear, 2, 1.0);
    assert_eq!(sampling.filter, TileFilter::LinearMipNearest);
    assert_eq!(sampling.fixed_lod, Some(2));
}

#[test]
fn high_quality_switches_on_zoom_out() {
    let far_out = select_tile_sampling(FilterMode::HighQuality, 0, 0.25);
    assert_eq!(far_out.filter, TileFilter::LinearMipNearest);
    let near = select_tile_sampling(FilterMode::HighQuality, 0, 1.0);
    assert_eq!(near.filter, TileFilter::Linear);
}

#[test]
fn user_modes_map_through_at_normal_zoom() {
    assert_eq!(
        select_tile_sampling(FilterMode::Nearest, 0, 1.0).filter,
        TileFilter::Nearest
    );
    assert_eq!(
        select_tile_sampling(FilterMode::Bilinear, 0, 1.0).filter,
        TileFilter::Linear
    );
    assert_eq!(
        select_tile_sampling(FilterMode::Trilinear, 0, 1.0).filter,
        TileFilter::Trilinear
    );
}

#[test]
fn scissor_defaults_to_the_whole_widget() {
    let scissor = scissor_for(None, (800, 600));
    assert_eq!(
        scissor,
        Viewport {
            origin_x: 0,
            origin_y: 0,
            width: 800,
            height: 600
        }
    );
}

#[test]
fn scissor_clamps_oversized_clips() {
    let clip = Viewport {
        origin_x: 700,
        origin_y: 100,
        width: 400,
        height: 900,
    };
    let scissor = scissor_for(Some(clip), (800, 600));
    assert_eq!(
        scissor,
        Viewport {
            origin_x: 700,
            origin_y: 100,
            width: 100,
            height: 500
        }
    );
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
                label: Some("canvas_renderer.test_device"),
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

#[test]
fn frame_draws_and_arms_the_fence() {
    let Some((device, queue)) = test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };

    let space = WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8);
    let caps = GpuCapabilities::from_device(&device);
    let config = CanvasConfig {
        preferred_texture_size: 264,
        texture_border: 4,
        filter_mode: FilterMode::Bilinear,
        ..CanvasConfig::default()
    };
    let mut textures = ImageTextures::new(&device, &queue, BOUNDS_512, space, caps, config);

    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("frame_target"),
        size: wgpu::Extent3d {
            width: 640,
            height: 480,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let mut renderer = CanvasRenderer::new(&device, &queue, wgpu::TextureFormat::Rgba8Unorm);
    let view = ViewState {
        widget_size: (640, 480),
        wrap_around: Some(WrapAroundAxis::Both),
        pan: (-64.0, -64.0),
        ..ViewState::default()
    };
    let outline = OutlinePath {
        points: vec![[10.0, 10.0], [100.0, 10.0], [100.0, 100.0]],
        color: [0.0, 0.0, 0.0, 1.0],
        closed: true,
    };
    renderer.draw_frame(
        &device,
        &queue,
        &target_view,
        FrameParams {
            textures: &mut textures,
            view: &view,
            clip: None,
            outlines: std::slice::from_ref(&outline),
            block_mipmap_regeneration: false,
        },
    );

    // The fence is armed, and waiting on the device lets it signal.
    assert!(renderer.frame_fence.is_some());
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .expect("device poll failed");
    assert!(!renderer.is_frame_in_flight(&device));
}
