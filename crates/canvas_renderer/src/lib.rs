//! Canvas renderer: draws the visible viewport from the texture tile
//! grid, with wrap-around cloning, zoom-driven filter selection and the
//! auxiliary passes (checker background, pixel grid, tool outline).
//!
//! Pass order per frame: background clear, checkers, image tiles, pixel
//! grid, tool outline. Each frame ends by recording a completion fence;
//! callers use it as a drawing-suppression signal while the GPU is still
//! chewing on the previous frame.

use canvas_protocol::{FilterMode, Viewport, WrapAroundAxis};
use texture_cache::CompletionFence;

pub mod tiling;

mod renderer_draw;
mod renderer_init;

#[cfg(test)]
mod tests;

pub use renderer_draw::FrameParams;
pub use tiling::{select_tile_sampling, visible_tile_spans, TileFilter, TileSampling, TileSpan};

/// Everything about the current view of the canvas that is not GPU state.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    /// Render target size in physical pixels.
    pub widget_size: (u32, u32),
    /// Image coordinates of the widget origin.
    pub pan: (f32, f32),
    /// Image pixels to widget pixels scale per axis.
    pub zoom: (f32, f32),
    /// `None` clips drawing to the image bounds; `Some` repeats the image.
    pub wrap_around: Option<WrapAroundAxis>,
    pub filter_mode: FilterMode,
    pub background_color: [f64; 4],
    pub pixel_grid_enabled: bool,
    /// Minimum zoom before the pixel grid shows.
    pub pixel_grid_threshold: f32,
    pub pixel_grid_color: [f32; 4],
    /// Checker square edge length in widget pixels.
    pub checker_size: f32,
    /// Anchor the checker pattern to the image instead of the widget.
    pub scroll_checkers: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            widget_size: (0, 0),
            pan: (0.0, 0.0),
            zoom: (1.0, 1.0),
            wrap_around: None,
            filter_mode: FilterMode::Bilinear,
            background_color: [0.3, 0.3, 0.3, 1.0],
            pixel_grid_enabled: false,
            pixel_grid_threshold: 24.0,
            pixel_grid_color: [0.5, 0.5, 0.5, 0.5],
            checker_size: 16.0,
            scroll_checkers: false,
        }
    }
}

/// A tool outline polyline in image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlinePath {
    pub points: Vec<[f32; 2]>,
    pub color: [f32; 4],
    pub closed: bool,
}

pub(crate) const UNIFORM_STRIDE: u64 = 256;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct DrawUniforms {
    pub mvp: [f32; 16],
    /// Negative means "let the sampler pick the plane".
    pub fixed_lod: f32,
    pub _pad: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct CheckerUniforms {
    pub mvp: [f32; 16],
    pub uv_transform: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct OverlayUniforms {
    pub mvp: [f32; 16],
    pub color: [f32; 4],
}

/// GPU-side state of the canvas renderer. One per render surface.
pub struct CanvasRenderer {
    pub(crate) surface_format: wgpu::TextureFormat,

    pub(crate) tile_pipeline: wgpu::RenderPipeline,
    pub(crate) checkers_pipeline: wgpu::RenderPipeline,
    pub(crate) overlay_pipeline: wgpu::RenderPipeline,

    pub(crate) tile_texture_layout: wgpu::BindGroupLayout,

    pub(crate) draw_uniform_buffer: wgpu::Buffer,
    pub(crate) draw_uniform_bind_group: wgpu::BindGroup,
    pub(crate) draw_uniform_layout: wgpu::BindGroupLayout,
    pub(crate) draw_uniform_capacity: u32,

    pub(crate) overlay_uniform_buffer: wgpu::Buffer,
    pub(crate) overlay_uniform_bind_group: wgpu::BindGroup,
    pub(crate) overlay_uniform_layout: wgpu::BindGroupLayout,
    pub(crate) overlay_uniform_capacity: u32,
    pub(crate) overlay_vertex_buffer: wgpu::Buffer,
    pub(crate) overlay_vertex_capacity: u64,

    pub(crate) checkers_uniform_buffer: wgpu::Buffer,
    pub(crate) checkers_bind_group: wgpu::BindGroup,
    pub(crate) checkers_vertex_buffer: wgpu::Buffer,

    pub(crate) sampler_nearest: wgpu::Sampler,
    pub(crate) sampler_linear: wgpu::Sampler,
    pub(crate) sampler_trilinear: wgpu::Sampler,
    pub(crate) sampler_mip_nearest: wgpu::Sampler,

    pub(crate) frame_fence: Option<CompletionFence>,
}

impl CanvasRenderer {
    pub(crate) fn sampler_for(&self, filter: TileFilter) -> &wgpu::Sampler {
        match filter {
            TileFilter::Nearest => &self.sampler_nearest,
            TileFilter::Linear => &self.sampler_linear,
            TileFilter::Trilinear => &self.sampler_trilinear,
            TileFilter::LinearMipNearest => &self.sampler_mip_nearest,
        }
    }

    /// Whether the previous frame's GPU work is still in flight. Callers
    /// skip low-priority redraws while this is true.
    pub fn is_frame_in_flight(&self, device: &wgpu::Device) -> bool {
        match &self.frame_fence {
            Some(fence) => !fence.is_signaled(device),
            None => false,
        }
    }
}

pub(crate) fn scissor_for(clip: Option<Viewport>, widget_size: (u32, u32)) -> Viewport {
    let full = Viewport {
        origin_x: 0,
        origin_y: 0,
        width: widget_size.0,
        height: widget_size.1,
    };
    let Some(clip) = clip else {
        return full;
    };
    let x = clip.origin_x.min(widget_size.0);
    let y = clip.origin_y.min(widget_size.1);
    Viewport {
        origin_x: x,
        origin_y: y,
        width: clip.width.min(widget_size.0 - x),
        height: clip.height.min(widget_size.1 - y),
    }
}
