//! GPU texture tile streaming cache for the painting canvas.
//!
//! Converts a large, incrementally edited raster image into a bounded
//! grid of GPU-resident tile textures: dirty rectangles come in from the
//! compositor, get split into per-tile patches, and are streamed to the
//! GPU through a ring of staging buffers sized by completion-fence
//! backpressure. The canvas renderer draws straight from the grid.

use std::sync::OnceLock;

use canvas_protocol::FilterMode;

pub mod capabilities;
pub mod fence;
pub mod format;
pub mod image_textures;
pub mod mipmap;
pub mod tile;
pub mod transfer_pool;
pub mod update_info;

#[cfg(test)]
mod tests;

pub use capabilities::GpuCapabilities;
pub use fence::CompletionFence;
pub use format::{negotiate_tile_format, FormatNegotiation, TileTextureFormat};
pub use image_textures::{
    grid_size, plan_tile_updates, ImageTextures, PlannedTilePatch, VERTICES_PER_TILE,
};
pub use mipmap::{full_mip_level_count, MipmapGenerator, MipmapGeneratorError};
pub use tile::{pad_patch_edges, LodState, PaddedPatch, TextureTile, TileGeometry, TileUploadContext};
pub use transfer_pool::{TransferBufferPool, TransferPoolError, MAX_POOL_BUFFERS};
pub use update_info::{BoundaryEdges, CanvasUpdateBatch, TileUpdateInfo};

/// Tunables the canvas settings dialog feeds in. Shape changes trigger a
/// full grid rebuild; see [`ImageTextures::update_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasConfig {
    /// Requested tile texture edge length, clamped to the device limit.
    pub preferred_texture_size: u32,
    /// Seam overlap in pixels on every tile side.
    pub texture_border: u32,
    /// Mipmap planes per tile when the filter mode uses them.
    pub mip_level_count: u32,
    pub filter_mode: FilterMode,
    /// Stage uploads through the transfer-buffer pool instead of writing
    /// textures directly.
    pub use_staging_buffers: bool,
    /// Initial ring length of the transfer-buffer pool.
    pub pool_buffer_count: usize,
    pub hdr_requested: bool,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            preferred_texture_size: 256,
            texture_border: 4,
            mip_level_count: 4,
            filter_mode: FilterMode::Trilinear,
            use_staging_buffers: true,
            pool_buffer_count: 4,
            hdr_requested: false,
        }
    }
}

/// `CANVAS_PERF_LOG=1` turns on pool-growth and throughput logging.
pub fn canvas_perf_log_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var("CANVAS_PERF_LOG").is_ok_and(|value| value == "1"))
}

/// `CANVAS_TRACE=1` turns on format-negotiation and fallback tracing.
pub(crate) fn canvas_trace_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var("CANVAS_TRACE").is_ok_and(|value| value == "1"))
}
