//! Patch descriptors handed from the compositing side to individual tiles.

use canvas_protocol::ImageRect;

/// Which edges of a tile's patch lie on the image's outer boundary.
///
/// These edges have no neighbor tile to supply border texels, so the
/// patch's outermost row or column is replicated into the border region
/// before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundaryEdges {
    pub left: bool,
    pub top: bool,
    pub right: bool,
    pub bottom: bool,
}

impl BoundaryEdges {
    pub const NONE: BoundaryEdges = BoundaryEdges {
        left: false,
        top: false,
        right: false,
        bottom: false,
    };

    pub fn any(&self) -> bool {
        self.left || self.top || self.right || self.bottom
    }
}

/// One rectangular pixel update destined for one tile.
///
/// Produced by the grid manager from a dirty image rectangle, consumed by
/// exactly one `TextureTile::update` call, then discarded.
#[derive(Debug)]
pub struct TileUpdateInfo {
    pub tile_col: u32,
    pub tile_row: u32,
    /// Pixel bytes in the tile's destination color space, tightly packed.
    pub pixels: Vec<u8>,
    /// Patch offset within the tile's storage rectangle, border included.
    pub patch_offset_x: u32,
    pub patch_offset_y: u32,
    pub patch_width: u32,
    pub patch_height: u32,
    /// Mipmap plane the patch belongs to. Zero for full-resolution edits.
    pub patch_level_of_detail: u32,
    /// True when the patch covers the tile's entire effective rectangle.
    pub entire_tile: bool,
    pub boundary_edges: BoundaryEdges,
}

impl TileUpdateInfo {
    pub fn is_valid(&self) -> bool {
        self.patch_width > 0 && self.patch_height > 0 && !self.pixels.is_empty()
    }
}

/// Ordered patches produced by one `update_cache` call, applied to the
/// grid by `recalculate_cache`.
#[derive(Debug, Default)]
pub struct CanvasUpdateBatch {
    pub patches: Vec<TileUpdateInfo>,
    /// The dirty image rectangle the patches were derived from.
    pub dirty_rect: ImageRect,
}

impl CanvasUpdateBatch {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}
