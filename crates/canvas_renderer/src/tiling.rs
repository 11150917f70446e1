//! Viewport-to-tile mapping, including wrap-around cloning.
//!
//! All functions here are pure coordinate math. The draw loop feeds in
//! the visible image rect and walks the returned spans; in wrap-around
//! mode indices outside the grid wrap modulo the image's tile count and
//! each repetition carries a clone offset that translates its geometry
//! by whole image sizes.

use canvas_protocol::{FilterMode, ImageRect, WrapAroundAxis};

/// One contiguous block of tiles drawn at a single clone offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpan {
    /// How many whole image widths/heights this repetition is translated by.
    pub clone_x: i32,
    pub clone_y: i32,
    pub first_col: u32,
    pub last_col: u32,
    pub first_row: u32,
    pub last_row: u32,
}

impl TileSpan {
    pub fn tiles(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let rows = self.first_row..=self.last_row;
        let cols = self.first_col..=self.last_col;
        cols.flat_map(move |col| rows.clone().map(move |row| (col, row)))
    }
}

pub(crate) fn wrap_value(value: i64, range: i64) -> i64 {
    value.rem_euclid(range)
}

/// Tile column for image x, where x may lie any number of image widths
/// outside the bounds. Out-of-bounds positions land on virtual columns:
/// `cols_per_image * wraps + wrapped_column`.
fn col_with_wrap_compensation(x: i64, bounds: ImageRect, effective_size: u32, cols: i64) -> i64 {
    let rel = x - i64::from(bounds.x);
    let width = i64::from(bounds.width);
    let wraps = rel.div_euclid(width);
    let remainder = rel - width * wraps;
    cols * wraps + remainder / i64::from(effective_size)
}

fn row_with_wrap_compensation(y: i64, bounds: ImageRect, effective_size: u32, rows: i64) -> i64 {
    let rel = y - i64::from(bounds.y);
    let height = i64::from(bounds.height);
    let wraps = rel.div_euclid(height);
    let remainder = rel - height * wraps;
    rows * wraps + remainder / i64::from(effective_size)
}

/// Maps the visible image rect to drawable tile spans.
///
/// Without wrap-around the rect is clipped to the image bounds first, so
/// no wrapping math runs. With wrap-around on an axis the rect is left
/// unclipped on that axis and split into one span per image repetition.
pub fn visible_tile_spans(
    visible: ImageRect,
    bounds: ImageRect,
    effective_size: u32,
    wrap: Option<WrapAroundAxis>,
) -> Vec<TileSpan> {
    if visible.is_empty() || bounds.is_empty() {
        return Vec::new();
    }

    let visible = match wrap {
        None => visible.intersect(bounds),
        Some(WrapAroundAxis::Horizontal) => visible.intersect(ImageRect {
            x: visible.x,
            y: bounds.y,
            width: visible.width,
            height: bounds.height,
        }),
        Some(WrapAroundAxis::Vertical) => visible.intersect(ImageRect {
            x: bounds.x,
            y: visible.y,
            width: bounds.width,
            height: visible.height,
        }),
        Some(WrapAroundAxis::Both) => visible,
    };
    if visible.is_empty() {
        return Vec::new();
    }

    let cols = i64::from(bounds.width.div_ceil(effective_size));
    let rows = i64::from(bounds.height.div_ceil(effective_size));

    let first_col = col_with_wrap_compensation(i64::from(visible.x), bounds, effective_size, cols);
    let last_col = col_with_wrap_compensation(visible.right() - 1, bounds, effective_size, cols);
    let first_row = row_with_wrap_compensation(i64::from(visible.y), bounds, effective_size, rows);
    let last_row = row_with_wrap_compensation(visible.bottom() - 1, bounds, effective_size, rows);

    let first_clone_x = first_col.div_euclid(cols);
    let last_clone_x = last_col.div_euclid(cols);
    let first_clone_y = first_row.div_euclid(rows);
    let last_clone_y = last_row.div_euclid(rows);

    let mut spans = Vec::new();
    for clone_y in first_clone_y..=last_clone_y {
        for clone_x in first_clone_x..=last_clone_x {
            let local_first_col = if clone_x == first_clone_x {
                wrap_value(first_col, cols)
            } else {
                0
            };
            let local_last_col = if clone_x == last_clone_x {
                wrap_value(last_col, cols)
            } else {
                cols - 1
            };
            let local_first_row = if clone_y == first_clone_y {
                wrap_value(first_row, rows)
            } else {
                0
            };
            let local_last_row = if clone_y == last_clone_y {
                wrap_value(last_row, rows)
            } else {
                rows - 1
            };

            spans.push(TileSpan {
                clone_x: i32::try_from(clone_x).expect("clone offset x exceeds i32"),
                clone_y: i32::try_from(clone_y).expect("clone offset y exceeds i32"),
                first_col: local_first_col as u32,
                last_col: local_last_col as u32,
                first_row: local_first_row as u32,
                last_row: local_last_row as u32,
            });
        }
    }
    spans
}

/// How a tile should be sampled this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFilter {
    /// Nearest min and mag. Forced at high magnification so pixel-exact
    /// edits stay sharp.
    Nearest,
    /// Linear min and mag on the base plane.
    Linear,
    /// Linear within a plane, linear between planes.
    Trilinear,
    /// Linear within a plane, snapped to the nearest plane.
    LinearMipNearest,
}

/// Sampling decision for one tile draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileSampling {
    pub filter: TileFilter,
    /// Sample exactly this plane instead of letting the sampler pick.
    /// Set when the tile is prepared at a reduced-resolution plane.
    pub fixed_lod: Option<u32>,
}

/// Picks the sampler for a tile given the user's filter mode, the tile's
/// current LOD plane and the canvas zoom scale.
pub fn select_tile_sampling(user_mode: FilterMode, lod_plane: u32, scale: f32) -> TileSampling {
    if lod_plane > 0 {
        return TileSampling {
            filter: TileFilter::LinearMipNearest,
            fixed_lod: Some(lod_plane),
        };
    }
    // At 2x magnification and beyond, blurring pixel edges helps nobody.
    if scale >= 2.0 {
        return TileSampling {
            filter: TileFilter::Nearest,
            fixed_lod: None,
        };
    }
    let filter = match user_mode {
        FilterMode::Nearest => TileFilter::Nearest,
        FilterMode::Bilinear => TileFilter::Linear,
        FilterMode::Trilinear => TileFilter::Trilinear,
        FilterMode::HighQuality => {
            if scale < 0.5 {
                TileFilter::LinearMipNearest
            } else {
                TileFilter::Linear
            }
        }
    };
    TileSampling {
        filter,
        fixed_lod: None,
    }
}
