//! Shared plain-data types exchanged between the texture cache and the
//! canvas renderer, plus the collaborator traits implemented by the
//! CPU-side compositing engine and the color-management layer.

use std::ops::{BitOr, BitOrAssign};

/// A rectangle in image pixels. The origin may be negative: wrap-around
/// viewing and non-zero image offsets both produce rects outside the
/// stored image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ImageRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// One past the rightmost pixel column.
    pub fn right(self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// One past the bottommost pixel row.
    pub fn bottom(self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    pub fn contains_point(self, x: i32, y: i32) -> bool {
        i64::from(x) >= i64::from(self.x)
            && i64::from(x) < self.right()
            && i64::from(y) >= i64::from(self.y)
            && i64::from(y) < self.bottom()
    }

    pub fn intersect(self, other: ImageRect) -> ImageRect {
        let left = i64::from(self.x).max(i64::from(other.x));
        let top = i64::from(self.y).max(i64::from(other.y));
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return ImageRect::default();
        }
        ImageRect {
            x: i32::try_from(left).expect("intersection x exceeds i32"),
            y: i32::try_from(top).expect("intersection y exceeds i32"),
            width: u32::try_from(right - left).expect("intersection width exceeds u32"),
            height: u32::try_from(bottom - top).expect("intersection height exceeds u32"),
        }
    }

    pub fn translated(self, dx: i32, dy: i32) -> ImageRect {
        ImageRect {
            x: self
                .x
                .checked_add(dx)
                .expect("translated rect x overflow"),
            y: self
                .y
                .checked_add(dy)
                .expect("translated rect y overflow"),
            ..self
        }
    }

    /// Expands the rect by `border` pixels on every side. Used to stretch a
    /// dirty rect across tile overlap stripes so neighbouring tiles are
    /// included in an update.
    pub fn stretched(self, border: u32) -> ImageRect {
        let border_i32 = i32::try_from(border).expect("border exceeds i32");
        ImageRect {
            x: self
                .x
                .checked_sub(border_i32)
                .expect("stretched rect x underflow"),
            y: self
                .y
                .checked_sub(border_i32)
                .expect("stretched rect y underflow"),
            width: self
                .width
                .checked_add(border * 2)
                .expect("stretched rect width overflow"),
            height: self
                .height
                .checked_add(border * 2)
                .expect("stretched rect height overflow"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub origin_x: u32,
    pub origin_y: u32,
    pub width: u32,
    pub height: u32,
}

/// Which axes the infinite-canvas viewing mode repeats the image along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapAroundAxis {
    Both,
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Bilinear,
    Trilinear,
    HighQuality,
}

impl FilterMode {
    pub fn needs_mipmaps(self) -> bool {
        matches!(self, FilterMode::Trilinear | FilterMode::HighQuality)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorModel {
    Rgba,
    Gray,
    Cmyk,
    Lab,
    Xyz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorDepth {
    Integer8,
    Integer16,
    Float16,
    Float32,
}

impl ColorDepth {
    pub const fn bytes_per_channel(self) -> u32 {
        match self {
            ColorDepth::Integer8 => 1,
            ColorDepth::Integer16 | ColorDepth::Float16 => 2,
            ColorDepth::Float32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingColorSpace {
    pub model: ColorModel,
    pub depth: ColorDepth,
}

impl WorkingColorSpace {
    pub const fn new(model: ColorModel, depth: ColorDepth) -> Self {
        Self { model, depth }
    }

    pub const fn channel_count(self) -> u32 {
        match self.model {
            ColorModel::Rgba => 4,
            ColorModel::Gray => 2,
            ColorModel::Cmyk => 5,
            ColorModel::Lab | ColorModel::Xyz => 4,
        }
    }

    pub const fn pixel_size(self) -> u32 {
        self.channel_count() * self.depth.bytes_per_channel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingIntent {
    Perceptual,
    RelativeColorimetric,
    Saturation,
    AbsoluteColorimetric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionFlags {
    bits: u8,
}

impl ConversionFlags {
    const HIGH_QUALITY_BIT: u8 = 1 << 0;
    const BLACK_POINT_COMPENSATION_BIT: u8 = 1 << 1;
    const NO_OPTIMIZATION_BIT: u8 = 1 << 2;
    const SOFT_PROOFING_BIT: u8 = 1 << 3;

    pub const HIGH_QUALITY: Self = Self {
        bits: Self::HIGH_QUALITY_BIT,
    };
    pub const BLACK_POINT_COMPENSATION: Self = Self {
        bits: Self::BLACK_POINT_COMPENSATION_BIT,
    };
    pub const NO_OPTIMIZATION: Self = Self {
        bits: Self::NO_OPTIMIZATION_BIT,
    };
    pub const SOFT_PROOFING: Self = Self {
        bits: Self::SOFT_PROOFING_BIT,
    };

    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub const fn contains(self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }
}

impl BitOr for ConversionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

impl BitOrAssign for ConversionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.bits |= rhs.bits;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorProfile {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProofingConfig {
    pub model: ColorModel,
    pub depth: ColorDepth,
    pub intent: RenderingIntent,
    pub conversion_flags: ConversionFlags,
    pub warning_color: [f32; 4],
}

/// Read access to the CPU-side composited image. Implemented by the
/// compositing engine; the texture cache only ever reads through this.
///
/// `read_rect` fills `out` with tightly packed row-major pixels for `rect`
/// in the image's working color space. `rect` is in full-resolution image
/// coordinates and is guaranteed to lie inside `bounds()` by the caller; at
/// a non-zero level of detail the produced pixels are the compositor's
/// downscaled plane, `rect.width >> lod` by `rect.height >> lod` of them.
pub trait ProjectionSource {
    fn bounds(&self) -> ImageRect;

    fn color_space(&self) -> WorkingColorSpace;

    /// Level of detail the compositor is currently producing. Non-zero
    /// during interactive preview; patches carry this level so tiles can
    /// target the matching mipmap plane directly.
    fn current_level_of_detail(&self) -> u32 {
        0
    }

    fn read_rect(&self, rect: ImageRect, out: &mut Vec<u8>);
}

/// External color-management math. The cache decides *whether* to convert;
/// this trait owns *how*.
pub trait DisplayConverter {
    fn convert(
        &self,
        bytes: &mut Vec<u8>,
        pixel_count: usize,
        from: WorkingColorSpace,
        to: WorkingColorSpace,
        intent: RenderingIntent,
        flags: ConversionFlags,
    );

    /// Whether an OpenColorIO-style external display chain is active. When
    /// it is, channel-isolation swizzles are deferred downstream instead of
    /// being applied at the tile level.
    fn external_management_active(&self) -> bool {
        false
    }
}
