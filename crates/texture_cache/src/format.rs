//! Tile texture format negotiation.
//!
//! Picks the narrowest GPU pixel format the device supports for a given
//! working color space, walking a fixed preference order: 8-bit integer,
//! 16-bit integer, 16-bit float, 32-bit float. Failures never propagate;
//! each step degrades to the next viable candidate.

use canvas_protocol::{ColorDepth, ColorModel, WorkingColorSpace};

use crate::GpuCapabilities;

/// The physical layout every tile in a grid shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileTextureFormat {
    pub format: wgpu::TextureFormat,
    pub bytes_per_pixel: u32,
    /// Color space tiles are resident in. May differ from the image's
    /// working space; update ingestion converts on the way in.
    pub destination: WorkingColorSpace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatNegotiation {
    pub tile_format: TileTextureFormat,
    /// Set when external color management was requested but the image's
    /// color model cannot ride an RGBA texture without internal conversion.
    /// The grid manager logs this as a policy override.
    pub forced_internal_color_management: bool,
}

fn rgba8() -> TileTextureFormat {
    TileTextureFormat {
        format: wgpu::TextureFormat::Rgba8Unorm,
        bytes_per_pixel: 4,
        destination: WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer8),
    }
}

fn rgba16_unorm() -> TileTextureFormat {
    TileTextureFormat {
        format: wgpu::TextureFormat::Rgba16Unorm,
        bytes_per_pixel: 8,
        destination: WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Integer16),
    }
}

fn rgba16_float() -> TileTextureFormat {
    TileTextureFormat {
        format: wgpu::TextureFormat::Rgba16Float,
        bytes_per_pixel: 8,
        destination: WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Float16),
    }
}

fn rgba32_float() -> TileTextureFormat {
    TileTextureFormat {
        format: wgpu::TextureFormat::Rgba32Float,
        bytes_per_pixel: 16,
        destination: WorkingColorSpace::new(ColorModel::Rgba, ColorDepth::Float32),
    }
}

/// Negotiates the tile-resident format for `image_space`.
///
/// `external_management_requested` is the OCIO-style display chain flag;
/// non-RGBA images cannot use it, which forces internal management back on.
pub fn negotiate_tile_format(
    image_space: WorkingColorSpace,
    hdr_requested: bool,
    external_management_requested: bool,
    caps: &GpuCapabilities,
) -> FormatNegotiation {
    let tile_format = match (image_space.model, image_space.depth) {
        (ColorModel::Rgba, ColorDepth::Integer8) => {
            if hdr_requested {
                // 8-bit sources shown on an HDR surface go through a half
                // float plane so the display transform has headroom.
                rgba16_float()
            } else {
                rgba8()
            }
        }
        (ColorModel::Rgba, ColorDepth::Integer16) => {
            if caps.supports_rgba16_unorm && !hdr_requested {
                rgba16_unorm()
            } else {
                rgba16_float()
            }
        }
        (ColorModel::Rgba, ColorDepth::Float16) => rgba16_float(),
        (ColorModel::Rgba, ColorDepth::Float32) => {
            if caps.supports_float32_filterable {
                rgba32_float()
            } else {
                // Unfilterable tiles would break every sampling mode, so
                // step down to half float.
                rgba16_float()
            }
        }
        // Non-RGBA models always convert to an RGBA destination; pick the
        // narrowest depth that preserves the source precision.
        (_, ColorDepth::Integer8) => rgba8(),
        (_, ColorDepth::Integer16) => {
            if caps.supports_rgba16_unorm {
                rgba16_unorm()
            } else {
                rgba16_float()
            }
        }
        (_, ColorDepth::Float16) => rgba16_float(),
        (_, ColorDepth::Float32) => {
            if caps.supports_float32_filterable {
                rgba32_float()
            } else {
                rgba16_float()
            }
        }
    };

    let forced_internal_color_management =
        external_management_requested && image_space.model != ColorModel::Rgba;

    FormatNegotiation {
        tile_format,
        forced_internal_color_management,
    }
}
