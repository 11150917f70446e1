//! GPU capability probe.
//!
//! Format negotiation and mipmap support decisions branch on this struct
//! only, never on `wgpu` directly, so the fallback chains stay testable
//! without a device.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuCapabilities {
    pub max_texture_size: u32,
    /// `Rgba16Unorm` requires the 16-bit-norm texture feature.
    pub supports_rgba16_unorm: bool,
    /// Whether `Rgba32Float` can be sampled with linear filtering.
    pub supports_float32_filterable: bool,
    pub supports_storage_rgba8: bool,
    pub supports_storage_rgba16_float: bool,
    pub supports_storage_rgba32_float: bool,
}

impl GpuCapabilities {
    pub fn from_device(device: &wgpu::Device) -> Self {
        let features = device.features();
        let limits = device.limits();
        Self {
            max_texture_size: limits.max_texture_dimension_2d,
            supports_rgba16_unorm: features.contains(wgpu::Features::TEXTURE_FORMAT_16BIT_NORM),
            supports_float32_filterable: features.contains(wgpu::Features::FLOAT32_FILTERABLE),
            // Rgba8Unorm, Rgba16Float and Rgba32Float write-only storage
            // are core WebGPU; Rgba16Unorm storage is not, which is why
            // 16-bit integer tiles cannot always carry mipmaps.
            supports_storage_rgba8: true,
            supports_storage_rgba16_float: true,
            supports_storage_rgba32_float: true,
        }
    }

    /// Baseline WebGPU guarantees. Used by tests and as a conservative
    /// fallback when no adapter has been probed yet.
    pub fn baseline() -> Self {
        Self {
            max_texture_size: 8192,
            supports_rgba16_unorm: false,
            supports_float32_filterable: false,
            supports_storage_rgba8: true,
            supports_storage_rgba16_float: true,
            supports_storage_rgba32_float: true,
        }
    }

    /// Everything on, for exercising the widest negotiation paths in tests.
    pub fn all_features() -> Self {
        Self {
            max_texture_size: 16384,
            supports_rgba16_unorm: true,
            supports_float32_filterable: true,
            supports_storage_rgba8: true,
            supports_storage_rgba16_float: true,
            supports_storage_rgba32_float: true,
        }
    }

    pub fn supports_storage_binding(&self, format: wgpu::TextureFormat) -> bool {
        match format {
            wgpu::TextureFormat::Rgba8Unorm => self.supports_storage_rgba8,
            wgpu::TextureFormat::Rgba16Float => self.supports_storage_rgba16_float,
            wgpu::TextureFormat::Rgba32Float => self.supports_storage_rgba32_float,
            _ => false,
        }
    }
}
