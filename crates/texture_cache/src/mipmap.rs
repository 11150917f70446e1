//! Mipmap plane regeneration.
//!
//! A 2x2 box-filter compute pass producing each mip plane from the one
//! above it. One generator is built per negotiated tile format; formats
//! without storage-binding support simply have no generator, and the
//! filtering mode degrades to non-mipmapped sampling.

use std::fmt;

use crate::GpuCapabilities;

const DOWNSAMPLE_TEMPLATE: &str = r#"
@group(0) @binding(0) var source_plane: texture_2d<f32>;
@group(0) @binding(1) var target_plane: texture_storage_2d<{{STORAGE_FORMAT}}, write>;

@compute @workgroup_size(8, 8, 1)
fn cs_downsample(@builtin(global_invocation_id) id: vec3<u32>) {
    let target_size = textureDimensions(target_plane);
    if (id.x >= target_size.x || id.y >= target_size.y) {
        return;
    }
    let source_size = textureDimensions(source_plane);
    let base = vec2<u32>(id.x * 2u, id.y * 2u);
    let x1 = min(base.x + 1u, source_size.x - 1u);
    let y1 = min(base.y + 1u, source_size.y - 1u);
    let texel = (textureLoad(source_plane, vec2<u32>(base.x, base.y), 0)
        + textureLoad(source_plane, vec2<u32>(x1, base.y), 0)
        + textureLoad(source_plane, vec2<u32>(base.x, y1), 0)
        + textureLoad(source_plane, vec2<u32>(x1, y1), 0)) * 0.25;
    textureStore(target_plane, vec2<u32>(id.x, id.y), texel);
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipmapGeneratorError {
    StorageBindingUnsupported(wgpu::TextureFormat),
}

impl fmt::Display for MipmapGeneratorError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MipmapGeneratorError::StorageBindingUnsupported(format) => {
                write!(
                    formatter,
                    "tile format {format:?} does not support storage binding for mipmap generation"
                )
            }
        }
    }
}

impl std::error::Error for MipmapGeneratorError {}

fn wgsl_storage_format(format: wgpu::TextureFormat) -> Option<&'static str> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm => Some("rgba8unorm"),
        wgpu::TextureFormat::Rgba16Float => Some("rgba16float"),
        wgpu::TextureFormat::Rgba32Float => Some("rgba32float"),
        _ => None,
    }
}

/// Number of planes a full chain needs for a square tile of `size` texels.
pub fn full_mip_level_count(size: u32) -> u32 {
    assert!(size > 0, "tile size must be positive");
    32 - size.leading_zeros()
}

#[derive(Debug)]
pub struct MipmapGenerator {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
}

impl MipmapGenerator {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        caps: &GpuCapabilities,
    ) -> Result<Self, MipmapGeneratorError> {
        let storage_format = wgsl_storage_format(format)
            .filter(|_| caps.supports_storage_binding(format))
            .ok_or(MipmapGeneratorError::StorageBindingUnsupported(format))?;

        let source = DOWNSAMPLE_TEMPLATE.replace("{{STORAGE_FORMAT}}", storage_format);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("texture_cache.mipmap.downsample"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture_cache.mipmap.layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("texture_cache.mipmap.pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("texture_cache.mipmap.pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("cs_downsample"),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            pipeline,
            bind_group_layout,
            format,
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Regenerates planes `1..mip_level_count` of `texture` from plane 0.
    pub fn generate(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture: &wgpu::Texture,
        texture_size: u32,
        mip_level_count: u32,
    ) {
        assert_eq!(
            texture.format(),
            self.format,
            "mipmap generator format mismatch"
        );
        if mip_level_count < 2 {
            return;
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("texture_cache.mipmap.encoder"),
        });

        let mut plane_size = texture_size;
        for level in 1..mip_level_count {
            let source_view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("texture_cache.mipmap.source"),
                base_mip_level: level - 1,
                mip_level_count: Some(1),
                ..Default::default()
            });
            let target_view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("texture_cache.mipmap.target"),
                base_mip_level: level,
                mip_level_count: Some(1),
                ..Default::default()
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("texture_cache.mipmap.bind_group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&source_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&target_view),
                    },
                ],
            });

            plane_size = (plane_size / 2).max(1);
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("texture_cache.mipmap.pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(plane_size.div_ceil(8), plane_size.div_ceil(8), 1);
            }
        }

        queue.submit(Some(encoder.finish()));
    }
}
