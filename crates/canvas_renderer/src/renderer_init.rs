//! Pipeline, sampler and static resource construction.

use std::num::NonZeroU64;

use wgpu::util::DeviceExt;

use crate::{
    CanvasRenderer, CheckerUniforms, DrawUniforms, OverlayUniforms, UNIFORM_STRIDE,
};

const CHECKER_TEXTURE_SIZE: u32 = 32;
const CHECKER_LIGHT: [u8; 4] = [0xcc, 0xcc, 0xcc, 0xff];
const CHECKER_DARK: [u8; 4] = [0x99, 0x99, 0x99, 0xff];

/// Initial dynamic-uniform slot counts; both grow on demand.
const INITIAL_DRAW_SLOTS: u32 = 64;
const INITIAL_OVERLAY_SLOTS: u32 = 8;
const INITIAL_OVERLAY_VERTEX_BYTES: u64 = 4096;

fn uniform_entry(min_size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: NonZeroU64::new(min_size),
        },
        count: None,
    }
}

fn dynamic_uniform_bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    min_size: u64,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: NonZeroU64::new(min_size),
            }),
        }],
    })
}

fn checker_texture_pixels() -> Vec<u8> {
    let half = CHECKER_TEXTURE_SIZE / 2;
    let mut pixels = Vec::with_capacity((CHECKER_TEXTURE_SIZE * CHECKER_TEXTURE_SIZE * 4) as usize);
    for y in 0..CHECKER_TEXTURE_SIZE {
        for x in 0..CHECKER_TEXTURE_SIZE {
            let check = ((x / half) + (y / half)) % 2 == 0;
            pixels.extend_from_slice(if check { &CHECKER_LIGHT } else { &CHECKER_DARK });
        }
    }
    pixels
}

impl CanvasRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let tile_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("canvas_renderer.tile_draw"),
            source: wgpu::ShaderSource::Wgsl(include_str!("tile_draw.wgsl").into()),
        });
        let checkers_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("canvas_renderer.checkers"),
            source: wgpu::ShaderSource::Wgsl(include_str!("checkers.wgsl").into()),
        });
        let overlay_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("canvas_renderer.overlay"),
            source: wgpu::ShaderSource::Wgsl(include_str!("overlay.wgsl").into()),
        });

        let draw_uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("canvas_renderer.draw_uniforms.layout"),
            entries: &[uniform_entry(std::mem::size_of::<DrawUniforms>() as u64)],
        });
        let overlay_uniform_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("canvas_renderer.overlay_uniforms.layout"),
                entries: &[uniform_entry(std::mem::size_of::<OverlayUniforms>() as u64)],
            });

        let tile_texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("canvas_renderer.tile_texture.layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let checkers_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("canvas_renderer.checkers.layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<CheckerUniforms>() as u64
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let position_layout = wgpu::VertexBufferLayout {
            array_stride: 8,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x2,
                offset: 0,
                shader_location: 0,
            }],
        };
        let texcoord_layout = wgpu::VertexBufferLayout {
            array_stride: 8,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x2,
                offset: 0,
                shader_location: 1,
            }],
        };

        let alpha_target = [Some(wgpu::ColorTargetState {
            format: surface_format,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let opaque_target = [Some(wgpu::ColorTargetState {
            format: surface_format,
            blend: Some(wgpu::BlendState::REPLACE),
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let tile_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("canvas_renderer.tile.pipeline_layout"),
            bind_group_layouts: &[&draw_uniform_layout, &tile_texture_layout],
            immediate_size: 0,
        });
        let tile_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("canvas_renderer.tile.pipeline"),
            layout: Some(&tile_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &tile_shader,
                entry_point: Some("vs_tile"),
                compilation_options: Default::default(),
                buffers: &[position_layout.clone(), texcoord_layout],
            },
            fragment: Some(wgpu::FragmentState {
                module: &tile_shader,
                entry_point: Some("fs_tile"),
                compilation_options: Default::default(),
                targets: &alpha_target,
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let checkers_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("canvas_renderer.checkers.pipeline_layout"),
                bind_group_layouts: &[&checkers_layout],
                immediate_size: 0,
            });
        let checkers_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("canvas_renderer.checkers.pipeline"),
            layout: Some(&checkers_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &checkers_shader,
                entry_point: Some("vs_checkers"),
                compilation_options: Default::default(),
                buffers: &[position_layout.clone()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &checkers_shader,
                entry_point: Some("fs_checkers"),
                compilation_options: Default::default(),
                targets: &opaque_target,
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let overlay_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("canvas_renderer.overlay.pipeline_layout"),
                bind_group_layouts: &[&overlay_uniform_layout],
                immediate_size: 0,
            });
        let overlay_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("canvas_renderer.overlay.pipeline"),
            layout: Some(&overlay_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &overlay_shader,
                entry_point: Some("vs_overlay"),
                compilation_options: Default::default(),
                buffers: &[position_layout],
            },
            fragment: Some(wgpu::FragmentState {
                module: &overlay_shader,
                entry_point: Some("fs_overlay"),
                compilation_options: Default::default(),
                targets: &alpha_target,
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let draw_uniform_capacity = INITIAL_DRAW_SLOTS;
        let draw_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("canvas_renderer.draw_uniforms"),
            size: u64::from(draw_uniform_capacity) * UNIFORM_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let draw_uniform_bind_group = dynamic_uniform_bind_group(
            device,
            "canvas_renderer.draw_uniforms.bind_group",
            &draw_uniform_layout,
            &draw_uniform_buffer,
            std::mem::size_of::<DrawUniforms>() as u64,
        );

        let overlay_uniform_capacity = INITIAL_OVERLAY_SLOTS;
        let overlay_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("canvas_renderer.overlay_uniforms"),
            size: u64::from(overlay_uniform_capacity) * UNIFORM_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let overlay_uniform_bind_group = dynamic_uniform_bind_group(
            device,
            "canvas_renderer.overlay_uniforms.bind_group",
            &overlay_uniform_layout,
            &overlay_uniform_buffer,
            std::mem::size_of::<OverlayUniforms>() as u64,
        );

        let overlay_vertex_capacity = INITIAL_OVERLAY_VERTEX_BYTES;
        let overlay_vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("canvas_renderer.overlay_vertices"),
            size: overlay_vertex_capacity,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let checker_texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("canvas_renderer.checker_texture"),
                size: wgpu::Extent3d {
                    width: CHECKER_TEXTURE_SIZE,
                    height: CHECKER_TEXTURE_SIZE,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &checker_texture_pixels(),
        );
        let checker_view = checker_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let checker_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("canvas_renderer.checker_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let checkers_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("canvas_renderer.checkers_uniforms"),
            size: std::mem::size_of::<CheckerUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let checkers_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("canvas_renderer.checkers.bind_group"),
            layout: &checkers_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: checkers_uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&checker_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&checker_sampler),
                },
            ],
        });

        let checkers_vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("canvas_renderer.checkers_vertices"),
            size: 6 * 8,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler_nearest = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("canvas_renderer.sampler_nearest"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });
        let sampler_linear = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("canvas_renderer.sampler_linear"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            // Base plane only; mip selection is clamped off.
            lod_max_clamp: 0.0,
            ..Default::default()
        });
        let sampler_trilinear = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("canvas_renderer.sampler_trilinear"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });
        let sampler_mip_nearest = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("canvas_renderer.sampler_mip_nearest"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        Self {
            surface_format,
            tile_pipeline,
            checkers_pipeline,
            overlay_pipeline,
            tile_texture_layout,
            draw_uniform_buffer,
            draw_uniform_bind_group,
            draw_uniform_layout,
            draw_uniform_capacity,
            overlay_uniform_buffer,
            overlay_uniform_bind_group,
            overlay_uniform_layout,
            overlay_uniform_capacity,
            overlay_vertex_buffer,
            overlay_vertex_capacity,
            checkers_uniform_buffer,
            checkers_bind_group,
            checkers_vertex_buffer,
            sampler_nearest,
            sampler_linear,
            sampler_trilinear,
            sampler_mip_nearest,
            frame_fence: None,
        }
    }

    /// Grows the per-tile dynamic uniform buffer to hold `slots` entries.
    pub(crate) fn ensure_draw_uniform_capacity(&mut self, device: &wgpu::Device, slots: u32) {
        if slots <= self.draw_uniform_capacity {
            return;
        }
        let new_capacity = slots.next_power_of_two();
        self.draw_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("canvas_renderer.draw_uniforms"),
            size: u64::from(new_capacity) * UNIFORM_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.draw_uniform_bind_group = dynamic_uniform_bind_group(
            device,
            "canvas_renderer.draw_uniforms.bind_group",
            &self.draw_uniform_layout,
            &self.draw_uniform_buffer,
            std::mem::size_of::<DrawUniforms>() as u64,
        );
        self.draw_uniform_capacity = new_capacity;
    }

    pub(crate) fn ensure_overlay_capacity(
        &mut self,
        device: &wgpu::Device,
        slots: u32,
        vertex_bytes: u64,
    ) {
        if slots > self.overlay_uniform_capacity {
            let new_capacity = slots.next_power_of_two();
            self.overlay_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("canvas_renderer.overlay_uniforms"),
                size: u64::from(new_capacity) * UNIFORM_STRIDE,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.overlay_uniform_bind_group = dynamic_uniform_bind_group(
                device,
                "canvas_renderer.overlay_uniforms.bind_group",
                &self.overlay_uniform_layout,
                &self.overlay_uniform_buffer,
                std::mem::size_of::<OverlayUniforms>() as u64,
            );
            self.overlay_uniform_capacity = new_capacity;
        }
        if vertex_bytes > self.overlay_vertex_capacity {
            let new_capacity = vertex_bytes.next_power_of_two();
            self.overlay_vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("canvas_renderer.overlay_vertices"),
                size: new_capacity,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.overlay_vertex_capacity = new_capacity;
        }
    }
}
