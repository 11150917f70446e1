//! Per-frame recording: uniform packing, tile pass, auxiliary passes.

use canvas_protocol::{ImageRect, Viewport};
use texture_cache::{CompletionFence, ImageTextures, VERTICES_PER_TILE};

use crate::tiling::{select_tile_sampling, visible_tile_spans, TileSampling};
use crate::{
    scissor_for, CanvasRenderer, CheckerUniforms, DrawUniforms, OutlinePath, OverlayUniforms,
    ViewState, UNIFORM_STRIDE,
};

/// Inputs for one frame.
pub struct FrameParams<'a> {
    pub textures: &'a mut ImageTextures,
    pub view: &'a ViewState,
    /// Widget-space clip; `None` redraws the whole widget.
    pub clip: Option<Viewport>,
    /// Tool outlines in image coordinates, drawn above everything.
    pub outlines: &'a [OutlinePath],
    /// Suppress mipmap regeneration (mid-stroke fast path).
    pub block_mipmap_regeneration: bool,
}

/// One tile quad ready for the render pass.
struct TileDraw {
    first_vertex: u32,
    uniform_slot: u32,
    bind_group: wgpu::BindGroup,
}

/// One overlay line-list batch sharing a uniform slot.
struct OverlaySlice {
    uniform_slot: u32,
    vertex_range: std::ops::Range<u32>,
}

/// Column-major map from image coordinates to clip space, with the image
/// translated by one clone offset.
fn image_to_clip(view: &ViewState, offset_x: f32, offset_y: f32) -> [f32; 16] {
    let (vw, vh) = (view.widget_size.0 as f32, view.widget_size.1 as f32);
    let (zx, zy) = view.zoom;
    let sx = 2.0 * zx / vw;
    let sy = -2.0 * zy / vh;
    let tx = 2.0 * zx * (offset_x - view.pan.0) / vw - 1.0;
    let ty = 1.0 - 2.0 * zy * (offset_y - view.pan.1) / vh;
    [
        sx, 0.0, 0.0, 0.0, //
        0.0, sy, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        tx, ty, 0.0, 1.0,
    ]
}

/// Column-major map from widget pixels to clip space.
fn widget_to_clip(view: &ViewState) -> [f32; 16] {
    let (vw, vh) = (view.widget_size.0 as f32, view.widget_size.1 as f32);
    [
        2.0 / vw,
        0.0,
        0.0,
        0.0,
        0.0,
        -2.0 / vh,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
        0.0,
        -1.0,
        1.0,
        0.0,
        1.0,
    ]
}

/// Image rect covered by the widget at the current pan and zoom.
fn visible_image_rect(view: &ViewState) -> ImageRect {
    let (zx, zy) = view.zoom;
    if zx <= 0.0 || zy <= 0.0 {
        return ImageRect::new(0, 0, 0, 0);
    }
    let left = view.pan.0.floor() as i32;
    let top = view.pan.1.floor() as i32;
    let right = (view.pan.0 + view.widget_size.0 as f32 / zx).ceil() as i64;
    let bottom = (view.pan.1 + view.widget_size.1 as f32 / zy).ceil() as i64;
    let width = (right - i64::from(left)).max(0) as u32;
    let height = (bottom - i64::from(top)).max(0) as u32;
    ImageRect::new(left, top, width, height)
}

impl CanvasRenderer {
    /// Records and submits one frame into `target`, then arms the frame
    /// fence for [`is_frame_in_flight`](Self::is_frame_in_flight).
    pub fn draw_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &wgpu::TextureView,
        params: FrameParams<'_>,
    ) {
        let view = params.view;
        if view.widget_size.0 == 0 || view.widget_size.1 == 0 {
            return;
        }

        let textures = params.textures;
        let bounds = textures.stored_image_bounds();
        let effective_size = textures.tile_geometry().effective_size();
        let visible = visible_image_rect(view);
        let spans = visible_tile_spans(visible, bounds, effective_size, view.wrap_around);

        let scale = view.zoom.0.max(view.zoom.1);
        let user_mode = textures.effective_filter();

        // Phase one walks the spans mutably: mipmap regeneration and LOD
        // plane selection need `&mut` tiles. Bind group creation waits for
        // phase two so the texture views can be borrowed immutably.
        let mut pending: Vec<(u32, u32, u32, TileSampling)> = Vec::new();
        let mut uniforms: Vec<DrawUniforms> = Vec::new();
        for span in &spans {
            let offset_x = bounds.width as f32 * span.clone_x as f32;
            let offset_y = bounds.height as f32 * span.clone_y as f32;
            let mvp = image_to_clip(view, offset_x, offset_y);
            for (col, row) in span.tiles() {
                let (tile, mut ctx) = textures.draw_context(device, queue, col, row);
                let lod_plane = tile.prepare_for_draw(&mut ctx, params.block_mipmap_regeneration);
                let sampling = select_tile_sampling(user_mode, lod_plane, scale);
                let slot = uniforms.len() as u32;
                uniforms.push(DrawUniforms {
                    mvp,
                    fixed_lod: sampling.fixed_lod.map_or(-1.0, |lod| lod as f32),
                    _pad: [0.0; 3],
                });
                pending.push((col, row, slot, sampling));
            }
        }

        self.ensure_draw_uniform_capacity(device, uniforms.len() as u32);
        for (slot, uniform) in uniforms.iter().enumerate() {
            queue.write_buffer(
                &self.draw_uniform_buffer,
                slot as u64 * UNIFORM_STRIDE,
                bytemuck::bytes_of(uniform),
            );
        }

        let tile_draws: Vec<TileDraw> = pending
            .into_iter()
            .map(|(col, row, slot, sampling)| {
                let tile = textures.texture_tile_cr(col, row);
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("canvas_renderer.tile.bind_group"),
                    layout: &self.tile_texture_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(tile.texture_view()),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(
                                self.sampler_for(sampling.filter),
                            ),
                        },
                    ],
                });
                TileDraw {
                    first_vertex: textures.tile_buffer_index_cr(col, row),
                    uniform_slot: slot,
                    bind_group,
                }
            })
            .collect();

        self.write_checker_state(queue, view);
        let overlay_slices = self.prepare_overlay(device, queue, view, bounds, visible, params.outlines);

        let scissor = scissor_for(params.clip, view.widget_size);
        let [br, bg, bb, ba] = view.background_color;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("canvas_renderer.frame"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("canvas_renderer.frame.pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: br,
                            g: bg,
                            b: bb,
                            a: ba,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            if scissor.width == 0 || scissor.height == 0 {
                drop(pass);
                queue.submit([encoder.finish()]);
                self.frame_fence = Some(CompletionFence::record(queue));
                return;
            }
            pass.set_scissor_rect(scissor.origin_x, scissor.origin_y, scissor.width, scissor.height);

            pass.set_pipeline(&self.checkers_pipeline);
            pass.set_bind_group(0, &self.checkers_bind_group, &[]);
            pass.set_vertex_buffer(0, self.checkers_vertex_buffer.slice(..));
            pass.draw(0..6, 0..1);

            pass.set_pipeline(&self.tile_pipeline);
            pass.set_vertex_buffer(0, textures.tile_vertex_buffer().slice(..));
            pass.set_vertex_buffer(1, textures.tile_texcoord_buffer().slice(..));
            for draw in &tile_draws {
                let offset = u32::try_from(u64::from(draw.uniform_slot) * UNIFORM_STRIDE)
                    .expect("uniform offset exceeds u32");
                pass.set_bind_group(0, &self.draw_uniform_bind_group, &[offset]);
                pass.set_bind_group(1, &draw.bind_group, &[]);
                let first = draw.first_vertex;
                pass.draw(first..first + VERTICES_PER_TILE, 0..1);
            }

            if !overlay_slices.is_empty() {
                pass.set_pipeline(&self.overlay_pipeline);
                pass.set_vertex_buffer(0, self.overlay_vertex_buffer.slice(..));
                for slice in &overlay_slices {
                    let offset = u32::try_from(u64::from(slice.uniform_slot) * UNIFORM_STRIDE)
                        .expect("uniform offset exceeds u32");
                    pass.set_bind_group(0, &self.overlay_uniform_bind_group, &[offset]);
                    pass.draw(slice.vertex_range.clone(), 0..1);
                }
            }
        }

        queue.submit([encoder.finish()]);
        self.frame_fence = Some(CompletionFence::record(queue));
    }

    fn write_checker_state(&self, queue: &wgpu::Queue, view: &ViewState) {
        let (vw, vh) = (view.widget_size.0 as f32, view.widget_size.1 as f32);
        let quad: [f32; 12] = [
            0.0, 0.0, vw, 0.0, 0.0, vh, //
            0.0, vh, vw, 0.0, vw, vh,
        ];
        queue.write_buffer(
            &self.checkers_vertex_buffer,
            0,
            bytemuck::cast_slice(&quad),
        );

        // One checker texture period covers two squares.
        let period = 2.0 * view.checker_size.max(1.0);
        let scale = [1.0 / period, 1.0 / period];
        let offset = if view.scroll_checkers {
            // Anchor the pattern to the image origin instead of the widget.
            let origin_x = -view.pan.0 * view.zoom.0;
            let origin_y = -view.pan.1 * view.zoom.1;
            [-origin_x * scale[0], -origin_y * scale[1]]
        } else {
            [0.0, 0.0]
        };
        let uniforms = CheckerUniforms {
            mvp: widget_to_clip(view),
            uv_transform: [scale[0], scale[1], offset[0], offset[1]],
        };
        queue.write_buffer(
            &self.checkers_uniform_buffer,
            0,
            bytemuck::bytes_of(&uniforms),
        );
    }

    /// Builds the pixel-grid and outline line lists into the shared
    /// overlay vertex buffer. Both live in image coordinates of clone 0.
    fn prepare_overlay(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        view: &ViewState,
        bounds: ImageRect,
        visible: ImageRect,
        outlines: &[OutlinePath],
    ) -> Vec<OverlaySlice> {
        let mut vertices: Vec<f32> = Vec::new();
        let mut uniforms: Vec<OverlayUniforms> = Vec::new();
        let mut slices: Vec<OverlaySlice> = Vec::new();
        let mvp = image_to_clip(view, 0.0, 0.0);

        let grid_zoom = view.zoom.0.min(view.zoom.1);
        if view.pixel_grid_enabled && grid_zoom >= view.pixel_grid_threshold {
            let area = visible.intersect(bounds);
            if !area.is_empty() {
                let start = vertices.len() as u32 / 2;
                let (left, top) = (area.x as f32, area.y as f32);
                let (right, bottom) = (area.right() as f32, area.bottom() as f32);
                for x in area.x..=area.right() as i32 {
                    vertices.extend_from_slice(&[x as f32, top, x as f32, bottom]);
                }
                for y in area.y..=area.bottom() as i32 {
                    vertices.extend_from_slice(&[left, y as f32, right, y as f32]);
                }
                let end = vertices.len() as u32 / 2;
                slices.push(OverlaySlice {
                    uniform_slot: uniforms.len() as u32,
                    vertex_range: start..end,
                });
                uniforms.push(OverlayUniforms {
                    mvp,
                    color: view.pixel_grid_color,
                });
            }
        }

        for outline in outlines {
            if outline.points.len() < 2 {
                continue;
            }
            let start = vertices.len() as u32 / 2;
            for pair in outline.points.windows(2) {
                vertices.extend_from_slice(&pair[0]);
                vertices.extend_from_slice(&pair[1]);
            }
            if outline.closed {
                let first = outline.points[0];
                let last = outline.points[outline.points.len() - 1];
                vertices.extend_from_slice(&last);
                vertices.extend_from_slice(&first);
            }
            let end = vertices.len() as u32 / 2;
            slices.push(OverlaySlice {
                uniform_slot: uniforms.len() as u32,
                vertex_range: start..end,
            });
            uniforms.push(OverlayUniforms {
                mvp,
                color: outline.color,
            });
        }

        if slices.is_empty() {
            return slices;
        }

        self.ensure_overlay_capacity(
            device,
            uniforms.len() as u32,
            (vertices.len() * std::mem::size_of::<f32>()) as u64,
        );
        queue.write_buffer(&self.overlay_vertex_buffer, 0, bytemuck::cast_slice(&vertices));
        for (slot, uniform) in uniforms.iter().enumerate() {
            queue.write_buffer(
                &self.overlay_uniform_buffer,
                slot as u64 * UNIFORM_STRIDE,
                bytemuck::bytes_of(uniform),
            );
        }
        slices
    }
}
