//! One grid cell of the image: a fixed-size GPU texture with a border
//! overlap and a per-tile mipmap freshness state machine.

use canvas_protocol::{FilterMode, ImageRect};

use crate::format::TileTextureFormat;
use crate::mipmap::MipmapGenerator;
use crate::transfer_pool::TransferBufferPool;
use crate::update_info::{BoundaryEdges, TileUpdateInfo};

/// Shared, immutable geometry of every tile in a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    /// Physical texture edge length in texels. Square tiles only.
    pub texture_size: u32,
    /// Overlap added on every side so seam filtering samples neighbor data.
    pub border: u32,
    pub format: TileTextureFormat,
    pub mip_level_count: u32,
}

impl TileGeometry {
    pub fn effective_size(&self) -> u32 {
        let shrink = self
            .border
            .checked_mul(2)
            .expect("tile border overflows u32");
        assert!(
            self.texture_size > shrink,
            "tile texture size {} leaves no effective area inside border {}",
            self.texture_size,
            self.border
        );
        self.texture_size - shrink
    }

    /// Bytes of one whole tile as a buffer-to-texture source, rows padded
    /// to the copy alignment. Staging buffers are sized from this so an
    /// entire-tile refresh still goes through the pool.
    pub fn tile_byte_size(&self) -> u64 {
        let row_bytes = u64::from(self.texture_size) * u64::from(self.format.bytes_per_pixel);
        let alignment = u64::from(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        row_bytes.div_ceil(alignment) * alignment * u64::from(self.texture_size)
    }
}

/// Mipmap freshness of one tile.
///
/// `Clean { level: 0 }` means the full chain matches the latest level-0
/// upload. `Clean { level: k > 0 }` means a patch was written directly to
/// plane `k` and only that plane is trustworthy. `MipmapsDirty` means
/// level 0 changed and dependent planes are stale until the next draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LodState {
    Clean { level: u32 },
    MipmapsDirty,
}

/// Per-call GPU handles threaded through tile operations so tiles do not
/// hold device references themselves.
pub struct TileUploadContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub pool: Option<&'a mut TransferBufferPool>,
    pub mipmaps: Option<&'a MipmapGenerator>,
}

#[derive(Debug)]
pub struct TextureTile {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    /// Effective (border-excluded) area in image pixels.
    image_rect: ImageRect,
    /// The same area in normalized texture coordinates, border offset in.
    texture_rect: [f32; 4],
    geometry: TileGeometry,
    filter_mode: FilterMode,
    lod_state: LodState,
}

impl TextureTile {
    /// Allocates the tile texture and seeds it with `fill_pixels`, one
    /// texel's worth of bytes replicated across the whole tile.
    pub fn new(
        ctx: &mut TileUploadContext<'_>,
        image_rect: ImageRect,
        geometry: TileGeometry,
        fill_pixels: &[u8],
        filter_mode: FilterMode,
    ) -> Self {
        assert_eq!(
            fill_pixels.len(),
            geometry.format.bytes_per_pixel as usize,
            "fill data must be exactly one texel"
        );
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if ctx.mipmaps.is_some() {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texture_cache.tile"),
            size: wgpu::Extent3d {
                width: geometry.texture_size,
                height: geometry.texture_size,
                depth_or_array_layers: 1,
            },
            mip_level_count: geometry.mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: geometry.format.format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let texture_rect = normalized_texture_rect(&geometry, &image_rect);
        let mut tile = Self {
            texture,
            view,
            image_rect,
            texture_rect,
            geometry,
            filter_mode,
            lod_state: LodState::Clean { level: 0 },
        };

        let texel_count = (geometry.texture_size as usize) * (geometry.texture_size as usize);
        let mut seed = Vec::with_capacity(texel_count * fill_pixels.len());
        for _ in 0..texel_count {
            seed.extend_from_slice(fill_pixels);
        }
        tile.upload_full(ctx, &seed, 0);
        if filter_mode.needs_mipmaps() {
            tile.lod_state = LodState::MipmapsDirty;
        }
        tile
    }

    pub fn image_rect(&self) -> ImageRect {
        self.image_rect
    }

    /// Normalized UV rectangle `[x, y, w, h]` of the effective area.
    pub fn texture_rect(&self) -> [f32; 4] {
        self.texture_rect
    }

    pub fn texture_view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn lod_state(&self) -> LodState {
        self.lod_state
    }

    /// Runtime filter switch. Entering a mipmapped mode marks the chain
    /// stale so the next draw regenerates it.
    pub fn set_filter_mode(&mut self, filter_mode: FilterMode) {
        if filter_mode.needs_mipmaps()
            && !self.filter_mode.needs_mipmaps()
            && self.geometry.mip_level_count > 1
        {
            self.lod_state = LodState::MipmapsDirty;
        }
        self.filter_mode = filter_mode;
    }

    /// Applies one patch descriptor.
    ///
    /// A level-0 partial patch landing on a tile still parked at a
    /// non-zero prepared plane first regenerates the full chain, so the
    /// partial upload never mixes with planes derived from older data.
    /// `block_mipmap_regeneration` suppresses that eager pass mid-stroke;
    /// callers force one regeneration once editing settles.
    pub fn update(
        &mut self,
        ctx: &mut TileUploadContext<'_>,
        info: &TileUpdateInfo,
        block_mipmap_regeneration: bool,
    ) {
        assert!(info.is_valid(), "zero-sized tile patch");
        // A patch deeper than the allocated chain has nowhere to land;
        // the tile keeps its current content.
        if info.patch_level_of_detail >= self.geometry.mip_level_count {
            return;
        }
        let plane_size = (self.geometry.texture_size >> info.patch_level_of_detail).max(1);
        assert!(
            info.patch_offset_x + info.patch_width <= plane_size
                && info.patch_offset_y + info.patch_height <= plane_size,
            "tile patch exceeds texture storage rect"
        );

        if !block_mipmap_regeneration
            && info.patch_level_of_detail == 0
            && !info.entire_tile
            && matches!(self.lod_state, LodState::Clean { level } if level > 0)
        {
            self.regenerate_mipmaps(ctx);
        }

        if info.entire_tile && info.patch_level_of_detail == 0 && !info.boundary_edges.any() {
            self.upload_full(ctx, &info.pixels, 0);
        } else if info.boundary_edges.any() {
            // Patch offsets live in plane-k texels, so the border must be
            // scaled down to the same plane before padding.
            let plane_border = self.geometry.border >> info.patch_level_of_detail;
            let padded = pad_patch_edges(
                &info.pixels,
                info.patch_width,
                info.patch_height,
                self.geometry.format.bytes_per_pixel,
                plane_border,
                info.boundary_edges,
            );
            let offset_x = info
                .patch_offset_x
                .checked_sub(padded.shift_x)
                .expect("boundary patch does not reach the tile border");
            let offset_y = info
                .patch_offset_y
                .checked_sub(padded.shift_y)
                .expect("boundary patch does not reach the tile border");
            self.upload_region(
                ctx,
                &padded.pixels,
                offset_x,
                offset_y,
                padded.width,
                padded.height,
                info.patch_level_of_detail,
            );
        } else {
            self.upload_region(
                ctx,
                &info.pixels,
                info.patch_offset_x,
                info.patch_offset_y,
                info.patch_width,
                info.patch_height,
                info.patch_level_of_detail,
            );
        }

        self.lod_state = if info.patch_level_of_detail == 0 {
            if self.filter_mode.needs_mipmaps() {
                LodState::MipmapsDirty
            } else {
                LodState::Clean { level: 0 }
            }
        } else {
            LodState::Clean {
                level: info.patch_level_of_detail,
            }
        };
    }

    /// Called once per draw. Regenerates stale mipmaps unless suppressed
    /// and returns the LOD plane the shader should sample.
    pub fn prepare_for_draw(
        &mut self,
        ctx: &mut TileUploadContext<'_>,
        block_mipmap_regeneration: bool,
    ) -> u32 {
        match self.lod_state {
            LodState::Clean { level } => level,
            LodState::MipmapsDirty => {
                if !block_mipmap_regeneration {
                    self.regenerate_mipmaps(ctx);
                    self.lod_state = LodState::Clean { level: 0 };
                }
                0
            }
        }
    }

    fn regenerate_mipmaps(&mut self, ctx: &mut TileUploadContext<'_>) {
        if let Some(generator) = ctx.mipmaps.as_ref() {
            generator.generate(
                ctx.device,
                ctx.queue,
                &self.texture,
                self.geometry.texture_size,
                self.geometry.mip_level_count,
            );
        }
    }

    fn upload_full(&mut self, ctx: &mut TileUploadContext<'_>, pixels: &[u8], level: u32) {
        let size = self.geometry.texture_size;
        self.upload_region(ctx, pixels, 0, 0, size, size, level);
    }

    fn upload_region(
        &mut self,
        ctx: &mut TileUploadContext<'_>,
        pixels: &[u8],
        offset_x: u32,
        offset_y: u32,
        width: u32,
        height: u32,
        level: u32,
    ) {
        let pixel_size = self.geometry.format.bytes_per_pixel;
        assert_eq!(
            pixels.len(),
            (width as usize) * (height as usize) * (pixel_size as usize),
            "patch byte length does not match patch geometry"
        );

        let target = wgpu::TexelCopyTextureInfo {
            texture: &self.texture,
            mip_level: level,
            origin: wgpu::Origin3d {
                x: offset_x,
                y: offset_y,
                z: 0,
            },
            aspect: wgpu::TextureAspect::All,
        };
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let staged = match ctx.pool.as_deref_mut() {
            Some(pool) => {
                let packed = pack_rows_aligned(pixels, width, height, pixel_size);
                if packed.bytes.len() as u64 <= pool.buffer_size() {
                    let index = pool.next_buffer(ctx.device);
                    pool.fill(index, &packed.bytes);
                    let mut encoder =
                        ctx.device
                            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                                label: Some("texture_cache.tile.staged_upload"),
                            });
                    encoder.copy_buffer_to_texture(
                        wgpu::TexelCopyBufferInfo {
                            buffer: pool.buffer(index),
                            layout: wgpu::TexelCopyBufferLayout {
                                offset: 0,
                                bytes_per_row: Some(packed.bytes_per_row),
                                rows_per_image: Some(height),
                            },
                        },
                        target,
                        extent,
                    );
                    ctx.queue.submit(Some(encoder.finish()));
                    pool.recycle(index);
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if !staged {
            ctx.queue.write_texture(
                target,
                pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * pixel_size),
                    rows_per_image: Some(height),
                },
                extent,
            );
        }
    }
}

fn normalized_texture_rect(geometry: &TileGeometry, image_rect: &ImageRect) -> [f32; 4] {
    let texture_size = geometry.texture_size as f32;
    [
        geometry.border as f32 / texture_size,
        geometry.border as f32 / texture_size,
        image_rect.width as f32 / texture_size,
        image_rect.height as f32 / texture_size,
    ]
}

/// Result of extending a patch into the tile border on image-boundary
/// edges. `shift_x`/`shift_y` say how far the upload origin moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedPatch {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub shift_x: u32,
    pub shift_y: u32,
}

/// Replicates the patch's outermost row/column into the border region on
/// every flagged edge, producing one buffer for a single sub-upload.
pub fn pad_patch_edges(
    pixels: &[u8],
    width: u32,
    height: u32,
    pixel_size: u32,
    border: u32,
    edges: BoundaryEdges,
) -> PaddedPatch {
    assert!(width > 0 && height > 0, "zero-sized tile patch");
    let pixel_size = pixel_size as usize;
    assert_eq!(
        pixels.len(),
        (width as usize) * (height as usize) * pixel_size,
        "patch byte length does not match patch geometry"
    );

    let pad_left = if edges.left { border } else { 0 };
    let pad_top = if edges.top { border } else { 0 };
    let pad_right = if edges.right { border } else { 0 };
    let pad_bottom = if edges.bottom { border } else { 0 };
    let out_width = width + pad_left + pad_right;
    let out_height = height + pad_top + pad_bottom;

    let src_row_bytes = (width as usize) * pixel_size;
    let mut out = Vec::with_capacity((out_width as usize) * (out_height as usize) * pixel_size);
    for out_y in 0..out_height {
        let src_y = out_y.saturating_sub(pad_top).min(height - 1) as usize;
        let row = &pixels[src_y * src_row_bytes..(src_y + 1) * src_row_bytes];
        for out_x in 0..out_width {
            let src_x = out_x.saturating_sub(pad_left).min(width - 1) as usize;
            out.extend_from_slice(&row[src_x * pixel_size..(src_x + 1) * pixel_size]);
        }
    }

    PaddedPatch {
        pixels: out,
        width: out_width,
        height: out_height,
        shift_x: pad_left,
        shift_y: pad_top,
    }
}

#[derive(Debug)]
pub(crate) struct PackedRows {
    pub bytes: Vec<u8>,
    pub bytes_per_row: u32,
}

/// Repacks tightly-packed patch rows to the copy row alignment required
/// by buffer-to-texture transfers.
pub(crate) fn pack_rows_aligned(
    pixels: &[u8],
    width: u32,
    height: u32,
    pixel_size: u32,
) -> PackedRows {
    let row_bytes = (width as usize) * (pixel_size as usize);
    let alignment = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
    let aligned_row_bytes = row_bytes.div_ceil(alignment) * alignment;
    if aligned_row_bytes == row_bytes {
        return PackedRows {
            bytes: pixels.to_vec(),
            bytes_per_row: row_bytes as u32,
        };
    }
    let mut bytes = vec![0u8; aligned_row_bytes * (height as usize)];
    for y in 0..height as usize {
        bytes[y * aligned_row_bytes..y * aligned_row_bytes + row_bytes]
            .copy_from_slice(&pixels[y * row_bytes..(y + 1) * row_bytes]);
    }
    PackedRows {
        bytes,
        bytes_per_row: aligned_row_bytes as u32,
    }
}
