//! Tile grid manager.
//!
//! Owns the full array of texture tiles covering the stored image, the
//! shared vertex/UV geometry buffers the renderer indexes into, the
//! negotiated tile format and the transfer-buffer pool. The grid is
//! always rebuilt wholesale: image resize, display profile change and
//! color-management toggles all destroy and recreate every tile, because
//! the shared geometry buffers bake in a fixed tile count.

use bitvec::slice::BitSlice;
use bitvec::vec::BitVec;
use wgpu::util::DeviceExt;

use canvas_protocol::{
    ConversionFlags, DisplayConverter, FilterMode, ImageRect, MonitorProfile, ProjectionSource,
    ProofingConfig, RenderingIntent, WorkingColorSpace,
};

use crate::capabilities::GpuCapabilities;
use crate::fence::CompletionFence;
use crate::format::{negotiate_tile_format, FormatNegotiation};
use crate::mipmap::{full_mip_level_count, MipmapGenerator};
use crate::tile::{TextureTile, TileGeometry, TileUploadContext};
use crate::transfer_pool::TransferBufferPool;
use crate::update_info::{BoundaryEdges, CanvasUpdateBatch, TileUpdateInfo};
use crate::CanvasConfig;

/// Vertices per tile in the shared geometry buffers (two triangles).
pub const VERTICES_PER_TILE: u32 = 6;

/// One tile's worth of a planned update, before any pixels are read.
///
/// Pure output of [`plan_tile_updates`]; carries image-space read
/// coordinates plus texel-space destination coordinates at the patch's
/// mipmap plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTilePatch {
    pub col: u32,
    pub row: u32,
    /// Image-space rect to read from the projection, aligned to the
    /// level-of-detail grid and clipped to the aligned image bounds.
    pub read_rect: ImageRect,
    /// Destination offset within the tile texture, in texels at
    /// `level_of_detail`.
    pub dest_x: u32,
    pub dest_y: u32,
    pub dest_width: u32,
    pub dest_height: u32,
    pub level_of_detail: u32,
    pub entire_tile: bool,
    pub boundary_edges: BoundaryEdges,
}

/// Grid shape for an image of `bounds` with the given effective tile size.
pub fn grid_size(bounds: ImageRect, effective_size: u32) -> (u32, u32) {
    assert!(effective_size > 0, "effective tile size must be positive");
    let cols = bounds.width.div_ceil(effective_size);
    let rows = bounds.height.div_ceil(effective_size);
    (cols, rows)
}

fn floor_div(value: i64, divisor: i64) -> i64 {
    value.div_euclid(divisor)
}

/// Expands a rect outward so its edges land on multiples of `1 << level`.
fn aligned_rect(rect: ImageRect, level: u32) -> ImageRect {
    if level == 0 || rect.is_empty() {
        return rect;
    }
    let granularity = 1i64 << level;
    let ceil_to = |value: i64| (value + granularity - 1).div_euclid(granularity) * granularity;
    let left = floor_div(i64::from(rect.x), granularity) * granularity;
    let top = floor_div(i64::from(rect.y), granularity) * granularity;
    let right = ceil_to(rect.right());
    let bottom = ceil_to(rect.bottom());
    ImageRect {
        x: i32::try_from(left).expect("aligned rect x exceeds i32"),
        y: i32::try_from(top).expect("aligned rect y exceeds i32"),
        width: u32::try_from(right - left).expect("aligned rect width exceeds u32"),
        height: u32::try_from(bottom - top).expect("aligned rect height exceeds u32"),
    }
}

/// The effective (border-excluded) image-space rect of tile `(col, row)`.
fn tile_rect(bounds: ImageRect, effective_size: u32, col: u32, row: u32) -> ImageRect {
    let size = i64::from(effective_size);
    let x = i64::from(bounds.x) + i64::from(col) * size;
    let y = i64::from(bounds.y) + i64::from(row) * size;
    bounds.intersect(ImageRect {
        x: i32::try_from(x).expect("tile rect x exceeds i32"),
        y: i32::try_from(y).expect("tile rect y exceeds i32"),
        width: effective_size,
        height: effective_size,
    })
}

/// Converts a dirty image rect into per-tile patch plans.
///
/// The dirty rect is stretched by the border overlap before the tile
/// range is computed, so an edit near a seam also pokes the neighbor
/// tile whose border stripe covers it. Column and row indices come from
/// integer division by the effective tile size; this is what keeps grid
/// addressing in sync with the compositor's dirty-rect producer even
/// though tiles physically overlap by `border` pixels.
pub fn plan_tile_updates(
    dirty_rect: ImageRect,
    bounds: ImageRect,
    effective_size: u32,
    border: u32,
    level_of_detail: u32,
) -> Vec<PlannedTilePatch> {
    let update_rect = dirty_rect.intersect(bounds);
    if update_rect.is_empty() {
        return Vec::new();
    }

    let (num_cols, num_rows) = grid_size(bounds, effective_size);
    let poked = update_rect.stretched(border).intersect(bounds);

    let size = i64::from(effective_size);
    let col_of = |x: i64| floor_div(x - i64::from(bounds.x), size);
    let row_of = |y: i64| floor_div(y - i64::from(bounds.y), size);
    let first_col = col_of(i64::from(poked.x)).max(0) as u32;
    let last_col = (col_of(poked.right() - 1).max(0) as u32).min(num_cols - 1);
    let first_row = row_of(i64::from(poked.y)).max(0) as u32;
    let last_row = (row_of(poked.bottom() - 1).max(0) as u32).min(num_rows - 1);

    let aligned_update = aligned_rect(update_rect, level_of_detail);
    let aligned_bounds = aligned_rect(bounds, level_of_detail);

    let mut plans = Vec::with_capacity(
        ((last_col - first_col + 1) * (last_row - first_row + 1)) as usize,
    );
    for col in first_col..=last_col {
        for row in first_row..=last_row {
            let effective = tile_rect(bounds, effective_size, col, row);
            let storage = effective.stretched(border);

            let aligned_storage = aligned_rect(storage, level_of_detail);
            let patch = aligned_storage.intersect(aligned_update);
            if patch.is_empty() {
                continue;
            }

            let valid_storage = aligned_storage.intersect(aligned_bounds);
            let entire_tile = patch == valid_storage;

            // Plain level-0 rects decide which edges need border padding:
            // an edge is flagged when the patch reaches the image boundary
            // and the tile's border stripe extends past it.
            let plain_patch = storage.intersect(update_rect);
            let boundary_edges = BoundaryEdges {
                left: plain_patch.x == bounds.x && storage.x < bounds.x,
                top: plain_patch.y == bounds.y && storage.y < bounds.y,
                right: plain_patch.right() == bounds.right()
                    && storage.right() > bounds.right(),
                bottom: plain_patch.bottom() == bounds.bottom()
                    && storage.bottom() > bounds.bottom(),
            };

            let dest_x = u32::try_from(
                (i64::from(patch.x) - i64::from(aligned_storage.x)) >> level_of_detail,
            )
            .expect("patch lies left of its tile storage rect");
            let dest_y = u32::try_from(
                (i64::from(patch.y) - i64::from(aligned_storage.y)) >> level_of_detail,
            )
            .expect("patch lies above its tile storage rect");

            plans.push(PlannedTilePatch {
                col,
                row,
                read_rect: patch,
                dest_x,
                dest_y,
                dest_width: patch.width >> level_of_detail,
                dest_height: patch.height >> level_of_detail,
                level_of_detail,
                entire_tile,
                boundary_edges,
            });
        }
    }
    plans
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ChannelSelection {
    flags: Option<BitVec>,
    all_selected: bool,
}

impl ChannelSelection {
    fn all() -> Self {
        Self {
            flags: None,
            all_selected: true,
        }
    }
}

/// Applies the channel docker's selection to destination-space pixels.
///
/// With exactly one channel selected, that channel is replicated across
/// every channel so it reads as a grayscale visualization. With several,
/// the deselected channels are zeroed. A no-op when the flag count does
/// not match the destination layout.
pub(crate) fn isolate_channels(flags: &BitSlice, dst: WorkingColorSpace, pixels: &mut [u8]) {
    let channel_count = dst.channel_count() as usize;
    if flags.len() != channel_count {
        return;
    }
    let channel_bytes = dst.depth.bytes_per_channel() as usize;
    let pixel_bytes = channel_count * channel_bytes;

    if flags.count_ones() == 1 {
        let selected = flags.iter_ones().next().expect("exactly one channel is selected");
        let src = selected * channel_bytes;
        for pixel in pixels.chunks_exact_mut(pixel_bytes) {
            for channel in 0..channel_count {
                if channel != selected {
                    pixel.copy_within(src..src + channel_bytes, channel * channel_bytes);
                }
            }
        }
        return;
    }

    for pixel in pixels.chunks_exact_mut(pixel_bytes) {
        for (channel, selected) in flags.iter().by_vals().enumerate() {
            if !selected {
                pixel[channel * channel_bytes..(channel + 1) * channel_bytes].fill(0);
            }
        }
    }
}

/// The tile grid plus everything needed to keep it current.
pub struct ImageTextures {
    image_bounds: ImageRect,
    image_space: WorkingColorSpace,
    caps: GpuCapabilities,
    config: CanvasConfig,
    negotiation: FormatNegotiation,
    geometry: TileGeometry,
    /// The configured filter mode, possibly degraded to a non-mipmapped
    /// mode when the negotiated format cannot back a mipmap generator.
    effective_filter: FilterMode,
    num_cols: u32,
    num_rows: u32,
    tiles: Vec<TextureTile>,
    tile_vertex_buffer: Option<wgpu::Buffer>,
    tile_texcoord_buffer: Option<wgpu::Buffer>,
    pool: Option<TransferBufferPool>,
    mipmaps: Option<MipmapGenerator>,
    channels: ChannelSelection,
    monitor_profile: Option<MonitorProfile>,
    rendering_intent: RenderingIntent,
    conversion_flags: ConversionFlags,
    proofing_config: Option<ProofingConfig>,
    internal_color_management_active: bool,
}

impl ImageTextures {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image_bounds: ImageRect,
        image_space: WorkingColorSpace,
        caps: GpuCapabilities,
        config: CanvasConfig,
    ) -> Self {
        let negotiation = negotiate_tile_format(image_space, config.hdr_requested, false, &caps);
        let mut textures = Self {
            image_bounds,
            image_space,
            caps,
            config,
            negotiation,
            geometry: TileGeometry {
                texture_size: 0,
                border: 0,
                format: negotiation.tile_format,
                mip_level_count: 1,
            },
            effective_filter: config.filter_mode,
            num_cols: 0,
            num_rows: 0,
            tiles: Vec::new(),
            tile_vertex_buffer: None,
            tile_texcoord_buffer: None,
            pool: None,
            mipmaps: None,
            channels: ChannelSelection::all(),
            monitor_profile: None,
            rendering_intent: RenderingIntent::Perceptual,
            conversion_flags: ConversionFlags::empty(),
            proofing_config: None,
            internal_color_management_active: true,
        };
        textures.recreate_image_texture_tiles(device, queue);
        textures
    }

    pub fn stored_image_bounds(&self) -> ImageRect {
        self.image_bounds
    }

    pub fn num_cols(&self) -> u32 {
        self.num_cols
    }

    pub fn num_rows(&self) -> u32 {
        self.num_rows
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn tile_geometry(&self) -> TileGeometry {
        self.geometry
    }

    pub fn negotiation(&self) -> FormatNegotiation {
        self.negotiation
    }

    pub fn effective_filter(&self) -> FilterMode {
        self.effective_filter
    }

    /// Shared buffer with six image-space vertices per tile.
    pub fn tile_vertex_buffer(&self) -> &wgpu::Buffer {
        self.tile_vertex_buffer
            .as_ref()
            .expect("tile geometry buffers exist after grid construction")
    }

    /// Shared buffer with six normalized texture coordinates per tile.
    pub fn tile_texcoord_buffer(&self) -> &wgpu::Buffer {
        self.tile_texcoord_buffer
            .as_ref()
            .expect("tile geometry buffers exist after grid construction")
    }

    fn tile_index(&self, col: u32, row: u32) -> usize {
        assert!(
            col < self.num_cols && row < self.num_rows,
            "tile ({col}, {row}) outside {}x{} grid",
            self.num_cols,
            self.num_rows
        );
        (row * self.num_cols + col) as usize
    }

    pub fn texture_tile_cr(&self, col: u32, row: u32) -> &TextureTile {
        &self.tiles[self.tile_index(col, row)]
    }

    pub fn texture_tile_cr_mut(&mut self, col: u32, row: u32) -> &mut TextureTile {
        let index = self.tile_index(col, row);
        &mut self.tiles[index]
    }

    /// First vertex of tile `(col, row)` in the shared geometry buffers.
    pub fn tile_buffer_index_cr(&self, col: u32, row: u32) -> u32 {
        self.tile_index(col, row) as u32 * VERTICES_PER_TILE
    }

    /// Borrows the upload collaborators for drawing-time mipmap work.
    pub fn draw_context<'a>(
        &'a mut self,
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        col: u32,
        row: u32,
    ) -> (&'a mut TextureTile, TileUploadContext<'a>) {
        let index = self.tile_index(col, row);
        let ctx = TileUploadContext {
            device,
            queue,
            pool: None,
            mipmaps: self.mipmaps.as_ref(),
        };
        (&mut self.tiles[index], ctx)
    }

    fn update_texture_format(&mut self) {
        let external_requested = !self.internal_color_management_active;
        self.negotiation = negotiate_tile_format(
            self.image_space,
            self.config.hdr_requested,
            external_requested,
            &self.caps,
        );
        if self.negotiation.forced_internal_color_management && crate::canvas_trace_enabled() {
            eprintln!(
                "[texture_cache] non-RGBA image forces internal color management back on \
                 (requested external display chain)"
            );
        }
    }

    /// Destroys and rebuilds the whole grid: tiles, geometry buffers and
    /// transfer pool. The only path that changes grid shape.
    pub fn recreate_image_texture_tiles(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        assert!(
            !self.image_bounds.is_empty(),
            "cannot build a tile grid for an empty image"
        );

        self.tiles.clear();
        self.tile_vertex_buffer = None;
        self.tile_texcoord_buffer = None;
        if let Some(pool) = self.pool.as_mut() {
            pool.reset();
        }
        self.pool = None;

        self.update_texture_format();

        let texture_size = self
            .config
            .preferred_texture_size
            .min(self.caps.max_texture_size);
        let border = self.config.texture_border;
        let wants_mipmaps = self.config.filter_mode.needs_mipmaps();

        self.mipmaps = if wants_mipmaps {
            match MipmapGenerator::new(device, self.negotiation.tile_format.format, &self.caps) {
                Ok(generator) => Some(generator),
                Err(error) => {
                    if crate::canvas_trace_enabled() {
                        eprintln!("[texture_cache] mipmap generation unavailable: {error}");
                    }
                    None
                }
            }
        } else {
            None
        };
        self.effective_filter = if wants_mipmaps && self.mipmaps.is_none() {
            FilterMode::Bilinear
        } else {
            self.config.filter_mode
        };

        // Mipmap planes are allocated from the configuration even under a
        // non-mipmapped filter: reduced-resolution compositor previews
        // write straight to plane k and need it to exist.
        let mip_level_count = self
            .config
            .mip_level_count
            .clamp(1, full_mip_level_count(texture_size));

        self.geometry = TileGeometry {
            texture_size,
            border,
            format: self.negotiation.tile_format,
            mip_level_count,
        };
        let effective_size = self.geometry.effective_size();

        if self.config.use_staging_buffers {
            self.pool = match TransferBufferPool::allocate(
                device,
                self.config.pool_buffer_count,
                self.geometry.tile_byte_size(),
            ) {
                Ok(pool) => Some(pool),
                Err(error) => {
                    if crate::canvas_trace_enabled() {
                        eprintln!(
                            "[texture_cache] staging pool unavailable, uploading directly: {error}"
                        );
                    }
                    None
                }
            };
        }

        let (num_cols, num_rows) = grid_size(self.image_bounds, effective_size);
        self.num_cols = num_cols;
        self.num_rows = num_rows;

        let fill = vec![0u8; self.geometry.format.bytes_per_pixel as usize];
        let tile_count = (num_cols as usize) * (num_rows as usize);
        self.tiles.reserve(tile_count);

        let mut pool = self.pool.take();
        for row in 0..num_rows {
            for col in 0..num_cols {
                let rect = tile_rect(self.image_bounds, effective_size, col, row);
                let mut ctx = TileUploadContext {
                    device,
                    queue,
                    pool: pool.as_mut(),
                    mipmaps: self.mipmaps.as_ref(),
                };
                self.tiles.push(TextureTile::new(
                    &mut ctx,
                    rect,
                    self.geometry,
                    &fill,
                    self.effective_filter,
                ));
            }
        }
        self.pool = pool;

        self.rebuild_geometry_buffers(device);
    }

    fn rebuild_geometry_buffers(&mut self, device: &wgpu::Device) {
        let mut vertices: Vec<f32> = Vec::with_capacity(self.tiles.len() * 12);
        let mut texcoords: Vec<f32> = Vec::with_capacity(self.tiles.len() * 12);
        for tile in &self.tiles {
            let rect = tile.image_rect();
            let left = rect.x as f32;
            let top = rect.y as f32;
            let right = rect.right() as f32;
            let bottom = rect.bottom() as f32;
            vertices.extend_from_slice(&[
                left, top, right, top, left, bottom, left, bottom, right, top, right, bottom,
            ]);

            let [u, v, w, h] = tile.texture_rect();
            let (u1, v1) = (u + w, v + h);
            texcoords.extend_from_slice(&[u, v, u1, v, u, v1, u, v1, u1, v, u1, v1]);
        }

        self.tile_vertex_buffer = Some(device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("texture_cache.tile_vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            },
        ));
        self.tile_texcoord_buffer = Some(device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("texture_cache.tile_texcoords"),
                contents: bytemuck::cast_slice(&texcoords),
                usage: wgpu::BufferUsages::VERTEX,
            },
        ));
    }

    /// Builds per-tile patches for a dirty rect, converting pixels from
    /// the image's working space to the tile-resident space.
    pub fn update_cache(
        &self,
        dirty_rect: ImageRect,
        source: &dyn ProjectionSource,
        converter: &dyn DisplayConverter,
    ) -> CanvasUpdateBatch {
        self.update_cache_impl(dirty_rect, source, Some(converter))
    }

    /// Same as [`update_cache`](Self::update_cache) but the pixels keep the
    /// image's working space. Only valid while the working space and the
    /// tile-resident space share a byte layout (reference-only caches).
    pub fn update_cache_no_conversion(
        &self,
        dirty_rect: ImageRect,
        source: &dyn ProjectionSource,
    ) -> CanvasUpdateBatch {
        assert_eq!(
            source.color_space().pixel_size(),
            self.negotiation.tile_format.bytes_per_pixel,
            "unconverted updates need matching pixel layouts"
        );
        self.update_cache_impl(dirty_rect, source, None)
    }

    fn update_cache_impl(
        &self,
        dirty_rect: ImageRect,
        source: &dyn ProjectionSource,
        converter: Option<&dyn DisplayConverter>,
    ) -> CanvasUpdateBatch {
        let bounds = source.bounds();
        let level_of_detail = source.current_level_of_detail();
        let plans = plan_tile_updates(
            dirty_rect,
            bounds,
            self.geometry.effective_size(),
            self.geometry.border,
            level_of_detail,
        );

        let src_space = source.color_space();
        let dst_space = self.negotiation.tile_format.destination;
        let external_active = converter
            .map(DisplayConverter::external_management_active)
            .unwrap_or(false);

        let mut patches = Vec::with_capacity(plans.len());
        for plan in plans {
            let mut pixels = Vec::new();
            source.read_rect(plan.read_rect, &mut pixels);
            let pixel_count = (plan.dest_width as usize) * (plan.dest_height as usize);

            if let Some(converter) = converter {
                let (intent, flags) = self.conversion_for_patch();
                converter.convert(&mut pixels, pixel_count, src_space, dst_space, intent, flags);
            }
            if !external_active {
                self.apply_channel_selection(&mut pixels);
            }

            patches.push(TileUpdateInfo {
                tile_col: plan.col,
                tile_row: plan.row,
                pixels,
                patch_offset_x: plan.dest_x,
                patch_offset_y: plan.dest_y,
                patch_width: plan.dest_width,
                patch_height: plan.dest_height,
                patch_level_of_detail: plan.level_of_detail,
                entire_tile: plan.entire_tile,
                boundary_edges: plan.boundary_edges,
            });
        }

        CanvasUpdateBatch {
            patches,
            dirty_rect,
        }
    }

    fn conversion_for_patch(&self) -> (RenderingIntent, ConversionFlags) {
        match &self.proofing_config {
            Some(proofing)
                if proofing
                    .conversion_flags
                    .contains(ConversionFlags::SOFT_PROOFING) =>
            {
                (proofing.intent, self.conversion_flags | proofing.conversion_flags)
            }
            _ => (self.rendering_intent, self.conversion_flags),
        }
    }

    fn apply_channel_selection(&self, pixels: &mut [u8]) {
        if self.channels.all_selected {
            return;
        }
        let Some(flags) = self.channels.flags.as_ref() else {
            return;
        };
        isolate_channels(flags, self.negotiation.tile_format.destination, pixels);
    }

    /// Applies a batch of patches to their tiles.
    ///
    /// Throttled by completion fences: after a full pool's worth of tile
    /// updates, an unsignaled fence means the GPU has not consumed the
    /// oldest staging buffers yet, and the pool is doubled instead of
    /// blocking the calling thread.
    pub fn recalculate_cache(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        batch: &CanvasUpdateBatch,
        block_mipmap_regeneration: bool,
    ) {
        if batch.is_empty() {
            return;
        }

        let mut pool = self.pool.take();
        let mut fence = CompletionFence::record(queue);
        let mut updates_since_fence = 0usize;

        for info in &batch.patches {
            if !info.is_valid() {
                continue;
            }
            let index = self.tile_index(info.tile_col, info.tile_row);
            let mut ctx = TileUploadContext {
                device,
                queue,
                pool: pool.as_mut(),
                mipmaps: self.mipmaps.as_ref(),
            };
            self.tiles[index].update(&mut ctx, info, block_mipmap_regeneration);

            updates_since_fence += 1;
            if let Some(pool) = pool.as_mut() {
                if updates_since_fence >= pool.buffer_count() {
                    if !fence.is_signaled(device) {
                        let grown = pool.grow(device);
                        if grown && crate::canvas_perf_log_enabled() {
                            eprintln!(
                                "[texture_cache] staging pool grown to {} buffers",
                                pool.buffer_count()
                            );
                        }
                    }
                    fence = CompletionFence::record(queue);
                    updates_since_fence = 0;
                }
            }
        }

        self.pool = pool;
    }

    /// Restricts updates to a subset of channels. `None` selects all.
    /// Takes effect from the next `update_cache` call; no rebuild.
    pub fn set_channel_flags(&mut self, flags: Option<BitVec>) {
        self.channels = match flags {
            None => ChannelSelection::all(),
            Some(flags) => {
                let all_selected = flags.all();
                ChannelSelection {
                    flags: Some(flags),
                    all_selected,
                }
            }
        };
    }

    /// Swaps the soft-proofing setup. Conversion picks it up on the next
    /// `update_cache`; tiles keep their current pixels until then.
    pub fn set_proofing_config(&mut self, config: Option<ProofingConfig>) {
        self.proofing_config = config;
    }

    /// Points conversion at a new display profile and rebuilds the grid,
    /// since every resident tile holds pixels converted for the old one.
    pub fn set_monitor_profile(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        profile: MonitorProfile,
        intent: RenderingIntent,
        flags: ConversionFlags,
    ) {
        self.monitor_profile = Some(profile);
        self.rendering_intent = intent;
        self.conversion_flags = flags;
        self.recreate_image_texture_tiles(device, queue);
    }

    pub fn monitor_profile(&self) -> Option<&MonitorProfile> {
        self.monitor_profile.as_ref()
    }

    /// Toggles internal color management. Returns true when the value
    /// changed, which renegotiates the format and rebuilds the grid.
    pub fn set_internal_color_management_active(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        active: bool,
    ) -> bool {
        if self.internal_color_management_active == active {
            return false;
        }
        self.internal_color_management_active = active;
        self.recreate_image_texture_tiles(device, queue);
        true
    }

    pub fn internal_color_management_active(&self) -> bool {
        self.internal_color_management_active
    }

    /// Image resize entry point: a full grid rebuild, never a partial one.
    pub fn image_size_changed(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        new_bounds: ImageRect,
    ) {
        self.image_bounds = new_bounds;
        self.recreate_image_texture_tiles(device, queue);
    }

    /// Applies a new canvas configuration. Changes to tile shape or
    /// mipmap depth rebuild the grid; a filter switch that keeps the
    /// mipmap allocation valid just retargets the tiles, and a staging
    /// toggle alone reallocates or drops the pool.
    pub fn update_config(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: CanvasConfig,
    ) {
        let filter_changed = config.filter_mode != self.config.filter_mode;
        let needs_rebuild = config.preferred_texture_size != self.config.preferred_texture_size
            || config.texture_border != self.config.texture_border
            || config.mip_level_count != self.config.mip_level_count
            || config.hdr_requested != self.config.hdr_requested
            || (filter_changed
                && config.filter_mode.needs_mipmaps()
                && self.mipmaps.is_none());
        let staging_changed = config.use_staging_buffers != self.config.use_staging_buffers
            || config.pool_buffer_count != self.config.pool_buffer_count;
        self.config = config;

        if needs_rebuild {
            self.recreate_image_texture_tiles(device, queue);
            return;
        }

        if filter_changed {
            self.effective_filter = self.config.filter_mode;
            for tile in &mut self.tiles {
                tile.set_filter_mode(self.effective_filter);
            }
        }

        if staging_changed {
            if let Some(pool) = self.pool.as_mut() {
                pool.reset();
            }
            self.pool = if self.config.use_staging_buffers {
                TransferBufferPool::allocate(
                    device,
                    self.config.pool_buffer_count,
                    self.geometry.tile_byte_size(),
                )
                .ok()
            } else {
                None
            };
        }
    }
}
