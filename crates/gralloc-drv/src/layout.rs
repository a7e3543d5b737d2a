//! Physical layout computation: per-plane stride/offset/size and total allocation size.

use gralloc_formats::{planar, BufferUsage, DrmFormat, Modifier, MAX_PLANES};

use crate::error::{DriverError, Result};

/// Memory tiling scheme of a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tiling {
    None,
    X,
    Y,
    /// Tile4, the Y-tile replacement on newer display engines.
    Four,
}

impl Tiling {
    /// Tiling implied by a negotiated modifier.
    ///
    /// Compressed Y variants lay out their main surface Y-tiled.
    pub fn from_modifier(modifier: Modifier) -> Result<Self> {
        match modifier {
            Modifier::LINEAR => Ok(Self::None),
            Modifier::I915_X_TILED => Ok(Self::X),
            Modifier::I915_Y_TILED
            | Modifier::I915_Y_TILED_CCS
            | Modifier::I915_Y_TILED_GEN12_RC_CCS => Ok(Self::Y),
            Modifier::I915_4_TILED => Ok(Self::Four),
            other => Err(DriverError::InternalInconsistency(format!(
                "no tiling for modifier {other:?}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaneLayout {
    pub stride: u32,
    pub offset: u32,
    pub size: u32,
}

/// The computed memory layout of one allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub format: DrmFormat,
    pub width: u32,
    pub height: u32,
    pub tiling: Tiling,
    pub modifier: Modifier,
    pub num_planes: usize,
    pub planes: [PlaneLayout; MAX_PLANES],
    pub total_size: u64,
}

impl Layout {
    pub fn planes(&self) -> &[PlaneLayout] {
        &self.planes[..self.num_planes]
    }

    pub fn strides(&self) -> [u32; MAX_PLANES] {
        self.planes.map(|p| p.stride)
    }

    pub fn offsets(&self) -> [u32; MAX_PLANES] {
        self.planes.map(|p| p.offset)
    }

    pub fn sizes(&self) -> [u32; MAX_PLANES] {
        self.planes.map(|p| p.size)
    }
}

const Y_TILE_WIDTH_BYTES: u32 = 128;
const Y_TILE_HEIGHT: u32 = 32;
const Y_TILE_SIZE: u32 = 4096;
/// Main-surface tiles covered by one Y_TILED_CCS control-surface tile.
const CCS_TILES_PER_AUX_WIDTH: u32 = 32;
const CCS_TILES_PER_AUX_HEIGHT: u32 = 16;

const GEN12_CCS_STRIDE_ALIGNMENT: u32 = 512;
const GEN12_CCS_MAIN_ALIGNMENT: u32 = 64 * 1024;
/// Main-surface bytes covered by one byte of the Gen12 aux surface.
const GEN12_CCS_MAIN_TO_AUX_RATIO: u32 = 256;

/// Height of the largest coded unit used by video hardware.
const LCU_HEIGHT: u32 = 64;

fn align(value: u32, alignment: u32) -> Result<u32> {
    debug_assert!(alignment > 0);
    value
        .checked_next_multiple_of(alignment)
        .ok_or(DriverError::InvalidArgument("buffer dimensions overflow"))
}

fn align_u64(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

fn mul(a: u32, b: u32) -> Result<u32> {
    a.checked_mul(b)
        .ok_or(DriverError::InvalidArgument("buffer dimensions overflow"))
}

fn unaligned_stride(format: DrmFormat, width: u32, plane: usize) -> Result<u32> {
    planar::stride_from_format(format, width, plane)
        .ok_or(DriverError::InvalidArgument("buffer dimensions overflow"))
}

fn add(a: u32, b: u32) -> Result<u32> {
    a.checked_add(b)
        .ok_or(DriverError::InvalidArgument("buffer dimensions overflow"))
}

/// Turns (format, dimensions, modifier) into a [`Layout`] under one device's alignment rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutCalculator {
    linear_stride_alignment: u32,
    page_size: u64,
    lcu_aligned_chroma: bool,
    pow2_compressed_stride: bool,
}

impl LayoutCalculator {
    pub fn new(linear_stride_alignment: u32, page_size: u64) -> Self {
        Self {
            linear_stride_alignment,
            page_size,
            lcu_aligned_chroma: false,
            pow2_compressed_stride: false,
        }
    }

    /// Align the chroma plane height of NV12/P010/P016 to the largest coded unit.
    pub fn with_lcu_aligned_chroma(mut self, enabled: bool) -> Self {
        self.lcu_aligned_chroma = enabled;
        self
    }

    /// Round Gen12 compressed strides up to a power of two (Xe-LPD display requirement).
    pub fn with_pow2_compressed_stride(mut self, enabled: bool) -> Self {
        self.pow2_compressed_stride = enabled;
        self
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// (horizontal bytes, vertical rows) alignment for one plane.
    pub fn alignment(
        &self,
        tiling: Tiling,
        format: DrmFormat,
        usage: BufferUsage,
        plane_height: u32,
    ) -> (u32, u32) {
        match tiling {
            Tiling::None => {
                let vertical = if usage.contains(BufferUsage::HW_VIDEO_ENCODER) {
                    // Macroblock height, so the encoder never reads uninitialised rows.
                    8
                } else if format == DrmFormat::R8 && plane_height == 1 {
                    // Single-row byte blobs (e.g. VkBuffer backing).
                    1
                } else {
                    4
                };
                (self.linear_stride_alignment, vertical)
            }
            Tiling::X => (512, 8),
            Tiling::Y | Tiling::Four => (Y_TILE_WIDTH_BYTES, Y_TILE_HEIGHT),
        }
    }

    fn needs_lcu_alignment(&self, format: DrmFormat, plane: usize) -> bool {
        self.lcu_aligned_chroma
            && plane == 1
            && matches!(
                format,
                DrmFormat::NV12 | DrmFormat::P010 | DrmFormat::P016
            )
    }

    pub fn compute(
        &self,
        format: DrmFormat,
        width: u32,
        height: u32,
        usage: BufferUsage,
        modifier: Modifier,
    ) -> Result<Layout> {
        if width == 0 || height == 0 {
            return Err(DriverError::InvalidArgument("zero-sized buffer"));
        }
        let num_planes = planar::num_planes_from_format(format);
        if num_planes == 0 {
            return Err(DriverError::InvalidArgument("format has no planar layout"));
        }
        let tiling = Tiling::from_modifier(modifier)?;
        if modifier.is_compressed() && num_planes != 1 {
            return Err(DriverError::InternalInconsistency(format!(
                "compressed modifier {modifier:?} selected for {num_planes}-plane format {format}"
            )));
        }

        let mut layout = Layout {
            format,
            width,
            height,
            tiling,
            modifier,
            num_planes,
            planes: [PlaneLayout::default(); MAX_PLANES],
            total_size: 0,
        };

        if format == DrmFormat::YVU420_ANDROID {
            self.android_yv12(&mut layout)?;
        } else if modifier == Modifier::I915_Y_TILED_CCS {
            self.y_tiled_ccs(&mut layout)?;
        } else if modifier == Modifier::I915_Y_TILED_GEN12_RC_CCS {
            self.gen12_rc_ccs(&mut layout)?;
        } else {
            self.generic(&mut layout, usage)?;
        }
        Ok(layout)
    }

    fn generic(&self, layout: &mut Layout, usage: BufferUsage) -> Result<()> {
        let format = layout.format;
        let mut offset = 0u32;
        for plane in 0..layout.num_planes {
            let stride = unaligned_stride(format, layout.width, plane)?;
            let plane_height = planar::height_from_format(format, layout.height, plane);

            if layout.tiling != Tiling::None {
                debug_assert_eq!(u64::from(offset) % self.page_size, 0);
            }

            let (horizontal, vertical) = self.alignment(layout.tiling, format, usage, plane_height);
            let stride = align(stride, horizontal)?;
            let mut plane_height = align(plane_height, vertical)?;
            if self.needs_lcu_alignment(format, plane) {
                plane_height = align(plane_height, LCU_HEIGHT)?;
            }

            let size = mul(stride, plane_height)?;
            layout.planes[plane] = PlaneLayout {
                stride,
                offset,
                size,
            };
            offset = add(offset, size)?;
        }
        layout.total_size = align_u64(u64::from(offset), self.page_size);
        Ok(())
    }

    /// Android YV12: luma stride widened to 32 bytes so each chroma stride is half of it and
    /// still 16-byte aligned. Heights are not padded.
    fn android_yv12(&self, layout: &mut Layout) -> Result<()> {
        let format = layout.format;
        let stride = align(layout.width, 32)?;
        let mut offset = 0u32;
        for plane in 0..layout.num_planes {
            let plane_stride = planar::subsample_stride(format, stride, 1, plane);
            let size = mul(
                plane_stride,
                planar::height_from_format(format, layout.height, plane),
            )?;
            layout.planes[plane] = PlaneLayout {
                stride: plane_stride,
                offset,
                size,
            };
            offset = add(offset, size)?;
        }
        layout.total_size = align_u64(u64::from(offset), self.page_size);
        Ok(())
    }

    /// Y-tiled main surface followed by a control surface with one 4 KiB tile per 32x16 main
    /// tiles.
    fn y_tiled_ccs(&self, layout: &mut Layout) -> Result<()> {
        let stride = unaligned_stride(layout.format, layout.width, 0)?;
        let width_in_tiles = stride.div_ceil(Y_TILE_WIDTH_BYTES);
        let height_in_tiles = layout.height.div_ceil(Y_TILE_HEIGHT);
        let main_size = mul(mul(width_in_tiles, height_in_tiles)?, Y_TILE_SIZE)?;

        let ccs_width_in_tiles = width_in_tiles.div_ceil(CCS_TILES_PER_AUX_WIDTH);
        let ccs_height_in_tiles = height_in_tiles.div_ceil(CCS_TILES_PER_AUX_HEIGHT);
        let ccs_size = mul(mul(ccs_width_in_tiles, ccs_height_in_tiles)?, Y_TILE_SIZE)?;

        layout.planes[0] = PlaneLayout {
            stride: mul(width_in_tiles, Y_TILE_WIDTH_BYTES)?,
            offset: 0,
            size: main_size,
        };
        layout.planes[1] = PlaneLayout {
            stride: mul(ccs_width_in_tiles, Y_TILE_WIDTH_BYTES)?,
            offset: main_size,
            size: ccs_size,
        };
        layout.num_planes = 2;
        layout.total_size = u64::from(add(main_size, ccs_size)?);
        Ok(())
    }

    /// Gen12 render compression: one 64-byte aux cache line tracks four Y tiles, so the aux
    /// surface is 1/256 of the main surface.
    fn gen12_rc_ccs(&self, layout: &mut Layout) -> Result<()> {
        let format = layout.format;
        let mut stride = align(
            unaligned_stride(format, layout.width, 0)?,
            GEN12_CCS_STRIDE_ALIGNMENT,
        )?;
        let mut height = align(
            planar::height_from_format(format, layout.height, 0),
            Y_TILE_HEIGHT,
        )?;
        if self.pow2_compressed_stride && stride > 1 {
            stride = stride
                .checked_next_power_of_two()
                .ok_or(DriverError::InvalidArgument("buffer dimensions overflow"))?;
            height = align(height, 128)?;
        }

        let main_size = align(mul(stride, height)?, GEN12_CCS_MAIN_ALIGNMENT)?;
        let aux_size = align_u64(
            u64::from(main_size / GEN12_CCS_MAIN_TO_AUX_RATIO),
            self.page_size,
        );
        let aux_size = u32::try_from(aux_size)
            .map_err(|_| DriverError::InvalidArgument("buffer dimensions overflow"))?;

        layout.planes[0] = PlaneLayout {
            stride,
            offset: 0,
            size: main_size,
        };
        layout.planes[1] = PlaneLayout {
            stride: stride / 8,
            offset: main_size,
            size: aux_size,
        };
        layout.num_planes = 2;
        layout.total_size = u64::from(add(main_size, aux_size)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn calc() -> LayoutCalculator {
        LayoutCalculator::new(64, 4096)
    }

    #[test]
    fn linear_rgba_row_is_aligned_to_64_bytes_and_4_rows() {
        let layout = calc()
            .compute(
                DrmFormat::ABGR8888,
                100,
                1,
                BufferUsage::TEXTURE,
                Modifier::LINEAR,
            )
            .unwrap();
        assert_eq!(layout.tiling, Tiling::None);
        assert_eq!(layout.num_planes, 1);
        assert_eq!(
            layout.planes[0],
            PlaneLayout {
                stride: 448,
                offset: 0,
                size: 448 * 4,
            }
        );
        assert_eq!(layout.total_size, 4096);
    }

    #[test]
    fn strict_linear_alignment_widens_stride_to_256() {
        let layout = LayoutCalculator::new(256, 4096)
            .compute(
                DrmFormat::ABGR8888,
                100,
                1,
                BufferUsage::TEXTURE,
                Modifier::LINEAR,
            )
            .unwrap();
        assert_eq!(layout.planes[0].stride, 512);
        assert_eq!(layout.planes[0].size, 512 * 4);
    }

    #[test]
    fn single_row_r8_blob_is_not_padded_vertically() {
        let layout = calc()
            .compute(
                DrmFormat::R8,
                100,
                1,
                BufferUsage::GPU_DATA_BUFFER,
                Modifier::LINEAR,
            )
            .unwrap();
        assert_eq!(layout.planes[0].stride, 128);
        assert_eq!(layout.planes[0].size, 128);
    }

    #[test]
    fn video_encode_pads_linear_height_to_8_rows() {
        let layout = calc()
            .compute(
                DrmFormat::R8,
                100,
                1,
                BufferUsage::HW_VIDEO_ENCODER,
                Modifier::LINEAR,
            )
            .unwrap();
        assert_eq!(layout.planes[0].size, 128 * 8);
    }

    #[test]
    fn x_and_y_tiling_alignment() {
        let x = calc()
            .compute(
                DrmFormat::XRGB8888,
                100,
                10,
                BufferUsage::RENDERING,
                Modifier::I915_X_TILED,
            )
            .unwrap();
        assert_eq!((x.planes[0].stride, x.planes[0].size), (512, 512 * 16));

        let y = calc()
            .compute(
                DrmFormat::XRGB8888,
                100,
                10,
                BufferUsage::RENDERING,
                Modifier::I915_4_TILED,
            )
            .unwrap();
        assert_eq!(y.tiling, Tiling::Four);
        assert_eq!((y.planes[0].stride, y.planes[0].size), (512, 512 * 32));
    }

    #[test]
    fn nv12_planes_are_packed_back_to_back() {
        let layout = calc()
            .compute(
                DrmFormat::NV12,
                64,
                64,
                BufferUsage::TEXTURE,
                Modifier::LINEAR,
            )
            .unwrap();
        assert_eq!(
            layout.planes(),
            &[
                PlaneLayout {
                    stride: 64,
                    offset: 0,
                    size: 64 * 64,
                },
                PlaneLayout {
                    stride: 64,
                    offset: 64 * 64,
                    size: 64 * 32,
                },
            ]
        );
        assert_eq!(layout.total_size, 8192);
    }

    #[test]
    fn nv12_chroma_height_is_lcu_aligned_when_enabled() {
        let layout = calc()
            .with_lcu_aligned_chroma(true)
            .compute(
                DrmFormat::NV12,
                64,
                64,
                BufferUsage::TEXTURE,
                Modifier::I915_Y_TILED,
            )
            .unwrap();
        assert_eq!(layout.planes[0].size, 128 * 64);
        assert_eq!(layout.planes[1].size, 128 * 64);
        assert_eq!(layout.planes[1].offset, 128 * 64);
    }

    #[test]
    fn android_yv12_uses_half_luma_stride_for_chroma() {
        let layout = calc()
            .compute(
                DrmFormat::YVU420_ANDROID,
                100,
                10,
                BufferUsage::TEXTURE,
                Modifier::LINEAR,
            )
            .unwrap();
        assert_eq!(layout.strides(), [128, 64, 64, 0]);
        assert_eq!(layout.sizes(), [1280, 320, 320, 0]);
        assert_eq!(layout.offsets(), [0, 1280, 1600, 0]);
        assert_eq!(layout.total_size, 4096);
    }

    #[test]
    fn y_tiled_ccs_appends_control_surface() {
        let layout = calc()
            .compute(
                DrmFormat::XRGB8888,
                1920,
                1080,
                BufferUsage::RENDERING,
                Modifier::I915_Y_TILED_CCS,
            )
            .unwrap();
        // 60x34 main tiles, 2x3 control tiles.
        assert_eq!(layout.num_planes, 2);
        assert_eq!(
            layout.planes(),
            &[
                PlaneLayout {
                    stride: 7680,
                    offset: 0,
                    size: 60 * 34 * 4096,
                },
                PlaneLayout {
                    stride: 256,
                    offset: 60 * 34 * 4096,
                    size: 2 * 3 * 4096,
                },
            ]
        );
        assert_eq!(layout.total_size, (60 * 34 + 6) * 4096);
    }

    #[test]
    fn gen12_rc_ccs_sizes_aux_as_fraction_of_main() {
        let layout = calc()
            .compute(
                DrmFormat::XRGB8888,
                1920,
                1080,
                BufferUsage::RENDERING,
                Modifier::I915_Y_TILED_GEN12_RC_CCS,
            )
            .unwrap();
        let main = (7680u32 * 1088).next_multiple_of(65536);
        assert_eq!(layout.planes[0].stride, 7680);
        assert_eq!(layout.planes[0].size, main);
        assert_eq!(layout.planes[1].stride, 960);
        assert_eq!(layout.planes[1].offset, main);
        assert_eq!(layout.planes[1].size, (main / 256).next_multiple_of(4096));
    }

    #[test]
    fn gen12_rc_ccs_pow2_stride_on_xelpd() {
        let layout = calc()
            .with_pow2_compressed_stride(true)
            .compute(
                DrmFormat::XRGB8888,
                1920,
                1080,
                BufferUsage::RENDERING,
                Modifier::I915_Y_TILED_GEN12_RC_CCS,
            )
            .unwrap();
        assert_eq!(layout.planes[0].stride, 8192);
        assert_eq!(layout.planes[0].size, 8192 * 1152);
    }

    #[test]
    fn unknown_modifier_is_an_internal_inconsistency() {
        let err = calc()
            .compute(
                DrmFormat::XRGB8888,
                16,
                16,
                BufferUsage::TEXTURE,
                Modifier(0x0100_0000_0000_0042),
            )
            .unwrap_err();
        assert!(matches!(err, DriverError::InternalInconsistency(_)));
    }

    #[test]
    fn compressed_multi_plane_is_rejected() {
        let err = calc()
            .compute(
                DrmFormat::NV12,
                64,
                64,
                BufferUsage::TEXTURE,
                Modifier::I915_Y_TILED_CCS,
            )
            .unwrap_err();
        assert!(matches!(err, DriverError::InternalInconsistency(_)));
    }

    #[test]
    fn oversized_dimensions_fail_instead_of_wrapping() {
        let err = calc()
            .compute(
                DrmFormat::ABGR8888,
                65536,
                65536,
                BufferUsage::TEXTURE,
                Modifier::LINEAR,
            )
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));
    }

    #[test]
    fn row_stride_overflow_is_an_error_for_every_layout_path() {
        for modifier in [
            Modifier::LINEAR,
            Modifier::I915_Y_TILED_CCS,
            Modifier::I915_Y_TILED_GEN12_RC_CCS,
        ] {
            let err = calc()
                .compute(
                    DrmFormat::ABGR8888,
                    0x4000_0001,
                    1,
                    BufferUsage::TEXTURE,
                    modifier,
                )
                .unwrap_err();
            assert!(
                matches!(err, DriverError::InvalidArgument(_)),
                "{modifier:?}: {err:?}"
            );
        }
    }
}
