//! Per-format plane geometry.
//!
//! Every concrete format maps to a [`PlanarLayout`] describing how many planes it has, the bytes
//! per pixel of each plane, and the horizontal/vertical subsampling of each plane relative to the
//! luma (or only) plane. Stride/height helpers derive the *unaligned* per-plane geometry from it;
//! hardware alignment is applied later by the backend layout calculator.

use crate::DrmFormat;

/// Maximum number of planes any supported format (or compressed layout) uses.
pub const MAX_PLANES: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanarLayout {
    pub num_planes: usize,
    pub horizontal_subsampling: [u32; MAX_PLANES],
    pub vertical_subsampling: [u32; MAX_PLANES],
    pub bytes_per_pixel: [u32; MAX_PLANES],
}

const fn packed(bytes_per_pixel: u32) -> PlanarLayout {
    PlanarLayout {
        num_planes: 1,
        horizontal_subsampling: [1, 0, 0, 0],
        vertical_subsampling: [1, 0, 0, 0],
        bytes_per_pixel: [bytes_per_pixel, 0, 0, 0],
    }
}

const PACKED_1BPP: PlanarLayout = packed(1);
const PACKED_2BPP: PlanarLayout = packed(2);
const PACKED_3BPP: PlanarLayout = packed(3);
const PACKED_4BPP: PlanarLayout = packed(4);
const PACKED_8BPP: PlanarLayout = packed(8);

const BIPLANAR_YUV420: PlanarLayout = PlanarLayout {
    num_planes: 2,
    horizontal_subsampling: [1, 2, 0, 0],
    vertical_subsampling: [1, 2, 0, 0],
    bytes_per_pixel: [1, 2, 0, 0],
};

const BIPLANAR_YUV420_2BPP: PlanarLayout = PlanarLayout {
    num_planes: 2,
    horizontal_subsampling: [1, 2, 0, 0],
    vertical_subsampling: [1, 2, 0, 0],
    bytes_per_pixel: [2, 4, 0, 0],
};

const TRIPLANAR_YUV420: PlanarLayout = PlanarLayout {
    num_planes: 3,
    horizontal_subsampling: [1, 2, 2, 0],
    vertical_subsampling: [1, 2, 2, 0],
    bytes_per_pixel: [1, 1, 1, 0],
};

/// Look up the plane geometry for a concrete format.
///
/// Returns `None` for unknown formats and for the flexible pseudo formats, which have no
/// geometry until resolved.
pub fn layout_from_format(format: DrmFormat) -> Option<&'static PlanarLayout> {
    let layout = match format {
        DrmFormat::R8 => &PACKED_1BPP,
        DrmFormat::RGB565 => &PACKED_2BPP,
        DrmFormat::BGR888 => &PACKED_3BPP,
        DrmFormat::XRGB8888
        | DrmFormat::XBGR8888
        | DrmFormat::ARGB8888
        | DrmFormat::ABGR8888
        | DrmFormat::XRGB2101010
        | DrmFormat::XBGR2101010
        | DrmFormat::ARGB2101010
        | DrmFormat::ABGR2101010 => &PACKED_4BPP,
        DrmFormat::ABGR16161616F => &PACKED_8BPP,
        DrmFormat::NV12 => &BIPLANAR_YUV420,
        DrmFormat::P010 | DrmFormat::P016 => &BIPLANAR_YUV420_2BPP,
        DrmFormat::YVU420 | DrmFormat::YVU420_ANDROID => &TRIPLANAR_YUV420,
        _ => return None,
    };
    Some(layout)
}

pub fn num_planes_from_format(format: DrmFormat) -> usize {
    layout_from_format(format).map_or(0, |l| l.num_planes)
}

pub fn bytes_per_pixel_from_format(format: DrmFormat, plane: usize) -> u32 {
    layout_from_format(format).map_or(0, |l| l.bytes_per_pixel[plane])
}

pub(crate) const fn div_round_up(value: u32, divisor: u32) -> u32 {
    value.div_ceil(divisor)
}

pub(crate) const fn align_u32(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Unaligned stride in bytes of `plane` for an image `width` pixels wide.
///
/// Android YV12 requires the luma stride to be a multiple of 32 and the chroma strides to be a
/// multiple of 16. `None` for formats without a layout and for strides that do not fit in a `u32`.
pub fn stride_from_format(format: DrmFormat, width: u32, plane: usize) -> Option<u32> {
    let layout = layout_from_format(format)?;
    let plane_width = div_round_up(width, layout.horizontal_subsampling[plane]);
    let stride = plane_width.checked_mul(layout.bytes_per_pixel[plane])?;

    if format == DrmFormat::YVU420_ANDROID {
        stride.checked_next_multiple_of(if plane == 0 { 32 } else { 16 })
    } else {
        Some(stride)
    }
}

/// Unaligned row count of `plane` for an image `height` rows tall.
pub fn height_from_format(format: DrmFormat, height: u32, plane: usize) -> u32 {
    layout_from_format(format).map_or(0, |l| div_round_up(height, l.vertical_subsampling[plane]))
}

/// Stride of a secondary plane given the stride of plane 0.
///
/// Only the three-plane YVU layouts halve the luma stride; the two-plane formats interleave both
/// chroma components so their chroma rows are as wide (in bytes) as the luma rows.
pub fn subsample_stride(format: DrmFormat, stride: u32, stride_align: u32, plane: usize) -> u32 {
    if plane != 0 && matches!(format, DrmFormat::YVU420 | DrmFormat::YVU420_ANDROID) {
        align_u32(div_round_up(stride, 2), stride_align.max(1))
    } else {
        stride
    }
}

/// Byte size of `plane` for a given plane stride and luma-plane height, if it fits in a `u32`.
pub fn size_from_format(
    format: DrmFormat,
    plane_stride: u32,
    height: u32,
    plane: usize,
) -> Option<u32> {
    plane_stride.checked_mul(height_from_format(format, height, plane))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn packed_formats_are_single_plane() {
        for format in [
            DrmFormat::R8,
            DrmFormat::RGB565,
            DrmFormat::BGR888,
            DrmFormat::ABGR8888,
            DrmFormat::ARGB2101010,
            DrmFormat::ABGR16161616F,
        ] {
            assert_eq!(num_planes_from_format(format), 1, "{format:?}");
        }
        assert_eq!(bytes_per_pixel_from_format(DrmFormat::ABGR16161616F, 0), 8);
    }

    #[test]
    fn nv12_chroma_plane_is_half_height_full_stride() {
        assert_eq!(num_planes_from_format(DrmFormat::NV12), 2);
        assert_eq!(stride_from_format(DrmFormat::NV12, 101, 0), Some(101));
        assert_eq!(stride_from_format(DrmFormat::NV12, 101, 1), Some(102));
        assert_eq!(height_from_format(DrmFormat::NV12, 33, 1), 17);
    }

    #[test]
    fn yv12_android_strides_follow_android_rules() {
        assert_eq!(stride_from_format(DrmFormat::YVU420_ANDROID, 100, 0), Some(128));
        assert_eq!(stride_from_format(DrmFormat::YVU420_ANDROID, 100, 1), Some(64));
        assert_eq!(subsample_stride(DrmFormat::YVU420_ANDROID, 128, 1, 2), 64);
        assert_eq!(subsample_stride(DrmFormat::NV12, 128, 1, 1), 128);
    }

    #[test]
    fn unknown_and_flexible_formats_have_no_layout() {
        assert!(layout_from_format(DrmFormat(0xdead_beef)).is_none());
        assert!(layout_from_format(DrmFormat::FLEX_YCBCR_420_888).is_none());
        assert_eq!(num_planes_from_format(DrmFormat::FLEX_IMPLEMENTATION_DEFINED), 0);
        assert_eq!(stride_from_format(DrmFormat::FLEX_YCBCR_420_888, 64, 0), None);
    }

    #[test]
    fn strides_and_sizes_that_do_not_fit_are_none() {
        assert_eq!(stride_from_format(DrmFormat::ABGR8888, 0x4000_0001, 0), None);
        assert_eq!(stride_from_format(DrmFormat::ABGR8888, 0x3fff_ffff, 0), Some(0xffff_fffc));
        assert_eq!(stride_from_format(DrmFormat::YVU420_ANDROID, u32::MAX, 0), None);
        assert_eq!(size_from_format(DrmFormat::NV12, 0x10_0000, 0x1000, 0), None);
        assert_eq!(size_from_format(DrmFormat::NV12, 0x10_0000, 0x1000, 1), Some(0x8000_0000));
    }
}
