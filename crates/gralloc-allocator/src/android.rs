//! Android graphics HAL vocabulary: pixel formats, usage bits, and their translation into DRM
//! formats and [`BufferUsage`].

use std::fmt;

use gralloc_formats::{BufferUsage, DrmFormat, MapFlags};

/// `android.hardware.graphics.common.PixelFormat`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelFormat(pub i32);

impl PixelFormat {
    pub const UNSPECIFIED: Self = Self(0);
    pub const RGBA_8888: Self = Self(0x1);
    pub const RGBX_8888: Self = Self(0x2);
    pub const RGB_888: Self = Self(0x3);
    pub const RGB_565: Self = Self(0x4);
    pub const BGRA_8888: Self = Self(0x5);
    pub const RGBA_FP16: Self = Self(0x16);
    pub const BLOB: Self = Self(0x21);
    pub const IMPLEMENTATION_DEFINED: Self = Self(0x22);
    pub const YCBCR_420_888: Self = Self(0x23);
    pub const RGBA_1010102: Self = Self(0x2b);
    pub const YV12: Self = Self(0x3231_5659);
    pub const YCBCR_P010: Self = Self(0x36);
    pub const R_8: Self = Self(0x38);

    /// The DRM format allocated for this HAL format, if any.
    pub fn to_drm_format(self) -> Option<DrmFormat> {
        Some(match self {
            Self::RGBA_1010102 => DrmFormat::ABGR2101010,
            Self::RGBA_8888 => DrmFormat::ABGR8888,
            Self::RGBA_FP16 => DrmFormat::ABGR16161616F,
            Self::RGBX_8888 => DrmFormat::XBGR8888,
            Self::BGRA_8888 => DrmFormat::ARGB8888,
            Self::RGB_565 => DrmFormat::RGB565,
            Self::RGB_888 => DrmFormat::BGR888,
            Self::YCBCR_420_888 => DrmFormat::FLEX_YCBCR_420_888,
            Self::YCBCR_P010 => DrmFormat::P010,
            Self::YV12 => DrmFormat::YVU420_ANDROID,
            Self::BLOB | Self::R_8 => DrmFormat::R8,
            Self::IMPLEMENTATION_DEFINED => DrmFormat::FLEX_IMPLEMENTATION_DEFINED,
            _ => return None,
        })
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::UNSPECIFIED => "UNSPECIFIED",
            Self::RGBA_8888 => "RGBA_8888",
            Self::RGBX_8888 => "RGBX_8888",
            Self::RGB_888 => "RGB_888",
            Self::RGB_565 => "RGB_565",
            Self::BGRA_8888 => "BGRA_8888",
            Self::RGBA_FP16 => "RGBA_FP16",
            Self::BLOB => "BLOB",
            Self::IMPLEMENTATION_DEFINED => "IMPLEMENTATION_DEFINED",
            Self::YCBCR_420_888 => "YCBCR_420_888",
            Self::RGBA_1010102 => "RGBA_1010102",
            Self::YV12 => "YV12",
            Self::YCBCR_P010 => "YCBCR_P010",
            Self::R_8 => "R_8",
            _ => return None,
        })
    }
}

impl fmt::Debug for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "PixelFormat({:#x})", self.0),
        }
    }
}

/// `android.hardware.graphics.common.BufferUsage` bits.
pub mod usage {
    pub const CPU_READ_MASK: u64 = 0xf;
    pub const CPU_READ_RARELY: u64 = 0x2;
    pub const CPU_READ_OFTEN: u64 = 0x3;
    pub const CPU_WRITE_MASK: u64 = 0xf0;
    pub const CPU_WRITE_RARELY: u64 = 0x20;
    pub const CPU_WRITE_OFTEN: u64 = 0x30;
    pub const GPU_TEXTURE: u64 = 1 << 8;
    pub const GPU_RENDER_TARGET: u64 = 1 << 9;
    pub const HW_2D: u64 = 1 << 10;
    pub const COMPOSER_OVERLAY: u64 = 1 << 11;
    pub const COMPOSER_CLIENT_TARGET: u64 = 1 << 12;
    pub const EXTERNAL_DISP: u64 = 1 << 13;
    pub const PROTECTED: u64 = 1 << 14;
    pub const COMPOSER_CURSOR: u64 = 1 << 15;
    pub const VIDEO_ENCODER: u64 = 1 << 16;
    pub const CAMERA_OUTPUT: u64 = 1 << 17;
    pub const CAMERA_INPUT: u64 = 1 << 18;
    pub const RENDERSCRIPT: u64 = 1 << 20;
    pub const VIDEO_DECODER: u64 = 1 << 22;
    pub const SENSOR_DIRECT_DATA: u64 = 1 << 23;
    pub const GPU_DATA_BUFFER: u64 = 1 << 24;
    /// Private front-rendering bit used before the public one existed.
    pub const FRONT_RENDERING_PRIVATE: u64 = 1 << 28;
    pub const FRONT_BUFFER: u64 = 1 << 32;
    pub const FRONT_RENDERING_MASK: u64 = FRONT_RENDERING_PRIVATE | FRONT_BUFFER;
}

/// HAL usage bit groups and what they become, in matching order.
///
/// A group matches when any of its bits is set, and all of its bits are consumed. The CPU groups
/// therefore map any read (or write) frequency to the `OFTEN` flag.
const USAGE_TABLE: &[(u64, BufferUsage)] = &[
    (usage::CPU_READ_OFTEN, BufferUsage::SW_READ_OFTEN),
    (usage::CPU_READ_RARELY, BufferUsage::SW_READ_RARELY),
    (usage::CPU_WRITE_OFTEN, BufferUsage::SW_WRITE_OFTEN),
    (usage::CPU_WRITE_RARELY, BufferUsage::SW_WRITE_RARELY),
    (usage::GPU_TEXTURE, BufferUsage::TEXTURE),
    (usage::GPU_RENDER_TARGET, BufferUsage::RENDERING),
    (usage::HW_2D, BufferUsage::RENDERING),
    // The composer wants the display engine but can fall back to GL composition.
    (
        usage::COMPOSER_OVERLAY,
        BufferUsage::SCANOUT.union(BufferUsage::TEXTURE),
    ),
    (usage::COMPOSER_CLIENT_TARGET, BufferUsage::empty()),
    (usage::EXTERNAL_DISP, BufferUsage::empty()),
    (usage::PROTECTED, BufferUsage::PROTECTED),
    (usage::COMPOSER_CURSOR, BufferUsage::empty()),
    (usage::VIDEO_ENCODER, BufferUsage::HW_VIDEO_ENCODER),
    (usage::CAMERA_OUTPUT, BufferUsage::CAMERA_WRITE),
    (usage::CAMERA_INPUT, BufferUsage::CAMERA_READ),
    (usage::RENDERSCRIPT, BufferUsage::RENDERSCRIPT),
    (usage::VIDEO_DECODER, BufferUsage::HW_VIDEO_DECODER),
    (usage::SENSOR_DIRECT_DATA, BufferUsage::SENSOR_DIRECT_DATA),
    (usage::GPU_DATA_BUFFER, BufferUsage::GPU_DATA_BUFFER),
    (usage::FRONT_RENDERING_MASK, BufferUsage::FRONT_RENDERING),
];

/// Translate HAL usage bits. Returns `None` when bits without a translation remain.
pub fn convert_usage(hal_usage: u64) -> Option<BufferUsage> {
    let mut remaining = hal_usage;
    let mut flags = BufferUsage::empty();
    for &(mask, mapped) in USAGE_TABLE {
        if remaining & mask != 0 {
            remaining &= !mask;
            flags |= mapped;
        }
    }
    if remaining != 0 {
        tracing::error!(unhandled = format_args!("{remaining:#x}"), "unhandled gralloc usage");
        return None;
    }
    Some(flags)
}

/// CPU access implied by HAL usage.
pub fn convert_map_usage(hal_usage: u64) -> MapFlags {
    let mut flags = MapFlags::empty();
    if hal_usage & usage::CPU_READ_MASK != 0 {
        flags |= MapFlags::READ;
    }
    if hal_usage & usage::CPU_WRITE_MASK != 0 {
        flags |= MapFlags::WRITE;
    }
    flags
}
