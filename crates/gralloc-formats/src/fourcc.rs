use std::fmt;

/// Build a DRM fourcc code from its four ASCII characters (little-endian packing).
pub const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | (b as u32) << 8 | (c as u32) << 16 | (d as u32) << 24
}

/// A DRM pixel format (`DRM_FORMAT_*` fourcc code).
///
/// Besides the real fourcc codes, a few "flexible" pseudo formats are defined that must be
/// resolved by the driver into a concrete format before any layout work happens.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DrmFormat(pub u32);

impl DrmFormat {
    pub const NONE: Self = Self(0);

    pub const R8: Self = Self(fourcc(b'R', b'8', b' ', b' '));
    pub const RGB565: Self = Self(fourcc(b'R', b'G', b'1', b'6'));
    pub const BGR888: Self = Self(fourcc(b'B', b'G', b'2', b'4'));

    pub const XRGB8888: Self = Self(fourcc(b'X', b'R', b'2', b'4'));
    pub const XBGR8888: Self = Self(fourcc(b'X', b'B', b'2', b'4'));
    pub const ARGB8888: Self = Self(fourcc(b'A', b'R', b'2', b'4'));
    pub const ABGR8888: Self = Self(fourcc(b'A', b'B', b'2', b'4'));

    pub const XRGB2101010: Self = Self(fourcc(b'X', b'R', b'3', b'0'));
    pub const XBGR2101010: Self = Self(fourcc(b'X', b'B', b'3', b'0'));
    pub const ARGB2101010: Self = Self(fourcc(b'A', b'R', b'3', b'0'));
    pub const ABGR2101010: Self = Self(fourcc(b'A', b'B', b'3', b'0'));

    pub const ABGR16161616F: Self = Self(fourcc(b'A', b'B', b'4', b'H'));

    pub const NV12: Self = Self(fourcc(b'N', b'V', b'1', b'2'));
    pub const P010: Self = Self(fourcc(b'P', b'0', b'1', b'0'));
    pub const P016: Self = Self(fourcc(b'P', b'0', b'1', b'6'));
    pub const YVU420: Self = Self(fourcc(b'Y', b'V', b'1', b'2'));

    /// Android's `HAL_PIXEL_FORMAT_YV12`: YVU420 with Android-specific chroma stride rules.
    pub const YVU420_ANDROID: Self = Self(fourcc(b'9', b'9', b'9', b'7'));

    /// Pseudo format: implementation-defined, resolved from the requested usage.
    pub const FLEX_IMPLEMENTATION_DEFINED: Self = Self(fourcc(b'9', b'9', b'9', b'8'));
    /// Pseudo format: any 4:2:0 YCbCr layout.
    pub const FLEX_YCBCR_420_888: Self = Self(fourcc(b'9', b'9', b'9', b'9'));

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn is_flexible(self) -> bool {
        self.0 == Self::FLEX_IMPLEMENTATION_DEFINED.0 || self.0 == Self::FLEX_YCBCR_420_888.0
    }

    /// The four fourcc characters, with non-printable bytes replaced by `?`.
    pub fn fourcc_string(self) -> String {
        self.0
            .to_le_bytes()
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '?'
                }
            })
            .collect()
    }
}

impl From<u32> for DrmFormat {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl fmt::Debug for DrmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DrmFormat({:?} {:#010x})", self.fourcc_string(), self.0)
    }
}

impl fmt::Display for DrmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fourcc_string())
    }
}
