use crate::mman;

/// Linear stride alignment in bytes.
#[cfg(not(feature = "linear-align-256"))]
pub const DEFAULT_LINEAR_STRIDE_ALIGNMENT: u32 = 64;
/// Linear stride alignment in bytes, widened so other drivers' linear-aligned import paths accept
/// the buffers.
#[cfg(feature = "linear-align-256")]
pub const DEFAULT_LINEAR_STRIDE_ALIGNMENT: u32 = 256;

pub const DEFAULT_MAX_TEXTURE_2D_SIZE: u32 = 16384;

/// Driver-session configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverOptions {
    /// Allow compressed (CCS) modifiers.
    pub compression: bool,
    pub linear_stride_alignment: u32,
    /// Largest width or height accepted by the allocation service.
    pub max_texture_2d_size: u32,
    pub page_size: u64,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            compression: true,
            linear_stride_alignment: DEFAULT_LINEAR_STRIDE_ALIGNMENT,
            max_texture_2d_size: DEFAULT_MAX_TEXTURE_2D_SIZE,
            page_size: mman::page_size(),
        }
    }
}

impl DriverOptions {
    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_linear_stride_alignment(mut self, alignment: u32) -> Self {
        self.linear_stride_alignment = alignment;
        self
    }

    pub fn with_max_texture_2d_size(mut self, size: u32) -> Self {
        self.max_texture_2d_size = size;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }
}
