use gralloc_drv::DriverError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GrallocError>;

/// Error codes reported across the allocation-service boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AllocationError {
    BadDescriptor = 1,
    NoResources = 2,
    Unsupported = 3,
}

impl AllocationError {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    pub const fn from_i32(v: i32) -> Option<Self> {
        match v {
            1 => Some(Self::BadDescriptor),
            2 => Some(Self::NoResources),
            3 => Some(Self::Unsupported),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum GrallocError {
    /// The request is malformed or could not be decoded.
    #[error("bad descriptor: {0}")]
    BadDescriptor(String),

    /// The format/usage/modifier combination is not served; retrying the same request is futile.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The kernel (or the OS) could not provide the memory.
    #[error("allocation failed: {0}")]
    NoResources(#[source] DriverError),

    #[error("driver is not initialized")]
    DriverUnavailable,

    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("buffer was not locked")]
    NotLocked,

    #[error("buffer does not have a reserved region")]
    NoReservedRegion,

    #[error("failed to map buffer: {0}")]
    MapFailed(#[source] DriverError),

    #[error(
        "access region {x},{y} {width}x{height} exceeds buffer {buffer_width}x{buffer_height}"
    )]
    InvalidRect {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        buffer_width: u32,
        buffer_height: u32,
    },

    /// The handle does not refer to a buffer registered in this process.
    #[error("invalid reference: buffer {0} is not registered")]
    UnknownBuffer(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GrallocError {
    pub fn allocation_error(&self) -> AllocationError {
        match self {
            Self::BadDescriptor(_) => AllocationError::BadDescriptor,
            Self::Unsupported(_) => AllocationError::Unsupported,
            _ => AllocationError::NoResources,
        }
    }
}

impl From<DriverError> for GrallocError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Unsupported { .. } | DriverError::NoCommonModifier => {
                Self::Unsupported(err.to_string())
            }
            DriverError::InternalInconsistency(msg) => Self::InternalInconsistency(msg),
            DriverError::InvalidArgument(msg) => Self::BadDescriptor(msg.to_string()),
            DriverError::UnsupportedDevice(_) | DriverError::Kernel { .. } => Self::NoResources(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gralloc_drv::{BufferUsage, DrmFormat};

    #[test]
    fn driver_errors_map_onto_service_codes() {
        let unsupported: GrallocError = DriverError::Unsupported {
            format: DrmFormat::R8,
            usage: BufferUsage::SCANOUT,
        }
        .into();
        assert_eq!(unsupported.allocation_error(), AllocationError::Unsupported);

        let kernel: GrallocError = DriverError::Kernel {
            call: "gem_create",
            source: std::io::Error::from_raw_os_error(12),
        }
        .into();
        assert_eq!(kernel.allocation_error(), AllocationError::NoResources);

        let bad: GrallocError = DriverError::InvalidArgument("zero-sized buffer").into();
        assert_eq!(bad.allocation_error(), AllocationError::BadDescriptor);

        assert_eq!(
            GrallocError::NotLocked.allocation_error(),
            AllocationError::NoResources
        );
    }

    #[test]
    fn allocation_error_codes_are_stable() {
        assert_eq!(AllocationError::BadDescriptor.as_i32(), 1);
        assert_eq!(AllocationError::NoResources.as_i32(), 2);
        assert_eq!(AllocationError::Unsupported.as_i32(), 3);
        assert_eq!(AllocationError::from_i32(3), Some(AllocationError::Unsupported));
        assert_eq!(AllocationError::from_i32(0), None);
    }
}
