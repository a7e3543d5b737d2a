use gralloc_formats::{BufferUsage, DrmFormat};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors surfaced by the driver layer (combination lookup, layout computation, kernel calls).
#[derive(Debug, Error)]
pub enum DriverError {
    /// No registered combination serves this format/usage pair.
    #[error("unsupported combination: format={format} usage={usage:?}")]
    Unsupported {
        format: DrmFormat,
        usage: BufferUsage,
    },

    /// The peer-supplied modifier list shares no entry with the backend preference list.
    #[error("no modifier in common with the peer modifier list")]
    NoCommonModifier,

    /// A value reached a stage that earlier stages should never have produced.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    /// A kernel driver call failed.
    #[error("{call} failed: {source}")]
    Kernel {
        call: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl DriverError {
    pub(crate) fn kernel(call: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Kernel { call, source }
    }
}
