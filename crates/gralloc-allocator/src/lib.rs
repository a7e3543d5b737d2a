//! Allocation service and per-buffer state on top of [`gralloc_drv`].
//!
//! [`Allocator`] is the service boundary: it turns [`BufferDescriptorInfo`] requests into
//! batches of [`GrallocHandle`]s, all or nothing. [`GrallocDriver`] keeps the per-process
//! registry of [`BufferObject`]s (reference counts, CPU locks, the shared metadata region).

mod allocator;
pub mod android;
mod buffer;
mod descriptor;
mod driver;
mod error;
mod handle;
mod metadata;

pub use allocator::{AllocationResult, Allocator};
pub use android::PixelFormat;
pub use buffer::{BufferObject, PlaneAddresses, Rectangle, ResourceInfo};
pub use descriptor::{
    AllocationDescriptor, BufferDescriptorInfo, ExtendableType, STANDARD_METADATA_DATASPACE,
};
pub use driver::GrallocDriver;
pub use error::{AllocationError, GrallocError, Result};
pub use handle::GrallocHandle;
pub use metadata::{
    BlendMode, BufferMetadata, ClientRegion, Cta861_3, Dataspace, ReservedRegion, SharedOptional,
    SharedValue, Smpte2086, XyColor, BUFFER_METADATA_MAX_NAME_SIZE,
};

pub use gralloc_drv::{DriverOptions, DrmDevice, MemfdDevice, XeRenderNode};
pub use gralloc_formats::{BufferUsage, DrmFormat, MapFlags, Modifier};
