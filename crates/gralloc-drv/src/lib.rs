//! Driver layer of the buffer allocator: kernel device contract, combination table, modifier
//! negotiation, layout computation and the Xe backend.
//!
//! A [`Driver`] is one session against a kernel device. It owns the immutable
//! [`CombinationTable`] built for that device and turns `(width, height, format, usage)` requests
//! into laid-out kernel allocations ([`Bo`]).

mod backend;
mod bo;
mod combination;
mod driver;
mod error;
mod kernel;
mod layout;
mod memfd;
pub mod mman;
mod negotiate;
mod options;
pub mod xe;

pub use backend::{resolve_format_and_usage, Backend};
pub use bo::Bo;
pub use combination::{Combination, CombinationTable, FormatMetadata};
pub use driver::Driver;
pub use error::{DriverError, Result};
pub use kernel::{CpuCaching, DeviceConfig, DrmDevice, GemCreate, GemHandle};
pub use layout::{Layout, LayoutCalculator, PlaneLayout, Tiling};
pub use memfd::{MemfdDevice, DEFAULT_MEMFD_DEVICE_ID};
pub use mman::MappedRegion;
pub use negotiate::{pick_modifier, ModifierNegotiator, ModifierOverride};
pub use options::{DriverOptions, DEFAULT_LINEAR_STRIDE_ALIGNMENT, DEFAULT_MAX_TEXTURE_2D_SIZE};
pub use xe::{XeBackend, XeDeviceInfo, XeRenderNode};

pub use gralloc_formats::{BufferUsage, DrmFormat, MapFlags, Modifier, MAX_PLANES};
