//! Pixel formats, format modifiers and usage masks shared by the gralloc crates.
//!
//! - [`DrmFormat`]: DRM fourcc codes, including the flexible Android pseudo formats
//! - [`Modifier`]: DRM format modifiers (tiling + compression layout ids)
//! - [`BufferUsage`] / [`MapFlags`]: requested buffer usage and CPU map access
//! - [`planar`]: per-format plane count, bytes per pixel and subsampling

#![forbid(unsafe_code)]

mod fourcc;
mod modifier;
pub mod planar;
mod usage;

pub use fourcc::{fourcc, DrmFormat};
pub use modifier::Modifier;
pub use planar::MAX_PLANES;
pub use usage::{BufferUsage, MapFlags};
