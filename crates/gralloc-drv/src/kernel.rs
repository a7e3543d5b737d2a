//! Contract between the allocation layer and the graphics kernel driver.
//!
//! Everything the layer needs from the kernel is expressed through [`DrmDevice`]: query device
//! capabilities, create a memory object of a given size, map it, export/import it as a PRIME fd,
//! and close it. [`crate::XeRenderNode`] talks to a real Xe render node; [`crate::MemfdDevice`]
//! backs objects with anonymous shared memory.

use std::fmt;
use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};

use crate::mman::MappedRegion;

/// A kernel memory-object handle, local to one device file description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GemHandle(pub u32);

/// Device capabilities reported by the kernel driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    /// PCI device id.
    pub device_id: u16,
    pub revision: u16,
    pub has_vram: bool,
    pub min_alignment: u64,
    pub va_bits: u8,
}

/// CPU caching mode requested for a new memory object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum CpuCaching {
    WriteBack = 1,
    WriteCombined = 2,
}

/// Parameters for creating a memory object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GemCreate {
    pub size: u64,
    /// The object will be scanned out by the display engine.
    pub scanout: bool,
    pub cpu_caching: CpuCaching,
}

pub trait DrmDevice: Send + Sync + fmt::Debug {
    /// Short driver name, used in logs.
    fn name(&self) -> &str;

    fn query_config(&self) -> io::Result<DeviceConfig>;

    fn gem_create(&self, req: &GemCreate) -> io::Result<GemHandle>;

    fn gem_close(&self, handle: GemHandle) -> io::Result<()>;

    /// Export a memory object as a shareable PRIME fd.
    fn export_fd(&self, handle: GemHandle) -> io::Result<OwnedFd>;

    /// Import a PRIME fd exported by this or another process.
    fn import_fd(&self, fd: BorrowedFd<'_>) -> io::Result<GemHandle>;

    /// Map the first `len` bytes of a memory object for CPU access.
    fn map(&self, handle: GemHandle, len: usize) -> io::Result<MappedRegion>;
}
