use std::fmt;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use gralloc_formats::{BufferUsage, DrmFormat, Modifier};

use crate::error::{DriverError, Result};
use crate::kernel::{DrmDevice, GemHandle};
use crate::layout::Layout;
use crate::mman::MappedRegion;

/// One kernel memory object plus the layout it was created (or imported) with.
///
/// The kernel handle is closed exactly once, when the `Bo` is dropped.
pub struct Bo {
    device: Arc<dyn DrmDevice>,
    handle: GemHandle,
    layout: Layout,
    usage: BufferUsage,
}

impl Bo {
    pub(crate) fn new(
        device: Arc<dyn DrmDevice>,
        handle: GemHandle,
        layout: Layout,
        usage: BufferUsage,
    ) -> Self {
        Self {
            device,
            handle,
            layout,
            usage,
        }
    }

    pub fn handle(&self) -> GemHandle {
        self.handle
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn format(&self) -> DrmFormat {
        self.layout.format
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    pub fn modifier(&self) -> Modifier {
        self.layout.modifier
    }

    pub fn num_planes(&self) -> usize {
        self.layout.num_planes
    }

    pub fn total_size(&self) -> u64 {
        self.layout.total_size
    }

    /// Export the memory object as a new PRIME fd.
    pub fn export_fd(&self) -> Result<OwnedFd> {
        self.device
            .export_fd(self.handle)
            .map_err(DriverError::kernel("export_fd"))
    }

    /// Map the whole allocation for CPU access.
    pub fn map(&self) -> Result<MappedRegion> {
        let len = usize::try_from(self.layout.total_size)
            .map_err(|_| DriverError::InvalidArgument("allocation too large to map"))?;
        self.device.map(self.handle, len).map_err(|err| {
            tracing::error!(handle = self.handle.0, error = %err, "buffer map failed");
            DriverError::Kernel {
                call: "map",
                source: err,
            }
        })
    }
}

impl fmt::Debug for Bo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bo")
            .field("device", &self.device.name())
            .field("handle", &self.handle)
            .field("layout", &self.layout)
            .field("usage", &self.usage)
            .finish()
    }
}

impl Drop for Bo {
    fn drop(&mut self) {
        if let Err(err) = self.device.gem_close(self.handle) {
            tracing::warn!(handle = self.handle.0, error = %err, "gem_close failed");
        }
    }
}
