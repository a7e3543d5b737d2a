use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use gralloc_drv::{Bo, Driver, MappedRegion};
use gralloc_formats::{DrmFormat, MapFlags, Modifier, MAX_PLANES};

use crate::descriptor::AllocationDescriptor;
use crate::error::{GrallocError, Result};
use crate::handle::GrallocHandle;
use crate::metadata::{BlendMode, ClientRegion, Cta861_3, Dataspace, ReservedRegion, Smpte2086};

/// A CPU access region in pixels. The all-zero rectangle means the whole buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub const WHOLE: Self = Self {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };

    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_whole(&self) -> bool {
        *self == Self::WHOLE
    }
}

/// Per-plane CPU addresses returned by [`BufferObject::lock`].
///
/// Locking without access flags takes a lock but maps nothing, so every entry is `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaneAddresses {
    planes: [Option<NonNull<u8>>; MAX_PLANES],
}

impl PlaneAddresses {
    pub fn plane(&self, plane: usize) -> Option<NonNull<u8>> {
        self.planes.get(plane).copied().flatten()
    }

    pub fn as_array(&self) -> [Option<NonNull<u8>>; MAX_PLANES] {
        self.planes
    }
}

/// Plane strides and offsets plus modifier, as consumed by display and codec clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceInfo {
    pub strides: [u32; MAX_PLANES],
    pub offsets: [u32; MAX_PLANES],
    pub modifier: Modifier,
}

#[derive(Debug)]
enum LockState {
    Unlocked,
    Locked {
        count: u32,
        /// Present once a lock with access flags has mapped the buffer.
        mapping: Option<MappedRegion>,
    },
}

/// A process-local wrapper around one allocation: its kernel object, its handle, the CPU lock
/// state and the lazily mapped reserved region.
///
/// Lock and reference counts are plain per-process counters. The kernel object outlives this
/// wrapper for as long as other processes hold fds to it.
pub struct BufferObject {
    // Field order is drop order: unmap before closing the kernel object and the handle fds.
    lock: LockState,
    reserved: Option<ReservedRegion>,
    driver: Arc<Driver>,
    bo: Bo,
    handle: GrallocHandle,
    refcount: u32,
}

impl BufferObject {
    pub(crate) fn new(driver: Arc<Driver>, bo: Bo, handle: GrallocHandle) -> Self {
        Self {
            lock: LockState::Unlocked,
            reserved: None,
            driver,
            bo,
            handle,
            refcount: 1,
        }
    }

    pub fn id(&self) -> u32 {
        self.handle.id
    }

    pub fn handle(&self) -> &GrallocHandle {
        &self.handle
    }

    pub fn bo(&self) -> &Bo {
        &self.bo
    }

    pub fn width(&self) -> u32 {
        self.handle.width
    }

    pub fn height(&self) -> u32 {
        self.handle.height
    }

    pub fn pixel_stride(&self) -> u32 {
        self.handle.pixel_stride
    }

    pub fn format(&self) -> DrmFormat {
        self.handle.format
    }

    pub fn modifier(&self) -> Modifier {
        self.handle.modifier
    }

    pub fn total_size(&self) -> u64 {
        self.handle.total_size
    }

    pub fn num_planes(&self) -> usize {
        self.handle.num_planes
    }

    pub fn plane_offset(&self, plane: usize) -> u32 {
        self.handle.offsets[plane]
    }

    pub fn plane_stride(&self, plane: usize) -> u32 {
        self.handle.strides[plane]
    }

    pub fn plane_size(&self, plane: usize) -> u32 {
        self.handle.sizes[plane]
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// Current lock count.
    pub fn lock_count(&self) -> u32 {
        match self.lock {
            LockState::Unlocked => 0,
            LockState::Locked { count, .. } => count,
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(
            self.lock,
            LockState::Locked {
                mapping: Some(_),
                ..
            }
        )
    }

    pub fn increase_refcount(&mut self) -> u32 {
        self.refcount += 1;
        self.refcount
    }

    /// # Panics
    ///
    /// Panics when the count is already zero: that is a double release.
    pub fn decrease_refcount(&mut self) -> u32 {
        assert!(self.refcount > 0, "buffer {} released twice", self.id());
        self.refcount -= 1;
        self.refcount
    }

    fn check_rect(&self, rect: Rectangle) -> Result<()> {
        if rect.is_whole() {
            return Ok(());
        }
        let fits = |start: u32, len: u32, limit: u32| {
            start.checked_add(len).is_some_and(|end| end <= limit)
        };
        if fits(rect.x, rect.width, self.width()) && fits(rect.y, rect.height, self.height()) {
            Ok(())
        } else {
            Err(GrallocError::InvalidRect {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                buffer_width: self.width(),
                buffer_height: self.height(),
            })
        }
    }

    /// Base address of the CPU mapping, mapping the buffer if this is the first mapped lock.
    fn mapping_for_lock(&mut self) -> Result<*mut u8> {
        if let LockState::Locked {
            mapping: Some(mapping),
            ..
        } = &self.lock
        {
            self.driver.invalidate(&self.bo, mapping);
            return Ok(mapping.as_ptr());
        }

        let mapping = self.bo.map().map_err(GrallocError::MapFailed)?;
        let base = mapping.as_ptr();
        self.lock = match std::mem::replace(&mut self.lock, LockState::Unlocked) {
            LockState::Unlocked => LockState::Locked {
                count: 0,
                mapping: Some(mapping),
            },
            LockState::Locked { count, .. } => LockState::Locked {
                count,
                mapping: Some(mapping),
            },
        };
        Ok(base)
    }

    /// Take a CPU lock. With non-empty `map_flags` the buffer is mapped (or the existing mapping is
    /// invalidated and reused) and per-plane addresses are returned.
    pub fn lock(&mut self, rect: Rectangle, map_flags: MapFlags) -> Result<PlaneAddresses> {
        self.check_rect(rect)?;

        let mut addresses = PlaneAddresses::default();
        if !map_flags.is_empty() {
            let base = self.mapping_for_lock()?;
            for (plane, slot) in addresses
                .planes
                .iter_mut()
                .enumerate()
                .take(self.num_planes())
            {
                *slot = NonNull::new(base.wrapping_add(self.plane_offset(plane) as usize));
            }
        }

        if let LockState::Locked { count, .. } = &mut self.lock {
            *count += 1;
        } else {
            self.lock = LockState::Locked {
                count: 1,
                mapping: None,
            };
        }
        Ok(addresses)
    }

    /// Release one CPU lock. The last unlock flushes CPU caches and unmaps the buffer.
    pub fn unlock(&mut self) -> Result<()> {
        let LockState::Locked { count, mapping } = &mut self.lock else {
            tracing::error!(id = self.id(), "buffer was not locked");
            return Err(GrallocError::NotLocked);
        };
        *count -= 1;
        if *count == 0 {
            if let Some(mapping) = mapping.take() {
                self.driver.flush(&self.bo, &mapping);
            }
            self.lock = LockState::Unlocked;
        }
        Ok(())
    }

    fn locked_mapping(&self) -> Result<Option<&MappedRegion>> {
        match &self.lock {
            LockState::Unlocked => {
                tracing::error!(id = self.id(), "buffer was not locked");
                Err(GrallocError::NotLocked)
            }
            LockState::Locked { mapping, .. } => Ok(mapping.as_ref()),
        }
    }

    pub fn invalidate(&self) -> Result<()> {
        if let Some(mapping) = self.locked_mapping()? {
            self.driver.invalidate(&self.bo, mapping);
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        if let Some(mapping) = self.locked_mapping()? {
            self.driver.flush(&self.bo, mapping);
        }
        Ok(())
    }

    pub fn resource_info(&self) -> ResourceInfo {
        let layout = self.bo.layout();
        ResourceInfo {
            strides: layout.strides(),
            offsets: layout.offsets(),
            modifier: layout.modifier,
        }
    }

    /// The reserved region, mapped on first use and kept until the buffer is destroyed.
    pub fn reserved_region(&mut self) -> Result<&ReservedRegion> {
        if self.reserved.is_none() {
            let Some(fd) = self.handle.reserved_region_fd() else {
                tracing::error!(id = self.id(), "buffer does not have a reserved region");
                return Err(GrallocError::NoReservedRegion);
            };
            let size = usize::try_from(self.handle.reserved_region_size).map_err(|_| {
                GrallocError::BadDescriptor("reserved region too large to map".to_owned())
            })?;
            let region = ReservedRegion::map(fd, size).map_err(|err| {
                tracing::error!(id = self.handle.id, error = %err, "failed to map reserved region");
                err
            })?;
            self.reserved = Some(region);
        }
        self.reserved.as_ref().ok_or(GrallocError::NoReservedRegion)
    }

    /// Client-owned bytes after the metadata record.
    pub fn client_reserved_region(&mut self) -> Result<ClientRegion<'_>> {
        Ok(self.reserved_region()?.client_region())
    }

    /// Write the descriptor's name and color metadata into the reserved region.
    pub fn initialize_metadata(&mut self, desc: &AllocationDescriptor) -> Result<()> {
        let region = self.reserved_region()?;
        region.set_name(&desc.name);
        region.set_dataspace(desc.dataspace);
        region.set_blend_mode(desc.blend_mode);
        region.set_cta861_3(desc.cta861_3);
        region.set_smpte2086(desc.smpte2086);
        Ok(())
    }

    pub fn name(&mut self) -> Result<String> {
        Ok(self.reserved_region()?.name())
    }

    pub fn blend_mode(&mut self) -> Result<BlendMode> {
        Ok(self.reserved_region()?.blend_mode())
    }

    pub fn set_blend_mode(&mut self, blend_mode: BlendMode) -> Result<()> {
        self.reserved_region()?.set_blend_mode(blend_mode);
        Ok(())
    }

    pub fn dataspace(&mut self) -> Result<Dataspace> {
        Ok(self.reserved_region()?.dataspace())
    }

    pub fn set_dataspace(&mut self, dataspace: Dataspace) -> Result<()> {
        self.reserved_region()?.set_dataspace(dataspace);
        Ok(())
    }

    pub fn cta861_3(&mut self) -> Result<Option<Cta861_3>> {
        Ok(self.reserved_region()?.cta861_3())
    }

    pub fn set_cta861_3(&mut self, value: Option<Cta861_3>) -> Result<()> {
        self.reserved_region()?.set_cta861_3(value);
        Ok(())
    }

    pub fn smpte2086(&mut self) -> Result<Option<Smpte2086>> {
        Ok(self.reserved_region()?.smpte2086())
    }

    pub fn set_smpte2086(&mut self, value: Option<Smpte2086>) -> Result<()> {
        self.reserved_region()?.set_smpte2086(value);
        Ok(())
    }
}

impl fmt::Debug for BufferObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferObject")
            .field("id", &self.handle.id)
            .field("bo", &self.bo)
            .field("refcount", &self.refcount)
            .field("lock_count", &self.lock_count())
            .field("reserved_mapped", &self.reserved.is_some())
            .finish()
    }
}
