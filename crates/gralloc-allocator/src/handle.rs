use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use gralloc_drv::{Layout, PlaneLayout, Tiling};
use gralloc_formats::{BufferUsage, DrmFormat, Modifier, MAX_PLANES};

use crate::android::PixelFormat;
use crate::error::{GrallocError, Result};

/// The externally visible description of an allocated buffer.
///
/// Carries one fd per plane and, when the buffer has a reserved region, one more fd for it at
/// index `num_planes`. Duplicating a handle duplicates every fd; each copy owns its own.
#[derive(Debug)]
pub struct GrallocHandle {
    /// Process-unique buffer id assigned at allocation.
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub format: DrmFormat,
    pub modifier: Modifier,
    pub usage: BufferUsage,
    pub num_planes: usize,
    pub strides: [u32; MAX_PLANES],
    pub offsets: [u32; MAX_PLANES],
    pub sizes: [u32; MAX_PLANES],
    /// Buffer size plus reserved region size.
    pub total_size: u64,
    pub reserved_region_size: u64,
    pub bytes_per_pixel: u32,
    /// Plane 0 stride in pixels.
    pub pixel_stride: u32,
    pub droid_format: PixelFormat,
    pub droid_usage: u64,
    pub(crate) fds: Vec<OwnedFd>,
}

impl GrallocHandle {
    /// Duplicate the handle, including every fd it carries.
    pub fn try_clone(&self) -> io::Result<Self> {
        let fds = self
            .fds
            .iter()
            .map(OwnedFd::try_clone)
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self {
            id: self.id,
            width: self.width,
            height: self.height,
            format: self.format,
            modifier: self.modifier,
            usage: self.usage,
            num_planes: self.num_planes,
            strides: self.strides,
            offsets: self.offsets,
            sizes: self.sizes,
            total_size: self.total_size,
            reserved_region_size: self.reserved_region_size,
            bytes_per_pixel: self.bytes_per_pixel,
            pixel_stride: self.pixel_stride,
            droid_format: self.droid_format,
            droid_usage: self.droid_usage,
            fds,
        })
    }

    pub fn plane_fd(&self, plane: usize) -> Option<BorrowedFd<'_>> {
        if plane >= self.num_planes {
            return None;
        }
        self.fds.get(plane).map(AsFd::as_fd)
    }

    pub fn reserved_region_fd(&self) -> Option<BorrowedFd<'_>> {
        self.fds.get(self.num_planes).map(AsFd::as_fd)
    }

    pub fn has_reserved_region(&self) -> bool {
        self.reserved_region_fd().is_some() && self.reserved_region_size > 0
    }

    /// Number of fds carried, reserved region included.
    pub fn num_fds(&self) -> usize {
        self.fds.len()
    }

    /// The buffer layout the handle describes, for importing it into a driver.
    pub fn layout(&self) -> Result<Layout> {
        if self.num_planes == 0 || self.num_planes > MAX_PLANES {
            return Err(GrallocError::BadDescriptor(format!(
                "handle has {} planes",
                self.num_planes
            )));
        }
        let tiling = Tiling::from_modifier(self.modifier)?;
        let mut planes = [PlaneLayout::default(); MAX_PLANES];
        for (plane, layout) in planes.iter_mut().enumerate().take(self.num_planes) {
            *layout = PlaneLayout {
                stride: self.strides[plane],
                offset: self.offsets[plane],
                size: self.sizes[plane],
            };
        }
        let total_size = self
            .total_size
            .checked_sub(self.reserved_region_size)
            .ok_or_else(|| {
                GrallocError::BadDescriptor("reserved region larger than buffer".to_owned())
            })?;
        Ok(Layout {
            format: self.format,
            width: self.width,
            height: self.height,
            tiling,
            modifier: self.modifier,
            num_planes: self.num_planes,
            planes,
            total_size,
        })
    }
}
