//! Xe render-node device: the kernel calls the allocation layer needs, issued as raw ioctls.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use bytemuck::{Pod, Zeroable};

use crate::kernel::{DeviceConfig, DrmDevice, GemCreate, GemHandle};
use crate::mman::MappedRegion;

const IOC_WRITE: u64 = 1;
const IOC_READ: u64 = 2;
const DRM_IOCTL_BASE: u64 = b'd' as u64;
const DRM_COMMAND_BASE: u64 = 0x40;

const fn ioc(dir: u64, nr: u64, size: usize) -> u64 {
    (dir << 30) | ((size as u64) << 16) | (DRM_IOCTL_BASE << 8) | nr
}

const fn iow<T>(nr: u64) -> u64 {
    ioc(IOC_WRITE, nr, core::mem::size_of::<T>())
}

const fn iowr<T>(nr: u64) -> u64 {
    ioc(IOC_READ | IOC_WRITE, nr, core::mem::size_of::<T>())
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct DrmGemClose {
    handle: u32,
    pad: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct DrmPrimeHandle {
    handle: u32,
    flags: u32,
    fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct DrmXeDeviceQuery {
    extensions: u64,
    query: u32,
    size: u32,
    data: u64,
    reserved: [u64; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct DrmXeGemCreate {
    extensions: u64,
    size: u64,
    placement: u32,
    flags: u32,
    vm_id: u32,
    handle: u32,
    cpu_caching: u16,
    pad: [u16; 3],
    reserved: [u64; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct DrmXeGemMmapOffset {
    extensions: u64,
    handle: u32,
    flags: u32,
    offset: u64,
    reserved: [u64; 2],
}

const DRM_IOCTL_GEM_CLOSE: u64 = iow::<DrmGemClose>(0x09);
const DRM_IOCTL_PRIME_HANDLE_TO_FD: u64 = iowr::<DrmPrimeHandle>(0x2d);
const DRM_IOCTL_PRIME_FD_TO_HANDLE: u64 = iowr::<DrmPrimeHandle>(0x2e);
const DRM_IOCTL_XE_DEVICE_QUERY: u64 = iowr::<DrmXeDeviceQuery>(DRM_COMMAND_BASE);
const DRM_IOCTL_XE_GEM_CREATE: u64 = iowr::<DrmXeGemCreate>(DRM_COMMAND_BASE + 0x01);
const DRM_IOCTL_XE_GEM_MMAP_OFFSET: u64 = iowr::<DrmXeGemMmapOffset>(DRM_COMMAND_BASE + 0x02);

const DRM_XE_DEVICE_QUERY_CONFIG: u32 = 2;
const DRM_XE_QUERY_CONFIG_REV_AND_DEVICE_ID: usize = 0;
const DRM_XE_QUERY_CONFIG_FLAGS: usize = 1;
const DRM_XE_QUERY_CONFIG_MIN_ALIGNMENT: usize = 2;
const DRM_XE_QUERY_CONFIG_VA_BITS: usize = 3;
const DRM_XE_QUERY_CONFIG_FLAG_HAS_VRAM: u64 = 1 << 0;

const DRM_XE_MEM_REGION_CLASS_SYSMEM: u32 = 0;
const DRM_XE_GEM_CREATE_FLAG_SCANOUT: u32 = 1 << 1;

const RENDER_NODE_MINORS: std::ops::Range<u32> = 128..192;

/// An open Xe render node (`/dev/dri/renderD*`).
#[derive(Debug)]
pub struct XeRenderNode {
    fd: OwnedFd,
}

impl XeRenderNode {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file: File = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)?;
        Ok(Self { fd: file.into() })
    }

    /// Open the first render node that answers the Xe config query.
    pub fn probe() -> io::Result<Self> {
        for minor in RENDER_NODE_MINORS {
            let path = format!("/dev/dri/renderD{minor}");
            let Ok(node) = Self::open(&path) else {
                continue;
            };
            if node.query_config().is_ok() {
                tracing::debug!(%path, "found xe render node");
                return Ok(node);
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no xe render node found",
        ))
    }

    fn ioctl<T: Pod>(&self, request: u64, arg: &mut T) -> io::Result<()> {
        loop {
            // SAFETY: `arg` is a live, exclusively borrowed repr(C) struct whose size is encoded in
            // `request`, which is what the kernel reads and writes.
            let rc = unsafe {
                libc::ioctl(self.fd.as_raw_fd(), request as _, arg as *mut T)
            };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
                _ => return Err(err),
            }
        }
    }
}

impl AsFd for XeRenderNode {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl DrmDevice for XeRenderNode {
    fn name(&self) -> &str {
        "xe"
    }

    fn query_config(&self) -> io::Result<DeviceConfig> {
        let mut query = DrmXeDeviceQuery {
            query: DRM_XE_DEVICE_QUERY_CONFIG,
            ..Zeroable::zeroed()
        };
        // First pass reports the reply size.
        self.ioctl(DRM_IOCTL_XE_DEVICE_QUERY, &mut query)?;

        // Reply: u32 num_params, u32 pad, u64 info[num_params].
        let words = (query.size as usize).div_ceil(8).max(1 + 4);
        let mut reply = vec![0u64; words];
        query.size = (words * 8) as u32;
        query.data = reply.as_mut_ptr() as u64;
        self.ioctl(DRM_IOCTL_XE_DEVICE_QUERY, &mut query)?;

        let num_params = (reply[0] & 0xffff_ffff) as usize;
        if num_params <= DRM_XE_QUERY_CONFIG_VA_BITS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("config query returned {num_params} params"),
            ));
        }
        let info = &reply[1..];
        let rev_and_id = info[DRM_XE_QUERY_CONFIG_REV_AND_DEVICE_ID];
        Ok(DeviceConfig {
            device_id: (rev_and_id & 0xffff) as u16,
            revision: ((rev_and_id >> 16) & 0xffff) as u16,
            has_vram: info[DRM_XE_QUERY_CONFIG_FLAGS] & DRM_XE_QUERY_CONFIG_FLAG_HAS_VRAM != 0,
            min_alignment: info[DRM_XE_QUERY_CONFIG_MIN_ALIGNMENT],
            va_bits: info[DRM_XE_QUERY_CONFIG_VA_BITS] as u8,
        })
    }

    fn gem_create(&self, req: &GemCreate) -> io::Result<GemHandle> {
        let mut create = DrmXeGemCreate {
            size: req.size,
            // Integrated parts only: always system memory.
            placement: 1 << DRM_XE_MEM_REGION_CLASS_SYSMEM,
            flags: if req.scanout {
                DRM_XE_GEM_CREATE_FLAG_SCANOUT
            } else {
                0
            },
            // vm_id 0 keeps the object exportable as a PRIME fd.
            vm_id: 0,
            cpu_caching: req.cpu_caching as u16,
            ..Zeroable::zeroed()
        };
        self.ioctl(DRM_IOCTL_XE_GEM_CREATE, &mut create)?;
        Ok(GemHandle(create.handle))
    }

    fn gem_close(&self, handle: GemHandle) -> io::Result<()> {
        let mut close = DrmGemClose {
            handle: handle.0,
            pad: 0,
        };
        self.ioctl(DRM_IOCTL_GEM_CLOSE, &mut close)
    }

    fn export_fd(&self, handle: GemHandle) -> io::Result<OwnedFd> {
        let mut prime = DrmPrimeHandle {
            handle: handle.0,
            flags: (libc::O_CLOEXEC | libc::O_RDWR) as u32,
            fd: -1,
        };
        self.ioctl(DRM_IOCTL_PRIME_HANDLE_TO_FD, &mut prime)?;
        // SAFETY: the kernel returned a new descriptor owned by the caller.
        Ok(unsafe { OwnedFd::from_raw_fd(prime.fd) })
    }

    fn import_fd(&self, fd: BorrowedFd<'_>) -> io::Result<GemHandle> {
        let mut prime = DrmPrimeHandle {
            handle: 0,
            flags: 0,
            fd: fd.as_raw_fd(),
        };
        self.ioctl(DRM_IOCTL_PRIME_FD_TO_HANDLE, &mut prime)?;
        Ok(GemHandle(prime.handle))
    }

    fn map(&self, handle: GemHandle, len: usize) -> io::Result<MappedRegion> {
        let mut mmap_offset = DrmXeGemMmapOffset {
            handle: handle.0,
            ..Zeroable::zeroed()
        };
        self.ioctl(DRM_IOCTL_XE_GEM_MMAP_OFFSET, &mut mmap_offset)?;
        MappedRegion::map_shared(self.fd.as_fd(), len, mmap_offset.offset)
    }
}
