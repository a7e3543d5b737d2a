use std::collections::HashMap;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::Mutex;

use crate::kernel::{DeviceConfig, DrmDevice, GemCreate, GemHandle};
use crate::mman::{self, MappedRegion};

/// Device id reported by [`MemfdDevice`] unless overridden: an Alder Lake-P part, so the software
/// device exercises the Xe-LPD layout rules.
pub const DEFAULT_MEMFD_DEVICE_ID: u16 = 0x46a6;

#[derive(Debug, Default)]
struct State {
    next_handle: u32,
    objects: HashMap<u32, OwnedFd>,
    created: u64,
    /// Remaining successful creations before the next one fails.
    fail_after: Option<u64>,
}

/// A software [`DrmDevice`] whose memory objects are anonymous shared-memory files.
///
/// Exports are duplicates of the backing memfd, so buffers can be mapped and shared across
/// processes like real PRIME buffers. The device keeps a live-object count and supports failure
/// injection, which makes it the device of choice for hosts without a GPU and for tests.
#[derive(Debug)]
pub struct MemfdDevice {
    config: DeviceConfig,
    state: Mutex<State>,
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "poisoned lock")
}

impl Default for MemfdDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MemfdDevice {
    pub fn new() -> Self {
        Self::with_device_id(DEFAULT_MEMFD_DEVICE_ID)
    }

    pub fn with_device_id(device_id: u16) -> Self {
        Self {
            config: DeviceConfig {
                device_id,
                revision: 0,
                has_vram: false,
                min_alignment: 4096,
                va_bits: 48,
            },
            state: Mutex::new(State {
                next_handle: 1,
                ..State::default()
            }),
        }
    }

    /// Number of objects created and not yet closed.
    pub fn live_allocations(&self) -> usize {
        self.state.lock().map_or(0, |s| s.objects.len())
    }

    /// Number of successful `gem_create` calls over the device lifetime.
    pub fn total_allocations(&self) -> u64 {
        self.state.lock().map_or(0, |s| s.created)
    }

    /// Make the `n`-th `gem_create` from now (1-based) fail with `ENOMEM`.
    pub fn fail_nth_allocation(&self, n: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_after = Some(n.saturating_sub(1));
        }
    }

    fn insert(&self, fd: OwnedFd) -> io::Result<GemHandle> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        let handle = state.next_handle;
        state.next_handle = state.next_handle.wrapping_add(1).max(1);
        state.objects.insert(handle, fd);
        Ok(GemHandle(handle))
    }

    fn object_fd(&self, handle: GemHandle) -> io::Result<OwnedFd> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        let fd = state
            .objects
            .get(&handle.0)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))?;
        fd.try_clone()
    }
}

impl DrmDevice for MemfdDevice {
    fn name(&self) -> &str {
        "memfd"
    }

    fn query_config(&self) -> io::Result<DeviceConfig> {
        Ok(self.config)
    }

    fn gem_create(&self, req: &GemCreate) -> io::Result<GemHandle> {
        if req.size == 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        {
            let mut state = self.state.lock().map_err(|_| poisoned())?;
            if let Some(remaining) = state.fail_after {
                if remaining == 0 {
                    state.fail_after = None;
                    return Err(io::Error::from_raw_os_error(libc::ENOMEM));
                }
                state.fail_after = Some(remaining - 1);
            }
        }

        let fd = mman::create_shared_memory("gralloc-bo", req.size)?;
        let handle = self.insert(fd)?;
        if let Ok(mut state) = self.state.lock() {
            state.created += 1;
        }
        tracing::debug!(handle = handle.0, size = req.size, "memfd object created");
        Ok(handle)
    }

    fn gem_close(&self, handle: GemHandle) -> io::Result<()> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        match state.objects.remove(&handle.0) {
            Some(_) => Ok(()),
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn export_fd(&self, handle: GemHandle) -> io::Result<OwnedFd> {
        self.object_fd(handle)
    }

    fn import_fd(&self, fd: BorrowedFd<'_>) -> io::Result<GemHandle> {
        let fd = fd.try_clone_to_owned()?;
        self.insert(fd)
    }

    fn map(&self, handle: GemHandle, len: usize) -> io::Result<MappedRegion> {
        let fd = self.object_fd(handle)?;
        MappedRegion::map_shared(fd.as_fd(), len, 0)
    }
}
