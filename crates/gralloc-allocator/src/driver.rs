use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use gralloc_drv::mman::{self, FileIdentity};
use gralloc_drv::{Driver, DriverError, DriverOptions, DrmDevice};
use gralloc_formats::planar;
use gralloc_formats::{BufferUsage, DrmFormat, MapFlags};

use crate::buffer::{BufferObject, PlaneAddresses, Rectangle, ResourceInfo};
use crate::descriptor::AllocationDescriptor;
use crate::error::{GrallocError, Result};
use crate::handle::GrallocHandle;
use crate::metadata::BufferMetadata;

/// Ids are unique per process, never per driver instance. They only label buffers in logs and
/// errors: two processes hand out the same ids for unrelated buffers.
static NEXT_BUFFER_ID: AtomicU32 = AtomicU32::new(1);

const RESERVED_REGION_NAME: &str = "gralloc-reserved-region";

/// The per-process buffer registry on top of a [`Driver`].
///
/// Every buffer this process allocated or retained lives here with a process-local reference
/// count, keyed by the identity of the memory object behind the handle's first plane fd. That
/// identity is the same in every process holding the buffer.
#[derive(Debug)]
pub struct GrallocDriver {
    driver: Arc<Driver>,
    buffers: Mutex<HashMap<FileIdentity, BufferObject>>,
}

impl GrallocDriver {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver: Arc::new(driver),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Open a driver session on `device`.
    pub fn open(device: Arc<dyn DrmDevice>, options: DriverOptions) -> Result<Self> {
        let driver = Driver::new(device, options)?;
        tracing::debug!(backend = driver.name(), "gralloc driver initialized");
        Ok(Self::new(driver))
    }

    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    fn buffers(&self) -> Result<MutexGuard<'_, HashMap<FileIdentity, BufferObject>>> {
        self.buffers
            .lock()
            .map_err(|_| GrallocError::InternalInconsistency("poisoned lock".to_string()))
    }

    fn buffer_key(handle: &GrallocHandle) -> Result<FileIdentity> {
        let fd = handle.plane_fd(0).ok_or_else(|| {
            GrallocError::BadDescriptor(format!("handle {} carries no plane fd", handle.id))
        })?;
        mman::file_identity(fd).map_err(|err| {
            tracing::error!(id = handle.id, error = %err, "failed to identify buffer fd");
            GrallocError::Io(err)
        })
    }

    fn resolve_usage(
        &self,
        desc: &AllocationDescriptor,
        usage: BufferUsage,
    ) -> Option<(DrmFormat, BufferUsage)> {
        let (format, usage) = self.driver.resolve_format_and_usage(desc.drm_format, usage);
        self.driver
            .is_supported(format, usage)
            .then_some((format, usage))
    }

    /// The concrete format and usage a descriptor allocates with, if any combination serves it.
    ///
    /// Video encoders can read buffers that were not allocated for them, so a request that only
    /// fails because of the encoder bit is retried without it. Flexible YCbCr requests are the
    /// exception.
    pub fn resolve(&self, desc: &AllocationDescriptor) -> Option<(DrmFormat, BufferUsage)> {
        self.resolve_usage(desc, desc.usage).or_else(|| {
            let retry = desc.usage.contains(BufferUsage::HW_VIDEO_ENCODER)
                && desc.drm_format != DrmFormat::FLEX_YCBCR_420_888;
            if !retry {
                return None;
            }
            self.resolve_usage(desc, desc.usage - BufferUsage::HW_VIDEO_ENCODER)
        })
    }

    fn fits_texture_limit(&self, desc: &AllocationDescriptor) -> bool {
        let max = self.driver.options().max_texture_2d_size;
        desc.width <= max && desc.height <= max
    }

    pub fn is_supported(&self, desc: &AllocationDescriptor) -> bool {
        self.fits_texture_limit(desc) && self.resolve(desc).is_some()
    }

    fn supported_combination(
        &self,
        desc: &AllocationDescriptor,
    ) -> Result<(DrmFormat, BufferUsage)> {
        match self.resolve(desc) {
            Some(resolved) if self.fits_texture_limit(desc) => Ok(resolved),
            _ => Err(GrallocError::Unsupported(format!(
                "format={} usage={:?} size={}x{}",
                desc.drm_format, desc.usage, desc.width, desc.height
            ))),
        }
    }

    /// Allocate one buffer and register it with a reference count of one.
    ///
    /// The returned handle is a duplicate: the registry keeps its own copy.
    pub fn allocate(&self, desc: &AllocationDescriptor) -> Result<GrallocHandle> {
        desc.validate()?;
        let (format, usage) = self.supported_combination(desc)?;

        let bo = self.driver.bo_create(desc.width, desc.height, format, usage)?;
        let num_planes = bo.num_planes();
        let mut fds = Vec::with_capacity(num_planes + 1);
        for _ in 0..num_planes {
            fds.push(bo.export_fd()?);
        }

        let mut reserved_region_size = 0;
        if desc.enable_metadata {
            reserved_region_size =
                mem::size_of::<BufferMetadata>() as u64 + desc.client_metadata_size;
            let fd = mman::create_shared_memory(RESERVED_REGION_NAME, reserved_region_size)
                .map_err(|source| {
                    tracing::error!(
                        size = reserved_region_size,
                        error = %source,
                        "failed to create reserved region"
                    );
                    GrallocError::NoResources(DriverError::Kernel {
                        call: "memfd_create",
                        source,
                    })
                })?;
            fds.push(fd);
        }

        let layout = bo.layout();
        let bytes_per_pixel = planar::bytes_per_pixel_from_format(format, 0);
        let pixel_stride = match bytes_per_pixel {
            0 => layout.planes[0].stride,
            bpp => layout.planes[0].stride / bpp,
        };
        let id = NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed);
        let handle = GrallocHandle {
            id,
            width: desc.width,
            height: desc.height,
            format,
            modifier: layout.modifier,
            usage,
            num_planes,
            strides: layout.strides(),
            offsets: layout.offsets(),
            sizes: layout.sizes(),
            total_size: layout.total_size + reserved_region_size,
            reserved_region_size,
            bytes_per_pixel,
            pixel_stride,
            droid_format: desc.droid_format,
            droid_usage: desc.droid_usage,
            fds,
        };
        let key = Self::buffer_key(&handle)?;
        let returned = handle.try_clone()?;

        let mut buffer = BufferObject::new(self.driver.clone(), bo, handle);
        if desc.enable_metadata {
            buffer.initialize_metadata(desc)?;
        }
        tracing::debug!(
            id,
            format = %format,
            width = desc.width,
            height = desc.height,
            modifier = ?returned.modifier,
            "buffer allocated"
        );
        self.buffers()?.insert(key, buffer);
        Ok(returned)
    }

    /// Take a reference on a buffer, importing it if this process does not know it yet.
    pub fn retain(&self, handle: &GrallocHandle) -> Result<()> {
        let key = Self::buffer_key(handle)?;
        let mut buffers = self.buffers()?;
        if let Some(buffer) = buffers.get_mut(&key) {
            buffer.increase_refcount();
            return Ok(());
        }

        let fd = handle.plane_fd(0).ok_or_else(|| {
            GrallocError::BadDescriptor(format!("handle {} carries no plane fd", handle.id))
        })?;
        let bo = self
            .driver
            .bo_import(fd, handle.layout()?, handle.usage)
            .map_err(|err| {
                tracing::error!(id = handle.id, error = %err, "failed to import buffer");
                err
            })?;
        let buffer = BufferObject::new(self.driver.clone(), bo, handle.try_clone()?);
        tracing::debug!(id = handle.id, "buffer imported");
        buffers.insert(key, buffer);
        Ok(())
    }

    /// Drop a reference; the last one destroys the buffer.
    pub fn release(&self, handle: &GrallocHandle) -> Result<()> {
        let key = Self::buffer_key(handle)?;
        let mut buffers = self.buffers()?;
        let Some(buffer) = buffers.get_mut(&key) else {
            tracing::error!(id = handle.id, "invalid reference: buffer is not registered");
            return Err(GrallocError::UnknownBuffer(handle.id));
        };
        if buffer.decrease_refcount() == 0 {
            buffers.remove(&key);
        }
        Ok(())
    }

    /// Run `f` on the registered buffer behind `handle` while holding the registry lock.
    pub fn with_buffer<R>(
        &self,
        handle: &GrallocHandle,
        f: impl FnOnce(&mut BufferObject) -> R,
    ) -> Result<R> {
        let key = Self::buffer_key(handle)?;
        let mut buffers = self.buffers()?;
        let buffer = buffers.get_mut(&key).ok_or_else(|| {
            tracing::error!(id = handle.id, "invalid reference: buffer is not registered");
            GrallocError::UnknownBuffer(handle.id)
        })?;
        Ok(f(buffer))
    }

    pub fn lock(
        &self,
        handle: &GrallocHandle,
        rect: Rectangle,
        map_flags: MapFlags,
    ) -> Result<PlaneAddresses> {
        self.with_buffer(handle, |buffer| buffer.lock(rect, map_flags))?
    }

    pub fn unlock(&self, handle: &GrallocHandle) -> Result<()> {
        self.with_buffer(handle, BufferObject::unlock)?
    }

    pub fn invalidate(&self, handle: &GrallocHandle) -> Result<()> {
        self.with_buffer(handle, |buffer| buffer.invalidate())?
    }

    pub fn flush(&self, handle: &GrallocHandle) -> Result<()> {
        self.with_buffer(handle, |buffer| buffer.flush())?
    }

    pub fn resource_info(&self, handle: &GrallocHandle) -> Result<ResourceInfo> {
        self.with_buffer(handle, |buffer| buffer.resource_info())
    }

    /// Number of registered buffers.
    pub fn num_buffers(&self) -> usize {
        self.buffers.lock().map_or(0, |buffers| buffers.len())
    }
}
