use std::sync::Arc;

use gralloc_drv::{DriverOptions, DrmDevice};

use crate::descriptor::{AllocationDescriptor, BufferDescriptorInfo};
use crate::driver::GrallocDriver;
use crate::error::{GrallocError, Result};
use crate::handle::GrallocHandle;

/// Buffers handed to the caller of [`Allocator::allocate`].
#[derive(Debug)]
pub struct AllocationResult {
    /// Plane 0 stride of the allocated buffers, in pixels.
    pub stride: u32,
    pub buffers: Vec<GrallocHandle>,
}

/// The allocation service: all-or-nothing batch allocation and support probing.
#[derive(Debug)]
pub struct Allocator {
    driver: Option<Arc<GrallocDriver>>,
}

impl Allocator {
    pub fn new(driver: Arc<GrallocDriver>) -> Self {
        Self {
            driver: Some(driver),
        }
    }

    /// Open a driver on `device`. A failure is logged and leaves the service without a driver:
    /// every later call then fails with [`GrallocError::DriverUnavailable`].
    pub fn init(device: Arc<dyn DrmDevice>, options: DriverOptions) -> Self {
        match GrallocDriver::open(device, options) {
            Ok(driver) => Self::new(Arc::new(driver)),
            Err(err) => {
                tracing::error!(error = %err, "failed to initialize gralloc driver");
                Self { driver: None }
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.driver.is_some()
    }

    pub fn driver(&self) -> Result<&Arc<GrallocDriver>> {
        self.driver.as_ref().ok_or_else(|| {
            tracing::error!("driver is uninitialized");
            GrallocError::DriverUnavailable
        })
    }

    /// Allocate `count` buffers described by `desc`, or none at all.
    pub fn allocate(&self, desc: &AllocationDescriptor, count: usize) -> Result<AllocationResult> {
        let driver = self.driver()?;

        let mut handles = Vec::with_capacity(count);
        let mut stride = 0;
        for index in 0..count {
            match allocate_buffer(driver, desc) {
                Ok(handle) => {
                    stride = handle.pixel_stride;
                    handles.push(handle);
                }
                Err(err) => {
                    tracing::warn!(
                        index,
                        count,
                        error = %err,
                        "allocation failed, releasing earlier buffers"
                    );
                    for handle in &handles {
                        release(driver, handle);
                    }
                    return Err(err);
                }
            }
        }

        // Hand out duplicates and drop the registry's working copies.
        let mut buffers = Vec::with_capacity(count);
        let mut dup_error = None;
        for handle in &handles {
            match handle.try_clone() {
                Ok(dup) => buffers.push(dup),
                Err(err) => {
                    dup_error.get_or_insert(err);
                }
            }
            release(driver, handle);
        }
        if let Some(err) = dup_error {
            tracing::error!(error = %err, "failed to duplicate buffer handle");
            return Err(err.into());
        }
        Ok(AllocationResult { stride, buffers })
    }

    /// Decode a service request and allocate it.
    pub fn allocate_from_info(
        &self,
        info: &BufferDescriptorInfo,
        count: usize,
    ) -> Result<AllocationResult> {
        self.driver()?;
        let desc = AllocationDescriptor::try_from(info)?;
        self.allocate(&desc, count)
    }

    /// Whether [`Allocator::allocate_from_info`] would accept `info`. Requests that cannot be
    /// decoded are simply unsupported.
    pub fn is_supported(&self, info: &BufferDescriptorInfo) -> Result<bool> {
        let driver = self.driver()?;
        if !info.has_only_known_options() {
            return Ok(false);
        }
        match AllocationDescriptor::try_from(info) {
            Ok(desc) => Ok(driver.is_supported(&desc)),
            Err(_) => Ok(false),
        }
    }

    pub fn is_supported_descriptor(&self, desc: &AllocationDescriptor) -> Result<bool> {
        Ok(self.driver()?.is_supported(desc))
    }
}

fn allocate_buffer(driver: &GrallocDriver, desc: &AllocationDescriptor) -> Result<GrallocHandle> {
    if !driver.is_supported(desc) {
        tracing::error!(
            pixel_format = ?desc.droid_format,
            drm_format = %desc.drm_format,
            usage = ?desc.usage,
            droid_usage = format_args!("{:#x}", desc.droid_usage),
            "failed to allocate: unsupported combination"
        );
        return Err(GrallocError::Unsupported(format!(
            "format={} usage={:?}",
            desc.drm_format, desc.usage
        )));
    }
    driver.allocate(desc)
}

fn release(driver: &GrallocDriver, handle: &GrallocHandle) {
    if let Err(err) = driver.release(handle) {
        tracing::warn!(id = handle.id, error = %err, "failed to release buffer");
    }
}
