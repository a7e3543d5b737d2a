use std::os::fd::BorrowedFd;
use std::sync::Arc;

use gralloc_formats::{BufferUsage, DrmFormat, Modifier};

use crate::backend::Backend;
use crate::bo::Bo;
use crate::error::{DriverError, Result};
use crate::kernel::DrmDevice;
use crate::layout::Layout;
use crate::mman::MappedRegion;
use crate::options::DriverOptions;
use crate::xe::{XeBackend, XeDeviceInfo};

/// A driver session: one kernel device, the backend built for it, and session options.
///
/// The combination table is built once here and never mutated, so a `Driver` can be shared
/// between threads without locking.
#[derive(Debug)]
pub struct Driver {
    device: Arc<dyn DrmDevice>,
    backend: Box<dyn Backend>,
    options: DriverOptions,
}

fn validate_options(options: &DriverOptions) -> Result<()> {
    if !options.page_size.is_power_of_two() {
        return Err(DriverError::InvalidArgument(
            "page size must be a power of two",
        ));
    }
    if !options.linear_stride_alignment.is_power_of_two() {
        return Err(DriverError::InvalidArgument(
            "linear stride alignment must be a power of two",
        ));
    }
    Ok(())
}

impl Driver {
    /// Probe `device` and build the Xe backend for it.
    pub fn new(device: Arc<dyn DrmDevice>, options: DriverOptions) -> Result<Self> {
        validate_options(&options)?;
        let config = device
            .query_config()
            .map_err(DriverError::kernel("query_config"))?;
        let info = XeDeviceInfo::from_config(&config).map_err(|err| {
            tracing::error!(device_id = config.device_id, "xe backend not supported on this platform");
            err
        })?;
        let backend = XeBackend::new(info, &options);
        Ok(Self {
            device,
            backend: Box::new(backend),
            options,
        })
    }

    pub fn with_backend(
        device: Arc<dyn DrmDevice>,
        backend: Box<dyn Backend>,
        options: DriverOptions,
    ) -> Result<Self> {
        validate_options(&options)?;
        Ok(Self {
            device,
            backend,
            options,
        })
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn device(&self) -> &Arc<dyn DrmDevice> {
        &self.device
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub fn resolve_format_and_usage(
        &self,
        format: DrmFormat,
        usage: BufferUsage,
    ) -> (DrmFormat, BufferUsage) {
        self.backend.resolve_format_and_usage(format, usage)
    }

    pub fn is_supported(&self, format: DrmFormat, usage: BufferUsage) -> bool {
        self.backend
            .negotiator(&self.options)
            .is_supported(format, usage)
    }

    pub fn select_modifier(
        &self,
        format: DrmFormat,
        usage: BufferUsage,
        peer: Option<&[Modifier]>,
    ) -> Result<Modifier> {
        self.backend
            .negotiator(&self.options)
            .select_modifier(format, usage, peer)
    }

    /// Negotiate a modifier and lay out a buffer without allocating it.
    pub fn compute_layout(
        &self,
        width: u32,
        height: u32,
        format: DrmFormat,
        usage: BufferUsage,
        peer: Option<&[Modifier]>,
    ) -> Result<Layout> {
        let modifier = self.select_modifier(format, usage, peer)?;
        self.backend
            .layout_calculator()
            .compute(format, width, height, usage, modifier)
    }

    pub fn num_planes_from_modifier(&self, format: DrmFormat, modifier: Modifier) -> usize {
        self.backend.num_planes_from_modifier(format, modifier)
    }

    fn create(&self, layout: Layout, usage: BufferUsage) -> Result<Bo> {
        let params = self.backend.gem_create_params(&layout, usage);
        let handle = self.device.gem_create(&params).map_err(|err| {
            tracing::warn!(
                size = params.size,
                format = %layout.format,
                error = %err,
                "gem_create failed"
            );
            DriverError::Kernel {
                call: "gem_create",
                source: err,
            }
        })?;
        tracing::debug!(
            handle = handle.0,
            format = %layout.format,
            width = layout.width,
            height = layout.height,
            modifier = ?layout.modifier,
            size = layout.total_size,
            "buffer created"
        );
        Ok(Bo::new(self.device.clone(), handle, layout, usage))
    }

    pub fn bo_create(
        &self,
        width: u32,
        height: u32,
        format: DrmFormat,
        usage: BufferUsage,
    ) -> Result<Bo> {
        let layout = self.compute_layout(width, height, format, usage, None)?;
        self.create(layout, usage)
    }

    /// Create a buffer whose modifier is negotiated against a peer's acceptable list.
    pub fn bo_create_with_modifiers(
        &self,
        width: u32,
        height: u32,
        format: DrmFormat,
        usage: BufferUsage,
        modifiers: &[Modifier],
    ) -> Result<Bo> {
        let layout = self.compute_layout(width, height, format, usage, Some(modifiers))?;
        self.create(layout, usage)
    }

    /// Wrap a PRIME fd exported elsewhere, trusting the layout the exporter computed.
    pub fn bo_import(&self, fd: BorrowedFd<'_>, layout: Layout, usage: BufferUsage) -> Result<Bo> {
        let expected = self.num_planes_from_modifier(layout.format, layout.modifier);
        if expected == 0 || expected != layout.num_planes {
            return Err(DriverError::InvalidArgument(
                "plane count does not match format and modifier",
            ));
        }
        let handle = self
            .device
            .import_fd(fd)
            .map_err(DriverError::kernel("import_fd"))?;
        Ok(Bo::new(self.device.clone(), handle, layout, usage))
    }

    /// Write back CPU caches after CPU access through `mapping`.
    pub fn flush(&self, bo: &Bo, mapping: &MappedRegion) {
        self.backend.flush(bo.layout(), mapping);
    }

    /// Make device writes visible to the CPU. Xe mappings are coherent for reads, so this only
    /// exists to keep the lock protocol symmetric.
    pub fn invalidate(&self, _bo: &Bo, _mapping: &MappedRegion) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfd::MemfdDevice;
    use std::os::fd::AsFd;

    fn driver(device: Arc<MemfdDevice>) -> Driver {
        Driver::new(device, DriverOptions::default().with_page_size(4096)).unwrap()
    }

    #[test]
    fn create_and_drop_releases_the_kernel_object() {
        let device = Arc::new(MemfdDevice::new());
        let driver = driver(device.clone());
        let bo = driver
            .bo_create(64, 64, DrmFormat::XRGB8888, BufferUsage::TEXTURE)
            .unwrap();
        assert_eq!(bo.modifier(), Modifier::I915_Y_TILED);
        assert_eq!(device.live_allocations(), 1);
        drop(bo);
        assert_eq!(device.live_allocations(), 0);
    }

    #[test]
    fn unsupported_requests_never_reach_the_kernel() {
        let device = Arc::new(MemfdDevice::new());
        let driver = driver(device.clone());
        let err = driver
            .bo_create(64, 64, DrmFormat::BGR888, BufferUsage::SCANOUT)
            .unwrap_err();
        assert!(matches!(err, DriverError::Unsupported { .. }));
        assert_eq!(device.total_allocations(), 0);
    }

    #[test]
    fn peer_modifiers_drive_selection() {
        let device = Arc::new(MemfdDevice::new());
        let driver = driver(device);
        let bo = driver
            .bo_create_with_modifiers(
                256,
                256,
                DrmFormat::ARGB8888,
                BufferUsage::SCANOUT | BufferUsage::TEXTURE,
                &[Modifier::LINEAR, Modifier::I915_Y_TILED_GEN12_RC_CCS],
            )
            .unwrap();
        assert_eq!(bo.modifier(), Modifier::I915_Y_TILED_GEN12_RC_CCS);
        assert_eq!(bo.num_planes(), 2);
    }

    #[test]
    fn import_shares_memory_with_the_exporter() {
        let device = Arc::new(MemfdDevice::new());
        let driver = driver(device.clone());
        let bo = driver
            .bo_create(16, 16, DrmFormat::ABGR8888, BufferUsage::SW_WRITE_OFTEN)
            .unwrap();
        let fd = bo.export_fd().unwrap();
        let imported = driver
            .bo_import(fd.as_fd(), bo.layout().clone(), bo.usage())
            .unwrap();
        assert_eq!(device.live_allocations(), 2);

        let a = bo.map().unwrap();
        let b = imported.map().unwrap();
        unsafe {
            a.as_ptr().add(100).write_volatile(7);
            assert_eq!(b.as_ptr().add(100).read_volatile(), 7);
        }
        driver.flush(&bo, &a);
    }

    #[test]
    fn import_rejects_inconsistent_plane_count() {
        let device = Arc::new(MemfdDevice::new());
        let driver = driver(device);
        let bo = driver
            .bo_create(16, 16, DrmFormat::NV12, BufferUsage::TEXTURE)
            .unwrap();
        let fd = bo.export_fd().unwrap();
        let mut layout = bo.layout().clone();
        layout.num_planes = 1;
        let err = driver
            .bo_import(fd.as_fd(), layout, BufferUsage::TEXTURE)
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));
    }

    #[test]
    fn invalid_options_are_rejected() {
        let device = Arc::new(MemfdDevice::new());
        let err = Driver::new(device, DriverOptions::default().with_page_size(3000)).unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));
    }

    #[test]
    fn pre_gen12_device_fails_initialization() {
        let device = Arc::new(MemfdDevice::with_device_id(0x5917));
        let err = Driver::new(device, DriverOptions::default()).unwrap_err();
        assert!(matches!(err, DriverError::UnsupportedDevice(_)));
    }
}
