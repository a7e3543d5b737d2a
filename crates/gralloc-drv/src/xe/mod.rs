//! Backend for Intel GPUs driven by the Xe kernel driver (gen12 and newer).

mod device_ids;
mod ioctl;

pub use ioctl::XeRenderNode;

use gralloc_formats::{BufferUsage, DrmFormat, Modifier};

use crate::backend::Backend;
use crate::combination::{CombinationTable, FormatMetadata};
use crate::error::{DriverError, Result};
use crate::kernel::{CpuCaching, DeviceConfig, GemCreate};
use crate::layout::{Layout, LayoutCalculator, Tiling};
use crate::mman::MappedRegion;
use crate::negotiate::ModifierOverride;
use crate::options::DriverOptions;

const SCANOUT_RENDER_FORMATS: &[DrmFormat] = &[
    DrmFormat::ABGR2101010,
    DrmFormat::ABGR8888,
    DrmFormat::ARGB2101010,
    DrmFormat::ARGB8888,
    DrmFormat::RGB565,
    DrmFormat::XBGR2101010,
    DrmFormat::XBGR8888,
    DrmFormat::XRGB2101010,
    DrmFormat::XRGB8888,
];

const RENDER_FORMATS: &[DrmFormat] = &[DrmFormat::ABGR16161616F];

const TEXTURE_ONLY_FORMATS: &[DrmFormat] = &[
    DrmFormat::R8,
    DrmFormat::NV12,
    DrmFormat::P010,
    DrmFormat::YVU420,
    DrmFormat::YVU420_ANDROID,
];

/// Xe-LPD (ADL-P/RPL-P) display: render compression is scanout-capable.
const GEN12_MODIFIER_ORDER: &[Modifier] = &[
    Modifier::I915_Y_TILED_GEN12_RC_CCS,
    Modifier::I915_Y_TILED,
    Modifier::I915_X_TILED,
    Modifier::LINEAR,
];

/// Xe-LPD+ (MTL) and everything without Xe-LPD display.
const XE_LPDP_MODIFIER_ORDER: &[Modifier] = &[
    Modifier::I915_4_TILED,
    Modifier::I915_X_TILED,
    Modifier::LINEAR,
];

const X_TILED: FormatMetadata = FormatMetadata {
    tiling: Tiling::X,
    modifier: Modifier::I915_X_TILED,
    priority: 2,
};

const Y_TILED: FormatMetadata = FormatMetadata {
    tiling: Tiling::Y,
    modifier: Modifier::I915_Y_TILED,
    priority: 3,
};

const TILE4: FormatMetadata = FormatMetadata {
    tiling: Tiling::Four,
    modifier: Modifier::I915_4_TILED,
    priority: 3,
};

/// Hardware facts derived from the PCI device id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XeDeviceInfo {
    pub device_id: u16,
    pub revision: u16,
    pub graphics_version: u32,
    /// Xe-LPD display engine (ADL-P, RPL-P).
    pub is_xelpd: bool,
    pub is_mtl_or_newer: bool,
    pub has_hw_protection: bool,
    pub has_local_mem: bool,
}

impl XeDeviceInfo {
    /// Classify a device id, most specific list first.
    pub fn from_device_id(device_id: u16) -> Result<Self> {
        let mut info = Self {
            device_id,
            revision: 0,
            graphics_version: 0,
            is_xelpd: false,
            is_mtl_or_newer: false,
            has_hw_protection: false,
            has_local_mem: false,
        };

        if device_ids::ADLP_IDS.contains(&device_id) || device_ids::RPLP_IDS.contains(&device_id) {
            info.graphics_version = 12;
            info.is_xelpd = true;
        } else if device_ids::MTL_IDS.contains(&device_id) {
            info.graphics_version = 12;
            info.is_mtl_or_newer = true;
        } else if device_ids::LNL_IDS.contains(&device_id) {
            info.graphics_version = 20;
            info.is_mtl_or_newer = true;
        } else if device_ids::PTL_IDS.contains(&device_id) {
            info.graphics_version = 30;
            info.is_mtl_or_newer = true;
        } else if device_ids::GEN12_IDS.contains(&device_id) {
            info.graphics_version = 12;
        }

        if info.graphics_version < 12 {
            return Err(DriverError::UnsupportedDevice(format!(
                "xe backend does not support device {device_id:#06x}"
            )));
        }
        Ok(info)
    }

    pub fn from_config(config: &DeviceConfig) -> Result<Self> {
        Ok(Self {
            revision: config.revision,
            has_local_mem: config.has_vram,
            ..Self::from_device_id(config.device_id)?
        })
    }

    pub fn modifier_order(&self) -> &'static [Modifier] {
        if self.is_mtl_or_newer {
            XE_LPDP_MODIFIER_ORDER
        } else if self.is_xelpd {
            GEN12_MODIFIER_ORDER
        } else {
            XE_LPDP_MODIFIER_ORDER
        }
    }
}

/// Build the combination table for one device.
pub fn build_combinations(info: &XeDeviceInfo) -> CombinationTable {
    let linear = FormatMetadata::LINEAR;
    let scanout_and_render = BufferUsage::RENDER_MASK | BufferUsage::SCANOUT;
    let render = BufferUsage::RENDER_MASK;
    let texture_only = BufferUsage::TEXTURE_MASK;
    // Protected buffers also have to be scanned out.
    let hw_protected = if info.has_hw_protection {
        BufferUsage::PROTECTED | BufferUsage::SCANOUT
    } else {
        BufferUsage::empty()
    };

    let mut table = CombinationTable::new();
    table.add_all(SCANOUT_RENDER_FORMATS, linear, scanout_and_render);
    table.add_all(RENDER_FORMATS, linear, render);
    table.add_all(TEXTURE_ONLY_FORMATS, linear, texture_only);

    table.modify_all(
        &[DrmFormat::XRGB8888, DrmFormat::ARGB8888],
        linear,
        BufferUsage::CURSOR | BufferUsage::SCANOUT,
    );
    // NV12 serves camera, display, decode and encode.
    table.modify(
        DrmFormat::NV12,
        linear,
        BufferUsage::CAMERA_READ
            | BufferUsage::CAMERA_WRITE
            | BufferUsage::SCANOUT
            | BufferUsage::HW_VIDEO_DECODER
            | BufferUsage::HW_VIDEO_ENCODER
            | hw_protected,
    );
    table.modify(DrmFormat::P010, linear, BufferUsage::SCANOUT);
    table.modify(DrmFormat::YVU420_ANDROID, linear, BufferUsage::CAMERA_WRITE);
    table.add(DrmFormat::BGR888, linear, BufferUsage::SW_MASK);
    // R8 backs HAL BLOB buffers: JPEG snapshots and codec bitstreams.
    table.modify(
        DrmFormat::R8,
        linear,
        BufferUsage::CAMERA_READ
            | BufferUsage::CAMERA_WRITE
            | BufferUsage::HW_VIDEO_DECODER
            | BufferUsage::HW_VIDEO_ENCODER
            | BufferUsage::GPU_DATA_BUFFER
            | BufferUsage::SENSOR_DIRECT_DATA,
    );

    let render_not_linear = render.difference(BufferUsage::LINEAR_MASK);
    let scanout_and_render_not_linear = render_not_linear | BufferUsage::SCANOUT;
    table.add_all(RENDER_FORMATS, X_TILED, render_not_linear);
    table.add_all(SCANOUT_RENDER_FORMATS, X_TILED, scanout_and_render_not_linear);

    let nv12_usage = BufferUsage::TEXTURE
        | BufferUsage::HW_VIDEO_DECODER
        | BufferUsage::SCANOUT
        | hw_protected;
    let p010_usage = BufferUsage::TEXTURE
        | BufferUsage::HW_VIDEO_DECODER
        | hw_protected
        | if info.graphics_version >= 11 {
            BufferUsage::SCANOUT
        } else {
            BufferUsage::empty()
        };

    let tiled = if info.is_mtl_or_newer { TILE4 } else { Y_TILED };
    table.add(DrmFormat::NV12, tiled, nv12_usage);
    table.add(DrmFormat::P010, tiled, p010_usage);
    table.add_all(RENDER_FORMATS, tiled, render_not_linear);
    table.add_all(SCANOUT_RENDER_FORMATS, tiled, scanout_and_render_not_linear);

    table
}

#[derive(Debug)]
pub struct XeBackend {
    info: XeDeviceInfo,
    table: CombinationTable,
    overrides: Vec<ModifierOverride>,
    calculator: LayoutCalculator,
}

impl XeBackend {
    pub fn new(info: XeDeviceInfo, options: &DriverOptions) -> Self {
        let mut overrides = Vec::new();
        if info.is_mtl_or_newer {
            // Video playback planes go straight to the display engine as Tile4.
            overrides.push(ModifierOverride {
                format: None,
                usage: BufferUsage::SCANOUT | BufferUsage::TEXTURE | BufferUsage::HW_VIDEO_DECODER,
                modifier: Modifier::I915_4_TILED,
            });
        }

        let calculator =
            LayoutCalculator::new(options.linear_stride_alignment, options.page_size)
                .with_lcu_aligned_chroma(info.graphics_version == 12)
                .with_pow2_compressed_stride(info.is_xelpd);

        tracing::debug!(
            device_id = info.device_id,
            graphics_version = info.graphics_version,
            is_xelpd = info.is_xelpd,
            is_mtl_or_newer = info.is_mtl_or_newer,
            "xe backend initialized"
        );

        Self {
            table: build_combinations(&info),
            info,
            overrides,
            calculator,
        }
    }

    pub fn info(&self) -> &XeDeviceInfo {
        &self.info
    }
}

impl Backend for XeBackend {
    fn name(&self) -> &'static str {
        "xe"
    }

    fn combinations(&self) -> &CombinationTable {
        &self.table
    }

    fn modifier_order(&self) -> &[Modifier] {
        self.info.modifier_order()
    }

    fn modifier_overrides(&self) -> &[ModifierOverride] {
        &self.overrides
    }

    fn layout_calculator(&self) -> &LayoutCalculator {
        &self.calculator
    }

    fn gem_create_params(&self, layout: &Layout, usage: BufferUsage) -> GemCreate {
        let scanout = usage.contains(BufferUsage::SCANOUT);
        GemCreate {
            size: layout.total_size,
            scanout,
            cpu_caching: if scanout {
                CpuCaching::WriteCombined
            } else {
                CpuCaching::WriteBack
            },
        }
    }

    fn flush(&self, layout: &Layout, mapping: &MappedRegion) {
        if layout.tiling == Tiling::None {
            clflush(mapping.as_ptr(), mapping.len());
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn clflush(start: *mut u8, len: usize) {
    use core::arch::x86_64::{_mm_clflush, _mm_mfence};

    const XE_CACHELINE_SIZE: usize = 64;
    let end = start as usize + len;
    let mut line = start as usize & !(XE_CACHELINE_SIZE - 1);
    // SAFETY: every flushed line overlaps [start, start + len), which is a live mapping; clflush
    // and mfence are baseline x86_64 instructions.
    unsafe {
        _mm_mfence();
        while line < end {
            _mm_clflush(line as *const u8);
            line += XE_CACHELINE_SIZE;
        }
        _mm_mfence();
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn clflush(_start: *mut u8, _len: usize) {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_device_families() {
        let adl = XeDeviceInfo::from_device_id(0x46a6).unwrap();
        assert!(adl.is_xelpd && !adl.is_mtl_or_newer);
        assert_eq!(adl.graphics_version, 12);
        assert_eq!(adl.modifier_order(), GEN12_MODIFIER_ORDER);

        let rpl = XeDeviceInfo::from_device_id(0xa7a0).unwrap();
        assert!(rpl.is_xelpd);

        let mtl = XeDeviceInfo::from_device_id(0x7d55).unwrap();
        assert!(mtl.is_mtl_or_newer && !mtl.is_xelpd);
        assert_eq!(mtl.graphics_version, 12);
        assert_eq!(mtl.modifier_order(), XE_LPDP_MODIFIER_ORDER);

        let tgl = XeDeviceInfo::from_device_id(0x9a49).unwrap();
        assert!(!tgl.is_xelpd && !tgl.is_mtl_or_newer);
        assert_eq!(tgl.modifier_order(), XE_LPDP_MODIFIER_ORDER);

        let lnl = XeDeviceInfo::from_device_id(0x64a0).unwrap();
        assert_eq!(lnl.graphics_version, 20);
        assert!(lnl.is_mtl_or_newer);
    }

    #[test]
    fn pre_gen12_devices_are_rejected() {
        let err = XeDeviceInfo::from_device_id(0x5917).unwrap_err();
        assert!(matches!(err, DriverError::UnsupportedDevice(_)));
    }

    #[test]
    fn config_carries_revision_and_vram() {
        let info = XeDeviceInfo::from_config(&DeviceConfig {
            device_id: 0x7d55,
            revision: 4,
            has_vram: true,
            min_alignment: 65536,
            va_bits: 48,
        })
        .unwrap();
        assert_eq!(info.revision, 4);
        assert!(info.has_local_mem);
        assert!(info.is_mtl_or_newer);
    }

    #[test]
    fn linear_xrgb_gains_cursor_and_scanout() {
        let info = XeDeviceInfo::from_device_id(0x46a6).unwrap();
        let table = build_combinations(&info);
        assert!(table.is_supported(
            DrmFormat::XRGB8888,
            BufferUsage::CURSOR | BufferUsage::SW_WRITE_OFTEN
        ));
        assert!(!table.is_supported(DrmFormat::XBGR8888, BufferUsage::CURSOR));
        assert!(table.is_supported(DrmFormat::BGR888, BufferUsage::SW_READ_OFTEN));
        assert!(!table.is_supported(DrmFormat::BGR888, BufferUsage::TEXTURE));
    }

    #[test]
    fn tiled_entries_follow_the_generation() {
        let adl = build_combinations(&XeDeviceInfo::from_device_id(0x46a6).unwrap());
        let best = adl
            .best(DrmFormat::XRGB8888, BufferUsage::SCANOUT | BufferUsage::RENDERING)
            .unwrap();
        assert_eq!(best.metadata, Y_TILED);

        let mtl = build_combinations(&XeDeviceInfo::from_device_id(0x7d55).unwrap());
        let best = mtl
            .best(DrmFormat::NV12, BufferUsage::HW_VIDEO_DECODER | BufferUsage::TEXTURE)
            .unwrap();
        assert_eq!(best.metadata, TILE4);
    }

    #[test]
    fn cpu_access_forces_linear() {
        let table = build_combinations(&XeDeviceInfo::from_device_id(0x46a6).unwrap());
        let best = table
            .best(DrmFormat::ABGR8888, BufferUsage::TEXTURE | BufferUsage::SW_READ_OFTEN)
            .unwrap();
        assert_eq!(best.metadata, FormatMetadata::LINEAR);
    }

    #[test]
    fn mtl_video_scanout_override() {
        let options = DriverOptions::default().with_page_size(4096);
        let usage = BufferUsage::SCANOUT | BufferUsage::TEXTURE | BufferUsage::HW_VIDEO_DECODER;

        let mtl = XeBackend::new(XeDeviceInfo::from_device_id(0x7d55).unwrap(), &options);
        let modifier = mtl
            .negotiator(&options)
            .select_modifier(DrmFormat::NV12, usage, None)
            .unwrap();
        assert_eq!(modifier, Modifier::I915_4_TILED);

        let adl = XeBackend::new(XeDeviceInfo::from_device_id(0x46a6).unwrap(), &options);
        assert!(adl.modifier_overrides().is_empty());
        let modifier = adl
            .negotiator(&options)
            .select_modifier(DrmFormat::NV12, usage, None)
            .unwrap();
        assert_eq!(modifier, Modifier::I915_Y_TILED);
    }

    #[test]
    fn scanout_buffers_are_write_combined() {
        let options = DriverOptions::default().with_page_size(4096);
        let backend = XeBackend::new(XeDeviceInfo::from_device_id(0x46a6).unwrap(), &options);
        let layout = backend
            .layout_calculator()
            .compute(
                DrmFormat::XRGB8888,
                64,
                64,
                BufferUsage::SCANOUT,
                Modifier::I915_Y_TILED,
            )
            .unwrap();
        let params = backend.gem_create_params(&layout, BufferUsage::SCANOUT);
        assert!(params.scanout);
        assert_eq!(params.cpu_caching, CpuCaching::WriteCombined);
        let params = backend.gem_create_params(&layout, BufferUsage::TEXTURE);
        assert_eq!(params.cpu_caching, CpuCaching::WriteBack);
    }
}
