use std::fmt;

use gralloc_formats::{planar, BufferUsage, DrmFormat, Modifier};

use crate::combination::CombinationTable;
use crate::kernel::{CpuCaching, GemCreate};
use crate::layout::{Layout, LayoutCalculator};
use crate::mman::MappedRegion;
use crate::negotiate::{ModifierNegotiator, ModifierOverride};
use crate::options::DriverOptions;

/// Hardware-family specific half of a driver session.
///
/// A backend owns the immutable combination table built for the probed device, the modifier
/// preference list used for peer negotiation, and the alignment rules of its layout calculator.
/// Everything else (validation, kernel calls, buffer bookkeeping) is shared in [`crate::Driver`].
///
/// Only one backend (`xe`) is provided; other hardware families implement the same contract.
pub trait Backend: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn combinations(&self) -> &CombinationTable;

    /// Modifiers in preference order, most capable first and linear last.
    fn modifier_order(&self) -> &[Modifier];

    /// Replacement rules consulted after table selection.
    fn modifier_overrides(&self) -> &[ModifierOverride] {
        &[]
    }

    fn layout_calculator(&self) -> &LayoutCalculator;

    /// Planes a buffer of `format` occupies once laid out with `modifier` (compression adds an
    /// aux plane).
    fn num_planes_from_modifier(&self, format: DrmFormat, modifier: Modifier) -> usize {
        let planes = planar::num_planes_from_format(format);
        if modifier.is_compressed() {
            planes + 1
        } else {
            planes
        }
    }

    fn gem_create_params(&self, layout: &Layout, usage: BufferUsage) -> GemCreate {
        GemCreate {
            size: layout.total_size,
            scanout: usage.contains(BufferUsage::SCANOUT),
            cpu_caching: CpuCaching::WriteBack,
        }
    }

    /// Write back CPU caches over a mapping after CPU access.
    fn flush(&self, _layout: &Layout, _mapping: &MappedRegion) {}

    /// Resolve flexible formats and drop usage bits the concrete format cannot honour.
    fn resolve_format_and_usage(
        &self,
        format: DrmFormat,
        usage: BufferUsage,
    ) -> (DrmFormat, BufferUsage) {
        resolve_format_and_usage(format, usage)
    }

    fn negotiator<'a>(&'a self, options: &DriverOptions) -> ModifierNegotiator<'a> {
        ModifierNegotiator::new(self.combinations(), self.modifier_order())
            .with_overrides(self.modifier_overrides())
            .with_compression(options.compression)
    }
}

/// Default flexible-format resolution shared by backends.
///
/// - `FLEX_IMPLEMENTATION_DEFINED` becomes NV12 for camera buffers, XBGR8888 otherwise (the
///   encoder only accepts YUV input, so the encoder bit is dropped).
/// - `FLEX_YCBCR_420_888` becomes NV12.
/// - Android YV12 is never scanned out.
pub fn resolve_format_and_usage(
    format: DrmFormat,
    usage: BufferUsage,
) -> (DrmFormat, BufferUsage) {
    match format {
        DrmFormat::FLEX_IMPLEMENTATION_DEFINED => {
            if usage.intersects(BufferUsage::CAMERA_READ | BufferUsage::CAMERA_WRITE) {
                (DrmFormat::NV12, usage)
            } else {
                (
                    DrmFormat::XBGR8888,
                    usage.difference(BufferUsage::HW_VIDEO_ENCODER),
                )
            }
        }
        DrmFormat::FLEX_YCBCR_420_888 => (DrmFormat::NV12, usage),
        DrmFormat::YVU420_ANDROID => (format, usage.difference(BufferUsage::SCANOUT)),
        _ => (format, usage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn implementation_defined_depends_on_camera_usage() {
        assert_eq!(
            resolve_format_and_usage(
                DrmFormat::FLEX_IMPLEMENTATION_DEFINED,
                BufferUsage::CAMERA_WRITE | BufferUsage::HW_VIDEO_ENCODER
            ),
            (
                DrmFormat::NV12,
                BufferUsage::CAMERA_WRITE | BufferUsage::HW_VIDEO_ENCODER
            )
        );
        assert_eq!(
            resolve_format_and_usage(
                DrmFormat::FLEX_IMPLEMENTATION_DEFINED,
                BufferUsage::TEXTURE | BufferUsage::HW_VIDEO_ENCODER
            ),
            (DrmFormat::XBGR8888, BufferUsage::TEXTURE)
        );
    }

    #[test]
    fn yv12_loses_scanout_and_concrete_formats_pass_through() {
        assert_eq!(
            resolve_format_and_usage(
                DrmFormat::YVU420_ANDROID,
                BufferUsage::SCANOUT | BufferUsage::TEXTURE
            ),
            (DrmFormat::YVU420_ANDROID, BufferUsage::TEXTURE)
        );
        assert_eq!(
            resolve_format_and_usage(DrmFormat::FLEX_YCBCR_420_888, BufferUsage::TEXTURE),
            (DrmFormat::NV12, BufferUsage::TEXTURE)
        );
        assert_eq!(
            resolve_format_and_usage(DrmFormat::ARGB8888, BufferUsage::SCANOUT),
            (DrmFormat::ARGB8888, BufferUsage::SCANOUT)
        );
    }
}
