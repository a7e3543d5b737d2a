use gralloc_formats::{BufferUsage, DrmFormat};

use crate::android::{self, PixelFormat};
use crate::error::{GrallocError, Result};
use crate::metadata::{BlendMode, Cta861_3, Dataspace, Smpte2086, BUFFER_METADATA_MAX_NAME_SIZE};

/// Key of the only additional allocation option understood by the service.
pub const STANDARD_METADATA_DATASPACE: &str = "android.hardware.graphics.common.Dataspace";

/// A fully-translated allocation request.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationDescriptor {
    pub width: u32,
    pub height: u32,
    /// The HAL pixel format the request was made with, kept for logging and for the handle.
    pub droid_format: PixelFormat,
    /// The untranslated HAL usage bits.
    pub droid_usage: u64,
    pub drm_format: DrmFormat,
    pub usage: BufferUsage,
    /// Attach a reserved region carrying [`crate::BufferMetadata`].
    pub enable_metadata: bool,
    /// Client-owned bytes appended to the reserved region.
    pub client_metadata_size: u64,
    pub name: String,
    pub dataspace: Dataspace,
    pub blend_mode: BlendMode,
    pub cta861_3: Option<Cta861_3>,
    pub smpte2086: Option<Smpte2086>,
}

impl AllocationDescriptor {
    pub fn new(width: u32, height: u32, drm_format: DrmFormat, usage: BufferUsage) -> Self {
        Self {
            width,
            height,
            droid_format: PixelFormat::UNSPECIFIED,
            droid_usage: 0,
            drm_format,
            usage,
            enable_metadata: false,
            client_metadata_size: 0,
            name: String::new(),
            dataspace: Dataspace::UNKNOWN,
            blend_mode: BlendMode::Invalid,
            cta861_3: None,
            smpte2086: None,
        }
    }

    /// Build a descriptor from HAL terms. Returns `None` when the format or usage has no
    /// translation.
    pub fn from_android(
        width: u32,
        height: u32,
        format: PixelFormat,
        hal_usage: u64,
    ) -> Option<Self> {
        let drm_format = format.to_drm_format()?;
        let usage = android::convert_usage(hal_usage)?;
        let mut desc = Self::new(width, height, drm_format, usage);
        desc.droid_format = format;
        desc.droid_usage = hal_usage;
        Some(desc)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_dataspace(mut self, dataspace: Dataspace) -> Self {
        self.dataspace = dataspace;
        self
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    /// Attach a reserved region with `client_size` client-owned bytes.
    pub fn with_metadata_region(mut self, client_size: u64) -> Self {
        self.enable_metadata = true;
        self.client_metadata_size = client_size;
        self
    }

    pub fn with_cta861_3(mut self, value: Cta861_3) -> Self {
        self.cta861_3 = Some(value);
        self
    }

    pub fn with_smpte2086(mut self, value: Smpte2086) -> Self {
        self.smpte2086 = Some(value);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GrallocError::BadDescriptor(format!(
                "invalid dimensions {}x{}",
                self.width, self.height
            )));
        }
        if self.name.len() >= BUFFER_METADATA_MAX_NAME_SIZE {
            return Err(GrallocError::BadDescriptor(format!(
                "name is {} bytes, at most {} allowed",
                self.name.len(),
                BUFFER_METADATA_MAX_NAME_SIZE - 1
            )));
        }
        Ok(())
    }
}

/// A named integer option attached to an allocation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendableType {
    pub name: String,
    pub value: i64,
}

impl ExtendableType {
    pub fn dataspace(dataspace: Dataspace) -> Self {
        Self {
            name: STANDARD_METADATA_DATASPACE.to_owned(),
            value: i64::from(dataspace.0),
        }
    }
}

/// The allocation request as received over the service boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferDescriptorInfo {
    pub name: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub layer_count: i32,
    pub format: PixelFormat,
    pub usage: u64,
    pub reserved_size: i64,
    pub additional_options: Vec<ExtendableType>,
}

impl BufferDescriptorInfo {
    pub fn new(width: i32, height: i32, format: PixelFormat, usage: u64) -> Self {
        Self {
            width,
            height,
            layer_count: 1,
            format,
            usage,
            ..Self::default()
        }
    }

    pub fn has_only_known_options(&self) -> bool {
        self.additional_options
            .iter()
            .all(|option| option.name == STANDARD_METADATA_DATASPACE)
    }
}

impl TryFrom<&BufferDescriptorInfo> for AllocationDescriptor {
    type Error = GrallocError;

    fn try_from(info: &BufferDescriptorInfo) -> Result<Self> {
        if info.layer_count > 1 {
            return Err(GrallocError::Unsupported(format!(
                "layer count {}",
                info.layer_count
            )));
        }
        let (Ok(width), Ok(height)) = (u32::try_from(info.width), u32::try_from(info.height))
        else {
            return Err(GrallocError::BadDescriptor(format!(
                "invalid dimensions {}x{}",
                info.width, info.height
            )));
        };
        let reserved_size = u64::try_from(info.reserved_size).map_err(|_| {
            GrallocError::BadDescriptor(format!("invalid reserved size {}", info.reserved_size))
        })?;
        let drm_format = info.format.to_drm_format().ok_or_else(|| {
            tracing::error!(format = ?info.format, "unsupported pixel format");
            GrallocError::Unsupported(format!("pixel format {:?}", info.format))
        })?;
        let usage = android::convert_usage(info.usage).ok_or_else(|| {
            GrallocError::Unsupported(format!("usage {:#x}", info.usage))
        })?;

        let mut desc = Self::new(width, height, drm_format, usage)
            .with_name(String::from_utf8_lossy(&info.name).into_owned())
            .with_metadata_region(reserved_size);
        desc.droid_format = info.format;
        desc.droid_usage = info.usage;

        for option in &info.additional_options {
            if option.name != STANDARD_METADATA_DATASPACE {
                return Err(GrallocError::Unsupported(format!(
                    "additional option {:?}",
                    option.name
                )));
            }
            let value = i32::try_from(option.value).map_err(|_| {
                GrallocError::BadDescriptor(format!("dataspace {} out of range", option.value))
            })?;
            desc.dataspace = Dataspace(value);
        }

        desc.validate()?;
        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::android::usage;
    use pretty_assertions::assert_eq;

    #[test]
    fn hal_request_converts_to_drm_terms() {
        let mut info = BufferDescriptorInfo::new(
            640,
            480,
            PixelFormat::RGBA_8888,
            usage::GPU_TEXTURE | usage::CPU_READ_OFTEN,
        );
        info.name = b"preview".to_vec();
        info.reserved_size = 32;
        info.additional_options
            .push(ExtendableType::dataspace(Dataspace::SRGB));

        let desc = AllocationDescriptor::try_from(&info).unwrap();
        assert_eq!(desc.drm_format, DrmFormat::ABGR8888);
        assert_eq!(
            desc.usage,
            BufferUsage::TEXTURE | BufferUsage::SW_READ_OFTEN
        );
        assert_eq!(desc.name, "preview");
        assert_eq!(desc.dataspace, Dataspace::SRGB);
        assert!(desc.enable_metadata);
        assert_eq!(desc.client_metadata_size, 32);
        assert_eq!(desc.droid_format, PixelFormat::RGBA_8888);
    }

    #[test]
    fn unknown_options_layers_and_formats_are_unsupported() {
        let base = BufferDescriptorInfo::new(64, 64, PixelFormat::RGBA_8888, usage::GPU_TEXTURE);

        let mut layered = base.clone();
        layered.layer_count = 2;
        assert!(matches!(
            AllocationDescriptor::try_from(&layered),
            Err(GrallocError::Unsupported(_))
        ));

        let mut optioned = base.clone();
        optioned.additional_options.push(ExtendableType {
            name: "vendor.compression".to_owned(),
            value: 1,
        });
        assert!(!optioned.has_only_known_options());
        assert!(matches!(
            AllocationDescriptor::try_from(&optioned),
            Err(GrallocError::Unsupported(_))
        ));

        let mut format = base.clone();
        format.format = PixelFormat(0x7777);
        assert!(matches!(
            AllocationDescriptor::try_from(&format),
            Err(GrallocError::Unsupported(_))
        ));

        let mut bits = base;
        bits.usage |= 1 << 19;
        assert!(matches!(
            AllocationDescriptor::try_from(&bits),
            Err(GrallocError::Unsupported(_))
        ));
    }

    #[test]
    fn malformed_requests_are_bad_descriptors() {
        let negative = BufferDescriptorInfo::new(-1, 64, PixelFormat::RGBA_8888, 0);
        assert!(matches!(
            AllocationDescriptor::try_from(&negative),
            Err(GrallocError::BadDescriptor(_))
        ));

        let zero = BufferDescriptorInfo::new(0, 64, PixelFormat::RGBA_8888, 0);
        assert!(matches!(
            AllocationDescriptor::try_from(&zero),
            Err(GrallocError::BadDescriptor(_))
        ));

        let mut long_name = BufferDescriptorInfo::new(8, 8, PixelFormat::RGBA_8888, 0);
        long_name.name = vec![b'n'; BUFFER_METADATA_MAX_NAME_SIZE];
        assert!(matches!(
            AllocationDescriptor::try_from(&long_name),
            Err(GrallocError::BadDescriptor(_))
        ));

        let mut wide_dataspace = BufferDescriptorInfo::new(8, 8, PixelFormat::RGBA_8888, 0);
        wide_dataspace.additional_options.push(ExtendableType {
            name: STANDARD_METADATA_DATASPACE.to_owned(),
            value: i64::from(Dataspace::SRGB.0) + (1 << 32),
        });
        assert!(matches!(
            AllocationDescriptor::try_from(&wide_dataspace),
            Err(GrallocError::BadDescriptor(_))
        ));
    }

    #[test]
    fn from_android_keeps_the_hal_terms() {
        let desc = AllocationDescriptor::from_android(
            32,
            32,
            PixelFormat::YCBCR_420_888,
            usage::VIDEO_DECODER,
        )
        .unwrap();
        assert_eq!(desc.drm_format, DrmFormat::FLEX_YCBCR_420_888);
        assert_eq!(desc.usage, BufferUsage::HW_VIDEO_DECODER);
        assert_eq!(desc.droid_usage, usage::VIDEO_DECODER);
        assert!(!desc.enable_metadata);
        assert!(AllocationDescriptor::from_android(32, 32, PixelFormat(0x99), 0).is_none());
    }
}
