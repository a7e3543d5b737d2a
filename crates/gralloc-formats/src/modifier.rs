use std::fmt;

const DRM_FORMAT_MOD_VENDOR_NONE: u64 = 0;
const DRM_FORMAT_MOD_VENDOR_INTEL: u64 = 0x01;
const DRM_FORMAT_RESERVED: u64 = (1u64 << 56) - 1;

const fn fourcc_mod_code(vendor: u64, val: u64) -> u64 {
    (vendor << 56) | (val & 0x00ff_ffff_ffff_ffff)
}

/// A DRM format modifier: an opaque 64-bit id naming a concrete memory layout (tiling scheme plus
/// optional compression scheme).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Modifier(pub u64);

impl Modifier {
    pub const LINEAR: Self = Self(fourcc_mod_code(DRM_FORMAT_MOD_VENDOR_NONE, 0));
    pub const INVALID: Self = Self(fourcc_mod_code(DRM_FORMAT_MOD_VENDOR_NONE, DRM_FORMAT_RESERVED));

    pub const I915_X_TILED: Self = Self(fourcc_mod_code(DRM_FORMAT_MOD_VENDOR_INTEL, 1));
    pub const I915_Y_TILED: Self = Self(fourcc_mod_code(DRM_FORMAT_MOD_VENDOR_INTEL, 2));
    /// Y-tiled main surface with a render-compression control surface (Gen9-Gen11 style CCS).
    pub const I915_Y_TILED_CCS: Self = Self(fourcc_mod_code(DRM_FORMAT_MOD_VENDOR_INTEL, 4));
    /// Y-tiled main surface with a Gen12 render-compression aux surface.
    pub const I915_Y_TILED_GEN12_RC_CCS: Self =
        Self(fourcc_mod_code(DRM_FORMAT_MOD_VENDOR_INTEL, 6));
    pub const I915_4_TILED: Self = Self(fourcc_mod_code(DRM_FORMAT_MOD_VENDOR_INTEL, 9));

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn vendor(self) -> u8 {
        (self.0 >> 56) as u8
    }

    pub const fn is_linear(self) -> bool {
        self.0 == Self::LINEAR.0
    }

    pub const fn is_invalid(self) -> bool {
        self.0 == Self::INVALID.0
    }

    /// Whether the layout carries an inline compression control surface as an extra plane.
    pub const fn is_compressed(self) -> bool {
        self.0 == Self::I915_Y_TILED_CCS.0 || self.0 == Self::I915_Y_TILED_GEN12_RC_CCS.0
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::LINEAR => "LINEAR",
            Self::INVALID => "INVALID",
            Self::I915_X_TILED => "I915_X_TILED",
            Self::I915_Y_TILED => "I915_Y_TILED",
            Self::I915_Y_TILED_CCS => "I915_Y_TILED_CCS",
            Self::I915_Y_TILED_GEN12_RC_CCS => "I915_Y_TILED_GEN12_RC_CCS",
            Self::I915_4_TILED => "I915_4_TILED",
            _ => return None,
        })
    }
}

impl From<u64> for Modifier {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "Modifier({name})"),
            None => write!(f, "Modifier({:#018x})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intel_modifiers_carry_vendor_byte() {
        assert_eq!(Modifier::I915_X_TILED.as_u64(), 0x0100_0000_0000_0001);
        assert_eq!(Modifier::I915_4_TILED.vendor(), 0x01);
        assert_eq!(Modifier::LINEAR.vendor(), 0);
        assert_eq!(Modifier::INVALID.as_u64(), 0x00ff_ffff_ffff_ffff);
    }

    #[test]
    fn only_ccs_modifiers_are_compressed() {
        assert!(Modifier::I915_Y_TILED_CCS.is_compressed());
        assert!(Modifier::I915_Y_TILED_GEN12_RC_CCS.is_compressed());
        assert!(!Modifier::I915_Y_TILED.is_compressed());
        assert!(!Modifier::LINEAR.is_compressed());
    }

    #[test]
    fn debug_prints_known_names() {
        assert_eq!(format!("{:?}", Modifier::I915_Y_TILED), "Modifier(I915_Y_TILED)");
        assert_eq!(format!("{:?}", Modifier(0x42)), "Modifier(0x0000000000000042)");
    }
}
