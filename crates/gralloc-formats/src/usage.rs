bitflags::bitflags! {
    /// Intended usage of a buffer (`BO_USE_*`).
    ///
    /// A format/tiling combination advertises the set of usages it can serve; a request is only
    /// satisfiable by combinations whose mask is a superset of the requested bits.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct BufferUsage: u64 {
        const SCANOUT = 1 << 0;
        const CURSOR = 1 << 1;
        const RENDERING = 1 << 2;
        const WRITE = 1 << 3;
        const LINEAR = 1 << 4;
        const TEXTURE = 1 << 5;
        const CAMERA_WRITE = 1 << 6;
        const CAMERA_READ = 1 << 7;
        const PROTECTED = 1 << 8;
        const SW_READ_OFTEN = 1 << 9;
        const SW_READ_RARELY = 1 << 10;
        const SW_WRITE_OFTEN = 1 << 11;
        const SW_WRITE_RARELY = 1 << 12;
        const HW_VIDEO_DECODER = 1 << 13;
        const HW_VIDEO_ENCODER = 1 << 14;
        const TEST_ALLOC = 1 << 15;
        const FRONT_RENDERING = 1 << 16;
        const RENDERSCRIPT = 1 << 17;
        const GPU_DATA_BUFFER = 1 << 18;
        const SENSOR_DIRECT_DATA = 1 << 19;
    }
}

impl BufferUsage {
    /// CPU access of any frequency.
    pub const SW_MASK: Self = Self::SW_READ_OFTEN
        .union(Self::SW_WRITE_OFTEN)
        .union(Self::SW_READ_RARELY)
        .union(Self::SW_WRITE_RARELY)
        .union(Self::FRONT_RENDERING);

    /// Everything a sampled-only format can be used for.
    pub const TEXTURE_MASK: Self = Self::LINEAR
        .union(Self::RENDERSCRIPT)
        .union(Self::SW_MASK)
        .union(Self::TEXTURE);

    /// Everything a renderable format can be used for.
    pub const RENDER_MASK: Self = Self::TEXTURE_MASK.union(Self::RENDERING);

    /// Usages that force a linear layout.
    pub const LINEAR_MASK: Self = Self::RENDERSCRIPT
        .union(Self::LINEAR)
        .union(Self::SW_READ_OFTEN)
        .union(Self::SW_WRITE_OFTEN)
        .union(Self::SW_READ_RARELY)
        .union(Self::SW_WRITE_RARELY);
}

bitflags::bitflags! {
    /// CPU access requested when mapping a buffer (`BO_MAP_*`).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct MapFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl MapFlags {
    /// Map access implied by CPU usage bits.
    pub fn from_usage(usage: BufferUsage) -> Self {
        let mut flags = Self::empty();
        if usage.intersects(BufferUsage::SW_READ_OFTEN | BufferUsage::SW_READ_RARELY) {
            flags |= Self::READ;
        }
        if usage.intersects(BufferUsage::SW_WRITE_OFTEN | BufferUsage::SW_WRITE_RARELY) {
            flags |= Self::WRITE;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_mask_is_a_superset_of_texture_mask() {
        assert!(BufferUsage::RENDER_MASK.contains(BufferUsage::TEXTURE_MASK));
        assert!(!BufferUsage::TEXTURE_MASK.contains(BufferUsage::RENDERING));
        assert!(!BufferUsage::RENDER_MASK.contains(BufferUsage::SCANOUT));
    }

    #[test]
    fn map_flags_follow_sw_usage() {
        assert_eq!(
            MapFlags::from_usage(BufferUsage::SW_READ_RARELY | BufferUsage::TEXTURE),
            MapFlags::READ
        );
        assert_eq!(
            MapFlags::from_usage(BufferUsage::SW_READ_OFTEN | BufferUsage::SW_WRITE_OFTEN),
            MapFlags::READ_WRITE
        );
        assert!(MapFlags::from_usage(BufferUsage::SCANOUT).is_empty());
    }
}
