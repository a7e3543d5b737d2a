//! Per-buffer metadata stored in the reserved shared-memory region.
//!
//! The region is a `MAP_SHARED` mapping of a memfd passed along with the buffer handle, so every
//! process holding the handle sees the same bytes. It starts with a fixed-layout
//! [`BufferMetadata`] record followed by `client_size` bytes owned by the client.
//!
//! All field accesses go through volatile reads/writes on raw pointers: other processes may
//! write the region at any time.

use std::fmt;
use std::io;
use std::mem;
use std::os::fd::BorrowedFd;
use std::ptr::{self, addr_of, addr_of_mut};

use bytemuck::{Pod, Zeroable};
use gralloc_drv::MappedRegion;

/// Capacity of the NUL-terminated name field, terminator included.
pub const BUFFER_METADATA_MAX_NAME_SIZE: usize = 1024;

/// A CIE 1931 chromaticity coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct XyColor {
    pub x: f32,
    pub y: f32,
}

/// CTA-861.3 HDR static metadata (content light levels, nits).
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Cta861_3 {
    pub max_content_light_level: f32,
    pub max_frame_average_light_level: f32,
}

/// SMPTE ST 2086 mastering display color volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Smpte2086 {
    pub primary_red: XyColor,
    pub primary_green: XyColor,
    pub primary_blue: XyColor,
    pub white_point: XyColor,
    pub max_luminance: f32,
    pub min_luminance: f32,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Cta861_3 {}
    impl Sealed for super::Smpte2086 {}
}

/// Values that may be stored in a [`SharedOptional`]: 4-byte aligned `Pod` records.
pub trait SharedValue: Pod + sealed::Sealed {}
impl SharedValue for Cta861_3 {}
impl SharedValue for Smpte2086 {}

const VACANT: u32 = 0;
const OCCUPIED: u32 = 1;

/// An optional value with a fixed in-memory layout: a `u32` occupancy word followed by the
/// value. A vacant slot still carries (ignored) value bytes.
#[derive(Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct SharedOptional<T: SharedValue> {
    occupancy: u32,
    value: T,
}

// SAFETY: `SharedValue` is only implemented for 4-byte aligned `Pod` records made of `f32`s, so
// `u32` followed by `T` has no padding and every bit pattern is valid.
unsafe impl<T: SharedValue> Zeroable for SharedOptional<T> {}
unsafe impl<T: SharedValue> Pod for SharedOptional<T> {}

impl<T: SharedValue> SharedOptional<T> {
    pub fn new(value: Option<T>) -> Self {
        match value {
            Some(value) => Self {
                occupancy: OCCUPIED,
                value,
            },
            None => Self::zeroed(),
        }
    }

    /// Any occupancy word other than vacant counts as occupied.
    pub fn get(&self) -> Option<T> {
        (self.occupancy != VACANT).then_some(self.value)
    }
}

impl<T: SharedValue> From<Option<T>> for SharedOptional<T> {
    fn from(value: Option<T>) -> Self {
        Self::new(value)
    }
}

impl<T: SharedValue + fmt::Debug> fmt::Debug for SharedOptional<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.get(), f)
    }
}

/// How a layer blends with what is beneath it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum BlendMode {
    #[default]
    Invalid = 0,
    None = 1,
    Premultiplied = 2,
    Coverage = 3,
}

impl BlendMode {
    pub const fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Invalid),
            1 => Some(Self::None),
            2 => Some(Self::Premultiplied),
            3 => Some(Self::Coverage),
            _ => None,
        }
    }
}

/// Color space of the buffer contents (`android.hardware.graphics.common.Dataspace`).
///
/// Stored as the raw 32-bit value; the standard/transfer/range sub-fields are not interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dataspace(pub i32);

impl Dataspace {
    pub const UNKNOWN: Self = Self(0);
    pub const ARBITRARY: Self = Self(1);
    pub const SRGB_LINEAR: Self = Self(138_477_568);
    pub const SRGB: Self = Self(142_671_872);
    pub const DISPLAY_P3: Self = Self(143_261_696);
    pub const BT2020_PQ: Self = Self(163_971_072);
    pub const BT709: Self = Self(281_083_904);
}

/// The fixed metadata record at offset 0 of the reserved region.
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BufferMetadata {
    pub name: [u8; BUFFER_METADATA_MAX_NAME_SIZE],
    pub blend_mode: i32,
    pub dataspace: i32,
    pub cta861_3: SharedOptional<Cta861_3>,
    pub smpte2086: SharedOptional<Smpte2086>,
}

impl BufferMetadata {
    /// The name up to its first NUL, lossily decoded as UTF-8.
    pub fn name(&self) -> String {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }

    /// The stored blend mode; unknown values read as [`BlendMode::Invalid`].
    pub fn blend_mode(&self) -> BlendMode {
        BlendMode::from_i32(self.blend_mode).unwrap_or_default()
    }

    pub fn dataspace(&self) -> Dataspace {
        Dataspace(self.dataspace)
    }
}

impl Default for BufferMetadata {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for BufferMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferMetadata")
            .field("name", &self.name())
            .field("blend_mode", &self.blend_mode)
            .field("dataspace", &self.dataspace)
            .field("cta861_3", &self.cta861_3)
            .field("smpte2086", &self.smpte2086)
            .finish()
    }
}

/// Encode `name` into the fixed name field, truncating at a byte boundary so the terminator fits.
fn encode_name(name: &str) -> [u8; BUFFER_METADATA_MAX_NAME_SIZE] {
    let mut out = [0u8; BUFFER_METADATA_MAX_NAME_SIZE];
    let len = name.len().min(BUFFER_METADATA_MAX_NAME_SIZE - 1);
    out[..len].copy_from_slice(&name.as_bytes()[..len]);
    out
}

/// A mapping of a buffer's reserved region.
#[derive(Debug)]
pub struct ReservedRegion {
    mapping: MappedRegion,
}

impl ReservedRegion {
    /// Map `size` bytes of the reserved-region fd. `size` covers the metadata record and the client
    /// area.
    pub fn map(fd: BorrowedFd<'_>, size: usize) -> io::Result<Self> {
        if size < mem::size_of::<BufferMetadata>() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "reserved region smaller than the metadata record",
            ));
        }
        let mapping = MappedRegion::map_shared(fd, size, 0)?;
        Ok(Self { mapping })
    }

    fn metadata_ptr(&self) -> *mut BufferMetadata {
        self.mapping.as_ptr().cast()
    }

    /// Copy the whole metadata record out of shared memory.
    pub fn snapshot(&self) -> BufferMetadata {
        // SAFETY: the mapping is at least `size_of::<BufferMetadata>()` bytes, page aligned, and
        // every bit pattern is a valid `BufferMetadata`.
        unsafe { ptr::read_volatile(self.metadata_ptr()) }
    }

    pub fn name(&self) -> String {
        // SAFETY: see `snapshot`; the field pointer stays inside the record.
        let raw = unsafe { ptr::read_volatile(addr_of!((*self.metadata_ptr()).name)) };
        BufferMetadata {
            name: raw,
            ..BufferMetadata::zeroed()
        }
        .name()
    }

    /// Store `name`, truncated to fit the field.
    pub fn set_name(&self, name: &str) {
        let encoded = encode_name(name);
        // SAFETY: see `snapshot`.
        unsafe { ptr::write_volatile(addr_of_mut!((*self.metadata_ptr()).name), encoded) }
    }

    pub fn blend_mode(&self) -> BlendMode {
        // SAFETY: see `snapshot`.
        let raw = unsafe { ptr::read_volatile(addr_of!((*self.metadata_ptr()).blend_mode)) };
        BlendMode::from_i32(raw).unwrap_or_default()
    }

    pub fn set_blend_mode(&self, blend_mode: BlendMode) {
        // SAFETY: see `snapshot`.
        unsafe {
            ptr::write_volatile(
                addr_of_mut!((*self.metadata_ptr()).blend_mode),
                blend_mode as i32,
            )
        }
    }

    pub fn dataspace(&self) -> Dataspace {
        // SAFETY: see `snapshot`.
        Dataspace(unsafe { ptr::read_volatile(addr_of!((*self.metadata_ptr()).dataspace)) })
    }

    pub fn set_dataspace(&self, dataspace: Dataspace) {
        // SAFETY: see `snapshot`.
        unsafe { ptr::write_volatile(addr_of_mut!((*self.metadata_ptr()).dataspace), dataspace.0) }
    }

    pub fn cta861_3(&self) -> Option<Cta861_3> {
        // SAFETY: see `snapshot`.
        unsafe { ptr::read_volatile(addr_of!((*self.metadata_ptr()).cta861_3)) }.get()
    }

    pub fn set_cta861_3(&self, value: Option<Cta861_3>) {
        // SAFETY: see `snapshot`.
        unsafe {
            ptr::write_volatile(
                addr_of_mut!((*self.metadata_ptr()).cta861_3),
                SharedOptional::new(value),
            )
        }
    }

    pub fn smpte2086(&self) -> Option<Smpte2086> {
        // SAFETY: see `snapshot`.
        unsafe { ptr::read_volatile(addr_of!((*self.metadata_ptr()).smpte2086)) }.get()
    }

    pub fn set_smpte2086(&self, value: Option<Smpte2086>) {
        // SAFETY: see `snapshot`.
        unsafe {
            ptr::write_volatile(
                addr_of_mut!((*self.metadata_ptr()).smpte2086),
                SharedOptional::new(value),
            )
        }
    }

    /// The client-owned bytes following the metadata record.
    pub fn client_region(&self) -> ClientRegion<'_> {
        let offset = mem::size_of::<BufferMetadata>();
        ClientRegion {
            // SAFETY: `map` checked the mapping holds at least `offset` bytes.
            ptr: unsafe { self.mapping.as_ptr().add(offset) },
            len: self.mapping.len() - offset,
            _region: self,
        }
    }
}

/// A view of the client-owned part of a reserved region.
#[derive(Debug, Clone, Copy)]
pub struct ClientRegion<'a> {
    ptr: *mut u8,
    len: usize,
    _region: &'a ReservedRegion,
}

impl ClientRegion<'_> {
    /// Start of the client bytes. Valid while the region stays mapped.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check(&self, offset: usize, len: usize) -> io::Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "access past the end of the client region",
            )),
        }
    }

    /// Copy `buf.len()` bytes starting at `offset` out of the region.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> io::Result<()> {
        self.check(offset, buf.len())?;
        // SAFETY: bounds checked above; `buf` is a distinct local allocation.
        unsafe { ptr::copy_nonoverlapping(self.ptr.add(offset), buf.as_mut_ptr(), buf.len()) }
        Ok(())
    }

    /// Copy `data` into the region at `offset`.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> io::Result<()> {
        self.check(offset, data.len())?;
        // SAFETY: bounds checked above; the mapping is writable shared memory.
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(offset), data.len()) }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gralloc_drv::mman::create_shared_memory;
    use pretty_assertions::assert_eq;
    use std::mem::offset_of;
    use std::os::fd::AsFd;

    #[test]
    fn metadata_record_layout_is_stable() {
        assert_eq!(mem::size_of::<SharedOptional<Cta861_3>>(), 12);
        assert_eq!(mem::size_of::<SharedOptional<Smpte2086>>(), 44);
        assert_eq!(mem::size_of::<BufferMetadata>(), 1088);
        assert_eq!(offset_of!(BufferMetadata, name), 0);
        assert_eq!(offset_of!(BufferMetadata, blend_mode), 1024);
        assert_eq!(offset_of!(BufferMetadata, dataspace), 1028);
        assert_eq!(offset_of!(BufferMetadata, cta861_3), 1032);
        assert_eq!(offset_of!(BufferMetadata, smpte2086), 1044);
    }

    #[test]
    fn shared_optional_reports_occupancy() {
        let light = Cta861_3 {
            max_content_light_level: 1000.0,
            max_frame_average_light_level: 400.0,
        };
        assert_eq!(SharedOptional::new(Some(light)).get(), Some(light));
        assert_eq!(SharedOptional::<Cta861_3>::new(None).get(), None);
        let shared = SharedOptional::new(Some(light));
        let bytes = bytemuck::bytes_of(&shared);
        assert_eq!(&bytes[..4], &1u32.to_ne_bytes());
    }

    #[test]
    fn fields_are_visible_through_a_second_mapping() {
        let size = mem::size_of::<BufferMetadata>() + 64;
        let fd = create_shared_memory("metadata-test", size as u64).unwrap();
        let a = ReservedRegion::map(fd.as_fd(), size).unwrap();
        let b = ReservedRegion::map(fd.as_fd(), size).unwrap();

        a.set_name("camera preview");
        a.set_dataspace(Dataspace::DISPLAY_P3);
        a.set_blend_mode(BlendMode::Coverage);
        let mastering = Smpte2086 {
            white_point: XyColor {
                x: 0.3127,
                y: 0.329,
            },
            max_luminance: 1000.0,
            min_luminance: 0.05,
            ..Smpte2086::default()
        };
        a.set_smpte2086(Some(mastering));

        assert_eq!(b.name(), "camera preview");
        assert_eq!(b.dataspace(), Dataspace::DISPLAY_P3);
        assert_eq!(b.blend_mode(), BlendMode::Coverage);
        assert_eq!(b.smpte2086(), Some(mastering));
        assert_eq!(b.cta861_3(), None);

        a.set_smpte2086(None);
        assert_eq!(b.snapshot().smpte2086.get(), None);
    }

    #[test]
    fn long_names_are_truncated_to_fit_the_terminator() {
        let size = mem::size_of::<BufferMetadata>();
        let fd = create_shared_memory("metadata-test", size as u64).unwrap();
        let region = ReservedRegion::map(fd.as_fd(), size).unwrap();
        region.set_name(&"x".repeat(4000));
        assert_eq!(region.name().len(), BUFFER_METADATA_MAX_NAME_SIZE - 1);
        assert_eq!(region.snapshot().name[BUFFER_METADATA_MAX_NAME_SIZE - 1], 0);
    }

    #[test]
    fn client_region_follows_the_record() {
        let size = mem::size_of::<BufferMetadata>() + 16;
        let fd = create_shared_memory("metadata-test", size as u64).unwrap();
        let region = ReservedRegion::map(fd.as_fd(), size).unwrap();
        let client = region.client_region();
        assert_eq!(client.len(), 16);

        client.write_at(12, b"abcd").unwrap();
        let mut out = [0u8; 4];
        client.read_at(12, &mut out).unwrap();
        assert_eq!(&out, b"abcd");
        assert!(client.write_at(13, b"abcd").is_err());
        assert_eq!(region.name(), "");
    }

    #[test]
    fn undersized_regions_are_rejected() {
        let fd = create_shared_memory("metadata-test", 4096).unwrap();
        let err = ReservedRegion::map(fd.as_fd(), 64).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
