//! The format/usage combination table.
//!
//! A backend registers, per pixel format, which (tiling, modifier) layouts it supports and for
//! which usages. The table is built once when the driver session starts and is read-only
//! afterwards, so lookups need no locking.

use gralloc_formats::{BufferUsage, DrmFormat, Modifier};

use crate::layout::Tiling;

/// Layout half of a combination. Higher `priority` is preferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FormatMetadata {
    pub tiling: Tiling,
    pub modifier: Modifier,
    pub priority: u32,
}

impl FormatMetadata {
    pub const LINEAR: Self = Self {
        tiling: Tiling::None,
        modifier: Modifier::LINEAR,
        priority: 1,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Combination {
    pub format: DrmFormat,
    pub metadata: FormatMetadata,
    /// Every usage this layout can serve.
    pub usage: BufferUsage,
}

impl Combination {
    pub fn serves(&self, format: DrmFormat, usage: BufferUsage) -> bool {
        self.format == format && self.usage.contains(usage)
    }
}

#[derive(Clone, Debug, Default)]
pub struct CombinationTable {
    entries: Vec<Combination>,
}

impl CombinationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, format: DrmFormat, metadata: FormatMetadata, usage: BufferUsage) {
        self.entries.push(Combination {
            format,
            metadata,
            usage,
        });
    }

    pub fn add_all(&mut self, formats: &[DrmFormat], metadata: FormatMetadata, usage: BufferUsage) {
        for &format in formats {
            self.add(format, metadata, usage);
        }
    }

    /// Widen the usage of every entry registered for `format` with exactly `metadata`.
    pub fn modify(&mut self, format: DrmFormat, metadata: FormatMetadata, usage: BufferUsage) {
        for entry in &mut self.entries {
            if entry.format == format && entry.metadata == metadata {
                entry.usage |= usage;
            }
        }
    }

    pub fn modify_all(
        &mut self,
        formats: &[DrmFormat],
        metadata: FormatMetadata,
        usage: BufferUsage,
    ) {
        for &format in formats {
            self.modify(format, metadata, usage);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Combination> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that can serve `usage` for `format`, in registration order.
    pub fn matching(
        &self,
        format: DrmFormat,
        usage: BufferUsage,
    ) -> impl Iterator<Item = &Combination> + '_ {
        self.entries.iter().filter(move |c| c.serves(format, usage))
    }

    /// The highest-priority entry serving `usage`; on equal priority the later registration wins.
    pub fn best(&self, format: DrmFormat, usage: BufferUsage) -> Option<&Combination> {
        self.matching(format, usage).fold(None, |best, c| match best {
            Some(b) if b.metadata.priority > c.metadata.priority => Some(b),
            _ => Some(c),
        })
    }

    pub fn is_supported(&self, format: DrmFormat, usage: BufferUsage) -> bool {
        self.matching(format, usage).next().is_some()
    }

    /// Distinct formats present in the table, in first-registration order.
    pub fn formats(&self) -> Vec<DrmFormat> {
        let mut formats: Vec<DrmFormat> = Vec::new();
        for entry in &self.entries {
            if !formats.contains(&entry.format) {
                formats.push(entry.format);
            }
        }
        formats
    }
}
