//! Modifier negotiation.
//!
//! Without a peer list the best table entry wins, then a backend's override rules get a chance to
//! replace it. With a peer list the backend's preference order is intersected with it.

use gralloc_formats::{planar, BufferUsage, DrmFormat, Modifier};

use crate::combination::CombinationTable;
use crate::error::{DriverError, Result};

/// A backend rule replacing the table-selected modifier for one exact usage (and optionally one
/// format). Only consulted when the caller gave no peer modifier list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModifierOverride {
    pub format: Option<DrmFormat>,
    pub usage: BufferUsage,
    pub modifier: Modifier,
}

impl ModifierOverride {
    pub fn matches(&self, format: DrmFormat, usage: BufferUsage) -> bool {
        self.format.map_or(true, |f| f == format) && self.usage == usage
    }
}

/// First entry of `preference` that also appears in `peer`.
pub fn pick_modifier(
    peer: &[Modifier],
    preference: impl IntoIterator<Item = Modifier>,
) -> Option<Modifier> {
    preference.into_iter().find(|m| peer.contains(m))
}

#[derive(Clone, Copy, Debug)]
pub struct ModifierNegotiator<'a> {
    table: &'a CombinationTable,
    preference: &'a [Modifier],
    overrides: &'a [ModifierOverride],
    compression: bool,
}

impl<'a> ModifierNegotiator<'a> {
    pub fn new(table: &'a CombinationTable, preference: &'a [Modifier]) -> Self {
        Self {
            table,
            preference,
            overrides: &[],
            compression: true,
        }
    }

    pub fn with_overrides(mut self, overrides: &'a [ModifierOverride]) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub fn is_supported(&self, format: DrmFormat, usage: BufferUsage) -> bool {
        self.table.is_supported(format, usage)
    }

    pub fn select_modifier(
        &self,
        format: DrmFormat,
        usage: BufferUsage,
        peer: Option<&[Modifier]>,
    ) -> Result<Modifier> {
        let Some(best) = self.table.best(format, usage) else {
            return Err(DriverError::Unsupported { format, usage });
        };

        let modifier = match peer {
            Some(peer) => {
                // Compression surfaces only exist for single-plane formats.
                let single_plane = planar::num_planes_from_format(format) == 1;
                let candidates = self
                    .preference
                    .iter()
                    .copied()
                    .filter(|m| single_plane || !m.is_compressed());
                pick_modifier(peer, candidates).ok_or(DriverError::NoCommonModifier)?
            }
            None => self
                .overrides
                .iter()
                .find(|rule| rule.matches(format, usage))
                .map_or(best.metadata.modifier, |rule| rule.modifier),
        };

        if !self.compression && modifier.is_compressed() {
            let fallback = if peer.is_some_and(|p| p.contains(&Modifier::I915_Y_TILED)) {
                Modifier::I915_Y_TILED
            } else {
                Modifier::LINEAR
            };
            tracing::debug!(
                ?modifier,
                ?fallback,
                "compression disabled, replacing compressed modifier"
            );
            return Ok(fallback);
        }
        Ok(modifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::FormatMetadata;
    use crate::layout::Tiling;
    use pretty_assertions::assert_eq;

    const ORDER: &[Modifier] = &[
        Modifier::I915_Y_TILED_GEN12_RC_CCS,
        Modifier::I915_Y_TILED,
        Modifier::I915_X_TILED,
        Modifier::LINEAR,
    ];

    fn table() -> CombinationTable {
        let mut table = CombinationTable::new();
        table.add_all(
            &[DrmFormat::XRGB8888, DrmFormat::NV12],
            FormatMetadata::LINEAR,
            BufferUsage::TEXTURE | BufferUsage::SW_READ_OFTEN,
        );
        table.add(
            DrmFormat::XRGB8888,
            FormatMetadata {
                tiling: Tiling::Y,
                modifier: Modifier::I915_Y_TILED,
                priority: 3,
            },
            BufferUsage::TEXTURE,
        );
        table
    }

    #[test]
    fn pick_modifier_follows_preference_not_peer_order() {
        let peer = [Modifier::LINEAR, Modifier::I915_X_TILED];
        assert_eq!(
            pick_modifier(&peer, ORDER.iter().copied()),
            Some(Modifier::I915_X_TILED)
        );
        assert_eq!(
            pick_modifier(&[Modifier::I915_4_TILED], ORDER.iter().copied()),
            None
        );
    }

    #[test]
    fn without_peer_list_the_highest_priority_entry_wins() {
        let table = table();
        let negotiator = ModifierNegotiator::new(&table, ORDER);
        assert_eq!(
            negotiator
                .select_modifier(DrmFormat::XRGB8888, BufferUsage::TEXTURE, None)
                .unwrap(),
            Modifier::I915_Y_TILED
        );
        assert_eq!(
            negotiator
                .select_modifier(
                    DrmFormat::XRGB8888,
                    BufferUsage::TEXTURE | BufferUsage::SW_READ_OFTEN,
                    None
                )
                .unwrap(),
            Modifier::LINEAR
        );
    }

    #[test]
    fn unsupported_request_never_falls_back_to_linear() {
        let table = table();
        let negotiator = ModifierNegotiator::new(&table, ORDER);
        let err = negotiator
            .select_modifier(DrmFormat::XRGB8888, BufferUsage::SCANOUT, None)
            .unwrap_err();
        assert!(matches!(err, DriverError::Unsupported { .. }));
        assert!(!negotiator.is_supported(DrmFormat::XRGB8888, BufferUsage::SCANOUT));
    }

    #[test]
    fn peer_list_without_intersection_fails() {
        let table = table();
        let negotiator = ModifierNegotiator::new(&table, ORDER);
        let err = negotiator
            .select_modifier(
                DrmFormat::XRGB8888,
                BufferUsage::TEXTURE,
                Some(&[Modifier::I915_4_TILED]),
            )
            .unwrap_err();
        assert!(matches!(err, DriverError::NoCommonModifier));
    }

    #[test]
    fn compressed_modifiers_are_skipped_for_planar_formats() {
        let table = table();
        let negotiator = ModifierNegotiator::new(&table, ORDER);
        let peer = [Modifier::I915_Y_TILED_GEN12_RC_CCS, Modifier::LINEAR];
        assert_eq!(
            negotiator
                .select_modifier(DrmFormat::NV12, BufferUsage::TEXTURE, Some(&peer))
                .unwrap(),
            Modifier::LINEAR
        );
        assert_eq!(
            negotiator
                .select_modifier(DrmFormat::XRGB8888, BufferUsage::TEXTURE, Some(&peer))
                .unwrap(),
            Modifier::I915_Y_TILED_GEN12_RC_CCS
        );
    }

    #[test]
    fn disabled_compression_falls_back_to_offered_y_tiling() {
        let table = table();
        let negotiator = ModifierNegotiator::new(&table, ORDER).with_compression(false);
        let with_y = [Modifier::I915_Y_TILED_GEN12_RC_CCS, Modifier::I915_Y_TILED];
        assert_eq!(
            negotiator
                .select_modifier(DrmFormat::XRGB8888, BufferUsage::TEXTURE, Some(&with_y))
                .unwrap(),
            Modifier::I915_Y_TILED
        );
        let without_y = [Modifier::I915_Y_TILED_GEN12_RC_CCS];
        assert_eq!(
            negotiator
                .select_modifier(DrmFormat::XRGB8888, BufferUsage::TEXTURE, Some(&without_y))
                .unwrap(),
            Modifier::LINEAR
        );
    }

    #[test]
    fn overrides_apply_only_to_exact_usage_without_peer_list() {
        let table = table();
        let rules = [ModifierOverride {
            format: None,
            usage: BufferUsage::TEXTURE,
            modifier: Modifier::I915_4_TILED,
        }];
        let negotiator = ModifierNegotiator::new(&table, ORDER).with_overrides(&rules);
        assert_eq!(
            negotiator
                .select_modifier(DrmFormat::NV12, BufferUsage::TEXTURE, None)
                .unwrap(),
            Modifier::I915_4_TILED
        );
        assert_eq!(
            negotiator
                .select_modifier(
                    DrmFormat::NV12,
                    BufferUsage::TEXTURE | BufferUsage::SW_READ_OFTEN,
                    None
                )
                .unwrap(),
            Modifier::LINEAR
        );
        assert_eq!(
            negotiator
                .select_modifier(
                    DrmFormat::XRGB8888,
                    BufferUsage::TEXTURE,
                    Some(&[Modifier::I915_X_TILED])
                )
                .unwrap(),
            Modifier::I915_X_TILED
        );
    }
}
