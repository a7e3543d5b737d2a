//! PCI device ids of Intel GPUs driven by the Xe kernel driver.

pub const GEN12_IDS: &[u16] = &[
    0x4c8a, 0x4c8b, 0x4c8c, 0x4c90, 0x4c9a, 0x4680, 0x4681, 0x4682, 0x4683, 0x4688, 0x4689,
    0x4690, 0x4691, 0x4692, 0x4693, 0x4698, 0x4699, 0x4626, 0x4628, 0x462a, 0x46a0, 0x46a1,
    0x46a2, 0x46a3, 0x46a6, 0x46a8, 0x46aa, 0x46b0, 0x46b1, 0x46b2, 0x46b3, 0x46c0, 0x46c1,
    0x46c2, 0x46c3, 0x9a40, 0x9a49, 0x9a59, 0x9a60, 0x9a68, 0x9a70, 0x9a78, 0x9ac0, 0x9ac9,
    0x9ad9, 0x9af8, 0x4905, 0x4906, 0x4907, 0x4908,
];

/// Alder Lake-P.
pub const ADLP_IDS: &[u16] = &[
    0x46a0, 0x46a1, 0x46a2, 0x46a3, 0x46a6, 0x46a8, 0x46aa, 0x462a, 0x4626, 0x4628, 0x46b0,
    0x46b1, 0x46b2, 0x46b3, 0x46c0, 0x46c1, 0x46c2, 0x46c3, 0x46d0, 0x46d1, 0x46d2,
];

/// Raptor Lake-P.
pub const RPLP_IDS: &[u16] = &[0xa720, 0xa721, 0xa7a0, 0xa7a1, 0xa7a8, 0xa7a9];

/// Meteor Lake.
pub const MTL_IDS: &[u16] = &[0x7d40, 0x7d60, 0x7d45, 0x7d55, 0x7dd5];

/// Lunar Lake.
pub const LNL_IDS: &[u16] = &[0x6420, 0x64a0, 0x64b0];

/// Panther Lake.
pub const PTL_IDS: &[u16] = &[
    0xb080, 0xb081, 0xb082, 0xb083, 0xb08f, 0xb090, 0xb0a0, 0xb0b0,
];
