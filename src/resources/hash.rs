use std::fmt;

use bytemuck::{Pod, Zeroable};

/// 128-bit content hash identifying a resource globally.
///
/// Computed from the canonical metadata byte sequence and the uncompressed
/// payload; identical content always hashes equal, and the hash stays the
/// same whichever representation (compressed or not) is resident.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Pod, Zeroable)]
pub struct ResourceContentHash {
    pub hi: u64,
    pub lo: u64,
}

impl ResourceContentHash {
    /// The all-zero hash, used as the "no resource" sentinel.
    pub const INVALID: Self = Self { hi: 0, lo: 0 };

    #[must_use]
    pub const fn new(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    /// Hashes canonical metadata bytes followed by the uncompressed payload.
    #[must_use]
    pub fn from_content(metadata: &[u8], payload: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(metadata);
        hasher.update(payload);
        let digest = hasher.finalize();
        let bytes = digest.as_bytes();
        Self {
            hi: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            lo: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for ResourceContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

impl fmt::Debug for ResourceContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceContentHash({self})")
    }
}
