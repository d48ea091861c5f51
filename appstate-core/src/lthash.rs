//! LT-hash: an incrementally updatable, order-independent set hash.
//!
//! Each item is expanded with HKDF-SHA256 to 128 bytes and added to (or
//! subtracted from) the state as 64 little-endian `u16` lanes with wrapping
//! arithmetic. Addition is commutative and subtraction exactly undoes it, so
//! the state depends only on the multiset of live items, never on the order
//! of updates, and one update costs O(1) regardless of how many items are live.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::AppStateError;

/// Size of the LT-hash state in bytes.
pub const LTHASH_SIZE: usize = 128;

/// HKDF info label for patch integrity item expansion.
const PATCH_INTEGRITY_INFO: &[u8] = b"WhatsApp Patch Integrity";

/// The aggregate hash over all live value MACs of one app-state category.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LtHash([u8; LTHASH_SIZE]);

impl LtHash {
    /// The hash of the empty set (all zeros).
    pub const fn empty() -> Self {
        Self([0u8; LTHASH_SIZE])
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; LTHASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, `None` if the length is wrong.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; LTHASH_SIZE] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; LTHASH_SIZE] {
        &self.0
    }

    /// Mix an item into the set.
    pub fn add(&mut self, item: &[u8]) -> Result<(), AppStateError> {
        let expanded = expand_item(item)?;
        self.pointwise(&expanded, u16::wrapping_add);
        Ok(())
    }

    /// Mix an item out of the set.
    pub fn remove(&mut self, item: &[u8]) -> Result<(), AppStateError> {
        let expanded = expand_item(item)?;
        self.pointwise(&expanded, u16::wrapping_sub);
        Ok(())
    }

    /// Remove every item of `subtract`, then add every item of `add`.
    pub fn subtract_then_add<A, B>(&mut self, subtract: &[A], add: &[B]) -> Result<(), AppStateError>
    where
        A: AsRef<[u8]>,
        B: AsRef<[u8]>,
    {
        for item in subtract {
            self.remove(item.as_ref())?;
        }
        for item in add {
            self.add(item.as_ref())?;
        }
        Ok(())
    }

    fn pointwise(&mut self, input: &[u8; LTHASH_SIZE], op: fn(u16, u16) -> u16) {
        for (lane, other) in self.0.chunks_exact_mut(2).zip(input.chunks_exact(2)) {
            let x = u16::from_le_bytes([lane[0], lane[1]]);
            let y = u16::from_le_bytes([other[0], other[1]]);
            lane.copy_from_slice(&op(x, y).to_le_bytes());
        }
    }
}

impl Default for LtHash {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for LtHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LtHash({}..)", hex::encode(&self.0[..8]))
    }
}

fn expand_item(item: &[u8]) -> Result<[u8; LTHASH_SIZE], AppStateError> {
    let hkdf = Hkdf::<Sha256>::new(None, item);
    let mut out = [0u8; LTHASH_SIZE];
    hkdf.expand(PATCH_INTEGRITY_INFO, &mut out)
        .map_err(|e| AppStateError::Crypto(e.to_string()))?;
    Ok(out)
}
