//! App-state key derivation.
//!
//! One root key per key ID is expanded with HKDF-SHA256 into the five
//! purpose-specific subkeys. The expansion is fixed by the protocol: every
//! linked device must derive bit-identical subkeys from the same root key.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::AppStateError;

/// Size of each expanded subkey in bytes.
pub const SUBKEY_SIZE: usize = 32;

/// HKDF info label for mutation key expansion.
const MUTATION_KEYS_INFO: &[u8] = b"WhatsApp Mutation Keys";

/// A root app-state key as handed out by the key store.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AppStateKey {
    data: Vec<u8>,
}

impl AppStateKey {
    /// Wrap raw root key bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

// Don't leak secret in debug output
impl std::fmt::Debug for AppStateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AppStateKey([REDACTED])")
    }
}

/// Subkeys expanded from an [`AppStateKey`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ExpandedAppStateKeys {
    index: [u8; SUBKEY_SIZE],
    value_encryption: [u8; SUBKEY_SIZE],
    value_mac: [u8; SUBKEY_SIZE],
    snapshot_mac: [u8; SUBKEY_SIZE],
    patch_mac: [u8; SUBKEY_SIZE],
}

impl ExpandedAppStateKeys {
    /// Expand a root key into its subkeys.
    ///
    /// HKDF-SHA256 without salt, info `"WhatsApp Mutation Keys"`, 160 bytes
    /// of output split in order into index, value encryption, value MAC,
    /// snapshot MAC and patch MAC keys.
    pub fn expand(root: &AppStateKey) -> Result<Self, AppStateError> {
        let hkdf = Hkdf::<Sha256>::new(None, root.as_bytes());
        let mut okm = [0u8; SUBKEY_SIZE * 5];
        hkdf.expand(MUTATION_KEYS_INFO, &mut okm)
            .map_err(|e| AppStateError::Crypto(e.to_string()))?;

        let mut keys = Self {
            index: [0u8; SUBKEY_SIZE],
            value_encryption: [0u8; SUBKEY_SIZE],
            value_mac: [0u8; SUBKEY_SIZE],
            snapshot_mac: [0u8; SUBKEY_SIZE],
            patch_mac: [0u8; SUBKEY_SIZE],
        };
        let mut chunks = okm.chunks_exact(SUBKEY_SIZE);
        for slot in [
            &mut keys.index,
            &mut keys.value_encryption,
            &mut keys.value_mac,
            &mut keys.snapshot_mac,
            &mut keys.patch_mac,
        ] {
            if let Some(chunk) = chunks.next() {
                slot.copy_from_slice(chunk);
            }
        }
        okm.zeroize();

        Ok(keys)
    }

    /// Key for index MACs.
    pub fn index(&self) -> &[u8; SUBKEY_SIZE] {
        &self.index
    }

    /// Key for AES-CBC value encryption.
    pub fn value_encryption(&self) -> &[u8; SUBKEY_SIZE] {
        &self.value_encryption
    }

    /// Key for content (value) MACs.
    pub fn value_mac(&self) -> &[u8; SUBKEY_SIZE] {
        &self.value_mac
    }

    /// Key for snapshot MACs.
    pub fn snapshot_mac(&self) -> &[u8; SUBKEY_SIZE] {
        &self.snapshot_mac
    }

    /// Key for patch MACs.
    pub fn patch_mac(&self) -> &[u8; SUBKEY_SIZE] {
        &self.patch_mac
    }
}

// Don't leak keys in debug output
impl std::fmt::Debug for ExpandedAppStateKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExpandedAppStateKeys {{ [REDACTED] }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(bytes: &[u8]) -> ExpandedAppStateKeys {
        ExpandedAppStateKeys::expand(&AppStateKey::new(bytes.to_vec())).unwrap()
    }

    #[test]
    fn expansion_is_deterministic() {
        let a = expand(&[0x42; 32]);
        let b = expand(&[0x42; 32]);

        assert_eq!(a.index(), b.index());
        assert_eq!(a.value_encryption(), b.value_encryption());
        assert_eq!(a.value_mac(), b.value_mac());
        assert_eq!(a.snapshot_mac(), b.snapshot_mac());
        assert_eq!(a.patch_mac(), b.patch_mac());
    }

    #[test]
    fn subkeys_are_consecutive_hkdf_output() {
        let root = [0x07; 32];
        let keys = expand(&root);

        let hkdf = Hkdf::<Sha256>::new(None, &root);
        let mut okm = [0u8; 160];
        hkdf.expand(b"WhatsApp Mutation Keys", &mut okm).unwrap();

        assert_eq!(keys.index(), &okm[0..32]);
        assert_eq!(keys.value_encryption(), &okm[32..64]);
        assert_eq!(keys.value_mac(), &okm[64..96]);
        assert_eq!(keys.snapshot_mac(), &okm[96..128]);
        assert_eq!(keys.patch_mac(), &okm[128..160]);
    }

    #[test]
    fn expansion_matches_known_vector() {
        let keys = expand(&[0x07; 32]);
        assert_eq!(
            hex::encode(keys.index()),
            "a3c20564c4744dc336223b76a374ac369fb1bc2062969b26bd0104cba5149e7a"
        );
        assert_eq!(
            hex::encode(keys.patch_mac()),
            "3b9efe15c717b5da8b85c45200bb6ce8af59c72d62f4c203909c53749b54cd04"
        );
    }

    #[test]
    fn subkeys_are_distinct() {
        let keys = expand(&[0x01; 32]);
        let all = [
            keys.index(),
            keys.value_encryption(),
            keys.value_mac(),
            keys.snapshot_mac(),
            keys.patch_mac(),
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn different_roots_differ() {
        let a = expand(&[0xAA; 32]);
        let b = expand(&[0xBB; 32]);
        assert_ne!(a.index(), b.index());
    }

    #[test]
    fn debug_is_redacted() {
        let root = AppStateKey::new(vec![0x99; 32]);
        assert!(format!("{:?}", root).contains("REDACTED"));
        let keys = ExpandedAppStateKeys::expand(&root).unwrap();
        assert!(format!("{:?}", keys).contains("REDACTED"));
    }
}
