//! Hash state and authentication tags.
//!
//! [`HashState`] is the per-category accumulator plus version counter. The
//! MAC helpers here produce and verify the four tags of the protocol:
//!
//! | Tag | Algorithm | Input |
//! |---|---|---|
//! | index MAC | HMAC-SHA256(index key) | JSON index bytes |
//! | value MAC | HMAC-SHA512(value MAC key), first 32 bytes | `op+1 ‖ keyID ‖ iv‖ciphertext ‖ u64be(len(keyID)+1)` |
//! | snapshot MAC | HMAC-SHA256(snapshot key) | `hash ‖ u64be(version) ‖ name` |
//! | patch MAC | HMAC-SHA256(patch key) | `snapshotMAC ‖ valueMACs… ‖ u64be(version) ‖ name` |

use appstate_types::{PatchName, SyncdMutation, SyncdOperation};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use crate::error::{AppStateError, HashWarning, MacKind};
use crate::keys::ExpandedAppStateKeys;
use crate::lthash::LtHash;

/// Size of every MAC tag carried on the wire.
pub const MAC_SIZE: usize = 32;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Version counter and accumulator of one app-state category.
///
/// Passed by value into every encode/decode and returned updated; the
/// caller persists it after each successful operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashState {
    /// Version of the last applied patch, 0 before any patch.
    pub version: u64,
    /// Aggregate over all live value MACs.
    pub hash: LtHash,
}

impl HashState {
    /// A fresh state: version 0, empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot MAC over this state for a category.
    pub fn snapshot_mac(
        &self,
        name: PatchName,
        keys: &ExpandedAppStateKeys,
    ) -> Result<[u8; MAC_SIZE], AppStateError> {
        finalize_256(self.snapshot_hmac(name, keys)?)
    }

    /// Verify a snapshot MAC in constant time.
    pub fn verify_snapshot_mac(
        &self,
        name: PatchName,
        keys: &ExpandedAppStateKeys,
        expected: &[u8],
    ) -> Result<(), AppStateError> {
        self.snapshot_hmac(name, keys)?
            .verify_slice(expected)
            .map_err(|_| AppStateError::MacMismatch {
                kind: MacKind::Snapshot,
            })
    }

    fn snapshot_hmac(
        &self,
        name: PatchName,
        keys: &ExpandedAppStateKeys,
    ) -> Result<HmacSha256, AppStateError> {
        hmac_sha256(
            keys.snapshot_mac(),
            &[
                self.hash.as_bytes(),
                &self.version.to_be_bytes(),
                name.as_str().as_bytes(),
            ],
        )
    }
}

/// The value MAC at the end of a value blob.
pub fn value_mac_of(blob: &[u8]) -> Result<&[u8], AppStateError> {
    blob.len()
        .checked_sub(MAC_SIZE)
        .map(|split| &blob[split..])
        .ok_or_else(|| {
            AppStateError::InvalidPatch(format!("value blob too short: {} bytes", blob.len()))
        })
}

/// Apply a patch's mutations to an accumulator.
///
/// For each mutation the value MAC previously stored at its index is looked
/// up, first among earlier mutations of the same patch, then through
/// `prior_mac`. A found prior is subtracted; a SET's new value MAC is added.
/// A REMOVE with no prior yields a [`HashWarning`] and no change, never an
/// error. All subtractions happen before all additions.
pub fn update_hash<F>(
    hash: &LtHash,
    mutations: &[SyncdMutation],
    mut prior_mac: F,
) -> Result<(LtHash, Vec<HashWarning>), AppStateError>
where
    F: FnMut(&[u8]) -> Result<Option<Vec<u8>>, AppStateError>,
{
    let mut added: Vec<&[u8]> = Vec::new();
    let mut removed: Vec<Vec<u8>> = Vec::new();
    let mut warnings = Vec::new();

    for (position, mutation) in mutations.iter().enumerate() {
        let operation = mutation.try_operation()?;
        let index_mac = mutation.index_mac();

        if operation == SyncdOperation::Set {
            added.push(value_mac_of(mutation.value_blob())?);
        }

        let prior = match prior_in_patch(&mutations[..position], index_mac)? {
            Some(earlier) => earlier.map(<[u8]>::to_vec),
            None => prior_mac(index_mac)?,
        };

        match prior {
            Some(mac) => removed.push(mac),
            None if operation == SyncdOperation::Remove => {
                warnings.push(HashWarning::MissingPriorEntry {
                    index_mac: index_mac.to_vec(),
                });
            }
            None => {}
        }
    }

    let mut next = *hash;
    next.subtract_then_add(&removed, &added)?;
    Ok((next, warnings))
}

/// Latest earlier mutation at the same index.
///
/// Outer `None`: no earlier mutation touched the index. Inner `None`: the
/// latest one was a REMOVE, so nothing is live there.
fn prior_in_patch<'a>(
    earlier: &'a [SyncdMutation],
    index_mac: &[u8],
) -> Result<Option<Option<&'a [u8]>>, AppStateError> {
    let Some(latest) = earlier.iter().rev().find(|m| m.index_mac() == index_mac) else {
        return Ok(None);
    };
    match latest.try_operation()? {
        SyncdOperation::Set => Ok(Some(Some(value_mac_of(latest.value_blob())?))),
        SyncdOperation::Remove => Ok(Some(None)),
    }
}

/// Index MAC over canonical index bytes.
pub fn index_mac(
    keys: &ExpandedAppStateKeys,
    index_bytes: &[u8],
) -> Result<[u8; MAC_SIZE], AppStateError> {
    finalize_256(hmac_sha256(keys.index(), &[index_bytes])?)
}

/// Verify an index MAC in constant time.
pub fn verify_index_mac(
    keys: &ExpandedAppStateKeys,
    index_bytes: &[u8],
    expected: &[u8],
    position: usize,
) -> Result<(), AppStateError> {
    hmac_sha256(keys.index(), &[index_bytes])?
        .verify_slice(expected)
        .map_err(|_| AppStateError::MacMismatch {
            kind: MacKind::Index { position },
        })
}

/// Content (value) MAC over an encrypted value.
pub fn content_mac(
    keys: &ExpandedAppStateKeys,
    operation: SyncdOperation,
    encrypted: &[u8],
    key_id: &[u8],
) -> Result<[u8; MAC_SIZE], AppStateError> {
    let tag = content_hmac(keys, operation, encrypted, key_id)?
        .finalize()
        .into_bytes();
    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(&tag[..MAC_SIZE]);
    Ok(out)
}

/// Verify a truncated content MAC in constant time.
pub fn verify_content_mac(
    keys: &ExpandedAppStateKeys,
    operation: SyncdOperation,
    encrypted: &[u8],
    key_id: &[u8],
    expected: &[u8],
    position: usize,
) -> Result<(), AppStateError> {
    let mismatch = AppStateError::MacMismatch {
        kind: MacKind::Content { position },
    };
    if expected.len() != MAC_SIZE {
        return Err(mismatch);
    }
    content_hmac(keys, operation, encrypted, key_id)?
        .verify_truncated_left(expected)
        .map_err(|_| mismatch)
}

fn content_hmac(
    keys: &ExpandedAppStateKeys,
    operation: SyncdOperation,
    encrypted: &[u8],
    key_id: &[u8],
) -> Result<HmacSha512, AppStateError> {
    let operation_byte = [operation as u8 + 1];
    let key_data_length = (key_id.len() as u64 + 1).to_be_bytes();
    let mut mac = <HmacSha512 as Mac>::new_from_slice(keys.value_mac())
        .map_err(|e| AppStateError::Crypto(e.to_string()))?;
    for part in [&operation_byte[..], key_id, encrypted, &key_data_length[..]] {
        mac.update(part);
    }
    Ok(mac)
}

/// Patch MAC over a patch's snapshot MAC and value MACs.
pub fn patch_mac(
    keys: &ExpandedAppStateKeys,
    name: PatchName,
    snapshot_mac: &[u8],
    mutations: &[SyncdMutation],
    version: u64,
) -> Result<[u8; MAC_SIZE], AppStateError> {
    finalize_256(patch_hmac(keys, name, snapshot_mac, mutations, version)?)
}

/// Verify a patch MAC in constant time.
pub fn verify_patch_mac(
    keys: &ExpandedAppStateKeys,
    name: PatchName,
    snapshot_mac: &[u8],
    mutations: &[SyncdMutation],
    version: u64,
    expected: &[u8],
) -> Result<(), AppStateError> {
    patch_hmac(keys, name, snapshot_mac, mutations, version)?
        .verify_slice(expected)
        .map_err(|_| AppStateError::MacMismatch {
            kind: MacKind::Patch,
        })
}

fn patch_hmac(
    keys: &ExpandedAppStateKeys,
    name: PatchName,
    snapshot_mac: &[u8],
    mutations: &[SyncdMutation],
    version: u64,
) -> Result<HmacSha256, AppStateError> {
    let mut mac = hmac_sha256(keys.patch_mac(), &[snapshot_mac])?;
    for mutation in mutations {
        mac.update(value_mac_of(mutation.value_blob())?);
    }
    mac.update(&version.to_be_bytes());
    mac.update(name.as_str().as_bytes());
    Ok(mac)
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<HmacSha256, AppStateError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| AppStateError::Crypto(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac)
}

fn finalize_256(mac: HmacSha256) -> Result<[u8; MAC_SIZE], AppStateError> {
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(&tag);
    Ok(out)
}
