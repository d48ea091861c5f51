//! Patch decoder and validator.
//!
//! Checks run in a fixed order: version succession, patch MAC, accumulator
//! update and snapshot MAC, then per mutation the content MAC, decryption
//! and index MAC. Any failure rejects the whole patch.
//!
//! The operation and record key ID of a mutation are inputs to its content
//! MAC, so an unreadable operation or an unknown record key is reported as
//! a content MAC mismatch.

use std::collections::HashMap;
use std::sync::Arc;

use appstate_types::proto::SyncActionData;
use appstate_types::{PatchName, SyncdMutation, SyncdOperation, SyncdPatch};

use crate::action::SyncAction;
use crate::cipher;
use crate::error::{AppStateError, HashWarning, MacKind};
use crate::hash::{self, update_hash, HashState, MAC_SIZE};
use crate::index::{decode_parts, IndexError, MutationIndex};
use crate::keys::ExpandedAppStateKeys;
use crate::store::IndexChange;

/// A decrypted, verified mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// SET or REMOVE.
    pub operation: SyncdOperation,
    /// The action, `None` for kinds this crate does not model.
    pub action: Option<SyncAction>,
    /// Action timestamp, epoch milliseconds.
    pub timestamp: i64,
    /// Schema version of the mutation kind.
    pub version: i32,
    /// Raw index parts.
    pub index: Vec<String>,
    /// Index MAC.
    pub index_mac: Vec<u8>,
    /// Value MAC.
    pub value_mac: Vec<u8>,
}

impl Mutation {
    /// Parse the raw index into its typed shape.
    pub fn parsed_index(&self) -> Result<MutationIndex, IndexError> {
        MutationIndex::from_parts(&self.index)
    }
}

/// Output of a successful decode.
#[derive(Debug, Clone, Default)]
pub struct DecodedPatch {
    /// Verified mutations in patch order.
    pub mutations: Vec<Mutation>,
    /// Hash state after the patch, to be persisted.
    pub state: HashState,
    /// Index changes to persist alongside the state.
    pub changes: Vec<IndexChange>,
    /// Non-fatal accumulator warnings.
    pub warnings: Vec<HashWarning>,
}

/// Decode and verify one patch on top of `state`.
///
/// `keys` resolves a key ID to its expanded subkeys. `prior_mac` returns the
/// value MAC currently live at an index MAC, if any.
pub fn decode_patch<K, F>(
    name: PatchName,
    patch: &SyncdPatch,
    state: HashState,
    mut keys: K,
    prior_mac: F,
) -> Result<DecodedPatch, AppStateError>
where
    K: FnMut(&[u8]) -> Result<Arc<ExpandedAppStateKeys>, AppStateError>,
    F: FnMut(&[u8]) -> Result<Option<Vec<u8>>, AppStateError>,
{
    let expected = state
        .version
        .checked_add(1)
        .ok_or_else(|| AppStateError::InvalidPatch("version counter overflow".into()))?;
    let actual = patch
        .patch_version()
        .ok_or_else(|| AppStateError::InvalidPatch("patch has no version".into()))?;
    if actual <= state.version {
        return Err(AppStateError::StalePatch {
            current: state.version,
            actual,
        });
    }
    if actual != expected {
        return Err(AppStateError::VersionGap { expected, actual });
    }

    let patch_keys = keys(patch.key_id_bytes())?;
    let snapshot_mac = patch.snapshot_mac.as_deref().unwrap_or_default();
    hash::verify_patch_mac(
        &patch_keys,
        name,
        snapshot_mac,
        &patch.mutations,
        actual,
        patch.patch_mac.as_deref().unwrap_or_default(),
    )?;

    for (position, mutation) in patch.mutations.iter().enumerate() {
        if mutation.try_operation().is_err() {
            return Err(content_mismatch(position));
        }
    }

    let (hash, warnings) = update_hash(&state.hash, &patch.mutations, prior_mac)?;
    let state = HashState {
        version: actual,
        hash,
    };
    state.verify_snapshot_mac(name, &patch_keys, snapshot_mac)?;

    let mut mutations = Vec::with_capacity(patch.mutations.len());
    let mut changes = Vec::with_capacity(patch.mutations.len());
    for (position, mutation) in patch.mutations.iter().enumerate() {
        let record_keys = match mutation.record_key_id() {
            id if id.is_empty() || id == patch.key_id_bytes() => Arc::clone(&patch_keys),
            id => match keys(id) {
                Err(AppStateError::KeyNotFound { .. }) => return Err(content_mismatch(position)),
                other => other?,
            },
        };
        mutations.push(decode_mutation(&record_keys, mutation, position)?);
        changes.push(IndexChange::from_mutation(mutation)?);
    }

    tracing::debug!(
        "Decoded {} patch v{} ({} mutations)",
        name,
        actual,
        mutations.len()
    );

    Ok(DecodedPatch {
        mutations,
        state,
        changes,
        warnings,
    })
}

/// Decode a run of consecutive patches.
///
/// Each patch must succeed the previous one. Index changes of earlier
/// patches in the run are visible as priors to later ones before the store
/// is consulted.
pub fn decode_patches<K, F>(
    name: PatchName,
    patches: &[SyncdPatch],
    state: HashState,
    mut keys: K,
    mut prior_mac: F,
) -> Result<DecodedPatch, AppStateError>
where
    K: FnMut(&[u8]) -> Result<Arc<ExpandedAppStateKeys>, AppStateError>,
    F: FnMut(&[u8]) -> Result<Option<Vec<u8>>, AppStateError>,
{
    let mut pending: HashMap<Vec<u8>, Option<Vec<u8>>> = HashMap::new();
    let mut out = DecodedPatch {
        state,
        ..Default::default()
    };

    for patch in patches {
        let decoded = decode_patch(name, patch, out.state, &mut keys, |index: &[u8]| {
            match pending.get(index) {
                Some(live) => Ok(live.clone()),
                None => prior_mac(index),
            }
        })?;

        for change in &decoded.changes {
            let live = match change {
                IndexChange::Set { value_mac, .. } => Some(value_mac.clone()),
                IndexChange::Remove { .. } => None,
            };
            pending.insert(change.index_mac().to_vec(), live);
        }

        out.state = decoded.state;
        out.mutations.extend(decoded.mutations);
        out.changes.extend(decoded.changes);
        out.warnings.extend(decoded.warnings);
    }

    Ok(out)
}

fn content_mismatch(position: usize) -> AppStateError {
    AppStateError::MacMismatch {
        kind: MacKind::Content { position },
    }
}

fn decode_mutation(
    keys: &ExpandedAppStateKeys,
    mutation: &SyncdMutation,
    position: usize,
) -> Result<Mutation, AppStateError> {
    let operation = mutation.try_operation()?;
    let blob = mutation.value_blob();
    let split = blob.len().checked_sub(MAC_SIZE).ok_or_else(|| {
        AppStateError::InvalidPatch(format!(
            "mutation #{position}: value blob too short ({} bytes)",
            blob.len()
        ))
    })?;
    let (content, value_mac) = blob.split_at(split);

    hash::verify_content_mac(
        keys,
        operation,
        content,
        mutation.record_key_id(),
        value_mac,
        position,
    )?;

    let plaintext = cipher::decrypt(keys.value_encryption(), content)?;
    let data = SyncActionData::from_bytes(&plaintext)
        .map_err(|e| AppStateError::Serialization(format!("mutation #{position}: {e}")))?;

    let index_bytes = data.index.as_deref().unwrap_or_default();
    hash::verify_index_mac(keys, index_bytes, mutation.index_mac(), position)?;
    let index = decode_parts(index_bytes)
        .map_err(|e| AppStateError::Serialization(format!("mutation #{position}: {e}")))?;

    Ok(Mutation {
        operation,
        action: data.value.as_ref().and_then(SyncAction::from_value),
        timestamp: data
            .value
            .as_ref()
            .and_then(|v| v.timestamp)
            .unwrap_or_default(),
        version: data.version.unwrap_or_default(),
        index,
        index_mac: mutation.index_mac().to_vec(),
        value_mac: value_mac.to_vec(),
    })
}
