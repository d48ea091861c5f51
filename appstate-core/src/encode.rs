//! Patch encoder.
//!
//! Turns a [`PatchInfo`] into a sealed [`SyncdPatch`]: each mutation's
//! content envelope is encrypted and MAC'd, the accumulator is advanced by
//! one version, and the snapshot and patch MACs are computed over the
//! result. Nothing is returned unless every step succeeds.

use std::time::SystemTime;

use appstate_types::proto::{KeyId, SyncActionData, SyncdVersion};
use appstate_types::{SyncdMutation, SyncdPatch};

use crate::builders::{unix_millis, MutationInfo, PatchInfo};
use crate::cipher;
use crate::error::{AppStateError, HashWarning};
use crate::hash::{self, update_hash, HashState};
use crate::keys::ExpandedAppStateKeys;
use crate::store::IndexChange;

/// Output of a successful encode.
#[derive(Debug, Clone)]
pub struct EncodedPatch {
    /// The sealed patch.
    pub patch: SyncdPatch,
    /// Its protobuf serialization, ready for the transport.
    pub bytes: Vec<u8>,
    /// Hash state after the patch, to be persisted.
    pub state: HashState,
    /// Index changes to persist alongside the state.
    pub changes: Vec<IndexChange>,
    /// Non-fatal accumulator warnings.
    pub warnings: Vec<HashWarning>,
}

/// Encode a patch on top of `state`.
///
/// `prior_mac` returns the value MAC currently live at an index MAC, if any.
/// The returned state has version `state.version + 1`.
pub fn encode_patch<F>(
    key_id: &[u8],
    keys: &ExpandedAppStateKeys,
    state: HashState,
    info: &PatchInfo,
    prior_mac: F,
) -> Result<EncodedPatch, AppStateError>
where
    F: FnMut(&[u8]) -> Result<Option<Vec<u8>>, AppStateError>,
{
    let name = info.patch_name;
    if info.mutations.is_empty() {
        return Err(AppStateError::EmptyPatch);
    }
    if let Some(stray) = info
        .mutations
        .iter()
        .find(|m| m.index.patch_name() != name)
    {
        return Err(AppStateError::WrongPatchType {
            index: stray.index.kind().to_string(),
            expected: stray.index.patch_name().to_string(),
            actual: name.to_string(),
        });
    }

    let timestamp = match info.timestamp.map(unix_millis) {
        Some(ms) if ms > 0 => ms,
        _ => unix_millis(SystemTime::now()),
    };

    let mutations = info
        .mutations
        .iter()
        .map(|m| encode_mutation(key_id, keys, m, timestamp))
        .collect::<Result<Vec<_>, _>>()?;

    let (hash, warnings) = update_hash(&state.hash, &mutations, prior_mac)?;
    let version = state
        .version
        .checked_add(1)
        .ok_or_else(|| AppStateError::InvalidPatch("version counter overflow".into()))?;
    let state = HashState { version, hash };

    let snapshot_mac = state.snapshot_mac(name, keys)?;
    let patch_mac = hash::patch_mac(keys, name, &snapshot_mac, &mutations, version)?;
    let changes = mutations
        .iter()
        .map(IndexChange::from_mutation)
        .collect::<Result<Vec<_>, _>>()?;

    let patch = SyncdPatch {
        version: Some(SyncdVersion {
            version: Some(version),
        }),
        mutations,
        snapshot_mac: Some(snapshot_mac.to_vec()),
        patch_mac: Some(patch_mac.to_vec()),
        key_id: Some(KeyId::from_bytes(key_id)),
        device_index: None,
    };
    let bytes = patch.to_bytes();

    tracing::debug!(
        "Encoded {} patch v{} ({} mutations, {} bytes)",
        name,
        version,
        patch.mutations.len(),
        bytes.len()
    );

    Ok(EncodedPatch {
        patch,
        bytes,
        state,
        changes,
        warnings,
    })
}

fn encode_mutation(
    key_id: &[u8],
    keys: &ExpandedAppStateKeys,
    info: &MutationInfo,
    timestamp: i64,
) -> Result<SyncdMutation, AppStateError> {
    let index = info
        .index
        .to_bytes()
        .map_err(|e| AppStateError::Serialization(e.to_string()))?;

    let data = SyncActionData {
        index: Some(index.clone()),
        value: Some(info.action.to_value(timestamp)),
        padding: Some(Vec::new()),
        version: Some(info.version),
    };

    let mut value = cipher::encrypt(keys.value_encryption(), &data.to_bytes())?;
    let value_mac = hash::content_mac(keys, info.operation, &value, key_id)?;
    value.extend_from_slice(&value_mac);

    let index_mac = hash::index_mac(keys, &index)?;
    Ok(SyncdMutation::new(
        info.operation,
        index_mac.to_vec(),
        value,
        key_id,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::SyncAction;
    use crate::builders::{build_mute, build_pin, build_setting_push_name};
    use crate::hash::{value_mac_of, MAC_SIZE};
    use crate::index::MutationIndex;
    use crate::keys::AppStateKey;
    use crate::lthash::LtHash;
    use appstate_types::{Jid, PatchName, SyncdOperation};
    use std::time::{Duration, UNIX_EPOCH};

    const KEY_ID: &[u8] = b"\x00\x00\x00\x01";

    fn keys() -> ExpandedAppStateKeys {
        ExpandedAppStateKeys::expand(&AppStateKey::new(vec![0x42; 32])).unwrap()
    }

    fn no_prior(_: &[u8]) -> Result<Option<Vec<u8>>, AppStateError> {
        Ok(None)
    }

    fn fixed_time() -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(1_700_000_000_123)
    }

    // ===========================================
    // Structure
    // ===========================================

    #[test]
    fn encoded_patch_is_sealed() {
        let keys = keys();
        let info = build_pin(&Jid::user("1"), true).with_timestamp(fixed_time());
        let encoded = encode_patch(KEY_ID, &keys, HashState::new(), &info, no_prior).unwrap();

        assert_eq!(encoded.state.version, 1);
        assert_eq!(encoded.patch.patch_version(), Some(1));
        assert_eq!(encoded.patch.key_id_bytes(), KEY_ID);
        assert_eq!(encoded.patch.mutations.len(), 1);
        assert_eq!(encoded.bytes, encoded.patch.to_bytes());

        let mutation = &encoded.patch.mutations[0];
        assert_eq!(mutation.try_operation().unwrap(), SyncdOperation::Set);
        assert_eq!(mutation.index_mac().len(), MAC_SIZE);
        assert_eq!(mutation.record_key_id(), KEY_ID);

        let snapshot = encoded.state.snapshot_mac(PatchName::RegularLow, &keys).unwrap();
        assert_eq!(encoded.patch.snapshot_mac.as_deref(), Some(&snapshot[..]));
        hash::verify_patch_mac(
            &keys,
            PatchName::RegularLow,
            &snapshot,
            &encoded.patch.mutations,
            1,
            encoded.patch.patch_mac.as_deref().unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn accumulator_holds_the_new_value_macs() {
        let info = build_pin(&Jid::user("1"), true);
        let encoded = encode_patch(KEY_ID, &keys(), HashState::new(), &info, no_prior).unwrap();

        let mut expected = LtHash::empty();
        expected
            .add(value_mac_of(encoded.patch.mutations[0].value_blob()).unwrap())
            .unwrap();
        assert_eq!(encoded.state.hash, expected);
        assert_eq!(encoded.changes.len(), 1);
        assert!(encoded.warnings.is_empty());
    }

    #[test]
    fn same_index_same_mac_different_ciphertext() {
        let keys = keys();
        let info = build_mute(&Jid::user("1"), true, Duration::ZERO).with_timestamp(fixed_time());
        let a = encode_patch(KEY_ID, &keys, HashState::new(), &info, no_prior).unwrap();
        let b = encode_patch(KEY_ID, &keys, HashState::new(), &info, no_prior).unwrap();

        let (ma, mb) = (&a.patch.mutations[0], &b.patch.mutations[0]);
        assert_eq!(ma.index_mac(), mb.index_mac());
        assert_ne!(ma.value_blob(), mb.value_blob());
        assert_ne!(
            value_mac_of(ma.value_blob()).unwrap(),
            value_mac_of(mb.value_blob()).unwrap()
        );
    }

    #[test]
    fn version_increments_once_per_patch() {
        let keys = keys();
        let mut state = HashState {
            version: 41,
            hash: LtHash::empty(),
        };
        for expected in 42..47 {
            let info = build_setting_push_name("n");
            state = encode_patch(KEY_ID, &keys, state, &info, no_prior)
                .unwrap()
                .state;
            assert_eq!(state.version, expected);
        }
    }

    // ===========================================
    // Rejections
    // ===========================================

    #[test]
    fn empty_patch_is_rejected() {
        let info = PatchInfo::new(PatchName::Regular, vec![]);
        let result = encode_patch(KEY_ID, &keys(), HashState::new(), &info, no_prior);
        assert!(matches!(result, Err(AppStateError::EmptyPatch)));
    }

    #[test]
    fn mixed_categories_are_rejected() {
        let mut info = build_pin(&Jid::user("1"), true);
        info.mutations.push(MutationInfo::set(
            MutationIndex::Mute {
                chat: Jid::user("1"),
            },
            SyncAction::Mute {
                muted: true,
                end_timestamp: None,
            },
        ));

        let err = encode_patch(KEY_ID, &keys(), HashState::new(), &info, no_prior).unwrap_err();
        match err {
            AppStateError::WrongPatchType {
                index,
                expected,
                actual,
            } => {
                assert_eq!(index, "mute");
                assert_eq!(expected, "regular_high");
                assert_eq!(actual, "regular_low");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failed_prior_lookup_aborts() {
        let info = build_pin(&Jid::user("1"), true);
        let result = encode_patch(KEY_ID, &keys(), HashState::new(), &info, |_| {
            Err(AppStateError::Crypto("store offline".into()))
        });
        assert!(result.is_err());
    }

    // ===========================================
    // REMOVE and priors
    // ===========================================

    #[test]
    fn remove_subtracts_the_prior_value_mac() {
        let keys = keys();
        let chat = Jid::user("1");
        let first = encode_patch(
            KEY_ID,
            &keys,
            HashState::new(),
            &build_pin(&chat, true),
            no_prior,
        )
        .unwrap();
        let IndexChange::Set {
            index_mac,
            value_mac,
        } = first.changes[0].clone()
        else {
            panic!("expected a SET change");
        };

        let info = PatchInfo::new(
            PatchName::RegularLow,
            vec![MutationInfo::remove(
                MutationIndex::Pin { chat },
                SyncAction::Pin { pinned: false },
            )],
        );
        let second = encode_patch(KEY_ID, &keys, first.state, &info, |index| {
            Ok((index == index_mac.as_slice()).then(|| value_mac.clone()))
        })
        .unwrap();

        assert_eq!(second.state.version, 2);
        assert_eq!(second.state.hash, LtHash::empty());
        assert_eq!(
            second.changes,
            vec![IndexChange::Remove {
                index_mac: index_mac.clone()
            }]
        );
    }

    #[test]
    fn remove_without_prior_is_a_warning() {
        let info = PatchInfo::new(
            PatchName::RegularLow,
            vec![MutationInfo::remove(
                MutationIndex::Pin {
                    chat: Jid::user("1"),
                },
                SyncAction::Pin { pinned: false },
            )],
        );
        let encoded = encode_patch(KEY_ID, &keys(), HashState::new(), &info, no_prior).unwrap();
        assert_eq!(encoded.state.hash, LtHash::empty());
        assert_eq!(encoded.warnings.len(), 1);
    }
}
