//! Store-backed patch processor.
//!
//! Binds the encoder and decoder to an [`AppStateStore`]: keys are fetched
//! from the store and expanded once per key ID, prior value MACs are read
//! from the store, and accumulator warnings are logged.

use std::sync::Arc;

use appstate_types::{PatchName, SyncdPatch};
use dashmap::DashMap;

use crate::builders::PatchInfo;
use crate::decode::{self, DecodedPatch};
use crate::encode::{self, EncodedPatch};
use crate::error::{AppStateError, HashWarning};
use crate::hash::HashState;
use crate::keys::ExpandedAppStateKeys;
use crate::store::AppStateStore;

/// Encodes and decodes patches against a store.
///
/// The processor does not persist anything itself; callers commit the
/// returned state and changes through [`AppStateStore::commit_patch`].
pub struct Processor<S> {
    store: Arc<S>,
    key_cache: DashMap<Vec<u8>, Arc<ExpandedAppStateKeys>>,
}

impl<S: AppStateStore> Processor<S> {
    /// Create a processor over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            key_cache: DashMap::new(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Expanded subkeys for a key ID, expanding and caching on first use.
    pub fn get_keys(&self, key_id: &[u8]) -> Result<Arc<ExpandedAppStateKeys>, AppStateError> {
        if let Some(keys) = self.key_cache.get(key_id) {
            return Ok(Arc::clone(keys.value()));
        }

        let root = self
            .store
            .get_app_state_key(key_id)?
            .ok_or_else(|| AppStateError::KeyNotFound {
                key_id: key_id.to_vec(),
            })?;
        let keys = Arc::new(ExpandedAppStateKeys::expand(&root)?);
        self.key_cache.insert(key_id.to_vec(), Arc::clone(&keys));
        tracing::debug!("Expanded app state key {}", hex::encode(key_id));
        Ok(keys)
    }

    /// Drop every cached expansion.
    pub fn clear_key_cache(&self) {
        self.key_cache.clear();
    }

    /// Encode a patch on top of `state`.
    pub fn encode_patch(
        &self,
        key_id: &[u8],
        state: HashState,
        info: &PatchInfo,
    ) -> Result<EncodedPatch, AppStateError> {
        let keys = self.get_keys(key_id)?;
        let name = info.patch_name;
        let encoded = encode::encode_patch(key_id, &keys, state, info, |index| {
            Ok(self.store.get_mutation_mac(name, index)?)
        })?;
        log_warnings(name, encoded.state.version, &encoded.warnings);
        Ok(encoded)
    }

    /// Decode and verify a patch on top of `state`.
    pub fn decode_patch(
        &self,
        name: PatchName,
        patch: &SyncdPatch,
        state: HashState,
    ) -> Result<DecodedPatch, AppStateError> {
        let decoded = decode::decode_patch(
            name,
            patch,
            state,
            |id| self.get_keys(id),
            |index| Ok(self.store.get_mutation_mac(name, index)?),
        )?;
        log_warnings(name, decoded.state.version, &decoded.warnings);
        Ok(decoded)
    }

    /// Decode and verify a serialized patch on top of `state`.
    pub fn decode_patch_bytes(
        &self,
        name: PatchName,
        bytes: &[u8],
        state: HashState,
    ) -> Result<DecodedPatch, AppStateError> {
        let patch = SyncdPatch::from_bytes(bytes)?;
        self.decode_patch(name, &patch, state)
    }

    /// Decode a run of consecutive patches on top of `state`.
    pub fn decode_patches(
        &self,
        name: PatchName,
        patches: &[SyncdPatch],
        state: HashState,
    ) -> Result<DecodedPatch, AppStateError> {
        let decoded = decode::decode_patches(
            name,
            patches,
            state,
            |id| self.get_keys(id),
            |index| Ok(self.store.get_mutation_mac(name, index)?),
        )?;
        log_warnings(name, decoded.state.version, &decoded.warnings);
        Ok(decoded)
    }
}

impl<S> std::fmt::Debug for Processor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("cached_keys", &self.key_cache.len())
            .finish_non_exhaustive()
    }
}

fn log_warnings(name: PatchName, version: u64, warnings: &[HashWarning]) {
    for warning in warnings {
        tracing::warn!("{} patch v{}: {}", name, version, warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::SyncAction;
    use crate::builders::{build_label_chat, build_mute, build_pin, MutationInfo};
    use crate::index::MutationIndex;
    use crate::keys::AppStateKey;
    use crate::store::{IndexChange, MemoryStore};
    use appstate_types::Jid;
    use std::time::Duration;

    const KEY_ID: &[u8] = b"\x00\x07";

    fn processor() -> Processor<MemoryStore> {
        let store = MemoryStore::new();
        store
            .insert_key(KEY_ID, AppStateKey::new(vec![0xA5; 32]))
            .unwrap();
        Processor::new(Arc::new(store))
    }

    fn commit(processor: &Processor<MemoryStore>, name: PatchName, state: &HashState, changes: &[IndexChange]) {
        processor.store().commit_patch(name, state, changes).unwrap();
    }

    // ===========================================
    // Key Cache
    // ===========================================

    #[test]
    fn keys_are_cached() {
        let processor = processor();
        let a = processor.get_keys(KEY_ID).unwrap();
        let b = processor.get_keys(KEY_ID).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        processor.clear_key_cache();
        let c = processor.get_keys(KEY_ID).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn missing_key_is_key_not_found() {
        let processor = processor();
        let err = processor.get_keys(b"missing").unwrap_err();
        assert!(matches!(err, AppStateError::KeyNotFound { .. }));

        let info = build_pin(&Jid::user("1"), true);
        assert!(matches!(
            processor.encode_patch(b"missing", HashState::new(), &info),
            Err(AppStateError::KeyNotFound { .. })
        ));
    }

    // ===========================================
    // Store-backed Flows
    // ===========================================

    #[test]
    fn encode_commit_decode_on_peer() {
        let sender = processor();
        let receiver = processor();
        let name = PatchName::Regular;

        let info = build_label_chat(&Jid::user("42"), "3", true);
        let encoded = sender.encode_patch(KEY_ID, HashState::new(), &info).unwrap();
        commit(&sender, name, &encoded.state, &encoded.changes);

        let decoded = receiver
            .decode_patch_bytes(name, &encoded.bytes, HashState::new())
            .unwrap();
        commit(&receiver, name, &decoded.state, &decoded.changes);

        assert_eq!(decoded.state, encoded.state);
        assert_eq!(
            receiver.store().get_hash_state(name).unwrap(),
            sender.store().get_hash_state(name).unwrap()
        );
        assert_eq!(receiver.store().entry_count(name).unwrap(), 1);
    }

    #[test]
    fn overwrite_uses_stored_prior() {
        let sender = processor();
        let receiver = processor();
        let name = PatchName::RegularHigh;
        let chat = Jid::user("8");

        let mut state = HashState::new();
        let mut receiver_state = HashState::new();
        for muted in [true, false, true] {
            let info = build_mute(&chat, muted, Duration::ZERO);
            let encoded = sender.encode_patch(KEY_ID, state, &info).unwrap();
            commit(&sender, name, &encoded.state, &encoded.changes);
            state = encoded.state;

            let decoded = receiver
                .decode_patch(name, &encoded.patch, receiver_state)
                .unwrap();
            commit(&receiver, name, &decoded.state, &decoded.changes);
            receiver_state = decoded.state;
            assert!(decoded.warnings.is_empty());
        }

        assert_eq!(state.version, 3);
        assert_eq!(receiver_state, state);
        assert_eq!(sender.store().entry_count(name).unwrap(), 1);
    }

    #[test]
    fn batch_decode_matches_sequential() {
        let sender = processor();
        let name = PatchName::RegularLow;
        let chat = Jid::user("12");

        let mut state = HashState::new();
        let mut patches = Vec::new();
        for info in [
            build_pin(&chat, true),
            build_pin(&chat, false),
            crate::builders::PatchInfo::new(
                name,
                vec![MutationInfo::remove(
                    MutationIndex::Pin { chat: chat.clone() },
                    SyncAction::Pin { pinned: false },
                )],
            ),
        ] {
            let encoded = sender.encode_patch(KEY_ID, state, &info).unwrap();
            commit(&sender, name, &encoded.state, &encoded.changes);
            state = encoded.state;
            patches.push(encoded.patch);
        }

        // The receiver has seen none of these; priors must come from the batch.
        let receiver = processor();
        let decoded = receiver
            .decode_patches(name, &patches, HashState::new())
            .unwrap();
        assert_eq!(decoded.state, state);
        assert_eq!(decoded.mutations.len(), 3);
        assert!(decoded.warnings.is_empty());
        assert_eq!(decoded.changes.len(), 3);
    }

    #[test]
    fn garbage_bytes_are_invalid() {
        let processor = processor();
        let err = processor
            .decode_patch_bytes(PatchName::Regular, &[0xFF, 0xFF, 0xFF], HashState::new())
            .unwrap_err();
        assert!(matches!(err, AppStateError::InvalidPatch(_)));
    }
}
