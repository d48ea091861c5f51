//! Store collaborator.
//!
//! The engine reads keys, prior value MACs and hash states through
//! [`AppStateStore`], and hands back one atomic commit per accepted patch.
//! [`MemoryStore`] keeps everything in memory for tests and ephemeral
//! clients.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use appstate_types::{PatchName, SyncdMutation, SyncdOperation};

use crate::error::{AppStateError, StoreError};
use crate::hash::{value_mac_of, HashState};
use crate::keys::AppStateKey;

/// One change to the index MAC → value MAC mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexChange {
    /// The index now holds this value MAC.
    Set {
        /// Index MAC.
        index_mac: Vec<u8>,
        /// Value MAC now live at the index.
        value_mac: Vec<u8>,
    },
    /// Nothing is live at the index anymore.
    Remove {
        /// Index MAC.
        index_mac: Vec<u8>,
    },
}

impl IndexChange {
    /// The change a wire mutation makes to the mapping.
    pub fn from_mutation(mutation: &SyncdMutation) -> Result<Self, AppStateError> {
        let index_mac = mutation.index_mac().to_vec();
        Ok(match mutation.try_operation()? {
            SyncdOperation::Set => IndexChange::Set {
                index_mac,
                value_mac: value_mac_of(mutation.value_blob())?.to_vec(),
            },
            SyncdOperation::Remove => IndexChange::Remove { index_mac },
        })
    }

    /// Index MAC the change applies to.
    pub fn index_mac(&self) -> &[u8] {
        match self {
            IndexChange::Set { index_mac, .. } | IndexChange::Remove { index_mac } => index_mac,
        }
    }
}

/// Persistence capabilities the engine depends on.
///
/// Calls may block; callers serialize operations per patch name.
pub trait AppStateStore: Send + Sync {
    /// Root key for a key ID, `None` if unknown.
    fn get_app_state_key(&self, key_id: &[u8]) -> Result<Option<AppStateKey>, StoreError>;

    /// Value MAC live at an index, `None` if nothing is.
    fn get_mutation_mac(
        &self,
        name: PatchName,
        index_mac: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// Current hash state of a category, fresh if never synced.
    fn get_hash_state(&self, name: PatchName) -> Result<HashState, StoreError>;

    /// Persist a new hash state together with its index changes.
    ///
    /// Must be atomic: either the state and every change are stored, or
    /// nothing is.
    fn commit_patch(
        &self,
        name: PatchName,
        state: &HashState,
        changes: &[IndexChange],
    ) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryStoreInner {
    keys: HashMap<Vec<u8>, AppStateKey>,
    states: HashMap<PatchName, HashState>,
    macs: HashMap<(PatchName, Vec<u8>), Vec<u8>>,
}

/// In-memory [`AppStateStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root key under a key ID.
    pub fn insert_key(&self, key_id: &[u8], key: AppStateKey) -> Result<(), StoreError> {
        self.lock()?.keys.insert(key_id.to_vec(), key);
        Ok(())
    }

    /// Number of live index entries of a category.
    pub fn entry_count(&self, name: PatchName) -> Result<usize, StoreError> {
        Ok(self.lock()?.macs.keys().filter(|(n, _)| *n == name).count())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStoreInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl AppStateStore for MemoryStore {
    fn get_app_state_key(&self, key_id: &[u8]) -> Result<Option<AppStateKey>, StoreError> {
        Ok(self.lock()?.keys.get(key_id).cloned())
    }

    fn get_mutation_mac(
        &self,
        name: PatchName,
        index_mac: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock()?.macs.get(&(name, index_mac.to_vec())).cloned())
    }

    fn get_hash_state(&self, name: PatchName) -> Result<HashState, StoreError> {
        Ok(self.lock()?.states.get(&name).copied().unwrap_or_default())
    }

    fn commit_patch(
        &self,
        name: PatchName,
        state: &HashState,
        changes: &[IndexChange],
    ) -> Result<(), StoreError> {
        // Single guard for the whole commit keeps it atomic.
        let mut inner = self.lock()?;
        inner.states.insert(name, *state);
        for change in changes {
            match change {
                IndexChange::Set {
                    index_mac,
                    value_mac,
                } => {
                    inner
                        .macs
                        .insert((name, index_mac.clone()), value_mac.clone());
                }
                IndexChange::Remove { index_mac } => {
                    inner.macs.remove(&(name, index_mac.clone()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lthash::LtHash;

    #[test]
    fn unknown_key_is_none() {
        let store = MemoryStore::new();
        assert!(store.get_app_state_key(b"nope").unwrap().is_none());

        store
            .insert_key(b"k1", AppStateKey::new(vec![1u8; 32]))
            .unwrap();
        let key = store.get_app_state_key(b"k1").unwrap().unwrap();
        assert_eq!(key.as_bytes(), &[1u8; 32]);
    }

    #[test]
    fn fresh_state_is_version_zero() {
        let store = MemoryStore::new();
        let state = store.get_hash_state(PatchName::Regular).unwrap();
        assert_eq!(state, HashState::new());
    }

    #[test]
    fn commit_applies_state_and_changes() {
        let store = MemoryStore::new();
        let mut hash = LtHash::empty();
        hash.add(b"value").unwrap();
        let state = HashState { version: 3, hash };

        store
            .commit_patch(
                PatchName::RegularHigh,
                &state,
                &[
                    IndexChange::Set {
                        index_mac: b"idx-a".to_vec(),
                        value_mac: b"mac-a".to_vec(),
                    },
                    IndexChange::Set {
                        index_mac: b"idx-b".to_vec(),
                        value_mac: b"mac-b".to_vec(),
                    },
                    IndexChange::Remove {
                        index_mac: b"idx-a".to_vec(),
                    },
                ],
            )
            .unwrap();

        assert_eq!(store.get_hash_state(PatchName::RegularHigh).unwrap(), state);
        assert_eq!(
            store.get_hash_state(PatchName::Regular).unwrap(),
            HashState::new()
        );
        assert!(store
            .get_mutation_mac(PatchName::RegularHigh, b"idx-a")
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .get_mutation_mac(PatchName::RegularHigh, b"idx-b")
                .unwrap(),
            Some(b"mac-b".to_vec())
        );
        assert_eq!(store.entry_count(PatchName::RegularHigh).unwrap(), 1);
    }

    #[test]
    fn entries_are_partitioned_by_patch_name() {
        let store = MemoryStore::new();
        store
            .commit_patch(
                PatchName::Regular,
                &HashState::new(),
                &[IndexChange::Set {
                    index_mac: b"idx".to_vec(),
                    value_mac: b"mac".to_vec(),
                }],
            )
            .unwrap();

        assert!(store
            .get_mutation_mac(PatchName::RegularLow, b"idx")
            .unwrap()
            .is_none());
    }

    #[test]
    fn change_from_mutation() {
        let mut blob = vec![0u8; 16];
        blob.extend_from_slice(&[9u8; 32]);
        let set = SyncdMutation::new(SyncdOperation::Set, b"idx".to_vec(), blob.clone(), b"k");
        assert_eq!(
            IndexChange::from_mutation(&set).unwrap(),
            IndexChange::Set {
                index_mac: b"idx".to_vec(),
                value_mac: vec![9u8; 32]
            }
        );

        let remove = SyncdMutation::new(SyncdOperation::Remove, b"idx".to_vec(), blob, b"k");
        let change = IndexChange::from_mutation(&remove).unwrap();
        assert_eq!(change.index_mac(), b"idx");
        assert!(matches!(change, IndexChange::Remove { .. }));
    }
}
