//! Error types for app-state patch processing.

use std::fmt;

use appstate_types::TypesError;
use thiserror::Error;

/// Which authentication tag failed to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacKind {
    /// The patch MAC over the snapshot MAC and value MACs.
    Patch,
    /// The snapshot MAC over the recomputed accumulator.
    Snapshot,
    /// The content MAC of the mutation at this position.
    Content {
        /// Position of the mutation inside its patch.
        position: usize,
    },
    /// The index MAC of the mutation at this position.
    Index {
        /// Position of the mutation inside its patch.
        position: usize,
    },
}

impl fmt::Display for MacKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacKind::Patch => f.write_str("patch"),
            MacKind::Snapshot => f.write_str("snapshot"),
            MacKind::Content { position } => write!(f, "content (mutation #{position})"),
            MacKind::Index { position } => write!(f, "index (mutation #{position})"),
        }
    }
}

/// Errors that abort an encode or decode.
///
/// Every variant is fatal for the whole patch; nothing is partially applied.
#[derive(Debug, Error)]
pub enum AppStateError {
    /// The app-state key is not in the key store.
    #[error("app state key {} not found", hex::encode(.key_id))]
    KeyNotFound {
        /// The requested key ID.
        key_id: Vec<u8>,
    },

    /// Serializing or parsing an index or envelope failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Value encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Value decryption failed (bad padding or truncated ciphertext).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// An authentication tag did not verify.
    #[error("{kind} MAC mismatch")]
    MacMismatch {
        /// Which tag failed.
        kind: MacKind,
    },

    /// The patch is not the direct successor of the local state.
    ///
    /// The local state has diverged and needs a full resync.
    #[error("version gap: expected v{expected}, got v{actual}")]
    VersionGap {
        /// The version the next patch must have.
        expected: u64,
        /// The version the patch carries.
        actual: u64,
    },

    /// The patch is at or below the local version: a duplicate or replay.
    ///
    /// Nothing needs to be applied and no resync is needed.
    #[error("stale patch: local state is at v{current}, got v{actual}")]
    StalePatch {
        /// Version of the local state.
        current: u64,
        /// Version the patch carries.
        actual: u64,
    },

    /// A patch must contain at least one mutation.
    #[error("patch has no mutations")]
    EmptyPatch,

    /// A mutation's index belongs to a different app-state category.
    #[error("mutation {index} belongs to {expected}, not {actual}")]
    WrongPatchType {
        /// Index kind of the offending mutation.
        index: String,
        /// Category the index belongs to.
        expected: String,
        /// Category of the patch.
        actual: String,
    },

    /// The patch is structurally malformed.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// A hashing or key-expansion primitive failed.
    #[error("crypto primitive failed: {0}")]
    Crypto(String),

    /// A store collaborator failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<TypesError> for AppStateError {
    fn from(err: TypesError) -> Self {
        AppStateError::InvalidPatch(err.to_string())
    }
}

impl AppStateError {
    /// Whether this error means the local state must be fully resynchronized.
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            AppStateError::VersionGap { .. }
                | AppStateError::MacMismatch {
                    kind: MacKind::Snapshot
                }
        )
    }
}

/// Errors reported by a store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store failed.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Non-fatal conditions met while updating the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashWarning {
    /// A REMOVE pointed at an index with no known prior value.
    MissingPriorEntry {
        /// The index MAC that had no prior value MAC.
        index_mac: Vec<u8>,
    },
}

impl fmt::Display for HashWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashWarning::MissingPriorEntry { index_mac } => write!(
                f,
                "missing value MAC of previous SET operation for {}",
                hex::encode_upper(index_mac)
            ),
        }
    }
}
