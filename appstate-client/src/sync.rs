//! AppStateSync - async orchestration of app-state patches.
//!
//! Every operation on a patch name runs under that name's lock for the
//! whole "load state → encode/decode → commit" sequence, so at most one
//! encode or decode per category is in flight.
//!
//! ```text
//! send:    lock → load → encode → commit → send (retried, same bytes)
//! receive: recv → lock → load → decode → commit → mutations
//! ```
//!
//! A patch is committed before it is sent. If the send fails afterwards the
//! local state stays advanced and the caller re-sends the same bytes with
//! [`AppStateSync::resend`]; encoding again would double-apply the update.

use std::sync::Arc;
use std::time::Duration;

use appstate_core::{
    AppStateError, AppStateStore, EncodedPatch, HashState, HashWarning, Mutation, PatchInfo,
    Processor, StoreError,
};
use appstate_types::{PatchName, SyncdPatch};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::SyncConfig;
use crate::transport::{PatchTransport, TransportError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Encoding or decoding failed.
    #[error("app state error: {0}")]
    AppState(#[from] AppStateError),

    /// Loading or committing state failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Receiving failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The local state is behind or ahead of the incoming patch.
    #[error("{name} needs a full resync: expected v{expected}, got v{actual}")]
    ResyncRequired {
        /// Category that diverged.
        name: PatchName,
        /// Version the next patch had to carry.
        expected: u64,
        /// Version the patch carried.
        actual: u64,
    },

    /// The patch was committed locally but every send attempt failed.
    ///
    /// `bytes` is the committed patch; pass it to
    /// [`AppStateSync::resend`] rather than encoding again.
    #[error("{name} patch v{version} committed but not sent after {attempts} attempts: {source}")]
    SendFailed {
        /// Category of the patch.
        name: PatchName,
        /// Version the patch advanced the local state to.
        version: u64,
        /// Serialized patch to re-send.
        bytes: Vec<u8>,
        /// Attempts made.
        attempts: u32,
        /// Last transport error.
        source: TransportError,
    },
}

impl ClientError {
    /// Whether the category must be fully resynchronized.
    pub fn requires_resync(&self) -> bool {
        match self {
            ClientError::ResyncRequired { .. } => true,
            ClientError::AppState(e) => e.requires_resync(),
            _ => false,
        }
    }

    fn from_decode(name: PatchName, err: AppStateError) -> Self {
        match err {
            AppStateError::VersionGap { expected, actual } => ClientError::ResyncRequired {
                name,
                expected,
                actual,
            },
            other => ClientError::AppState(other),
        }
    }
}

/// Result of applying an incoming patch.
#[derive(Debug, Clone)]
pub struct AppliedPatch {
    /// Category the patch belongs to.
    pub name: PatchName,
    /// Version the local state is now at.
    pub version: u64,
    /// Verified mutations, in patch order.
    pub mutations: Vec<Mutation>,
    /// Non-fatal accumulator warnings.
    pub warnings: Vec<HashWarning>,
    /// The patch was already applied; nothing changed.
    pub stale: bool,
}

impl AppliedPatch {
    fn unchanged(name: PatchName, version: u64) -> Self {
        Self {
            name,
            version,
            mutations: Vec::new(),
            warnings: Vec::new(),
            stale: true,
        }
    }
}

/// Sends and receives app-state patches for one device.
pub struct AppStateSync<S, T> {
    config: SyncConfig,
    processor: Processor<S>,
    transport: T,
    locks: [Mutex<()>; 5],
}

impl<S: AppStateStore, T: PatchTransport> AppStateSync<S, T> {
    /// Create a new orchestrator.
    pub fn new(config: SyncConfig, store: Arc<S>, transport: T) -> Self {
        Self {
            config,
            processor: Processor::new(store),
            transport,
            locks: Default::default(),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The processor (and through it, the store).
    pub fn processor(&self) -> &Processor<S> {
        &self.processor
    }

    /// Get the transport (for testing).
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current persisted state of a category.
    pub async fn hash_state(&self, name: PatchName) -> Result<HashState, ClientError> {
        let _guard = self.lock(name).lock().await;
        Ok(self.processor.store().get_hash_state(name)?)
    }

    /// Encode, commit and send a patch.
    ///
    /// Nothing is sent if the commit fails. If every send attempt fails the
    /// error is [`ClientError::SendFailed`] and the state stays committed.
    pub async fn send_patch(
        &self,
        key_id: &[u8],
        info: &PatchInfo,
    ) -> Result<EncodedPatch, ClientError> {
        let name = info.patch_name;
        // Held through the send so patches of one category leave in version order.
        let _guard = self.lock(name).lock().await;

        let state = self.processor.store().get_hash_state(name)?;
        let encoded = self.processor.encode_patch(key_id, state, info)?;
        self.processor
            .store()
            .commit_patch(name, &encoded.state, &encoded.changes)?;
        tracing::info!(
            "Committed {} patch v{} ({} mutations)",
            name,
            encoded.state.version,
            encoded.patch.mutations.len()
        );

        self.send_with_retry(name, encoded.state.version, &encoded.bytes)
            .await?;
        Ok(encoded)
    }

    /// Re-send an already committed patch.
    ///
    /// The bytes are sent unchanged; the local state is not touched.
    pub async fn resend(&self, name: PatchName, bytes: &[u8]) -> Result<(), ClientError> {
        let version = SyncdPatch::from_bytes(bytes)
            .map_err(AppStateError::from)?
            .patch_version()
            .unwrap_or_default();
        self.send_with_retry(name, version, bytes).await
    }

    /// Receive one patch from the transport and apply it.
    pub async fn receive_patch(&self) -> Result<AppliedPatch, ClientError> {
        let incoming = match self.config.recv_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.transport.recv_patch())
                .await
                .map_err(|_| TransportError::Timeout)??,
            None => self.transport.recv_patch().await?,
        };
        self.apply_patch(incoming.name, &incoming.bytes).await
    }

    /// Decode, verify and commit a serialized patch.
    ///
    /// A patch at or below the local version (a duplicate delivery, such as
    /// one re-sent after a send that did arrive) changes nothing and is
    /// returned with `stale` set.
    pub async fn apply_patch(
        &self,
        name: PatchName,
        bytes: &[u8],
    ) -> Result<AppliedPatch, ClientError> {
        let _guard = self.lock(name).lock().await;

        let state = self.processor.store().get_hash_state(name)?;
        let decoded = match self.processor.decode_patch_bytes(name, bytes, state) {
            Ok(decoded) => decoded,
            Err(AppStateError::StalePatch { current, actual }) => {
                tracing::debug!("Ignoring {} patch v{}: already at v{}", name, actual, current);
                return Ok(AppliedPatch::unchanged(name, current));
            }
            Err(e) => return Err(self.rejected(name, e)),
        };
        self.commit_applied(name, decoded)
    }

    /// Decode, verify and commit a run of consecutive serialized patches.
    ///
    /// Patches at or below the local version are skipped. All or nothing
    /// for the rest: if any patch fails, none is committed.
    pub async fn apply_patches(
        &self,
        name: PatchName,
        patches: &[Vec<u8>],
    ) -> Result<AppliedPatch, ClientError> {
        let patches = patches
            .iter()
            .map(|bytes| SyncdPatch::from_bytes(bytes))
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppStateError::from)?;

        let _guard = self.lock(name).lock().await;

        let state = self.processor.store().get_hash_state(name)?;
        let fresh: Vec<SyncdPatch> = patches
            .into_iter()
            .filter(|p| p.patch_version().map_or(true, |v| v > state.version))
            .collect();
        if fresh.is_empty() {
            tracing::debug!("Ignoring {} patches: already at v{}", name, state.version);
            return Ok(AppliedPatch::unchanged(name, state.version));
        }

        let decoded = self
            .processor
            .decode_patches(name, &fresh, state)
            .map_err(|e| self.rejected(name, e))?;
        self.commit_applied(name, decoded)
    }

    fn commit_applied(
        &self,
        name: PatchName,
        decoded: appstate_core::DecodedPatch,
    ) -> Result<AppliedPatch, ClientError> {
        self.processor
            .store()
            .commit_patch(name, &decoded.state, &decoded.changes)?;
        tracing::info!(
            "Applied {} patch v{} ({} mutations)",
            name,
            decoded.state.version,
            decoded.mutations.len()
        );
        Ok(AppliedPatch {
            name,
            version: decoded.state.version,
            mutations: decoded.mutations,
            warnings: decoded.warnings,
            stale: false,
        })
    }

    fn rejected(&self, name: PatchName, err: AppStateError) -> ClientError {
        if err.requires_resync() {
            tracing::warn!("{} diverged from the incoming patch: {}", name, err);
        } else {
            tracing::error!("Rejected {} patch: {}", name, err);
        }
        ClientError::from_decode(name, err)
    }

    async fn send_with_retry(
        &self,
        name: PatchName,
        version: u64,
        bytes: &[u8],
    ) -> Result<(), ClientError> {
        let attempts = self.config.attempts();
        let mut attempt = 1;
        loop {
            match self.transport.send_patch(name, bytes).await {
                Ok(()) => {
                    tracing::debug!("Sent {} patch v{} (attempt {})", name, version, attempt);
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        "Send of {} patch v{} failed (attempt {}/{}): {}",
                        name,
                        version,
                        attempt,
                        attempts,
                        e
                    );
                    attempt += 1;
                    sleep(self.config.retry_backoff()).await;
                }
                Err(e) => {
                    tracing::error!(
                        "Giving up on {} patch v{} after {} attempts: {}",
                        name,
                        version,
                        attempts,
                        e
                    );
                    return Err(ClientError::SendFailed {
                        name,
                        version,
                        bytes: bytes.to_vec(),
                        attempts,
                        source: e,
                    });
                }
            }
        }
    }

    fn lock(&self, name: PatchName) -> &Mutex<()> {
        &self.locks[name as usize]
    }
}

impl<S, T> std::fmt::Debug for AppStateSync<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppStateSync")
            .field("config", &self.config)
            .field("processor", &self.processor)
            .finish_non_exhaustive()
    }
}

async fn sleep(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
