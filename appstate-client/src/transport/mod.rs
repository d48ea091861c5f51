//! Transport abstraction for patch exchange.
//!
//! The engine only needs to push sealed patch bytes out and pull incoming
//! ones in; framing, connection management and server acknowledgements are
//! the transport's concern.
//!
//! # Example
//!
//! ```ignore
//! let (alice, bob) = MockTransport::linked_pair();
//! alice.send_patch(PatchName::Regular, &bytes).await?;
//! let incoming = bob.recv_patch().await?;
//! ```

mod mock;

pub use mock::MockTransport;

use appstate_types::PatchName;
use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Nothing arrived within the receive timeout.
    #[error("receive timeout")]
    Timeout,
}

/// A patch received from the server or a peer.
#[derive(Clone, PartialEq, Eq)]
pub struct IncomingPatch {
    /// Category the patch belongs to.
    pub name: PatchName,
    /// Serialized `SyncdPatch`.
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for IncomingPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingPatch")
            .field("name", &self.name)
            .field("bytes", &format!("[{} bytes]", self.bytes.len()))
            .finish()
    }
}

/// Carries sealed patches to and from other devices.
#[async_trait]
pub trait PatchTransport: Send + Sync {
    /// Send a serialized patch of the given category.
    ///
    /// Sending the same bytes twice must be harmless.
    async fn send_patch(&self, name: PatchName, bytes: &[u8]) -> Result<(), TransportError>;

    /// Receive the next incoming patch.
    ///
    /// Waits until one is available or the transport closes.
    async fn recv_patch(&self) -> Result<IncomingPatch, TransportError>;
}
