//! Mock transport for testing.
//!
//! Queues incoming patches, records sent ones and can be told to fail.
//! Two mocks can be linked so that each one's sends land in the other's
//! inbox.

use super::{IncomingPatch, PatchTransport, TransportError};
use appstate_types::PatchName;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, Notify};

/// Mock transport for testing.
///
/// Clones share state.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<MockTransportInner>,
    arrived: Notify,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    closed: bool,
    sent: Vec<IncomingPatch>,
    inbox: VecDeque<IncomingPatch>,
    send_failures: usize,
    send_failure_reason: String,
    fail_next_recv: Option<String>,
    peer: Option<Weak<Shared>>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Two transports whose sends are delivered to each other.
    pub fn linked_pair() -> (Self, Self) {
        let a = Self::new();
        let b = Self::new();
        // Fresh mutexes: try_lock cannot contend here.
        if let (Ok(mut ia), Ok(mut ib)) = (a.shared.inner.try_lock(), b.shared.inner.try_lock()) {
            ia.peer = Some(Arc::downgrade(&b.shared));
            ib.peer = Some(Arc::downgrade(&a.shared));
        }
        (a, b)
    }

    /// Queue a patch to be returned by a later `recv_patch()`.
    pub async fn queue_patch(&self, name: PatchName, bytes: Vec<u8>) {
        self.shared
            .inner
            .lock()
            .await
            .inbox
            .push_back(IncomingPatch { name, bytes });
        self.shared.arrived.notify_one();
    }

    /// Every patch sent successfully, in order.
    pub async fn sent_patches(&self) -> Vec<IncomingPatch> {
        self.shared.inner.lock().await.sent.clone()
    }

    /// The last patch sent successfully.
    pub async fn last_sent(&self) -> Option<IncomingPatch> {
        self.shared.inner.lock().await.sent.last().cloned()
    }

    /// Number of patches waiting to be received.
    pub async fn pending(&self) -> usize {
        self.shared.inner.lock().await.inbox.len()
    }

    /// Drop every patch waiting to be received.
    pub async fn drain_inbox(&self) -> Vec<IncomingPatch> {
        self.shared.inner.lock().await.inbox.drain(..).collect()
    }

    /// Cause the next send to fail with the given error.
    pub async fn fail_next_send(&self, error: &str) {
        self.fail_sends(1, error).await;
    }

    /// Cause the next `count` sends to fail with the given error.
    pub async fn fail_sends(&self, count: usize, error: &str) {
        let mut inner = self.shared.inner.lock().await;
        inner.send_failures = count;
        inner.send_failure_reason = error.to_string();
    }

    /// Cause the next receive to fail with the given error.
    pub async fn fail_next_recv(&self, error: &str) {
        self.shared.inner.lock().await.fail_next_recv = Some(error.to_string());
    }

    /// Close the transport; pending receivers return `ConnectionClosed`
    /// once the inbox is empty.
    pub async fn close(&self) {
        self.shared.inner.lock().await.closed = true;
        self.shared.arrived.notify_waiters();
    }

    /// Clear all state except the link to a peer.
    pub async fn reset(&self) {
        let mut inner = self.shared.inner.lock().await;
        let peer = inner.peer.take();
        *inner = MockTransportInner {
            peer,
            ..Default::default()
        };
    }
}

#[async_trait]
impl PatchTransport for MockTransport {
    async fn send_patch(&self, name: PatchName, bytes: &[u8]) -> Result<(), TransportError> {
        let patch = IncomingPatch {
            name,
            bytes: bytes.to_vec(),
        };

        let peer = {
            let mut inner = self.shared.inner.lock().await;
            if inner.closed {
                return Err(TransportError::ConnectionClosed);
            }

            // Check for forced failure
            if inner.send_failures > 0 {
                inner.send_failures -= 1;
                return Err(TransportError::SendFailed(inner.send_failure_reason.clone()));
            }

            inner.sent.push(patch.clone());
            inner.peer.as_ref().and_then(Weak::upgrade)
        };

        if let Some(peer) = peer {
            peer.inner.lock().await.inbox.push_back(patch);
            peer.arrived.notify_one();
        }
        Ok(())
    }

    async fn recv_patch(&self) -> Result<IncomingPatch, TransportError> {
        loop {
            let arrived = self.shared.arrived.notified();
            {
                let mut inner = self.shared.inner.lock().await;

                // Check for forced failure
                if let Some(error) = inner.fail_next_recv.take() {
                    return Err(TransportError::ReceiveFailed(error));
                }
                if let Some(patch) = inner.inbox.pop_front() {
                    return Ok(patch);
                }
                if inner.closed {
                    return Err(TransportError::ConnectionClosed);
                }
            }
            arrived.await;
        }
    }
}
