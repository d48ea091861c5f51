//! # appstate-client
//!
//! Async orchestration of app-state sync for one device.
//!
//! This is the layer applications use: it wraps the pure `appstate-core`
//! pipeline with per-category locking, atomic persistence and a pluggable
//! transport.
//!
//! ## Features
//!
//! - **Serialized categories**: one encode or decode per patch name at a time
//! - **Commit before send**: a patch is persisted before it leaves the device
//! - **Idempotent retry**: failed sends are retried with the same bytes
//! - **Transport abstraction**: pluggable transport layer (mock included)
//!
//! ## Example
//!
//! ```ignore
//! use appstate_client::{AppStateSync, MockTransport, SyncConfig};
//! use appstate_core::{build_pin, MemoryStore};
//!
//! let sync = AppStateSync::new(SyncConfig::default(), Arc::new(MemoryStore::new()), MockTransport::new());
//! sync.send_patch(&key_id, &build_pin(&chat, true)).await?;
//! let applied = sync.receive_patch().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod sync;
pub mod transport;

pub use config::{ConfigError, SyncConfig};
pub use sync::{AppStateSync, AppliedPatch, ClientError};
pub use transport::{IncomingPatch, MockTransport, PatchTransport, TransportError};
