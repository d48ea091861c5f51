//! # appstate-core
//!
//! Pure app-state patch logic (no async, no network).
//!
//! This crate derives the app-state subkeys, builds mutations, seals them
//! into patches and verifies incoming ones. State is never hidden: every
//! encode and decode takes a [`HashState`] by value and returns the next one.
//!
//! ## Layout
//!
//! - [`keys`] - HKDF expansion of a root key into five subkeys
//! - [`lthash`] - The 128-byte additive accumulator
//! - [`hash`] - [`HashState`] and the index, content, snapshot and patch MACs
//! - [`index`] / [`action`] - Typed index shapes and action payloads
//! - [`builders`] - One factory per user intent
//! - [`encode`] / [`decode`] - The two directions of the patch pipeline
//! - [`processor`] / [`store`] - Store-backed wrapper with a key cache
//!
//! Persisting the results is left to the caller, see `appstate-client` for
//! the async orchestration.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod builders;
mod cipher;
pub mod decode;
pub mod encode;
pub mod error;
pub mod hash;
pub mod index;
pub mod keys;
pub mod lthash;
pub mod processor;
pub mod store;

pub use action::{MessageRange, RangeMessage, SyncAction};
pub use builders::{
    build_archive, build_label_chat, build_label_edit, build_label_message, build_mute,
    build_pin, build_setting_push_name, build_star, MutationInfo, PatchInfo,
};
pub use decode::{decode_patch, decode_patches, DecodedPatch, Mutation};
pub use encode::{encode_patch, EncodedPatch};
pub use error::{AppStateError, HashWarning, MacKind, StoreError};
pub use hash::{update_hash, HashState};
pub use index::{IndexError, MutationIndex};
pub use keys::{AppStateKey, ExpandedAppStateKeys};
pub use lthash::LtHash;
pub use processor::Processor;
pub use store::{AppStateStore, IndexChange, MemoryStore};
