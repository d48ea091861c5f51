//! # appstate-types
//!
//! Wire format types for app-state synchronization.
//!
//! This crate provides the foundational types used across all app-state crates:
//! - [`Jid`] - Chat and user identifiers in their textual protocol form
//! - [`PatchName`] - The closed set of app-state categories
//! - [`proto`] - Protobuf messages exchanged with the server and peer devices
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod jid;
mod patch_name;
pub mod proto;

pub use error::TypesError;
pub use jid::{Jid, MessageId, DEFAULT_USER_SERVER, GROUP_SERVER};
pub use patch_name::PatchName;
pub use proto::{SyncdMutation, SyncdOperation, SyncdPatch};
