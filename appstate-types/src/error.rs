//! Error types for app-state wire types.

use thiserror::Error;

/// Errors that can occur while encoding or parsing wire types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Protobuf decoding failed
    #[error("protobuf decoding failed: {0}")]
    Decode(#[source] prost::DecodeError),

    /// JID string could not be parsed
    #[error("invalid JID: {0}")]
    InvalidJid(String),

    /// Unknown app-state patch name
    #[error("unknown patch name: {0}")]
    UnknownPatchName(String),

    /// Unknown mutation operation discriminator
    #[error("invalid mutation operation: {0}")]
    InvalidOperation(i32),
}
