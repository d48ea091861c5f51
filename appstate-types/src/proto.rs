//! Protobuf messages for app-state sync.
//!
//! Field numbers follow the server's schema; they are part of the wire
//! contract and must not be renumbered. Only the fields this crate reads or
//! writes are declared, unknown fields are skipped on decode.

use prost::Message;

use crate::TypesError;

/// Operation carried by a [`SyncdMutation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SyncdOperation {
    /// Create or replace the value at an index.
    Set = 0,
    /// Delete the value at an index.
    Remove = 1,
}

impl SyncdOperation {
    /// Parse the raw protobuf discriminator.
    pub fn from_raw(value: i32) -> Result<Self, TypesError> {
        match value {
            0 => Ok(SyncdOperation::Set),
            1 => Ok(SyncdOperation::Remove),
            other => Err(TypesError::InvalidOperation(other)),
        }
    }
}

/// An encrypted, MAC-sealed patch advancing one app-state category by one version.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncdPatch {
    /// Version this patch produces.
    #[prost(message, optional, tag = "1")]
    pub version: Option<SyncdVersion>,
    /// Mutations, in application order.
    #[prost(message, repeated, tag = "2")]
    pub mutations: Vec<SyncdMutation>,
    /// MAC over the accumulator after applying this patch.
    #[prost(bytes = "vec", optional, tag = "4")]
    pub snapshot_mac: Option<Vec<u8>>,
    /// MAC over the snapshot MAC, every value MAC and the version.
    #[prost(bytes = "vec", optional, tag = "5")]
    pub patch_mac: Option<Vec<u8>>,
    /// ID of the app-state key the patch is sealed with.
    #[prost(message, optional, tag = "6")]
    pub key_id: Option<KeyId>,
    /// Index of the device that produced the patch, set by the server.
    #[prost(uint32, optional, tag = "8")]
    pub device_index: Option<u32>,
}

impl SyncdPatch {
    /// Serialize to protobuf bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Deserialize from protobuf bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        Self::decode(bytes).map_err(TypesError::Decode)
    }

    /// The version number, if present.
    pub fn patch_version(&self) -> Option<u64> {
        self.version.as_ref().and_then(|v| v.version)
    }

    /// The patch-level key ID, empty if absent.
    pub fn key_id_bytes(&self) -> &[u8] {
        self.key_id
            .as_ref()
            .and_then(|k| k.id.as_deref())
            .unwrap_or_default()
    }
}

/// Version wrapper.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncdVersion {
    /// The version number.
    #[prost(uint64, optional, tag = "1")]
    pub version: Option<u64>,
}

/// Opaque key identifier.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyId {
    /// Raw key ID bytes.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub id: Option<Vec<u8>>,
}

impl KeyId {
    /// Wrap raw key ID bytes.
    pub fn from_bytes(id: &[u8]) -> Self {
        Self {
            id: Some(id.to_vec()),
        }
    }
}

/// A single indexed change.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncdMutation {
    /// SET or REMOVE.
    #[prost(enumeration = "SyncdOperation", optional, tag = "1")]
    pub operation: Option<i32>,
    /// The encrypted record.
    #[prost(message, optional, tag = "2")]
    pub record: Option<SyncdRecord>,
}

impl SyncdMutation {
    /// Build a mutation from its parts.
    pub fn new(operation: SyncdOperation, index_mac: Vec<u8>, value: Vec<u8>, key_id: &[u8]) -> Self {
        Self {
            operation: Some(operation as i32),
            record: Some(SyncdRecord {
                index: Some(SyncdIndex {
                    blob: Some(index_mac),
                }),
                value: Some(SyncdValue { blob: Some(value) }),
                key_id: Some(KeyId::from_bytes(key_id)),
            }),
        }
    }

    /// The operation, rejecting unknown discriminators.
    ///
    /// An absent operation decodes as SET, the protobuf default.
    pub fn try_operation(&self) -> Result<SyncdOperation, TypesError> {
        SyncdOperation::from_raw(self.operation.unwrap_or_default())
    }

    /// The index MAC, empty if absent.
    pub fn index_mac(&self) -> &[u8] {
        self.record
            .as_ref()
            .and_then(|r| r.index.as_ref())
            .and_then(|i| i.blob.as_deref())
            .unwrap_or_default()
    }

    /// The value blob (`iv ‖ ciphertext ‖ value MAC`), empty if absent.
    pub fn value_blob(&self) -> &[u8] {
        self.record
            .as_ref()
            .and_then(|r| r.value.as_ref())
            .and_then(|v| v.blob.as_deref())
            .unwrap_or_default()
    }

    /// The record's key ID, empty if absent.
    pub fn record_key_id(&self) -> &[u8] {
        self.record
            .as_ref()
            .and_then(|r| r.key_id.as_ref())
            .and_then(|k| k.id.as_deref())
            .unwrap_or_default()
    }
}

/// Encrypted record of a mutation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncdRecord {
    /// Index MAC.
    #[prost(message, optional, tag = "1")]
    pub index: Option<SyncdIndex>,
    /// Encrypted value followed by its MAC.
    #[prost(message, optional, tag = "2")]
    pub value: Option<SyncdValue>,
    /// Key the value is encrypted with.
    #[prost(message, optional, tag = "3")]
    pub key_id: Option<KeyId>,
}

/// Index MAC wrapper.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncdIndex {
    /// The index MAC.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub blob: Option<Vec<u8>>,
}

/// Value wrapper.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncdValue {
    /// `iv ‖ ciphertext ‖ value MAC`.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub blob: Option<Vec<u8>>,
}

/// Plaintext content envelope of a mutation, encrypted into [`SyncdValue`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncActionData {
    /// JSON-encoded index.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub index: Option<Vec<u8>>,
    /// The action payload.
    #[prost(message, optional, tag = "2")]
    pub value: Option<SyncActionValue>,
    /// Always empty.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub padding: Option<Vec<u8>>,
    /// Schema version of the mutation kind.
    #[prost(int32, optional, tag = "4")]
    pub version: Option<i32>,
}

impl SyncActionData {
    /// Serialize to protobuf bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Deserialize from protobuf bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        Self::decode(bytes).map_err(TypesError::Decode)
    }
}

/// Action payload; exactly one action field is set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncActionValue {
    /// Patch timestamp in epoch milliseconds.
    #[prost(int64, optional, tag = "1")]
    pub timestamp: Option<i64>,
    /// Star or unstar a message.
    #[prost(message, optional, tag = "2")]
    pub star_action: Option<StarAction>,
    /// Mute or unmute a chat.
    #[prost(message, optional, tag = "4")]
    pub mute_action: Option<MuteAction>,
    /// Pin or unpin a chat.
    #[prost(message, optional, tag = "5")]
    pub pin_action: Option<PinAction>,
    /// Change the push name.
    #[prost(message, optional, tag = "7")]
    pub push_name_setting: Option<PushNameSetting>,
    /// Create, rename, recolor or delete a label.
    #[prost(message, optional, tag = "14")]
    pub label_edit_action: Option<LabelEditAction>,
    /// Attach or detach a label.
    #[prost(message, optional, tag = "15")]
    pub label_association_action: Option<LabelAssociationAction>,
    /// Archive or unarchive a chat.
    #[prost(message, optional, tag = "17")]
    pub archive_chat_action: Option<ArchiveChatAction>,
}

/// Star action.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StarAction {
    /// Whether the message is starred.
    #[prost(bool, optional, tag = "1")]
    pub starred: Option<bool>,
}

/// Mute action.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MuteAction {
    /// Whether the chat is muted.
    #[prost(bool, optional, tag = "1")]
    pub muted: Option<bool>,
    /// End of the mute in epoch milliseconds; absent means forever.
    #[prost(int64, optional, tag = "2")]
    pub mute_end_timestamp: Option<i64>,
    /// Whether the mute was applied automatically.
    #[prost(bool, optional, tag = "3")]
    pub auto_muted: Option<bool>,
}

/// Pin action.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PinAction {
    /// Whether the chat is pinned.
    #[prost(bool, optional, tag = "1")]
    pub pinned: Option<bool>,
}

/// Push name setting.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushNameSetting {
    /// The new push name.
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
}

/// Label edit action.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LabelEditAction {
    /// Label name.
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Label color index.
    #[prost(int32, optional, tag = "2")]
    pub color: Option<i32>,
    /// ID of a predefined label this one derives from.
    #[prost(int32, optional, tag = "3")]
    pub predefined_id: Option<i32>,
    /// Whether the label is deleted.
    #[prost(bool, optional, tag = "4")]
    pub deleted: Option<bool>,
}

/// Label association action.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LabelAssociationAction {
    /// Whether the label is attached.
    #[prost(bool, optional, tag = "1")]
    pub labeled: Option<bool>,
}

/// Archive action.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ArchiveChatAction {
    /// Whether the chat is archived.
    #[prost(bool, optional, tag = "1")]
    pub archived: Option<bool>,
    /// Last messages the archive applies to.
    #[prost(message, optional, tag = "2")]
    pub message_range: Option<SyncActionMessageRange>,
}

/// Message range used to reconcile read-state on receivers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncActionMessageRange {
    /// Timestamp of the last message, in epoch seconds.
    #[prost(int64, optional, tag = "1")]
    pub last_message_timestamp: Option<i64>,
    /// Timestamp of the last system message, in epoch seconds.
    #[prost(int64, optional, tag = "2")]
    pub last_system_message_timestamp: Option<i64>,
    /// Messages in the range.
    #[prost(message, repeated, tag = "3")]
    pub messages: Vec<SyncActionMessage>,
}

/// A message reference inside a range.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncActionMessage {
    /// Key of the message.
    #[prost(message, optional, tag = "1")]
    pub key: Option<MessageKey>,
    /// Timestamp of the message, in epoch seconds.
    #[prost(int64, optional, tag = "2")]
    pub timestamp: Option<i64>,
}

/// Key identifying a message.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct MessageKey {
    /// Chat the message belongs to.
    #[prost(string, optional, tag = "1")]
    pub remote_jid: Option<String>,
    /// Whether the message was sent by this account.
    #[prost(bool, optional, tag = "2")]
    pub from_me: Option<bool>,
    /// Message ID.
    #[prost(string, optional, tag = "3")]
    pub id: Option<String>,
    /// Sender within a group chat.
    #[prost(string, optional, tag = "4")]
    pub participant: Option<String>,
}
