//! Mutation builders.
//!
//! Pure factories turning a user intent into a [`PatchInfo`]. Builders never
//! set the action timestamp; the encoder stamps every mutation of a patch
//! with the patch timestamp.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use appstate_types::proto::MessageKey;
use appstate_types::{Jid, PatchName, SyncdOperation};

use crate::action::{MessageRange, RangeMessage, SyncAction};
use crate::index::MutationIndex;

/// One mutation to apply to the app state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationInfo {
    /// What is being mutated.
    pub index: MutationIndex,
    /// Schema version of the mutation kind.
    pub version: i32,
    /// The action payload.
    pub action: SyncAction,
    /// SET or REMOVE.
    pub operation: SyncdOperation,
}

impl MutationInfo {
    /// A SET mutation at `index`, versioned by the index kind.
    pub fn set(index: MutationIndex, action: SyncAction) -> Self {
        Self {
            version: index.version(),
            index,
            action,
            operation: SyncdOperation::Set,
        }
    }

    /// A REMOVE mutation at `index`, versioned by the index kind.
    pub fn remove(index: MutationIndex, action: SyncAction) -> Self {
        Self {
            operation: SyncdOperation::Remove,
            ..Self::set(index, action)
        }
    }
}

/// A patch to encode: mutations of one app-state category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchInfo {
    /// Patch creation time; `None` means "now" at encode time.
    pub timestamp: Option<SystemTime>,
    /// The category every mutation belongs to.
    pub patch_name: PatchName,
    /// Mutations in application order.
    pub mutations: Vec<MutationInfo>,
}

impl PatchInfo {
    /// A patch with the given mutations and no explicit timestamp.
    pub fn new(patch_name: PatchName, mutations: Vec<MutationInfo>) -> Self {
        Self {
            timestamp: None,
            patch_name,
            mutations,
        }
    }

    /// Set an explicit timestamp.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Mute or unmute a chat.
///
/// A zero `duration` mutes forever (no end timestamp). An end past the
/// representable range is clamped to `i64::MAX` milliseconds.
pub fn build_mute(target: &Jid, mute: bool, duration: Duration) -> PatchInfo {
    let end_timestamp = if duration > Duration::ZERO {
        Some(
            SystemTime::now()
                .checked_add(duration)
                .map_or(i64::MAX, unix_millis),
        )
    } else {
        None
    };

    PatchInfo::new(
        PatchName::RegularHigh,
        vec![MutationInfo::set(
            MutationIndex::Mute {
                chat: target.clone(),
            },
            SyncAction::Mute {
                muted: mute,
                end_timestamp,
            },
        )],
    )
}

fn pin_mutation(target: &Jid, pin: bool) -> MutationInfo {
    MutationInfo::set(
        MutationIndex::Pin {
            chat: target.clone(),
        },
        SyncAction::Pin { pinned: pin },
    )
}

/// Pin or unpin a chat.
pub fn build_pin(target: &Jid, pin: bool) -> PatchInfo {
    PatchInfo::new(PatchName::RegularLow, vec![pin_mutation(target, pin)])
}

/// Archive or unarchive a chat.
///
/// `last_message_timestamp` defaults to now. Archiving also unpins the chat
/// in the same patch; unarchiving leaves the pin state alone.
pub fn build_archive(
    target: &Jid,
    archive: bool,
    last_message_timestamp: Option<SystemTime>,
    last_message_key: Option<MessageKey>,
) -> PatchInfo {
    let timestamp = unix_seconds(last_message_timestamp.unwrap_or_else(SystemTime::now));
    let messages = last_message_key
        .into_iter()
        .map(|key| RangeMessage { key, timestamp })
        .collect();

    let mut mutations = vec![MutationInfo::set(
        MutationIndex::Archive {
            chat: target.clone(),
        },
        SyncAction::Archive {
            archived: archive,
            message_range: Some(MessageRange {
                last_message_timestamp: timestamp,
                messages,
            }),
        },
    )];
    if archive {
        mutations.push(pin_mutation(target, false));
    }

    PatchInfo::new(PatchName::RegularLow, mutations)
}

/// Attach or detach a label on a chat.
pub fn build_label_chat(target: &Jid, label_id: &str, labeled: bool) -> PatchInfo {
    PatchInfo::new(
        PatchName::Regular,
        vec![MutationInfo::set(
            MutationIndex::LabelChat {
                label_id: label_id.to_string(),
                chat: target.clone(),
            },
            SyncAction::LabelAssociation { labeled },
        )],
    )
}

/// Attach or detach a label on a message.
pub fn build_label_message(
    target: &Jid,
    label_id: &str,
    message_id: &str,
    labeled: bool,
) -> PatchInfo {
    PatchInfo::new(
        PatchName::Regular,
        vec![MutationInfo::set(
            MutationIndex::LabelMessage {
                label_id: label_id.to_string(),
                chat: target.clone(),
                message_id: message_id.to_string(),
            },
            SyncAction::LabelAssociation { labeled },
        )],
    )
}

/// Create, rename, recolor or soft-delete a label.
pub fn build_label_edit(label_id: &str, name: &str, color: i32, deleted: bool) -> PatchInfo {
    PatchInfo::new(
        PatchName::Regular,
        vec![MutationInfo::set(
            MutationIndex::LabelEdit {
                label_id: label_id.to_string(),
            },
            SyncAction::LabelEdit {
                name: name.to_string(),
                color,
                deleted,
            },
        )],
    )
}

/// Change the push name.
pub fn build_setting_push_name(push_name: &str) -> PatchInfo {
    PatchInfo::new(
        PatchName::CriticalBlock,
        vec![MutationInfo::set(
            MutationIndex::SettingPushName,
            SyncAction::PushName {
                name: push_name.to_string(),
            },
        )],
    )
}

/// Star or unstar a message.
///
/// In a self-chat (sender and target are the same user) the sender
/// component is the literal `"0"`.
pub fn build_star(
    target: &Jid,
    sender: &Jid,
    message_id: &str,
    from_me: bool,
    starred: bool,
) -> PatchInfo {
    let sender = if target.same_user(sender) {
        None
    } else {
        Some(sender.clone())
    };

    PatchInfo::new(
        PatchName::RegularHigh,
        vec![MutationInfo::set(
            MutationIndex::Star {
                chat: target.clone(),
                message_id: message_id.to_string(),
                from_me,
                sender,
            },
            SyncAction::Star { starred },
        )],
    )
}

/// Epoch milliseconds, clamped to 0 before the epoch.
pub fn unix_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn unix_seconds(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
