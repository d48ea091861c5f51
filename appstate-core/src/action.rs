//! Typed action payloads.
//!
//! [`SyncAction`] is the sum type over the action kinds this crate builds
//! and understands. It converts to and from the protobuf
//! [`SyncActionValue`], whose timestamp is owned by the encoder.

use appstate_types::proto::{
    ArchiveChatAction, LabelAssociationAction, LabelEditAction, MessageKey, MuteAction,
    PinAction, PushNameSetting, StarAction, SyncActionMessage, SyncActionMessageRange,
    SyncActionValue,
};

/// A message reference inside an archive range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeMessage {
    /// Key of the message.
    pub key: MessageKey,
    /// Timestamp of the message, epoch seconds.
    pub timestamp: i64,
}

/// The range of messages an archive applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageRange {
    /// Timestamp of the last message, epoch seconds.
    pub last_message_timestamp: i64,
    /// The last messages themselves, if known.
    pub messages: Vec<RangeMessage>,
}

/// One action payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Mute or unmute a chat.
    Mute {
        /// Whether the chat is muted.
        muted: bool,
        /// End of the mute, epoch milliseconds; `None` means forever.
        end_timestamp: Option<i64>,
    },
    /// Pin or unpin a chat.
    Pin {
        /// Whether the chat is pinned.
        pinned: bool,
    },
    /// Archive or unarchive a chat.
    Archive {
        /// Whether the chat is archived.
        archived: bool,
        /// Messages the archive applies to.
        message_range: Option<MessageRange>,
    },
    /// Attach or detach a label (on a chat or a message, per the index).
    LabelAssociation {
        /// Whether the label is attached.
        labeled: bool,
    },
    /// Edit or soft-delete a label.
    LabelEdit {
        /// Label name.
        name: String,
        /// Label color index.
        color: i32,
        /// Whether the label is deleted.
        deleted: bool,
    },
    /// Change the push name.
    PushName {
        /// The new push name.
        name: String,
    },
    /// Star or unstar a message.
    Star {
        /// Whether the message is starred.
        starred: bool,
    },
}

impl SyncAction {
    /// Build the protobuf value stamped with a timestamp (epoch millis).
    pub fn to_value(&self, timestamp_ms: i64) -> SyncActionValue {
        let mut value = SyncActionValue {
            timestamp: Some(timestamp_ms),
            ..Default::default()
        };
        match self {
            SyncAction::Mute {
                muted,
                end_timestamp,
            } => {
                value.mute_action = Some(MuteAction {
                    muted: Some(*muted),
                    mute_end_timestamp: *end_timestamp,
                    auto_muted: None,
                });
            }
            SyncAction::Pin { pinned } => {
                value.pin_action = Some(PinAction {
                    pinned: Some(*pinned),
                });
            }
            SyncAction::Archive {
                archived,
                message_range,
            } => {
                value.archive_chat_action = Some(ArchiveChatAction {
                    archived: Some(*archived),
                    message_range: message_range.as_ref().map(|range| SyncActionMessageRange {
                        last_message_timestamp: Some(range.last_message_timestamp),
                        last_system_message_timestamp: None,
                        messages: range
                            .messages
                            .iter()
                            .map(|m| SyncActionMessage {
                                key: Some(m.key.clone()),
                                timestamp: Some(m.timestamp),
                            })
                            .collect(),
                    }),
                });
            }
            SyncAction::LabelAssociation { labeled } => {
                value.label_association_action = Some(LabelAssociationAction {
                    labeled: Some(*labeled),
                });
            }
            SyncAction::LabelEdit {
                name,
                color,
                deleted,
            } => {
                value.label_edit_action = Some(LabelEditAction {
                    name: Some(name.clone()),
                    color: Some(*color),
                    predefined_id: None,
                    deleted: Some(*deleted),
                });
            }
            SyncAction::PushName { name } => {
                value.push_name_setting = Some(PushNameSetting {
                    name: Some(name.clone()),
                });
            }
            SyncAction::Star { starred } => {
                value.star_action = Some(StarAction {
                    starred: Some(*starred),
                });
            }
        }
        value
    }

    /// Read the action out of a protobuf value.
    ///
    /// Returns `None` when no modeled action field is set.
    pub fn from_value(value: &SyncActionValue) -> Option<Self> {
        if let Some(mute) = &value.mute_action {
            return Some(SyncAction::Mute {
                muted: mute.muted.unwrap_or_default(),
                end_timestamp: mute.mute_end_timestamp,
            });
        }
        if let Some(pin) = &value.pin_action {
            return Some(SyncAction::Pin {
                pinned: pin.pinned.unwrap_or_default(),
            });
        }
        if let Some(archive) = &value.archive_chat_action {
            return Some(SyncAction::Archive {
                archived: archive.archived.unwrap_or_default(),
                message_range: archive.message_range.as_ref().map(|range| MessageRange {
                    last_message_timestamp: range.last_message_timestamp.unwrap_or_default(),
                    messages: range
                        .messages
                        .iter()
                        .map(|m| RangeMessage {
                            key: m.key.clone().unwrap_or_default(),
                            timestamp: m.timestamp.unwrap_or_default(),
                        })
                        .collect(),
                }),
            });
        }
        if let Some(label) = &value.label_association_action {
            return Some(SyncAction::LabelAssociation {
                labeled: label.labeled.unwrap_or_default(),
            });
        }
        if let Some(edit) = &value.label_edit_action {
            return Some(SyncAction::LabelEdit {
                name: edit.name.clone().unwrap_or_default(),
                color: edit.color.unwrap_or_default(),
                deleted: edit.deleted.unwrap_or_default(),
            });
        }
        if let Some(push_name) = &value.push_name_setting {
            return Some(SyncAction::PushName {
                name: push_name.name.clone().unwrap_or_default(),
            });
        }
        if let Some(star) = &value.star_action {
            return Some(SyncAction::Star {
                starred: star.starred.unwrap_or_default(),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<SyncAction> {
        vec![
            SyncAction::Mute {
                muted: true,
                end_timestamp: Some(1_700_000_000_000),
            },
            SyncAction::Mute {
                muted: true,
                end_timestamp: None,
            },
            SyncAction::Pin { pinned: false },
            SyncAction::Archive {
                archived: true,
                message_range: Some(MessageRange {
                    last_message_timestamp: 1_700_000_000,
                    messages: vec![RangeMessage {
                        key: MessageKey {
                            remote_jid: Some("1@s.whatsapp.net".into()),
                            from_me: Some(true),
                            id: Some("ABC".into()),
                            participant: None,
                        },
                        timestamp: 1_700_000_000,
                    }],
                }),
            },
            SyncAction::LabelAssociation { labeled: true },
            SyncAction::LabelEdit {
                name: "Customers".into(),
                color: 4,
                deleted: false,
            },
            SyncAction::PushName {
                name: "Alice".into(),
            },
            SyncAction::Star { starred: true },
        ]
    }

    #[test]
    fn value_conversion_preserves_action() {
        for action in samples() {
            let value = action.to_value(42);
            assert_eq!(value.timestamp, Some(42));
            assert_eq!(SyncAction::from_value(&value), Some(action));
        }
    }

    #[test]
    fn exactly_one_action_field_is_set() {
        for action in samples() {
            let value = action.to_value(0);
            let set = [
                value.mute_action.is_some(),
                value.pin_action.is_some(),
                value.archive_chat_action.is_some(),
                value.label_association_action.is_some(),
                value.label_edit_action.is_some(),
                value.push_name_setting.is_some(),
                value.star_action.is_some(),
            ];
            assert_eq!(set.iter().filter(|s| **s).count(), 1, "{action:?}");
        }
    }

    #[test]
    fn indefinite_mute_has_no_end_timestamp() {
        let value = SyncAction::Mute {
            muted: true,
            end_timestamp: None,
        }
        .to_value(1);
        assert_eq!(value.mute_action.unwrap().mute_end_timestamp, None);
    }

    #[test]
    fn empty_value_is_unmodeled() {
        assert_eq!(SyncAction::from_value(&SyncActionValue::default()), None);
    }
}
