//! Mutation index shapes.
//!
//! An index names what a mutation changes: a kind tag followed by a fixed
//! number of positional components. Its canonical byte form is the JSON
//! array of its string parts; the index MAC over those bytes is what travels
//! on the wire.

use appstate_types::{Jid, MessageId, PatchName};
use thiserror::Error;

/// Index kind tag for mute.
pub const INDEX_MUTE: &str = "mute";
/// Index kind tag for pin.
pub const INDEX_PIN: &str = "pin_v1";
/// Index kind tag for archive.
pub const INDEX_ARCHIVE: &str = "archive";
/// Index kind tag for chat labels.
pub const INDEX_LABEL_CHAT: &str = "label_jid";
/// Index kind tag for message labels.
pub const INDEX_LABEL_MESSAGE: &str = "label_message";
/// Index kind tag for label edits.
pub const INDEX_LABEL_EDIT: &str = "label_edit";
/// Index kind tag for the push name setting.
pub const INDEX_SETTING_PUSH_NAME: &str = "setting_pushName";
/// Index kind tag for star.
pub const INDEX_STAR: &str = "star";

/// Errors parsing a decoded index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// The index is empty.
    #[error("empty index")]
    Empty,

    /// The kind tag is not one this crate models.
    #[error("unknown index kind: {0}")]
    UnknownKind(String),

    /// The index has the wrong number of components for its kind.
    #[error("index {kind} expects {expected} parts, got {actual}")]
    Arity {
        /// Kind tag.
        kind: &'static str,
        /// Expected number of parts including the tag.
        expected: usize,
        /// Actual number of parts.
        actual: usize,
    },

    /// A component that must be a JID failed to parse.
    #[error("invalid JID in index: {0}")]
    InvalidJid(String),

    /// A flag component is neither "0" nor "1".
    #[error("invalid flag in index: {0}")]
    InvalidFlag(String),
}

/// The closed set of index shapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationIndex {
    /// `["mute", chat]`
    Mute {
        /// Chat being muted.
        chat: Jid,
    },
    /// `["pin_v1", chat]`
    Pin {
        /// Chat being pinned.
        chat: Jid,
    },
    /// `["archive", chat]`
    Archive {
        /// Chat being archived.
        chat: Jid,
    },
    /// `["label_jid", label, chat]`
    LabelChat {
        /// Label ID.
        label_id: String,
        /// Chat being labeled.
        chat: Jid,
    },
    /// `["label_message", label, chat, message, "0", "0"]`
    ///
    /// The two trailing zeros are reserved positional slots and are always emitted.
    LabelMessage {
        /// Label ID.
        label_id: String,
        /// Chat the message belongs to.
        chat: Jid,
        /// Message being labeled.
        message_id: MessageId,
    },
    /// `["label_edit", label]`
    LabelEdit {
        /// Label ID.
        label_id: String,
    },
    /// `["setting_pushName"]`
    SettingPushName,
    /// `["star", chat, message, fromMe, sender]`
    ///
    /// `sender` is `None` when it is rendered as the literal `"0"` (self-chats).
    Star {
        /// Chat the message belongs to.
        chat: Jid,
        /// Message being starred.
        message_id: MessageId,
        /// Whether this account sent the message.
        from_me: bool,
        /// Sender, `None` for the canonical `"0"`.
        sender: Option<Jid>,
    },
}

impl MutationIndex {
    /// The kind tag (first component).
    pub fn kind(&self) -> &'static str {
        match self {
            MutationIndex::Mute { .. } => INDEX_MUTE,
            MutationIndex::Pin { .. } => INDEX_PIN,
            MutationIndex::Archive { .. } => INDEX_ARCHIVE,
            MutationIndex::LabelChat { .. } => INDEX_LABEL_CHAT,
            MutationIndex::LabelMessage { .. } => INDEX_LABEL_MESSAGE,
            MutationIndex::LabelEdit { .. } => INDEX_LABEL_EDIT,
            MutationIndex::SettingPushName => INDEX_SETTING_PUSH_NAME,
            MutationIndex::Star { .. } => INDEX_STAR,
        }
    }

    /// The schema version the server expects for this kind.
    pub fn version(&self) -> i32 {
        match self {
            MutationIndex::Mute { .. } => 2,
            MutationIndex::Pin { .. } => 5,
            MutationIndex::Archive { .. } => 3,
            MutationIndex::LabelChat { .. } => 3,
            MutationIndex::LabelMessage { .. } => 3,
            MutationIndex::LabelEdit { .. } => 3,
            MutationIndex::SettingPushName => 1,
            MutationIndex::Star { .. } => 2,
        }
    }

    /// The app-state category this kind lives in.
    pub fn patch_name(&self) -> PatchName {
        match self {
            MutationIndex::Mute { .. } | MutationIndex::Star { .. } => PatchName::RegularHigh,
            MutationIndex::Pin { .. } | MutationIndex::Archive { .. } => PatchName::RegularLow,
            MutationIndex::LabelChat { .. }
            | MutationIndex::LabelMessage { .. }
            | MutationIndex::LabelEdit { .. } => PatchName::Regular,
            MutationIndex::SettingPushName => PatchName::CriticalBlock,
        }
    }

    /// The string parts, kind tag first.
    pub fn to_parts(&self) -> Vec<String> {
        let kind = self.kind().to_string();
        match self {
            MutationIndex::Mute { chat }
            | MutationIndex::Pin { chat }
            | MutationIndex::Archive { chat } => vec![kind, chat.to_string()],
            MutationIndex::LabelChat { label_id, chat } => {
                vec![kind, label_id.clone(), chat.to_string()]
            }
            MutationIndex::LabelMessage {
                label_id,
                chat,
                message_id,
            } => vec![
                kind,
                label_id.clone(),
                chat.to_string(),
                message_id.clone(),
                "0".to_string(),
                "0".to_string(),
            ],
            MutationIndex::LabelEdit { label_id } => vec![kind, label_id.clone()],
            MutationIndex::SettingPushName => vec![kind],
            MutationIndex::Star {
                chat,
                message_id,
                from_me,
                sender,
            } => vec![
                kind,
                chat.to_string(),
                message_id.clone(),
                flag(*from_me).to_string(),
                sender
                    .as_ref()
                    .map_or_else(|| "0".to_string(), Jid::to_string),
            ],
        }
    }

    /// Canonical bytes: the JSON array of the string parts.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        encode_parts(&self.to_parts())
    }

    /// Parse decoded string parts back into a shape.
    pub fn from_parts<S: AsRef<str>>(parts: &[S]) -> Result<Self, IndexError> {
        let parts: Vec<&str> = parts.iter().map(AsRef::as_ref).collect();
        let (&kind, rest) = parts.split_first().ok_or(IndexError::Empty)?;

        let expect = |kind: &'static str, expected: usize| {
            if parts.len() == expected {
                Ok(())
            } else {
                Err(IndexError::Arity {
                    kind,
                    expected,
                    actual: parts.len(),
                })
            }
        };

        match kind {
            INDEX_MUTE => {
                expect(INDEX_MUTE, 2)?;
                Ok(MutationIndex::Mute {
                    chat: parse_jid(rest[0])?,
                })
            }
            INDEX_PIN => {
                expect(INDEX_PIN, 2)?;
                Ok(MutationIndex::Pin {
                    chat: parse_jid(rest[0])?,
                })
            }
            INDEX_ARCHIVE => {
                expect(INDEX_ARCHIVE, 2)?;
                Ok(MutationIndex::Archive {
                    chat: parse_jid(rest[0])?,
                })
            }
            INDEX_LABEL_CHAT => {
                expect(INDEX_LABEL_CHAT, 3)?;
                Ok(MutationIndex::LabelChat {
                    label_id: rest[0].to_string(),
                    chat: parse_jid(rest[1])?,
                })
            }
            INDEX_LABEL_MESSAGE => {
                expect(INDEX_LABEL_MESSAGE, 6)?;
                Ok(MutationIndex::LabelMessage {
                    label_id: rest[0].to_string(),
                    chat: parse_jid(rest[1])?,
                    message_id: rest[2].to_string(),
                })
            }
            INDEX_LABEL_EDIT => {
                expect(INDEX_LABEL_EDIT, 2)?;
                Ok(MutationIndex::LabelEdit {
                    label_id: rest[0].to_string(),
                })
            }
            INDEX_SETTING_PUSH_NAME => {
                expect(INDEX_SETTING_PUSH_NAME, 1)?;
                Ok(MutationIndex::SettingPushName)
            }
            INDEX_STAR => {
                expect(INDEX_STAR, 5)?;
                let from_me = match rest[2] {
                    "1" => true,
                    "0" => false,
                    other => return Err(IndexError::InvalidFlag(other.to_string())),
                };
                let sender = match rest[3] {
                    "0" => None,
                    jid => Some(parse_jid(jid)?),
                };
                Ok(MutationIndex::Star {
                    chat: parse_jid(rest[0])?,
                    message_id: rest[1].to_string(),
                    from_me,
                    sender,
                })
            }
            other => Err(IndexError::UnknownKind(other.to_string())),
        }
    }
}

/// Encode index parts as a compact JSON array.
pub fn encode_parts<S: AsRef<str>>(parts: &[S]) -> Result<Vec<u8>, serde_json::Error> {
    let parts: Vec<&str> = parts.iter().map(AsRef::as_ref).collect();
    serde_json::to_vec(&parts)
}

/// Decode a JSON index back into its string parts.
pub fn decode_parts(bytes: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_slice(bytes)
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn parse_jid(text: &str) -> Result<Jid, IndexError> {
    text.parse()
        .map_err(|_| IndexError::InvalidJid(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat() -> Jid {
        Jid::user("15551234567")
    }

    fn all_shapes() -> Vec<MutationIndex> {
        vec![
            MutationIndex::Mute { chat: chat() },
            MutationIndex::Pin { chat: chat() },
            MutationIndex::Archive { chat: chat() },
            MutationIndex::LabelChat {
                label_id: "3".into(),
                chat: chat(),
            },
            MutationIndex::LabelMessage {
                label_id: "3".into(),
                chat: Jid::group("120363025246125486"),
                message_id: "3EB0C767D26A1D8D".into(),
            },
            MutationIndex::LabelEdit {
                label_id: "3".into(),
            },
            MutationIndex::SettingPushName,
            MutationIndex::Star {
                chat: chat(),
                message_id: "ABCD".into(),
                from_me: true,
                sender: None,
            },
            MutationIndex::Star {
                chat: Jid::group("120363025246125486"),
                message_id: "ABCD".into(),
                from_me: false,
                sender: Some(Jid::user("15550000000")),
            },
        ]
    }

    #[test]
    fn every_shape_parses_back() {
        for shape in all_shapes() {
            let parts = shape.to_parts();
            assert_eq!(parts[0], shape.kind());
            assert_eq!(MutationIndex::from_parts(&parts).unwrap(), shape);
        }
    }

    #[test]
    fn canonical_bytes_are_compact_json() {
        let bytes = MutationIndex::Mute { chat: chat() }.to_bytes().unwrap();
        assert_eq!(bytes, br#"["mute","15551234567@s.whatsapp.net"]"#);

        let bytes = MutationIndex::SettingPushName.to_bytes().unwrap();
        assert_eq!(bytes, br#"["setting_pushName"]"#);
    }

    #[test]
    fn label_message_emits_reserved_zeros() {
        let parts = MutationIndex::LabelMessage {
            label_id: "7".into(),
            chat: chat(),
            message_id: "MSG".into(),
        }
        .to_parts();
        assert_eq!(
            parts,
            vec![
                "label_message",
                "7",
                "15551234567@s.whatsapp.net",
                "MSG",
                "0",
                "0"
            ]
        );
    }

    #[test]
    fn star_flags_render_as_digits() {
        let parts = MutationIndex::Star {
            chat: chat(),
            message_id: "M".into(),
            from_me: false,
            sender: None,
        }
        .to_parts();
        assert_eq!(parts[3], "0");
        assert_eq!(parts[4], "0");
    }

    #[test]
    fn versions_are_protocol_constants() {
        let versions: Vec<(&str, i32)> = all_shapes()
            .iter()
            .map(|s| (s.kind(), s.version()))
            .collect();
        assert!(versions.contains(&("mute", 2)));
        assert!(versions.contains(&("pin_v1", 5)));
        assert!(versions.contains(&("archive", 3)));
        assert!(versions.contains(&("label_jid", 3)));
        assert!(versions.contains(&("label_message", 3)));
        assert!(versions.contains(&("label_edit", 3)));
        assert!(versions.contains(&("setting_pushName", 1)));
        assert!(versions.contains(&("star", 2)));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            MutationIndex::from_parts::<&str>(&[]),
            Err(IndexError::Empty)
        );
        assert_eq!(
            MutationIndex::from_parts(&["markChatAsRead", "1@s.whatsapp.net"]),
            Err(IndexError::UnknownKind("markChatAsRead".into()))
        );
        assert!(matches!(
            MutationIndex::from_parts(&["mute"]),
            Err(IndexError::Arity {
                kind: "mute",
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            MutationIndex::from_parts(&["pin_v1", "1:x@s.whatsapp.net"]),
            Err(IndexError::InvalidJid(_))
        ));
        assert!(matches!(
            MutationIndex::from_parts(&["star", "1@s.whatsapp.net", "M", "yes", "0"]),
            Err(IndexError::InvalidFlag(_))
        ));
    }

    #[test]
    fn json_parts_roundtrip() {
        let parts = vec!["label_edit".to_string(), "12".to_string()];
        let bytes = encode_parts(&parts).unwrap();
        assert_eq!(decode_parts(&bytes).unwrap(), parts);
    }
}
