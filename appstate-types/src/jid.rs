//! Chat and user identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Server of ordinary user JIDs.
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";

/// Server of group chat JIDs.
pub const GROUP_SERVER: &str = "g.us";

/// A message identifier as it appears in mutation indices.
pub type MessageId = String;

/// A chat or user identifier.
///
/// The textual form is `user@server`, `user:device@server` or
/// `user.agent:device@server`; a JID without a user is just `server`.
/// [`Display`](fmt::Display) and [`FromStr`] round-trip that form exactly,
/// which matters because JIDs are embedded verbatim in mutation indices.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Jid {
    /// The user part (phone number, group ID, ...). Empty for server JIDs.
    pub user: String,
    /// Raw agent number, 0 for the default agent.
    pub agent: u8,
    /// Device number, 0 for the primary device.
    pub device: u16,
    /// The server part.
    pub server: String,
}

impl Jid {
    /// Create a JID for the primary device of a user on a server.
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            agent: 0,
            device: 0,
            server: server.into(),
        }
    }

    /// Create a user JID on the default user server.
    pub fn user(user: impl Into<String>) -> Self {
        Self::new(user, DEFAULT_USER_SERVER)
    }

    /// Create a group JID.
    pub fn group(id: impl Into<String>) -> Self {
        Self::new(id, GROUP_SERVER)
    }

    /// Whether this JID identifies the same user as `other`.
    pub fn same_user(&self, other: &Jid) -> bool {
        self.user == other.user
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.agent > 0 {
            write!(
                f,
                "{}.{}:{}@{}",
                self.user, self.agent, self.device, self.server
            )
        } else if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else if !self.user.is_empty() {
            write!(f, "{}@{}", self.user, self.server)
        } else {
            f.write_str(&self.server)
        }
    }
}

impl fmt::Debug for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Jid({})", self)
    }
}

impl FromStr for Jid {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypesError::InvalidJid(s.to_string());

        let Some((user_part, server)) = s.split_once('@') else {
            return Ok(Self::new("", s));
        };
        if server.contains('@') {
            return Err(invalid());
        }

        let mut jid = Self::new(user_part, server);
        if let Some((user, ad)) = user_part.split_once('.') {
            if ad.contains('.') {
                return Err(invalid());
            }
            let (agent, device) = match ad.split_once(':') {
                Some((agent, device)) => (agent, Some(device)),
                None => (ad, None),
            };
            jid.user = user.to_string();
            jid.agent = agent.parse().map_err(|_| invalid())?;
            if let Some(device) = device {
                jid.device = device.parse().map_err(|_| invalid())?;
            }
        } else if let Some((user, device)) = user_part.split_once(':') {
            jid.user = user.to_string();
            jid.device = device.parse().map_err(|_| invalid())?;
        }
        Ok(jid)
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

impl TryFrom<String> for Jid {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
