//! App-state categories.
//!
//! Keys, versions and the integrity hash are all partitioned per patch name,
//! so every mutation inside one patch belongs to exactly one of these.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// The app-state category a patch mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchName {
    /// Identity-level settings such as the push name.
    CriticalBlock,
    /// Low-priority critical data (e.g. contact unblocks).
    CriticalUnblockLow,
    /// Chat-level settings that must propagate quickly (mute, star).
    RegularHigh,
    /// Ordinary chat-level settings (labels).
    Regular,
    /// Low-priority chat-level settings (pin, archive).
    RegularLow,
}

impl PatchName {
    /// Every patch name, in the order the server syncs them.
    pub const ALL: [PatchName; 5] = [
        PatchName::CriticalBlock,
        PatchName::CriticalUnblockLow,
        PatchName::RegularHigh,
        PatchName::Regular,
        PatchName::RegularLow,
    ];

    /// The wire string for this patch name.
    ///
    /// This string is mixed into the snapshot and patch MACs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchName::CriticalBlock => "critical_block",
            PatchName::CriticalUnblockLow => "critical_unblock_low",
            PatchName::RegularHigh => "regular_high",
            PatchName::Regular => "regular",
            PatchName::RegularLow => "regular_low",
        }
    }
}

impl fmt::Display for PatchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatchName {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatchName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| TypesError::UnknownPatchName(s.to_string()))
    }
}
