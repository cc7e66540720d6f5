//! Node synchronization mode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Synchronization mode of the node.
///
/// Anything other than [`SyncType::NoSync`] means the node is catching up
/// and the directory-service dispatcher drops all inbound DS messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncType {
    /// Fully synchronized; normal operation.
    NoSync,
    /// A brand-new node pulling the chain from scratch.
    NewSync,
    /// A shard node catching up.
    NormalSync,
    /// A DS node catching up before rejoining the committee.
    DsSync,
    /// A lookup node catching up.
    LookupSync,
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncType::NoSync => "NO_SYNC",
            SyncType::NewSync => "NEW_SYNC",
            SyncType::NormalSync => "NORMAL_SYNC",
            SyncType::DsSync => "DS_SYNC",
            SyncType::LookupSync => "LOOKUP_SYNC",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        assert_eq!(SyncType::NoSync.to_string(), "NO_SYNC");
        assert_eq!(SyncType::DsSync.to_string(), "DS_SYNC");
    }
}
