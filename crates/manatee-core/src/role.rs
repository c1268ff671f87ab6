//! Roles a peer can hold

use crate::database::DatabaseRole;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a peer in the replication topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    /// Startup, before any evaluation
    Unknown,
    /// Alive but holding no place in the topology
    Unassigned,
    /// Accepting writes
    Primary,
    /// Synchronous replica of the primary
    Sync,
    /// Asynchronous replica somewhere in the chain
    Async,
    /// Superseded former primary
    Deposed,
}

impl PeerRole {
    /// Deposed peers never take another role
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deposed)
    }

    /// Check whether moving to `next` is allowed.
    ///
    /// Nothing leaves `Deposed` and nothing returns to `Unknown`.
    pub fn can_transition_to(&self, next: PeerRole) -> bool {
        if self.is_terminal() {
            return next == *self;
        }
        next != Self::Unknown
    }

    /// Database role this peer role implies
    pub fn database_role(&self) -> DatabaseRole {
        match self {
            Self::Primary => DatabaseRole::Primary,
            Self::Sync => DatabaseRole::Sync,
            Self::Async => DatabaseRole::Async,
            Self::Unknown | Self::Unassigned | Self::Deposed => DatabaseRole::None,
        }
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Unassigned => "unassigned",
            Self::Primary => "primary",
            Self::Sync => "sync",
            Self::Async => "async",
            Self::Deposed => "deposed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposed_is_terminal() {
        assert!(PeerRole::Deposed.is_terminal());
        assert!(!PeerRole::Deposed.can_transition_to(PeerRole::Primary));
        assert!(!PeerRole::Deposed.can_transition_to(PeerRole::Unassigned));
        assert!(PeerRole::Sync.can_transition_to(PeerRole::Primary));
        assert!(!PeerRole::Async.can_transition_to(PeerRole::Unknown));
    }

    #[test]
    fn test_database_role_mapping() {
        assert_eq!(PeerRole::Primary.database_role(), DatabaseRole::Primary);
        assert_eq!(PeerRole::Unassigned.database_role(), DatabaseRole::None);
        assert_eq!(PeerRole::Deposed.database_role(), DatabaseRole::None);
    }
}
