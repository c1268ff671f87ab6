//! Contract with the local database controller

use crate::host::Host;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Replication role the local database is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseRole {
    Primary,
    Sync,
    Async,
    /// Database should be stopped
    None,
}

impl fmt::Display for DatabaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Primary => "primary",
            Self::Sync => "sync",
            Self::Async => "async",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Desired configuration of the local database.
///
/// Derived entirely from the peer's role and topology, so deriving it twice
/// from the same inputs yields equal values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub role: DatabaseRole,
    /// Peer this database replicates from
    pub upstream: Option<Host>,
    /// Synchronous replica of a primary
    pub downstream: Option<Host>,
}

impl DatabaseConfig {
    /// Configuration for a stopped database
    pub fn none() -> Self {
        Self {
            role: DatabaseRole::None,
            upstream: None,
            downstream: None,
        }
    }

    pub fn primary(downstream: Option<Host>) -> Self {
        Self {
            role: DatabaseRole::Primary,
            upstream: None,
            downstream,
        }
    }

    /// Configuration for a sync or async replica of `upstream`
    pub fn replica(role: DatabaseRole, upstream: Option<Host>) -> Self {
        Self {
            role,
            upstream,
            downstream: None,
        }
    }

    /// Whether the database process must be running under this config
    pub fn wants_online(&self) -> bool {
        self.role != DatabaseRole::None
    }
}

impl fmt::Display for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "role={}", self.role)?;
        if let Some(up) = &self.upstream {
            write!(f, " upstream={}", up.id)?;
        }
        if let Some(down) = &self.downstream {
            write!(f, " downstream={}", down.id)?;
        }
        Ok(())
    }
}

/// Status reported once by the database controller at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    pub online: bool,
    /// Whether a data directory from an earlier life was found
    pub pre_existing_data: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_wire_form() {
        let up = Host::new("node2", "10.0.0.2", "tcp://postgres@10.0.0.2:5432/postgres", "node2");
        let config = DatabaseConfig::replica(DatabaseRole::Async, Some(up));
        let value = serde_json::to_value(&config).unwrap();

        assert_eq!(value["role"], "async");
        assert_eq!(value["upstream"]["id"], "node2");
        assert!(value["downstream"].is_null());
        assert_eq!(config.to_string(), "role=async upstream=node2");
    }

    #[test]
    fn test_wants_online() {
        assert!(!DatabaseConfig::none().wants_online());
        assert!(DatabaseConfig::primary(None).wants_online());
    }
}
