//! The cluster-state record shared through the coordination service
//!
//! A [`ClusterState`] is written as one atomic value and is never edited in
//! place: peers that want a different topology build a complete new record.

use crate::host::{self, Host};
use crate::position::Position;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Operator-imposed lock on topology changes.
///
/// Operators write either a bare boolean or an object carrying a `date` and
/// a `reason`. Any object counts as frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FreezeMarker {
    Flag(bool),
    Note(Map<String, Value>),
}

impl FreezeMarker {
    /// A marker recording when and why the cluster was frozen
    pub fn note(reason: impl Into<String>) -> Self {
        let mut note = Map::new();
        note.insert("date".into(), Value::String(chrono::Utc::now().to_rfc3339()));
        note.insert("reason".into(), Value::String(reason.into()));
        Self::Note(note)
    }

    pub fn is_frozen(&self) -> bool {
        match self {
            Self::Flag(frozen) => *frozen,
            Self::Note(_) => true,
        }
    }
}

/// Versioned record of cluster topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterState {
    /// Monotonic generation number, starting at 1
    pub generation: u64,
    /// Peer accepting writes
    pub primary: Host,
    /// Synchronous replica; absent only in single-node mode
    #[serde(default)]
    pub sync: Option<Host>,
    /// Asynchronous replicas in chain order, nearest to the sync first
    #[serde(rename = "async")]
    pub asyncs: Vec<Host>,
    /// Former primaries barred from any role until rebuilt
    #[serde(default)]
    pub deposed: Vec<Host>,
    /// Replication position at which this generation began
    pub init_wal: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeze: Option<FreezeMarker>,
    #[serde(
        default,
        rename = "singleNodeMode",
        alias = "oneNodeWriteMode",
        skip_serializing_if = "Option::is_none"
    )]
    pub single_node_mode: Option<bool>,
    /// Pending operator promotion request, interpreted by the peers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promote: Option<Value>,
}

impl ClusterState {
    /// Whether a freeze marker blocks generation changes
    pub fn is_frozen(&self) -> bool {
        self.freeze.as_ref().map_or(false, FreezeMarker::is_frozen)
    }

    pub fn is_single_node(&self) -> bool {
        self.single_node_mode == Some(true)
    }

    pub fn is_primary(&self, id: &str) -> bool {
        self.primary.id == id
    }

    pub fn is_sync(&self, id: &str) -> bool {
        self.sync.as_ref().map_or(false, |s| s.id == id)
    }

    pub fn is_deposed(&self, id: &str) -> bool {
        host::contains(&self.deposed, id)
    }

    pub fn async_index(&self, id: &str) -> Option<usize> {
        host::position_of(&self.asyncs, id)
    }

    /// Replication source for the async at `index`: the sync for the head
    /// of the chain, otherwise the async just ahead of it.
    pub fn upstream_of_async(&self, index: usize) -> Option<&Host> {
        match index {
            0 => self.sync.as_ref(),
            i => self.asyncs.get(i - 1),
        }
    }

    /// Whether `id` holds any place in the topology
    pub fn accounts_for(&self, id: &str) -> bool {
        self.is_primary(id)
            || self.is_sync(id)
            || self.is_deposed(id)
            || self.async_index(id).is_some()
    }

    /// Same-generation copy with only the async chain replaced
    pub fn with_asyncs(&self, asyncs: Vec<Host>) -> Self {
        Self {
            asyncs,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host(n: u32) -> Value {
        json!({
            "id": format!("node{n}"),
            "ip": format!("10.0.0.{n}"),
            "pgUrl": format!("tcp://postgres@10.0.0.{n}:5432/postgres"),
            "zoneId": format!("node{n}"),
        })
    }

    #[test]
    fn test_wire_format() {
        let raw = json!({
            "generation": 3,
            "primary": host(1),
            "sync": host(2),
            "async": [host(3), host(4)],
            "deposed": [host(5)],
            "initWal": "0/0000000a",
            "freeze": { "date": "2014-01-01T00:00:00Z", "reason": "maintenance" },
        });
        let state: ClusterState = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(state.generation, 3);
        assert!(state.is_frozen());
        assert!(!state.is_single_node());
        assert_eq!(state.async_index("node4"), Some(1));
        assert_eq!(state.upstream_of_async(0).unwrap().id, "node2");
        assert_eq!(state.upstream_of_async(1).unwrap().id, "node3");
        assert!(state.accounts_for("node5"));
        assert!(!state.accounts_for("node6"));

        assert_eq!(serde_json::to_value(&state).unwrap(), raw);
    }

    #[test]
    fn test_single_node_flag_names() {
        let legacy = json!({
            "generation": 1,
            "primary": host(1),
            "sync": null,
            "async": [],
            "initWal": "0/00000000",
            "oneNodeWriteMode": true,
            "freeze": true,
        });
        let state: ClusterState = serde_json::from_value(legacy).unwrap();
        assert!(state.is_single_node());
        assert!(state.deposed.is_empty());

        let written = serde_json::to_value(&state).unwrap();
        assert_eq!(written["singleNodeMode"], true);
        assert!(written.get("oneNodeWriteMode").is_none());
        assert_eq!(written["sync"], Value::Null);
    }

    #[test]
    fn test_freeze_flag_false_is_not_frozen() {
        assert!(!FreezeMarker::Flag(false).is_frozen());
        assert!(FreezeMarker::Flag(true).is_frozen());
        assert!(FreezeMarker::note("operator").is_frozen());
    }
}
