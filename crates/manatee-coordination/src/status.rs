//! Introspection snapshots published by a running peer

use crate::takeover::TakeoverReason;
use chrono::{DateTime, Utc};
use manatee_core::{ClusterState, DatabaseConfig, Host, PeerRole};
use serde::Serialize;

/// Cluster-state write the peer is waiting on
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Updating {
    /// Minting a new generation
    Declaring {
        generation: u64,
        reason: TakeoverReason,
    },
    /// Rewriting the async chain within the current generation
    Correcting { asyncs: Vec<String> },
    /// Waiting out the backoff after a failed declaration
    BackingOff { reason: String },
}

/// View of the local database as the peer last saw it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseView {
    pub online: Option<bool>,
    pub pre_existing_data: Option<bool>,
    pub config: Option<DatabaseConfig>,
    pub transitioning: bool,
    pub retry_pending: Option<DateTime<Utc>>,
    /// Replica reported caught up since the peer last became sync
    pub caught_up: bool,
}

/// Snapshot of a peer's runtime state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerStatus {
    pub id: String,
    pub role: PeerRole,
    pub generation: Option<u64>,
    pub cluster_state: Option<ClusterState>,
    pub presence: Vec<Host>,
    pub updating: Option<Updating>,
    pub upstream: Option<Host>,
    pub database: DatabaseView,
    /// Set once the peer has stopped on a fatal error
    pub fatal: Option<String>,
}

impl PeerStatus {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: PeerRole::Unknown,
            generation: None,
            cluster_state: None,
            presence: Vec::new(),
            updating: None,
            upstream: None,
            database: DatabaseView::default(),
            fatal: None,
        }
    }

    /// Ids of the async chain in the peer's view of the cluster state
    pub fn async_ids(&self) -> Vec<&str> {
        self.cluster_state
            .as_ref()
            .map(|s| s.asyncs.iter().map(|h| h.id.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn presence_ids(&self) -> Vec<&str> {
        self.presence.iter().map(|h| h.id.as_str()).collect()
    }
}
