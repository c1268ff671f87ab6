//! Boundaries to the coordination service and the local database
//!
//! Both collaborators push events into the peer through its
//! [`PeerHandle`](crate::PeerHandle) and accept commands through the traits
//! below. Event payloads arrive raw and are validated by the peer.

use crate::types::{CoordinationError, DatabaseError};
use manatee_core::{ClusterState, DatabaseConfig, Position};
use serde_json::Value;

/// Sink for cluster-state writes
#[async_trait::async_trait]
pub trait CoordinationClient: Send + Sync + 'static {
    /// Replace the cluster state with `state` in one round trip
    async fn put_cluster_state(&self, state: ClusterState) -> Result<(), CoordinationError>;
}

/// Control surface of the local database
#[async_trait::async_trait]
pub trait DatabaseClient: Send + Sync + 'static {
    /// Push a replication configuration
    async fn reconfigure(&self, config: DatabaseConfig) -> Result<(), DatabaseError>;

    /// Start the database process
    async fn start(&self) -> Result<(), DatabaseError>;

    /// Stop the database process
    async fn stop(&self) -> Result<(), DatabaseError>;

    /// Read the current write-ahead log position
    async fn fetch_replication_position(&self) -> Result<Position, DatabaseError>;
}

/// Events emitted by the coordination-service client
#[derive(Debug, Clone)]
pub enum CoordinationEvent {
    /// Delivered once, with the current state (if any) and presence list
    Init {
        cluster_state: Option<Value>,
        presence: Value,
    },
    PresenceChanged(Value),
    ClusterStateChanged(Value),
}

impl CoordinationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::PresenceChanged(_) => "presenceChanged",
            Self::ClusterStateChanged(_) => "clusterStateChanged",
        }
    }
}

/// Events emitted by the database controller
#[derive(Debug, Clone)]
pub enum DatabaseEvent {
    /// Delivered once with `{online, preExistingData}`
    Init(Value),
    /// The local replica has replayed up to its upstream's position
    CaughtUp,
}

impl DatabaseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::CaughtUp => "caughtUp",
        }
    }
}
