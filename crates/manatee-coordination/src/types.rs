//! Error types for the peer protocol

use manatee_core::{Position, ValidationError};
use thiserror::Error;

/// Failure reported by the coordination-service client
#[derive(Debug, Clone, Error)]
pub enum CoordinationError {
    #[error("coordination service unavailable: {0}")]
    Unavailable(String),

    #[error("cluster state write rejected: {0}")]
    Rejected(String),
}

/// Failure reported by the database controller
#[derive(Debug, Clone, Error)]
pub enum DatabaseError {
    #[error("database {operation} failed: {reason}")]
    OperationFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("database is offline")]
    Offline,
}

/// Why an attempt to declare a new generation did not complete
#[derive(Debug, Error)]
pub enum TakeoverError {
    #[error("cluster is frozen")]
    Frozen,

    #[error("local database unavailable: {0}")]
    DatabaseOffline(String),

    #[error("not caught up: local position {position} is behind {required}")]
    NotCaughtUp {
        position: Position,
        required: Position,
    },

    #[error("failed to write cluster state: {0}")]
    WriteFailed(#[from] CoordinationError),

    /// The peer assembled a state that fails validation
    #[error("proposed cluster state is invalid: {0}")]
    Invalid(#[from] ValidationError),
}

impl TakeoverError {
    /// Everything except a self-built invalid state is retried after a backoff
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }
}

/// Conditions that stop a peer for good
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("rejected payload: {0}")]
    Validation(#[from] ValidationError),

    #[error("configured for single-node mode but cluster generation {generation} is not")]
    SingleNodeMismatch { generation: u64 },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("declared invalid cluster state: {0}")]
    InvalidProposal(ValidationError),

    #[error("peer is no longer running")]
    Stopped,
}
