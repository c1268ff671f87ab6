use manatee_coordination::ConfigError;
use manatee_core::{PositionError, ValidationError};
use std::time::Duration;
use thiserror::Error;

/// Simulator command failures
#[derive(Debug, Error)]
pub enum SimError {
    #[error("peer already exists: \"{0}\"")]
    PeerExists(String),

    #[error("peer not present: \"{0}\"")]
    PeerNotPresent(String),

    #[error("cannot {action} the peer under test")]
    PeerUnderTest { action: &'static str },

    #[error("removing \"{0}\" would require a simulated peer to take over (try depose)")]
    WouldRequireTakeover(String),

    #[error("cluster is already set up")]
    AlreadySetUp,

    #[error("cluster is not yet set up (see bootstrap)")]
    NotSetUp,

    #[error("need at least two peers for setup")]
    TooFewPeers,

    #[error("requested {role} \"{id}\" not found")]
    UnknownPeer { role: &'static str, id: String },

    #[error("cannot depose with no asyncs")]
    NoAsyncs,

    #[error("cannot depose a single-node cluster")]
    SingleNodeMode,

    #[error("peer \"{0}\" is not deposed")]
    NotDeposed(String),

    #[error("peer under test was already started")]
    AlreadyStarted,

    #[error("peer under test has not been started")]
    NotStarted,

    #[error("invalid peer config: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid cluster state: {0}")]
    Validation(#[from] ValidationError),

    #[error("position error: {0}")]
    Position(#[from] PositionError),

    #[error("encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("peer failed: {0}")]
    PeerFailed(String),

    #[error("not at rest after {0:?}")]
    Timeout(Duration),

    #[error("step {step}: {message}")]
    CheckFailed { step: usize, message: String },
}
