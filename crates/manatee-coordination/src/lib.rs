//! # Manatee Coordination
//!
//! The peer state machine that keeps a replicated database cluster's
//! topology consistent through a shared coordination service.
//!
//! ## Architecture
//!
//! - **Peer**: single-threaded actor that evaluates the cluster state and
//!   presence list, assumes roles, and declares new generations
//! - **Takeover**: the fetch, gate, and write sequence behind every new
//!   generation
//! - **Promote**: operator-requested role changes
//! - **Rest**: tracking of outstanding work so callers can wait for quiescence

pub mod client;
pub mod config;
pub mod peer;
pub mod promote;
pub mod rest;
pub mod status;
pub mod takeover;
pub mod types;

pub use client::{CoordinationClient, CoordinationEvent, DatabaseClient, DatabaseEvent};
pub use config::{ConfigError, PeerConfig};
pub use peer::{Peer, PeerHandle};
pub use promote::{PromoteRejection, PromoteRequest, PromoteRole};
pub use rest::{MovingGuard, RestTracker};
pub use status::{DatabaseView, PeerStatus, Updating};
pub use takeover::{GenerationPlan, TakeoverReason};
pub use types::{CoordinationError, DatabaseError, PeerError, TakeoverError};
