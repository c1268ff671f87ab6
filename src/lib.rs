//! # Manatee
//!
//! Peer state machine for a replicated PostgreSQL cluster coordinated
//! through a strongly consistent coordination service.
//!
//! Every database node runs one [`Peer`]. Peers never talk to each other:
//! they observe the same cluster state and presence list and react to them
//! deterministically, so exactly one of them acts on any given change.
//!
//! - [`model`]: hosts, replication positions, the cluster-state record and
//!   its validators
//! - [`coordination`]: the peer, the generation-declaration protocol and the
//!   collaborator traits
//! - [`sim`]: simulated collaborators and a scripted simulator

pub use manatee_coordination as coordination;
pub use manatee_core as model;
pub use manatee_sim as sim;

pub use manatee_coordination::{Peer, PeerConfig, PeerError, PeerHandle, PeerStatus};
pub use manatee_core::{ClusterState, Host, PeerRole, Position};
pub use manatee_sim::{SimConfig, Simulator};
