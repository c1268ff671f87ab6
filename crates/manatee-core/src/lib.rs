//! # Manatee Core
//!
//! Data model shared by every manatee peer: host identities, replication
//! positions, the cluster-state record written to the coordination service,
//! and the validators that gate every payload a peer acts on.

pub mod cluster_state;
pub mod database;
pub mod host;
pub mod invariants;
pub mod position;
pub mod role;
pub mod validation;

pub use cluster_state::{ClusterState, FreezeMarker};
pub use database::{DatabaseConfig, DatabaseRole, DatabaseStatus};
pub use host::Host;
pub use invariants::TopologyViolation;
pub use position::{Position, PositionError};
pub use role::PeerRole;
pub use validation::{
    validate_cluster_state, validate_database_status, validate_presence_list, ValidationError,
};
