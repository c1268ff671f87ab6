//! Boundary checks for payloads received from collaborators
//!
//! Every payload a peer acts on passes through one of these functions first.
//! They return owned values, so nothing the caller keeps aliases the raw
//! payload. A rejection means an incompatible peer or a bug, and callers
//! treat it as fatal.

use crate::cluster_state::ClusterState;
use crate::database::DatabaseStatus;
use crate::host::Host;
use crate::invariants::{self, TopologyViolation};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Rejection of an externally supplied payload
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed {kind}: {source}")]
    Schema {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("inconsistent {kind}: {violation}")]
    Topology {
        kind: &'static str,
        violation: TopologyViolation,
    },
}

fn parse<'a, T: Deserialize<'a>>(kind: &'static str, raw: &'a Value) -> Result<T, ValidationError> {
    T::deserialize(raw).map_err(|source| ValidationError::Schema { kind, source })
}

/// Validate a cluster-state payload.
///
/// Beyond the structural shape this enforces that a null sync only appears
/// in single-node mode and that `initWal` is a parseable position. A missing
/// `deposed` list is read as empty.
pub fn validate_cluster_state(raw: &Value) -> Result<ClusterState, ValidationError> {
    let state: ClusterState = parse("cluster state", raw)?;
    check_cluster_state(&state)?;
    debug!(generation = state.generation, "cluster state validated");
    Ok(state)
}

/// Semantic checks on an already typed cluster state
pub fn check_cluster_state(state: &ClusterState) -> Result<(), ValidationError> {
    invariants::check_topology(state).map_err(|violation| ValidationError::Topology {
        kind: "cluster state",
        violation,
    })
}

/// Validate the list of peers currently registered with the coordination service.
pub fn validate_presence_list(raw: &Value) -> Result<Vec<Host>, ValidationError> {
    let hosts: Vec<Host> = parse("presence list", raw)?;
    invariants::check_unique(&hosts).map_err(|violation| ValidationError::Topology {
        kind: "presence list",
        violation,
    })?;
    Ok(hosts)
}

/// Validate the startup status reported by the database controller.
pub fn validate_database_status(raw: &Value) -> Result<DatabaseStatus, ValidationError> {
    parse("database status", raw)
}
