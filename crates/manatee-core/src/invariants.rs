//! Topology invariants every cluster state must satisfy

use crate::cluster_state::ClusterState;
use crate::host::Host;
use std::collections::HashSet;
use std::fmt;

/// Ways a cluster state can contradict itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyViolation {
    /// Generation numbers start at 1
    ZeroGeneration,
    /// A null sync is only allowed in single-node mode
    MissingSync,
    /// The primary also appears as sync
    PrimaryIsSync { id: String },
    /// A peer holds more than one place in the topology
    DuplicatePlacement { id: String },
}

impl fmt::Display for TopologyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroGeneration => write!(f, "generation must be at least 1"),
            Self::MissingSync => {
                write!(f, "sync may only be null when singleNodeMode is set")
            }
            Self::PrimaryIsSync { id } => {
                write!(f, "peer {} is both primary and sync", id)
            }
            Self::DuplicatePlacement { id } => {
                write!(f, "peer {} appears more than once in the topology", id)
            }
        }
    }
}

impl std::error::Error for TopologyViolation {}

/// Check the structural relationships between roles in `state`.
///
/// Every peer may occupy at most one of primary, sync, an async slot or a
/// deposed slot.
pub fn check_topology(state: &ClusterState) -> Result<(), TopologyViolation> {
    if state.generation == 0 {
        return Err(TopologyViolation::ZeroGeneration);
    }

    if state.sync.is_none() && !state.is_single_node() {
        return Err(TopologyViolation::MissingSync);
    }

    if let Some(sync) = &state.sync {
        if sync.same_peer(&state.primary) {
            return Err(TopologyViolation::PrimaryIsSync {
                id: sync.id.clone(),
            });
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let placed = std::iter::once(&state.primary)
        .chain(state.sync.iter())
        .chain(state.asyncs.iter())
        .chain(state.deposed.iter());

    for host in placed {
        if !seen.insert(host.id.as_str()) {
            return Err(TopologyViolation::DuplicatePlacement {
                id: host.id.clone(),
            });
        }
    }

    Ok(())
}

/// Reject lists that name the same peer twice.
pub fn check_unique(hosts: &[Host]) -> Result<(), TopologyViolation> {
    let mut seen = HashSet::new();
    for host in hosts {
        if !seen.insert(host.id.as_str()) {
            return Err(TopologyViolation::DuplicatePlacement {
                id: host.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;

    fn host(id: &str) -> Host {
        Host::new(id, "10.0.0.1", format!("tcp://{id}"), id)
    }

    fn state() -> ClusterState {
        ClusterState {
            generation: 1,
            primary: host("a"),
            sync: Some(host("b")),
            asyncs: vec![host("c")],
            deposed: vec![host("d")],
            init_wal: Position::initial(),
            freeze: None,
            single_node_mode: None,
            promote: None,
        }
    }

    #[test]
    fn test_valid_topology() {
        assert!(check_topology(&state()).is_ok());
    }

    #[test]
    fn test_violations() {
        let mut s = state();
        s.sync = None;
        assert_eq!(check_topology(&s), Err(TopologyViolation::MissingSync));
        s.single_node_mode = Some(true);
        assert!(check_topology(&s).is_ok());

        let mut s = state();
        s.asyncs.push(host("a"));
        assert_eq!(
            check_topology(&s),
            Err(TopologyViolation::DuplicatePlacement { id: "a".into() })
        );

        let mut s = state();
        s.deposed.push(host("c"));
        assert!(matches!(
            check_topology(&s),
            Err(TopologyViolation::DuplicatePlacement { .. })
        ));

        let mut s = state();
        s.sync = Some(host("a"));
        assert!(matches!(
            check_topology(&s),
            Err(TopologyViolation::PrimaryIsSync { .. })
        ));

        let mut s = state();
        s.generation = 0;
        assert_eq!(check_topology(&s), Err(TopologyViolation::ZeroGeneration));
    }
}
