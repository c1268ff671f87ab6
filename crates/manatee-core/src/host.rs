//! Peer identity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one peer (one database node) in the cluster.
///
/// Hosts are compared by `id` wherever topology membership is checked;
/// the remaining fields describe how to reach the peer's database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// Unique peer identifier
    pub id: String,
    /// Address the peer registered with
    pub ip: String,
    /// Connection string of the peer's database
    pub pg_url: String,
    /// Availability zone the peer runs in
    pub zone_id: String,
}

impl Host {
    pub fn new(
        id: impl Into<String>,
        ip: impl Into<String>,
        pg_url: impl Into<String>,
        zone_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            ip: ip.into(),
            pg_url: pg_url.into(),
            zone_id: zone_id.into(),
        }
    }

    /// Identity comparison, ignoring connection details
    pub fn same_peer(&self, other: &Host) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Returns the index of the host with `id` in `hosts`, if any.
pub fn position_of(hosts: &[Host], id: &str) -> Option<usize> {
    hosts.iter().position(|h| h.id == id)
}

/// Whether a host with `id` is a member of `hosts`.
pub fn contains(hosts: &[Host], id: &str) -> bool {
    position_of(hosts, id).is_some()
}
