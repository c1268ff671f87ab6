#![allow(dead_code)]

use manatee::model::{ClusterState, Host};
use manatee::{PeerConfig, SimConfig, Simulator};

pub fn simulator() -> Simulator {
    Simulator::new(PeerConfig::default(), SimConfig::default()).unwrap()
}

pub fn singleton_simulator() -> Simulator {
    Simulator::new(PeerConfig::singleton(), SimConfig::default()).unwrap()
}

/// Identity the simulator gives its `n`-th peer
pub fn host(n: u32) -> Host {
    Host::new(
        format!("node{n}"),
        format!("10.0.0.{n}"),
        format!("tcp://postgres@10.0.0.{n}:5432/postgres"),
        format!("node{n}"),
    )
}

pub fn ids(hosts: &[Host]) -> Vec<&str> {
    hosts.iter().map(|h| h.id.as_str()).collect()
}

pub fn sync_id(state: &ClusterState) -> Option<&str> {
    state.sync.as_ref().map(|s| s.id.as_str())
}

pub fn cluster(sim: &Simulator) -> ClusterState {
    sim.cluster_state().expect("cluster state should be set")
}

pub async fn settle(sim: &Simulator) {
    sim.wait_for_rest().await.unwrap();
}
