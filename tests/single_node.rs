mod common;

use common::{cluster, host, ids, settle, simulator, singleton_simulator, sync_id};
use manatee::model::{DatabaseConfig, Position};
use manatee::sim::SimError;
use manatee::PeerRole;
use serde_json::json;
use std::time::Duration;

fn single_node_state(primary: u32) -> serde_json::Value {
    json!({
        "generation": 1,
        "primary": host(primary),
        "sync": null,
        "async": [],
        "deposed": [],
        "initWal": "0/00000000",
        "freeze": true,
        "oneNodeWriteMode": true,
    })
}

#[tokio::test(start_paused = true)]
async fn test_singleton_peer_sets_up_single_node_cluster() {
    let mut sim = singleton_simulator();
    sim.start_peer().unwrap();
    settle(&sim).await;

    let state = cluster(&sim);
    assert_eq!(state.generation, 1);
    assert_eq!(state.primary.id, "node1");
    assert!(state.sync.is_none());
    assert!(state.asyncs.is_empty());
    assert!(state.is_single_node());
    assert!(state.is_frozen());
    assert_eq!(state.init_wal, Position::initial());

    let peer = sim.peer();
    assert_eq!(peer.role, PeerRole::Primary);
    assert_eq!(peer.database.config, Some(DatabaseConfig::primary(None)));
    assert_eq!(peer.database.online, Some(true));

    // a singleton primary never brings in another peer
    sim.add_peer(None).unwrap();
    settle(&sim).await;
    let state = cluster(&sim);
    assert_eq!(state.generation, 1);
    assert!(state.sync.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_single_node_cluster_upgrades_to_normal_mode() {
    let mut sim = simulator();
    let state = sim.set_cluster_state(&single_node_state(1)).unwrap();
    assert!(state.is_single_node());
    sim.start_peer().unwrap();
    settle(&sim).await;

    let peer = sim.peer();
    assert_eq!(peer.role, PeerRole::Primary);
    assert_eq!(peer.database.config, Some(DatabaseConfig::primary(None)));

    sim.unfreeze().unwrap();
    sim.advance(Duration::from_millis(1000)).await.unwrap();
    settle(&sim).await;
    let state = cluster(&sim);
    assert_eq!(state.generation, 1);
    assert!(!state.is_frozen());

    sim.add_peer(None).unwrap();
    settle(&sim).await;

    let state = cluster(&sim);
    assert_eq!(state.generation, 2);
    assert_eq!(state.primary.id, "node1");
    assert_eq!(sync_id(&state), Some("node2"));
    assert!(state.asyncs.is_empty());
    assert!(!state.is_single_node());
    assert_eq!(state.single_node_mode, None);
    assert_eq!(state.init_wal, Position::new(0, 10));
    assert_eq!(
        sim.peer().database.config,
        Some(DatabaseConfig::primary(Some(host(2))))
    );

    // normal-mode reconfiguration afterwards
    sim.add_peer(None).unwrap();
    settle(&sim).await;
    sim.rm_peer("node2").unwrap();
    settle(&sim).await;
    sim.add_peer(Some("node2")).unwrap();
    settle(&sim).await;

    let state = cluster(&sim);
    assert_eq!(state.generation, 3);
    assert_eq!(sync_id(&state), Some("node3"));
    assert_eq!(ids(&state.asyncs), vec!["node2"]);
    assert_eq!(state.init_wal, Position::new(0, 20));
    assert_eq!(sim.peer().presence_ids(), vec!["node1", "node3", "node2"]);
}

#[tokio::test(start_paused = true)]
async fn test_frozen_single_node_cluster_stays_put() {
    let mut sim = simulator();
    sim.set_cluster_state(&single_node_state(1)).unwrap();
    sim.start_peer().unwrap();
    settle(&sim).await;

    sim.add_peer(None).unwrap();
    sim.advance(Duration::from_secs(3)).await.unwrap();
    let state = cluster(&sim);
    assert_eq!(state.generation, 1);
    assert!(state.is_single_node());

    sim.unfreeze().unwrap();
    settle(&sim).await;
    assert_eq!(cluster(&sim).generation, 2);
}

#[tokio::test(start_paused = true)]
async fn test_singleton_peer_defers_to_another_primary() {
    let mut sim = singleton_simulator();
    sim.add_peer(None).unwrap();
    sim.set_cluster_state(&single_node_state(2)).unwrap();
    sim.start_peer().unwrap();
    settle(&sim).await;

    let peer = sim.peer();
    assert_eq!(peer.role, PeerRole::Unassigned);
    assert_eq!(peer.presence_ids(), vec!["node2", "node1"]);
    assert_eq!(peer.database.config, Some(DatabaseConfig::none()));
    assert_eq!(peer.database.online, Some(false));

    sim.rm_peer("node2").unwrap();
    settle(&sim).await;

    let peer = sim.peer();
    assert_eq!(peer.role, PeerRole::Unassigned);
    assert_eq!(peer.presence_ids(), vec!["node1"]);
    assert_eq!(cluster(&sim).generation, 1);
}

#[tokio::test(start_paused = true)]
async fn test_singleton_peer_rejects_normal_cluster() {
    let mut sim = singleton_simulator();
    sim.add_peer(None).unwrap();
    sim.add_peer(None).unwrap();
    sim.bootstrap(Some("node2"), Some("node3")).unwrap();
    sim.start_peer().unwrap();

    let err = sim.wait_for_rest().await.unwrap_err();
    assert!(matches!(err, SimError::PeerFailed(_)));
    assert!(sim.peer().fatal.is_some());
    assert!(matches!(sim.shutdown().await, Err(SimError::PeerFailed(_))));
}
