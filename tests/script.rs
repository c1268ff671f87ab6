mod common;

use common::simulator;
use manatee::sim::{parse_script, run_script, SimError};
use manatee::PeerRole;

const FAILOVER_DEMO: &str = include_str!("../demos/failover.json");

#[tokio::test(start_paused = true)]
async fn test_failover_demo_runs_clean() {
    let steps = parse_script(FAILOVER_DEMO).unwrap();
    let mut sim = simulator();

    let outputs = run_script(&mut sim, &steps).await.unwrap();
    assert_eq!(outputs.len(), steps.len());
    assert_eq!(outputs.last().unwrap().command, "pg");

    let peer = sim.peer();
    assert_eq!(peer.role, PeerRole::Deposed);
    assert!(peer.fatal.is_none());
    assert!(sim.shutdown().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_refused_command_stops_the_script() {
    let steps = parse_script(
        r#"[
            {"cmd": "startPeer"},
            {"cmd": "addPeer"},
            {"cmd": "rmPeer", "name": "node1"},
            {"cmd": "echo", "message": "never reached"}
        ]"#,
    )
    .unwrap();
    let mut sim = simulator();

    let err = run_script(&mut sim, &steps).await.unwrap_err();
    assert!(matches!(err, SimError::PeerUnderTest { action: "remove" }));
}

#[tokio::test(start_paused = true)]
async fn test_wait_lets_time_pass_without_rest() {
    let steps = parse_script(
        r#"[
            {"cmd": "startPeer"},
            {"cmd": "addPeer"},
            {"cmd": "addPeer"},
            {"cmd": "freeze"},
            {"cmd": "rmPeer", "name": "node2", "wait": 2000},
            {"cmd": "zk", "wait": 0, "check": {"clusterState": {"generation": 1, "sync": {"id": "node2"}}}},
            {"cmd": "peer", "wait": 0, "check": {"updating": {"kind": "backingOff"}}}
        ]"#,
    )
    .unwrap();
    let mut sim = simulator();

    run_script(&mut sim, &steps).await.unwrap();
}
