//! Single-peer cluster simulator
//!
//! Runs one real [`Peer`] (the peer under test, `node1`) against the
//! simulated collaborators. The caller plays every other peer and the
//! operator: peers come and go from the presence list, and cluster states
//! that would be written by other peers are set directly.

use crate::config::SimConfig;
use crate::coordination::SimCoordination;
use crate::database::{SimDatabase, SimDatabaseStatus};
use crate::error::SimError;
use chrono::Utc;
use manatee_coordination::{
    DatabaseEvent, Peer, PeerConfig, PeerError, PeerHandle, PeerStatus, RestTracker,
};
use manatee_core::{host, validate_cluster_state, ClusterState, FreezeMarker, Host, Position};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const FREEZE_NOTE: &str = "frozen by simulator";

/// Identity of the `which`-th simulated peer
fn peer_ident(which: u32, name: Option<&str>) -> Host {
    let id = name.map_or_else(|| format!("node{which}"), str::to_string);
    let ip = format!("10.0.0.{which}");
    let pg_url = format!("tcp://postgres@{ip}:5432/postgres");
    Host::new(id.clone(), ip, pg_url, id)
}

pub struct Simulator {
    config: SimConfig,
    ident: Host,
    tracker: RestTracker,
    zk: SimCoordination,
    database: SimDatabase,
    handle: PeerHandle,
    task: JoinHandle<Result<(), PeerError>>,
    idents: HashMap<String, Host>,
    next_peer: u32,
    started: bool,
}

impl Simulator {
    /// Build the simulated cluster and spawn the peer under test.
    ///
    /// The peer stays idle until [`start_peer`](Self::start_peer).
    pub fn new(peer_config: PeerConfig, config: SimConfig) -> Result<Self, SimError> {
        peer_config.validate()?;

        let tracker = RestTracker::new();
        let ident = peer_ident(1, None);
        let zk = SimCoordination::new(tracker.clone(), config.clone());
        let database = SimDatabase::new(ident.id.clone(), config.clone());

        let (peer, handle) = Peer::new(
            ident.clone(),
            peer_config,
            Arc::new(zk.client()),
            Arc::new(database.clone()),
            tracker.clone(),
        );
        zk.register(ident.clone(), handle.clone());
        let task = peer.spawn();

        let mut idents = HashMap::new();
        idents.insert(ident.id.clone(), ident.clone());

        Ok(Self {
            config,
            ident,
            tracker,
            zk,
            database,
            handle,
            task,
            idents,
            next_peer: 2,
            started: false,
        })
    }

    fn create_ident(&mut self, name: Option<&str>) -> Host {
        let ident = peer_ident(self.next_peer, name);
        self.next_peer += 1;
        self.idents.insert(ident.id.clone(), ident.clone());
        ident
    }

    fn current_state(&self) -> Result<ClusterState, SimError> {
        self.zk.cluster_state().ok_or(SimError::NotSetUp)
    }

    /// Bring a peer into the presence list.
    ///
    /// A name seen before reuses its earlier identity. When the primary is a
    /// simulated peer it appends the newcomer to the async chain, as a real
    /// primary would.
    pub fn add_peer(&mut self, name: Option<&str>) -> Result<Vec<Host>, SimError> {
        let known = name.and_then(|n| self.idents.get(n)).cloned();
        let ident = match known {
            Some(ident) => ident,
            None => self.create_ident(name),
        };

        if !self.zk.peer_joined(ident.clone()) {
            return Err(SimError::PeerExists(ident.id));
        }
        info!(peer = %ident, "added peer");

        if let Some(mut state) = self.zk.cluster_state() {
            let simulated_primary = !state.is_primary(&self.ident.id);
            if simulated_primary && state.sync.is_some() && !state.accounts_for(&ident.id) {
                debug!(peer = %ident, "simulated primary appends peer to async chain");
                state.asyncs.push(ident);
                self.zk.set_cluster_state(state);
            }
        }

        Ok(self.zk.presence())
    }

    /// Drop a peer from the presence list.
    ///
    /// Refuses to remove the peer under test, or a peer whose loss would
    /// need a simulated peer to take over.
    pub fn rm_peer(&self, name: &str) -> Result<Vec<Host>, SimError> {
        if name == self.ident.id {
            return Err(SimError::PeerUnderTest { action: "remove" });
        }

        if let Some(state) = self.zk.cluster_state() {
            let single = state.is_single_node();
            let primary_loses_sync =
                !single && !state.is_primary(&self.ident.id) && state.is_sync(name);
            let sync_loses_primary =
                !single && !state.is_sync(&self.ident.id) && state.is_primary(name);
            if primary_loses_sync || sync_loses_primary {
                return Err(SimError::WouldRequireTakeover(name.to_string()));
            }
        }

        if !self.zk.peer_removed(name) {
            return Err(SimError::PeerNotPresent(name.to_string()));
        }
        info!(peer = name, "removed peer");
        Ok(self.zk.presence())
    }

    /// Write an arbitrary cluster state after validating it
    pub fn set_cluster_state(&self, raw: &Value) -> Result<ClusterState, SimError> {
        let state = validate_cluster_state(raw)?;
        self.zk.set_cluster_state(state.clone());
        Ok(state)
    }

    /// Write generation 1 as another peer would.
    ///
    /// Defaults to the first present peer as primary and the next as sync.
    pub fn bootstrap(
        &self,
        primary: Option<&str>,
        sync: Option<&str>,
    ) -> Result<ClusterState, SimError> {
        if self.zk.cluster_state().is_some() {
            return Err(SimError::AlreadySetUp);
        }

        let peers = self.zk.presence();
        if peers.len() < 2 {
            return Err(SimError::TooFewPeers);
        }

        let primary = pick(&peers, primary, "primary")?;
        let others: Vec<Host> = peers
            .into_iter()
            .filter(|h| !h.same_peer(&primary))
            .collect();
        let sync = pick(&others, sync, "sync")?;
        let asyncs = others
            .into_iter()
            .filter(|h| !h.same_peer(&sync))
            .collect();

        let state = ClusterState {
            generation: 1,
            primary,
            sync: Some(sync),
            asyncs,
            deposed: Vec::new(),
            init_wal: Position::initial(),
            freeze: None,
            single_node_mode: None,
            promote: None,
        };
        info!(primary = %state.primary, "bootstrapped cluster");
        self.zk.set_cluster_state(state.clone());
        Ok(state)
    }

    /// Operator-style failover: the sync becomes primary, the head of the
    /// async chain becomes sync and the old primary is deposed.
    pub fn depose(&self) -> Result<ClusterState, SimError> {
        let current = self.current_state()?;
        let Some(sync) = current.sync.clone() else {
            return Err(SimError::SingleNodeMode);
        };
        let Some((next_sync, rest)) = current.asyncs.split_first() else {
            return Err(SimError::NoAsyncs);
        };

        let mut deposed = current.deposed.clone();
        deposed.push(current.primary.clone());

        let state = ClusterState {
            generation: current.generation + 1,
            primary: sync,
            sync: Some(next_sync.clone()),
            asyncs: rest.to_vec(),
            deposed,
            init_wal: current.init_wal.increment(self.config.position_step)?,
            freeze: None,
            single_node_mode: None,
            promote: None,
        };
        info!(generation = state.generation, primary = %state.primary, "deposed primary");
        self.zk.set_cluster_state(state.clone());
        Ok(state)
    }

    /// Clear a peer from the deposed list; a simulated primary also adds it
    /// back to the async chain.
    pub fn rebuild(&self, name: &str) -> Result<ClusterState, SimError> {
        if name == self.ident.id {
            return Err(SimError::PeerUnderTest { action: "rebuild" });
        }

        let mut state = self.current_state()?;
        let index = host::position_of(&state.deposed, name)
            .ok_or_else(|| SimError::NotDeposed(name.to_string()))?;
        let peer = state.deposed.remove(index);
        if !state.is_primary(&self.ident.id) {
            state.asyncs.push(peer);
        }

        info!(peer = name, "rebuilt peer");
        self.zk.set_cluster_state(state.clone());
        Ok(state)
    }

    pub fn freeze(&self) -> Result<ClusterState, SimError> {
        let mut state = self.current_state()?;
        state.freeze = Some(FreezeMarker::note(FREEZE_NOTE));
        self.zk.set_cluster_state(state.clone());
        Ok(state)
    }

    pub fn unfreeze(&self) -> Result<ClusterState, SimError> {
        let mut state = self.current_state()?;
        state.freeze = None;
        self.zk.set_cluster_state(state.clone());
        Ok(state)
    }

    /// Attach an operator promotion request for the current generation
    pub fn request_promotion(
        &self,
        id: &str,
        role: &str,
        async_index: Option<usize>,
        expire_in: chrono::Duration,
    ) -> Result<ClusterState, SimError> {
        let mut state = self.current_state()?;
        let mut request = json!({
            "id": id,
            "role": role,
            "generation": state.generation,
            "expireTime": (Utc::now() + expire_in).to_rfc3339(),
        });
        if let Some(index) = async_index {
            request["asyncIndex"] = json!(index);
        }
        info!(%request, "requesting promotion");
        state.promote = Some(request);
        self.zk.set_cluster_state(state.clone());
        Ok(state)
    }

    /// Move the local database past the current `initWal` and report it
    /// to the peer under test
    pub fn catch_up(&self) -> Result<(), SimError> {
        if !self.started {
            return Err(SimError::NotStarted);
        }
        let state = self.current_state()?;
        self.database.catch_up(state.init_wal)?;
        self.handle
            .database_event(DatabaseEvent::CaughtUp)
            .map_err(|e| SimError::PeerFailed(e.to_string()))
    }

    /// Join the peer under test to the cluster and deliver both `init` events
    pub fn start_peer(&mut self) -> Result<(), SimError> {
        if self.started {
            return Err(SimError::AlreadyStarted);
        }
        self.started = true;

        self.zk.peer_joined(self.ident.clone());
        self.zk.start_client(&self.ident.id);

        let moving = self.tracker.moving();
        let handle = self.handle.clone();
        let status = self.database.init_status();
        let delay = self.config.init_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if handle.database_event(DatabaseEvent::Init(status)).is_err() {
                debug!("peer stopped before database init");
            }
            drop(moving);
        });
        Ok(())
    }

    pub fn ident(&self) -> &Host {
        &self.ident
    }

    pub fn peer(&self) -> PeerStatus {
        self.handle.status()
    }

    pub fn cluster_state(&self) -> Option<ClusterState> {
        self.zk.cluster_state()
    }

    pub fn presence(&self) -> Vec<Host> {
        self.zk.presence()
    }

    pub fn database(&self) -> SimDatabaseStatus {
        self.database.status()
    }

    pub fn tracker(&self) -> &RestTracker {
        &self.tracker
    }

    /// Wait until nothing is outstanding, failing if the peer died
    pub async fn wait_for_rest(&self) -> Result<(), SimError> {
        let timeout = self.config.rest_timeout;
        tokio::time::timeout(timeout, self.tracker.wait_for_rest())
            .await
            .map_err(|_| SimError::Timeout(timeout))?;
        self.check_peer()
    }

    /// Let simulated time pass without waiting for rest
    pub async fn advance(&self, duration: Duration) -> Result<(), SimError> {
        tokio::time::sleep(duration).await;
        self.check_peer()
    }

    fn check_peer(&self) -> Result<(), SimError> {
        match self.handle.status().fatal {
            Some(message) => Err(SimError::PeerFailed(message)),
            None => Ok(()),
        }
    }

    /// Stop the peer under test and report how it ended
    pub async fn shutdown(self) -> Result<(), SimError> {
        if self.handle.shutdown().is_err() {
            debug!("peer already stopped");
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(SimError::PeerFailed(err.to_string())),
            Err(err) => Err(SimError::PeerFailed(err.to_string())),
        }
    }
}

/// The peer named `wanted`, or the first one
fn pick(peers: &[Host], wanted: Option<&str>, role: &'static str) -> Result<Host, SimError> {
    let found = match wanted {
        Some(id) => peers.iter().find(|h| h.id == id),
        None => peers.first(),
    };
    found.cloned().ok_or_else(|| SimError::UnknownPeer {
        role,
        id: wanted.unwrap_or_default().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator() -> Simulator {
        Simulator::new(PeerConfig::default(), SimConfig::default()).unwrap()
    }

    fn ids(hosts: &[Host]) -> Vec<&str> {
        hosts.iter().map(|h| h.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_peer_identities() {
        let mut sim = simulator();
        assert!(sim.presence().is_empty());
        assert_eq!(sim.ident().pg_url, "tcp://postgres@10.0.0.1:5432/postgres");

        let presence = sim.add_peer(None).unwrap();
        assert_eq!(presence[0].id, "node2");
        assert_eq!(presence[0].ip, "10.0.0.2");
        assert_eq!(presence[0].zone_id, "node2");

        sim.rm_peer("node2").unwrap();
        let presence = sim.add_peer(Some("node2")).unwrap();
        assert_eq!(presence, vec![peer_ident(2, None)]);
        assert!(matches!(sim.add_peer(Some("node2")), Err(SimError::PeerExists(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_choices() {
        let mut sim = simulator();
        sim.add_peer(None).unwrap();
        assert!(matches!(sim.bootstrap(None, None), Err(SimError::TooFewPeers)));

        sim.add_peer(None).unwrap();
        sim.add_peer(None).unwrap();
        assert!(matches!(
            sim.bootstrap(Some("node9"), None),
            Err(SimError::UnknownPeer { role: "primary", .. })
        ));

        let state = sim.bootstrap(Some("node3"), Some("node2")).unwrap();
        assert_eq!(state.primary.id, "node3");
        assert_eq!(state.sync.unwrap().id, "node2");
        assert_eq!(ids(&state.asyncs), vec!["node4"]);
        assert!(matches!(sim.bootstrap(None, None), Err(SimError::AlreadySetUp)));
    }

    #[tokio::test]
    async fn test_simulated_primary_appends_new_peers() {
        let mut sim = simulator();
        sim.add_peer(None).unwrap();
        sim.add_peer(None).unwrap();
        sim.bootstrap(None, None).unwrap();

        sim.add_peer(None).unwrap();
        let state = sim.cluster_state().unwrap();
        assert_eq!(ids(&state.asyncs), vec!["node4"]);
    }

    #[tokio::test]
    async fn test_removal_needing_takeover_is_refused() {
        let mut sim = simulator();
        sim.add_peer(None).unwrap();
        sim.add_peer(None).unwrap();
        sim.add_peer(None).unwrap();
        sim.bootstrap(Some("node2"), Some("node3")).unwrap();

        assert!(matches!(
            sim.rm_peer("node1"),
            Err(SimError::PeerUnderTest { .. })
        ));
        assert!(matches!(
            sim.rm_peer("node3"),
            Err(SimError::WouldRequireTakeover(_))
        ));
        assert!(matches!(
            sim.rm_peer("node2"),
            Err(SimError::WouldRequireTakeover(_))
        ));
        assert_eq!(ids(&sim.rm_peer("node4").unwrap()), vec!["node2", "node3"]);
    }

    #[tokio::test]
    async fn test_depose_and_rebuild() {
        let mut sim = simulator();
        sim.add_peer(None).unwrap();
        sim.add_peer(None).unwrap();
        sim.add_peer(None).unwrap();
        sim.bootstrap(None, None).unwrap();

        let state = sim.depose().unwrap();
        assert_eq!(state.generation, 2);
        assert_eq!(state.primary.id, "node3");
        assert_eq!(state.sync.as_ref().unwrap().id, "node4");
        assert!(state.asyncs.is_empty());
        assert_eq!(ids(&state.deposed), vec!["node2"]);
        assert_eq!(state.init_wal, Position::new(0, 10));
        assert!(matches!(sim.depose(), Err(SimError::NoAsyncs)));

        let state = sim.rebuild("node2").unwrap();
        assert_eq!(state.generation, 2);
        assert!(state.deposed.is_empty());
        assert_eq!(ids(&state.asyncs), vec!["node2"]);
        assert!(matches!(sim.rebuild("node2"), Err(SimError::NotDeposed(_))));
    }

    #[tokio::test]
    async fn test_freeze_round_trip() {
        let mut sim = simulator();
        assert!(matches!(sim.freeze(), Err(SimError::NotSetUp)));

        sim.add_peer(None).unwrap();
        sim.add_peer(None).unwrap();
        sim.bootstrap(None, None).unwrap();

        assert!(sim.freeze().unwrap().is_frozen());
        assert!(sim.cluster_state().unwrap().is_frozen());
        assert!(!sim.unfreeze().unwrap().is_frozen());
    }

    #[tokio::test]
    async fn test_invalid_cluster_state_is_rejected() {
        let sim = simulator();
        let raw = json!({"generation": 1, "primary": peer_ident(2, None)});
        assert!(matches!(
            sim.set_cluster_state(&raw),
            Err(SimError::Validation(_))
        ));
        assert!(sim.cluster_state().is_none());
    }
}
