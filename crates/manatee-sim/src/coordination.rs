//! Simulated coordination service
//!
//! One [`SimCoordination`] per simulated cluster holds the cluster state and
//! the presence list. Each peer talks to it through its own
//! [`SimCoordinationClient`] and is notified only after its client has
//! delivered `init`.

use crate::config::SimConfig;
use manatee_coordination::{
    CoordinationClient, CoordinationError, CoordinationEvent, PeerHandle, RestTracker,
};
use manatee_core::{host, ClusterState, Host};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, warn};

struct Registration {
    ident: Host,
    handle: PeerHandle,
    initialized: bool,
}

#[derive(Default)]
struct Shared {
    cluster_state: Option<ClusterState>,
    presence: Vec<Host>,
    clients: Vec<Registration>,
}

/// Shared coordination-service state of one simulated cluster
#[derive(Clone)]
pub struct SimCoordination {
    shared: Arc<Mutex<Shared>>,
    tracker: RestTracker,
    config: SimConfig,
}

impl SimCoordination {
    pub fn new(tracker: RestTracker, config: SimConfig) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            tracker,
            config,
        }
    }

    /// Client through which a peer writes cluster states
    pub fn client(&self) -> SimCoordinationClient {
        SimCoordinationClient {
            service: self.clone(),
        }
    }

    /// Route notifications for `ident` to `handle`
    pub fn register(&self, ident: Host, handle: PeerHandle) {
        self.shared.lock().clients.push(Registration {
            ident,
            handle,
            initialized: false,
        });
    }

    /// Deliver `init` to the client of `id` after the configured delay
    pub fn start_client(&self, id: &str) {
        let moving = self.tracker.moving();
        let service = self.clone();
        let id = id.to_string();
        let delay = self.config.init_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            service.deliver_init(&id);
            drop(moving);
        });
    }

    fn deliver_init(&self, id: &str) {
        let mut shared = self.shared.lock();
        let shared = &mut *shared;

        let cluster_state = match shared
            .cluster_state
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
        {
            Ok(state) => state,
            Err(err) => {
                error!(error = %err, "failed to encode cluster state");
                return;
            }
        };
        let presence = match serde_json::to_value(&shared.presence) {
            Ok(presence) => presence,
            Err(err) => {
                error!(error = %err, "failed to encode presence list");
                return;
            }
        };

        let Some(client) = shared.clients.iter_mut().find(|c| c.ident.id == id) else {
            warn!(peer = id, "init for unregistered client");
            return;
        };
        client.initialized = true;
        let event = CoordinationEvent::Init {
            cluster_state,
            presence,
        };
        if client.handle.coordination_event(event).is_err() {
            debug!(peer = id, "peer stopped before init");
        }
    }

    /// Add `ident` to the presence list; false if it is already there
    pub fn peer_joined(&self, ident: Host) -> bool {
        let mut shared = self.shared.lock();
        if host::contains(&shared.presence, &ident.id) {
            return false;
        }
        debug!(peer = %ident, "peer joined");
        shared.presence.push(ident);
        Self::notify_presence(&shared);
        true
    }

    /// Remove `id` from the presence list; false if it was not there
    pub fn peer_removed(&self, id: &str) -> bool {
        let mut shared = self.shared.lock();
        let Some(index) = host::position_of(&shared.presence, id) else {
            return false;
        };
        debug!(peer = id, "peer removed");
        shared.presence.remove(index);
        Self::notify_presence(&shared);
        true
    }

    /// Replace the cluster state and notify every initialized client
    pub fn set_cluster_state(&self, state: ClusterState) {
        let mut shared = self.shared.lock();
        let raw = match serde_json::to_value(&state) {
            Ok(raw) => raw,
            Err(err) => {
                error!(error = %err, "failed to encode cluster state");
                return;
            }
        };
        debug!(generation = state.generation, "cluster state set");
        shared.cluster_state = Some(state);
        Self::notify(&shared, || CoordinationEvent::ClusterStateChanged(raw.clone()));
    }

    pub fn cluster_state(&self) -> Option<ClusterState> {
        self.shared.lock().cluster_state.clone()
    }

    pub fn presence(&self) -> Vec<Host> {
        self.shared.lock().presence.clone()
    }

    fn notify_presence(shared: &Shared) {
        match serde_json::to_value(&shared.presence) {
            Ok(raw) => Self::notify(shared, || CoordinationEvent::PresenceChanged(raw.clone())),
            Err(err) => error!(error = %err, "failed to encode presence list"),
        }
    }

    fn notify(shared: &Shared, event: impl Fn() -> CoordinationEvent) {
        for client in shared.clients.iter().filter(|c| c.initialized) {
            if client.handle.coordination_event(event()).is_err() {
                debug!(peer = %client.ident, "dropping notification for stopped peer");
            }
        }
    }
}

/// Per-peer view of the simulated service
#[derive(Clone)]
pub struct SimCoordinationClient {
    service: SimCoordination,
}

#[async_trait::async_trait]
impl CoordinationClient for SimCoordinationClient {
    async fn put_cluster_state(&self, state: ClusterState) -> Result<(), CoordinationError> {
        tokio::time::sleep(self.service.config.write_latency).await;
        self.service.set_cluster_state(state);
        Ok(())
    }
}

