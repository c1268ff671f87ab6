//! The peer state machine
//!
//! A [`Peer`] owns all of its runtime state and handles one message at a
//! time from its mailbox. Calls into the collaborators run as spawned tasks
//! that report back through the same mailbox, so evaluation never
//! interleaves with itself. At most one cluster-state write and one database
//! reconfiguration are outstanding at any time.

use crate::client::{CoordinationClient, CoordinationEvent, DatabaseClient, DatabaseEvent};
use crate::config::PeerConfig;
use crate::promote::{self, PromoteRequest, PromoteRole};
use crate::rest::{MovingGuard, RestTracker};
use crate::status::{DatabaseView, PeerStatus, Updating};
use crate::takeover::{self, GenerationPlan, TakeoverReason};
use crate::types::{CoordinationError, DatabaseError, PeerError, TakeoverError};
use chrono::{DateTime, Utc};
use manatee_core::{
    host, validation, ClusterState, DatabaseConfig, DatabaseStatus, Host, PeerRole,
};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

enum PeerMessage {
    Coordination(CoordinationEvent),
    Database(DatabaseEvent),
    Declared {
        reason: TakeoverReason,
        result: Result<ClusterState, TakeoverError>,
    },
    Rewritten(Result<ClusterState, CoordinationError>),
    BackoffElapsed,
    Applied {
        config: DatabaseConfig,
        result: Result<(), DatabaseError>,
    },
    RetryApply,
    Shutdown,
}

/// A queued message and the work token that keeps the peer "moving" until
/// it has been handled
struct Envelope {
    message: PeerMessage,
    moving: MovingGuard,
}

/// Cloneable entry point for delivering events to a running peer
#[derive(Clone)]
pub struct PeerHandle {
    mailbox: mpsc::UnboundedSender<Envelope>,
    tracker: RestTracker,
    status: watch::Receiver<PeerStatus>,
}

impl PeerHandle {
    fn send(&self, message: PeerMessage) -> Result<(), PeerError> {
        let envelope = Envelope {
            message,
            moving: self.tracker.moving(),
        };
        self.mailbox.send(envelope).map_err(|_| PeerError::Stopped)
    }

    pub fn coordination_event(&self, event: CoordinationEvent) -> Result<(), PeerError> {
        self.send(PeerMessage::Coordination(event))
    }

    pub fn database_event(&self, event: DatabaseEvent) -> Result<(), PeerError> {
        self.send(PeerMessage::Database(event))
    }

    /// Ask the peer to stop after the messages already queued
    pub fn shutdown(&self) -> Result<(), PeerError> {
        self.send(PeerMessage::Shutdown)
    }

    /// Latest published snapshot
    pub fn status(&self) -> PeerStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<PeerStatus> {
        self.status.clone()
    }

    pub fn tracker(&self) -> &RestTracker {
        &self.tracker
    }
}

/// Local database as tracked by the peer
#[derive(Debug, Default)]
struct LocalDatabase {
    status: Option<DatabaseStatus>,
    online: Option<bool>,
    applied: Option<DatabaseConfig>,
    transitioning: bool,
    retry_pending: Option<DateTime<Utc>>,
    retries: u32,
    /// Whether the replica has caught up since this peer last became sync
    caught_up: bool,
}

/// One peer of a manatee cluster
pub struct Peer<C, D> {
    ident: Host,
    config: PeerConfig,
    coordination: Arc<C>,
    database: Arc<D>,
    tracker: RestTracker,
    sender: mpsc::UnboundedSender<Envelope>,
    mailbox: mpsc::UnboundedReceiver<Envelope>,
    status: watch::Sender<PeerStatus>,

    role: PeerRole,
    /// Last generation whose roles this peer has assumed
    generation: Option<u64>,
    cluster_state: Option<ClusterState>,
    coordination_ready: bool,
    presence: Vec<Host>,
    updating: Option<Updating>,
    upstream: Option<Host>,
    db: LocalDatabase,
    ignored_promotion: Option<Value>,
    fatal: Option<String>,
}

impl<C, D> Peer<C, D>
where
    C: CoordinationClient,
    D: DatabaseClient,
{
    pub fn new(
        ident: Host,
        config: PeerConfig,
        coordination: Arc<C>,
        database: Arc<D>,
        tracker: RestTracker,
    ) -> (Self, PeerHandle) {
        let (sender, mailbox) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(PeerStatus::new(ident.id.clone()));

        let handle = PeerHandle {
            mailbox: sender.clone(),
            tracker: tracker.clone(),
            status: status_rx,
        };

        let peer = Self {
            ident,
            config,
            coordination,
            database,
            tracker,
            sender,
            mailbox,
            status,
            role: PeerRole::Unknown,
            generation: None,
            cluster_state: None,
            coordination_ready: false,
            presence: Vec::new(),
            updating: None,
            upstream: None,
            db: LocalDatabase::default(),
            ignored_promotion: None,
            fatal: None,
        };

        (peer, handle)
    }

    pub fn spawn(self) -> JoinHandle<Result<(), PeerError>> {
        tokio::spawn(self.run())
    }

    /// Process messages until shut down or stopped by a fatal error.
    ///
    /// The returned error is the peer's only fatal emission point.
    pub async fn run(mut self) -> Result<(), PeerError> {
        info!(peer = %self.ident, singleton = self.config.singleton, "peer starting");

        while let Some(Envelope { message, moving }) = self.mailbox.recv().await {
            if matches!(message, PeerMessage::Shutdown) {
                info!(peer = %self.ident, "peer stopping");
                self.publish();
                drop(moving);
                break;
            }

            if let Err(err) = self.dispatch(message) {
                error!(peer = %self.ident, error = %err, "fatal error");
                self.fatal = Some(err.to_string());
                self.publish();
                drop(moving);
                return Err(err);
            }

            self.publish();
            drop(moving);
        }

        Ok(())
    }

    fn dispatch(&mut self, message: PeerMessage) -> Result<(), PeerError> {
        match message {
            PeerMessage::Coordination(event) => {
                if self.role.is_terminal() {
                    info!(event = event.name(), "dropping coordination event (deposed)");
                    return Ok(());
                }
                self.on_coordination_event(event)
            }
            PeerMessage::Database(event) => {
                if self.role.is_terminal() {
                    info!(event = event.name(), "dropping database event (deposed)");
                    return Ok(());
                }
                self.on_database_event(event)
            }
            PeerMessage::Declared { reason, result } => self.on_declared(reason, result),
            PeerMessage::Rewritten(result) => self.on_rewritten(result),
            PeerMessage::BackoffElapsed => {
                self.updating = None;
                self.evaluate()
            }
            PeerMessage::Applied { config, result } => {
                self.on_applied(config, result);
                Ok(())
            }
            PeerMessage::RetryApply => {
                self.apply_database_config();
                Ok(())
            }
            PeerMessage::Shutdown => Ok(()),
        }
    }

    fn on_coordination_event(&mut self, event: CoordinationEvent) -> Result<(), PeerError> {
        match event {
            CoordinationEvent::Init {
                cluster_state,
                presence,
            } => {
                if self.coordination_ready {
                    return Err(PeerError::Protocol(
                        "coordination service initialized twice".to_string(),
                    ));
                }
                let state = cluster_state
                    .as_ref()
                    .map(validation::validate_cluster_state)
                    .transpose()?;
                let presence = validation::validate_presence_list(&presence)?;

                info!(
                    generation = ?state.as_ref().map(|s| s.generation),
                    peers = ?ids(&presence),
                    "coordination service ready"
                );
                self.coordination_ready = true;
                self.cluster_state = state;
                self.presence = presence;
                self.evaluate_when_ready()
            }
            CoordinationEvent::PresenceChanged(raw) => {
                self.require_coordination("presenceChanged")?;
                let presence = validation::validate_presence_list(&raw)?;
                info!(peers = ?ids(&presence), "presence changed");
                self.presence = presence;
                self.evaluate_when_ready()
            }
            CoordinationEvent::ClusterStateChanged(raw) => {
                self.require_coordination("clusterStateChanged")?;
                let state = validation::validate_cluster_state(&raw)?;
                if let Some(seen) = self.generation {
                    if state.generation < seen {
                        warn!(
                            generation = state.generation,
                            seen, "ignoring cluster state from an older generation"
                        );
                        return Ok(());
                    }
                }
                info!(generation = state.generation, "cluster state changed");
                self.cluster_state = Some(state);
                self.evaluate_when_ready()
            }
        }
    }

    fn on_database_event(&mut self, event: DatabaseEvent) -> Result<(), PeerError> {
        match event {
            DatabaseEvent::Init(raw) => {
                if self.db.status.is_some() {
                    return Err(PeerError::Protocol(
                        "database initialized twice".to_string(),
                    ));
                }
                let status = validation::validate_database_status(&raw)?;
                info!(
                    online = status.online,
                    pre_existing_data = status.pre_existing_data,
                    "database ready"
                );
                self.db.status = Some(status);
                self.db.online = Some(status.online);
                self.evaluate_when_ready()
            }
            DatabaseEvent::CaughtUp => {
                if self.db.status.is_none() {
                    return Err(PeerError::Protocol(
                        "caughtUp received before database init".to_string(),
                    ));
                }
                info!(role = %self.role, "database caught up");
                self.db.caught_up = true;
                self.evaluate_when_ready()
            }
        }
    }

    fn require_coordination(&self, event: &str) -> Result<(), PeerError> {
        if self.coordination_ready {
            Ok(())
        } else {
            Err(PeerError::Protocol(format!(
                "{event} received before coordination init"
            )))
        }
    }

    fn evaluate_when_ready(&mut self) -> Result<(), PeerError> {
        if !self.coordination_ready || self.db.status.is_none() {
            debug!("waiting for both collaborators before evaluating");
            return Ok(());
        }
        self.evaluate()
    }

    /// Decide what should be true now and start moving toward it.
    fn evaluate(&mut self) -> Result<(), PeerError> {
        if self.role.is_terminal() {
            return Ok(());
        }

        if let Some(updating) = &self.updating {
            debug!(?updating, "deferring evaluation (cluster state update in flight)");
            return Ok(());
        }

        let Some(state) = self.cluster_state.clone() else {
            return self.evaluate_setup();
        };

        if self.config.singleton && !state.is_single_node() {
            return Err(PeerError::SingleNodeMismatch {
                generation: state.generation,
            });
        }

        if self.generation != Some(state.generation) {
            return self.enter_generation(&state);
        }

        match self.role {
            PeerRole::Unassigned => self.check_unassigned(&state),
            PeerRole::Async => self.check_async(&state),
            PeerRole::Sync => self.check_sync(&state),
            PeerRole::Primary => self.check_primary(&state),
            PeerRole::Unknown | PeerRole::Deposed => Ok(()),
        }
    }

    fn evaluate_setup(&mut self) -> Result<(), PeerError> {
        let first = self
            .presence
            .first()
            .map_or(false, |h| h.same_peer(&self.ident));
        let enough = self.config.singleton || self.presence.len() >= 2;
        let pre_existing = self.db.status.map_or(false, |s| s.pre_existing_data);

        if first && enough && !pre_existing {
            return self.start_setup();
        }

        if first && enough {
            warn!("not setting up cluster: local database has pre-existing data");
        } else {
            debug!(first, peers = self.presence.len(), "cluster not yet set up");
        }

        if self.role != PeerRole::Unassigned {
            self.assume_unassigned();
        }
        Ok(())
    }

    fn start_setup(&mut self) -> Result<(), PeerError> {
        let state = takeover::initial_state(&self.ident, &self.presence, self.config.singleton);
        validation::check_cluster_state(&state).map_err(PeerError::InvalidProposal)?;

        info!(
            singleton = self.config.singleton,
            sync = ?state.sync.as_ref().map(|s| s.id.as_str()),
            asyncs = ?ids(&state.asyncs),
            "setting up cluster"
        );
        self.updating = Some(Updating::Declaring {
            generation: state.generation,
            reason: TakeoverReason::Setup,
        });

        let coordination = Arc::clone(&self.coordination);
        self.spawn_work(async move {
            let result = coordination
                .put_cluster_state(state.clone())
                .await
                .map(|()| state)
                .map_err(TakeoverError::from);
            PeerMessage::Declared {
                reason: TakeoverReason::Setup,
                result,
            }
        });
        Ok(())
    }

    fn enter_generation(&mut self, state: &ClusterState) -> Result<(), PeerError> {
        info!(from = ?self.generation, to = state.generation, "observed new generation");
        let id = self.ident.id.clone();
        let was_primary = self.role == PeerRole::Primary;
        self.generation = Some(state.generation);

        if was_primary && !state.is_primary(&id) {
            warn!(primary = %state.primary, "deposed by new generation");
            self.assume_deposed();
            return Ok(());
        }

        if state.is_primary(&id) {
            self.assume_primary()
        } else if state.is_single_node() {
            self.assume_unassigned();
            Ok(())
        } else if state.is_sync(&id) {
            self.assume_sync(state)
        } else if state.is_deposed(&id) {
            self.assume_deposed();
            Ok(())
        } else if let Some(index) = state.async_index(&id) {
            self.assume_async(state, index)
        } else {
            self.assume_unassigned();
            Ok(())
        }
    }

    fn check_unassigned(&mut self, state: &ClusterState) -> Result<(), PeerError> {
        match state.async_index(&self.ident.id) {
            Some(index) => self.assume_async(state, index),
            None => Ok(()),
        }
    }

    fn check_async(&mut self, state: &ClusterState) -> Result<(), PeerError> {
        let Some(index) = state.async_index(&self.ident.id) else {
            info!("no longer in the async chain");
            self.assume_unassigned();
            return Ok(());
        };

        let upstream = state.upstream_of_async(index).map(|h| h.id.as_str());
        if upstream != self.upstream.as_ref().map(|h| h.id.as_str()) {
            return self.assume_async(state, index);
        }
        Ok(())
    }

    fn check_sync(&mut self, state: &ClusterState) -> Result<(), PeerError> {
        let reason = if !self.is_present(&state.primary.id) {
            TakeoverReason::PrimaryGone
        } else {
            match self.promotion(state) {
                Some(request) if request.role == PromoteRole::Sync => {
                    info!(generation = state.generation, "promotion to primary requested");
                    TakeoverReason::PromoteSync
                }
                _ => return Ok(()),
            }
        };

        if !self.db.caught_up {
            warn!(%reason, init_wal = %state.init_wal, "would take over, but not caught up");
            return Ok(());
        }
        self.start_successor(reason, state)
    }

    fn check_primary(&mut self, state: &ClusterState) -> Result<(), PeerError> {
        if state.is_single_node() {
            if self.config.singleton {
                return Ok(());
            }
            return match GenerationPlan::successor(
                TakeoverReason::LeaveSingleNodeMode,
                state,
                &self.presence,
                &self.ident,
            ) {
                Some(plan) => self.start_declaration(plan, state),
                None => {
                    debug!("single node mode: waiting for another peer");
                    Ok(())
                }
            };
        }

        let sync_present = state
            .sync
            .as_ref()
            .map_or(false, |s| self.is_present(&s.id));
        if !sync_present {
            return self.start_successor(TakeoverReason::SyncGone, state);
        }

        if let Some(request) = self.promotion(state) {
            if request.role == PromoteRole::Async {
                return self.start_async_promotion(state, &request);
            }
        }

        let chain = takeover::present_chain(state, &self.presence);
        if ids(&chain) != ids(&state.asyncs) {
            info!(
                from = ?ids(&state.asyncs),
                to = ?ids(&chain),
                "async chain out of date"
            );
            return self.start_rewrite(state.with_asyncs(chain));
        }
        Ok(())
    }

    fn start_async_promotion(
        &mut self,
        state: &ClusterState,
        request: &PromoteRequest,
    ) -> Result<(), PeerError> {
        if !self.is_present(&request.id) {
            if let Some(raw) = &state.promote {
                let raw = raw.clone();
                self.ignore_promotion(&raw, "promoted peer is not present");
            }
            return Ok(());
        }

        match request.async_index {
            Some(0) => match GenerationPlan::promote_async(state) {
                Some(plan) => {
                    info!(peer = %request.id, "promoting async to sync");
                    self.start_declaration(plan, state)
                }
                None => Ok(()),
            },
            Some(index) => {
                info!(peer = %request.id, index, "moving async up the chain");
                let mut proposed = state.with_asyncs(promote::reorder_asyncs(&state.asyncs, index));
                proposed.promote = None;
                self.start_rewrite(proposed)
            }
            None => Ok(()),
        }
    }

    /// Parse the pending promotion request, logging each rejected request once
    fn promotion(&mut self, state: &ClusterState) -> Option<PromoteRequest> {
        match promote::pending_request(state, Utc::now())? {
            Ok(request) => Some(request),
            Err(rejection) => {
                if let Some(raw) = &state.promote {
                    let raw = raw.clone();
                    self.ignore_promotion(&raw, rejection);
                }
                None
            }
        }
    }

    fn ignore_promotion(&mut self, raw: &Value, why: impl fmt::Display) {
        if self.ignored_promotion.as_ref() != Some(raw) {
            warn!(request = %raw, reason = %why, "ignoring promotion request");
            self.ignored_promotion = Some(raw.clone());
        }
    }

    fn start_successor(
        &mut self,
        reason: TakeoverReason,
        state: &ClusterState,
    ) -> Result<(), PeerError> {
        match GenerationPlan::successor(reason, state, &self.presence, &self.ident) {
            Some(plan) => self.start_declaration(plan, state),
            None => {
                warn!(%reason, "would take over, but no peer is available to become sync");
                Ok(())
            }
        }
    }

    fn start_declaration(
        &mut self,
        plan: GenerationPlan,
        current: &ClusterState,
    ) -> Result<(), PeerError> {
        if let Err(err) = takeover::preflight(current, self.database_ready()) {
            return self.back_off(plan.reason, err);
        }

        debug!(
            generation = plan.generation,
            reason = %plan.reason,
            sync = %plan.sync,
            "preparing for new generation"
        );
        let reason = plan.reason;
        self.updating = Some(Updating::Declaring {
            generation: plan.generation,
            reason,
        });

        let coordination = Arc::clone(&self.coordination);
        let database = Arc::clone(&self.database);
        self.spawn_work(async move {
            let result = takeover::declare(plan, coordination.as_ref(), database.as_ref()).await;
            PeerMessage::Declared { reason, result }
        });
        Ok(())
    }

    fn back_off(&mut self, reason: TakeoverReason, err: TakeoverError) -> Result<(), PeerError> {
        let err = match err {
            TakeoverError::Invalid(invalid) => return Err(PeerError::InvalidProposal(invalid)),
            TakeoverError::NotCaughtUp { position, required } => {
                warn!(%reason, %position, %required, "would take over, but not caught up");
                self.db.caught_up = false;
                return Ok(());
            }
            other => other,
        };

        match &err {
            TakeoverError::WriteFailed(_) => {
                error!(%reason, error = %err, "failed to declare new generation")
            }
            _ => warn!(%reason, error = %err, "would take over, but cannot yet"),
        }

        let backoff = self.config.takeover_backoff();
        self.updating = Some(Updating::BackingOff {
            reason: err.to_string(),
        });
        self.spawn_work(async move {
            tokio::time::sleep(backoff).await;
            PeerMessage::BackoffElapsed
        });
        Ok(())
    }

    fn on_declared(
        &mut self,
        reason: TakeoverReason,
        result: Result<ClusterState, TakeoverError>,
    ) -> Result<(), PeerError> {
        self.updating = None;
        match result {
            Ok(state) => {
                let current = self.cluster_state.as_ref().map(|s| s.generation);
                if current.map_or(false, |g| g > state.generation) {
                    warn!(
                        written = state.generation,
                        current = ?current,
                        "newer generation arrived during declaration"
                    );
                    return self.evaluate();
                }
                info!(generation = state.generation, %reason, "declared new generation");
                self.generation = Some(state.generation);
                self.cluster_state = Some(state);
                self.assume_primary()
            }
            Err(err) => self.back_off(reason, err),
        }
    }

    /// Write a same-generation state; only the async chain (and a consumed
    /// promotion request) may differ from the current one.
    fn start_rewrite(&mut self, proposed: ClusterState) -> Result<(), PeerError> {
        validation::check_cluster_state(&proposed).map_err(PeerError::InvalidProposal)?;

        info!(
            generation = proposed.generation,
            asyncs = ?ids(&proposed.asyncs),
            "updating async chain"
        );
        self.updating = Some(Updating::Correcting {
            asyncs: proposed.asyncs.iter().map(|h| h.id.clone()).collect(),
        });

        let coordination = Arc::clone(&self.coordination);
        self.spawn_work(async move {
            let result = coordination
                .put_cluster_state(proposed.clone())
                .await
                .map(|()| proposed);
            PeerMessage::Rewritten(result)
        });
        Ok(())
    }

    fn on_rewritten(&mut self, result: Result<ClusterState, CoordinationError>) -> Result<(), PeerError> {
        self.updating = None;
        match result {
            Ok(state) => {
                let current = self.cluster_state.as_ref().map(|s| s.generation);
                if current == Some(state.generation) {
                    info!(generation = state.generation, "updated cluster state");
                    self.cluster_state = Some(state);
                } else {
                    debug!(
                        written = state.generation,
                        current = ?current,
                        "newer generation arrived during update"
                    );
                }
            }
            Err(err) => warn!(error = %err, "failed to update cluster state"),
        }
        self.evaluate()
    }

    fn set_role(&mut self, role: PeerRole, upstream: Option<Host>) {
        debug_assert!(self.role.can_transition_to(role));
        if self.role != role {
            info!(peer = %self.ident, from = %self.role, to = %role, "assuming role");
        }
        self.role = role;
        self.upstream = upstream;
    }

    fn assume_primary(&mut self) -> Result<(), PeerError> {
        self.set_role(PeerRole::Primary, None);
        self.apply_database_config();
        self.evaluate()
    }

    fn assume_sync(&mut self, state: &ClusterState) -> Result<(), PeerError> {
        self.set_role(PeerRole::Sync, Some(state.primary.clone()));
        self.db.caught_up = false;
        self.apply_database_config();
        self.evaluate()
    }

    fn assume_async(&mut self, state: &ClusterState, index: usize) -> Result<(), PeerError> {
        let upstream = state.upstream_of_async(index).cloned();
        debug!(index, upstream = ?upstream.as_ref().map(|h| h.id.as_str()), "async position");
        self.set_role(PeerRole::Async, upstream);
        self.apply_database_config();
        self.evaluate()
    }

    fn assume_unassigned(&mut self) {
        self.set_role(PeerRole::Unassigned, None);
        self.apply_database_config();
    }

    fn assume_deposed(&mut self) {
        self.set_role(PeerRole::Deposed, None);
        self.apply_database_config();
    }

    /// Database configuration implied by the current role
    fn desired_database_config(&self) -> DatabaseConfig {
        match self.role {
            PeerRole::Primary => DatabaseConfig::primary(
                self.cluster_state.as_ref().and_then(|s| s.sync.clone()),
            ),
            PeerRole::Sync | PeerRole::Async => {
                DatabaseConfig::replica(self.role.database_role(), self.upstream.clone())
            }
            PeerRole::Unknown | PeerRole::Unassigned | PeerRole::Deposed => DatabaseConfig::none(),
        }
    }

    fn apply_database_config(&mut self) {
        let Some(online) = self.db.online else {
            debug!("database status unknown, not applying config");
            return;
        };

        if self.db.transitioning {
            info!("skipping database apply (already transitioning)");
            return;
        }

        let config = self.desired_database_config();
        if self.db.applied.as_ref() == Some(&config) {
            debug!("skipping database apply (no changes)");
            return;
        }

        info!(%config, "applying database config");
        self.db.transitioning = true;
        let database = Arc::clone(&self.database);
        self.spawn_work(async move {
            let result = reconcile(database.as_ref(), &config, online).await;
            PeerMessage::Applied { config, result }
        });
    }

    fn on_applied(&mut self, config: DatabaseConfig, result: Result<(), DatabaseError>) {
        self.db.transitioning = false;
        match result {
            Ok(()) => {
                info!(%config, retries = self.db.retries, "database config applied");
                self.db.online = Some(config.wants_online());
                self.db.applied = Some(config);
                self.db.retry_pending = None;
                self.db.retries = 0;
                self.apply_database_config();
            }
            Err(err) => {
                error!(%config, error = %err, "failed to apply database config, will retry");
                self.db.retry_pending = Some(Utc::now());
                self.db.retries += 1;
                let interval = self.config.apply_retry_interval();
                self.spawn_work(async move {
                    tokio::time::sleep(interval).await;
                    PeerMessage::RetryApply
                });
            }
        }
    }

    fn database_ready(&self) -> bool {
        self.db.online == Some(true) && !self.db.transitioning
    }

    fn is_present(&self, id: &str) -> bool {
        host::contains(&self.presence, id)
    }

    /// Run `work` in the background and feed its result back into the mailbox
    fn spawn_work<F>(&self, work: F)
    where
        F: Future<Output = PeerMessage> + Send + 'static,
    {
        let moving = self.tracker.moving();
        let sender = self.sender.clone();
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            let message = work.await;
            let envelope = Envelope {
                message,
                moving: tracker.moving(),
            };
            if sender.send(envelope).is_err() {
                debug!("peer stopped before background work finished");
            }
            drop(moving);
        });
    }

    fn publish(&self) {
        let status = PeerStatus {
            id: self.ident.id.clone(),
            role: self.role,
            generation: self.generation,
            cluster_state: self.cluster_state.clone(),
            presence: self.presence.clone(),
            updating: self.updating.clone(),
            upstream: self.upstream.clone(),
            database: DatabaseView {
                online: self.db.online,
                pre_existing_data: self.db.status.map(|s| s.pre_existing_data),
                config: self.db.applied.clone(),
                transitioning: self.db.transitioning,
                retry_pending: self.db.retry_pending,
                caught_up: self.db.caught_up,
            },
            fatal: self.fatal.clone(),
        };
        self.status.send_replace(status);
    }
}

/// Push `config` and start or stop the database to match it
async fn reconcile<D>(database: &D, config: &DatabaseConfig, online: bool) -> Result<(), DatabaseError>
where
    D: DatabaseClient + ?Sized,
{
    database.reconfigure(config.clone()).await?;
    match (config.wants_online(), online) {
        (true, false) => {
            debug!("starting database");
            database.start().await
        }
        (false, true) => {
            debug!("stopping database");
            database.stop().await
        }
        _ => Ok(()),
    }
}

fn ids(hosts: &[Host]) -> Vec<&str> {
    hosts.iter().map(|h| h.id.as_str()).collect()
}
