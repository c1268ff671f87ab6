//! Generation declaration
//!
//! A new generation is minted in three steps: refuse if the cluster is
//! frozen, fetch the local replication position (the database must be
//! online), then gate on the required position and write the assembled
//! state. Each step fails with its own [`TakeoverError`] variant.

use crate::client::{CoordinationClient, DatabaseClient};
use crate::types::TakeoverError;
use manatee_core::{host, validation, ClusterState, FreezeMarker, Host, Position};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Note written into the freeze marker of a freshly set up single-node cluster
const SINGLE_NODE_FREEZE_NOTE: &str = "manatee setup: single node write mode";

/// What prompted a new generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TakeoverReason {
    /// No cluster state existed yet
    Setup,
    /// The sync saw the primary disappear
    PrimaryGone,
    /// The primary saw the sync disappear
    SyncGone,
    /// A single-node cluster gained a second peer
    LeaveSingleNodeMode,
    /// Operator asked for the sync to become primary
    PromoteSync,
    /// Operator asked for the head of the async chain to become sync
    PromoteAsync,
}

impl fmt::Display for TakeoverReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Setup => "cluster setup",
            Self::PrimaryGone => "primary gone",
            Self::SyncGone => "sync gone",
            Self::LeaveSingleNodeMode => "leaving single node mode",
            Self::PromoteSync => "sync promotion",
            Self::PromoteAsync => "async promotion",
        };
        f.write_str(reason)
    }
}

/// A generation whose roles are decided but whose `initWal` is not yet known
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationPlan {
    pub reason: TakeoverReason,
    pub generation: u64,
    pub primary: Host,
    pub sync: Host,
    pub asyncs: Vec<Host>,
    pub deposed: Vec<Host>,
    /// Position the local database must have reached before declaring
    pub min_position: Option<Position>,
}

impl GenerationPlan {
    /// Plan the successor of `current` with `primary` as the new primary.
    ///
    /// The first present async becomes sync and the other present asyncs
    /// stay behind it in chain order. Only a single-node cluster draws its
    /// sync from peers the topology does not list. The old primary is
    /// deposed only when someone else takes over. Returns `None` when nobody
    /// is available to become sync.
    pub fn successor(
        reason: TakeoverReason,
        current: &ClusterState,
        presence: &[Host],
        primary: &Host,
    ) -> Option<Self> {
        let mut chain = match reason {
            TakeoverReason::LeaveSingleNodeMode => presence
                .iter()
                .filter(|h| !current.is_deposed(&h.id))
                .cloned()
                .collect(),
            _ => present_asyncs(current, presence),
        };
        chain.retain(|h| !h.same_peer(primary));
        if chain.is_empty() {
            return None;
        }
        let sync = chain.remove(0);

        let mut deposed = current.deposed.clone();
        if !current.primary.same_peer(primary) {
            deposed.push(current.primary.clone());
        }

        let min_position = (reason == TakeoverReason::PrimaryGone
            || reason == TakeoverReason::PromoteSync)
            .then_some(current.init_wal);

        Some(Self {
            reason,
            generation: current.generation + 1,
            primary: primary.clone(),
            sync,
            asyncs: chain,
            deposed,
            min_position,
        })
    }

    /// Plan a generation that swaps the sync with the head of the async chain.
    ///
    /// The old sync goes to the end of the chain.
    pub fn promote_async(current: &ClusterState) -> Option<Self> {
        let (head, rest) = current.asyncs.split_first()?;
        let mut asyncs = rest.to_vec();
        asyncs.extend(current.sync.iter().cloned());

        Some(Self {
            reason: TakeoverReason::PromoteAsync,
            generation: current.generation + 1,
            primary: current.primary.clone(),
            sync: head.clone(),
            asyncs,
            deposed: current.deposed.clone(),
            min_position: None,
        })
    }

    /// Complete the plan with the position the generation starts at
    pub fn into_state(self, init_wal: Position) -> ClusterState {
        ClusterState {
            generation: self.generation,
            primary: self.primary,
            sync: Some(self.sync),
            asyncs: self.asyncs,
            deposed: self.deposed,
            init_wal,
            freeze: None,
            single_node_mode: None,
            promote: None,
        }
    }
}

/// Members of the async chain that are alive, in chain order
pub fn present_asyncs(state: &ClusterState, presence: &[Host]) -> Vec<Host> {
    state
        .asyncs
        .iter()
        .filter(|h| host::contains(presence, &h.id))
        .cloned()
        .collect()
}

/// The async chain a primary maintains: the present asyncs followed by
/// present peers the topology does not mention yet.
pub fn present_chain(state: &ClusterState, presence: &[Host]) -> Vec<Host> {
    let mut chain = present_asyncs(state, presence);
    chain.extend(
        presence
            .iter()
            .filter(|h| !state.accounts_for(&h.id))
            .cloned(),
    );
    chain
}

/// The first cluster state, written when none exists.
///
/// A fresh database sits at the initial position, so none is fetched.
pub fn initial_state(ident: &Host, presence: &[Host], single_node: bool) -> ClusterState {
    let others: Vec<Host> = presence
        .iter()
        .filter(|h| !h.same_peer(ident))
        .cloned()
        .collect();

    if single_node {
        return ClusterState {
            generation: 1,
            primary: ident.clone(),
            sync: None,
            asyncs: Vec::new(),
            deposed: Vec::new(),
            init_wal: Position::initial(),
            freeze: Some(FreezeMarker::note(SINGLE_NODE_FREEZE_NOTE)),
            single_node_mode: Some(true),
            promote: None,
        };
    }

    let mut others = others.into_iter();
    ClusterState {
        generation: 1,
        primary: ident.clone(),
        sync: others.next(),
        asyncs: others.collect(),
        deposed: Vec::new(),
        init_wal: Position::initial(),
        freeze: None,
        single_node_mode: None,
        promote: None,
    }
}

/// Synchronous preconditions: the cluster must not be frozen and the local
/// database must be online and idle.
pub fn preflight(current: &ClusterState, database_ready: bool) -> Result<(), TakeoverError> {
    if current.is_frozen() {
        return Err(TakeoverError::Frozen);
    }
    if !database_ready {
        return Err(TakeoverError::DatabaseOffline(
            "offline or reconfiguring".to_string(),
        ));
    }
    Ok(())
}

/// Fetch the local position, gate on it, and write the new generation.
pub async fn declare<C, D>(
    plan: GenerationPlan,
    coordination: &C,
    database: &D,
) -> Result<ClusterState, TakeoverError>
where
    C: CoordinationClient + ?Sized,
    D: DatabaseClient + ?Sized,
{
    let position = database
        .fetch_replication_position()
        .await
        .map_err(|e| TakeoverError::DatabaseOffline(e.to_string()))?;

    if let Some(required) = plan.min_position {
        if position < required {
            return Err(TakeoverError::NotCaughtUp { position, required });
        }
    }

    let reason = plan.reason;
    let state = plan.into_state(position);
    validation::check_cluster_state(&state)?;

    info!(
        generation = state.generation,
        primary = %state.primary,
        sync = ?state.sync.as_ref().map(|s| s.id.as_str()),
        init_wal = %state.init_wal,
        %reason,
        "declaring new generation"
    );
    coordination.put_cluster_state(state.clone()).await?;
    Ok(state)
}
