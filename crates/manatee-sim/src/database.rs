//! Simulated local database
//!
//! Tracks the online flag, the applied configuration and a replication
//! position. Operations take simulated time and refuse the calls a real
//! database controller would refuse.

use crate::config::SimConfig;
use crate::error::SimError;
use manatee_coordination::{DatabaseClient, DatabaseError};
use manatee_core::{DatabaseConfig, DatabaseRole, Position};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Snapshot of the simulated database
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimDatabaseStatus {
    pub online: bool,
    pub transitioning: bool,
    pub config: Option<DatabaseConfig>,
    pub position: Position,
}

#[derive(Debug)]
struct Inner {
    online: bool,
    transitioning: bool,
    config: Option<DatabaseConfig>,
    position: Position,
}

#[derive(Clone)]
pub struct SimDatabase {
    name: String,
    inner: Arc<Mutex<Inner>>,
    config: SimConfig,
}

impl SimDatabase {
    pub fn new(name: impl Into<String>, config: SimConfig) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(Inner {
                online: false,
                transitioning: false,
                config: None,
                position: Position::initial(),
            })),
            config,
        }
    }

    /// Payload of the `init` event: a fresh database that is not running
    pub fn init_status(&self) -> Value {
        let inner = self.inner.lock();
        json!({ "online": inner.online, "preExistingData": false })
    }

    /// Advance the replication position past `init_wal`
    pub fn catch_up(&self, init_wal: Position) -> Result<(), SimError> {
        let position = init_wal.increment(self.config.position_step)?;
        info!(database = %self.name, %position, "caught up");
        self.inner.lock().position = position;
        Ok(())
    }

    pub fn status(&self) -> SimDatabaseStatus {
        let inner = self.inner.lock();
        SimDatabaseStatus {
            online: inner.online,
            transitioning: inner.transitioning,
            config: inner.config.clone(),
            position: inner.position,
        }
    }

    /// Claim the controller for one operation, or explain why not
    fn begin(
        &self,
        operation: &'static str,
        check: impl FnOnce(&Inner) -> Option<&'static str>,
    ) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock();
        let refusal = if inner.transitioning {
            Some("already transitioning")
        } else {
            check(&inner)
        };
        if let Some(reason) = refusal {
            return Err(DatabaseError::OperationFailed {
                operation,
                reason: reason.to_string(),
            });
        }
        inner.transitioning = true;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DatabaseClient for SimDatabase {
    async fn reconfigure(&self, config: DatabaseConfig) -> Result<(), DatabaseError> {
        self.begin("reconfigure", |_| None)?;
        info!(database = %self.name, %config, "reconfiguring database");
        tokio::time::sleep(self.config.database_op_latency).await;

        let mut inner = self.inner.lock();
        inner.transitioning = false;
        inner.config = Some(config);
        info!(database = %self.name, "database reconfigured");
        Ok(())
    }

    async fn start(&self) -> Result<(), DatabaseError> {
        self.begin("start", |inner| {
            if inner.config.is_none() {
                Some("not configured")
            } else if inner.online {
                Some("already online")
            } else {
                None
            }
        })?;
        info!(database = %self.name, "starting database");
        tokio::time::sleep(self.config.database_op_latency).await;

        let mut inner = self.inner.lock();
        inner.transitioning = false;
        inner.online = true;
        info!(database = %self.name, "database started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), DatabaseError> {
        self.begin("stop", |inner| (!inner.online).then_some("not online"))?;
        info!(database = %self.name, "stopping database");
        tokio::time::sleep(self.config.database_op_latency).await;

        let mut inner = self.inner.lock();
        inner.transitioning = false;
        inner.online = false;
        info!(database = %self.name, "database stopped");
        Ok(())
    }

    async fn fetch_replication_position(&self) -> Result<Position, DatabaseError> {
        tokio::time::sleep(self.config.fetch_latency).await;

        let mut inner = self.inner.lock();
        let writable = inner
            .config
            .as_ref()
            .map_or(false, |c| c.role == DatabaseRole::Primary);
        if writable {
            // a primary keeps taking writes
            inner.position = inner
                .position
                .increment(self.config.position_step)
                .map_err(|e| DatabaseError::OperationFailed {
                    operation: "fetch position",
                    reason: e.to_string(),
                })?;
        }
        Ok(inner.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manatee_core::Host;

    fn database() -> SimDatabase {
        SimDatabase::new("node1", SimConfig::default())
    }

    fn downstream() -> Host {
        Host::new("node2", "10.0.0.2", "tcp://postgres@10.0.0.2:5432/postgres", "node2")
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_requires_config() {
        let db = database();
        let err = db.start().await.unwrap_err();
        assert!(err.to_string().contains("not configured"));

        db.reconfigure(DatabaseConfig::none()).await.unwrap();
        db.start().await.unwrap();
        assert!(db.status().online);

        let err = db.start().await.unwrap_err();
        assert!(err.to_string().contains("already online"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_requires_online() {
        let db = database();
        assert!(db.stop().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_calls_are_refused() {
        let db = database();
        let background = db.clone();
        let first =
            tokio::spawn(async move { background.reconfigure(DatabaseConfig::none()).await });
        tokio::task::yield_now().await;

        let err = db.reconfigure(DatabaseConfig::none()).await.unwrap_err();
        assert!(err.to_string().contains("already transitioning"));
        first.await.unwrap().unwrap();
        assert!(!db.status().transitioning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_position_advances_per_fetch() {
        let db = database();
        assert_eq!(db.fetch_replication_position().await.unwrap(), Position::initial());

        db.reconfigure(DatabaseConfig::primary(Some(downstream())))
            .await
            .unwrap();
        assert_eq!(db.fetch_replication_position().await.unwrap(), Position::new(0, 10));
        assert_eq!(db.fetch_replication_position().await.unwrap(), Position::new(0, 20));
    }

    #[test]
    fn test_catch_up_moves_past_init_wal() {
        let db = database();
        db.catch_up(Position::new(0, 10)).unwrap();
        assert_eq!(db.status().position, Position::new(0, 20));
        assert_eq!(db.init_status(), json!({"online": false, "preExistingData": false}));
    }
}
