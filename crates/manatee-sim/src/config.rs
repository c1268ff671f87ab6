//! Simulated latencies

use std::time::Duration;

/// Timings of the simulated collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Delay before a `putClusterState` takes effect
    pub write_latency: Duration,
    /// Duration of `start`, `stop` and `reconfigure`
    pub database_op_latency: Duration,
    pub fetch_latency: Duration,
    /// Delay between starting a peer and its collaborators reporting `init`
    pub init_delay: Duration,
    /// Amount the replication position moves per simulated write batch
    pub position_step: u64,
    /// How long `wait_for_rest` waits before giving up
    pub rest_timeout: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            write_latency: Duration::from_millis(100),
            database_op_latency: Duration::from_secs(1),
            fetch_latency: Duration::from_millis(10),
            init_delay: Duration::from_millis(100),
            position_step: 10,
            rest_timeout: Duration::from_secs(6),
        }
    }
}

impl SimConfig {
    /// Same behavior with every latency set to zero
    pub fn instant() -> Self {
        Self {
            write_latency: Duration::ZERO,
            database_op_latency: Duration::ZERO,
            fetch_latency: Duration::ZERO,
            init_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}
