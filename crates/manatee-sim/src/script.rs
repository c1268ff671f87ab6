//! Scripted simulator sessions
//!
//! A script is a JSON array of steps such as `{"cmd": "addPeer"}` or
//! `{"cmd": "peer", "check": {"role": "sync"}}`. After each command the
//! runner waits for the cluster to come to rest (or lets `wait`
//! milliseconds pass instead), then compares the command's output against
//! `check`. Properties missing from `check` are not compared.

use crate::error::SimError;
use crate::simulator::Simulator;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

const DEFAULT_PROMOTE_EXPIRY_SECS: i64 = 60;

fn default_expiry() -> i64 {
    DEFAULT_PROMOTE_EXPIRY_SECS
}

/// One simulator command
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Command {
    Echo {
        #[serde(default)]
        message: String,
    },
    AddPeer {
        name: Option<String>,
    },
    RmPeer {
        name: String,
    },
    Bootstrap {
        primary: Option<String>,
        sync: Option<String>,
    },
    StartPeer,
    Depose,
    Rebuild {
        name: String,
    },
    Freeze,
    Unfreeze,
    CatchUp,
    SetClusterState {
        state: Value,
    },
    Promote {
        id: String,
        role: String,
        #[serde(rename = "asyncIndex")]
        async_index: Option<usize>,
        #[serde(rename = "expireInSecs", default = "default_expiry")]
        expire_in_secs: i64,
    },
    /// Status of the peer under test
    Peer,
    /// Cluster state and presence list
    Zk,
    /// Simulated database of the peer under test
    Pg,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Echo { .. } => "echo",
            Self::AddPeer { .. } => "addPeer",
            Self::RmPeer { .. } => "rmPeer",
            Self::Bootstrap { .. } => "bootstrap",
            Self::StartPeer => "startPeer",
            Self::Depose => "depose",
            Self::Rebuild { .. } => "rebuild",
            Self::Freeze => "freeze",
            Self::Unfreeze => "unfreeze",
            Self::CatchUp => "catchUp",
            Self::SetClusterState { .. } => "setClusterState",
            Self::Promote { .. } => "promote",
            Self::Peer => "peer",
            Self::Zk => "zk",
            Self::Pg => "pg",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub command: Command,
    /// Milliseconds to let pass instead of waiting for rest
    #[serde(default)]
    pub wait: Option<u64>,
    #[serde(default)]
    pub check: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutput {
    pub step: usize,
    pub command: &'static str,
    pub output: Value,
}

/// Parse a JSON script
pub fn parse_script(raw: &str) -> Result<Vec<Step>, SimError> {
    Ok(serde_json::from_str(raw)?)
}

/// Run `steps` in order, stopping at the first failed command or check
pub async fn run_script(sim: &mut Simulator, steps: &[Step]) -> Result<Vec<StepOutput>, SimError> {
    let mut outputs = Vec::with_capacity(steps.len());

    for (step, entry) in steps.iter().enumerate() {
        info!(step, command = entry.command.name(), "running command");
        let output = execute(sim, &entry.command)?;

        match entry.wait {
            Some(ms) => sim.advance(Duration::from_millis(ms)).await?,
            None => sim.wait_for_rest().await?,
        }

        if let Some(expected) = &entry.check {
            check_subset("result", &output, expected)
                .map_err(|message| SimError::CheckFailed { step, message })?;
        }

        outputs.push(StepOutput {
            step,
            command: entry.command.name(),
            output,
        });
    }

    Ok(outputs)
}

fn execute(sim: &mut Simulator, command: &Command) -> Result<Value, SimError> {
    let output = match command {
        Command::Echo { message } => {
            info!("{message}");
            Value::String(message.clone())
        }
        Command::AddPeer { name } => serde_json::to_value(sim.add_peer(name.as_deref())?)?,
        Command::RmPeer { name } => serde_json::to_value(sim.rm_peer(name)?)?,
        Command::Bootstrap { primary, sync } => {
            serde_json::to_value(sim.bootstrap(primary.as_deref(), sync.as_deref())?)?
        }
        Command::StartPeer => {
            sim.start_peer()?;
            Value::Null
        }
        Command::Depose => serde_json::to_value(sim.depose()?)?,
        Command::Rebuild { name } => serde_json::to_value(sim.rebuild(name)?)?,
        Command::Freeze => serde_json::to_value(sim.freeze()?)?,
        Command::Unfreeze => serde_json::to_value(sim.unfreeze()?)?,
        Command::CatchUp => {
            sim.catch_up()?;
            Value::Null
        }
        Command::SetClusterState { state } => serde_json::to_value(sim.set_cluster_state(state)?)?,
        Command::Promote {
            id,
            role,
            async_index,
            expire_in_secs,
        } => serde_json::to_value(sim.request_promotion(
            id,
            role,
            *async_index,
            chrono::Duration::seconds(*expire_in_secs),
        )?)?,
        Command::Peer => serde_json::to_value(sim.peer())?,
        Command::Zk => json!({
            "clusterState": sim.cluster_state(),
            "activeNodes": sim.presence(),
        }),
        Command::Pg => serde_json::to_value(sim.database())?,
    };
    Ok(output)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Compare `actual` against `expected`, ignoring properties and trailing
/// array elements that `expected` does not mention.
pub fn check_subset(label: &str, actual: &Value, expected: &Value) -> Result<(), String> {
    if kind(actual) != kind(expected) {
        return Err(format!(
            "{label}: expected type \"{}\", but found \"{}\"",
            kind(expected),
            kind(actual)
        ));
    }

    match (expected, actual) {
        (Value::Array(want), Value::Array(have)) => {
            for (i, item) in want.iter().enumerate() {
                let Some(found) = have.get(i) else {
                    return Err(format!(
                        "{label}: expected array of at least {} elements, but found only {}",
                        want.len(),
                        have.len()
                    ));
                };
                check_subset(&format!("{label}[{i}]"), found, item)?;
            }
            Ok(())
        }
        (Value::Object(want), Value::Object(have)) => {
            for (key, item) in want {
                let Some(found) = have.get(key) else {
                    return Err(format!("{label}: missing property \"{key}\""));
                };
                check_subset(&format!("{label}.{key}"), found, item)?;
            }
            Ok(())
        }
        (want, have) if want == have => Ok(()),
        (want, have) => Err(format!("{label}: expected {want}, but found {have}")),
    }
}
