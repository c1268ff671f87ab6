//! # Manatee Sim CLI
//!
//! Runs scripted sessions against a simulated cluster and validates
//! cluster-state documents.

use anyhow::Context;
use clap::{Parser, Subcommand};
use manatee::model::validate_cluster_state;
use manatee::sim::{parse_script, run_script};
use manatee::{PeerConfig, SimConfig, Simulator};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "manatee-sim")]
#[command(about = "Drive a manatee peer against simulated collaborators", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON script of simulator commands and print each result
    Run {
        /// Script file
        script: PathBuf,

        /// Configure the peer under test for single-node mode
        #[arg(long)]
        singleton: bool,

        /// Peer configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run every simulated operation without latency
        #[arg(long)]
        instant: bool,
    },

    /// Check a cluster-state document
    Validate {
        /// Cluster-state file (JSON)
        path: PathBuf,
    },

    /// Print the default peer configuration
    Defaults,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            script,
            singleton,
            config,
            instant,
        } => run(&script, singleton, config.as_deref(), instant).await,
        Commands::Validate { path } => validate(&path),
        Commands::Defaults => {
            println!("{}", serde_json::to_string_pretty(&PeerConfig::default())?);
            Ok(())
        }
    }
}

async fn run(
    script: &Path,
    singleton: bool,
    config: Option<&Path>,
    instant: bool,
) -> anyhow::Result<()> {
    let mut peer_config = match config {
        Some(path) => PeerConfig::load(path)
            .with_context(|| format!("loading peer config {}", path.display()))?,
        None => PeerConfig::default(),
    };
    if singleton {
        peer_config = peer_config.with_singleton(true);
    }
    let sim_config = if instant {
        SimConfig::instant()
    } else {
        SimConfig::default()
    };

    let raw = std::fs::read_to_string(script)
        .with_context(|| format!("reading script {}", script.display()))?;
    let steps = parse_script(&raw).context("parsing script")?;

    let mut sim = Simulator::new(peer_config, sim_config)?;
    let outputs = match run_script(&mut sim, &steps).await {
        Ok(outputs) => outputs,
        Err(err) => {
            eprintln!("{}", serde_json::to_string_pretty(&sim.peer())?);
            return Err(err).context("script failed");
        }
    };

    for output in &outputs {
        println!("{}", serde_json::to_string_pretty(output)?);
    }
    info!(steps = outputs.len(), "script finished");

    sim.shutdown().await?;
    Ok(())
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).context("parsing JSON")?;
    let state = validate_cluster_state(&value)?;

    println!(
        "generation {}: primary {}, sync {}, {} async, {} deposed",
        state.generation,
        state.primary,
        state
            .sync
            .as_ref()
            .map_or_else(|| "none".to_string(), |s| s.to_string()),
        state.asyncs.len(),
        state.deposed.len()
    );
    Ok(())
}
