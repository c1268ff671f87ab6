//! # Manatee Sim
//!
//! In-process stand-ins for the coordination service and the local
//! database, and a [`Simulator`] that drives one real peer against them on
//! simulated time.

pub mod config;
pub mod coordination;
pub mod database;
pub mod error;
pub mod script;
pub mod simulator;

pub use config::SimConfig;
pub use coordination::{SimCoordination, SimCoordinationClient};
pub use database::{SimDatabase, SimDatabaseStatus};
pub use error::SimError;
pub use script::{check_subset, parse_script, run_script, Command, Step, StepOutput};
pub use simulator::Simulator;
