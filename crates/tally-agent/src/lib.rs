//! # tally-agent
//!
//! Driver loop for the tally uptime recorder. The binary in `main.rs` wires
//! settings, logging and signals around [`Driver`]. [`Simulation`] drives the
//! same loop on a hand-stepped clock with a flaky link, for exercising a
//! collector.

#![deny(unsafe_code)]

pub mod driver;
pub mod link;
pub mod simulate;
pub mod status;

pub use driver::{Driver, DriverConfig};
pub use link::LinkMonitor;
pub use simulate::{Simulation, SimulationConfig, SimulationError, SimulationReport};
pub use status::StatusReport;
