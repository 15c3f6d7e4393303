//! qsx: a state-vector and density-matrix quantum circuit simulator
//!
//! Circuits are built with [`quantum::CircuitBuilder`] or parsed from `.qsx`
//! text or JSON, then executed by [`simulators::CircuitDriver`] on either a
//! pure state vector or a mixed density matrix. Qubit 0 is the least
//! significant bit of every basis index.

pub mod error;
pub mod config;
pub mod quantum;
pub mod simulators;

pub use config::EngineConfig;
pub use error::{EngineError, Result};

// Create a prelude module for convenient imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::error::{EngineError, Result};
    pub use crate::quantum::prelude::*;
    pub use crate::simulators::measurement::{measure, query_probability};
    pub use crate::simulators::{
        apply_channel, apply_gate, run_circuit, CancellationToken, CircuitDriver, MeasurementOutcome, Outcome,
        RunResult, RunState,
    };
}

// Version and crate information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
