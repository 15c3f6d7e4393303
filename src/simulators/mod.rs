//! Quantum circuit simulators
//!
//! Gate kernels, the two evolvers, measurement and the circuit driver.

pub mod kernels;
pub mod statevector;
pub mod density;
pub mod measurement;
pub mod driver;
pub mod mitigation;
pub mod gradient;

use rand::Rng;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::quantum::{Channel, Gate, QuantumBuffer, Representation};

pub use density::{DensityMatrixEvolver, ScratchArena};
pub use gradient::{parameter_shift_gradient, parameter_shift_gradient_for, Gradient};
pub use driver::{run_circuit, CancellationToken, CircuitDriver, RunResult, RunState};
pub use measurement::{MeasurementOutcome, Outcome};
pub use mitigation::mitigate_readout;
pub use statevector::StateVectorEvolver;

/// The evolver matching a buffer's representation
#[derive(Debug)]
pub enum Evolver {
    StateVector(StateVectorEvolver),
    DensityMatrix(DensityMatrixEvolver),
}

impl Evolver {
    pub fn new(representation: Representation, config: &EngineConfig) -> Self {
        match representation {
            Representation::StateVector => Evolver::StateVector(StateVectorEvolver::from_config(config)),
            Representation::DensityMatrix => Evolver::DensityMatrix(DensityMatrixEvolver::from_config(config)),
        }
    }

    pub fn representation(&self) -> Representation {
        match self {
            Evolver::StateVector(_) => Representation::StateVector,
            Evolver::DensityMatrix(_) => Representation::DensityMatrix,
        }
    }

    /// Pre-allocate channel scratch space; a no-op for state vectors
    pub fn reserve(&mut self, qubit_count: usize) -> Result<()> {
        match self {
            Evolver::StateVector(_) => Ok(()),
            Evolver::DensityMatrix(evolver) => evolver.reserve(qubit_count),
        }
    }

    pub fn apply_gate(&mut self, buffer: &mut QuantumBuffer, gate: &Gate) -> Result<()> {
        match (self, buffer) {
            (Evolver::StateVector(evolver), QuantumBuffer::StateVector(state)) => evolver.apply_gate(state, gate),
            (Evolver::DensityMatrix(evolver), QuantumBuffer::DensityMatrix(rho)) => evolver.apply_gate(rho, gate),
            (_, buffer) => Err(mismatch("gate", buffer)),
        }
    }

    /// Apply a channel; state vectors need stochastic channels enabled
    pub fn apply_channel<R: Rng + ?Sized>(
        &mut self,
        buffer: &mut QuantumBuffer,
        channel: &Channel,
        rng: &mut R,
    ) -> Result<()> {
        match (self, buffer) {
            (Evolver::StateVector(evolver), QuantumBuffer::StateVector(state)) if evolver.stochastic_channels() => {
                evolver.apply_channel_stochastic(state, channel, rng).map(|_| ())
            }
            (Evolver::DensityMatrix(evolver), QuantumBuffer::DensityMatrix(rho)) => evolver.apply_channel(rho, channel),
            (_, buffer) => Err(mismatch(&format!("channel {}", channel.name()), buffer)),
        }
    }
}

fn mismatch(operation: &str, buffer: &QuantumBuffer) -> EngineError {
    EngineError::UnsupportedRepresentation {
        operation: operation.to_string(),
        representation: buffer.representation(),
    }
}

/// Apply a gate to either representation with the default configuration
pub fn apply_gate(buffer: &mut QuantumBuffer, gate: &Gate) -> Result<()> {
    Evolver::new(buffer.representation(), &EngineConfig::default()).apply_gate(buffer, gate)
}

/// Apply a channel to a density matrix
///
/// State vectors are refused with [`EngineError::UnsupportedRepresentation`];
/// use [`StateVectorEvolver::apply_channel_stochastic`] for trajectories.
pub fn apply_channel(buffer: &mut QuantumBuffer, channel: &Channel) -> Result<()> {
    match buffer {
        QuantumBuffer::DensityMatrix(rho) => DensityMatrixEvolver::new().apply_channel(rho, channel),
        QuantumBuffer::StateVector(_) => Err(mismatch(&format!("channel {}", channel.name()), &*buffer)),
    }
}
