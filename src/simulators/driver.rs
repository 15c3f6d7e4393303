//! Circuit execution
//!
//! A [`CircuitDriver`] validates a circuit, allocates one buffer and runs the
//! operations strictly in order. It runs at most once.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::quantum::{Operation, QuantumBuffer, QuantumCircuit, Representation};
use crate::simulators::measurement::{self, MeasurementOutcome};
use crate::simulators::Evolver;

/// Lifecycle of a driver
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Created,
    Running,
    Completed,
    Failed(EngineError),
}

impl RunState {
    pub fn name(&self) -> &'static str {
        match self {
            RunState::Created => "created",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Failed(error) => write!(f, "failed: {}", error),
            other => f.write_str(other.name()),
        }
    }
}

/// Shared flag that stops a run between steps
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final buffer and every measurement recorded during a run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub buffer: QuantumBuffer,
    pub outcomes: Vec<MeasurementOutcome>,
    pub steps_executed: usize,
}

impl RunResult {
    /// Basis-state probabilities of the final buffer
    pub fn probabilities(&self) -> Vec<f64> {
        self.buffer.probabilities()
    }

    /// Measured bits in the order they were recorded
    pub fn bits(&self) -> String {
        self.outcomes.iter().map(|o| o.outcome.to_string()).collect()
    }
}

/// Runs one circuit in one representation
#[derive(Debug)]
pub struct CircuitDriver<'c> {
    circuit: &'c QuantumCircuit,
    representation: Representation,
    config: EngineConfig,
    cancellation: Option<CancellationToken>,
    state: RunState,
}

impl<'c> CircuitDriver<'c> {
    pub fn new(circuit: &'c QuantumCircuit, representation: Representation) -> Self {
        CircuitDriver {
            circuit,
            representation,
            config: EngineConfig::default(),
            cancellation: None,
            state: RunState::Created,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    /// Execute the circuit
    ///
    /// On failure the buffer is dropped and the driver moves to
    /// [`RunState::Failed`].
    pub fn run<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<RunResult> {
        if self.state != RunState::Created {
            return Err(EngineError::InvalidRunState {
                state: self.state.name(),
                expected: RunState::Created.name(),
            });
        }
        self.state = RunState::Running;
        debug!(
            qubits = self.circuit.qubit_count,
            operations = self.circuit.len(),
            representation = %self.representation,
            "starting circuit run"
        );

        match self.execute(rng) {
            Ok(result) => {
                info!(
                    steps = result.steps_executed,
                    measurements = result.outcomes.len(),
                    "circuit run completed"
                );
                self.state = RunState::Completed;
                Ok(result)
            }
            Err(error) => {
                warn!(%error, "circuit run failed");
                self.state = RunState::Failed(error.clone());
                Err(error)
            }
        }
    }

    fn check_circuit(&self) -> Result<()> {
        self.circuit.validate(&self.config)?;
        if self.representation == Representation::StateVector && !self.config.stochastic_channels {
            if let Some(Operation::Channel(channel)) =
                self.circuit.operations.iter().find(|op| matches!(op, Operation::Channel(_)))
            {
                return Err(EngineError::UnsupportedRepresentation {
                    operation: format!("channel {}", channel.name()),
                    representation: self.representation,
                });
            }
        }
        Ok(())
    }

    fn execute<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<RunResult> {
        self.check_circuit()?;

        let n = self.circuit.qubit_count;
        let mut buffer = QuantumBuffer::with_config(n, self.representation, &self.config)?;
        let mut evolver = Evolver::new(self.representation, &self.config);
        if self.circuit.has_channels() {
            evolver.reserve(n)?;
        }

        let mut outcomes = Vec::new();
        for (step, op) in self.circuit.operations.iter().enumerate() {
            if self.cancellation.as_ref().map_or(false, CancellationToken::is_cancelled) {
                return Err(EngineError::Cancelled { step });
            }

            match op {
                Operation::Gate(gate) => evolver.apply_gate(&mut buffer, gate)?,
                Operation::Channel(channel) => evolver.apply_channel(&mut buffer, channel, rng)?,
                Operation::Measure { qubits } => {
                    outcomes.extend(measurement::measure_qubits(&mut buffer, qubits, rng)?);
                }
                Operation::MeasureAll => {
                    let all: Vec<usize> = (0..n).collect();
                    outcomes.extend(measurement::measure_qubits(&mut buffer, &all, rng)?);
                }
            }

            if self.config.validate_state {
                buffer.validate(self.config.state_tolerance)?;
            }
        }

        Ok(RunResult {
            buffer,
            outcomes,
            steps_executed: self.circuit.len(),
        })
    }
}

/// Run `circuit` once with the default configuration
pub fn run_circuit<R: Rng + ?Sized>(
    circuit: &QuantumCircuit,
    representation: Representation,
    rng: &mut R,
) -> Result<RunResult> {
    CircuitDriver::new(circuit, representation).run(rng)
}
