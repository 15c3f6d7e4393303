//! Circuit model
//!
//! A [`QuantumCircuit`] is a qubit count plus an ordered list of
//! [`Operation`]s. It owns no buffer; the driver in
//! [`crate::simulators::driver`] executes it.

use std::fmt;

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, Parallelism};
use crate::error::{EngineError, Result};
use crate::quantum::gate::{check_distinct, check_range, ParametrizedGate, StandardGate};
use crate::quantum::{Channel, Gate};
use crate::simulators::kernels;

/// Largest circuit [`QuantumCircuit::to_unitary`] will expand
pub const MAX_UNITARY_QUBITS: usize = 10;

/// One step of a circuit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Gate(Gate),
    Channel(Channel),
    /// Measure the listed qubits in order
    Measure { qubits: Vec<usize> },
    /// Measure every qubit, lowest index first
    MeasureAll,
}

impl Operation {
    pub fn is_gate(&self) -> bool {
        matches!(self, Operation::Gate(_))
    }

    /// Check targets against an `qubit_count`-qubit register
    pub fn validate(&self, qubit_count: usize, config: &EngineConfig) -> Result<()> {
        match self {
            Operation::Gate(gate) => gate.validate(qubit_count, config.unitarity_tolerance),
            Operation::Channel(channel) => channel.validate(qubit_count, config.channel_tolerance),
            Operation::Measure { qubits } => {
                if qubits.is_empty() {
                    return Err(EngineError::invalid_parameter("qubits", "nothing to measure"));
                }
                check_range(qubits, qubit_count)?;
                check_distinct(qubits)
            }
            Operation::MeasureAll => Ok(()),
        }
    }

    fn offset(&self, offset: usize) -> Self {
        match self {
            Operation::Gate(gate) => Operation::Gate(gate.offset(offset)),
            Operation::Channel(channel) => Operation::Channel(channel.offset(offset)),
            Operation::Measure { qubits } => Operation::Measure {
                qubits: qubits.iter().map(|q| q + offset).collect(),
            },
            Operation::MeasureAll => Operation::MeasureAll,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Gate(gate) => write!(f, "{}", gate),
            Operation::Channel(channel) => write!(f, "{}", channel),
            Operation::Measure { qubits } => write!(f, "measure{:?}", qubits),
            Operation::MeasureAll => write!(f, "measure_all"),
        }
    }
}

impl From<Gate> for Operation {
    fn from(gate: Gate) -> Self {
        Operation::Gate(gate)
    }
}

impl From<Channel> for Operation {
    fn from(channel: Channel) -> Self {
        Operation::Channel(channel)
    }
}

/// A quantum circuit consisting of a sequence of operations
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantumCircuit {
    pub qubit_count: usize,
    pub operations: Vec<Operation>,
}

impl QuantumCircuit {
    /// Create a new empty quantum circuit
    pub fn new(qubit_count: usize) -> Self {
        QuantumCircuit {
            qubit_count,
            operations: Vec::new(),
        }
    }

    /// Append an operation after checking its targets fit the register
    pub fn push(&mut self, operation: impl Into<Operation>) -> Result<()> {
        let operation = operation.into();
        operation.validate(self.qubit_count, &EngineConfig::default())?;
        self.operations.push(operation);
        Ok(())
    }

    pub fn add_gate(&mut self, gate: Gate) -> Result<()> {
        self.push(gate)
    }

    pub fn add_channel(&mut self, channel: Channel) -> Result<()> {
        self.push(channel)
    }

    pub fn measure(&mut self, qubits: &[usize]) -> Result<()> {
        self.push(Operation::Measure {
            qubits: qubits.to_vec(),
        })
    }

    pub fn measure_all(&mut self) -> Result<()> {
        self.push(Operation::MeasureAll)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Get the number of gates in the circuit
    pub fn gate_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_gate()).count()
    }

    pub fn has_channels(&self) -> bool {
        self.operations.iter().any(|op| matches!(op, Operation::Channel(_)))
    }

    pub fn has_measurements(&self) -> bool {
        self.operations
            .iter()
            .any(|op| matches!(op, Operation::Measure { .. } | Operation::MeasureAll))
    }

    /// Check every operation against the register and tolerances in `config`
    pub fn validate(&self, config: &EngineConfig) -> Result<()> {
        if self.qubit_count == 0 {
            return Err(EngineError::InvalidQubitCount {
                qubit_count: self.qubit_count,
            });
        }
        self.operations
            .iter()
            .try_for_each(|op| op.validate(self.qubit_count, config))
    }

    /// Run `other` after this circuit
    pub fn compose(&self, other: &QuantumCircuit) -> Result<QuantumCircuit> {
        if self.qubit_count != other.qubit_count {
            return Err(EngineError::DimensionMismatch {
                expected: self.qubit_count,
                actual: other.qubit_count,
            });
        }
        let mut result = self.clone();
        result.operations.extend(other.operations.iter().cloned());
        Ok(result)
    }

    /// Place `other` on fresh qubits above this circuit's register
    pub fn tensor(&self, other: &QuantumCircuit) -> QuantumCircuit {
        let mut result = QuantumCircuit::new(self.qubit_count + other.qubit_count);
        result.operations = self.operations.clone();
        result
            .operations
            .extend(other.operations.iter().map(|op| op.offset(self.qubit_count)));
        result
    }

    /// Create the adjoint (dagger) of a gate-only circuit
    pub fn adjoint(&self) -> Result<QuantumCircuit> {
        let mut result = QuantumCircuit::new(self.qubit_count);
        for op in self.operations.iter().rev() {
            match op {
                Operation::Gate(gate) => result.operations.push(Operation::Gate(gate.inverse())),
                other => {
                    return Err(EngineError::invalid_parameter(
                        "circuit",
                        format!("{} has no adjoint", other),
                    ))
                }
            }
        }
        Ok(result)
    }

    /// The full 2^n × 2^n unitary of a gate-only circuit
    pub fn to_unitary(&self) -> Result<Array2<Complex64>> {
        let n = self.qubit_count;
        if n == 0 || n > MAX_UNITARY_QUBITS {
            return Err(EngineError::invalid_parameter(
                "qubit_count",
                format!("unitary expansion supports 1 to {} qubits, got {}", MAX_UNITARY_QUBITS, n),
            ));
        }
        let config = EngineConfig::default();
        let dim = 1usize << n;

        // Row-major identity; U acts on the row bits, which sit above bit n
        let mut entries = vec![Complex64::new(0.0, 0.0); dim * dim];
        for i in 0..dim {
            entries[i * dim + i] = Complex64::new(1.0, 0.0);
        }

        for op in &self.operations {
            let gate = match op {
                Operation::Gate(gate) => gate,
                other => {
                    return Err(EngineError::invalid_parameter(
                        "circuit",
                        format!("{} cannot be expressed as a unitary", other),
                    ))
                }
            };
            gate.validate(n, config.unitarity_tolerance)?;
            let shifted: Vec<usize> = gate.qubits().iter().map(|q| q + n).collect();
            kernels::apply_matrix(&mut entries, gate.matrix(), &shifted, Parallelism::default());
        }

        Array2::from_shape_vec((dim, dim), entries).map_err(|_| EngineError::DimensionMismatch {
            expected: dim * dim,
            actual: dim * dim,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a circuit from JSON; operations are validated before returning
    pub fn from_json(json: &str) -> Result<Self> {
        let circuit: QuantumCircuit = serde_json::from_str(json)?;
        circuit.validate(&EngineConfig::default())?;
        Ok(circuit)
    }
}

impl fmt::Display for QuantumCircuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "QuantumCircuit ({} qubits, {} operations)", self.qubit_count, self.operations.len())?;
        for (i, op) in self.operations.iter().enumerate() {
            writeln!(f, "  {:>3}: {}", i, op)?;
        }
        Ok(())
    }
}

/// A builder for quantum circuits
#[derive(Debug, Clone)]
pub struct CircuitBuilder {
    circuit: QuantumCircuit,
}

impl CircuitBuilder {
    /// Create a new circuit builder
    pub fn new(qubit_count: usize) -> Self {
        CircuitBuilder {
            circuit: QuantumCircuit::new(qubit_count),
        }
    }

    /// Build the quantum circuit
    pub fn build(self) -> QuantumCircuit {
        self.circuit
    }

    pub fn add_gate(&mut self, gate: Gate) -> Result<()> {
        self.circuit.add_gate(gate)
    }

    pub fn add_standard(&mut self, gate: StandardGate, qubits: &[usize]) -> Result<()> {
        self.add_gate(Gate::standard(gate, qubits)?)
    }

    pub fn add_parametrized(&mut self, gate: ParametrizedGate, qubits: &[usize]) -> Result<()> {
        self.add_gate(Gate::parametrized(gate, qubits)?)
    }

    /// Add a Hadamard gate
    pub fn h(&mut self, qubit: usize) -> Result<()> {
        self.add_gate(Gate::h(qubit))
    }

    /// Add a Pauli-X gate
    pub fn x(&mut self, qubit: usize) -> Result<()> {
        self.add_gate(Gate::x(qubit))
    }

    /// Add a Pauli-Y gate
    pub fn y(&mut self, qubit: usize) -> Result<()> {
        self.add_gate(Gate::y(qubit))
    }

    /// Add a Pauli-Z gate
    pub fn z(&mut self, qubit: usize) -> Result<()> {
        self.add_gate(Gate::z(qubit))
    }

    pub fn s(&mut self, qubit: usize) -> Result<()> {
        self.add_gate(Gate::s(qubit))
    }

    pub fn t(&mut self, qubit: usize) -> Result<()> {
        self.add_gate(Gate::t(qubit))
    }

    /// Add a CNOT gate
    pub fn cnot(&mut self, control: usize, target: usize) -> Result<()> {
        self.add_standard(StandardGate::CNOT, &[control, target])
    }

    pub fn cz(&mut self, control: usize, target: usize) -> Result<()> {
        self.add_standard(StandardGate::CZ, &[control, target])
    }

    /// Add a SWAP gate
    pub fn swap(&mut self, qubit1: usize, qubit2: usize) -> Result<()> {
        self.add_standard(StandardGate::SWAP, &[qubit1, qubit2])
    }

    /// Add a Toffoli gate (CCNOT)
    pub fn toffoli(&mut self, control1: usize, control2: usize, target: usize) -> Result<()> {
        self.add_standard(StandardGate::Toffoli, &[control1, control2, target])
    }

    /// Add an Rx gate
    pub fn rx(&mut self, qubit: usize, theta: f64) -> Result<()> {
        self.add_parametrized(ParametrizedGate::Rx(theta), &[qubit])
    }

    /// Add an Ry gate
    pub fn ry(&mut self, qubit: usize, theta: f64) -> Result<()> {
        self.add_parametrized(ParametrizedGate::Ry(theta), &[qubit])
    }

    /// Add an Rz gate
    pub fn rz(&mut self, qubit: usize, theta: f64) -> Result<()> {
        self.add_parametrized(ParametrizedGate::Rz(theta), &[qubit])
    }

    /// Add a controlled Rz gate
    pub fn crz(&mut self, control: usize, target: usize, theta: f64) -> Result<()> {
        self.add_parametrized(ParametrizedGate::CRz(theta), &[control, target])
    }

    pub fn u3(&mut self, qubit: usize, theta: f64, phi: f64, lambda: f64) -> Result<()> {
        self.add_parametrized(ParametrizedGate::U3(theta, phi, lambda), &[qubit])
    }

    pub fn bit_flip(&mut self, qubit: usize, p: f64) -> Result<()> {
        self.circuit.add_channel(Channel::bit_flip(qubit, p)?)
    }

    pub fn phase_flip(&mut self, qubit: usize, p: f64) -> Result<()> {
        self.circuit.add_channel(Channel::phase_flip(qubit, p)?)
    }

    pub fn depolarizing(&mut self, qubit: usize, p: f64) -> Result<()> {
        self.circuit.add_channel(Channel::depolarizing(qubit, p)?)
    }

    pub fn amplitude_damping(&mut self, qubit: usize, gamma: f64) -> Result<()> {
        self.circuit.add_channel(Channel::amplitude_damping(qubit, gamma)?)
    }

    pub fn phase_damping(&mut self, qubit: usize, lambda: f64) -> Result<()> {
        self.circuit.add_channel(Channel::phase_damping(qubit, lambda)?)
    }

    pub fn measure(&mut self, qubits: &[usize]) -> Result<()> {
        self.circuit.measure(qubits)
    }

    pub fn measure_all(&mut self) -> Result<()> {
        self.circuit.measure_all()
    }

    /// Create a Bell pair (entangled state)
    pub fn bell_pair(&mut self, qubit1: usize, qubit2: usize) -> Result<()> {
        self.h(qubit1)?;
        self.cnot(qubit1, qubit2)
    }

    /// Reverse the gates collected so far, replacing each by its inverse
    pub fn adjoint(mut self) -> Result<Self> {
        self.circuit = self.circuit.adjoint()?;
        Ok(self)
    }
}
