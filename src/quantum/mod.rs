//! Quantum registers, gates, channels and circuits
//!
//! This module holds the data model: the aligned amplitude storage, the two
//! register representations, the gate and channel catalog, and the circuit
//! description the driver executes.

pub mod storage;
pub mod buffer;
pub mod state;
pub mod density_matrix;
pub mod gate;
pub mod channel;
pub mod circuit;
pub mod parser;
pub mod qasm;

pub use buffer::{QuantumBuffer, Representation};
pub use channel::Channel;
pub use circuit::{CircuitBuilder, Operation, QuantumCircuit};
pub use density_matrix::DensityMatrix;
pub use gate::{Gate, GateTargets, ParametrizedGate, QuantumGate, StandardGate};
pub use parser::parse_qsx;
pub use qasm::parse_qasm;
pub use state::{QuantumState, StateVector};
pub use storage::ComplexBuffer;

/// Re-export commonly used types and traits
pub mod prelude {
    pub use super::{QuantumBuffer, QuantumState, Representation, StateVector, DensityMatrix};
    pub use super::{Gate, QuantumGate, StandardGate, ParametrizedGate, Channel};
    pub use super::{QuantumCircuit, CircuitBuilder, Operation};
}
