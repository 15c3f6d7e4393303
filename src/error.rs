//! Error types for the simulation engine
//!
//! Every fallible operation in the crate returns [`EngineError`]. Validation
//! failures are raised before any buffer is touched, so an error never leaves
//! a half-updated state behind.

use thiserror::Error;

use crate::quantum::Representation;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while building or running a circuit
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The buffer for the requested register could not be allocated
    #[error("cannot allocate {entries} complex entries for a {qubit_count}-qubit {representation} buffer")]
    Allocation {
        qubit_count: usize,
        representation: Representation,
        /// Requested entry count, saturated at `usize::MAX` on overflow
        entries: usize,
    },

    /// Registers must hold at least one qubit
    #[error("invalid qubit count {qubit_count}")]
    InvalidQubitCount { qubit_count: usize },

    /// A target index does not exist in the register
    #[error("qubit index {index} out of range for {qubit_count}-qubit register")]
    QubitIndexOutOfRange { index: usize, qubit_count: usize },

    /// A multi-qubit operation names the same qubit twice
    #[error("qubit index {index} appears more than once")]
    DuplicateQubitIndex { index: usize },

    /// The number of targets does not match the gate
    #[error("gate {gate} acts on {expected} qubits, but {actual} were given")]
    ArityMismatch {
        gate: String,
        expected: usize,
        actual: usize,
    },

    /// A matrix or vector has the wrong size
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A user-supplied gate matrix failed the unitarity check
    #[error("gate {gate} is not unitary: |U†U - I| = {deviation:e}")]
    NonUnitaryMatrix { gate: String, deviation: f64 },

    /// A Kraus operator set is not trace preserving or malformed
    #[error("invalid channel {channel}: {reason}")]
    InvalidChannel { channel: String, reason: String },

    /// A numeric parameter is outside its domain
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The operation is not available for this buffer representation
    #[error("{operation} is not supported on a {representation} buffer")]
    UnsupportedRepresentation {
        operation: String,
        representation: Representation,
    },

    /// Post-selection on an outcome that cannot occur
    #[error("outcome {outcome} on qubit {qubit} has zero probability")]
    ZeroProbabilityOutcome { qubit: usize, outcome: u8 },

    /// The buffer violates a normalization or Hermiticity invariant
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The driver was asked to do something its current state forbids
    #[error("circuit driver is {state}, expected {expected}")]
    InvalidRunState {
        state: &'static str,
        expected: &'static str,
    },

    /// The run was cancelled between steps
    #[error("run cancelled before step {step}")]
    Cancelled { step: usize },

    /// A textual circuit could not be parsed
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// JSON encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Serialization(error.to_string())
    }
}

impl EngineError {
    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_channel(channel: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidChannel {
            channel: channel.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by a malformed gate or channel definition
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            EngineError::NonUnitaryMatrix { .. }
                | EngineError::InvalidChannel { .. }
                | EngineError::ArityMismatch { .. }
                | EngineError::DimensionMismatch { .. }
                | EngineError::InvalidParameter { .. }
        )
    }
}
