//! The register buffer owned by a simulation run
//!
//! [`QuantumBuffer`] is a closed variant over the two representations the
//! engine evolves: a pure [`StateVector`] or a mixed [`DensityMatrix`].

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::quantum::{DensityMatrix, StateVector};

/// How a register is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Representation {
    /// 2^n amplitudes
    StateVector,
    /// 2^n × 2^n matrix, 4^n entries
    DensityMatrix,
}

impl Representation {
    pub fn name(&self) -> &'static str {
        match self {
            Representation::StateVector => "state-vector",
            Representation::DensityMatrix => "density-matrix",
        }
    }

    /// Number of complex entries for an `qubit_count`-qubit register, if it fits in `usize`
    pub fn entry_count(&self, qubit_count: usize) -> Option<usize> {
        let bits = match self {
            Representation::StateVector => qubit_count,
            Representation::DensityMatrix => qubit_count.checked_mul(2)?,
        };
        1usize.checked_shl(u32::try_from(bits).ok()?)
    }
}

impl Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A register in either representation
#[derive(Debug, Clone, PartialEq)]
pub enum QuantumBuffer {
    StateVector(StateVector),
    DensityMatrix(DensityMatrix),
}

impl QuantumBuffer {
    /// Allocate a register in |0…0⟩ using the default limits
    pub fn new(qubit_count: usize, representation: Representation) -> Result<Self> {
        Self::with_config(qubit_count, representation, &EngineConfig::default())
    }

    /// Allocate a register in |0…0⟩, refusing registers above the configured limit
    pub fn with_config(
        qubit_count: usize,
        representation: Representation,
        config: &EngineConfig,
    ) -> Result<Self> {
        if qubit_count == 0 {
            return Err(EngineError::InvalidQubitCount { qubit_count });
        }

        let limit = match representation {
            Representation::StateVector => config.max_state_vector_qubits,
            Representation::DensityMatrix => config.max_density_matrix_qubits,
        };
        if qubit_count > limit {
            return Err(EngineError::Allocation {
                qubit_count,
                representation,
                entries: representation.entry_count(qubit_count).unwrap_or(usize::MAX),
            });
        }

        Ok(match representation {
            Representation::StateVector => QuantumBuffer::StateVector(StateVector::new(qubit_count)?),
            Representation::DensityMatrix => {
                QuantumBuffer::DensityMatrix(DensityMatrix::new(qubit_count)?)
            }
        })
    }

    pub fn qubit_count(&self) -> usize {
        match self {
            QuantumBuffer::StateVector(sv) => sv.qubit_count(),
            QuantumBuffer::DensityMatrix(dm) => dm.qubit_count(),
        }
    }

    pub fn representation(&self) -> Representation {
        match self {
            QuantumBuffer::StateVector(_) => Representation::StateVector,
            QuantumBuffer::DensityMatrix(_) => Representation::DensityMatrix,
        }
    }

    /// Hilbert space dimension 2^n
    pub fn dimension(&self) -> usize {
        1 << self.qubit_count()
    }

    /// Basis-state probabilities (|ψ_i|² or ρ_ii)
    pub fn probabilities(&self) -> Vec<f64> {
        match self {
            QuantumBuffer::StateVector(sv) => sv.probabilities(),
            QuantumBuffer::DensityMatrix(dm) => dm.diagonal(),
        }
    }

    /// Correct floating-point drift: rescale to unit norm or unit trace
    pub fn renormalize(&mut self) -> Result<()> {
        match self {
            QuantumBuffer::StateVector(sv) => sv.normalize(),
            QuantumBuffer::DensityMatrix(dm) => dm.normalize_trace(),
        }
    }

    /// Check the representation's invariants, reporting the first violation
    pub fn validate(&self, tolerance: f64) -> Result<()> {
        match self {
            QuantumBuffer::StateVector(sv) => {
                let norm = sv.norm();
                if (norm - 1.0).abs() > tolerance {
                    return Err(EngineError::InvalidState(format!(
                        "state vector norm {} deviates from 1",
                        norm
                    )));
                }
            }
            QuantumBuffer::DensityMatrix(dm) => {
                let trace = dm.trace();
                if (trace - 1.0).abs() > tolerance {
                    return Err(EngineError::InvalidState(format!(
                        "density matrix trace {} deviates from 1",
                        trace
                    )));
                }
                let deviation = dm.hermiticity_deviation();
                if deviation > tolerance {
                    return Err(EngineError::InvalidState(format!(
                        "density matrix is not Hermitian (|ρ - ρ†| = {:e})",
                        deviation
                    )));
                }
                if let Some((i, p)) = dm.diagonal().into_iter().enumerate().find(|(_, p)| *p < -tolerance) {
                    return Err(EngineError::InvalidState(format!(
                        "density matrix has negative diagonal entry {} at index {}",
                        p, i
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn as_state_vector(&self) -> Option<&StateVector> {
        match self {
            QuantumBuffer::StateVector(sv) => Some(sv),
            QuantumBuffer::DensityMatrix(_) => None,
        }
    }

    pub fn as_state_vector_mut(&mut self) -> Option<&mut StateVector> {
        match self {
            QuantumBuffer::StateVector(sv) => Some(sv),
            QuantumBuffer::DensityMatrix(_) => None,
        }
    }

    pub fn as_density_matrix(&self) -> Option<&DensityMatrix> {
        match self {
            QuantumBuffer::DensityMatrix(dm) => Some(dm),
            QuantumBuffer::StateVector(_) => None,
        }
    }

    pub fn as_density_matrix_mut(&mut self) -> Option<&mut DensityMatrix> {
        match self {
            QuantumBuffer::DensityMatrix(dm) => Some(dm),
            QuantumBuffer::StateVector(_) => None,
        }
    }

    /// Convert to a density matrix; a state vector becomes |ψ⟩⟨ψ|
    pub fn to_density_matrix(&self) -> Result<DensityMatrix> {
        match self {
            QuantumBuffer::StateVector(sv) => DensityMatrix::from_state_vector(sv),
            QuantumBuffer::DensityMatrix(dm) => Ok(dm.clone()),
        }
    }
}

impl From<StateVector> for QuantumBuffer {
    fn from(state: StateVector) -> Self {
        QuantumBuffer::StateVector(state)
    }
}

impl From<DensityMatrix> for QuantumBuffer {
    fn from(state: DensityMatrix) -> Self {
        QuantumBuffer::DensityMatrix(state)
    }
}

impl Display for QuantumBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QuantumBuffer::StateVector(sv) => Display::fmt(sv, f),
            QuantumBuffer::DensityMatrix(dm) => Display::fmt(dm, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_buffer_both_representations() {
        let sv = QuantumBuffer::new(3, Representation::StateVector).unwrap();
        assert_eq!(sv.representation(), Representation::StateVector);
        assert_eq!(sv.probabilities(), vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let dm = QuantumBuffer::new(2, Representation::DensityMatrix).unwrap();
        assert_eq!(dm.qubit_count(), 2);
        assert_eq!(dm.as_density_matrix().unwrap().entries().len(), 16);
        assert!(dm.validate(1e-12).is_ok());
    }

    #[test]
    fn test_limits_report_allocation_error() {
        let config = EngineConfig::new().with_max_qubits(4, 2);
        let err = QuantumBuffer::with_config(3, Representation::DensityMatrix, &config).unwrap_err();
        assert_eq!(
            err,
            EngineError::Allocation {
                qubit_count: 3,
                representation: Representation::DensityMatrix,
                entries: 64,
            }
        );

        let err = QuantumBuffer::new(200, Representation::StateVector).unwrap_err();
        assert!(matches!(err, EngineError::Allocation { entries: usize::MAX, .. }));
        assert!(matches!(
            QuantumBuffer::new(0, Representation::StateVector),
            Err(EngineError::InvalidQubitCount { qubit_count: 0 })
        ));
    }

    #[test]
    fn test_entry_count() {
        assert_eq!(Representation::StateVector.entry_count(10), Some(1024));
        assert_eq!(Representation::DensityMatrix.entry_count(10), Some(1 << 20));
        assert_eq!(Representation::DensityMatrix.entry_count(40), None);
    }

    #[test]
    fn test_validate_detects_drift() {
        let mut buffer = QuantumBuffer::new(1, Representation::StateVector).unwrap();
        buffer.as_state_vector_mut().unwrap().amplitudes_mut()[0] *= 1.01;
        assert!(matches!(buffer.validate(1e-9), Err(EngineError::InvalidState(_))));
        buffer.renormalize().unwrap();
        assert!(buffer.validate(1e-9).is_ok());
    }
}
