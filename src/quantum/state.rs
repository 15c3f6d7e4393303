// src/quantum/state.rs
//! Pure quantum states
//!
//! A [`StateVector`] owns 2^n amplitudes in an aligned [`ComplexBuffer`].
//! Basis index bit i is the value of qubit i, so qubit 0 is the least
//! significant bit.

use std::fmt::{self, Debug, Display};

use ndarray::ArrayView1;
use num_complex::Complex64;

use crate::error::{EngineError, Result};
use crate::quantum::storage::ComplexBuffer;
use crate::quantum::Representation;

/// Behaviour shared by every register representation
pub trait QuantumState: Clone + Debug {
    /// Returns the number of qubits in this quantum state
    fn qubit_count(&self) -> usize;

    /// Returns the dimension of the Hilbert space (2^n for n qubits)
    fn dimension(&self) -> usize {
        1 << self.qubit_count()
    }

    /// Probability of each computational basis state
    fn probabilities(&self) -> Vec<f64>;

    /// Check normalization (and Hermiticity, for mixed states) within `tolerance`
    fn is_valid(&self, tolerance: f64) -> bool;
}

/// State vector representation of a quantum state
#[derive(Clone, Debug, PartialEq)]
pub struct StateVector {
    qubit_count: usize,
    buffer: ComplexBuffer,
}

impl StateVector {
    /// Create the zero state |00...0⟩
    pub fn new(qubit_count: usize) -> Result<Self> {
        Self::computational_basis(qubit_count, 0)
    }

    /// Create a state vector in the computational basis state |index⟩
    pub fn computational_basis(qubit_count: usize, index: usize) -> Result<Self> {
        let mut buffer = ComplexBuffer::for_register(qubit_count, Representation::StateVector)?;

        if index >= buffer.len() {
            return Err(EngineError::invalid_parameter(
                "index",
                format!("basis index {} out of range for {}-qubit state", index, qubit_count),
            ));
        }

        buffer.as_mut_slice()[index] = Complex64::new(1.0, 0.0);
        Ok(StateVector { qubit_count, buffer })
    }

    /// Create a state vector from explicit amplitudes
    ///
    /// The amplitudes must already be normalized to within 1e-9.
    pub fn from_amplitudes(qubit_count: usize, amplitudes: &[Complex64]) -> Result<Self> {
        let mut buffer = ComplexBuffer::for_register(qubit_count, Representation::StateVector)?;

        if amplitudes.len() != buffer.len() {
            return Err(EngineError::DimensionMismatch {
                expected: buffer.len(),
                actual: amplitudes.len(),
            });
        }
        buffer.as_mut_slice().copy_from_slice(amplitudes);

        let state = StateVector { qubit_count, buffer };
        let norm = state.norm();
        if (norm - 1.0).abs() > crate::config::DEFAULT_TOLERANCE {
            return Err(EngineError::InvalidState(format!(
                "state vector is not normalized (norm {})",
                norm
            )));
        }

        Ok(state)
    }

    pub fn qubit_count(&self) -> usize {
        self.qubit_count
    }

    pub fn dimension(&self) -> usize {
        self.buffer.len()
    }

    /// Get a reference to the amplitudes
    pub fn amplitudes(&self) -> &[Complex64] {
        self.buffer.as_slice()
    }

    /// Mutable access to the amplitudes
    ///
    /// Writes bypass the normalization invariant; call [`normalize`](Self::normalize)
    /// afterwards if the norm may have changed.
    pub fn amplitudes_mut(&mut self) -> &mut [Complex64] {
        self.buffer.as_mut_slice()
    }

    pub fn amplitude(&self, index: usize) -> Option<Complex64> {
        self.amplitudes().get(index).copied()
    }

    pub fn view(&self) -> ArrayView1<'_, Complex64> {
        self.buffer.view()
    }

    pub fn buffer(&self) -> &ComplexBuffer {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut ComplexBuffer {
        &mut self.buffer
    }

    /// L2 norm ‖ψ‖
    pub fn norm(&self) -> f64 {
        self.buffer.norm_sqr().sqrt()
    }

    /// Rescale by 1/‖ψ‖
    pub fn normalize(&mut self) -> Result<()> {
        let norm = self.norm();
        if norm == 0.0 || !norm.is_finite() {
            return Err(EngineError::InvalidState(format!(
                "cannot normalize state vector with norm {}",
                norm
            )));
        }
        self.buffer.scale(1.0 / norm);
        Ok(())
    }

    pub fn is_normalized(&self, tolerance: f64) -> bool {
        (self.norm() - 1.0).abs() <= tolerance
    }

    /// Calculate the probability of measuring the given basis index
    pub fn probability(&self, index: usize) -> f64 {
        self.amplitude(index).map_or(0.0, |a| a.norm_sqr())
    }

    /// Probability of each computational basis state
    pub fn probabilities(&self) -> Vec<f64> {
        self.amplitudes().iter().map(|a| a.norm_sqr()).collect()
    }

    /// Inner product ⟨self|other⟩
    pub fn inner_product(&self, other: &Self) -> Result<Complex64> {
        if self.qubit_count != other.qubit_count {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension(),
                actual: other.dimension(),
            });
        }

        Ok(self
            .amplitudes()
            .iter()
            .zip(other.amplitudes())
            .map(|(a, b)| a.conj() * b)
            .sum())
    }

    /// |⟨self|other⟩|²
    pub fn fidelity(&self, other: &Self) -> Result<f64> {
        Ok(self.inner_product(other)?.norm_sqr())
    }
}

impl QuantumState for StateVector {
    fn qubit_count(&self) -> usize {
        self.qubit_count
    }

    fn probabilities(&self) -> Vec<f64> {
        StateVector::probabilities(self)
    }

    fn is_valid(&self, tolerance: f64) -> bool {
        self.is_normalized(tolerance)
    }
}

impl Display for StateVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}-qubit state:", self.qubit_count)?;

        let threshold = 1e-10;
        let mut has_entries = false;

        for (i, amp) in self.amplitudes().iter().enumerate() {
            let prob = amp.norm_sqr();
            if prob > threshold {
                has_entries = true;
                let bit_string = format!("{:0width$b}", i, width = self.qubit_count);
                writeln!(
                    f,
                    "  ({:.6}{:+.6}i) |{}⟩ [{:.1}%]",
                    amp.re,
                    amp.im,
                    bit_string,
                    prob * 100.0
                )?;
            }
        }

        if !has_entries {
            writeln!(f, "  (zero state)")?;
        }

        Ok(())
    }
}
