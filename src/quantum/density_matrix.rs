//! Mixed quantum states
//!
//! A [`DensityMatrix`] stores the 2^n × 2^n matrix ρ row-major in a single
//! aligned buffer of 4^n entries. Entry (r, c) lives at flat index
//! `(r << n) | c`, which lets the evolvers treat ρ as a 2n-qubit vector.

use std::fmt::{self, Display};

use ndarray::Array2;
use num_complex::Complex64;

use crate::error::{EngineError, Result};
use crate::quantum::state::{QuantumState, StateVector};
use crate::quantum::storage::{kahan_sum, ComplexBuffer};
use crate::quantum::Representation;

/// Represents a quantum state as a density matrix
#[derive(Clone, Debug, PartialEq)]
pub struct DensityMatrix {
    qubit_count: usize,
    buffer: ComplexBuffer,
}

impl DensityMatrix {
    /// Create the pure zero state ρ = |0…0⟩⟨0…0|
    pub fn new(qubit_count: usize) -> Result<Self> {
        let mut buffer = ComplexBuffer::for_register(qubit_count, Representation::DensityMatrix)?;
        buffer.as_mut_slice()[0] = Complex64::new(1.0, 0.0);
        Ok(DensityMatrix { qubit_count, buffer })
    }

    /// Create a density matrix from a state vector: ρ = |ψ⟩⟨ψ|
    pub fn from_state_vector(state: &StateVector) -> Result<Self> {
        let qubit_count = state.qubit_count();
        let mut buffer = ComplexBuffer::for_register(qubit_count, Representation::DensityMatrix)?;
        let psi = state.amplitudes();
        let dim = psi.len();

        for (r, row) in buffer.as_mut_slice().chunks_mut(dim).enumerate() {
            for (c, entry) in row.iter_mut().enumerate() {
                *entry = psi[r] * psi[c].conj();
            }
        }

        Ok(DensityMatrix { qubit_count, buffer })
    }

    /// The maximally mixed state I / 2^n
    pub fn maximally_mixed(qubit_count: usize) -> Result<Self> {
        let mut buffer = ComplexBuffer::for_register(qubit_count, Representation::DensityMatrix)?;
        let dim = 1usize << qubit_count;
        let weight = Complex64::new(1.0 / dim as f64, 0.0);
        for i in 0..dim {
            buffer.as_mut_slice()[i * dim + i] = weight;
        }
        Ok(DensityMatrix { qubit_count, buffer })
    }

    /// Create a density matrix from a dense matrix, checking it is a valid state
    pub fn from_matrix(qubit_count: usize, matrix: &Array2<Complex64>) -> Result<Self> {
        let mut buffer = ComplexBuffer::for_register(qubit_count, Representation::DensityMatrix)?;
        let dim = 1usize << qubit_count;

        if matrix.shape() != [dim, dim] {
            return Err(EngineError::DimensionMismatch {
                expected: dim * dim,
                actual: matrix.len(),
            });
        }
        buffer.matrix_view_mut(dim)?.assign(matrix);

        let dm = DensityMatrix { qubit_count, buffer };
        if !dm.is_valid(crate::config::DEFAULT_TOLERANCE) {
            return Err(EngineError::InvalidState(
                "matrix is not Hermitian with unit trace and non-negative diagonal".to_string(),
            ));
        }
        Ok(dm)
    }

    pub fn qubit_count(&self) -> usize {
        self.qubit_count
    }

    /// Calculate the dimension of the Hilbert space
    pub fn dimension(&self) -> usize {
        1 << self.qubit_count
    }

    /// Entry ρ[row, col]
    pub fn get(&self, row: usize, col: usize) -> Option<Complex64> {
        let dim = self.dimension();
        if row >= dim || col >= dim {
            return None;
        }
        Some(self.entries()[row * dim + col])
    }

    /// The flat row-major entries
    pub fn entries(&self) -> &[Complex64] {
        self.buffer.as_slice()
    }

    /// Mutable flat entries; writes bypass the trace and Hermiticity invariants
    pub fn entries_mut(&mut self) -> &mut [Complex64] {
        self.buffer.as_mut_slice()
    }

    pub fn buffer(&self) -> &ComplexBuffer {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut ComplexBuffer {
        &mut self.buffer
    }

    /// Copy out as a dense matrix
    pub fn to_matrix(&self) -> Array2<Complex64> {
        let dim = self.dimension();
        let entries = self.entries();
        Array2::from_shape_fn((dim, dim), |(r, c)| entries[r * dim + c])
    }

    /// The real diagonal, i.e. the basis-state probabilities
    pub fn diagonal(&self) -> Vec<f64> {
        let dim = self.dimension();
        let entries = self.entries();
        (0..dim).map(|i| entries[i * dim + i].re).collect()
    }

    /// Calculate the trace of the density matrix
    pub fn trace(&self) -> f64 {
        kahan_sum(self.diagonal())
    }

    /// Rescale by 1/tr(ρ)
    pub fn normalize_trace(&mut self) -> Result<()> {
        let trace = self.trace();
        if trace <= 0.0 || !trace.is_finite() {
            return Err(EngineError::InvalidState(format!(
                "cannot normalize density matrix with trace {}",
                trace
            )));
        }
        self.buffer.scale(1.0 / trace);
        Ok(())
    }

    /// Calculate the purity Tr(ρ²)
    pub fn purity(&self) -> f64 {
        let dim = self.dimension();
        let entries = self.entries();
        kahan_sum((0..dim).flat_map(|r| {
            (0..dim).map(move |c| (entries[r * dim + c] * entries[c * dim + r]).re)
        }))
    }

    /// Frobenius norm ‖ρ − ρ†‖
    pub fn hermiticity_deviation(&self) -> f64 {
        let dim = self.dimension();
        let entries = self.entries();
        let mut sum = 0.0;
        for r in 0..dim {
            for c in (r + 1)..dim {
                sum += 2.0 * (entries[r * dim + c] - entries[c * dim + r].conj()).norm_sqr();
            }
            sum += (2.0 * entries[r * dim + r].im).powi(2);
        }
        sum.sqrt()
    }

    /// Check if the density matrix is valid
    ///
    /// Tests unit trace and Hermiticity, and uses a non-negative diagonal as a
    /// cheap necessary condition for positive semidefiniteness.
    pub fn is_valid(&self, tolerance: f64) -> bool {
        (self.trace() - 1.0).abs() <= tolerance
            && self.hermiticity_deviation() <= tolerance
            && self.diagonal().iter().all(|&p| p >= -tolerance)
    }

    /// ⟨ψ|ρ|ψ⟩
    pub fn fidelity_with(&self, state: &StateVector) -> Result<f64> {
        if state.qubit_count() != self.qubit_count {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension(),
                actual: state.dimension(),
            });
        }

        let dim = self.dimension();
        let psi = state.amplitudes();
        let entries = self.entries();
        let mut sum = Complex64::new(0.0, 0.0);
        for r in 0..dim {
            let row: Complex64 = (0..dim).map(|c| entries[r * dim + c] * psi[c]).sum();
            sum += psi[r].conj() * row;
        }
        Ok(sum.re)
    }

    /// Trace out `qubits`, keeping the others in their original relative order
    pub fn partial_trace(&self, qubits: &[usize]) -> Result<DensityMatrix> {
        let mut traced = qubits.to_vec();
        traced.sort_unstable();
        for pair in traced.windows(2) {
            if pair[0] == pair[1] {
                return Err(EngineError::DuplicateQubitIndex { index: pair[0] });
            }
        }
        if let Some(&index) = traced.iter().find(|&&q| q >= self.qubit_count) {
            return Err(EngineError::QubitIndexOutOfRange {
                index,
                qubit_count: self.qubit_count,
            });
        }

        let kept: Vec<usize> = (0..self.qubit_count).filter(|q| !traced.contains(q)).collect();
        let mut result = DensityMatrix {
            qubit_count: kept.len(),
            buffer: ComplexBuffer::for_register(kept.len(), Representation::DensityMatrix)?,
        };

        let dim = self.dimension();
        let reduced_dim = result.dimension();
        let entries = self.entries();
        let out = result.buffer.as_mut_slice();

        for r in 0..reduced_dim {
            for c in 0..reduced_dim {
                let mut sum = Complex64::new(0.0, 0.0);
                for k in 0..(1usize << traced.len()) {
                    let row = scatter_bits(r, &kept) | scatter_bits(k, &traced);
                    let col = scatter_bits(c, &kept) | scatter_bits(k, &traced);
                    sum += entries[row * dim + col];
                }
                out[r * reduced_dim + c] = sum;
            }
        }

        Ok(result)
    }
}

/// Place bit j of `value` at position `positions[j]`
fn scatter_bits(value: usize, positions: &[usize]) -> usize {
    positions
        .iter()
        .enumerate()
        .fold(0, |acc, (j, &q)| acc | (((value >> j) & 1) << q))
}

impl QuantumState for DensityMatrix {
    fn qubit_count(&self) -> usize {
        self.qubit_count
    }

    fn probabilities(&self) -> Vec<f64> {
        self.diagonal()
    }

    fn is_valid(&self, tolerance: f64) -> bool {
        DensityMatrix::is_valid(self, tolerance)
    }
}

impl Display for DensityMatrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}-qubit density matrix:", self.qubit_count)?;

        let threshold = 1e-10;
        let dim = self.dimension();
        let width = self.qubit_count;

        let purity = self.purity();
        writeln!(f, "Purity: {:.6} (pure: {})", purity, (purity - 1.0).abs() < 1e-10)?;

        if dim <= 16 {
            for r in 0..dim {
                for c in 0..dim {
                    let elem = self.entries()[r * dim + c];
                    if elem.norm_sqr() > threshold {
                        writeln!(
                            f,
                            "  |{:0width$b}⟩⟨{:0width$b}|: {:.6}{:+.6}i",
                            r,
                            c,
                            elem.re,
                            elem.im,
                            width = width
                        )?;
                    }
                }
            }
        } else {
            writeln!(f, "  (Matrix too large to display fully)")?;
            for (i, prob) in self.diagonal().into_iter().enumerate() {
                if prob > threshold {
                    writeln!(f, "  |{:0width$b}⟩: [{:.1}%]", i, prob * 100.0, width = width)?;
                }
            }
        }

        Ok(())
    }
}
