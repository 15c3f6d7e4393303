//! Projective measurement in the computational basis
//!
//! Probabilities are read from |ψ_i|² for state vectors and from the diagonal
//! ρ_ii for density matrices. Collapse zeroes the inconsistent amplitudes (or
//! rows and columns) and renormalizes. Randomness always comes from the
//! caller's generator.

use std::collections::HashMap;
use std::fmt;

use num_complex::Complex64;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{EngineError, Result};
use crate::quantum::gate::{check_distinct, check_range};
use crate::quantum::storage::kahan_sum;
use crate::quantum::QuantumBuffer;

/// Outcomes below this probability cannot be post-selected
pub const ZERO_PROBABILITY: f64 = 1e-12;

/// Result of measuring one qubit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Zero,
    One,
}

impl Outcome {
    pub fn from_bit(bit: bool) -> Self {
        if bit {
            Outcome::One
        } else {
            Outcome::Zero
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Outcome::Zero => 0,
            Outcome::One => 1,
        }
    }

    fn matches(&self, index: usize, qubit: usize) -> bool {
        (index >> qubit) & 1 == self.as_u8() as usize
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Zero => write!(f, "0"),
            Outcome::One => write!(f, "1"),
        }
    }
}

/// A recorded measurement: which qubit, what was seen, and how likely it was
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementOutcome {
    pub qubit: usize,
    pub outcome: Outcome,
    pub probability: f64,
}

impl fmt::Display for MeasurementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}={} (p={:.4})", self.qubit, self.outcome, self.probability)
    }
}

/// Probability of reading 0 and 1 on `qubit`, without collapsing
///
/// The pair is normalised so that p0 + p1 = 1 even if the buffer has drifted.
pub fn query_probability(buffer: &QuantumBuffer, qubit: usize) -> Result<(f64, f64)> {
    check_range(&[qubit], buffer.qubit_count())?;

    let mask = 1usize << qubit;
    let (p0, p1) = match buffer {
        QuantumBuffer::StateVector(sv) => {
            let amps = sv.amplitudes();
            (
                kahan_sum(amps.iter().enumerate().filter(|(i, _)| i & mask == 0).map(|(_, a)| a.norm_sqr())),
                kahan_sum(amps.iter().enumerate().filter(|(i, _)| i & mask != 0).map(|(_, a)| a.norm_sqr())),
            )
        }
        QuantumBuffer::DensityMatrix(dm) => {
            let diagonal = dm.diagonal();
            (
                kahan_sum(diagonal.iter().enumerate().filter(|(i, _)| i & mask == 0).map(|(_, p)| *p)),
                kahan_sum(diagonal.iter().enumerate().filter(|(i, _)| i & mask != 0).map(|(_, p)| *p)),
            )
        }
    };

    let total = p0 + p1;
    if !(total > 0.0) || !total.is_finite() {
        return Err(EngineError::InvalidState(format!(
            "total probability {} cannot be normalised",
            total
        )));
    }
    Ok((p0 / total, p1 / total))
}

/// Expectation value of Pauli Z on `qubit`, p0 − p1
pub fn expectation_z(buffer: &QuantumBuffer, qubit: usize) -> Result<f64> {
    let (p0, p1) = query_probability(buffer, qubit)?;
    Ok(p0 - p1)
}

/// Distribution over the 2^k outcomes of `qubits`, without collapsing
///
/// Bit j of an outcome index is the value of `qubits[j]`.
pub fn joint_probabilities(buffer: &QuantumBuffer, qubits: &[usize]) -> Result<Vec<f64>> {
    check_range(qubits, buffer.qubit_count())?;
    check_distinct(qubits)?;

    let mut distribution = vec![0.0; 1 << qubits.len()];
    for (index, p) in buffer.probabilities().into_iter().enumerate() {
        distribution[gather_bits(index, qubits)] += p;
    }

    let total: f64 = distribution.iter().sum();
    if total > 0.0 {
        distribution.iter_mut().for_each(|p| *p /= total);
    }
    Ok(distribution)
}

/// Measure `qubit`, collapsing the buffer onto the observed outcome
pub fn measure<R: Rng + ?Sized>(buffer: &mut QuantumBuffer, qubit: usize, rng: &mut R) -> Result<MeasurementOutcome> {
    let (p0, p1) = query_probability(buffer, qubit)?;
    let r = rng.gen::<f64>();
    let (outcome, probability) = if r < p0 { (Outcome::Zero, p0) } else { (Outcome::One, p1) };

    project(buffer, qubit, outcome)?;
    trace!(qubit, %outcome, probability, "measured qubit");
    Ok(MeasurementOutcome {
        qubit,
        outcome,
        probability,
    })
}

/// Measure several qubits one after another, in the order given
pub fn measure_qubits<R: Rng + ?Sized>(
    buffer: &mut QuantumBuffer,
    qubits: &[usize],
    rng: &mut R,
) -> Result<Vec<MeasurementOutcome>> {
    check_range(qubits, buffer.qubit_count())?;
    check_distinct(qubits)?;
    qubits.iter().map(|&q| measure(buffer, q, rng)).collect()
}

/// Sample a full basis state and collapse onto it, returning its index
pub fn measure_all<R: Rng + ?Sized>(buffer: &mut QuantumBuffer, rng: &mut R) -> Result<usize> {
    let probabilities = buffer.probabilities();
    let total: f64 = probabilities.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(EngineError::InvalidState(format!(
            "total probability {} cannot be sampled",
            total
        )));
    }
    let index = sample_index(&probabilities, rng);

    match buffer {
        QuantumBuffer::StateVector(sv) => {
            let amps = sv.amplitudes_mut();
            let kept = amps[index];
            amps.iter_mut().for_each(|a| *a = Complex64::new(0.0, 0.0));
            // Keep the global phase of the surviving amplitude
            amps[index] = kept / kept.norm();
            if !amps[index].is_finite() {
                amps[index] = Complex64::new(1.0, 0.0);
            }
        }
        QuantumBuffer::DensityMatrix(dm) => {
            let dim = dm.dimension();
            let entries = dm.entries_mut();
            entries.iter_mut().for_each(|e| *e = Complex64::new(0.0, 0.0));
            entries[index * dim + index] = Complex64::new(1.0, 0.0);
        }
    }

    trace!(index, probability = probabilities[index], "measured all qubits");
    Ok(index)
}

/// Post-select `qubit` on `outcome`, returning the outcome's probability
pub fn collapse(buffer: &mut QuantumBuffer, qubit: usize, outcome: Outcome) -> Result<f64> {
    let (p0, p1) = query_probability(buffer, qubit)?;
    let probability = match outcome {
        Outcome::Zero => p0,
        Outcome::One => p1,
    };
    if probability < ZERO_PROBABILITY {
        return Err(EngineError::ZeroProbabilityOutcome {
            qubit,
            outcome: outcome.as_u8(),
        });
    }
    project(buffer, qubit, outcome)?;
    Ok(probability)
}

/// Repeatedly sample `qubits` without disturbing the buffer
pub fn sample_counts<R: Rng + ?Sized>(
    buffer: &QuantumBuffer,
    qubits: &[usize],
    shots: usize,
    rng: &mut R,
) -> Result<HashMap<Vec<Outcome>, usize>> {
    let distribution = joint_probabilities(buffer, qubits)?;
    let mut results = HashMap::new();

    for _ in 0..shots {
        let index = sample_index(&distribution, rng);
        let outcomes: Vec<Outcome> = (0..qubits.len()).map(|j| Outcome::from_bit((index >> j) & 1 == 1)).collect();
        *results.entry(outcomes).or_insert(0) += 1;
    }

    Ok(results)
}

fn project(buffer: &mut QuantumBuffer, qubit: usize, outcome: Outcome) -> Result<()> {
    let zero = Complex64::new(0.0, 0.0);
    match buffer {
        QuantumBuffer::StateVector(sv) => {
            for (i, a) in sv.amplitudes_mut().iter_mut().enumerate() {
                if !outcome.matches(i, qubit) {
                    *a = zero;
                }
            }
            sv.normalize()
        }
        QuantumBuffer::DensityMatrix(dm) => {
            let n = dm.qubit_count();
            let col_mask = (1usize << n) - 1;
            for (i, e) in dm.entries_mut().iter_mut().enumerate() {
                if !outcome.matches(i >> n, qubit) || !outcome.matches(i & col_mask, qubit) {
                    *e = zero;
                }
            }
            dm.normalize_trace()
        }
    }
}

/// Cumulative sampling; falls back to the last non-zero entry on rounding
fn sample_index<R: Rng + ?Sized>(probabilities: &[f64], rng: &mut R) -> usize {
    let total: f64 = probabilities.iter().sum();
    let r = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, &p) in probabilities.iter().enumerate() {
        cumulative += p;
        if p > 0.0 && r < cumulative {
            return i;
        }
    }
    probabilities.iter().rposition(|&p| p > 0.0).unwrap_or(0)
}

fn gather_bits(index: usize, qubits: &[usize]) -> usize {
    qubits
        .iter()
        .enumerate()
        .fold(0, |acc, (j, &q)| acc | (((index >> q) & 1) << j))
}
