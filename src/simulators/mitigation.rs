//! Readout error mitigation
//!
//! Assumes every qubit has the same independent readout error, described by
//! the confusion matrix M = [[1−p01, p10], [p01, 1−p10]] where p01 is the
//! chance of reading 1 from a true 0 and p10 of reading 0 from a true 1.

use crate::error::{EngineError, Result};

/// Determinants smaller than this make M numerically singular
const SINGULAR_THRESHOLD: f64 = 1e-12;

/// Undo readout error on a measured distribution over `qubit_count` qubits
///
/// Applies M⁻¹ to each qubit with the pairwise stride update, then clips
/// negative quasi-probabilities and renormalizes.
pub fn mitigate_readout(probabilities: &[f64], qubit_count: usize, p01: f64, p10: f64) -> Result<Vec<f64>> {
    for (name, p) in [("p01", p01), ("p10", p10)] {
        if !(0.0..=1.0).contains(&p) {
            return Err(EngineError::invalid_parameter(
                name,
                format!("readout error must lie in [0, 1], got {}", p),
            ));
        }
    }
    let expected = u32::try_from(qubit_count)
        .ok()
        .filter(|_| qubit_count > 0)
        .and_then(|bits| 1usize.checked_shl(bits))
        .ok_or(EngineError::InvalidQubitCount { qubit_count })?;
    if probabilities.len() != expected {
        return Err(EngineError::DimensionMismatch {
            expected,
            actual: probabilities.len(),
        });
    }

    let det = 1.0 - p01 - p10;
    if det.abs() < SINGULAR_THRESHOLD {
        return Err(EngineError::invalid_parameter(
            "p01 + p10",
            "confusion matrix is singular when the error rates sum to 1",
        ));
    }
    let inverse = [[(1.0 - p10) / det, -p10 / det], [-p01 / det, (1.0 - p01) / det]];

    let mut mitigated = probabilities.to_vec();
    for qubit in 0..qubit_count {
        let stride = 1usize << qubit;
        for chunk in mitigated.chunks_mut(2 * stride) {
            let (lo, hi) = chunk.split_at_mut(stride);
            for (a, b) in lo.iter_mut().zip(hi.iter_mut()) {
                let (x, y) = (*a, *b);
                *a = inverse[0][0] * x + inverse[0][1] * y;
                *b = inverse[1][0] * x + inverse[1][1] * y;
            }
        }
    }

    mitigated.iter_mut().for_each(|p| *p = p.max(0.0));
    let total: f64 = mitigated.iter().sum();
    if total > 0.0 {
        mitigated.iter_mut().for_each(|p| *p /= total);
    }
    Ok(mitigated)
}
