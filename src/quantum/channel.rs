//! Single-qubit noise channels
//!
//! A [`Channel`] is a set of 2×2 Kraus operators {K_i} acting on one qubit.
//! Construction checks completeness, Σ K_i†K_i = I, so a validated channel
//! is trace preserving.

use std::fmt::{self, Display};

use ndarray::{array, Array2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_TOLERANCE;
use crate::error::{EngineError, Result};
use crate::quantum::gate::adjoint;
use crate::quantum::gate::constants::{I, ONE, ZERO};

/// A noise channel on one qubit, given by its Kraus operators
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    name: String,
    target: usize,
    kraus: Vec<Array2<Complex64>>,
}

impl Channel {
    /// Build a channel, checking every operator is 2×2 and ‖Σ K†K − I‖ ≤ 1e-9
    pub fn new(name: &str, target: usize, kraus: Vec<Array2<Complex64>>) -> Result<Self> {
        Self::with_tolerance(name, target, kraus, DEFAULT_TOLERANCE)
    }

    pub fn with_tolerance(
        name: &str,
        target: usize,
        kraus: Vec<Array2<Complex64>>,
        tolerance: f64,
    ) -> Result<Self> {
        let channel = Self::from_kraus_unchecked(name, target, kraus);
        channel.check_operators(tolerance)?;
        Ok(channel)
    }

    /// Build a channel without any validation
    ///
    /// The evolvers validate again before use, so a malformed channel is
    /// reported as [`EngineError::InvalidChannel`] rather than corrupting ρ.
    pub fn from_kraus_unchecked(name: &str, target: usize, kraus: Vec<Array2<Complex64>>) -> Self {
        Channel {
            name: name.to_string(),
            target,
            kraus,
        }
    }

    /// Flip the qubit with probability p: {√(1−p) I, √p X}
    pub fn bit_flip(target: usize, p: f64) -> Result<Self> {
        check_probability("p", p)?;
        Self::new(
            "bit_flip",
            target,
            vec![scaled_identity(1.0 - p), array![[ZERO, ONE], [ONE, ZERO]] * sqrt(p)],
        )
    }

    /// Flip the phase with probability p: {√(1−p) I, √p Z}
    pub fn phase_flip(target: usize, p: f64) -> Result<Self> {
        check_probability("p", p)?;
        Self::new(
            "phase_flip",
            target,
            vec![scaled_identity(1.0 - p), array![[ONE, ZERO], [ZERO, -ONE]] * sqrt(p)],
        )
    }

    /// ρ → (1−p) ρ + p/3 (XρX + YρY + ZρZ)
    pub fn depolarizing(target: usize, p: f64) -> Result<Self> {
        check_probability("p", p)?;
        let w = sqrt(p / 3.0);
        Self::new(
            "depolarizing",
            target,
            vec![
                scaled_identity(1.0 - p),
                array![[ZERO, ONE], [ONE, ZERO]] * w,
                array![[ZERO, -I], [I, ZERO]] * w,
                array![[ONE, ZERO], [ZERO, -ONE]] * w,
            ],
        )
    }

    /// Energy relaxation |1⟩ → |0⟩ with probability γ
    pub fn amplitude_damping(target: usize, gamma: f64) -> Result<Self> {
        check_probability("gamma", gamma)?;
        let k0 = array![[ONE, ZERO], [ZERO, sqrt(1.0 - gamma)]];
        let k1 = array![[ZERO, sqrt(gamma)], [ZERO, ZERO]];
        Self::new("amplitude_damping", target, vec![k0, k1])
    }

    /// Loss of coherence without energy loss, off-diagonals scaled by √(1−λ)
    pub fn phase_damping(target: usize, lambda: f64) -> Result<Self> {
        check_probability("lambda", lambda)?;
        let k0 = array![[ONE, ZERO], [ZERO, sqrt(1.0 - lambda)]];
        let k1 = array![[ZERO, ZERO], [ZERO, sqrt(lambda)]];
        Self::new("phase_damping", target, vec![k0, k1])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn kraus(&self) -> &[Array2<Complex64>] {
        &self.kraus
    }

    /// The same channel on qubit `target + offset`
    pub fn offset(&self, offset: usize) -> Self {
        Channel {
            target: self.target + offset,
            ..self.clone()
        }
    }

    /// Frobenius norm ‖Σ K_i†K_i − I‖
    pub fn completeness_deviation(&self) -> f64 {
        if self.kraus.iter().any(|k| k.shape() != [2, 2]) {
            return f64::INFINITY;
        }
        let mut sum = Array2::<Complex64>::eye(2) * -ONE;
        for k in &self.kraus {
            sum = sum + adjoint(k).dot(k);
        }
        sum.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
    }

    /// Check the channel can be applied to an `qubit_count`-qubit register
    pub fn validate(&self, qubit_count: usize, tolerance: f64) -> Result<()> {
        if self.target >= qubit_count {
            return Err(EngineError::QubitIndexOutOfRange {
                index: self.target,
                qubit_count,
            });
        }
        self.check_operators(tolerance)
    }

    fn check_operators(&self, tolerance: f64) -> Result<()> {
        if self.kraus.is_empty() {
            return Err(EngineError::invalid_channel(&self.name, "no Kraus operators"));
        }
        if let Some((i, k)) = self.kraus.iter().enumerate().find(|(_, k)| k.shape() != [2, 2]) {
            return Err(EngineError::invalid_channel(
                &self.name,
                format!("Kraus operator {} has shape {:?}, expected [2, 2]", i, k.shape()),
            ));
        }
        let deviation = self.completeness_deviation();
        if !(deviation <= tolerance) {
            return Err(EngineError::invalid_channel(
                &self.name,
                format!("Kraus operators are not complete: |ΣK†K - I| = {:e}", deviation),
            ));
        }
        Ok(())
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}[{}] ({} Kraus operators)", self.name, self.target, self.kraus.len())
    }
}

fn check_probability(name: &str, p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(EngineError::invalid_parameter(
            name,
            format!("probability must lie in [0, 1], got {}", p),
        ));
    }
    Ok(())
}

fn sqrt(x: f64) -> Complex64 {
    Complex64::new(x.sqrt(), 0.0)
}

fn scaled_identity(weight: f64) -> Array2<Complex64> {
    Array2::<Complex64>::eye(2) * sqrt(weight)
}
