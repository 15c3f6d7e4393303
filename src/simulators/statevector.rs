//! State-vector evolution
//!
//! Applies gates to a [`StateVector`] in place with the strided kernels, and
//! optionally samples Kraus channels as quantum trajectories.

use num_complex::Complex64;
use rand::Rng;
use tracing::trace;

use crate::config::{EngineConfig, Parallelism};
use crate::error::{EngineError, Result};
use crate::quantum::{Channel, Gate, StateVector};
use crate::simulators::kernels;

/// In-place unitary evolution of a pure state
#[derive(Debug, Clone)]
pub struct StateVectorEvolver {
    parallelism: Parallelism,
    unitarity_tolerance: f64,
    channel_tolerance: f64,
    renormalize_interval: Option<usize>,
    stochastic_channels: bool,
    applied: usize,
}

impl Default for StateVectorEvolver {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl StateVectorEvolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        StateVectorEvolver {
            parallelism: config.parallelism(),
            unitarity_tolerance: config.unitarity_tolerance,
            channel_tolerance: config.channel_tolerance,
            renormalize_interval: config.renormalize_interval,
            stochastic_channels: config.stochastic_channels,
            applied: 0,
        }
    }

    /// Whether channels may be sampled as trajectories
    pub fn stochastic_channels(&self) -> bool {
        self.stochastic_channels
    }

    /// Number of gates and channels applied so far
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Apply a unitary gate in place
    ///
    /// Targets and unitarity are checked before the buffer is touched.
    pub fn apply_gate(&mut self, state: &mut StateVector, gate: &Gate) -> Result<()> {
        gate.validate(state.qubit_count(), self.unitarity_tolerance)?;
        kernels::apply_matrix(state.amplitudes_mut(), gate.matrix(), gate.qubits(), self.parallelism);
        trace!(gate = %gate, "applied gate to state vector");
        self.after_step(state)
    }

    /// Apply gates in order, stopping at the first error
    pub fn apply_gates(&mut self, state: &mut StateVector, gates: &[Gate]) -> Result<()> {
        gates.iter().try_for_each(|gate| self.apply_gate(state, gate))
    }

    /// Apply one randomly chosen Kraus operator of `channel`
    ///
    /// Operator K_i is picked with probability ‖K_i ψ‖² and the result is
    /// renormalized. Averaged over many runs this reproduces the channel.
    /// Returns the index of the chosen operator.
    pub fn apply_channel_stochastic<R: Rng + ?Sized>(
        &mut self,
        state: &mut StateVector,
        channel: &Channel,
        rng: &mut R,
    ) -> Result<usize> {
        channel.validate(state.qubit_count(), self.channel_tolerance)?;
        let target = channel.target();

        let weights: Vec<f64> = channel
            .kraus()
            .iter()
            .map(|k| branch_weight(state.amplitudes(), target, [k[[0, 0]], k[[0, 1]], k[[1, 0]], k[[1, 1]]]))
            .collect();
        let total: f64 = weights.iter().sum();
        if !(total > 0.0) {
            return Err(EngineError::InvalidState(format!(
                "channel {} has no branch with non-zero probability",
                channel.name()
            )));
        }

        let r = rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        let mut chosen = None;
        for (i, &w) in weights.iter().enumerate() {
            cumulative += w;
            if w > 0.0 && r < cumulative {
                chosen = Some(i);
                break;
            }
        }
        // Rounding can leave r just past the final sum
        let chosen = chosen
            .or_else(|| weights.iter().rposition(|&w| w > 0.0))
            .unwrap_or(0);

        kernels::apply_matrix(state.amplitudes_mut(), &channel.kraus()[chosen], &[target], self.parallelism);
        state.buffer_mut().scale(1.0 / weights[chosen].sqrt());

        trace!(channel = %channel, branch = chosen, "sampled channel branch");
        self.after_step(state)?;
        Ok(chosen)
    }

    fn after_step(&mut self, state: &mut StateVector) -> Result<()> {
        self.applied += 1;
        match self.renormalize_interval {
            Some(interval) if self.applied % interval == 0 => state.normalize(),
            _ => Ok(()),
        }
    }
}

/// ‖Kψ‖² for a 2×2 operator `k` (row-major) on `target`
fn branch_weight(amplitudes: &[Complex64], target: usize, k: [Complex64; 4]) -> f64 {
    let stride = 1usize << target;
    amplitudes
        .chunks(2 * stride)
        .flat_map(|chunk| {
            let (lo, hi) = chunk.split_at(stride);
            lo.iter().zip(hi)
        })
        .map(|(&a, &b)| (k[0] * a + k[1] * b).norm_sqr() + (k[2] * a + k[3] * b).norm_sqr())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::FRAC_1_SQRT_2;

    use crate::quantum::gate::{ParametrizedGate, StandardGate};

    #[test]
    fn test_hadamard_amplitudes() {
        let mut state = StateVector::new(1).unwrap();
        let mut evolver = StateVectorEvolver::new();
        evolver.apply_gate(&mut state, &Gate::h(0)).unwrap();
        assert_relative_eq!(state.amplitudes()[0].re, FRAC_1_SQRT_2, epsilon = 1e-12);
        assert_relative_eq!(state.amplitudes()[1].re, FRAC_1_SQRT_2, epsilon = 1e-12);
        assert_eq!(evolver.applied(), 1);
    }

    #[test]
    fn test_out_of_range_leaves_state_untouched() {
        let mut state = StateVector::new(2).unwrap();
        let before = state.clone();
        let mut evolver = StateVectorEvolver::new();
        let err = evolver.apply_gate(&mut state, &Gate::x(2)).unwrap_err();
        assert_eq!(err, EngineError::QubitIndexOutOfRange { index: 2, qubit_count: 2 });
        assert_eq!(state, before);
        assert_eq!(evolver.applied(), 0);
    }

    #[test]
    fn test_three_qubit_gate_uses_generic_kernel() {
        let mut state = StateVector::computational_basis(3, 0b011).unwrap();
        let mut evolver = StateVectorEvolver::new();
        evolver
            .apply_gate(&mut state, &Gate::standard(StandardGate::Toffoli, &[0, 1, 2]).unwrap())
            .unwrap();
        assert_relative_eq!(state.probability(0b111), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_periodic_renormalization() {
        let config = EngineConfig::new().with_renormalize_interval(Some(2));
        let mut evolver = StateVectorEvolver::from_config(&config);
        let mut state = StateVector::new(1).unwrap();
        state.amplitudes_mut()[0] = Complex64::new(1.0 + 1e-7, 0.0);

        let gate = Gate::parametrized(ParametrizedGate::Rz(0.1), &[0]).unwrap();
        evolver.apply_gate(&mut state, &gate).unwrap();
        assert!((state.norm() - 1.0).abs() > 1e-8);
        evolver.apply_gate(&mut state, &gate).unwrap();
        assert_relative_eq!(state.norm(), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_stochastic_bit_flip_statistics() {
        let channel = Channel::bit_flip(0, 0.25).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut evolver = StateVectorEvolver::new();
        let trials = 4000;
        let mut flips = 0;
        for _ in 0..trials {
            let mut state = StateVector::new(1).unwrap();
            if evolver.apply_channel_stochastic(&mut state, &channel, &mut rng).unwrap() == 1 {
                flips += 1;
                assert_relative_eq!(state.probability(1), 1.0, epsilon = 1e-12);
            }
            assert_relative_eq!(state.norm(), 1.0, epsilon = 1e-12);
        }
        let rate = flips as f64 / trials as f64;
        assert!((rate - 0.25).abs() < 0.03, "flip rate {}", rate);
    }

    #[test]
    fn test_stochastic_amplitude_damping_on_ground_state() {
        // |0⟩ is a fixed point, the decay branch has zero weight
        let channel = Channel::amplitude_damping(0, 0.9).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = StateVector::new(1).unwrap();
        let branch = StateVectorEvolver::new()
            .apply_channel_stochastic(&mut state, &channel, &mut rng)
            .unwrap();
        assert_eq!(branch, 0);
        assert_relative_eq!(state.probability(0), 1.0, epsilon = 1e-12);
    }
}
