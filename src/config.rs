//! Engine configuration
//!
//! Tolerances, register limits and kernel scheduling knobs shared by the
//! evolvers and the circuit driver. All fields have defaults, so a config can
//! be deserialized from partial JSON.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default tolerance for unitarity and channel completeness checks
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Configuration for buffer allocation, validation and gate kernels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest register accepted in state-vector mode (2^n entries)
    pub max_state_vector_qubits: usize,

    /// Largest register accepted in density-matrix mode (4^n entries)
    pub max_density_matrix_qubits: usize,

    /// Tolerance on |U†U - I| when registering custom gates
    pub unitarity_tolerance: f64,

    /// Tolerance on |ΣK†K - I| when validating channels
    pub channel_tolerance: f64,

    /// Tolerance used by post-step invariant checks
    pub state_tolerance: f64,

    /// Renormalize after this many gate or channel applications
    pub renormalize_interval: Option<usize>,

    /// Split kernel loops across the rayon pool
    pub parallel: bool,

    /// Minimum buffer length before the kernels go parallel
    pub parallel_threshold: usize,

    /// Execute channels as sampled trajectories in state-vector mode
    pub stochastic_channels: bool,

    /// Check norm/trace/Hermiticity after every step of a run
    pub validate_state: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_state_vector_qubits: 28,
            max_density_matrix_qubits: 14,
            unitarity_tolerance: DEFAULT_TOLERANCE,
            channel_tolerance: DEFAULT_TOLERANCE,
            state_tolerance: DEFAULT_TOLERANCE,
            renormalize_interval: Some(256),
            parallel: true,
            parallel_threshold: 1 << 14,
            stochastic_channels: false,
            validate_state: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_qubits(mut self, state_vector: usize, density_matrix: usize) -> Self {
        self.max_state_vector_qubits = state_vector;
        self.max_density_matrix_qubits = density_matrix;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.unitarity_tolerance = tolerance;
        self.channel_tolerance = tolerance;
        self.state_tolerance = tolerance;
        self
    }

    pub fn with_renormalize_interval(mut self, interval: Option<usize>) -> Self {
        self.renormalize_interval = interval.filter(|&n| n > 0);
        self
    }

    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_stochastic_channels(mut self, enabled: bool) -> Self {
        self.stochastic_channels = enabled;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_state = enabled;
        self
    }

    /// Kernel scheduling derived from this config
    pub fn parallelism(&self) -> Parallelism {
        Parallelism {
            enabled: self.parallel,
            threshold: self.parallel_threshold,
        }
    }

    /// Parse a config from JSON, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// When the gate kernels hand their blocks to rayon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parallelism {
    pub enabled: bool,
    pub threshold: usize,
}

impl Parallelism {
    /// Never split work across threads
    pub const SEQUENTIAL: Parallelism = Parallelism {
        enabled: false,
        threshold: usize::MAX,
    };

    #[inline]
    pub fn use_parallel(&self, len: usize) -> bool {
        self.enabled && len >= self.threshold
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        EngineConfig::default().parallelism()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{ "parallel": false, "max_density_matrix_qubits": 6 }"#).unwrap();
        assert!(!config.parallel);
        assert_eq!(config.max_density_matrix_qubits, 6);
        assert_eq!(config.max_state_vector_qubits, 28);
        assert_eq!(config.renormalize_interval, Some(256));
    }

    #[test]
    fn test_zero_interval_disables_renormalization() {
        let config = EngineConfig::new().with_renormalize_interval(Some(0));
        assert_eq!(config.renormalize_interval, None);
    }

    #[test]
    fn test_parallelism_threshold() {
        let p = EngineConfig::new().with_parallel_threshold(8).parallelism();
        assert!(!p.use_parallel(4));
        assert!(p.use_parallel(8));
        assert!(!Parallelism::SEQUENTIAL.use_parallel(usize::MAX));
    }
}
