//! Parameter-shift gradients of ⟨Z⟩
//!
//! For a rotation R(θ) = exp(−iθP/2) about a Pauli axis,
//! d⟨Z_q⟩/dθ = ½ (⟨Z_q⟩(θ + π/2) − ⟨Z_q⟩(θ − π/2)) exactly, so two extra
//! runs per angle give the gradient without finite-difference error.

use std::f64::consts::FRAC_PI_2;

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::quantum::{Operation, QuantumBuffer, QuantumCircuit, Representation};
use crate::simulators::measurement::expectation_z;
use crate::simulators::Evolver;

/// Gradients of every ⟨Z_q⟩ with respect to a set of rotation angles
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    /// Operation index of each differentiated rotation
    pub parameter_indices: Vec<usize>,
    /// `values[k][q]` is d⟨Z_q⟩/dθ_k for the rotation at `parameter_indices[k]`
    pub values: Vec<Vec<f64>>,
}

/// Operation indices of the Rx, Ry and Rz gates in `circuit`
pub fn rotation_indices(circuit: &QuantumCircuit) -> Vec<usize> {
    circuit
        .operations
        .iter()
        .enumerate()
        .filter_map(|(index, op)| match op {
            Operation::Gate(gate) if gate.axis_shift(0.0).is_some() => Some(index),
            _ => None,
        })
        .collect()
}

/// Differentiate every ⟨Z_q⟩ with respect to every rotation angle
pub fn parameter_shift_gradient(circuit: &QuantumCircuit, representation: Representation) -> Result<Gradient> {
    parameter_shift_gradient_for(circuit, representation, &rotation_indices(circuit))
}

/// Differentiate every ⟨Z_q⟩ with respect to the rotations at `indices`
///
/// The circuit must be gate-only and each index must name an Rx, Ry or Rz.
pub fn parameter_shift_gradient_for(
    circuit: &QuantumCircuit,
    representation: Representation,
    indices: &[usize],
) -> Result<Gradient> {
    let config = EngineConfig::default();
    circuit.validate(&config)?;
    if let Some(op) = circuit.operations.iter().find(|op| !op.is_gate()) {
        return Err(EngineError::invalid_parameter(
            "circuit",
            format!("gradients need a gate-only circuit, found {}", op),
        ));
    }

    let mut values = Vec::with_capacity(indices.len());
    for &index in indices {
        let plus = shifted_expectations(circuit, representation, &config, index, FRAC_PI_2)?;
        let minus = shifted_expectations(circuit, representation, &config, index, -FRAC_PI_2)?;
        values.push(plus.iter().zip(&minus).map(|(p, m)| 0.5 * (p - m)).collect());
    }

    debug!(
        parameters = indices.len(),
        qubits = circuit.qubit_count,
        "parameter-shift gradient computed"
    );
    Ok(Gradient {
        parameter_indices: indices.to_vec(),
        values,
    })
}

/// ⟨Z_q⟩ for every qubit after running `circuit` with the rotation at `index` shifted by `delta`
fn shifted_expectations(
    circuit: &QuantumCircuit,
    representation: Representation,
    config: &EngineConfig,
    index: usize,
    delta: f64,
) -> Result<Vec<f64>> {
    let shift = match circuit.operations.get(index) {
        Some(Operation::Gate(gate)) => gate.axis_shift(delta),
        _ => None,
    }
    .ok_or_else(|| {
        EngineError::invalid_parameter("indices", format!("operation {} is not an Rx, Ry or Rz gate", index))
    })?;

    let mut buffer = QuantumBuffer::with_config(circuit.qubit_count, representation, config)?;
    let mut evolver = Evolver::new(representation, config);
    for (position, op) in circuit.operations.iter().enumerate() {
        if let Operation::Gate(gate) = op {
            evolver.apply_gate(&mut buffer, gate)?;
        }
        if position == index {
            evolver.apply_gate(&mut buffer, &shift)?;
        }
    }

    (0..circuit.qubit_count)
        .map(|qubit| expectation_z(&buffer, qubit))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    use crate::quantum::CircuitBuilder;

    #[test]
    fn test_ry_on_ground_state() {
        // ⟨Z⟩ = cos θ after Ry(θ)|0⟩
        let theta = PI / 3.0;
        let mut builder = CircuitBuilder::new(1);
        builder.ry(0, theta).unwrap();
        let gradient = parameter_shift_gradient(&builder.build(), Representation::StateVector).unwrap();
        assert_eq!(gradient.parameter_indices, vec![0]);
        assert_relative_eq!(gradient.values[0][0], -theta.sin(), epsilon = 1e-12);
    }

    #[test]
    fn test_each_axis() {
        let theta = 0.7;
        let mut builder = CircuitBuilder::new(3);
        builder.rx(0, theta).unwrap();
        builder.h(1).unwrap();
        builder.rz(1, theta).unwrap();
        builder.h(1).unwrap();
        builder.ry(2, theta).unwrap();
        let circuit = builder.build();

        let gradient = parameter_shift_gradient(&circuit, Representation::StateVector).unwrap();
        assert_eq!(gradient.parameter_indices, vec![0, 2, 4]);
        // Each angle only moves its own qubit, and ⟨Z⟩ = cos θ on all three
        for (k, qubit) in [0, 1, 2].into_iter().enumerate() {
            for q in 0..3 {
                let expected = if q == qubit { -theta.sin() } else { 0.0 };
                assert_relative_eq!(gradient.values[k][q], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_entangled_gradient_and_representations_agree() {
        // Ry(a) then CNOT: ⟨Z0⟩ = ⟨Z1⟩ = cos a
        let a = 1.1;
        let mut builder = CircuitBuilder::new(2);
        builder.ry(0, a).unwrap();
        builder.cnot(0, 1).unwrap();
        builder.rx(1, 0.4).unwrap();
        let circuit = builder.build();

        let sv = parameter_shift_gradient(&circuit, Representation::StateVector).unwrap();
        let dm = parameter_shift_gradient(&circuit, Representation::DensityMatrix).unwrap();
        assert_relative_eq!(sv.values[0][0], -a.sin(), epsilon = 1e-12);
        // ⟨Z1⟩ = cos a · cos 0.4
        assert_relative_eq!(sv.values[0][1], -a.sin() * 0.4f64.cos(), epsilon = 1e-12);
        assert_relative_eq!(sv.values[1][1], -a.cos() * 0.4f64.sin(), epsilon = 1e-12);
        for (row_sv, row_dm) in sv.values.iter().zip(&dm.values) {
            for (x, y) in row_sv.iter().zip(row_dm) {
                assert_relative_eq!(*x, *y, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_selected_indices() {
        let mut builder = CircuitBuilder::new(1);
        builder.rx(0, 0.2).unwrap();
        builder.ry(0, 0.9).unwrap();
        let circuit = builder.build();

        let gradient = parameter_shift_gradient_for(&circuit, Representation::StateVector, &[1]).unwrap();
        assert_eq!(gradient.parameter_indices, vec![1]);
        assert_eq!(gradient.values.len(), 1);

        assert!(matches!(
            parameter_shift_gradient_for(&circuit, Representation::StateVector, &[2]),
            Err(EngineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_rejects_non_gate_circuits() {
        let mut builder = CircuitBuilder::new(1);
        builder.ry(0, 0.5).unwrap();
        builder.measure_all().unwrap();
        assert!(matches!(
            parameter_shift_gradient(&builder.build(), Representation::StateVector),
            Err(EngineError::InvalidParameter { .. })
        ));

        let mut builder = CircuitBuilder::new(1);
        builder.h(0).unwrap();
        assert!(matches!(
            parameter_shift_gradient_for(&builder.build(), Representation::StateVector, &[0]),
            Err(EngineError::InvalidParameter { .. })
        ));
    }
}
