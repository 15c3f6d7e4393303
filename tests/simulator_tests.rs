use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;

use qsx::config::EngineConfig;
use qsx::quantum::{CircuitBuilder, Gate, QuantumBuffer, QuantumCircuit, Representation, StateVector};
use qsx::simulators::measurement::{
    collapse, expectation_z, joint_probabilities, measure, measure_qubits, query_probability,
};
use qsx::simulators::{
    apply_gate, mitigate_readout, parameter_shift_gradient, run_circuit, CircuitDriver, Outcome, StateVectorEvolver,
};

/// Helper function for comparing complex numbers with tolerance
fn complex_approx_eq(a: Complex64, b: Complex64, epsilon: f64) -> bool {
    (a - b).norm() < epsilon
}

/// Helper function for comparing f64 with tolerance
fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

/// A three-qubit circuit with enough structure to entangle everything
fn scrambler() -> QuantumCircuit {
    let mut builder = CircuitBuilder::new(3);
    builder.h(0).unwrap();
    builder.ry(1, 0.8).unwrap();
    builder.cnot(0, 2).unwrap();
    builder.crz(2, 1, 1.3).unwrap();
    builder.t(2).unwrap();
    builder.rx(0, 0.35).unwrap();
    builder.toffoli(0, 2, 1).unwrap();
    builder.swap(0, 1).unwrap();
    builder.build()
}

#[test]
fn test_simulator_hadamard() {
    let mut buffer = QuantumBuffer::new(1, Representation::StateVector).unwrap();
    apply_gate(&mut buffer, &Gate::h(0)).unwrap();

    let amplitudes = buffer.as_state_vector().unwrap().amplitudes();
    let sqrt2_inv = 1.0 / 2.0_f64.sqrt();
    assert!(complex_approx_eq(amplitudes[0], Complex64::new(sqrt2_inv, 0.0), 1e-10));
    assert!(complex_approx_eq(amplitudes[1], Complex64::new(sqrt2_inv, 0.0), 1e-10));

    let (p0, p1) = query_probability(&buffer, 0).unwrap();
    assert!(approx_eq(p0, 0.5, 1e-10));
    assert!(approx_eq(p1, 0.5, 1e-10));
}

#[test]
fn test_simulator_bell_state() {
    // Create a Bell state circuit
    let mut builder = CircuitBuilder::new(2);
    builder.h(0).unwrap();
    builder.cnot(0, 1).unwrap();
    let circuit = builder.build();

    let mut rng = StdRng::seed_from_u64(2024);
    let result = run_circuit(&circuit, Representation::StateVector, &mut rng).unwrap();

    // Check that the state is a Bell state
    let amplitudes = result.buffer.as_state_vector().unwrap().amplitudes();
    let sqrt2_inv = 1.0 / 2.0_f64.sqrt();
    assert!(complex_approx_eq(amplitudes[0], Complex64::new(sqrt2_inv, 0.0), 1e-10));
    assert!(complex_approx_eq(amplitudes[1], Complex64::new(0.0, 0.0), 1e-10));
    assert!(complex_approx_eq(amplitudes[2], Complex64::new(0.0, 0.0), 1e-10));
    assert!(complex_approx_eq(amplitudes[3], Complex64::new(sqrt2_inv, 0.0), 1e-10));

    let (p0, p1) = query_probability(&result.buffer, 1).unwrap();
    assert!(approx_eq(p0, 0.5, 1e-10));
    assert!(approx_eq(p1, 0.5, 1e-10));

    // Measuring qubit 0 forces qubit 1
    let mut buffer = result.buffer;
    let first = measure(&mut buffer, 0, &mut rng).unwrap();
    let (q0, q1) = query_probability(&buffer, 1).unwrap();
    match first.outcome {
        Outcome::Zero => assert!(approx_eq(q0, 1.0, 1e-10)),
        Outcome::One => assert!(approx_eq(q1, 1.0, 1e-10)),
    }
}

#[test]
fn test_measuring_twice_gives_same_outcome() {
    let circuit = scrambler();
    let mut rng = StdRng::seed_from_u64(77);

    for repr in [Representation::StateVector, Representation::DensityMatrix] {
        for _ in 0..25 {
            let mut buffer = run_circuit(&circuit, repr, &mut rng).unwrap().buffer;
            for qubit in 0..3 {
                let first = measure(&mut buffer, qubit, &mut rng).unwrap();
                let second = measure(&mut buffer, qubit, &mut rng).unwrap();
                assert_eq!(first.outcome, second.outcome);
                assert!(approx_eq(second.probability, 1.0, 1e-9));
            }
        }
    }
}

#[test]
fn test_probabilities_sum_to_one() {
    let circuit = scrambler();
    let mut rng = StdRng::seed_from_u64(1);
    for repr in [Representation::StateVector, Representation::DensityMatrix] {
        let buffer = run_circuit(&circuit, repr, &mut rng).unwrap().buffer;
        for qubit in 0..3 {
            let (p0, p1) = query_probability(&buffer, qubit).unwrap();
            assert!(approx_eq(p0 + p1, 1.0, 1e-12));
        }
        assert!(approx_eq(buffer.probabilities().iter().sum::<f64>(), 1.0, 1e-9));
    }
}

#[test]
fn test_measurement_order_does_not_change_joint_distribution() {
    let circuit = scrambler();
    let mut rng = StdRng::seed_from_u64(3);

    for repr in [Representation::StateVector, Representation::DensityMatrix] {
        let buffer = run_circuit(&circuit, repr, &mut rng).unwrap().buffer;

        // P(a, b) via A-then-B and via B-then-A, computed exactly by post-selection
        let sequential = |first: usize, second: usize| -> Vec<f64> {
            let mut joint = vec![0.0; 4];
            for a in [Outcome::Zero, Outcome::One] {
                let mut branch = buffer.clone();
                let pa = match collapse(&mut branch, first, a) {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                let (b0, b1) = query_probability(&branch, second).unwrap();
                let ia = a.as_u8() as usize;
                if first < second {
                    joint[ia] += pa * b0;
                    joint[ia | 2] += pa * b1;
                } else {
                    joint[ia << 1] += pa * b0;
                    joint[(ia << 1) | 1] += pa * b1;
                }
            }
            joint
        };

        let a_then_b = sequential(0, 2);
        let b_then_a = sequential(2, 0);
        let direct = joint_probabilities(&buffer, &[0, 2]).unwrap();
        for i in 0..4 {
            assert!(approx_eq(a_then_b[i], b_then_a[i], 1e-12), "{:?} entry {}", repr, i);
            assert!(approx_eq(a_then_b[i], direct[i], 1e-12), "{:?} entry {}", repr, i);
        }
    }
}

#[test]
fn test_sampled_measurements_agree_across_orders() {
    let circuit = scrambler();
    let mut rng = StdRng::seed_from_u64(99);
    let shots = 3000;
    let mut forward = [0usize; 4];
    let mut backward = [0usize; 4];

    for _ in 0..shots {
        let mut buffer = run_circuit(&circuit, Representation::StateVector, &mut rng).unwrap().buffer;
        let out = measure_qubits(&mut buffer, &[0, 1], &mut rng).unwrap();
        forward[out[0].outcome.as_u8() as usize | (out[1].outcome.as_u8() as usize) << 1] += 1;

        let mut buffer = run_circuit(&circuit, Representation::StateVector, &mut rng).unwrap().buffer;
        let out = measure_qubits(&mut buffer, &[1, 0], &mut rng).unwrap();
        backward[out[1].outcome.as_u8() as usize | (out[0].outcome.as_u8() as usize) << 1] += 1;
    }

    for i in 0..4 {
        let f = forward[i] as f64 / shots as f64;
        let b = backward[i] as f64 / shots as f64;
        assert!((f - b).abs() < 0.05, "outcome {}: {} vs {}", i, f, b);
    }
}

#[test]
fn test_state_vector_and_density_matrix_agree() {
    let circuit = scrambler();
    let mut rng = StdRng::seed_from_u64(0);
    let sv = run_circuit(&circuit, Representation::StateVector, &mut rng).unwrap();
    let dm = run_circuit(&circuit, Representation::DensityMatrix, &mut rng).unwrap();

    for (a, b) in sv.probabilities().iter().zip(dm.probabilities()) {
        assert!(approx_eq(*a, b, 1e-12));
    }

    let state = sv.buffer.as_state_vector().unwrap();
    let fidelity = dm.buffer.as_density_matrix().unwrap().fidelity_with(state).unwrap();
    assert!(approx_eq(fidelity, 1.0, 1e-12));
}

#[test]
fn test_norm_preserved_over_long_sequences() {
    let mut evolver = StateVectorEvolver::from_config(&EngineConfig::new().with_renormalize_interval(None));
    let mut state = StateVector::new(5).unwrap();
    for layer in 0..200 {
        let q = layer % 5;
        evolver.apply_gate(&mut state, &Gate::h(q)).unwrap();
        evolver.apply_gate(&mut state, &Gate::rz(0.1 * layer as f64, (q + 1) % 5).unwrap()).unwrap();
        evolver.apply_gate(&mut state, &Gate::cnot(q, (q + 2) % 5).unwrap()).unwrap();
    }
    assert!(approx_eq(state.norm(), 1.0, 1e-9));

    // Renormalizing a well-formed state changes nothing measurable
    let before = state.clone();
    state.normalize().unwrap();
    for (a, b) in state.amplitudes().iter().zip(before.amplitudes()) {
        assert!(complex_approx_eq(*a, *b, 1e-12));
    }
}

#[test]
fn test_parallel_and_sequential_kernels_agree() {
    let circuit = scrambler();
    let mut rng = StdRng::seed_from_u64(0);
    let parallel = EngineConfig::new().with_parallel(true).with_parallel_threshold(2);
    let sequential = EngineConfig::new().with_parallel(false);

    for repr in [Representation::StateVector, Representation::DensityMatrix] {
        let a = CircuitDriver::new(&circuit, repr).with_config(parallel.clone()).run(&mut rng).unwrap();
        let b = CircuitDriver::new(&circuit, repr).with_config(sequential.clone()).run(&mut rng).unwrap();
        assert_eq!(a.buffer, b.buffer);
    }
}

#[test]
fn test_qsx_file_runs_end_to_end() {
    let source = "\
# GHZ state with noise
QUBITS 3
H 0
CNOT 0 1
CNOT 1 2
DEPOL 2 0.0
MEASURE ALL
";
    let circuit: QuantumCircuit = source.parse().unwrap();
    let mut rng = StdRng::seed_from_u64(8);
    let result = run_circuit(&circuit, Representation::DensityMatrix, &mut rng).unwrap();
    let bits = result.bits();
    assert!(bits == "000" || bits == "111", "{}", bits);
    assert_eq!(result.steps_executed, 5);
}

#[test]
fn test_qasm_program_runs_end_to_end() {
    let source = r#"OPENQASM 2.0;
include "qelib1.inc";
qreg q[3];
creg c[3];
h q[0];
cx q[0],q[1];
cx q[1],q[2];
rz(pi/3) q[2];
measure q -> c;
"#;
    let circuit = QuantumCircuit::from_qasm(source).unwrap();
    for repr in [Representation::StateVector, Representation::DensityMatrix] {
        let result = run_circuit(&circuit, repr, &mut StdRng::seed_from_u64(21)).unwrap();
        let bits = result.bits();
        assert!(bits == "000" || bits == "111", "{}", bits);
    }
}

fn ansatz(a: f64, b: f64) -> QuantumCircuit {
    let mut builder = CircuitBuilder::new(3);
    builder.h(0).unwrap();
    builder.ry(1, a).unwrap();
    builder.cnot(0, 2).unwrap();
    builder.crz(2, 1, 1.3).unwrap();
    builder.rx(0, b).unwrap();
    builder.toffoli(0, 2, 1).unwrap();
    builder.build()
}

fn z_expectations(circuit: &QuantumCircuit) -> Vec<f64> {
    let buffer = run_circuit(circuit, Representation::StateVector, &mut StdRng::seed_from_u64(0))
        .unwrap()
        .buffer;
    (0..3).map(|q| expectation_z(&buffer, q).unwrap()).collect()
}

#[test]
fn test_parameter_shift_matches_finite_difference() {
    let (a, b) = (0.8, 0.35);
    let gradient = parameter_shift_gradient(&ansatz(a, b), Representation::StateVector).unwrap();
    assert_eq!(gradient.parameter_indices, vec![1, 4]);

    let h = 1e-5;
    let shifted = [
        (z_expectations(&ansatz(a + h, b)), z_expectations(&ansatz(a - h, b))),
        (z_expectations(&ansatz(a, b + h)), z_expectations(&ansatz(a, b - h))),
    ];
    for (k, (plus, minus)) in shifted.iter().enumerate() {
        for q in 0..3 {
            let numeric = (plus[q] - minus[q]) / (2.0 * h);
            assert!(approx_eq(gradient.values[k][q], numeric, 1e-6), "d<Z{}>/dθ{}", q, k);
        }
    }
}

#[test]
fn test_readout_mitigation_recovers_distribution() {
    let mut builder = CircuitBuilder::new(2);
    builder.ry(0, 1.1).unwrap();
    builder.cnot(0, 1).unwrap();
    let circuit = builder.build();
    let ideal = run_circuit(&circuit, Representation::StateVector, &mut StdRng::seed_from_u64(0))
        .unwrap()
        .probabilities();

    // Push the ideal distribution through the confusion matrix on each qubit
    let (p01, p10) = (0.03, 0.08);
    let mut noisy = ideal.clone();
    for qubit in 0..2 {
        let stride = 1 << qubit;
        for chunk in noisy.chunks_mut(2 * stride) {
            let (lo, hi) = chunk.split_at_mut(stride);
            for (a, b) in lo.iter_mut().zip(hi.iter_mut()) {
                let (x, y) = (*a, *b);
                *a = (1.0 - p01) * x + p10 * y;
                *b = p01 * x + (1.0 - p10) * y;
            }
        }
    }

    let mitigated = mitigate_readout(&noisy, 2, p01, p10).unwrap();
    for (m, i) in mitigated.iter().zip(&ideal) {
        assert!(approx_eq(*m, *i, 1e-10));
    }
}
