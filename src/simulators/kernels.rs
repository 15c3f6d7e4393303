//! Strided gate-application kernels
//!
//! Every kernel updates a flat amplitude slice in place. The index space is
//! partitioned into blocks aligned on the highest target bit, and each block
//! is owned by exactly one worker, so no two threads ever touch the same
//! amplitude group.
//!
//! Callers validate targets beforehand; kernels only `debug_assert!`.

use ndarray::Array2;
use num_complex::Complex64;
use rayon::prelude::*;

use crate::config::Parallelism;
use crate::quantum::gate::MAX_GATE_QUBITS;

const MAX_DIM: usize = 1 << MAX_GATE_QUBITS;

/// A gate matrix copied onto the stack, row-major
#[derive(Clone, Copy)]
struct LocalMatrix {
    dim: usize,
    data: [Complex64; MAX_DIM * MAX_DIM],
}

impl LocalMatrix {
    fn new(matrix: &Array2<Complex64>, conjugate: bool) -> Self {
        let dim = matrix.nrows();
        debug_assert!(dim <= MAX_DIM && matrix.is_square());
        let mut data = [Complex64::new(0.0, 0.0); MAX_DIM * MAX_DIM];
        for ((r, c), z) in matrix.indexed_iter() {
            data[r * dim + c] = if conjugate { z.conj() } else { *z };
        }
        LocalMatrix { dim, data }
    }

    #[inline(always)]
    fn at(&self, row: usize, col: usize) -> Complex64 {
        self.data[row * self.dim + col]
    }
}

/// Apply `matrix` to `targets` of the register stored in `amplitudes`
///
/// The first target is the most significant bit of the matrix's local index.
pub fn apply_matrix(
    amplitudes: &mut [Complex64],
    matrix: &Array2<Complex64>,
    targets: &[usize],
    parallelism: Parallelism,
) {
    apply_local(amplitudes, &LocalMatrix::new(matrix, false), targets, parallelism);
}

/// Apply the element-wise conjugate of `matrix` (not the adjoint)
pub fn apply_conjugate_matrix(
    amplitudes: &mut [Complex64],
    matrix: &Array2<Complex64>,
    targets: &[usize],
    parallelism: Parallelism,
) {
    apply_local(amplitudes, &LocalMatrix::new(matrix, true), targets, parallelism);
}

fn apply_local(amplitudes: &mut [Complex64], matrix: &LocalMatrix, targets: &[usize], parallelism: Parallelism) {
    debug_assert!(amplitudes.len().is_power_of_two());
    debug_assert_eq!(matrix.dim, 1 << targets.len());
    debug_assert!(targets.iter().all(|&t| (1usize << t) < amplitudes.len()));

    match *targets {
        [t] => apply_single(amplitudes, matrix, t, parallelism),
        [a, b] => apply_two(amplitudes, matrix, a, b, parallelism),
        _ => apply_multi(amplitudes, matrix, targets, parallelism),
    }
}

/// Pairwise update of (i, i + 2^t)
fn apply_single(amplitudes: &mut [Complex64], m: &LocalMatrix, target: usize, parallelism: Parallelism) {
    let stride = 1usize << target;
    let (m00, m01, m10, m11) = (m.at(0, 0), m.at(0, 1), m.at(1, 0), m.at(1, 1));

    let update = move |a: &mut Complex64, b: &mut Complex64| {
        let (x, y) = (*a, *b);
        *a = m00 * x + m01 * y;
        *b = m10 * x + m11 * y;
    };
    let update_block = move |chunk: &mut [Complex64]| {
        let (lo, hi) = chunk.split_at_mut(stride);
        lo.iter_mut().zip(hi.iter_mut()).for_each(|(a, b)| update(a, b));
    };

    let len = amplitudes.len();
    if !parallelism.use_parallel(len) {
        amplitudes.chunks_mut(2 * stride).for_each(update_block);
    } else if 2 * stride < len {
        amplitudes.par_chunks_mut(2 * stride).for_each(update_block);
    } else {
        // Target is the top bit: split the halves across workers instead
        let (lo, hi) = amplitudes.split_at_mut(stride);
        lo.par_iter_mut()
            .zip(hi.par_iter_mut())
            .for_each(|(a, b)| update(a, b));
    }
}

/// Quadruple update; `first` is the high bit of the local index
fn apply_two(amplitudes: &mut [Complex64], m: &LocalMatrix, first: usize, second: usize, parallelism: Parallelism) {
    let (hi_mask, lo_mask) = (1usize << first, 1usize << second);
    let (low, high) = if first < second { (first, second) } else { (second, first) };
    let block = 1usize << (high + 1);
    let groups = block >> 2;

    let update_block = move |chunk: &mut [Complex64]| {
        for g in 0..groups {
            let base = insert_zero_bit(insert_zero_bit(g, low), high);
            let idx = [base, base | lo_mask, base | hi_mask, base | hi_mask | lo_mask];
            let v = [chunk[idx[0]], chunk[idx[1]], chunk[idx[2]], chunk[idx[3]]];
            for (row, &i) in idx.iter().enumerate() {
                chunk[i] = m.at(row, 0) * v[0] + m.at(row, 1) * v[1] + m.at(row, 2) * v[2] + m.at(row, 3) * v[3];
            }
        }
    };

    for_each_block(amplitudes, block, parallelism, update_block);
}

/// Generalized k-qubit gather, multiply, scatter with a stack scratch of 2^k entries
fn apply_multi(amplitudes: &mut [Complex64], m: &LocalMatrix, targets: &[usize], parallelism: Parallelism) {
    let k = targets.len();
    let dim = 1usize << k;

    let mut sorted = [0usize; MAX_GATE_QUBITS];
    sorted[..k].copy_from_slice(targets);
    sorted[..k].sort_unstable();

    // offsets[l]: flat offset of local index l, first target most significant
    let mut offsets = [0usize; MAX_DIM];
    for (l, offset) in offsets.iter_mut().enumerate().take(dim) {
        *offset = targets
            .iter()
            .enumerate()
            .filter(|(j, _)| (l >> (k - 1 - j)) & 1 == 1)
            .fold(0, |acc, (_, &t)| acc | (1 << t));
    }

    let block = 1usize << (sorted[k - 1] + 1);
    let groups = block >> k;

    let update_block = move |chunk: &mut [Complex64]| {
        let mut scratch = [Complex64::new(0.0, 0.0); MAX_DIM];
        for g in 0..groups {
            let base = sorted[..k].iter().fold(g, |acc, &bit| insert_zero_bit(acc, bit));
            for l in 0..dim {
                scratch[l] = chunk[base | offsets[l]];
            }
            for row in 0..dim {
                let mut sum = Complex64::new(0.0, 0.0);
                for (col, &v) in scratch[..dim].iter().enumerate() {
                    sum += m.at(row, col) * v;
                }
                chunk[base | offsets[row]] = sum;
            }
        }
    };

    for_each_block(amplitudes, block, parallelism, update_block);
}

/// Run `f` over consecutive blocks of `block` entries, in parallel when worthwhile
fn for_each_block<F>(amplitudes: &mut [Complex64], block: usize, parallelism: Parallelism, f: F)
where
    F: Fn(&mut [Complex64]) + Send + Sync,
{
    if parallelism.use_parallel(amplitudes.len()) && block < amplitudes.len() {
        amplitudes.par_chunks_mut(block).for_each(f);
    } else {
        amplitudes.chunks_mut(block).for_each(f);
    }
}

/// Insert a 0 at bit position `bit`, shifting the higher bits up
#[inline(always)]
pub fn insert_zero_bit(value: usize, bit: usize) -> usize {
    let low = value & ((1usize << bit) - 1);
    ((value >> bit) << (bit + 1)) | low
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    use crate::quantum::gate::{QuantumGate, StandardGate};

    /// Reference: build the full 2^n operator with the local index convention and multiply
    fn dense_apply(state: &[Complex64], matrix: &Array2<Complex64>, targets: &[usize]) -> Vec<Complex64> {
        let dim = state.len();
        let k = targets.len();
        let local = |i: usize| {
            targets
                .iter()
                .enumerate()
                .fold(0, |acc, (j, &t)| acc | (((i >> t) & 1) << (k - 1 - j)))
        };
        let mask: usize = targets.iter().map(|&t| 1 << t).sum();

        let mut full = Array2::<Complex64>::zeros((dim, dim));
        for r in 0..dim {
            for c in 0..dim {
                if r & !mask == c & !mask {
                    full[[r, c]] = matrix[[local(r), local(c)]];
                }
            }
        }
        full.dot(&Array1::from(state.to_vec())).to_vec()
    }

    fn sample_state(n: usize) -> Vec<Complex64> {
        let raw: Vec<Complex64> = (0..1 << n)
            .map(|i| Complex64::new((i as f64 * 0.37).sin(), (i as f64 * 0.11).cos()))
            .collect();
        let norm = raw.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
        raw.into_iter().map(|z| z / norm).collect()
    }

    fn assert_close(a: &[Complex64], b: &[Complex64]) {
        for (x, y) in a.iter().zip(b) {
            assert_relative_eq!((x - y).norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_insert_zero_bit() {
        assert_eq!(insert_zero_bit(0b111, 0), 0b1110);
        assert_eq!(insert_zero_bit(0b111, 1), 0b1101);
        assert_eq!(insert_zero_bit(0b111, 3), 0b0111);
    }

    #[test]
    fn test_kernels_match_dense_reference() {
        let cases: Vec<(Array2<Complex64>, Vec<usize>)> = vec![
            (StandardGate::H.matrix(), vec![0]),
            (StandardGate::Y.matrix(), vec![3]),
            (StandardGate::CNOT.matrix(), vec![0, 2]),
            (StandardGate::CNOT.matrix(), vec![3, 1]),
            (StandardGate::CY.matrix(), vec![1, 0]),
            (StandardGate::Toffoli.matrix(), vec![2, 0, 3]),
            (StandardGate::Fredkin.matrix(), vec![1, 3, 0]),
            (StandardGate::I(4).matrix(), vec![0, 1, 2, 3]),
        ];

        for parallelism in [Parallelism::SEQUENTIAL, Parallelism { enabled: true, threshold: 1 }] {
            for (matrix, targets) in &cases {
                let state = sample_state(4);
                let expected = dense_apply(&state, matrix, targets);
                let mut actual = state.clone();
                apply_matrix(&mut actual, matrix, targets, parallelism);
                assert_close(&actual, &expected);
            }
        }
    }

    #[test]
    fn test_conjugate_matrix() {
        let s = StandardGate::S.matrix();
        let mut state = vec![Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)];
        apply_conjugate_matrix(&mut state, &s, &[0], Parallelism::SEQUENTIAL);
        assert_relative_eq!(state[1].im, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cnot_on_basis_state() {
        // |q1 q0⟩ = |01⟩, control q0 flips q1
        let mut state = vec![Complex64::new(0.0, 0.0); 4];
        state[0b01] = Complex64::new(1.0, 0.0);
        apply_matrix(&mut state, &StandardGate::CNOT.matrix(), &[0, 1], Parallelism::SEQUENTIAL);
        assert_eq!(state[0b11], Complex64::new(1.0, 0.0));

        let x = array![
            [Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)],
            [Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)]
        ];
        apply_matrix(&mut state, &x, &[1], Parallelism::SEQUENTIAL);
        assert_eq!(state[0b01], Complex64::new(1.0, 0.0));
    }
}
