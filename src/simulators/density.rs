//! Density-matrix evolution
//!
//! ρ is stored row-major as a flat vector of 4^n entries with flat index
//! `(row << n) | col`. Row qubit q is flat bit q + n, column qubit q is flat
//! bit q, so ρ → UρU† is two passes of the state-vector kernels: U on the row
//! bits, then conj(U) on the column bits.

use num_complex::Complex64;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::config::{EngineConfig, Parallelism};
use crate::error::{EngineError, Result};
use crate::quantum::gate::MAX_GATE_QUBITS;
use crate::quantum::storage::ComplexBuffer;
use crate::quantum::{Channel, DensityMatrix, Gate, Representation};
use crate::simulators::kernels;

/// Scratch storage for channel application, allocated once and reused
#[derive(Debug, Default)]
pub struct ScratchArena {
    buffer: Option<ComplexBuffer>,
}

impl ScratchArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make room for an `qubit_count`-qubit density matrix
    ///
    /// Does nothing when a buffer of the right size is already held.
    pub fn reserve(&mut self, qubit_count: usize) -> Result<()> {
        let entries = Representation::DensityMatrix
            .entry_count(qubit_count)
            .unwrap_or(usize::MAX);
        if self.capacity() == entries {
            return Ok(());
        }
        debug!(qubit_count, entries, "reserving channel scratch buffer");
        self.buffer = Some(ComplexBuffer::for_register(qubit_count, Representation::DensityMatrix)?);
        Ok(())
    }

    /// Entries held, 0 before the first `reserve`
    pub fn capacity(&self) -> usize {
        self.buffer.as_ref().map_or(0, ComplexBuffer::len)
    }

    fn buffer_for(&mut self, qubit_count: usize) -> Result<&mut ComplexBuffer> {
        self.reserve(qubit_count)?;
        self.buffer
            .as_mut()
            .ok_or_else(|| EngineError::InvalidState("scratch buffer missing after reserve".to_string()))
    }
}

/// In-place evolution of a mixed state under gates and channels
#[derive(Debug)]
pub struct DensityMatrixEvolver {
    parallelism: Parallelism,
    unitarity_tolerance: f64,
    channel_tolerance: f64,
    renormalize_interval: Option<usize>,
    applied: usize,
    scratch: ScratchArena,
}

impl Default for DensityMatrixEvolver {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl DensityMatrixEvolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        DensityMatrixEvolver {
            parallelism: config.parallelism(),
            unitarity_tolerance: config.unitarity_tolerance,
            channel_tolerance: config.channel_tolerance,
            renormalize_interval: config.renormalize_interval,
            applied: 0,
            scratch: ScratchArena::new(),
        }
    }

    /// Pre-allocate the channel scratch buffer
    pub fn reserve(&mut self, qubit_count: usize) -> Result<()> {
        self.scratch.reserve(qubit_count)
    }

    pub fn scratch(&self) -> &ScratchArena {
        &self.scratch
    }

    pub fn applied(&self) -> usize {
        self.applied
    }

    /// ρ → UρU†
    pub fn apply_gate(&mut self, rho: &mut DensityMatrix, gate: &Gate) -> Result<()> {
        let n = rho.qubit_count();
        gate.validate(n, self.unitarity_tolerance)?;

        let targets = gate.qubits();
        let mut row_targets = [0usize; MAX_GATE_QUBITS];
        for (row, &q) in row_targets.iter_mut().zip(targets) {
            *row = q + n;
        }

        let entries = rho.entries_mut();
        kernels::apply_matrix(entries, gate.matrix(), &row_targets[..targets.len()], self.parallelism);
        kernels::apply_conjugate_matrix(entries, gate.matrix(), targets, self.parallelism);

        trace!(gate = %gate, "applied gate to density matrix");
        self.after_step(rho)
    }

    pub fn apply_gates(&mut self, rho: &mut DensityMatrix, gates: &[Gate]) -> Result<()> {
        gates.iter().try_for_each(|gate| self.apply_gate(rho, gate))
    }

    /// ρ → Σ K_i ρ K_i†
    ///
    /// The result is built in the scratch buffer, which is then swapped with ρ.
    pub fn apply_channel(&mut self, rho: &mut DensityMatrix, channel: &Channel) -> Result<()> {
        let n = rho.qubit_count();
        channel.validate(n, self.channel_tolerance)?;

        let superop = superoperator(channel);
        let target = channel.target();
        let parallelism = self.parallelism;

        let scratch = self.scratch.buffer_for(n)?;
        transform_blocks(rho.entries(), scratch.as_mut_slice(), &superop, target, n, parallelism);
        std::mem::swap(rho.buffer_mut(), scratch);

        trace!(channel = %channel, "applied channel to density matrix");
        self.after_step(rho)
    }

    fn after_step(&mut self, rho: &mut DensityMatrix) -> Result<()> {
        self.applied += 1;
        match self.renormalize_interval {
            Some(interval) if self.applied % interval == 0 => rho.normalize_trace(),
            _ => Ok(()),
        }
    }
}

/// The channel's action on a 2×2 block, as a 4×4 matrix over (row bit, col bit)
///
/// S[(a,b),(c,d)] = Σ_i K_i[a,c] · conj(K_i[b,d])
fn superoperator(channel: &Channel) -> [Complex64; 16] {
    let mut s = [Complex64::new(0.0, 0.0); 16];
    for k in channel.kraus() {
        for a in 0..2 {
            for b in 0..2 {
                for c in 0..2 {
                    for d in 0..2 {
                        s[(a * 2 + b) * 4 + c * 2 + d] += k[[a, c]] * k[[b, d]].conj();
                    }
                }
            }
        }
    }
    s
}

/// Write S·ρ into `out`, one 2×2 block (row bit t+n, col bit t) at a time
fn transform_blocks(
    src: &[Complex64],
    out: &mut [Complex64],
    superop: &[Complex64; 16],
    target: usize,
    qubit_count: usize,
    parallelism: Parallelism,
) {
    let col_mask = 1usize << target;
    let row_mask = 1usize << (target + qubit_count);
    let block = row_mask << 1;

    let update = |(offset, chunk): (usize, &mut [Complex64])| {
        let start = offset * block;
        for local in 0..chunk.len() {
            if local & (row_mask | col_mask) != 0 {
                continue;
            }
            let idx = [local, local | col_mask, local | row_mask, local | row_mask | col_mask];
            let v = [src[start + idx[0]], src[start + idx[1]], src[start + idx[2]], src[start + idx[3]]];
            for (row, &i) in idx.iter().enumerate() {
                let s = &superop[row * 4..row * 4 + 4];
                chunk[i] = s[0] * v[0] + s[1] * v[1] + s[2] * v[2] + s[3] * v[3];
            }
        }
    };

    if parallelism.use_parallel(out.len()) && block < out.len() {
        out.par_chunks_mut(block).enumerate().for_each(update);
    } else {
        out.chunks_mut(block).enumerate().for_each(update);
    }
}
