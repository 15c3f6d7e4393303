// src/quantum/gate.rs
//! Quantum gates
//!
//! The catalog of standard and parametrized gates, and the [`Gate`]
//! descriptor the evolvers consume: a name, its target qubits, a
//! precomputed 2^k × 2^k matrix and a unitarity flag.
//!
//! In a gate matrix the first listed target is the most significant bit of
//! the local index, so `CNOT` on `[control, target]` has the textbook matrix.

use std::fmt::{self, Debug, Display};

use ndarray::{array, Array2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_TOLERANCE;
use crate::error::{EngineError, Result};

/// Largest number of targets the k-qubit kernel accepts
pub const MAX_GATE_QUBITS: usize = 4;

/// Common complex numbers used in quantum gates
pub mod constants {
    use num_complex::Complex64;

    /// The imaginary unit i
    pub const I: Complex64 = Complex64::new(0.0, 1.0);

    pub const ONE: Complex64 = Complex64::new(1.0, 0.0);

    pub const ZERO: Complex64 = Complex64::new(0.0, 0.0);

    /// 1/sqrt(2)
    pub const FRAC_1_SQRT_2: f64 = std::f64::consts::FRAC_1_SQRT_2;
}

use constants::{I, ONE, ZERO};

/// A gate definition from the catalog
pub trait QuantumGate: Debug {
    /// Returns the number of qubits this gate acts on
    fn qubit_count(&self) -> usize;

    /// Returns the matrix representation of this gate
    fn matrix(&self) -> Array2<Complex64>;

    /// Returns a display name for this gate
    fn name(&self) -> String;

    /// Check the definition's parameters are usable
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Standard quantum gates (Pauli, Hadamard, etc.)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StandardGate {
    /// Identity on n qubits
    I(usize),

    /// Pauli-X gate (NOT gate)
    X,

    /// Pauli-Y gate
    Y,

    /// Pauli-Z gate
    Z,

    /// Hadamard gate
    H,

    /// Phase gate (S gate)
    S,

    /// S†
    Sdg,

    /// π/8 gate (T gate)
    T,

    /// T†
    Tdg,

    /// Square root of X
    SX,

    /// CNOT gate, targets `[control, target]`
    CNOT,

    /// Controlled-Y gate
    CY,

    /// Controlled-Z gate
    CZ,

    /// SWAP gate
    SWAP,

    /// Toffoli gate (CCNOT), targets `[control, control, target]`
    Toffoli,

    /// Controlled SWAP, targets `[control, a, b]`
    Fredkin,
}

impl QuantumGate for StandardGate {
    fn qubit_count(&self) -> usize {
        match self {
            StandardGate::I(n) => *n,
            StandardGate::X
            | StandardGate::Y
            | StandardGate::Z
            | StandardGate::H
            | StandardGate::S
            | StandardGate::Sdg
            | StandardGate::T
            | StandardGate::Tdg
            | StandardGate::SX => 1,
            StandardGate::CNOT | StandardGate::CY | StandardGate::CZ | StandardGate::SWAP => 2,
            StandardGate::Toffoli | StandardGate::Fredkin => 3,
        }
    }

    fn matrix(&self) -> Array2<Complex64> {
        use constants::FRAC_1_SQRT_2;
        match self {
            StandardGate::I(n) => Array2::eye(1 << n),
            StandardGate::X => pauli_x(),
            StandardGate::Y => pauli_y(),
            StandardGate::Z => pauli_z(),
            StandardGate::H => {
                let factor = Complex64::new(FRAC_1_SQRT_2, 0.0);
                array![[factor, factor], [factor, -factor]]
            }
            StandardGate::S => diagonal(I),
            StandardGate::Sdg => diagonal(-I),
            StandardGate::T => diagonal(Complex64::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2)),
            StandardGate::Tdg => diagonal(Complex64::new(FRAC_1_SQRT_2, -FRAC_1_SQRT_2)),
            StandardGate::SX => {
                let p = Complex64::new(0.5, 0.5);
                let m = Complex64::new(0.5, -0.5);
                array![[p, m], [m, p]]
            }
            StandardGate::CNOT => controlled(&pauli_x()),
            StandardGate::CY => controlled(&pauli_y()),
            StandardGate::CZ => controlled(&pauli_z()),
            StandardGate::SWAP => permutation(4, |i| ((i & 1) << 1) | (i >> 1)),
            // Local index bits are c0 c1 t, MSB first
            StandardGate::Toffoli => permutation(8, |i| if i >> 1 == 0b11 { i ^ 1 } else { i }),
            StandardGate::Fredkin => permutation(8, |i| match i {
                0b101 => 0b110,
                0b110 => 0b101,
                _ => i,
            }),
        }
    }

    fn name(&self) -> String {
        match self {
            StandardGate::I(n) => format!("I({})", n),
            StandardGate::Sdg => "S†".to_string(),
            StandardGate::Tdg => "T†".to_string(),
            other => format!("{:?}", other),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            StandardGate::I(n) if *n == 0 || *n > MAX_GATE_QUBITS => Err(EngineError::invalid_parameter(
                "I",
                format!("identity must act on 1 to {} qubits, got {}", MAX_GATE_QUBITS, n),
            )),
            _ => Ok(()),
        }
    }
}

/// Parametrized quantum gates
#[derive(Clone, Debug, PartialEq)]
pub enum ParametrizedGate {
    /// Rotation around X-axis
    Rx(f64),

    /// Rotation around Y-axis
    Ry(f64),

    /// Rotation around Z-axis
    Rz(f64),

    /// Phase gate with arbitrary angle
    Phase(f64),

    /// General single-qubit unitary with Euler angles (θ, φ, λ)
    U3(f64, f64, f64),

    /// Rotation by θ around an arbitrary axis (normalized on use)
    Rotation { axis: [f64; 3], theta: f64 },

    /// Controlled phase gate with arbitrary angle
    CPhase(f64),

    /// Controlled rotation around X-axis
    CRx(f64),

    /// Controlled rotation around Y-axis
    CRy(f64),

    /// Controlled rotation around Z-axis
    CRz(f64),
}

impl ParametrizedGate {
    fn angles(&self) -> Vec<f64> {
        match self {
            ParametrizedGate::Rx(t)
            | ParametrizedGate::Ry(t)
            | ParametrizedGate::Rz(t)
            | ParametrizedGate::Phase(t)
            | ParametrizedGate::CPhase(t)
            | ParametrizedGate::CRx(t)
            | ParametrizedGate::CRy(t)
            | ParametrizedGate::CRz(t) => vec![*t],
            ParametrizedGate::U3(theta, phi, lambda) => vec![*theta, *phi, *lambda],
            ParametrizedGate::Rotation { axis, theta } => {
                let mut v = axis.to_vec();
                v.push(*theta);
                v
            }
        }
    }

    /// The gate undoing this one
    pub fn inverse(&self) -> ParametrizedGate {
        match self {
            ParametrizedGate::Rx(t) => ParametrizedGate::Rx(-t),
            ParametrizedGate::Ry(t) => ParametrizedGate::Ry(-t),
            ParametrizedGate::Rz(t) => ParametrizedGate::Rz(-t),
            ParametrizedGate::Phase(t) => ParametrizedGate::Phase(-t),
            ParametrizedGate::U3(theta, phi, lambda) => ParametrizedGate::U3(-theta, -lambda, -phi),
            ParametrizedGate::Rotation { axis, theta } => ParametrizedGate::Rotation {
                axis: *axis,
                theta: -theta,
            },
            ParametrizedGate::CPhase(t) => ParametrizedGate::CPhase(-t),
            ParametrizedGate::CRx(t) => ParametrizedGate::CRx(-t),
            ParametrizedGate::CRy(t) => ParametrizedGate::CRy(-t),
            ParametrizedGate::CRz(t) => ParametrizedGate::CRz(-t),
        }
    }
}

impl QuantumGate for ParametrizedGate {
    fn qubit_count(&self) -> usize {
        match self {
            ParametrizedGate::Rx(_)
            | ParametrizedGate::Ry(_)
            | ParametrizedGate::Rz(_)
            | ParametrizedGate::Phase(_)
            | ParametrizedGate::U3(..)
            | ParametrizedGate::Rotation { .. } => 1,
            ParametrizedGate::CPhase(_)
            | ParametrizedGate::CRx(_)
            | ParametrizedGate::CRy(_)
            | ParametrizedGate::CRz(_) => 2,
        }
    }

    fn matrix(&self) -> Array2<Complex64> {
        match self {
            ParametrizedGate::Rx(theta) => rx(*theta),
            ParametrizedGate::Ry(theta) => ry(*theta),
            ParametrizedGate::Rz(theta) => rz(*theta),
            ParametrizedGate::Phase(theta) => diagonal(Complex64::from_polar(1.0, *theta)),
            ParametrizedGate::U3(theta, phi, lambda) => {
                let cos = (theta / 2.0).cos();
                let sin = (theta / 2.0).sin();
                array![
                    [Complex64::new(cos, 0.0), -Complex64::from_polar(sin, *lambda)],
                    [Complex64::from_polar(sin, *phi), Complex64::from_polar(cos, phi + lambda)]
                ]
            }
            ParametrizedGate::Rotation { axis, theta } => {
                // cos(θ/2) I - i sin(θ/2) (n·σ)
                let norm = axis.iter().map(|a| a * a).sum::<f64>().sqrt();
                let [nx, ny, nz] = axis.map(|a| if norm > 0.0 { a / norm } else { 0.0 });
                let cos = Complex64::new((theta / 2.0).cos(), 0.0);
                let sin = (theta / 2.0).sin();
                let n_sigma = pauli_x() * Complex64::new(nx, 0.0)
                    + pauli_y() * Complex64::new(ny, 0.0)
                    + pauli_z() * Complex64::new(nz, 0.0);
                Array2::<Complex64>::eye(2) * cos - n_sigma * Complex64::new(0.0, sin)
            }
            ParametrizedGate::CPhase(theta) => controlled(&diagonal(Complex64::from_polar(1.0, *theta))),
            ParametrizedGate::CRx(theta) => controlled(&rx(*theta)),
            ParametrizedGate::CRy(theta) => controlled(&ry(*theta)),
            ParametrizedGate::CRz(theta) => controlled(&rz(*theta)),
        }
    }

    fn name(&self) -> String {
        match self {
            ParametrizedGate::Rx(theta) => format!("Rx({:.2})", theta),
            ParametrizedGate::Ry(theta) => format!("Ry({:.2})", theta),
            ParametrizedGate::Rz(theta) => format!("Rz({:.2})", theta),
            ParametrizedGate::Phase(theta) => format!("P({:.2})", theta),
            ParametrizedGate::U3(theta, phi, lambda) => {
                format!("U3({:.2}, {:.2}, {:.2})", theta, phi, lambda)
            }
            ParametrizedGate::Rotation { axis, theta } => format!(
                "R[{:.2}, {:.2}, {:.2}]({:.2})",
                axis[0], axis[1], axis[2], theta
            ),
            ParametrizedGate::CPhase(theta) => format!("CPhase({:.2})", theta),
            ParametrizedGate::CRx(theta) => format!("CRx({:.2})", theta),
            ParametrizedGate::CRy(theta) => format!("CRy({:.2})", theta),
            ParametrizedGate::CRz(theta) => format!("CRz({:.2})", theta),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.angles().iter().any(|a| !a.is_finite()) {
            return Err(EngineError::invalid_parameter(&self.name(), "parameters must be finite"));
        }
        if let ParametrizedGate::Rotation { axis, .. } = self {
            if axis.iter().all(|a| *a == 0.0) {
                return Err(EngineError::invalid_parameter("axis", "rotation axis must be non-zero"));
            }
        }
        Ok(())
    }
}

fn pauli_x() -> Array2<Complex64> {
    array![[ZERO, ONE], [ONE, ZERO]]
}

fn pauli_y() -> Array2<Complex64> {
    array![[ZERO, -I], [I, ZERO]]
}

fn pauli_z() -> Array2<Complex64> {
    diagonal(-ONE)
}

/// diag(1, phase)
fn diagonal(phase: Complex64) -> Array2<Complex64> {
    array![[ONE, ZERO], [ZERO, phase]]
}

fn rx(theta: f64) -> Array2<Complex64> {
    let cos = Complex64::new((theta / 2.0).cos(), 0.0);
    let sin = Complex64::new(0.0, -(theta / 2.0).sin());
    array![[cos, sin], [sin, cos]]
}

fn ry(theta: f64) -> Array2<Complex64> {
    let cos = Complex64::new((theta / 2.0).cos(), 0.0);
    let sin = Complex64::new((theta / 2.0).sin(), 0.0);
    array![[cos, -sin], [sin, cos]]
}

fn rz(theta: f64) -> Array2<Complex64> {
    let half = Complex64::from_polar(1.0, theta / 2.0);
    array![[half.conj(), ZERO], [ZERO, half]]
}

/// |0⟩⟨0| ⊗ I + |1⟩⟨1| ⊗ U, control on the most significant local bit
fn controlled(u: &Array2<Complex64>) -> Array2<Complex64> {
    let dim = u.nrows();
    let mut matrix = Array2::eye(2 * dim);
    matrix.slice_mut(ndarray::s![dim.., dim..]).assign(u);
    matrix
}

/// Permutation matrix sending |i⟩ to |f(i)⟩
fn permutation(dim: usize, f: impl Fn(usize) -> usize) -> Array2<Complex64> {
    let mut matrix = Array2::zeros((dim, dim));
    for i in 0..dim {
        matrix[[f(i), i]] = ONE;
    }
    matrix
}

/// Conjugate transpose
pub fn adjoint(matrix: &Array2<Complex64>) -> Array2<Complex64> {
    matrix.t().mapv(|z| z.conj())
}

/// Frobenius norm ‖U†U − I‖
pub fn unitarity_deviation(matrix: &Array2<Complex64>) -> f64 {
    if !matrix.is_square() {
        return f64::INFINITY;
    }
    let product = adjoint(matrix).dot(matrix);
    let identity: Array2<Complex64> = Array2::eye(matrix.nrows());
    (product - identity).iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
}

/// Target qubits of a gate, tagged by shape
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateTargets {
    One(usize),
    Two([usize; 2]),
    Many(Vec<usize>),
}

impl GateTargets {
    /// Classify a target list, rejecting empty, oversized and repeated lists
    pub fn from_slice(qubits: &[usize]) -> Result<Self> {
        check_distinct(qubits)?;
        match *qubits {
            [] => Err(EngineError::invalid_parameter("targets", "a gate needs at least one target")),
            [q] => Ok(GateTargets::One(q)),
            [a, b] => Ok(GateTargets::Two([a, b])),
            _ if qubits.len() <= MAX_GATE_QUBITS => Ok(GateTargets::Many(qubits.to_vec())),
            _ => Err(EngineError::invalid_parameter(
                "targets",
                format!("gates act on at most {} qubits, got {}", MAX_GATE_QUBITS, qubits.len()),
            )),
        }
    }

    pub fn as_slice(&self) -> &[usize] {
        match self {
            GateTargets::One(q) => std::slice::from_ref(q),
            GateTargets::Two(pair) => pair,
            GateTargets::Many(qubits) => qubits,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Check every target exists in an `qubit_count`-qubit register
    pub fn check_range(&self, qubit_count: usize) -> Result<()> {
        check_range(self.as_slice(), qubit_count)
    }
}

/// Reject a repeated qubit index
pub(crate) fn check_distinct(qubits: &[usize]) -> Result<()> {
    for (i, &q) in qubits.iter().enumerate() {
        if qubits[..i].contains(&q) {
            return Err(EngineError::DuplicateQubitIndex { index: q });
        }
    }
    Ok(())
}

/// Reject an index outside the register
pub(crate) fn check_range(qubits: &[usize], qubit_count: usize) -> Result<()> {
    match qubits.iter().find(|&&q| q >= qubit_count) {
        Some(&index) => Err(EngineError::QubitIndexOutOfRange { index, qubit_count }),
        None => Ok(()),
    }
}

/// A gate bound to its target qubits, ready for evolution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    name: String,
    targets: GateTargets,
    matrix: Array2<Complex64>,
    unitary: bool,
}

impl Gate {
    /// Bind a catalog gate to `targets`
    pub fn new<G: QuantumGate>(gate: &G, targets: &[usize]) -> Result<Self> {
        gate.validate()?;
        if gate.qubit_count() != targets.len() {
            return Err(EngineError::ArityMismatch {
                gate: gate.name(),
                expected: gate.qubit_count(),
                actual: targets.len(),
            });
        }

        Ok(Gate {
            name: gate.name(),
            targets: GateTargets::from_slice(targets)?,
            matrix: gate.matrix(),
            unitary: true,
        })
    }

    pub fn standard(gate: StandardGate, targets: &[usize]) -> Result<Self> {
        Self::new(&gate, targets)
    }

    pub fn parametrized(gate: ParametrizedGate, targets: &[usize]) -> Result<Self> {
        Self::new(&gate, targets)
    }

    /// Register a user-supplied unitary, checking ‖U†U − I‖ ≤ 1e-9
    pub fn custom(name: &str, matrix: Array2<Complex64>, targets: &[usize]) -> Result<Self> {
        Self::custom_with_tolerance(name, matrix, targets, DEFAULT_TOLERANCE)
    }

    pub fn custom_with_tolerance(
        name: &str,
        matrix: Array2<Complex64>,
        targets: &[usize],
        tolerance: f64,
    ) -> Result<Self> {
        let gate = Self::from_matrix_unchecked(name, matrix, targets)?;
        let deviation = unitarity_deviation(&gate.matrix);
        if deviation > tolerance {
            return Err(EngineError::NonUnitaryMatrix {
                gate: name.to_string(),
                deviation,
            });
        }
        Ok(gate)
    }

    /// Build a gate without the unitarity check
    ///
    /// The shape is still checked. The unitary flag is recorded and the
    /// evolvers refuse gates where it is false.
    pub fn from_matrix_unchecked(name: &str, matrix: Array2<Complex64>, targets: &[usize]) -> Result<Self> {
        let targets = GateTargets::from_slice(targets)?;
        let dim = 1usize << targets.len();
        if matrix.shape() != [dim, dim] {
            return Err(EngineError::DimensionMismatch {
                expected: dim * dim,
                actual: matrix.len(),
            });
        }

        let unitary = unitarity_deviation(&matrix) <= DEFAULT_TOLERANCE;
        Ok(Gate {
            name: name.to_string(),
            targets,
            matrix,
            unitary,
        })
    }

    pub fn h(qubit: usize) -> Self {
        Self::single(StandardGate::H, qubit)
    }

    pub fn x(qubit: usize) -> Self {
        Self::single(StandardGate::X, qubit)
    }

    pub fn y(qubit: usize) -> Self {
        Self::single(StandardGate::Y, qubit)
    }

    pub fn z(qubit: usize) -> Self {
        Self::single(StandardGate::Z, qubit)
    }

    pub fn s(qubit: usize) -> Self {
        Self::single(StandardGate::S, qubit)
    }

    pub fn t(qubit: usize) -> Self {
        Self::single(StandardGate::T, qubit)
    }

    pub fn rx(theta: f64, qubit: usize) -> Result<Self> {
        Self::parametrized(ParametrizedGate::Rx(theta), &[qubit])
    }

    pub fn ry(theta: f64, qubit: usize) -> Result<Self> {
        Self::parametrized(ParametrizedGate::Ry(theta), &[qubit])
    }

    pub fn rz(theta: f64, qubit: usize) -> Result<Self> {
        Self::parametrized(ParametrizedGate::Rz(theta), &[qubit])
    }

    pub fn cnot(control: usize, target: usize) -> Result<Self> {
        Self::standard(StandardGate::CNOT, &[control, target])
    }

    pub fn cz(control: usize, target: usize) -> Result<Self> {
        Self::standard(StandardGate::CZ, &[control, target])
    }

    pub fn swap(a: usize, b: usize) -> Result<Self> {
        Self::standard(StandardGate::SWAP, &[a, b])
    }

    pub fn toffoli(control1: usize, control2: usize, target: usize) -> Result<Self> {
        Self::standard(StandardGate::Toffoli, &[control1, control2, target])
    }

    fn single(gate: StandardGate, qubit: usize) -> Self {
        Gate {
            name: gate.name(),
            targets: GateTargets::One(qubit),
            matrix: gate.matrix(),
            unitary: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn targets(&self) -> &GateTargets {
        &self.targets
    }

    pub fn qubits(&self) -> &[usize] {
        self.targets.as_slice()
    }

    pub fn arity(&self) -> usize {
        self.targets.len()
    }

    pub fn matrix(&self) -> &Array2<Complex64> {
        &self.matrix
    }

    pub fn is_unitary(&self) -> bool {
        self.unitary
    }

    /// The adjoint gate on the same targets; applying both is the identity
    pub fn inverse(&self) -> Self {
        let name = match self.name.strip_suffix('†') {
            Some(base) => base.to_string(),
            None => format!("{}†", self.name),
        };
        Gate {
            name,
            targets: self.targets.clone(),
            matrix: adjoint(&self.matrix),
            unitary: self.unitary,
        }
    }

    /// A rotation by `delta` about the same axis, if this is an Rx, Ry or Rz gate
    ///
    /// Rotations about one axis commute, so applying the result right after
    /// this gate rotates by θ + delta.
    pub fn axis_shift(&self, delta: f64) -> Option<Gate> {
        let rotation = match self.name.get(..3)? {
            "Rx(" => ParametrizedGate::Rx(delta),
            "Ry(" => ParametrizedGate::Ry(delta),
            "Rz(" => ParametrizedGate::Rz(delta),
            _ => return None,
        };
        match self.targets {
            GateTargets::One(qubit) => Gate::parametrized(rotation, &[qubit]).ok(),
            _ => None,
        }
    }

    /// The same gate on targets shifted up by `offset`
    pub fn offset(&self, offset: usize) -> Self {
        let targets = match &self.targets {
            GateTargets::One(q) => GateTargets::One(q + offset),
            GateTargets::Two([a, b]) => GateTargets::Two([a + offset, b + offset]),
            GateTargets::Many(qs) => GateTargets::Many(qs.iter().map(|q| q + offset).collect()),
        };
        Gate {
            targets,
            ..self.clone()
        }
    }

    /// Check the gate can be applied to an `qubit_count`-qubit register
    ///
    /// Catches descriptors that bypassed the constructors, e.g. via serde.
    pub fn validate(&self, qubit_count: usize, tolerance: f64) -> Result<()> {
        let qubits = self.qubits();
        if qubits.is_empty() || qubits.len() > MAX_GATE_QUBITS {
            return Err(EngineError::invalid_parameter(
                "targets",
                format!("gate {} has {} targets", self.name, qubits.len()),
            ));
        }
        check_distinct(qubits)?;
        check_range(qubits, qubit_count)?;

        let dim = 1usize << qubits.len();
        if self.matrix.shape() != [dim, dim] {
            return Err(EngineError::DimensionMismatch {
                expected: dim * dim,
                actual: self.matrix.len(),
            });
        }

        let deviation = unitarity_deviation(&self.matrix);
        if !self.unitary || deviation > tolerance {
            return Err(EngineError::NonUnitaryMatrix {
                gate: self.name.clone(),
                deviation,
            });
        }
        Ok(())
    }
}

impl Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{:?}", self.name, self.qubits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_catalog_is_unitary() {
        let standard = [
            StandardGate::I(2),
            StandardGate::X,
            StandardGate::Y,
            StandardGate::Z,
            StandardGate::H,
            StandardGate::S,
            StandardGate::Sdg,
            StandardGate::T,
            StandardGate::Tdg,
            StandardGate::SX,
            StandardGate::CNOT,
            StandardGate::CY,
            StandardGate::CZ,
            StandardGate::SWAP,
            StandardGate::Toffoli,
            StandardGate::Fredkin,
        ];
        for gate in &standard {
            assert!(unitarity_deviation(&gate.matrix()) < 1e-12, "{}", gate.name());
        }

        let parametrized = [
            ParametrizedGate::Rx(0.3),
            ParametrizedGate::Ry(1.1),
            ParametrizedGate::Rz(-2.0),
            ParametrizedGate::Phase(0.7),
            ParametrizedGate::U3(0.1, 0.2, 0.3),
            ParametrizedGate::Rotation { axis: [1.0, 1.0, 0.0], theta: 0.9 },
            ParametrizedGate::CPhase(0.4),
            ParametrizedGate::CRx(0.5),
            ParametrizedGate::CRy(0.6),
            ParametrizedGate::CRz(0.7),
        ];
        for gate in &parametrized {
            assert!(unitarity_deviation(&gate.matrix()) < 1e-12, "{}", gate.name());
        }
    }

    #[test]
    fn test_cnot_control_is_first_target() {
        let m = StandardGate::CNOT.matrix();
        assert_eq!(m[[3, 2]], ONE);
        assert_eq!(m[[2, 3]], ONE);
        assert_eq!(m[[1, 1]], ONE);
    }

    #[test]
    fn test_sx_squares_to_x() {
        let sx = StandardGate::SX.matrix();
        let product = sx.dot(&sx);
        let x = pauli_x();
        for (a, b) in product.iter().zip(x.iter()) {
            assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rotation_about_z_matches_rz() {
        let r = ParametrizedGate::Rotation { axis: [0.0, 0.0, 2.0], theta: 0.8 }.matrix();
        let z = ParametrizedGate::Rz(0.8).matrix();
        for (a, b) in r.iter().zip(z.iter()) {
            assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_arity_and_duplicates() {
        assert!(matches!(
            Gate::standard(StandardGate::CNOT, &[0]),
            Err(EngineError::ArityMismatch { expected: 2, actual: 1, .. })
        ));
        assert!(matches!(
            Gate::cnot(1, 1),
            Err(EngineError::DuplicateQubitIndex { index: 1 })
        ));
        assert!(Gate::standard(StandardGate::I(5), &[0, 1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(Gate::rx(f64::NAN, 0), Err(EngineError::InvalidParameter { .. })));
        let zero_axis = ParametrizedGate::Rotation { axis: [0.0; 3], theta: 1.0 };
        assert!(Gate::parametrized(zero_axis, &[0]).is_err());
    }

    #[test]
    fn test_custom_gate_validation() {
        let not_unitary = array![[ONE, ONE], [ZERO, ONE]];
        match Gate::custom("shear", not_unitary.clone(), &[0]) {
            Err(EngineError::NonUnitaryMatrix { gate, deviation }) => {
                assert_eq!(gate, "shear");
                assert!(deviation > 0.5);
            }
            other => panic!("expected NonUnitaryMatrix, got {:?}", other),
        }

        let unchecked = Gate::from_matrix_unchecked("shear", not_unitary, &[0]).unwrap();
        assert!(!unchecked.is_unitary());
        assert!(unchecked.validate(1, 1e-9).is_err());

        let wrong_shape = Gate::custom("x", pauli_x(), &[0, 1]);
        assert!(matches!(wrong_shape, Err(EngineError::DimensionMismatch { expected: 16, actual: 4 })));
    }

    #[test]
    fn test_inverse_name_and_matrix() {
        let t = Gate::t(0);
        let t_inv = t.inverse();
        assert_eq!(t_inv.name(), "T†");
        assert_eq!(t_inv.inverse().name(), "T");
        let product = t.matrix().dot(t_inv.matrix());
        assert_relative_eq!(product[[1, 1]].re, 1.0, epsilon = 1e-12);
        assert_relative_eq!(product[[1, 1]].im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_validate_range() {
        let gate = Gate::cnot(0, 3).unwrap();
        assert!(matches!(
            gate.validate(3, 1e-9),
            Err(EngineError::QubitIndexOutOfRange { index: 3, qubit_count: 3 })
        ));
        assert!(gate.validate(4, 1e-9).is_ok());
    }

    #[test]
    fn test_gate_json_roundtrip_keeps_matrix() {
        let gate = Gate::rx(0.25, 2).unwrap();
        let json = serde_json::to_string(&gate).unwrap();
        let back: Gate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, gate);
    }

    #[test]
    fn test_axis_shift_adds_angles() {
        let gate = Gate::ry(0.3, 1).unwrap();
        let shift = gate.axis_shift(0.5).unwrap();
        assert_eq!(shift.qubits(), &[1]);
        let combined = shift.matrix().dot(gate.matrix());
        let expected = Gate::ry(0.8, 1).unwrap();
        for (a, b) in combined.iter().zip(expected.matrix().iter()) {
            assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-12);
        }

        assert!(gate.inverse().axis_shift(0.1).is_some());
        assert!(Gate::h(0).axis_shift(0.1).is_none());
        assert!(Gate::s(0).inverse().axis_shift(0.1).is_none());
        let crx = Gate::parametrized(ParametrizedGate::CRx(0.2), &[0, 1]).unwrap();
        assert!(crx.axis_shift(0.1).is_none());
    }
}
