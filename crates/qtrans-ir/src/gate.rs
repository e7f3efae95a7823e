//! Quantum gate types.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::parameter::ParameterExpression;

/// Gates the transpiler knows the matrix of.
///
/// Angles are [`ParameterExpression`]s so circuits can be transpiled up to
/// binding. Operands of controlled gates list the controls first and the
/// target last; the `Mc*` variants carry their control count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StandardGate {
    // Paulis
    /// Identity; always native, never emitted by synthesis.
    I,
    /// Bit flip.
    X,
    /// Bit and phase flip.
    Y,
    /// Phase flip.
    Z,

    // Fixed single-qubit gates
    /// Hadamard.
    H,
    /// `diag(1, i)`.
    S,
    /// `diag(1, -i)`.
    Sdg,
    /// `diag(1, e^{iπ/4})`.
    T,
    /// `diag(1, e^{-iπ/4})`.
    Tdg,
    /// Square root of X, the IBM native.
    SX,
    /// Inverse of [`StandardGate::SX`].
    SXdg,

    // Single-qubit rotations
    /// `exp(-iθX/2)`.
    Rx(ParameterExpression),
    /// `exp(-iθY/2)`.
    Ry(ParameterExpression),
    /// `exp(-iθZ/2)`.
    Rz(ParameterExpression),
    /// `diag(1, e^{iλ})`; equals `Rz(λ)` up to global phase.
    P(ParameterExpression),
    /// `U(θ, φ, λ) = Rz(φ)·Ry(θ)·Rz(λ)` up to global phase.
    U(
        ParameterExpression,
        ParameterExpression,
        ParameterExpression,
    ),

    // Two-qubit gates
    /// CNOT, the entangler every lowering rule targets.
    CX,
    /// Controlled Y.
    CY,
    /// Controlled Z; symmetric in its operands.
    CZ,
    /// Controlled Hadamard.
    CH,
    /// Exchange of the two operands.
    Swap,
    /// Exchange with an `i` phase on `|01⟩` and `|10⟩`.
    ISwap,
    /// Controlled `Rx`.
    CRx(ParameterExpression),
    /// Controlled `Ry`.
    CRy(ParameterExpression),
    /// Controlled `Rz`.
    CRz(ParameterExpression),
    /// Controlled phase; symmetric in its operands.
    CP(ParameterExpression),
    /// `exp(-iθ X⊗X/2)`.
    RXX(ParameterExpression),
    /// `exp(-iθ Y⊗Y/2)`.
    RYY(ParameterExpression),
    /// `exp(-iθ Z⊗Z/2)`.
    RZZ(ParameterExpression),

    // Gates on three or more qubits; unrolled before layout
    /// Toffoli.
    CCX,
    /// Fredkin: swaps the last two operands when the first is set.
    CSwap,
    /// X controlled on `n` qubits.
    Mcx(u32),
    /// `Ry(θ)` controlled on `n` qubits.
    Mcry(u32, ParameterExpression),
    /// `U(θ, φ, λ)` controlled on `n` qubits.
    Mcu(
        u32,
        ParameterExpression,
        ParameterExpression,
        ParameterExpression,
    ),
}

impl StandardGate {
    /// Lowercase name, as used in basis gate sets.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            StandardGate::I => "id",
            StandardGate::X => "x",
            StandardGate::Y => "y",
            StandardGate::Z => "z",
            StandardGate::H => "h",
            StandardGate::S => "s",
            StandardGate::Sdg => "sdg",
            StandardGate::T => "t",
            StandardGate::Tdg => "tdg",
            StandardGate::SX => "sx",
            StandardGate::SXdg => "sxdg",
            StandardGate::Rx(_) => "rx",
            StandardGate::Ry(_) => "ry",
            StandardGate::Rz(_) => "rz",
            StandardGate::P(_) => "p",
            StandardGate::U(_, _, _) => "u",
            StandardGate::CX => "cx",
            StandardGate::CY => "cy",
            StandardGate::CZ => "cz",
            StandardGate::CH => "ch",
            StandardGate::Swap => "swap",
            StandardGate::ISwap => "iswap",
            StandardGate::CRx(_) => "crx",
            StandardGate::CRy(_) => "cry",
            StandardGate::CRz(_) => "crz",
            StandardGate::CP(_) => "cp",
            StandardGate::RXX(_) => "rxx",
            StandardGate::RYY(_) => "ryy",
            StandardGate::RZZ(_) => "rzz",
            StandardGate::CCX => "ccx",
            StandardGate::CSwap => "cswap",
            StandardGate::Mcx(_) => "mcx",
            StandardGate::Mcry(_, _) => "mcry",
            StandardGate::Mcu(_, _, _, _) => "mcu",
        }
    }

    /// Operand count, controls included.
    #[inline]
    pub fn num_qubits(&self) -> u32 {
        match self {
            StandardGate::I
            | StandardGate::X
            | StandardGate::Y
            | StandardGate::Z
            | StandardGate::H
            | StandardGate::S
            | StandardGate::Sdg
            | StandardGate::T
            | StandardGate::Tdg
            | StandardGate::SX
            | StandardGate::SXdg
            | StandardGate::Rx(_)
            | StandardGate::Ry(_)
            | StandardGate::Rz(_)
            | StandardGate::P(_)
            | StandardGate::U(_, _, _) => 1,

            StandardGate::CX
            | StandardGate::CY
            | StandardGate::CZ
            | StandardGate::CH
            | StandardGate::Swap
            | StandardGate::ISwap
            | StandardGate::CRx(_)
            | StandardGate::CRy(_)
            | StandardGate::CRz(_)
            | StandardGate::CP(_)
            | StandardGate::RXX(_)
            | StandardGate::RYY(_)
            | StandardGate::RZZ(_) => 2,

            StandardGate::CCX | StandardGate::CSwap => 3,
            StandardGate::Mcx(controls)
            | StandardGate::Mcry(controls, _)
            | StandardGate::Mcu(controls, _, _, _) => controls.saturating_add(1),
        }
    }

    /// True if any angle is still symbolic.
    pub fn is_parameterized(&self) -> bool {
        self.parameters().iter().any(|p| p.is_symbolic())
    }

    /// Angles in declaration order.
    pub fn parameters(&self) -> Vec<&ParameterExpression> {
        match self {
            StandardGate::Rx(p)
            | StandardGate::Ry(p)
            | StandardGate::Rz(p)
            | StandardGate::P(p)
            | StandardGate::CRx(p)
            | StandardGate::CRy(p)
            | StandardGate::CRz(p)
            | StandardGate::CP(p)
            | StandardGate::RXX(p)
            | StandardGate::RYY(p)
            | StandardGate::RZZ(p)
            | StandardGate::Mcry(_, p) => vec![p],

            StandardGate::U(a, b, c) | StandardGate::Mcu(_, a, b, c) => vec![a, b, c],

            _ => vec![],
        }
    }

    /// Apply `f` to every angle, keeping the gate kind.
    #[must_use]
    pub fn map_parameters(&self, f: impl Fn(&ParameterExpression) -> ParameterExpression) -> Self {
        match self {
            StandardGate::Rx(p) => StandardGate::Rx(f(p)),
            StandardGate::Ry(p) => StandardGate::Ry(f(p)),
            StandardGate::Rz(p) => StandardGate::Rz(f(p)),
            StandardGate::P(p) => StandardGate::P(f(p)),
            StandardGate::CRx(p) => StandardGate::CRx(f(p)),
            StandardGate::CRy(p) => StandardGate::CRy(f(p)),
            StandardGate::CRz(p) => StandardGate::CRz(f(p)),
            StandardGate::CP(p) => StandardGate::CP(f(p)),
            StandardGate::RXX(p) => StandardGate::RXX(f(p)),
            StandardGate::RYY(p) => StandardGate::RYY(f(p)),
            StandardGate::RZZ(p) => StandardGate::RZZ(f(p)),
            StandardGate::U(a, b, c) => StandardGate::U(f(a), f(b), f(c)),
            StandardGate::Mcry(n, p) => StandardGate::Mcry(*n, f(p)),
            StandardGate::Mcu(n, a, b, c) => StandardGate::Mcu(*n, f(a), f(b), f(c)),
            other => other.clone(),
        }
    }

    /// The inverse of a parameter-free gate, if it is itself a standard gate.
    ///
    /// Rotations are handled by angle merging instead and return `None`.
    pub fn inverse(&self) -> Option<StandardGate> {
        Some(match self {
            StandardGate::I => StandardGate::I,
            StandardGate::X => StandardGate::X,
            StandardGate::Y => StandardGate::Y,
            StandardGate::Z => StandardGate::Z,
            StandardGate::H => StandardGate::H,
            StandardGate::S => StandardGate::Sdg,
            StandardGate::Sdg => StandardGate::S,
            StandardGate::T => StandardGate::Tdg,
            StandardGate::Tdg => StandardGate::T,
            StandardGate::SX => StandardGate::SXdg,
            StandardGate::SXdg => StandardGate::SX,
            StandardGate::CX => StandardGate::CX,
            StandardGate::CY => StandardGate::CY,
            StandardGate::CZ => StandardGate::CZ,
            StandardGate::CH => StandardGate::CH,
            StandardGate::Swap => StandardGate::Swap,
            StandardGate::CCX => StandardGate::CCX,
            StandardGate::CSwap => StandardGate::CSwap,
            StandardGate::Mcx(n) => StandardGate::Mcx(*n),
            _ => return None,
        })
    }

    /// True if exchanging the two operands leaves the gate unchanged.
    pub fn is_symmetric(&self) -> bool {
        matches!(
            self,
            StandardGate::CZ
                | StandardGate::Swap
                | StandardGate::ISwap
                | StandardGate::CP(_)
                | StandardGate::RXX(_)
                | StandardGate::RYY(_)
                | StandardGate::RZZ(_)
        )
    }
}

/// What a [`Gate`] applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GateKind {
    /// One of the built-in gates.
    Standard(StandardGate),
    /// A named gate that is opaque unless it carries a matrix.
    Custom(CustomGate),
}

impl GateKind {
    /// Name used for basis lookups.
    #[inline]
    pub fn name(&self) -> &str {
        match self {
            GateKind::Standard(g) => g.name(),
            GateKind::Custom(g) => &g.name,
        }
    }

    #[inline]
    pub fn num_qubits(&self) -> u32 {
        match self {
            GateKind::Standard(g) => g.num_qubits(),
            GateKind::Custom(g) => g.num_qubits,
        }
    }

    /// The standard gate, if this is one.
    #[inline]
    pub fn as_standard(&self) -> Option<&StandardGate> {
        match self {
            GateKind::Standard(g) => Some(g),
            GateKind::Custom(_) => None,
        }
    }
}

/// A user-defined gate, optionally carrying its unitary.
///
/// Matrices are row-major over the big-endian basis of the operands:
/// the first operand is the most significant bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomGate {
    /// Basis name; a backend may list it as native.
    pub name: String,
    pub num_qubits: u32,
    /// Carried through unchanged; synthesis reads only `matrix`.
    pub params: Vec<ParameterExpression>,
    /// Row-major `2^n × 2^n` unitary. Without it the gate cannot be lowered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Vec<Complex64>>,
}

impl CustomGate {
    /// Opaque gate without parameters or matrix.
    pub fn new(name: impl Into<String>, num_qubits: u32) -> Self {
        Self {
            name: name.into(),
            num_qubits,
            params: vec![],
            matrix: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: Vec<ParameterExpression>) -> Self {
        self.params = params;
        self
    }

    /// Attach a unitary matrix.
    ///
    /// Fails when `matrix.len()` is not `(2^num_qubits)^2`.
    pub fn with_matrix(mut self, matrix: Vec<Complex64>) -> IrResult<Self> {
        let dim = 1usize << self.num_qubits;
        if matrix.len() != dim * dim {
            return Err(IrError::MatrixDimension {
                num_qubits: self.num_qubits,
                expected: dim * dim,
                got: matrix.len(),
            });
        }
        self.matrix = Some(matrix);
        Ok(self)
    }
}

/// A gate as it appears in an instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub kind: GateKind,
    /// Free-form tag; passes that rewrite the gate drop it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Gate {
    pub fn standard(gate: StandardGate) -> Self {
        Self {
            kind: GateKind::Standard(gate),
            label: None,
        }
    }

    pub fn custom(gate: CustomGate) -> Self {
        Self {
            kind: GateKind::Custom(gate),
            label: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn num_qubits(&self) -> u32 {
        self.kind.num_qubits()
    }
}

impl From<StandardGate> for Gate {
    fn from(gate: StandardGate) -> Self {
        Gate::standard(gate)
    }
}

impl From<CustomGate> for Gate {
    fn from(gate: CustomGate) -> Self {
        Gate::custom(gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_standard_gate_properties() {
        assert_eq!(StandardGate::H.num_qubits(), 1);
        assert_eq!(StandardGate::CX.num_qubits(), 2);
        assert_eq!(StandardGate::CCX.num_qubits(), 3);
        assert_eq!(StandardGate::Mcx(4).num_qubits(), 5);
        assert_eq!(StandardGate::Mcry(2, 0.5.into()).num_qubits(), 3);
        assert!(StandardGate::Mcu(1, 0.1.into(), ParameterExpression::symbol("a"), 0.3.into()).is_parameterized());

        assert!(!StandardGate::H.is_parameterized());
        assert!(!StandardGate::Rx(ParameterExpression::constant(PI)).is_parameterized());
        assert!(StandardGate::Rx(ParameterExpression::symbol("theta")).is_parameterized());
    }

    #[test]
    fn test_inverse_pairs() {
        assert_eq!(StandardGate::S.inverse(), Some(StandardGate::Sdg));
        assert_eq!(StandardGate::SXdg.inverse(), Some(StandardGate::SX));
        assert_eq!(StandardGate::CX.inverse(), Some(StandardGate::CX));
        assert_eq!(StandardGate::Rz(0.3.into()).inverse(), None);
        assert_eq!(StandardGate::ISwap.inverse(), None);
    }

    #[test]
    fn test_map_parameters() {
        let g = StandardGate::U(1.0.into(), 2.0.into(), 3.0.into());
        let doubled = g.map_parameters(|p| p.scaled(2.0));
        let values: Vec<_> = doubled.parameters().iter().filter_map(|p| p.as_f64()).collect();
        assert_eq!(values, vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_custom_gate_matrix_dimension() {
        let ok = CustomGate::new("u2q", 2).with_matrix(vec![Complex64::new(0.0, 0.0); 16]);
        assert!(ok.is_ok());

        let bad = CustomGate::new("u2q", 2).with_matrix(vec![Complex64::new(0.0, 0.0); 4]);
        assert!(matches!(
            bad,
            Err(IrError::MatrixDimension {
                expected: 16,
                got: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_gate_label() {
        let h = Gate::standard(StandardGate::H).with_label("entry");
        assert_eq!(h.name(), "h");
        assert_eq!(h.label.as_deref(), Some("entry"));
    }
}
