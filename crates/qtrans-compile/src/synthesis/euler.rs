//! Single-qubit Euler synthesis.
//!
//! Every 2x2 unitary factors as `e^{iφ}·Rz(α)·Ry(β)·Rz(γ)`. The other bases
//! are rewritten from those ZYZ angles, so each family needs only a closed
//! form on top of one extraction.

use num_complex::Complex64;
use qtrans_ir::{ParameterExpression, StandardGate};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

use super::unitary::Unitary2x2;
use crate::error::{CompileError, CompileResult};

/// Largest reconstruction error a synthesized sequence may have.
pub const SYNTHESIS_TOLERANCE: f64 = 1e-8;

/// Target family for single-qubit synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EulerBasis {
    /// Rz · Ry · Rz.
    #[default]
    ZYZ,
    /// Rz · Rx · Rz.
    ZXZ,
    /// Rx · Ry · Rx.
    XYX,
    /// A single U(θ, φ, λ).
    U3,
    /// Rz and SX only, at most two SX.
    ZSX,
}

impl EulerBasis {
    /// Gate names this family emits.
    pub fn gate_names(self) -> &'static [&'static str] {
        match self {
            EulerBasis::ZYZ => &["rz", "ry"],
            EulerBasis::ZXZ => &["rz", "rx"],
            EulerBasis::XYX => &["rx", "ry"],
            EulerBasis::U3 => &["u"],
            EulerBasis::ZSX => &["rz", "sx"],
        }
    }
}

/// Output of [`synthesize`]: gates in time order and the phase they miss.
///
/// The source unitary equals `e^{i·global_phase}` times the product of
/// `gates`, the first gate applied first.
#[derive(Debug, Clone, PartialEq)]
pub struct OneQubitSequence {
    /// Gates in application order.
    pub gates: Vec<StandardGate>,
    /// Phase to add to the circuit when the source is replaced.
    pub global_phase: f64,
}

/// ZYZ angles `(φ, α, β, γ)` with `U = e^{iφ}·Rz(α)·Ry(β)·Rz(γ)`.
pub fn zyz_angles(u: &Unitary2x2) -> (f64, f64, f64, f64) {
    let phase = u.det().arg() / 2.0;
    let v = u.scale(Complex64::from_polar(1.0, -phase));
    let beta = 2.0 * v.at(1, 0).norm().atan2(v.at(0, 0).norm());
    let sum = 2.0 * v.at(1, 1).arg();
    let diff = 2.0 * v.at(1, 0).arg();
    let alpha = f64::midpoint(sum, diff);
    let gamma = (sum - diff) / 2.0;
    (phase, alpha, beta, gamma)
}

/// Wrap an angle into `[-π, π]`, returning the number of `2π` turns removed.
fn wrap(angle: f64) -> (f64, f64) {
    let turns = (angle / TAU).round();
    (angle - turns * TAU, turns)
}

/// Accumulates gates while keeping the phase consistent with angle wrapping.
struct Emitter {
    gates: Vec<StandardGate>,
    phase: f64,
    tolerance: f64,
}

impl Emitter {
    fn new(phase: f64, tolerance: f64) -> Self {
        Self {
            gates: Vec::with_capacity(5),
            phase,
            tolerance,
        }
    }

    /// Push a rotation whose period-2π shift negates the matrix.
    fn rotation(&mut self, make: fn(ParameterExpression) -> StandardGate, angle: f64) {
        let (angle, turns) = wrap(angle);
        // R(θ + 2π) = -R(θ)
        self.phase += turns * PI;
        if angle.abs() > self.tolerance {
            self.gates.push(make(ParameterExpression::constant(angle)));
        }
    }

    fn fixed(&mut self, gate: StandardGate) {
        self.gates.push(gate);
    }

    fn finish(self) -> OneQubitSequence {
        OneQubitSequence {
            gates: self.gates,
            global_phase: self.phase.rem_euclid(TAU),
        }
    }
}

/// Synthesize `u` in `basis`, dropping rotations smaller than `tolerance`.
///
/// Fails with [`CompileError::DecompositionTolerance`] if the emitted
/// sequence does not reproduce `u`.
pub fn synthesize(
    u: &Unitary2x2,
    basis: EulerBasis,
    tolerance: f64,
) -> CompileResult<OneQubitSequence> {
    let (phase, alpha, beta, gamma) = zyz_angles(u);
    let flat = beta.abs() < tolerance;

    let sequence = match basis {
        EulerBasis::ZYZ => {
            let mut out = Emitter::new(phase, tolerance);
            if flat {
                out.rotation(StandardGate::Rz, alpha + gamma);
            } else {
                out.rotation(StandardGate::Rz, gamma);
                out.rotation(StandardGate::Ry, beta);
                out.rotation(StandardGate::Rz, alpha);
            }
            out.finish()
        }
        EulerBasis::ZXZ => {
            // Ry(β) = Rz(π/2)·Rx(β)·Rz(-π/2)
            let mut out = Emitter::new(phase, tolerance);
            if flat {
                out.rotation(StandardGate::Rz, alpha + gamma);
            } else {
                out.rotation(StandardGate::Rz, gamma - PI / 2.0);
                out.rotation(StandardGate::Rx, beta);
                out.rotation(StandardGate::Rz, alpha + PI / 2.0);
            }
            out.finish()
        }
        EulerBasis::XYX => {
            // H·Rz·H = Rx and H·Ry·H = Ry(-θ)
            let conjugated = Unitary2x2::h() * *u * Unitary2x2::h();
            let (phase, a, b, c) = zyz_angles(&conjugated);
            let mut out = Emitter::new(phase, tolerance);
            if b.abs() < tolerance {
                out.rotation(StandardGate::Rx, a + c);
            } else {
                out.rotation(StandardGate::Rx, c);
                out.rotation(StandardGate::Ry, -b);
                out.rotation(StandardGate::Rx, a);
            }
            out.finish()
        }
        EulerBasis::U3 => {
            // U3(θ, φ, λ) = e^{i(φ+λ)/2}·Rz(φ)·Ry(θ)·Rz(λ)
            let phase = phase - (alpha + gamma) / 2.0;
            let (lambda_phi, _) = wrap(alpha + gamma);
            let gates = if flat && lambda_phi.abs() < tolerance {
                vec![]
            } else {
                vec![StandardGate::U(
                    ParameterExpression::constant(beta),
                    ParameterExpression::constant(wrap(alpha).0),
                    ParameterExpression::constant(wrap(gamma).0),
                )]
            };
            // φ and λ are exactly 2π-periodic in U3, so wrapping them is free.
            OneQubitSequence {
                gates,
                global_phase: phase.rem_euclid(TAU),
            }
        }
        EulerBasis::ZSX => {
            if flat {
                let mut out = Emitter::new(phase, tolerance);
                out.rotation(StandardGate::Rz, alpha + gamma);
                out.finish()
            } else {
                // Ry(β) = e^{iπ/2}·Rz(π)·SX·Rz(β+π)·SX, folded into the outer Z rotations.
                let mut out = Emitter::new(phase + PI / 2.0, tolerance);
                out.rotation(StandardGate::Rz, gamma);
                out.fixed(StandardGate::SX);
                out.rotation(StandardGate::Rz, beta + PI);
                out.fixed(StandardGate::SX);
                out.rotation(StandardGate::Rz, alpha + PI);
                out.finish()
            }
        }
    };

    let error = reconstruction_error(u, &sequence);
    if error > SYNTHESIS_TOLERANCE {
        return Err(CompileError::DecompositionTolerance {
            gate: format!("{basis:?} synthesis"),
            error,
            tolerance: SYNTHESIS_TOLERANCE,
        });
    }
    Ok(sequence)
}

/// Product of a gate list in time order.
pub fn sequence_matrix(gates: &[StandardGate]) -> Option<Unitary2x2> {
    gates.iter().try_fold(Unitary2x2::identity(), |acc, gate| {
        Unitary2x2::from_gate(gate).map(|m| m * acc)
    })
}

fn reconstruction_error(u: &Unitary2x2, sequence: &OneQubitSequence) -> f64 {
    match sequence_matrix(&sequence.gates) {
        Some(m) => {
            let rebuilt = m.scale(Complex64::from_polar(1.0, sequence.global_phase));
            u.data
                .iter()
                .zip(&rebuilt.data)
                .map(|(a, b)| (a - b).norm())
                .fold(0.0, f64::max)
        }
        None => f64::INFINITY,
    }
}
