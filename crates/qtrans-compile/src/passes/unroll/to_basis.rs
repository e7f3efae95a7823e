//! Lowering of every non-native operation into the backend's basis.
//!
//! Single-qubit gates are re-synthesized numerically with the backend's
//! Euler family. Two-qubit standard gates go through a fixed rule table
//! into CX plus single-qubit gates, and CX itself is re-expressed in CZ,
//! CP or iSWAP when the backend lacks it. Custom two-qubit matrices go
//! through the KAK decomposition into at most three CX between
//! single-qubit blocks. Wider operations, custom matrices included, are
//! first unrolled by [`to_2q::unroll`]. Each piece is lowered again until
//! it is native.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use qtrans_ir::{
    CircuitDag, GateKind, Instruction, ParameterExpression, QubitId, StandardGate,
};
use tracing::debug;

use super::to_2q;
use crate::backend::BasisGates;
use crate::error::{CompileError, CompileResult};
use crate::pass::{Pass, PassKind};
use crate::property::PropertySet;
use crate::synthesis::{CxStep, EulerBasis, Unitary2x2, Unitary4x4, cx_sequence, synthesize};

/// Rotations below this are dropped from synthesized sequences.
const EULER_TOLERANCE: f64 = 1e-10;

/// Nesting limit of rule applications for one source operation.
const MAX_DEPTH: usize = 8;

/// Pick the single-qubit synthesis family for `basis`.
///
/// An explicit request must be native; otherwise the cheapest native
/// family is inferred, and `None` means the basis has none.
pub fn resolve_euler_basis(
    basis: &BasisGates,
    requested: Option<EulerBasis>,
) -> CompileResult<Option<EulerBasis>> {
    match requested {
        Some(family) if family.gate_names().iter().all(|g| basis.contains(g)) => Ok(Some(family)),
        Some(family) => Err(CompileError::InvalidConfiguration(format!(
            "euler basis {family:?} needs {:?}, which the backend does not provide",
            family.gate_names()
        ))),
        None => Ok(basis.euler_basis()),
    }
}

/// Unroll-to-basis pass.
///
/// Requires [`PropertySet::backend`]. After it runs, every operation is
/// native, so a second run changes nothing.
#[derive(Debug, Clone, Default)]
pub struct UnrollToBasis {
    euler_basis: Option<EulerBasis>,
}

impl UnrollToBasis {
    /// Infer the Euler family from the backend basis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a single-qubit synthesis family.
    #[must_use]
    pub fn with_euler_basis(mut self, basis: Option<EulerBasis>) -> Self {
        self.euler_basis = basis;
        self
    }
}

impl Pass for UnrollToBasis {
    fn name(&self) -> &'static str {
        "UnrollToBasis"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, dag: &mut CircuitDag, properties: &mut PropertySet) -> CompileResult<()> {
        let backend = properties
            .backend
            .clone()
            .ok_or(CompileError::MissingBackend)?;
        let mut lowering = Lowering {
            basis: backend.basis(),
            euler: resolve_euler_basis(backend.basis(), self.euler_basis)?,
            phase: 0.0,
        };

        let targets: Vec<_> = dag
            .topological_ops()?
            .into_iter()
            .filter(|(_, inst)| !backend.is_native(inst))
            .map(|(node, _)| node)
            .collect();

        for &node in &targets {
            let inst = dag
                .get_instruction(node)
                .cloned()
                .ok_or_else(|| CompileError::Internal(format!("stale node {node:?}")))?;
            let mut out = Vec::new();
            lowering.lower(inst, 0, &mut out)?;
            dag.substitute_node(node, out)?;
        }
        dag.add_global_phase(lowering.phase);

        debug!(
            "UnrollToBasis lowered {} operations, {} ops now",
            targets.len(),
            dag.num_ops()
        );
        Ok(())
    }
}

struct Lowering<'a> {
    basis: &'a BasisGates,
    euler: Option<EulerBasis>,
    /// Phase dropped by the rules applied so far.
    phase: f64,
}

impl Lowering<'_> {
    fn lower(
        &mut self,
        inst: Instruction,
        depth: usize,
        out: &mut Vec<Instruction>,
    ) -> CompileResult<()> {
        if !inst.is_gate() || self.basis.contains(inst.name()) {
            out.push(inst);
            return Ok(());
        }
        if depth > MAX_DEPTH {
            return Err(CompileError::UnsupportedGate {
                gate: inst.name().to_string(),
                reason: "no rule chain reaches the backend basis".into(),
            });
        }
        let Some(gate) = inst.as_gate() else {
            return Err(CompileError::Internal("gate without a gate kind".into()));
        };

        match (&gate.kind, inst.qubits.as_slice()) {
            (
                GateKind::Standard(
                    StandardGate::CCX
                    | StandardGate::CSwap
                    | StandardGate::Mcx(_)
                    | StandardGate::Mcry(..)
                    | StandardGate::Mcu(..),
                ),
                _,
            )
            | (GateKind::Custom(_), [_, _, _, ..]) => {
                for piece in to_2q::unroll(&inst)? {
                    self.lower(piece, depth + 1, out)?;
                }
                Ok(())
            }
            (GateKind::Standard(std), &[q]) => {
                if let Some(parameter) = std.parameters().into_iter().find(|p| p.is_symbolic()) {
                    return Err(CompileError::UnboundParameter {
                        gate: std.name().to_string(),
                        parameter: parameter.to_string(),
                    });
                }
                let u = Unitary2x2::from_gate(std).ok_or_else(|| {
                    CompileError::Internal(format!("no matrix for '{}'", std.name()))
                })?;
                self.emit_one_qubit(&u, std.name(), q, out)
            }
            (GateKind::Standard(std), &[a, b]) => {
                for piece in self.two_qubit_rule(std, a, b)? {
                    self.lower(piece, depth + 1, out)?;
                }
                Ok(())
            }
            (GateKind::Custom(custom), qubits) => {
                let matrix = custom.matrix.as_deref().ok_or_else(|| {
                    CompileError::UnsupportedGate {
                        gate: custom.name.clone(),
                        reason: "custom gate carries no matrix".into(),
                    }
                })?;
                match qubits {
                    &[q] => {
                        let u = Unitary2x2::from_slice(matrix).ok_or_else(|| {
                            CompileError::MalformedCircuit(format!(
                                "matrix of '{}' is not 2x2",
                                custom.name
                            ))
                        })?;
                        self.emit_one_qubit(&u, &custom.name, q, out)
                    }
                    &[a, b] => {
                        let u = Unitary4x4::from_slice(matrix).ok_or_else(|| {
                            CompileError::MalformedCircuit(format!(
                                "matrix of '{}' is not 4x4",
                                custom.name
                            ))
                        })?;
                        self.emit_two_qubit(&u, &custom.name, a, b, depth, out)
                    }
                    _ => Err(CompileError::UnsupportedGate {
                        gate: custom.name.clone(),
                        reason: "custom gate without operands".into(),
                    }),
                }
            }
            (GateKind::Standard(std), qubits) => Err(CompileError::UnsupportedGate {
                gate: std.name().to_string(),
                reason: format!("no rule for {} operands", qubits.len()),
            }),
        }
    }

    fn emit_one_qubit(
        &mut self,
        u: &Unitary2x2,
        name: &str,
        qubit: QubitId,
        out: &mut Vec<Instruction>,
    ) -> CompileResult<()> {
        let family = self.euler.ok_or_else(|| CompileError::UnsupportedGate {
            gate: name.to_string(),
            reason: "backend basis has no single-qubit rotation family".into(),
        })?;
        let sequence = synthesize(u, family, EULER_TOLERANCE).map_err(|err| match err {
            CompileError::DecompositionTolerance {
                error, tolerance, ..
            } => CompileError::DecompositionTolerance {
                gate: name.to_string(),
                error,
                tolerance,
            },
            other => other,
        })?;
        self.phase += sequence.global_phase;
        out.extend(
            sequence
                .gates
                .into_iter()
                .map(|g| Instruction::single_qubit_gate(g, qubit)),
        );
        Ok(())
    }

    fn emit_two_qubit(
        &mut self,
        u: &Unitary4x4,
        name: &str,
        a: QubitId,
        b: QubitId,
        depth: usize,
        out: &mut Vec<Instruction>,
    ) -> CompileResult<()> {
        let sequence = cx_sequence(u).map_err(|err| match err {
            CompileError::DecompositionTolerance {
                error, tolerance, ..
            } => CompileError::DecompositionTolerance {
                gate: name.to_string(),
                error,
                tolerance,
            },
            other => other,
        })?;
        self.phase += sequence.global_phase;

        let operands = [a, b];
        for step in sequence.steps {
            match step {
                CxStep::Local { qubit, unitary } => {
                    self.emit_one_qubit(&unitary, name, operands[qubit], out)?;
                }
                CxStep::Cx { control } => {
                    let cx = two(StandardGate::CX, operands[control], operands[1 - control]);
                    self.lower(cx, depth + 1, out)?;
                }
            }
        }
        Ok(())
    }

    /// CX built from whichever entangler the backend has.
    fn native_cx(&mut self, c: QubitId, t: QubitId) -> CompileResult<Vec<Instruction>> {
        if self.basis.contains("cz") {
            Ok(vec![one(StandardGate::H, t), two(StandardGate::CZ, c, t), one(StandardGate::H, t)])
        } else if self.basis.contains("cp") {
            Ok(vec![
                one(StandardGate::H, t),
                two(StandardGate::CP(ParameterExpression::constant(PI)), c, t),
                one(StandardGate::H, t),
            ])
        } else if self.basis.contains("iswap") {
            self.phase += FRAC_PI_4;
            Ok(vec![
                one(rz(-FRAC_PI_2), c),
                one(rx(FRAC_PI_2), t),
                one(rz(FRAC_PI_2), t),
                two(StandardGate::ISwap, c, t),
                one(rx(FRAC_PI_2), c),
                two(StandardGate::ISwap, c, t),
                one(rz(FRAC_PI_2), t),
            ])
        } else {
            Err(CompileError::UnsupportedGate {
                gate: "cx".into(),
                reason: "backend has none of cx, cz, cp or iswap".into(),
            })
        }
    }

    /// One rewrite step for a non-native two-qubit gate.
    fn two_qubit_rule(
        &mut self,
        gate: &StandardGate,
        a: QubitId,
        b: QubitId,
    ) -> CompileResult<Vec<Instruction>> {
        let half = |theta: &ParameterExpression| theta.scaled(0.5);
        let neg_half = |theta: &ParameterExpression| theta.scaled(-0.5);
        let cx = two(StandardGate::CX, a, b);

        Ok(match gate {
            StandardGate::CX => return self.native_cx(a, b),
            StandardGate::CY => vec![one(StandardGate::Sdg, b), cx, one(StandardGate::S, b)],
            StandardGate::CZ => vec![one(StandardGate::H, b), cx, one(StandardGate::H, b)],
            StandardGate::CH => vec![
                one(StandardGate::S, b),
                one(StandardGate::H, b),
                one(StandardGate::T, b),
                cx,
                one(StandardGate::Tdg, b),
                one(StandardGate::H, b),
                one(StandardGate::Sdg, b),
            ],
            StandardGate::Swap => vec![cx.clone(), two(StandardGate::CX, b, a), cx],
            StandardGate::ISwap => vec![
                one(StandardGate::S, a),
                one(StandardGate::S, b),
                one(StandardGate::H, a),
                cx,
                two(StandardGate::CX, b, a),
                one(StandardGate::H, b),
            ],
            StandardGate::CRx(theta) => vec![
                one(StandardGate::S, b),
                cx.clone(),
                one(StandardGate::Ry(neg_half(theta)), b),
                cx,
                one(StandardGate::Ry(half(theta)), b),
                one(StandardGate::Sdg, b),
            ],
            StandardGate::CRy(theta) => vec![
                one(StandardGate::Ry(half(theta)), b),
                cx.clone(),
                one(StandardGate::Ry(neg_half(theta)), b),
                cx,
            ],
            StandardGate::CRz(theta) => vec![
                one(StandardGate::Rz(half(theta)), b),
                cx.clone(),
                one(StandardGate::Rz(neg_half(theta)), b),
                cx,
            ],
            StandardGate::CP(theta) => vec![
                one(StandardGate::P(half(theta)), a),
                cx.clone(),
                one(StandardGate::P(neg_half(theta)), b),
                cx,
                one(StandardGate::P(half(theta)), b),
            ],
            StandardGate::RZZ(theta) => {
                vec![cx.clone(), one(StandardGate::Rz(theta.clone()), b), cx]
            }
            StandardGate::RXX(theta) => vec![
                one(StandardGate::H, a),
                one(StandardGate::H, b),
                two(StandardGate::RZZ(theta.clone()), a, b),
                one(StandardGate::H, a),
                one(StandardGate::H, b),
            ],
            StandardGate::RYY(theta) => vec![
                one(rx(FRAC_PI_2), a),
                one(rx(FRAC_PI_2), b),
                two(StandardGate::RZZ(theta.clone()), a, b),
                one(rx(-FRAC_PI_2), a),
                one(rx(-FRAC_PI_2), b),
            ],
            other => {
                return Err(CompileError::UnsupportedGate {
                    gate: other.name().to_string(),
                    reason: "no two-qubit rule".into(),
                });
            }
        })
    }
}

fn one(gate: StandardGate, q: QubitId) -> Instruction {
    Instruction::single_qubit_gate(gate, q)
}

fn two(gate: StandardGate, a: QubitId, b: QubitId) -> Instruction {
    Instruction::two_qubit_gate(gate, a, b)
}

fn rx(theta: f64) -> StandardGate {
    StandardGate::Rx(ParameterExpression::constant(theta))
}

fn rz(theta: f64) -> StandardGate {
    StandardGate::Rz(ParameterExpression::constant(theta))
}
