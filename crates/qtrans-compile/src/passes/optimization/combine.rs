//! Gate combination: angle merging, inverse cancellation and identity removal.

use std::f64::consts::{PI, TAU};

use qtrans_ir::{CircuitDag, Instruction, NodeIndex, StandardGate, WireId};
use tracing::debug;

use crate::error::CompileResult;
use crate::pass::{Pass, PassKind};
use crate::property::PropertySet;
use crate::synthesis::EPSILON;

/// Upper bound on sweeps; every productive sweep removes at least one op.
const MAX_SWEEPS: usize = 1_000;

/// Gate-combine pass.
///
/// Looks at each gate together with the operation that follows it on all of
/// its wires:
///
/// - rotations of the same kind on the same operands merge by adding angles
/// - a gate followed by its inverse on the same operands cancels
/// - gates equal to the identity (up to a tracked global phase) vanish
///
/// Sweeps repeat until nothing changes. Every rewrite removes at least one
/// node and never lengthens a wire, so gate count and depth never grow.
pub struct GateCombine;

impl GateCombine {
    /// Create a new gate-combine pass.
    pub fn new() -> Self {
        Self
    }
}

impl Default for GateCombine {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for GateCombine {
    fn name(&self) -> &'static str {
        "GateCombine"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, dag: &mut CircuitDag, _properties: &mut PropertySet) -> CompileResult<()> {
        let before = dag.num_ops();
        for _ in 0..MAX_SWEEPS {
            if !sweep(dag)? {
                break;
            }
        }
        debug!("GateCombine removed {} operations", before - dag.num_ops());
        Ok(())
    }

    fn should_run(&self, dag: &CircuitDag, _properties: &PropertySet) -> bool {
        dag.num_ops() > 0
    }
}

/// One pass over the DAG in topological order. Returns whether anything changed.
fn sweep(dag: &mut CircuitDag) -> CompileResult<bool> {
    let mut changed = false;
    for node in dag.topological_op_nodes()? {
        let Some(inst) = dag.get_instruction(node).cloned() else {
            continue;
        };
        let Some(gate) = inst.standard_gate() else {
            continue;
        };

        if let Some(phase) = identity_phase(gate) {
            dag.remove_op(node)?;
            dag.add_global_phase(phase);
            changed = true;
            continue;
        }

        let Some(next) = follower(dag, node, &inst) else {
            continue;
        };
        let Some(next_inst) = dag.get_instruction(next).cloned() else {
            continue;
        };
        let Some(next_gate) = next_inst.standard_gate() else {
            continue;
        };

        let same_order = inst.qubits == next_inst.qubits;
        let same_wires = same_order || gate.is_symmetric();

        if same_wires {
            if let Some(merged) = merge(gate, next_gate) {
                dag.replace_op(node, Instruction::gate(merged, inst.qubits.iter().copied()))?;
                dag.remove_op(next)?;
                changed = true;
                continue;
            }
            if gate.inverse().as_ref() == Some(next_gate) {
                dag.remove_op(next)?;
                dag.remove_op(node)?;
                changed = true;
            }
        }
    }
    Ok(changed)
}

/// The operation that comes right after `node` on every one of its wires,
/// provided it acts on exactly the same qubits.
fn follower(dag: &CircuitDag, node: NodeIndex, inst: &Instruction) -> Option<NodeIndex> {
    let mut wires = inst.qubits.iter().map(|&q| WireId::Qubit(q));
    let first = dag.next_op_on_wire(node, wires.next()?)?;
    if !wires.all(|w| dag.next_op_on_wire(node, w) == Some(first)) {
        return None;
    }
    let next = dag.get_instruction(first)?;
    let same_set = next.clbits.is_empty()
        && next.qubits.len() == inst.qubits.len()
        && next.qubits.iter().all(|q| inst.qubits.contains(q));
    same_set.then_some(first)
}

/// Sum the angles of two rotations of the same kind.
fn merge(a: &StandardGate, b: &StandardGate) -> Option<StandardGate> {
    let sum = |x: &qtrans_ir::ParameterExpression, y: &qtrans_ir::ParameterExpression| {
        (x.clone() + y.clone()).simplify()
    };
    Some(match (a, b) {
        (StandardGate::Rx(x), StandardGate::Rx(y)) => StandardGate::Rx(sum(x, y)),
        (StandardGate::Ry(x), StandardGate::Ry(y)) => StandardGate::Ry(sum(x, y)),
        (StandardGate::Rz(x), StandardGate::Rz(y)) => StandardGate::Rz(sum(x, y)),
        (StandardGate::P(x), StandardGate::P(y)) => StandardGate::P(sum(x, y)),
        (StandardGate::CRx(x), StandardGate::CRx(y)) => StandardGate::CRx(sum(x, y)),
        (StandardGate::CRy(x), StandardGate::CRy(y)) => StandardGate::CRy(sum(x, y)),
        (StandardGate::CRz(x), StandardGate::CRz(y)) => StandardGate::CRz(sum(x, y)),
        (StandardGate::CP(x), StandardGate::CP(y)) => StandardGate::CP(sum(x, y)),
        (StandardGate::RXX(x), StandardGate::RXX(y)) => StandardGate::RXX(sum(x, y)),
        (StandardGate::RYY(x), StandardGate::RYY(y)) => StandardGate::RYY(sum(x, y)),
        (StandardGate::RZZ(x), StandardGate::RZZ(y)) => StandardGate::RZZ(sum(x, y)),
        _ => return None,
    })
}

/// `Some(phase)` when `gate` equals `e^{i·phase}·I`.
fn identity_phase(gate: &StandardGate) -> Option<f64> {
    // Rotations: R(θ + 2π) = -R(θ), so 2π is -I and 4π is I.
    let half_turn = |angle: f64| {
        let r = angle.rem_euclid(2.0 * TAU);
        if r < EPSILON || 2.0 * TAU - r < EPSILON {
            Some(0.0)
        } else if (r - TAU).abs() < EPSILON {
            Some(PI)
        } else {
            None
        }
    };
    let full_turn = |angle: f64| {
        let r = angle.rem_euclid(TAU);
        (r < EPSILON || TAU - r < EPSILON).then_some(0.0)
    };
    let controlled = |angle: f64| {
        let r = angle.rem_euclid(2.0 * TAU);
        (r < EPSILON || 2.0 * TAU - r < EPSILON).then_some(0.0)
    };

    match gate {
        StandardGate::I => Some(0.0),
        StandardGate::Rx(p)
        | StandardGate::Ry(p)
        | StandardGate::Rz(p)
        | StandardGate::RXX(p)
        | StandardGate::RYY(p)
        | StandardGate::RZZ(p) => half_turn(p.as_f64()?),
        StandardGate::P(p) | StandardGate::CP(p) => full_turn(p.as_f64()?),
        StandardGate::CRx(p) | StandardGate::CRy(p) | StandardGate::CRz(p) => {
            controlled(p.as_f64()?)
        }
        _ => None,
    }
}
