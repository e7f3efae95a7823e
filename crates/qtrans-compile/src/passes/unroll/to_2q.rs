//! Decomposition of gates on three or more qubits.

use std::f64::consts::PI;

use num_complex::Complex64;
use qtrans_ir::{
    CircuitDag, CustomGate, GateKind, Instruction, InstructionKind, ParameterExpression, QubitId,
    StandardGate,
};
use tracing::debug;

use crate::error::{CompileError, CompileResult};
use crate::pass::{Pass, PassKind};
use crate::property::PropertySet;
use crate::synthesis::{QsdStep, Unitary2x2, Unitary4x4, qsd_decompose};

/// Name of the dense blocks emitted for matrices and controlled roots.
pub const UNITARY_BLOCK: &str = "unitary";

/// Rewrites every operation on three or more qubits into one- and
/// two-qubit gates.
///
/// - `ccx`: the 6-CX Toffoli network
/// - `cswap`: `cx · ccx · cx`
/// - `mcx(n)`: Hadamards around a gray-code multi-controlled phase
/// - `mcry(n, θ)`: gray-code ladder of `cry(±θ/2^(n-1))`
/// - `mcu(n, θ, φ, λ)`: gray-code ladder of controlled `2^(n-1)`-th roots
///   of `U`, emitted as two-qubit `unitary` blocks
/// - custom gates with a matrix: Shannon decomposition down to two-qubit
///   `unitary` blocks
///
/// Measurements over several qubits are split into one measure per qubit.
/// Barriers keep their full width.
pub struct UnrollTo2Qubit;

impl Pass for UnrollTo2Qubit {
    fn name(&self) -> &'static str {
        "UnrollTo2Qubit"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, dag: &mut CircuitDag, _properties: &mut PropertySet) -> CompileResult<()> {
        let targets: Vec<_> = dag
            .topological_ops()?
            .into_iter()
            .filter(|(_, inst)| needs_unroll(inst))
            .map(|(node, _)| node)
            .collect();

        for &node in &targets {
            let inst = dag
                .get_instruction(node)
                .ok_or_else(|| CompileError::Internal(format!("stale node {node:?}")))?;
            let replacement = unroll(inst)?;
            dag.substitute_node(node, replacement)?;
        }

        debug!("UnrollTo2Qubit rewrote {} operations", targets.len());
        Ok(())
    }
}

fn needs_unroll(inst: &Instruction) -> bool {
    match inst.kind {
        InstructionKind::Gate(_) => inst.qubits.len() > 2,
        InstructionKind::Measure => inst.qubits.len() > 1,
        _ => false,
    }
}

/// Decompose one wide operation.
pub fn unroll(inst: &Instruction) -> CompileResult<Vec<Instruction>> {
    let gate = match &inst.kind {
        InstructionKind::Measure => {
            return Ok(inst
                .qubits
                .iter()
                .zip(&inst.clbits)
                .map(|(&q, &c)| Instruction::measure(q, c))
                .collect());
        }
        InstructionKind::Gate(gate) => gate,
        _ => return Ok(vec![inst.clone()]),
    };

    let q = &inst.qubits;
    match &gate.kind {
        GateKind::Standard(StandardGate::CCX) => Ok(ccx(q[0], q[1], q[2])),
        GateKind::Standard(StandardGate::CSwap) => {
            let (c, a, b) = (q[0], q[1], q[2]);
            let mut out = vec![cx(b, a)];
            out.extend(ccx(c, a, b));
            out.push(cx(b, a));
            Ok(out)
        }
        GateKind::Standard(StandardGate::Mcx(_)) => {
            let (target, controls) = q
                .split_last()
                .ok_or_else(|| CompileError::MalformedCircuit("mcx without operands".into()))?;
            Ok(mcx(controls, *target))
        }
        GateKind::Standard(StandardGate::Mcry(_, theta)) => {
            let (target, controls) = q
                .split_last()
                .ok_or_else(|| CompileError::MalformedCircuit("mcry without operands".into()))?;
            Ok(mcry(theta, controls, *target))
        }
        GateKind::Standard(StandardGate::Mcu(_, theta, phi, lambda)) => {
            let (target, controls) = q
                .split_last()
                .ok_or_else(|| CompileError::MalformedCircuit("mcu without operands".into()))?;
            mcu([theta, phi, lambda], controls, *target)
        }
        GateKind::Standard(_) if q.len() <= 2 => Ok(vec![inst.clone()]),
        GateKind::Custom(custom) if q.len() > 2 => match custom.matrix.as_deref() {
            Some(matrix) => shannon(&custom.name, matrix, q),
            None => Err(CompileError::UnsupportedGate {
                gate: custom.name.clone(),
                reason: format!("{}-qubit custom gate carries no matrix", q.len()),
            }),
        },
        _ => Err(CompileError::UnsupportedGate {
            gate: gate.name().to_string(),
            reason: format!("no decomposition rule for a {}-qubit operation", q.len()),
        }),
    }
}

fn one(gate: StandardGate, q: QubitId) -> Instruction {
    Instruction::single_qubit_gate(gate, q)
}

fn cx(control: QubitId, target: QubitId) -> Instruction {
    Instruction::two_qubit_gate(StandardGate::CX, control, target)
}

fn ccx(a: QubitId, b: QubitId, c: QubitId) -> Vec<Instruction> {
    vec![
        one(StandardGate::H, c),
        cx(b, c),
        one(StandardGate::Tdg, c),
        cx(a, c),
        one(StandardGate::T, c),
        cx(b, c),
        one(StandardGate::Tdg, c),
        cx(a, c),
        one(StandardGate::T, b),
        one(StandardGate::T, c),
        one(StandardGate::H, c),
        cx(a, b),
        one(StandardGate::T, a),
        one(StandardGate::Tdg, b),
        cx(a, b),
    ]
}

/// X on `target` controlled by all of `controls`.
fn mcx(controls: &[QubitId], target: QubitId) -> Vec<Instruction> {
    match controls {
        [] => vec![one(StandardGate::X, target)],
        [c] => vec![cx(*c, target)],
        [a, b] => ccx(*a, *b, target),
        _ => {
            let mut out = vec![one(StandardGate::H, target)];
            out.extend(mcphase(PI, controls, target));
            out.push(one(StandardGate::H, target));
            out
        }
    }
}

/// Phase `lambda` on the all-ones state of `controls + [target]`.
fn mcphase(lambda: f64, controls: &[QubitId], target: QubitId) -> Vec<Instruction> {
    let angle = lambda / root_order(controls.len());
    gray_ladder(controls, |odd, control| {
        let sign = if odd { 1.0 } else { -1.0 };
        Instruction::two_qubit_gate(
            StandardGate::CP(ParameterExpression::constant(sign * angle)),
            control,
            target,
        )
    })
}

/// `Ry(theta)` on `target` controlled by all of `controls`.
///
/// Rotations about one axis compose by adding angles, so symbolic angles
/// survive.
fn mcry(theta: &ParameterExpression, controls: &[QubitId], target: QubitId) -> Vec<Instruction> {
    match controls {
        [] => vec![one(StandardGate::Ry(theta.clone()), target)],
        [c] => vec![Instruction::two_qubit_gate(
            StandardGate::CRy(theta.clone()),
            *c,
            target,
        )],
        _ => {
            let angle = theta.scaled(1.0 / root_order(controls.len()));
            gray_ladder(controls, |odd, control| {
                let step = if odd { angle.clone() } else { angle.scaled(-1.0) };
                Instruction::two_qubit_gate(StandardGate::CRy(step), control, target)
            })
        }
    }
}

/// `U(theta, phi, lambda)` on `target` controlled by all of `controls`.
fn mcu(
    params: [&ParameterExpression; 3],
    controls: &[QubitId],
    target: QubitId,
) -> CompileResult<Vec<Instruction>> {
    let [theta, phi, lambda] = params;
    if controls.is_empty() {
        return Ok(vec![one(
            StandardGate::U(theta.clone(), phi.clone(), lambda.clone()),
            target,
        )]);
    }

    let mut values = [0.0; 3];
    for (value, param) in values.iter_mut().zip(params) {
        *value = param.as_f64().ok_or_else(|| CompileError::UnboundParameter {
            gate: "mcu".into(),
            parameter: param.to_string(),
        })?;
    }
    let order = u32::try_from(controls.len() - 1)
        .ok()
        .and_then(|shift| 1u32.checked_shl(shift))
        .ok_or_else(|| CompileError::UnsupportedGate {
            gate: "mcu".into(),
            reason: format!("{} controls exceed the root precision", controls.len()),
        })?;

    let root = Unitary2x2::u(values[0], values[1], values[2]).root(order);
    let forward = controlled_block(&root)?;
    let backward = controlled_block(&root.dagger())?;
    Ok(gray_ladder(controls, |odd, control| {
        let block = if odd { &forward } else { &backward };
        Instruction::gate(block.clone(), [control, target])
    }))
}

fn controlled_block(u: &Unitary2x2) -> CompileResult<CustomGate> {
    let matrix = Unitary4x4::controlled(u).data.iter().flatten().copied().collect();
    Ok(CustomGate::new(UNITARY_BLOCK, 2).with_matrix(matrix)?)
}

/// `2^(n-1)`: the number of roots a gray-code ladder over `n` controls
/// multiplies together on the all-ones state.
fn root_order(n: usize) -> f64 {
    2f64.powi(i32::try_from(n.saturating_sub(1)).unwrap_or(i32::MAX))
}

/// Gray-code ladder over `controls`.
///
/// Walks the gray code over the controls. Each step moves the parity of
/// the active pattern onto its leftmost control with CX gates, then calls
/// `rotation(odd, leftmost)` with `odd` the parity of the pattern's
/// weight. When every rotation is a power `V^{±1}` of one gate the ladder
/// applies `V^(2^(n-1))` on the all-ones state and nothing elsewhere.
fn gray_ladder(
    controls: &[QubitId],
    rotation: impl Fn(bool, QubitId) -> Instruction,
) -> Vec<Instruction> {
    let n = controls.len();
    let bit = |pattern: usize, index: usize| (pattern >> (n - 1 - index)) & 1 == 1;

    let mut out = Vec::new();
    let mut previous: Option<usize> = None;
    for i in 1..(1usize << n) {
        let pattern = i ^ (i >> 1);
        let Some(leftmost) = (0..n).find(|&k| bit(pattern, k)) else {
            continue;
        };

        if let Some(prev) = previous {
            if let Some(changed) = (0..n).find(|&k| bit(pattern, k) != bit(prev, k)) {
                if changed == leftmost {
                    for k in (leftmost + 1..n).filter(|&k| bit(pattern, k)) {
                        out.push(cx(controls[k], controls[leftmost]));
                    }
                } else {
                    out.push(cx(controls[changed], controls[leftmost]));
                }
            }
        }

        out.push(rotation(pattern.count_ones() % 2 == 1, controls[leftmost]));
        previous = Some(pattern);
    }
    out
}

/// Shannon decomposition of a dense matrix on `qubits`.
fn shannon(name: &str, matrix: &[Complex64], qubits: &[QubitId]) -> CompileResult<Vec<Instruction>> {
    let steps = qsd_decompose(name, matrix, qubits.len())?;
    debug!(
        "Shannon decomposition of '{}' on {} qubits: {} steps",
        name,
        qubits.len(),
        steps.len()
    );
    steps
        .into_iter()
        .map(|step| {
            Ok(match step {
                QsdStep::Ry { qubit, theta } => one(
                    StandardGate::Ry(ParameterExpression::constant(theta)),
                    qubits[qubit],
                ),
                QsdStep::Rz { qubit, theta } => one(
                    StandardGate::Rz(ParameterExpression::constant(theta)),
                    qubits[qubit],
                ),
                QsdStep::Cx { control, target } => cx(qubits[control], qubits[target]),
                QsdStep::Unitary {
                    qubits: local,
                    matrix,
                } => {
                    let width = u32::try_from(local.len())
                        .map_err(|_| CompileError::Internal("oversized unitary block".into()))?;
                    let block = CustomGate::new(UNITARY_BLOCK, width).with_matrix(matrix)?;
                    Instruction::gate(block, local.into_iter().map(|k| qubits[k]))
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::assert_equivalent;
    use qtrans_ir::{Circuit, ClbitId};

    fn run(circuit: &Circuit) -> CompileResult<CircuitDag> {
        let mut dag = circuit.to_dag()?;
        UnrollTo2Qubit.run(&mut dag, &mut PropertySet::new())?;
        Ok(dag)
    }

    #[test]
    fn test_ccx_becomes_six_cx() {
        let mut circuit = Circuit::with_size("toffoli", 3, 0);
        circuit.ccx(QubitId(0), QubitId(1), QubitId(2)).unwrap();
        let dag = run(&circuit).unwrap();
        let counts = dag.count_ops();
        assert_eq!(counts.get("cx"), Some(&6));
        assert_eq!(dag.num_ops(), 15);
        assert!(dag.op_nodes().all(|(_, inst)| inst.qubits.len() <= 2));
    }

    #[test]
    fn test_cswap_wraps_toffoli() {
        let mut circuit = Circuit::with_size("fredkin", 3, 0);
        circuit.cswap(QubitId(0), QubitId(1), QubitId(2)).unwrap();
        let dag = run(&circuit).unwrap();
        assert_eq!(dag.count_ops().get("cx"), Some(&8));
    }

    #[test]
    fn test_mcx_small_cases() {
        assert_eq!(mcx(&[], QubitId(0)).len(), 1);
        assert_eq!(mcx(&[QubitId(0)], QubitId(1)), vec![cx(QubitId(0), QubitId(1))]);
        assert_eq!(mcx(&[QubitId(0), QubitId(1)], QubitId(2)).len(), 15);
    }

    #[test]
    fn test_mcx_three_controls_shape() {
        let controls = [QubitId(0), QubitId(1), QubitId(2)];
        let out = mcx(&controls, QubitId(3));
        let cps = out.iter().filter(|i| i.name() == "cp").count();
        assert_eq!(cps, 7);
        assert_eq!(out.first().map(Instruction::name), Some("h"));
        assert_eq!(out.last().map(Instruction::name), Some("h"));
        assert!(out.iter().all(|i| i.qubits.len() <= 2));
    }

    #[test]
    fn test_split_multi_qubit_measure() {
        let mut dag = CircuitDag::with_size(2, 2);
        dag.apply(Instruction {
            kind: InstructionKind::Measure,
            qubits: vec![QubitId(0), QubitId(1)],
            clbits: vec![ClbitId(0), ClbitId(1)],
        })
        .unwrap();
        UnrollTo2Qubit
            .run(&mut dag, &mut PropertySet::new())
            .unwrap();
        let ops = dag.linearize().unwrap();
        assert_eq!(ops, vec![
            Instruction::measure(QubitId(0), ClbitId(0)),
            Instruction::measure(QubitId(1), ClbitId(1)),
        ]);
    }

    #[test]
    fn test_wide_custom_gate_is_unsupported() {
        let mut circuit = Circuit::with_size("custom", 3, 0);
        circuit
            .gate(CustomGate::new("oracle", 3), [QubitId(0), QubitId(1), QubitId(2)])
            .unwrap();
        assert!(matches!(
            run(&circuit),
            Err(CompileError::UnsupportedGate { .. })
        ));
    }

    #[test]
    fn test_order_is_preserved_around_unrolled_gate() {
        let mut circuit = Circuit::with_size("order", 3, 0);
        circuit.x(QubitId(2)).unwrap();
        circuit.ccx(QubitId(0), QubitId(1), QubitId(2)).unwrap();
        circuit.z(QubitId(2)).unwrap();
        let ops = run(&circuit).unwrap().linearize().unwrap();
        assert_eq!(ops.first().map(Instruction::name), Some("x"));
        assert_eq!(ops.last().map(Instruction::name), Some("z"));
    }

    fn toffoli_matrix() -> Vec<Complex64> {
        let mut m = vec![Complex64::new(0.0, 0.0); 64];
        for i in 0..8 {
            let j = if i >> 1 == 3 { i ^ 1 } else { i };
            m[j * 8 + i] = Complex64::new(1.0, 0.0);
        }
        m
    }

    fn assert_unrolls_equivalent(circuit: &Circuit) {
        let dag = run(circuit).unwrap();
        assert!(dag.op_nodes().all(|(_, inst)| inst.qubits.len() <= 2));
        assert_equivalent(&circuit.to_dag().unwrap(), &dag);
    }

    #[test]
    fn test_mcry_keeps_symbolic_angle() {
        let controls = [QubitId(0), QubitId(1)];
        let out = mcry(&ParameterExpression::symbol("theta"), &controls, QubitId(2));
        let crys: Vec<_> = out.iter().filter(|i| i.name() == "cry").collect();
        assert_eq!(crys.len(), 3);
        assert_eq!(out.iter().filter(|i| i.name() == "cx").count(), 2);
        assert!(crys
            .iter()
            .all(|i| i.standard_gate().is_some_and(StandardGate::is_parameterized)));
    }

    #[test]
    fn test_mcry_matches_controlled_rotation() {
        for n in 2..=3 {
            let mut circuit = Circuit::with_size("mcry", n + 1, 0);
            let controls: Vec<_> = (0..n).map(QubitId).collect();
            circuit.mcry(0.7, &controls, QubitId(n)).unwrap();
            assert_unrolls_equivalent(&circuit);
        }
    }

    #[test]
    fn test_mcu_matches_controlled_u() {
        let mut circuit = Circuit::with_size("mcu", 4, 0);
        circuit
            .mcu(0.4, -1.1, 2.3, &[QubitId(2), QubitId(0), QubitId(3)], QubitId(1))
            .unwrap();
        assert_unrolls_equivalent(&circuit);
    }

    #[test]
    fn test_mcu_needs_bound_angles() {
        let mut circuit = Circuit::with_size("mcu", 3, 0);
        circuit
            .mcu(
                ParameterExpression::symbol("t"),
                0.0,
                0.0,
                &[QubitId(0), QubitId(1)],
                QubitId(2),
            )
            .unwrap();
        assert!(matches!(
            run(&circuit),
            Err(CompileError::UnboundParameter { .. })
        ));
    }

    #[test]
    fn test_mcx_four_controls_is_equivalent() {
        let mut circuit = Circuit::with_size("mcx", 5, 0);
        let controls: Vec<_> = (0..4).map(QubitId).collect();
        circuit.mcx(&controls, QubitId(4)).unwrap();
        assert_unrolls_equivalent(&circuit);
    }

    #[test]
    fn test_custom_matrix_is_synthesized() {
        let oracle = CustomGate::new("oracle", 3)
            .with_matrix(toffoli_matrix())
            .unwrap();
        let mut circuit = Circuit::with_size("custom", 3, 0);
        circuit
            .gate(oracle, [QubitId(2), QubitId(0), QubitId(1)])
            .unwrap();
        let dag = run(&circuit).unwrap();
        assert!(dag.op_nodes().all(|(_, inst)| inst.qubits.len() <= 2));

        let mut reference = Circuit::with_size("toffoli", 3, 0);
        reference.ccx(QubitId(2), QubitId(0), QubitId(1)).unwrap();
        assert_equivalent(&reference.to_dag().unwrap(), &dag);
    }
}
