//! Property-based tests for the circuit DAG.
//!
//! Building a DAG and linearizing it must give back the input sequence,
//! and every structural mutation must keep the wire invariants intact.

use qtrans_ir::{Circuit, CircuitDag, ClbitId, Instruction, QubitId, StandardGate};
use proptest::prelude::*;

/// Operations used to generate random circuits.
#[derive(Debug, Clone)]
enum Op {
    H(u32),
    T(u32),
    Rz(u32, f64),
    Cx(u32, u32),
    Swap(u32, u32),
    Ccx(u32, u32, u32),
    Barrier,
    Measure(u32),
}

impl Op {
    fn instruction(&self, num_qubits: u32) -> Option<Instruction> {
        Some(match *self {
            Op::H(q) => Instruction::single_qubit_gate(StandardGate::H, QubitId(q)),
            Op::T(q) => Instruction::single_qubit_gate(StandardGate::T, QubitId(q)),
            Op::Rz(q, a) => Instruction::single_qubit_gate(StandardGate::Rz(a.into()), QubitId(q)),
            Op::Cx(a, b) if a != b => {
                Instruction::two_qubit_gate(StandardGate::CX, QubitId(a), QubitId(b))
            }
            Op::Swap(a, b) if a != b => {
                Instruction::two_qubit_gate(StandardGate::Swap, QubitId(a), QubitId(b))
            }
            Op::Ccx(a, b, c) if a != b && b != c && a != c => {
                Instruction::gate(StandardGate::CCX, [QubitId(a), QubitId(b), QubitId(c)])
            }
            Op::Barrier => Instruction::barrier((0..num_qubits).map(QubitId)),
            Op::Measure(q) => Instruction::measure(QubitId(q), ClbitId(q)),
            _ => return None,
        })
    }
}

fn arb_op(num_qubits: u32) -> impl Strategy<Value = Op> {
    let q = 0..num_qubits;
    prop_oneof![
        q.clone().prop_map(Op::H),
        q.clone().prop_map(Op::T),
        (q.clone(), -3.0_f64..3.0).prop_map(|(q, a)| Op::Rz(q, a)),
        (q.clone(), q.clone()).prop_map(|(a, b)| Op::Cx(a, b)),
        (q.clone(), q.clone()).prop_map(|(a, b)| Op::Swap(a, b)),
        (q.clone(), q.clone(), q.clone()).prop_map(|(a, b, c)| Op::Ccx(a, b, c)),
        Just(Op::Barrier),
        q.prop_map(Op::Measure),
    ]
}

fn arb_circuit() -> impl Strategy<Value = Circuit> {
    (1_u32..=6).prop_flat_map(|n| {
        prop::collection::vec(arb_op(n), 0..=40).prop_map(move |ops| {
            let instructions = ops.iter().filter_map(|op| op.instruction(n)).collect();
            Circuit::from_instructions("prop", n, n, instructions)
        })
    })
}

proptest! {
    #[test]
    fn linearize_returns_input_sequence(circuit in arb_circuit()) {
        let dag = circuit.to_dag().unwrap();
        prop_assert!(dag.verify_integrity().is_ok());
        prop_assert_eq!(dag.linearize().unwrap(), circuit.instructions().to_vec());
    }

    #[test]
    fn remove_keeps_integrity(circuit in arb_circuit(), pick in any::<prop::sample::Index>()) {
        let mut dag = circuit.to_dag().unwrap();
        let nodes = dag.topological_op_nodes().unwrap();
        prop_assume!(!nodes.is_empty());
        let victim = nodes[pick.index(nodes.len())];
        let position = nodes.iter().position(|&n| n == victim).unwrap();

        dag.remove_op(victim).unwrap();
        prop_assert!(dag.verify_integrity().is_ok());

        let mut expected = circuit.instructions().to_vec();
        expected.remove(position);
        prop_assert_eq!(dag.linearize().unwrap(), expected);
    }

    #[test]
    fn substitute_with_self_is_identity(circuit in arb_circuit(), pick in any::<prop::sample::Index>()) {
        let mut dag = circuit.to_dag().unwrap();
        let nodes = dag.topological_op_nodes().unwrap();
        prop_assume!(!nodes.is_empty());
        let node = nodes[pick.index(nodes.len())];
        let inst = dag.get_instruction(node).unwrap().clone();

        dag.substitute_node(node, [inst.clone(), inst]).unwrap();
        prop_assert!(dag.verify_integrity().is_ok());
        prop_assert_eq!(dag.num_ops(), circuit.len() + 1);
    }

    #[test]
    fn reversed_twice_round_trips(circuit in arb_circuit()) {
        let dag = circuit.to_dag().unwrap();
        let back = dag.reversed().unwrap().reversed().unwrap();
        prop_assert_eq!(back.linearize().unwrap(), circuit.instructions().to_vec());
        prop_assert_eq!(back.depth(), dag.depth());
    }

    #[test]
    fn depth_bounded_by_op_count(circuit in arb_circuit()) {
        let dag: CircuitDag = circuit.to_dag().unwrap();
        prop_assert!(dag.depth() <= dag.num_ops());
    }
}
