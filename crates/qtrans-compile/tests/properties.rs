//! Property-based tests for the transpiler passes and the full flow.

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use qtrans_compile::passes::{GateCombine, OneQubitOptimization, UnrollTo2Qubit, UnrollToBasis};
use qtrans_compile::{BackendModel, BasisGates, Pass, PropertySet, TranspileOptions, Transpiler};
use qtrans_ir::{Circuit, CircuitDag, Instruction, QubitId, StandardGate};

use common::{all_gates_adjacent, assert_routed_equivalent, with_h_layer};

#[derive(Debug, Clone)]
enum Op {
    H(u32),
    T(u32),
    Sx(u32),
    Rz(u32, f64),
    Rx(u32, f64),
    Cx(u32, u32),
    Cz(u32, u32),
    Rzz(u32, u32, f64),
    Swap(u32, u32),
    Ccx(u32, u32, u32),
}

impl Op {
    fn instruction(&self) -> Option<Instruction> {
        let one = |g, q| Instruction::single_qubit_gate(g, QubitId(q));
        let two = |g, a: u32, b: u32| {
            (a != b).then(|| Instruction::two_qubit_gate(g, QubitId(a), QubitId(b)))
        };
        match *self {
            Op::H(q) => Some(one(StandardGate::H, q)),
            Op::T(q) => Some(one(StandardGate::T, q)),
            Op::Sx(q) => Some(one(StandardGate::SX, q)),
            Op::Rz(q, a) => Some(one(StandardGate::Rz(a.into()), q)),
            Op::Rx(q, a) => Some(one(StandardGate::Rx(a.into()), q)),
            Op::Cx(a, b) => two(StandardGate::CX, a, b),
            Op::Cz(a, b) => two(StandardGate::CZ, a, b),
            Op::Rzz(a, b, t) => two(StandardGate::RZZ(t.into()), a, b),
            Op::Swap(a, b) => two(StandardGate::Swap, a, b),
            Op::Ccx(a, b, c) if a != b && b != c && a != c => Some(Instruction::gate(
                StandardGate::CCX,
                [QubitId(a), QubitId(b), QubitId(c)],
            )),
            Op::Ccx(..) => None,
        }
    }
}

fn arb_op(n: u32) -> impl Strategy<Value = Op> {
    let q = 0..n;
    let angle = -3.2_f64..3.2;
    prop_oneof![
        q.clone().prop_map(Op::H),
        q.clone().prop_map(Op::T),
        q.clone().prop_map(Op::Sx),
        (q.clone(), angle.clone()).prop_map(|(q, a)| Op::Rz(q, a)),
        (q.clone(), angle.clone()).prop_map(|(q, a)| Op::Rx(q, a)),
        (q.clone(), q.clone()).prop_map(|(a, b)| Op::Cx(a, b)),
        (q.clone(), q.clone()).prop_map(|(a, b)| Op::Cz(a, b)),
        (q.clone(), q.clone(), angle).prop_map(|(a, b, t)| Op::Rzz(a, b, t)),
        (q.clone(), q.clone()).prop_map(|(a, b)| Op::Swap(a, b)),
        (q.clone(), q.clone(), q).prop_map(|(a, b, c)| Op::Ccx(a, b, c)),
    ]
}

/// Circuits on 2 to 4 qubits in which every qubit is used.
fn arb_circuit() -> impl Strategy<Value = Circuit> {
    (2_u32..=4).prop_flat_map(|n| {
        prop::collection::vec(arb_op(n), 0..=24).prop_map(move |ops| {
            let body: Vec<Instruction> = ops.iter().filter_map(Op::instruction).collect();
            with_h_layer(n, &body)
        })
    })
}

/// Circuits with no gate wider than two qubits.
fn arb_two_qubit_circuit() -> impl Strategy<Value = Circuit> {
    arb_circuit().prop_map(|circuit| {
        let ops = circuit
            .instructions()
            .iter()
            .filter(|inst| inst.qubits.len() <= 2)
            .cloned()
            .collect::<Vec<_>>();
        let mut out = Circuit::with_size("two_qubit", circuit.num_qubits(), 0);
        for inst in ops {
            out.push(inst).unwrap();
        }
        out
    })
}

fn arb_backend() -> impl Strategy<Value = BackendModel> {
    let topology = prop_oneof![
        (4_u32..=6).prop_map(BackendModel::linear),
        (4_u32..=6).prop_map(BackendModel::ring),
        (4_u32..=6).prop_map(BackendModel::star),
        Just(BackendModel::grid(2, 3)),
        (4_u32..=5).prop_map(BackendModel::full),
    ];
    let basis = prop_oneof![
        Just(BasisGates::default()),
        Just(BasisGates::ibm()),
        Just(BasisGates::cz()),
    ];
    (topology, basis).prop_map(|(backend, basis)| backend.with_basis(basis))
}

fn props(backend: &BackendModel) -> PropertySet {
    PropertySet::new().with_backend(Arc::new(backend.clone()))
}

fn run(pass: &dyn Pass, dag: &mut CircuitDag, props: &mut PropertySet) {
    if pass.should_run(dag, props) {
        pass.run(dag, props).unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn routed_gates_are_adjacent(
        circuit in arb_circuit(),
        backend in arb_backend(),
        level in 0_u8..=3,
    ) {
        let transpiler =
            Transpiler::new(Arc::new(backend.clone()), TranspileOptions::with_level(level)).unwrap();
        let result = transpiler.transpile(&circuit).unwrap();
        // Level 0 keeps logical qubits, so only the basis is guaranteed.
        if level > 0 {
            prop_assert!(all_gates_adjacent(&result.circuit, &backend));
        }
        prop_assert!(result.stats.gate_counts.keys().all(|g| backend.basis().contains(g)));
    }

    #[test]
    fn layout_domain_is_the_used_qubits(
        circuit in arb_circuit(),
        backend in arb_backend(),
        level in 0_u8..=3,
    ) {
        let transpiler =
            Transpiler::new(Arc::new(backend.clone()), TranspileOptions::with_level(level)).unwrap();
        let result = transpiler.transpile(&circuit).unwrap();
        let used: Vec<u32> = circuit.to_dag().unwrap().qubits_used().into_iter().map(|q| q.0).collect();

        let initial: Vec<u32> = result.initial_layout.keys().copied().collect();
        let last: Vec<u32> = result.final_layout.keys().copied().collect();
        prop_assert_eq!(&initial, &used);
        prop_assert_eq!(&last, &used);

        let mut images: Vec<u32> = result.initial_layout.values().copied().collect();
        images.sort_unstable();
        images.dedup();
        prop_assert_eq!(images.len(), used.len());
        prop_assert!(images.iter().all(|&p| p < backend.num_qubits()));
    }

    #[test]
    fn transpiled_circuit_is_equivalent(
        circuit in arb_circuit(),
        backend in arb_backend(),
        level in 0_u8..=3,
    ) {
        let transpiler =
            Transpiler::new(Arc::new(backend), TranspileOptions::with_level(level)).unwrap();
        let result = transpiler.transpile(&circuit).unwrap();
        assert_routed_equivalent(&circuit, &result);
    }

    #[test]
    fn unroll_to_basis_is_idempotent(circuit in arb_circuit(), backend in arb_backend()) {
        let mut dag = circuit.to_dag().unwrap();
        let mut props = props(&backend);
        run(&UnrollTo2Qubit, &mut dag, &mut props);
        run(&UnrollToBasis::new(), &mut dag, &mut props);
        let once = dag.linearize().unwrap();
        let phase = dag.global_phase();

        run(&UnrollToBasis::new(), &mut dag, &mut props);
        prop_assert_eq!(dag.linearize().unwrap(), once);
        prop_assert!((dag.global_phase() - phase).abs() < 1e-12);
    }

    #[test]
    fn gate_combine_never_grows(circuit in arb_two_qubit_circuit()) {
        let mut dag = circuit.to_dag().unwrap();
        let (ops, depth) = (dag.num_ops(), dag.depth());
        run(&GateCombine::new(), &mut dag, &mut PropertySet::new());
        prop_assert!(dag.num_ops() <= ops);
        prop_assert!(dag.depth() <= depth);
    }

    #[test]
    fn one_qubit_optimization_never_grows(
        circuit in arb_two_qubit_circuit(),
        backend in arb_backend(),
    ) {
        let mut dag = circuit.to_dag().unwrap();
        let mut props = props(&backend);
        run(&UnrollToBasis::new(), &mut dag, &mut props);
        let (ops, depth) = (dag.num_ops(), dag.depth());
        run(&OneQubitOptimization::new(), &mut dag, &mut props);
        prop_assert!(dag.num_ops() <= ops);
        prop_assert!(dag.depth() <= depth);
    }
}
