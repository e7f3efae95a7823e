//! End-to-end transpilation scenarios.

mod common;

use std::sync::Arc;
use std::thread;

use num_complex::Complex64;
use qtrans_compile::passes::{
    CouplingVerification, GateCombine, SabreRouting, TrivialLayout, UnrollTo2Qubit, UnrollToBasis,
};
use qtrans_compile::synthesis::{Unitary2x2, Unitary4x4};
use qtrans_compile::{
    BackendModel, BasisGates, CompileError, Pass, PassFlow, PropertySet, TranspileOptions,
    Transpiler,
};
use qtrans_ir::{Circuit, CustomGate, QubitId, StandardGate};

use common::{all_gates_adjacent, assert_routed_equivalent, init_tracing, unitary};

fn transpiler(backend: BackendModel, level: u8) -> Transpiler {
    init_tracing();
    Transpiler::new(Arc::new(backend), TranspileOptions::with_level(level)).unwrap()
}

#[test]
fn valid_circuit_passes_through_level_0_unchanged() {
    let backend =
        BackendModel::new("pair", 2, [(0, 1, 0.99)], BasisGates::new(["h", "cx"])).unwrap();
    let mut circuit = Circuit::with_size("hcx", 2, 0);
    circuit.h(QubitId(0)).unwrap();
    circuit.cx(QubitId(0), QubitId(1)).unwrap();

    let result = transpiler(backend, 0).transpile(&circuit).unwrap();

    assert_eq!(result.circuit.instructions(), circuit.instructions());
    assert_eq!(result.stats.swaps_inserted, 0);
    assert_eq!(result.initial_layout, result.final_layout);
}

#[test]
fn distant_cx_on_line_needs_one_swap() {
    let backend = BackendModel::linear(3).with_basis(BasisGates::new(["cx", "swap"]));
    let mut circuit = Circuit::with_size("far", 3, 0);
    circuit.cx(QubitId(0), QubitId(2)).unwrap();

    let mut flow = PassFlow::new();
    flow.add_pass(UnrollTo2Qubit);
    flow.add_pass(TrivialLayout);
    flow.add_pass(SabreRouting::default());
    flow.add_pass(UnrollToBasis::new());
    flow.add_pass(CouplingVerification);
    init_tracing();
    let result = Transpiler::with_flow(Arc::new(backend.clone()), flow)
        .transpile(&circuit)
        .unwrap();

    assert_eq!(result.stats.swaps_inserted, 1);
    assert_eq!(result.stats.gate_counts.get("swap"), Some(&1));
    assert_eq!(result.stats.gate_counts.get("cx"), Some(&1));
    assert!(all_gates_adjacent(&result.circuit, &backend));
    let last = result.circuit.instructions().last().unwrap();
    assert_eq!(last.name(), "cx");
    assert!(backend.is_adjacent(last.qubits[0].0, last.qubits[1].0));
}

#[test]
fn routed_line_circuit_keeps_its_unitary() {
    let backend = BackendModel::linear(3);
    let mut circuit = Circuit::with_size("far", 3, 0);
    circuit.h(QubitId(0)).unwrap();
    circuit.t(QubitId(1)).unwrap();
    circuit.cx(QubitId(0), QubitId(2)).unwrap();
    circuit.cx(QubitId(1), QubitId(2)).unwrap();
    circuit.cx(QubitId(0), QubitId(1)).unwrap();

    for level in 0..=3 {
        let result = transpiler(backend.clone(), level).transpile(&circuit).unwrap();
        assert_eq!(all_gates_adjacent(&result.circuit, &backend), level > 0);
        assert_routed_equivalent(&circuit, &result);
    }
}

#[test]
fn adjacent_rotations_merge() {
    let mut circuit = Circuit::with_size("rz", 1, 0);
    circuit.rz(0.1, QubitId(0)).unwrap();
    circuit.rz(0.2, QubitId(0)).unwrap();
    let mut dag = circuit.to_dag().unwrap();

    GateCombine::new()
        .run(&mut dag, &mut PropertySet::new())
        .unwrap();

    let ops = dag.linearize().unwrap();
    assert_eq!(ops.len(), 1);
    match ops[0].standard_gate() {
        Some(StandardGate::Rz(theta)) => assert!((theta.as_f64().unwrap() - 0.3).abs() < 1e-12),
        other => panic!("expected rz, got {other:?}"),
    }
}

#[test]
fn rotations_merge_through_full_flow() {
    let mut circuit = Circuit::with_size("rz", 1, 0);
    circuit.rz(0.1, QubitId(0)).unwrap();
    circuit.rz(0.2, QubitId(0)).unwrap();

    let result = transpiler(BackendModel::linear(2), 1).transpile(&circuit).unwrap();

    assert_eq!(result.circuit.len(), 1);
    assert_eq!(result.stats.gate_counts.get("rz"), Some(&1));
}

#[test]
fn too_wide_circuit_is_rejected() {
    let circuit = Circuit::ghz(6).unwrap();
    for level in 0..=3 {
        let result = transpiler(BackendModel::linear(5), level).transpile(&circuit);
        assert!(matches!(
            result,
            Err(CompileError::InsufficientQubits {
                required: 6,
                available: 5
            })
        ));
    }
}

#[test]
fn disconnected_backend_reports_unreachable_layout() {
    let backend = BackendModel::new(
        "islands",
        4,
        [(0, 1, 0.99), (2, 3, 0.99)],
        BasisGates::default(),
    )
    .unwrap();
    let mut circuit = Circuit::with_size("triangle", 3, 0);
    circuit.cx(QubitId(0), QubitId(1)).unwrap();
    circuit.cx(QubitId(1), QubitId(2)).unwrap();
    circuit.cx(QubitId(0), QubitId(2)).unwrap();

    for level in 1..=3 {
        let result = transpiler(backend.clone(), level).transpile(&circuit);
        assert!(
            matches!(result, Err(CompileError::UnreachableLayout(_))),
            "level {level}: {result:?}"
        );
    }

    // Level 0 does not place qubits, so the triangle compiles but has no
    // fidelity estimate on this coupling graph.
    let unplaced = transpiler(backend, 0).transpile(&circuit).unwrap();
    assert_eq!(unplaced.stats.estimated_fidelity, None);
}

#[test]
fn disconnected_backend_fits_circuit_in_one_part() {
    let backend = BackendModel::new(
        "islands",
        4,
        [(0, 1, 0.99), (2, 3, 0.97)],
        BasisGates::default(),
    )
    .unwrap();
    let mut circuit = Circuit::with_size("pair", 3, 0);
    circuit.h(QubitId(1)).unwrap();
    circuit.cx(QubitId(0), QubitId(2)).unwrap();

    for level in 1..=3 {
        let result = transpiler(backend.clone(), level).transpile(&circuit).unwrap();
        assert_eq!(result.stats.swaps_inserted, 0, "level {level}");
        assert!(all_gates_adjacent(&result.circuit, &backend));
        assert!(result.stats.estimated_fidelity.is_some());
        assert_routed_equivalent(&circuit, &result);
    }
}

fn custom_gate(name: &str, num_qubits: u32, matrix: Vec<Complex64>) -> CustomGate {
    CustomGate::new(name, num_qubits).with_matrix(matrix).unwrap()
}

#[test]
fn custom_two_qubit_unitaries_use_fewest_cx() {
    let backend = BackendModel::linear(2).with_basis(BasisGates::ibm());
    let gate = |g: StandardGate| Unitary4x4::from_gate(&g).unwrap();
    let generic = Unitary4x4::kron(&Unitary2x2::u(0.3, 1.2, -0.8), &Unitary2x2::h())
        * Unitary4x4::rxx(0.4)
        * Unitary4x4::ryy(0.9)
        * Unitary4x4::rzz(-0.2)
        * Unitary4x4::kron(&Unitary2x2::rx(0.7), &Unitary2x2::u(1.0, 0.1, 0.2));

    for (u, expected) in [
        (gate(StandardGate::CX), 1),
        (gate(StandardGate::ISwap), 2),
        (gate(StandardGate::Swap), 3),
        (generic, 3),
    ] {
        let matrix = u.data.iter().flatten().copied().collect();
        let mut circuit = Circuit::with_size("blob", 2, 0);
        circuit
            .gate(custom_gate("blob", 2, matrix), [QubitId(0), QubitId(1)])
            .unwrap();

        let result = transpiler(backend.clone(), 1).transpile(&circuit).unwrap();
        assert_eq!(result.stats.gate_counts.get("cx"), Some(&expected));
        assert_routed_equivalent(&circuit, &result);
    }
}

#[test]
fn three_qubit_custom_unitary_is_synthesized() {
    let mut source = Circuit::with_size("source", 3, 0);
    source.h(QubitId(0)).unwrap();
    source.ry(0.8, QubitId(1)).unwrap();
    source.ccx(QubitId(0), QubitId(1), QubitId(2)).unwrap();
    source.crz(1.3, QubitId(2), QubitId(0)).unwrap();
    source.t(QubitId(2)).unwrap();
    source.cx(QubitId(1), QubitId(0)).unwrap();

    // Row-major from the simulator's columns.
    let columns = unitary(&source);
    let matrix = (0..8)
        .flat_map(|row| columns.iter().map(move |col| col[row]))
        .collect();
    let mut circuit = Circuit::with_size("oracle", 3, 0);
    circuit
        .gate(custom_gate("oracle", 3, matrix), [QubitId(0), QubitId(1), QubitId(2)])
        .unwrap();

    let backend = BackendModel::linear(3).with_basis(BasisGates::ibm());
    for level in 0..=3 {
        let result = transpiler(backend.clone(), level).transpile(&circuit).unwrap();
        assert!(
            result
                .stats
                .gate_counts
                .keys()
                .all(|g| backend.basis().contains(g)),
            "{:?}",
            result.stats.gate_counts
        );
        assert_routed_equivalent(&source, &result);
    }
}

#[test]
fn multi_controlled_rotations_reach_the_basis() {
    let mut circuit = Circuit::with_size("mc", 4, 0);
    for q in 0..4 {
        circuit.h(QubitId(q)).unwrap();
    }
    circuit
        .mcry(0.9, &[QubitId(0), QubitId(1), QubitId(2)], QubitId(3))
        .unwrap();
    circuit
        .mcu(0.5, 1.5, -0.5, &[QubitId(3), QubitId(1)], QubitId(0))
        .unwrap();

    let backend = BackendModel::grid(2, 2).with_basis(BasisGates::cz());
    let result = transpiler(backend.clone(), 2).transpile(&circuit).unwrap();
    assert!(all_gates_adjacent(&result.circuit, &backend));
    assert!(
        result
            .stats
            .gate_counts
            .keys()
            .all(|g| backend.basis().contains(g))
    );
    assert_routed_equivalent(&circuit, &result);
}

#[test]
fn opaque_gate_is_unsupported() {
    let mut circuit = Circuit::with_size("opaque", 2, 0);
    circuit
        .gate(CustomGate::new("mystery", 1), [QubitId(0)])
        .unwrap();
    let result = transpiler(BackendModel::linear(2), 1).transpile(&circuit);
    assert!(matches!(result, Err(CompileError::UnsupportedGate { .. })));

    let mut wide = Circuit::with_size("opaque3", 3, 0);
    wide.gate(
        CustomGate::new("mystery3", 3),
        [QubitId(0), QubitId(1), QubitId(2)],
    )
    .unwrap();
    let result = transpiler(BackendModel::linear(3), 0).transpile(&wide);
    assert!(matches!(result, Err(CompileError::UnsupportedGate { .. })));
}

#[test]
fn multi_controlled_gates_reach_any_basis() {
    let mut circuit = Circuit::with_size("toffoli", 4, 0);
    for q in 0..4 {
        circuit.h(QubitId(q)).unwrap();
    }
    circuit.ccx(QubitId(0), QubitId(1), QubitId(2)).unwrap();
    circuit.cswap(QubitId(3), QubitId(0), QubitId(2)).unwrap();

    for basis in [BasisGates::ibm(), BasisGates::cz(), BasisGates::iswap()] {
        let backend = BackendModel::ring(5).with_basis(basis.clone());
        let result = transpiler(backend.clone(), 2).transpile(&circuit).unwrap();
        assert!(
            result
                .stats
                .gate_counts
                .keys()
                .all(|g| basis.contains(g)),
            "{:?}",
            result.stats.gate_counts
        );
        assert!(all_gates_adjacent(&result.circuit, &backend));
        assert_routed_equivalent(&circuit, &result);
    }
}

#[test]
fn qft_on_grid_is_equivalent_at_every_level() {
    let backend = BackendModel::grid(2, 3).with_basis(BasisGates::ibm());
    let circuit = Circuit::qft(5).unwrap();

    for level in 0..=3 {
        let result = transpiler(backend.clone(), level).transpile(&circuit).unwrap();
        if level > 0 {
            assert!(all_gates_adjacent(&result.circuit, &backend));
        }
        assert_eq!(result.initial_layout.len(), 5);
        assert_routed_equivalent(&circuit, &result);
    }
}

#[test]
fn shared_transpiler_is_deterministic_across_threads() {
    let backend = BackendModel::grid(3, 3).with_basis(BasisGates::ibm());
    let transpiler = Arc::new(transpiler(backend, 3));
    let circuit = Arc::new(Circuit::qft(7).unwrap());
    let reference = transpiler.transpile(&circuit).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let transpiler = Arc::clone(&transpiler);
            let circuit = Arc::clone(&circuit);
            thread::spawn(move || transpiler.transpile(&circuit).unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), reference);
    }
}

#[test]
fn batch_matches_single_calls() {
    let transpiler = transpiler(BackendModel::ring(6).with_basis(BasisGates::ibm()), 3);
    let circuits: Vec<Circuit> = (2..=6).map(|n| Circuit::qft(n).unwrap()).collect();
    let batch = transpiler.transpile_batch(&circuits);
    for (circuit, result) in circuits.iter().zip(batch) {
        assert_eq!(result.unwrap(), transpiler.transpile(circuit).unwrap());
    }
}
