//! State-vector helpers shared by the integration tests.
//!
//! Qubit 0 is the most significant bit of a basis index, matching
//! [`Unitary4x4`]'s operand order.

#![allow(dead_code)]

use num_complex::Complex64;
use qtrans_compile::TranspileResult;
use qtrans_compile::synthesis::{Unitary2x2, Unitary4x4};
use qtrans_ir::{Circuit, GateKind, Instruction, StandardGate};
use tracing_subscriber::EnvFilter;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Route `tracing` output through the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Run `circuit` on `state`. Measurements, barriers and delays are skipped.
pub fn simulate(circuit: &Circuit, state: &mut [Complex64]) {
    let n = circuit.num_qubits() as usize;
    let phase = Complex64::from_polar(1.0, circuit.global_phase());
    for amp in state.iter_mut() {
        *amp *= phase;
    }
    for inst in circuit.instructions() {
        apply(state, n, inst);
    }
}

fn apply(state: &mut [Complex64], n: usize, inst: &Instruction) {
    let Some(gate) = inst.as_gate() else {
        return;
    };
    let bit = |q: usize| 1usize << (n - 1 - q);
    let masks: Vec<usize> = inst.qubits.iter().map(|q| bit(q.index())).collect();

    if let GateKind::Standard(g) = &gate.kind {
        match g {
            StandardGate::CCX | StandardGate::Mcx(_) => {
                let (target, controls) = masks.split_last().expect("target operand");
                let control: usize = controls.iter().sum();
                flip_where(state, control, *target);
                return;
            }
            StandardGate::Mcry(_, theta) => {
                let u = Unitary2x2::ry(theta.as_f64().expect("bound angle"));
                controlled_where(state, &masks, &u);
                return;
            }
            StandardGate::Mcu(_, theta, phi, lambda) => {
                let u = Unitary2x2::u(
                    theta.as_f64().expect("bound angle"),
                    phi.as_f64().expect("bound angle"),
                    lambda.as_f64().expect("bound angle"),
                );
                controlled_where(state, &masks, &u);
                return;
            }
            StandardGate::CSwap => {
                let (c, a, b) = (masks[0], masks[1], masks[2]);
                for i in 0..state.len() {
                    if i & c != 0 && i & a != 0 && i & b == 0 {
                        state.swap(i, (i & !a) | b);
                    }
                }
                return;
            }
            _ => {}
        }
    }

    match masks.as_slice() {
        [m] => {
            let u = match &gate.kind {
                GateKind::Standard(g) => Unitary2x2::from_gate(g),
                GateKind::Custom(c) => c.matrix.as_deref().and_then(Unitary2x2::from_slice),
            }
            .expect("numeric one-qubit gate");
            for i in (0..state.len()).filter(|i| i & m == 0) {
                let (a, b) = (state[i], state[i | m]);
                state[i] = u.at(0, 0) * a + u.at(0, 1) * b;
                state[i | m] = u.at(1, 0) * a + u.at(1, 1) * b;
            }
        }
        [m0, m1] => {
            let u = match &gate.kind {
                GateKind::Standard(g) => Unitary4x4::from_gate(g),
                GateKind::Custom(c) => c.matrix.as_deref().and_then(Unitary4x4::from_slice),
            }
            .expect("numeric two-qubit gate");
            for i in (0..state.len()).filter(|i| i & (m0 | m1) == 0) {
                let idx = [i, i | m1, i | m0, i | m0 | m1];
                let v = idx.map(|k| state[k]);
                for (r, &k) in idx.iter().enumerate() {
                    state[k] = (0..4).map(|c| u.data[r][c] * v[c]).sum();
                }
            }
        }
        _ => {
            let matrix = match &gate.kind {
                GateKind::Custom(c) => c.matrix.as_deref(),
                GateKind::Standard(_) => None,
            }
            .unwrap_or_else(|| panic!("simulator cannot apply {}", inst.name()));
            apply_dense(state, &masks, matrix);
        }
    }
}

/// `u` on the last operand where every other operand is set.
fn controlled_where(state: &mut [Complex64], masks: &[usize], u: &Unitary2x2) {
    let (&target, controls) = masks.split_last().expect("target operand");
    let control: usize = controls.iter().sum();
    for i in 0..state.len() {
        if i & control == control && i & target == 0 {
            let (a, b) = (state[i], state[i | target]);
            state[i] = u.at(0, 0) * a + u.at(0, 1) * b;
            state[i | target] = u.at(1, 0) * a + u.at(1, 1) * b;
        }
    }
}

/// Row-major `matrix` on the operands selected by `masks`, first operand
/// most significant.
fn apply_dense(state: &mut [Complex64], masks: &[usize], matrix: &[Complex64]) {
    let k = masks.len();
    let sub = 1usize << k;
    let all: usize = masks.iter().sum();
    for base in (0..state.len()).filter(|i| i & all == 0) {
        let idx: Vec<usize> = (0..sub)
            .map(|s| {
                masks
                    .iter()
                    .enumerate()
                    .filter(|(t, _)| (s >> (k - 1 - t)) & 1 == 1)
                    .fold(base, |acc, (_, m)| acc | m)
            })
            .collect();
        let v: Vec<Complex64> = idx.iter().map(|&i| state[i]).collect();
        for (r, &i) in idx.iter().enumerate() {
            state[i] = (0..sub).map(|c| matrix[r * sub + c] * v[c]).sum();
        }
    }
}

fn flip_where(state: &mut [Complex64], control: usize, target: usize) {
    for i in 0..state.len() {
        if i & control == control && i & target == 0 {
            state.swap(i, i | target);
        }
    }
}

/// Columns of the unitary of `circuit`.
pub fn unitary(circuit: &Circuit) -> Vec<Vec<Complex64>> {
    let dim = 1usize << circuit.num_qubits();
    (0..dim)
        .map(|col| {
            let mut state = vec![ZERO; dim];
            state[col] = Complex64::new(1.0, 0.0);
            simulate(circuit, &mut state);
            state
        })
        .collect()
}

/// Basis index of the physical register that holds logical basis state `x`.
fn place(x: usize, num_logical: usize, num_physical: usize, layout: &[(u32, u32)]) -> usize {
    layout
        .iter()
        .filter(|(logical, _)| x & (1 << (num_logical - 1 - *logical as usize)) != 0)
        .map(|(_, physical)| 1usize << (num_physical - 1 - *physical as usize))
        .sum()
}

/// The routed circuit read back in logical coordinates.
///
/// Logical column `x` is loaded through the initial layout with every
/// other physical qubit in |0⟩; the output is read through the final
/// layout. Only logical qubits in the layout domain take part, so callers
/// should compare circuits in which every qubit is used.
pub fn routed_unitary(result: &TranspileResult, num_logical: usize) -> Vec<Vec<Complex64>> {
    let num_physical = result.circuit.num_qubits() as usize;
    let initial: Vec<(u32, u32)> = result.initial_layout.iter().map(|(&l, &p)| (l, p)).collect();
    let last: Vec<(u32, u32)> = result.final_layout.iter().map(|(&l, &p)| (l, p)).collect();
    let dim = 1usize << num_logical;
    (0..dim)
        .map(|col| {
            let mut state = vec![ZERO; 1 << num_physical];
            state[place(col, num_logical, num_physical, &initial)] = Complex64::new(1.0, 0.0);
            simulate(&result.circuit, &mut state);
            (0..dim)
                .map(|row| state[place(row, num_logical, num_physical, &last)])
                .collect()
        })
        .collect()
}

/// Largest entry-wise deviation between two unitaries after removing a
/// global phase.
pub fn distance_up_to_phase(expected: &[Vec<Complex64>], actual: &[Vec<Complex64>]) -> f64 {
    let (anchor_e, anchor_a) = expected
        .iter()
        .flatten()
        .zip(actual.iter().flatten())
        .max_by(|x, y| x.0.norm().total_cmp(&y.0.norm()))
        .expect("non-empty unitary");
    if anchor_a.norm() < 1e-9 {
        return f64::INFINITY;
    }
    let phase = anchor_a / anchor_e;
    let phase = phase / phase.norm();
    expected
        .iter()
        .flatten()
        .zip(actual.iter().flatten())
        .map(|(e, a)| (e * phase - a).norm())
        .fold(0.0, f64::max)
}

/// Panics unless the transpiled circuit implements `original` up to the
/// qubit permutations recorded in its layouts.
pub fn assert_routed_equivalent(original: &Circuit, result: &TranspileResult) {
    let expected = unitary(original);
    let actual = routed_unitary(result, original.num_qubits() as usize);
    let d = distance_up_to_phase(&expected, &actual);
    assert!(d < 1e-6, "transpiled circuit differs by {d:e}");
}

/// Every two-qubit gate of `circuit` acts on a coupled pair.
pub fn all_gates_adjacent(circuit: &Circuit, backend: &qtrans_compile::BackendModel) -> bool {
    circuit
        .instructions()
        .iter()
        .filter(|inst| inst.is_two_qubit_gate())
        .all(|inst| backend.is_adjacent(inst.qubits[0].0, inst.qubits[1].0))
}

/// Circuit that touches every qubit with a Hadamard before `body`.
pub fn with_h_layer(n: u32, body: &[Instruction]) -> Circuit {
    let mut circuit = Circuit::with_size("generated", n, 0);
    for q in 0..n {
        circuit.h(qtrans_ir::QubitId(q)).expect("qubit in range");
    }
    for inst in body {
        circuit.push(inst.clone()).expect("valid instruction");
    }
    circuit
}
