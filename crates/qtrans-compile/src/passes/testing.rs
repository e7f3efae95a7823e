//! Dense-matrix helpers for pass unit tests.

use num_complex::Complex64;
use qtrans_ir::{CircuitDag, GateKind, Instruction, StandardGate};

use crate::synthesis::{Unitary2x2, Unitary4x4};

/// Full unitary of `dag`, qubit 0 most significant, global phase included.
pub(crate) fn dag_unitary(dag: &CircuitDag) -> Vec<Vec<Complex64>> {
    let n = dag.num_qubits();
    let dim = 1usize << n;
    let ops = dag.linearize().unwrap();
    let phase = Complex64::from_polar(1.0, dag.global_phase());
    let mut columns = Vec::with_capacity(dim);
    for col in 0..dim {
        let mut state = vec![Complex64::new(0.0, 0.0); dim];
        state[col] = phase;
        for inst in &ops {
            apply(&mut state, n, inst);
        }
        columns.push(state);
    }
    (0..dim)
        .map(|row| (0..dim).map(|col| columns[col][row]).collect())
        .collect()
}

fn apply(state: &mut [Complex64], n: usize, inst: &Instruction) {
    let Some(gate) = inst.as_gate() else {
        return;
    };
    let bit = |q: usize| 1usize << (n - 1 - q);
    match (&gate.kind, inst.qubits.as_slice()) {
        (kind, [q]) => {
            let u = match kind {
                GateKind::Standard(g) => Unitary2x2::from_gate(g).unwrap(),
                GateKind::Custom(c) => Unitary2x2::from_slice(c.matrix.as_ref().unwrap()).unwrap(),
            };
            let m = bit(q.index());
            for i in (0..state.len()).filter(|i| i & m == 0) {
                let (a, b) = (state[i], state[i | m]);
                state[i] = u.at(0, 0) * a + u.at(0, 1) * b;
                state[i | m] = u.at(1, 0) * a + u.at(1, 1) * b;
            }
        }
        (kind, [q0, q1]) => {
            let u = match kind {
                GateKind::Standard(g) => Unitary4x4::from_gate(g).unwrap(),
                GateKind::Custom(c) => Unitary4x4::from_slice(c.matrix.as_ref().unwrap()).unwrap(),
            };
            let (m0, m1) = (bit(q0.index()), bit(q1.index()));
            for i in (0..state.len()).filter(|i| i & (m0 | m1) == 0) {
                let idx = [i, i | m1, i | m0, i | m0 | m1];
                let v = idx.map(|k| state[k]);
                for (r, &k) in idx.iter().enumerate() {
                    state[k] = (0..4).map(|c| u.data[r][c] * v[c]).sum();
                }
            }
        }
        (kind, qubits) => {
            let masks: Vec<usize> = qubits.iter().map(|q| bit(q.index())).collect();
            apply_dense(state, &masks, &wide_matrix(kind, qubits.len()));
        }
    }
}

/// Row-major matrix of a gate on three or more qubits.
fn wide_matrix(kind: &GateKind, width: usize) -> Vec<Complex64> {
    let dim = 1usize << width;
    let target = match kind {
        GateKind::Custom(c) => return c.matrix.clone().unwrap(),
        GateKind::Standard(StandardGate::CCX | StandardGate::Mcx(_)) => Unitary2x2::x(),
        GateKind::Standard(StandardGate::Mcry(_, theta)) => {
            Unitary2x2::ry(theta.as_f64().unwrap())
        }
        GateKind::Standard(StandardGate::Mcu(_, theta, phi, lambda)) => Unitary2x2::u(
            theta.as_f64().unwrap(),
            phi.as_f64().unwrap(),
            lambda.as_f64().unwrap(),
        ),
        GateKind::Standard(StandardGate::CSwap) => {
            let mut m = vec![Complex64::new(0.0, 0.0); dim * dim];
            for i in 0..dim {
                let j = if i >> 2 == 1 && (i >> 1) & 1 != i & 1 { i ^ 3 } else { i };
                m[j * dim + i] = Complex64::new(1.0, 0.0);
            }
            return m;
        }
        GateKind::Standard(other) => panic!("no test matrix for {}", other.name()),
    };
    let mut m = vec![Complex64::new(0.0, 0.0); dim * dim];
    for i in 0..dim - 2 {
        m[i * dim + i] = Complex64::new(1.0, 0.0);
    }
    for r in 0..2 {
        for c in 0..2 {
            m[(dim - 2 + r) * dim + dim - 2 + c] = target.at(r, c);
        }
    }
    m
}

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

/// Unitary of a two-qubit DAG as a [`Unitary4x4`].
pub(crate) fn two_qubit_unitary(dag: &CircuitDag) -> Unitary4x4 {
    let full = dag_unitary(dag);
    let mut data = [[Complex64::new(0.0, 0.0); 4]; 4];
    for (r, row) in full.iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            data[r][c] = v;
        }
    }
    Unitary4x4 { data }
}

/// Panics unless both DAGs implement the same unitary, phase included.
pub(crate) fn assert_equivalent(expected: &CircuitDag, actual: &CircuitDag) {
    let a = dag_unitary(expected);
    let b = dag_unitary(actual);
    let worst = a
        .iter()
        .flatten()
        .zip(b.iter().flatten())
        .map(|(x, y)| (x - y).norm())
        .fold(0.0, f64::max);
    assert!(worst < 1e-8, "unitaries differ by {worst:e}");
}
