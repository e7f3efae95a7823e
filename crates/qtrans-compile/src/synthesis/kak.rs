//! Canonical (KAK) decomposition of two-qubit unitaries.
//!
//! Any `U ∈ U(4)` factors as
//! `e^{iφ}·(A1⊗B1)·exp(i(a·XX + b·YY + c·ZZ))·(A2⊗B2)`. The interaction
//! term is diagonal in the magic basis, where local gates become real
//! orthogonal matrices, so the factorization reduces to diagonalizing the
//! symmetric matrix `UᵀU` there with a real orthogonal eigenbasis.
//!
//! [`cx_sequence`] turns the interaction term into at most three CX gates:
//! three for a generic unitary, two when one angle vanishes and one when a
//! single angle is a quarter turn.

use num_complex::Complex64;
use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, PI};

use super::unitary::{Unitary2x2, Unitary4x4};
use crate::error::{CompileError, CompileResult};

const KAK_TOLERANCE: f64 = 1e-8;
const DIAGONAL_TOLERANCE: f64 = 1e-9;
/// Interaction angles this close to zero or to a quarter turn are snapped
/// when choosing the CX count.
const SNAP_TOLERANCE: f64 = 1e-9;

/// Mixing factors for `Re(M) + κ·Im(M)`; a real and an imaginary part that
/// commute share an eigenbasis, and a generic κ separates it.
pub(super) const MIXING: [f64; 5] = [1.0, 0.414_213_5, 2.718_281_8, 0.123_456_7, 7.654_321];

/// Result of [`decompose`].
///
/// Application order: `before` locals, then `RZZ(zz)·RYY(yy)·RXX(xx)`,
/// then `after` locals; all times `e^{i·global_phase}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoQubitKak {
    /// Locals applied first: `(first operand, second operand)`.
    pub before: (Unitary2x2, Unitary2x2),
    /// RXX angle.
    pub xx: f64,
    /// RYY angle.
    pub yy: f64,
    /// RZZ angle.
    pub zz: f64,
    /// Locals applied last.
    pub after: (Unitary2x2, Unitary2x2),
    /// Phase of the source relative to the gate product.
    pub global_phase: f64,
}

impl TwoQubitKak {
    /// Rebuild the unitary, without the global phase.
    pub fn matrix(&self) -> Unitary4x4 {
        let before = Unitary4x4::kron(&self.before.0, &self.before.1);
        let after = Unitary4x4::kron(&self.after.0, &self.after.1);
        after
            * Unitary4x4::rxx(self.xx)
            * Unitary4x4::ryy(self.yy)
            * Unitary4x4::rzz(self.zz)
            * before
    }
}

fn magic() -> Unitary4x4 {
    let r = Complex64::new(FRAC_1_SQRT_2, 0.0);
    let i = Complex64::new(0.0, FRAC_1_SQRT_2);
    let o = Complex64::new(0.0, 0.0);
    Unitary4x4 {
        data: [[r, o, o, i], [o, i, r, o], [o, i, -r, o], [r, o, o, -i]],
    }
}

type Real4 = [[f64; 4]; 4];

fn real_identity() -> Real4 {
    let mut m = [[0.0; 4]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

fn real_mul(a: &Real4, b: &Real4) -> Real4 {
    let mut out = [[0.0; 4]; 4];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..4).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn real_transpose(a: &Real4) -> Real4 {
    let mut out = [[0.0; 4]; 4];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = a[j][i];
        }
    }
    out
}

fn real_det(a: &Real4) -> f64 {
    let mut m = *a;
    let mut det = 1.0;
    for col in 0..4 {
        let pivot = (col..4)
            .max_by(|&x, &y| m[x][col].abs().total_cmp(&m[y][col].abs()))
            .unwrap_or(col);
        if m[pivot][col].abs() < f64::MIN_POSITIVE {
            return 0.0;
        }
        if pivot != col {
            m.swap(pivot, col);
            det = -det;
        }
        det *= m[col][col];
        for row in col + 1..4 {
            let factor = m[row][col] / m[col][col];
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }
    det
}

fn to_complex(a: &Real4) -> Unitary4x4 {
    Unitary4x4 {
        data: a.map(|row| row.map(|v| Complex64::new(v, 0.0))),
    }
}

/// Cyclic Jacobi eigen-decomposition of a real symmetric matrix.
///
/// Returns the orthogonal matrix whose columns are the eigenvectors.
fn jacobi_eigenvectors(mut a: Real4) -> Real4 {
    let mut vectors = real_identity();
    for _sweep in 0..64 {
        let off: f64 = (0..4)
            .flat_map(|p| (0..4).filter(move |&q| q != p).map(move |q| (p, q)))
            .map(|(p, q)| a[p][q] * a[p][q])
            .sum();
        if off < 1e-30 {
            break;
        }
        for p in 0..3 {
            for q in p + 1..4 {
                if a[p][q].abs() < 1e-300 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                let mut rotation = real_identity();
                rotation[p][p] = c;
                rotation[q][q] = c;
                rotation[p][q] = s;
                rotation[q][p] = -s;

                a = real_mul(&real_mul(&real_transpose(&rotation), &a), &rotation);
                vectors = real_mul(&vectors, &rotation);
            }
        }
    }
    vectors
}

/// Split a local product `K ≈ A⊗B` into its factors, each scaled to unit
/// determinant.
fn kron_factor(k: &Unitary4x4) -> (Unitary2x2, Unitary2x2) {
    let mut best = (0, 0);
    let mut best_norm = -1.0;
    for i in 0..4 {
        for j in 0..4 {
            let n = k.data[i][j].norm();
            if n > best_norm {
                best_norm = n;
                best = (i, j);
            }
        }
    }
    let (ia, ib) = (best.0 / 2, best.0 % 2);
    let (ja, jb) = (best.1 / 2, best.1 % 2);

    let a = Unitary2x2::new(
        k.data[ib][jb],
        k.data[ib][2 + jb],
        k.data[2 + ib][jb],
        k.data[2 + ib][2 + jb],
    );
    let b = Unitary2x2::new(
        k.data[2 * ia][2 * ja],
        k.data[2 * ia][2 * ja + 1],
        k.data[2 * ia + 1][2 * ja],
        k.data[2 * ia + 1][2 * ja + 1],
    );
    (normalize_su2(&a), normalize_su2(&b))
}

fn normalize_su2(m: &Unitary2x2) -> Unitary2x2 {
    let det = m.det();
    if det.norm() < f64::MIN_POSITIVE {
        return *m;
    }
    m.scale(Complex64::new(1.0, 0.0) / det.sqrt())
}

/// Decompose a two-qubit unitary into locals and an interaction core.
///
/// Fails with [`CompileError::DecompositionTolerance`] when the
/// reconstruction is off by more than `1e-8`.
pub fn decompose(u: &Unitary4x4) -> CompileResult<TwoQubitKak> {
    let det = u.det();
    if det.norm() < 1e-12 {
        return Err(CompileError::DecompositionTolerance {
            gate: "two-qubit unitary".into(),
            error: 1.0 - det.norm(),
            tolerance: KAK_TOLERANCE,
        });
    }
    let special = u.scale(Complex64::new(1.0, 0.0) / det.powf(0.25));

    let b = magic();
    let up = b.dagger() * special * b;
    let m2 = up.transpose() * up;

    let mut chosen = None;
    for kappa in MIXING {
        let mixed: Real4 = m2.data.map(|row| row.map(|v| v.re + kappa * v.im));
        let p = jacobi_eigenvectors(mixed);
        let d = to_complex(&real_transpose(&p)) * m2 * to_complex(&p);
        let off_diagonal = (0..4)
            .flat_map(|i| (0..4).filter(move |&j| j != i).map(move |j| (i, j)))
            .map(|(i, j)| d.data[i][j].norm())
            .fold(0.0, f64::max);
        if off_diagonal < DIAGONAL_TOLERANCE {
            chosen = Some((p, d));
            break;
        }
    }
    let Some((mut p, d)) = chosen else {
        return Err(CompileError::DecompositionTolerance {
            gate: "two-qubit unitary".into(),
            error: f64::NAN,
            tolerance: KAK_TOLERANCE,
        });
    };

    if real_det(&p) < 0.0 {
        for row in &mut p {
            row[0] = -row[0];
        }
    }

    let mut roots: [Complex64; 4] = std::array::from_fn(|k| d.data[k][k].sqrt());
    let product: Complex64 = roots.iter().product();
    if product.re < 0.0 {
        roots[0] = -roots[0];
    }

    let k1 = up * to_complex(&p) * Unitary4x4::diagonal(roots.map(|r| r.inv()));
    let k2 = to_complex(&real_transpose(&p));

    let thetas = roots.map(|r| r.arg());
    let a = (thetas[0] + thetas[1] - thetas[2] - thetas[3]) / 4.0;
    let bb = (-thetas[0] + thetas[1] - thetas[2] + thetas[3]) / 4.0;
    let c = (thetas[0] - thetas[1] - thetas[2] + thetas[3]) / 4.0;

    let l1 = b * k1 * b.dagger();
    let l2 = b * k2 * b.dagger();

    let mut kak = TwoQubitKak {
        before: kron_factor(&l2),
        xx: -2.0 * a,
        yy: -2.0 * bb,
        zz: -2.0 * c,
        after: kron_factor(&l1),
        global_phase: 0.0,
    };

    kak.global_phase = matching_phase(&kak.matrix(), u)?;
    Ok(kak)
}

/// Phase `φ` with `e^{iφ}·rebuilt ≈ target`, checked against the tolerance.
fn matching_phase(rebuilt: &Unitary4x4, target: &Unitary4x4) -> CompileResult<f64> {
    let phase = rebuilt.dagger().mul(target).trace().arg();
    let error = rebuilt
        .scale(Complex64::from_polar(1.0, phase))
        .data
        .iter()
        .zip(&target.data)
        .flat_map(|(r, s)| r.iter().zip(s).map(|(x, y)| (x - y).norm()))
        .fold(0.0, f64::max);
    if error > KAK_TOLERANCE {
        return Err(CompileError::DecompositionTolerance {
            gate: "two-qubit unitary".into(),
            error,
            tolerance: KAK_TOLERANCE,
        });
    }
    Ok(phase)
}

/// One step of a [`CxSequence`]. Operands are `0` and `1`, in the order of
/// the source matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum CxStep {
    /// Single-qubit unitary on one operand.
    Local { qubit: usize, unitary: Unitary2x2 },
    /// CX from `control` onto the other operand.
    Cx { control: usize },
}

/// A two-qubit unitary as CX gates between single-qubit blocks.
///
/// The source equals `e^{i·global_phase}` times the product of `steps`,
/// the first step applied first.
#[derive(Debug, Clone, PartialEq)]
pub struct CxSequence {
    pub steps: Vec<CxStep>,
    pub global_phase: f64,
}

impl CxSequence {
    /// Number of CX steps.
    pub fn cx_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, CxStep::Cx { .. }))
            .count()
    }

    /// Product of the steps, without the global phase.
    pub fn matrix(&self) -> Unitary4x4 {
        self.steps
            .iter()
            .fold(Unitary4x4::identity(), |acc, step| step.matrix() * acc)
    }
}

impl CxStep {
    fn matrix(&self) -> Unitary4x4 {
        match self {
            CxStep::Local { qubit: 0, unitary } => {
                Unitary4x4::kron(unitary, &Unitary2x2::identity())
            }
            CxStep::Local { unitary, .. } => Unitary4x4::kron(&Unitary2x2::identity(), unitary),
            CxStep::Cx { control: 0 } => Unitary4x4::controlled(&Unitary2x2::x()),
            CxStep::Cx { .. } => Unitary4x4::controlled(&Unitary2x2::x()).swap_operands(),
        }
    }
}

fn local(qubit: usize, unitary: Unitary2x2) -> CxStep {
    CxStep::Local { qubit, unitary }
}

fn cx(control: usize) -> CxStep {
    CxStep::Cx { control }
}

/// `exp(-i/2·(x·XX + y·YY + z·ZZ))` with three CX.
fn three_cx(x: f64, y: f64, z: f64) -> Vec<CxStep> {
    vec![
        local(1, Unitary2x2::rz(FRAC_PI_2)),
        cx(1),
        local(0, Unitary2x2::rz(z + FRAC_PI_2)),
        local(1, Unitary2x2::ry(x + FRAC_PI_2)),
        cx(0),
        local(1, Unitary2x2::ry(-y - FRAC_PI_2)),
        cx(1),
        local(0, Unitary2x2::rz(-FRAC_PI_2)),
    ]
}

/// `RXX(x)·RZZ(z)`: CX maps `X⊗I` onto `X⊗X` and `I⊗Z` onto `Z⊗Z`.
fn two_cx(x: f64, z: f64) -> Vec<CxStep> {
    vec![
        cx(0),
        local(0, Unitary2x2::rx(x)),
        local(1, Unitary2x2::rz(z)),
        cx(0),
    ]
}

/// `RXX(-π/2)`, up to phase.
fn one_cx() -> Vec<CxStep> {
    vec![
        local(0, Unitary2x2::h()),
        cx(0),
        local(0, Unitary2x2::rz(-FRAC_PI_2)),
        local(1, Unitary2x2::rx(-FRAC_PI_2)),
        local(0, Unitary2x2::h()),
    ]
}

/// Conjugate `core` by `basis` on both operands.
fn rotated(basis: Unitary2x2, core: Vec<CxStep>) -> Vec<CxStep> {
    let mut steps = vec![local(0, basis), local(1, basis)];
    steps.extend(core);
    steps.push(local(0, basis.dagger()));
    steps.push(local(1, basis.dagger()));
    steps
}

/// Basis change taking the XX axis onto the YY (`1`) or ZZ (`2`) axis.
fn axis_basis(axis: usize) -> Unitary2x2 {
    match axis {
        1 => Unitary2x2::rz(FRAC_PI_2),
        2 => Unitary2x2::h(),
        _ => Unitary2x2::identity(),
    }
}

/// Synthesize `u` with the fewest CX its interaction angles allow.
///
/// Angles are first reduced into `[-π/2, π/2]`; every half turn removed is
/// a Pauli pair that joins the surrounding single-qubit blocks. Adjacent
/// single-qubit steps are fused, so each operand gets at most one block
/// between two CX.
pub fn cx_sequence(u: &Unitary4x4) -> CompileResult<CxSequence> {
    let kak = decompose(u)?;
    let paulis = [Unitary2x2::x(), Unitary2x2::y(), Unitary2x2::z()];

    let mut angles = [kak.xx, kak.yy, kak.zz];
    let mut tail = Vec::new();
    for (angle, pauli) in angles.iter_mut().zip(paulis) {
        let turns = (*angle / PI).round();
        *angle -= turns * PI;
        if turns.rem_euclid(2.0) > 0.5 {
            tail.push(local(0, pauli));
            tail.push(local(1, pauli));
        }
    }

    let active: Vec<usize> = (0..3).filter(|&a| angles[a].abs() > SNAP_TOLERANCE).collect();
    let [x, y, z] = angles;
    let core = match active.as_slice() {
        [] => Vec::new(),
        [axis] if (angles[*axis].abs() - FRAC_PI_2).abs() < SNAP_TOLERANCE => {
            let axis = *axis;
            if angles[axis] > 0.0 {
                tail.push(local(0, paulis[axis]));
                tail.push(local(1, paulis[axis]));
            }
            rotated(axis_basis(axis), one_cx())
        }
        [0] | [2] | [0, 2] => two_cx(x, z),
        [1] | [1, 2] => rotated(Unitary2x2::rz(FRAC_PI_2), two_cx(y, z)),
        [0, 1] => rotated(Unitary2x2::rx(FRAC_PI_2), two_cx(x, y)),
        _ => three_cx(x, y, z),
    };

    let mut steps = Vec::new();
    let mut pending = [kak.before.0, kak.before.1];
    for step in core.into_iter().chain(tail) {
        match step {
            CxStep::Local { qubit, unitary } => pending[qubit] = unitary * pending[qubit],
            CxStep::Cx { control } => {
                flush(&mut steps, &mut pending);
                steps.push(cx(control));
            }
        }
    }
    pending[0] = kak.after.0 * pending[0];
    pending[1] = kak.after.1 * pending[1];
    flush(&mut steps, &mut pending);

    let mut sequence = CxSequence {
        steps,
        global_phase: 0.0,
    };
    sequence.global_phase = matching_phase(&sequence.matrix(), u)?;
    Ok(sequence)
}

fn flush(steps: &mut Vec<CxStep>, pending: &mut [Unitary2x2; 2]) {
    for (qubit, unitary) in pending.iter_mut().enumerate() {
        if !unitary.is_identity() {
            steps.push(local(qubit, *unitary));
        }
        *unitary = Unitary2x2::identity();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtrans_ir::StandardGate;

    fn check(u: &Unitary4x4) -> TwoQubitKak {
        let kak = decompose(u).unwrap();
        let rebuilt = kak
            .matrix()
            .scale(Complex64::from_polar(1.0, kak.global_phase));
        for i in 0..4 {
            for j in 0..4 {
                assert!((rebuilt.data[i][j] - u.data[i][j]).norm() < 1e-8);
            }
        }
        kak
    }

    #[test]
    fn test_standard_two_qubit_gates() {
        for gate in [
            StandardGate::CX,
            StandardGate::CZ,
            StandardGate::CY,
            StandardGate::CH,
            StandardGate::Swap,
            StandardGate::ISwap,
            StandardGate::CRx(0.8.into()),
            StandardGate::CP(2.1.into()),
            StandardGate::RXX(0.3.into()),
        ] {
            check(&Unitary4x4::from_gate(&gate).unwrap());
        }
    }

    #[test]
    fn test_local_gate_has_no_interaction() {
        let local = Unitary4x4::kron(&Unitary2x2::h(), &Unitary2x2::rz(0.4));
        let kak = check(&local);
        // exp(i(a XX + b YY + c ZZ)) is only determined up to local Paulis,
        // which shift each angle by multiples of π.
        for angle in [kak.xx, kak.yy, kak.zz] {
            let r = angle.rem_euclid(std::f64::consts::PI);
            assert!(r < 1e-7 || (std::f64::consts::PI - r) < 1e-7, "{angle}");
        }
    }

    #[test]
    fn test_identity() {
        check(&Unitary4x4::identity());
    }

    fn cx_count_of(u: &Unitary4x4) -> usize {
        let sequence = cx_sequence(u).unwrap();
        let rebuilt = sequence
            .matrix()
            .scale(Complex64::from_polar(1.0, sequence.global_phase));
        for i in 0..4 {
            for j in 0..4 {
                assert!((rebuilt.data[i][j] - u.data[i][j]).norm() < 1e-8);
            }
        }
        sequence.cx_count()
    }

    #[test]
    fn test_cx_count_matches_interaction_class() {
        let gate = |g: StandardGate| Unitary4x4::from_gate(&g).unwrap();
        let dressed = |core: Unitary4x4| {
            Unitary4x4::kron(&Unitary2x2::u(0.3, -0.7, 1.9), &Unitary2x2::rx(0.4))
                * core
                * Unitary4x4::kron(&Unitary2x2::ry(-1.2), &Unitary2x2::u(2.2, 0.1, -0.5))
        };

        assert_eq!(cx_count_of(&Unitary4x4::identity()), 0);
        assert_eq!(cx_count_of(&Unitary4x4::kron(&Unitary2x2::h(), &Unitary2x2::sx())), 0);
        assert_eq!(cx_count_of(&gate(StandardGate::CX)), 1);
        assert_eq!(cx_count_of(&gate(StandardGate::CZ)), 1);
        assert_eq!(cx_count_of(&dressed(gate(StandardGate::CY))), 1);
        assert_eq!(cx_count_of(&gate(StandardGate::RZZ(0.4.into()))), 2);
        assert_eq!(cx_count_of(&gate(StandardGate::CRy(1.1.into()))), 2);
        assert_eq!(cx_count_of(&dressed(gate(StandardGate::ISwap))), 2);
        assert_eq!(cx_count_of(&gate(StandardGate::Swap)), 3);
        assert_eq!(
            cx_count_of(&dressed(
                Unitary4x4::rxx(0.7) * Unitary4x4::ryy(-0.35) * Unitary4x4::rzz(1.3)
            )),
            3
        );
    }

    #[test]
    fn test_single_qubit_blocks_are_fused() {
        let u = Unitary4x4::kron(&Unitary2x2::h(), &Unitary2x2::rz(0.2))
            * Unitary4x4::rxx(0.9)
            * Unitary4x4::ryy(0.3)
            * Unitary4x4::rzz(-0.6);
        let sequence = cx_sequence(&u).unwrap();
        for pair in sequence.steps.windows(2) {
            if let [CxStep::Local { qubit: a, .. }, CxStep::Local { qubit: b, .. }] = pair {
                assert_ne!(a, b, "two blocks on one operand without a CX between");
            }
        }
    }

    #[test]
    fn test_generic_product() {
        let u = Unitary4x4::kron(&Unitary2x2::u(0.4, 1.1, -0.3), &Unitary2x2::ry(2.2))
            * Unitary4x4::rxx(0.7)
            * Unitary4x4::ryy(-0.35)
            * Unitary4x4::rzz(1.3)
            * Unitary4x4::from_gate(&StandardGate::CH).unwrap()
            * Unitary4x4::kron(&Unitary2x2::sx(), &Unitary2x2::u(2.0, -1.0, 0.5));
        check(&u);
    }
}
