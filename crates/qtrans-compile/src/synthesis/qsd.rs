//! Quantum Shannon decomposition of unitaries on three or more qubits.
//!
//! A `2^n × 2^n` unitary is split by the cosine-sine decomposition into
//! two block-diagonal factors around a multiplexed `Ry` on the first
//! operand. Each block-diagonal factor is demultiplexed into two
//! `(n-1)`-qubit unitaries around a multiplexed `Rz`. The recursion stops
//! at two-qubit blocks, which are left for the KAK lowering.
//!
//! Multiplexed rotations are emitted as gray-code ladders of rotations and
//! CX gates. The result is verified against the input before it is
//! returned.

use ndarray::{Array2, s};
use num_complex::Complex64;

use super::kak::MIXING;
use super::unitary::Unitary2x2;
use crate::error::{CompileError, CompileResult};

/// Acceptable error of the rebuilt matrix, element-wise.
pub const QSD_TOLERANCE: f64 = 1e-8;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);

/// Blocks below this magnitude count as zero.
const BLOCK_TOLERANCE: f64 = 1e-12;
/// Singular values below this are rebuilt from an orthogonal complement.
const RANK_TOLERANCE: f64 = 1e-13;
/// Sines below this take their left vector from the complement too.
const SINE_TOLERANCE: f64 = 1e-7;
const DIAGONAL_TOLERANCE: f64 = 1e-9;
const MAX_SWEEPS: usize = 100;

/// One element of a Shannon decomposition, in time order.
///
/// Qubits are positions in the operand list of the decomposed gate, first
/// operand being the most significant bit of the matrix index.
#[derive(Debug, Clone, PartialEq)]
pub enum QsdStep {
    Ry { qubit: usize, theta: f64 },
    Rz { qubit: usize, theta: f64 },
    Cx { control: usize, target: usize },
    /// Dense block on one or two operands, row-major.
    Unitary {
        qubits: Vec<usize>,
        matrix: Vec<Complex64>,
    },
}

impl QsdStep {
    fn local_matrix(&self) -> (Vec<usize>, Array2<Complex64>) {
        match self {
            QsdStep::Ry { qubit, theta } => (vec![*qubit], from_2x2(&Unitary2x2::ry(*theta))),
            QsdStep::Rz { qubit, theta } => (vec![*qubit], from_2x2(&Unitary2x2::rz(*theta))),
            QsdStep::Cx { control, target } => {
                let mut m = Array2::zeros((4, 4));
                m[[0, 0]] = ONE;
                m[[1, 1]] = ONE;
                m[[2, 3]] = ONE;
                m[[3, 2]] = ONE;
                (vec![*control, *target], m)
            }
            QsdStep::Unitary { qubits, matrix } => {
                let dim = 1usize << qubits.len();
                let mut m = Array2::zeros((dim, dim));
                for (i, value) in matrix.iter().enumerate() {
                    m[[i / dim, i % dim]] = *value;
                }
                (qubits.clone(), m)
            }
        }
    }
}

/// Decompose a row-major `2^num_qubits` square unitary.
///
/// `name` only labels errors. Fails when the matrix has the wrong size or
/// is not unitary enough for the rebuilt sequence to match it.
pub fn decompose(name: &str, matrix: &[Complex64], num_qubits: usize) -> CompileResult<Vec<QsdStep>> {
    let dim = 1usize
        .checked_shl(u32::try_from(num_qubits).unwrap_or(u32::MAX))
        .ok_or_else(|| CompileError::UnsupportedGate {
            gate: name.to_string(),
            reason: format!("{num_qubits} qubits is too wide for dense synthesis"),
        })?;
    let u = Array2::from_shape_vec((dim, dim), matrix.to_vec()).map_err(|_| {
        CompileError::MalformedCircuit(format!("matrix of '{name}' is not {dim}x{dim}"))
    })?;

    let mut shannon = Shannon {
        name,
        steps: Vec::new(),
    };
    let qubits: Vec<usize> = (0..num_qubits).collect();
    shannon.block(u.clone(), &qubits)?;

    let rebuilt = sequence_matrix(&shannon.steps, num_qubits);
    let error = max_abs(&(rebuilt - &u));
    if error > QSD_TOLERANCE {
        return Err(CompileError::DecompositionTolerance {
            gate: name.to_string(),
            error,
            tolerance: QSD_TOLERANCE,
        });
    }
    Ok(shannon.steps)
}

/// Dense matrix of a step sequence on `num_qubits` operands.
pub fn sequence_matrix(steps: &[QsdStep], num_qubits: usize) -> Array2<Complex64> {
    let mut m = Array2::eye(1usize << num_qubits);
    for step in steps {
        let (qubits, local) = step.local_matrix();
        apply_local(&mut m, &qubits, &local, num_qubits);
    }
    m
}

struct Shannon<'a> {
    name: &'a str,
    steps: Vec<QsdStep>,
}

impl Shannon<'_> {
    fn block(&mut self, u: Array2<Complex64>, qubits: &[usize]) -> CompileResult<()> {
        if qubits.len() <= 2 {
            if max_abs(&(&u - &Array2::<Complex64>::eye(u.nrows()))) < BLOCK_TOLERANCE {
                return Ok(());
            }
            self.steps.push(QsdStep::Unitary {
                qubits: qubits.to_vec(),
                matrix: u.iter().copied().collect(),
            });
            return Ok(());
        }

        let half = u.nrows() / 2;
        let u00 = u.slice(s![..half, ..half]).to_owned();
        let u01 = u.slice(s![..half, half..]).to_owned();
        let u10 = u.slice(s![half.., ..half]).to_owned();
        let u11 = u.slice(s![half.., half..]).to_owned();

        if max_abs(&u01) < BLOCK_TOLERANCE && max_abs(&u10) < BLOCK_TOLERANCE {
            if max_abs(&(&u00 - &u11)) < BLOCK_TOLERANCE {
                return self.block(u00, &qubits[1..]);
            }
            return self.demultiplex(&u00, &u11, qubits);
        }

        let cs = cosine_sine(&u00, &u01, &u10, &u11);
        self.demultiplex(&cs.r0, &cs.r1, qubits)?;
        let angles: Vec<f64> = cs
            .cosines
            .iter()
            .zip(&cs.sines)
            .map(|(c, s)| 2.0 * s.atan2(*c))
            .collect();
        self.multiplexed(Axis::Y, &angles, qubits[0], &qubits[1..]);
        self.demultiplex(&cs.l0, &cs.l1, qubits)
    }

    /// `diag(a, b)` as `(I ⊗ v) · mux-Rz · (I ⊗ w)`.
    fn demultiplex(
        &mut self,
        a: &Array2<Complex64>,
        b: &Array2<Complex64>,
        qubits: &[usize],
    ) -> CompileResult<()> {
        let x = a.dot(&adjoint(b));
        let n = x.nrows();
        let mut residual = f64::INFINITY;
        for kappa in MIXING {
            let mut h = Array2::zeros((n, n));
            for i in 0..n {
                for j in 0..n {
                    let sym = (x[[i, j]] + x[[j, i]].conj()) * 0.5;
                    let anti = (x[[i, j]] - x[[j, i]].conj()) / Complex64::new(0.0, 2.0);
                    h[[i, j]] = sym + anti * kappa;
                }
            }
            let v = hermitian_eigenvectors(h);
            let diag = adjoint(&v).dot(&x).dot(&v);
            let off = (0..n)
                .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
                .map(|(i, j)| diag[[i, j]].norm())
                .fold(0.0, f64::max);
            if off > DIAGONAL_TOLERANCE {
                residual = residual.min(off);
                continue;
            }

            let roots: Vec<Complex64> = (0..n).map(|i| diag[[i, i]].sqrt()).collect();
            let mut d = Array2::zeros((n, n));
            for (i, r) in roots.iter().enumerate() {
                d[[i, i]] = *r;
            }
            let w = d.dot(&adjoint(&v)).dot(b);

            self.block(w, &qubits[1..])?;
            let angles: Vec<f64> = roots.iter().map(|r| -2.0 * r.arg()).collect();
            self.multiplexed(Axis::Z, &angles, qubits[0], &qubits[1..]);
            return self.block(v, &qubits[1..]);
        }
        Err(CompileError::DecompositionTolerance {
            gate: self.name.to_string(),
            error: residual,
            tolerance: DIAGONAL_TOLERANCE,
        })
    }

    /// Rotation by `angles[j]` on `target` when `controls` read `j`.
    fn multiplexed(&mut self, axis: Axis, angles: &[f64], target: usize, controls: &[usize]) {
        let k = controls.len();
        let count = angles.len();
        let scale = count as f64;
        let gray = |i: usize| i ^ (i >> 1);

        for i in 0..count {
            let theta: f64 = angles
                .iter()
                .enumerate()
                .map(|(j, a)| {
                    if (j & gray(i)).count_ones() % 2 == 0 {
                        *a
                    } else {
                        -*a
                    }
                })
                .sum::<f64>()
                / scale;
            if theta.abs() > BLOCK_TOLERANCE {
                self.steps.push(match axis {
                    Axis::Y => QsdStep::Ry {
                        qubit: target,
                        theta,
                    },
                    Axis::Z => QsdStep::Rz {
                        qubit: target,
                        theta,
                    },
                });
            }
            if k == 0 {
                continue;
            }
            let changed = gray(i) ^ gray((i + 1) % count);
            let position = k - 1 - changed.trailing_zeros() as usize;
            self.steps.push(QsdStep::Cx {
                control: controls[position],
                target,
            });
        }
    }
}

#[derive(Clone, Copy)]
enum Axis {
    Y,
    Z,
}

/// `U = diag(l0, l1) · [[C, -S], [S, C]] · diag(r0, r1)`.
struct CosineSine {
    l0: Array2<Complex64>,
    l1: Array2<Complex64>,
    r0: Array2<Complex64>,
    r1: Array2<Complex64>,
    cosines: Vec<f64>,
    sines: Vec<f64>,
}

fn cosine_sine(
    u00: &Array2<Complex64>,
    u01: &Array2<Complex64>,
    u10: &Array2<Complex64>,
    u11: &Array2<Complex64>,
) -> CosineSine {
    let n = u00.nrows();
    let (l0, cosines, r0) = svd(u00);

    let projected = u10.dot(&adjoint(&r0));
    let sines: Vec<f64> = (0..n).map(|j| column_norm(&projected, j)).collect();

    // Largest sines first, so the least accurate columns are orthogonalized last.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| sines[b].total_cmp(&sines[a]));
    let mut l1 = Array2::zeros((n, n));
    let mut filled = vec![false; n];
    for &j in &order {
        if sines[j] <= SINE_TOLERANCE {
            break;
        }
        let column: Vec<Complex64> = projected.column(j).to_vec();
        if let Some(unit) = orthonormalize(column, &l1, &filled, f64::MIN_POSITIVE) {
            l1.column_mut(j).assign(&ndarray::Array1::from(unit));
            filled[j] = true;
        }
    }
    complete(&mut l1, &mut filled);

    let x = adjoint(&l0).dot(u01);
    let y = adjoint(&l1).dot(u11);
    let mut r1 = Array2::zeros((n, n));
    for j in 0..n {
        if cosines[j] >= sines[j] {
            let scale = Complex64::new(1.0 / cosines[j], 0.0);
            r1.row_mut(j).assign(&y.row(j).mapv(|z| z * scale));
        } else {
            let scale = Complex64::new(-1.0 / sines[j], 0.0);
            r1.row_mut(j).assign(&x.row(j).mapv(|z| z * scale));
        }
    }

    CosineSine {
        l0,
        l1,
        r0,
        r1,
        cosines,
        sines,
    }
}

/// One-sided Jacobi SVD: `a = u · diag(sigma) · vh`.
fn svd(a: &Array2<Complex64>) -> (Array2<Complex64>, Vec<f64>, Array2<Complex64>) {
    let n = a.ncols();
    let mut g = a.clone();
    let mut v: Array2<Complex64> = Array2::eye(n);

    for _sweep in 0..MAX_SWEEPS {
        let mut rotated = false;
        for i in 0..n.saturating_sub(1) {
            for j in i + 1..n {
                let alpha = column_norm(&g, i).powi(2);
                let beta = column_norm(&g, j).powi(2);
                let gamma: Complex64 = (0..g.nrows()).map(|r| g[[r, i]].conj() * g[[r, j]]).sum();
                let overlap = gamma.norm();
                if overlap <= 1e-15 * (alpha * beta).sqrt() || overlap < f64::MIN_POSITIVE {
                    continue;
                }
                rotated = true;

                let phase = gamma / overlap;
                let zeta = (beta - alpha) / (2.0 * overlap);
                let sign = if zeta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;
                rotate_columns(&mut g, i, j, c, s, phase);
                rotate_columns(&mut v, i, j, c, s, phase);
            }
        }
        if !rotated {
            break;
        }
    }

    let sigma: Vec<f64> = (0..n).map(|j| column_norm(&g, j)).collect();
    let mut u = Array2::zeros((n, n));
    let mut filled = vec![false; n];
    for j in 0..n {
        if sigma[j] > RANK_TOLERANCE {
            let scale = Complex64::new(1.0 / sigma[j], 0.0);
            u.column_mut(j).assign(&g.column(j).mapv(|z| z * scale));
            filled[j] = true;
        }
    }
    complete(&mut u, &mut filled);
    (u, sigma, adjoint(&v))
}

fn rotate_columns(m: &mut Array2<Complex64>, i: usize, j: usize, c: f64, s: f64, phase: Complex64) {
    for r in 0..m.nrows() {
        let xi = m[[r, i]];
        let xj = m[[r, j]] * phase.conj();
        m[[r, i]] = xi * c - xj * s;
        m[[r, j]] = xi * s + xj * c;
    }
}

/// Eigenvectors of a Hermitian matrix by complex Jacobi rotations.
fn hermitian_eigenvectors(mut a: Array2<Complex64>) -> Array2<Complex64> {
    let n = a.nrows();
    let mut vectors = Array2::eye(n);
    for _sweep in 0..MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|p| (0..n).filter(move |&q| q != p).map(move |q| (p, q)))
            .map(|(p, q)| a[[p, q]].norm_sqr())
            .sum();
        if off < 1e-30 {
            break;
        }
        for p in 0..n.saturating_sub(1) {
            for q in p + 1..n {
                let tau = a[[p, q]].norm();
                if tau < 1e-300 {
                    continue;
                }
                // Phase q so the (p, q) entry is real, then rotate as in the
                // real symmetric case.
                let phase = (a[[p, q]] / tau).conj();
                let theta = (a[[q, q]].re - a[[p, p]].re) / (2.0 * tau);
                let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                let q2 = [
                    [Complex64::new(c, 0.0), Complex64::new(s, 0.0)],
                    [phase * -s, phase * c],
                ];

                apply_right(&mut a, p, q, &q2);
                apply_left_adjoint(&mut a, p, q, &q2);
                apply_right(&mut vectors, p, q, &q2);
            }
        }
    }
    vectors
}

/// `m ← m · Q` for `Q` acting on coordinates `p` and `q`.
fn apply_right(m: &mut Array2<Complex64>, p: usize, q: usize, rot: &[[Complex64; 2]; 2]) {
    for r in 0..m.nrows() {
        let (mp, mq) = (m[[r, p]], m[[r, q]]);
        m[[r, p]] = mp * rot[0][0] + mq * rot[1][0];
        m[[r, q]] = mp * rot[0][1] + mq * rot[1][1];
    }
}

/// `m ← Q† · m` for `Q` acting on coordinates `p` and `q`.
fn apply_left_adjoint(m: &mut Array2<Complex64>, p: usize, q: usize, rot: &[[Complex64; 2]; 2]) {
    for c in 0..m.ncols() {
        let (mp, mq) = (m[[p, c]], m[[q, c]]);
        m[[p, c]] = rot[0][0].conj() * mp + rot[1][0].conj() * mq;
        m[[q, c]] = rot[0][1].conj() * mp + rot[1][1].conj() * mq;
    }
}

/// Gram-Schmidt `v` against the filled columns of `basis`; `None` when
/// less than `min_norm` of it survives.
fn orthonormalize(
    mut v: Vec<Complex64>,
    basis: &Array2<Complex64>,
    filled: &[bool],
    min_norm: f64,
) -> Option<Vec<Complex64>> {
    for _pass in 0..2 {
        for (k, _) in filled.iter().enumerate().filter(|(_, f)| **f) {
            let column = basis.column(k);
            let overlap: Complex64 = column.iter().zip(&v).map(|(b, x)| b.conj() * x).sum();
            for (x, b) in v.iter_mut().zip(column.iter()) {
                *x -= overlap * b;
            }
        }
    }
    let norm = v.iter().map(Complex64::norm_sqr).sum::<f64>().sqrt();
    (norm > min_norm).then(|| v.into_iter().map(|x| x / norm).collect())
}

/// Fill unset columns of `u` with an orthonormal complement.
fn complete(u: &mut Array2<Complex64>, filled: &mut [bool]) {
    let n = u.nrows();
    let mut candidates = 0..n;
    for j in 0..n {
        if filled[j] {
            continue;
        }
        for k in candidates.by_ref() {
            let mut e = vec![ZERO; n];
            e[k] = ONE;
            if let Some(unit) = orthonormalize(e, u, filled, 0.5) {
                u.column_mut(j).assign(&ndarray::Array1::from(unit));
                filled[j] = true;
                break;
            }
        }
    }
}

/// Left-multiply `m` by `local` acting on `qubits` of an `n`-qubit register.
fn apply_local(m: &mut Array2<Complex64>, qubits: &[usize], local: &Array2<Complex64>, n: usize) {
    let k = qubits.len();
    let masks: Vec<usize> = qubits.iter().map(|&q| 1usize << (n - 1 - q)).collect();
    let all = masks.iter().fold(0, |acc, mask| acc | mask);
    let sub = 1usize << k;

    let mut rows = vec![0usize; sub];
    let mut values = vec![ZERO; sub];
    for base in (0..m.nrows()).filter(|r| r & all == 0) {
        for (s, row) in rows.iter_mut().enumerate() {
            *row = masks
                .iter()
                .enumerate()
                .filter(|(t, _)| (s >> (k - 1 - t)) & 1 == 1)
                .fold(base, |acc, (_, mask)| acc | mask);
        }
        for col in 0..m.ncols() {
            for (value, &row) in values.iter_mut().zip(&rows) {
                *value = m[[row, col]];
            }
            for (r, &row) in rows.iter().enumerate() {
                m[[row, col]] = (0..sub).map(|s| local[[r, s]] * values[s]).sum::<Complex64>();
            }
        }
    }
}

fn from_2x2(u: &Unitary2x2) -> Array2<Complex64> {
    Array2::from_shape_fn((2, 2), |(i, j)| u.at(i, j))
}

fn adjoint(a: &Array2<Complex64>) -> Array2<Complex64> {
    a.t().mapv(|z| z.conj())
}

fn column_norm(a: &Array2<Complex64>, j: usize) -> f64 {
    a.column(j).iter().map(Complex64::norm_sqr).sum::<f64>().sqrt()
}

fn max_abs(a: &Array2<Complex64>) -> f64 {
    a.iter().map(|z| z.norm()).fold(0.0, f64::max)
}
