//! Small dense unitaries for gate synthesis and optimization.
//!
//! Two-qubit matrices are row-major over the big-endian basis of the
//! operands: for operands `[a, b]` the basis index is `2·a + b`, so the
//! first operand is the most significant bit and a controlled gate's
//! control sits on the upper half of the matrix.

use num_complex::Complex64;
use qtrans_ir::StandardGate;
use std::f64::consts::PI;

use super::EPSILON;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

/// A 2x2 unitary matrix in row-major order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unitary2x2 {
    /// The matrix elements in row-major order: [[a, b], [c, d]].
    pub data: [Complex64; 4],
}

impl Unitary2x2 {
    /// Create a new 2x2 unitary matrix.
    pub fn new(a: Complex64, b: Complex64, c: Complex64, d: Complex64) -> Self {
        Self { data: [a, b, c, d] }
    }

    /// Create the identity matrix.
    pub fn identity() -> Self {
        Self::new(ONE, ZERO, ZERO, ONE)
    }

    /// Create a Hadamard matrix.
    pub fn h() -> Self {
        let s = Complex64::new(std::f64::consts::FRAC_1_SQRT_2, 0.0);
        Self::new(s, s, s, -s)
    }

    /// Create a Pauli-X matrix.
    pub fn x() -> Self {
        Self::new(ZERO, ONE, ONE, ZERO)
    }

    /// Create a Pauli-Y matrix.
    pub fn y() -> Self {
        Self::new(ZERO, -I, I, ZERO)
    }

    /// Create a Pauli-Z matrix.
    pub fn z() -> Self {
        Self::new(ONE, ZERO, ZERO, -ONE)
    }

    /// Create an SX gate (sqrt(X)).
    pub fn sx() -> Self {
        let p = Complex64::new(0.5, 0.5);
        let m = Complex64::new(0.5, -0.5);
        Self::new(p, m, m, p)
    }

    /// Create an RX rotation matrix.
    pub fn rx(theta: f64) -> Self {
        let c = Complex64::new((theta / 2.0).cos(), 0.0);
        let s = Complex64::new(0.0, -(theta / 2.0).sin());
        Self::new(c, s, s, c)
    }

    /// Create an RY rotation matrix.
    pub fn ry(theta: f64) -> Self {
        let c = Complex64::new((theta / 2.0).cos(), 0.0);
        let s = Complex64::new((theta / 2.0).sin(), 0.0);
        Self::new(c, -s, s, c)
    }

    /// Create an RZ rotation matrix.
    pub fn rz(theta: f64) -> Self {
        Self::new(
            Complex64::from_polar(1.0, -theta / 2.0),
            ZERO,
            ZERO,
            Complex64::from_polar(1.0, theta / 2.0),
        )
    }

    /// Create a phase gate P(lambda).
    pub fn p(lambda: f64) -> Self {
        Self::new(ONE, ZERO, ZERO, Complex64::from_polar(1.0, lambda))
    }

    /// Create a U gate U(theta, phi, lambda).
    pub fn u(theta: f64, phi: f64, lambda: f64) -> Self {
        let c = (theta / 2.0).cos();
        let s = (theta / 2.0).sin();
        Self::new(
            Complex64::new(c, 0.0),
            -Complex64::from_polar(s, lambda),
            Complex64::from_polar(s, phi),
            Complex64::from_polar(c, phi + lambda),
        )
    }

    /// Matrix of a single-qubit standard gate.
    ///
    /// `None` for multi-qubit gates and for gates with unbound angles.
    pub fn from_gate(gate: &StandardGate) -> Option<Self> {
        Some(match gate {
            StandardGate::I => Self::identity(),
            StandardGate::X => Self::x(),
            StandardGate::Y => Self::y(),
            StandardGate::Z => Self::z(),
            StandardGate::H => Self::h(),
            StandardGate::S => Self::p(PI / 2.0),
            StandardGate::Sdg => Self::p(-PI / 2.0),
            StandardGate::T => Self::p(PI / 4.0),
            StandardGate::Tdg => Self::p(-PI / 4.0),
            StandardGate::SX => Self::sx(),
            StandardGate::SXdg => Self::sx().dagger(),
            StandardGate::Rx(p) => Self::rx(p.as_f64()?),
            StandardGate::Ry(p) => Self::ry(p.as_f64()?),
            StandardGate::Rz(p) => Self::rz(p.as_f64()?),
            StandardGate::P(p) => Self::p(p.as_f64()?),
            StandardGate::U(theta, phi, lambda) | StandardGate::Mcu(0, theta, phi, lambda) => {
                Self::u(theta.as_f64()?, phi.as_f64()?, lambda.as_f64()?)
            }
            StandardGate::Mcx(0) => Self::x(),
            StandardGate::Mcry(0, p) => Self::ry(p.as_f64()?),
            _ => return None,
        })
    }

    /// Build from a row-major slice of four elements.
    pub fn from_slice(data: &[Complex64]) -> Option<Self> {
        match data {
            [a, b, c, d] => Some(Self::new(*a, *b, *c, *d)),
            _ => None,
        }
    }

    /// Element at `(row, col)`.
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> Complex64 {
        self.data[2 * row + col]
    }

    /// Multiply this matrix by another: self * other.
    #[allow(clippy::many_single_char_names)]
    pub fn mul(&self, other: &Self) -> Self {
        let [a, b, c, d] = self.data;
        let [e, f, g, h] = other.data;
        Self::new(a * e + b * g, a * f + b * h, c * e + d * g, c * f + d * h)
    }

    /// Multiply every element by a scalar.
    pub fn scale(&self, factor: Complex64) -> Self {
        Self {
            data: self.data.map(|v| v * factor),
        }
    }

    /// Get the conjugate transpose (dagger).
    pub fn dagger(&self) -> Self {
        Self::new(
            self.data[0].conj(),
            self.data[2].conj(),
            self.data[1].conj(),
            self.data[3].conj(),
        )
    }

    /// Determinant.
    pub fn det(&self) -> Complex64 {
        self.data[0] * self.data[3] - self.data[1] * self.data[2]
    }

    /// Largest element-wise deviation from `other` after removing the best
    /// common phase between the two.
    pub fn distance_up_to_phase(&self, other: &Self) -> f64 {
        let overlap: Complex64 = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a.conj() * b)
            .sum();
        let phase = if overlap.norm() < EPSILON {
            ONE
        } else {
            overlap / overlap.norm()
        };
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a * phase - b).norm())
            .fold(0.0, f64::max)
    }

    /// Check if this is approximately identity (up to global phase).
    pub fn is_identity(&self) -> bool {
        self.distance_up_to_phase(&Self::identity()) < EPSILON
    }

    /// Principal `k`-th root: `V` with `V^k = self`.
    ///
    /// Each eigenvalue's argument is divided by `k`; the result is unitary
    /// and commutes with `self`.
    pub fn root(&self, k: u32) -> Self {
        let k = f64::from(k.max(1));
        let trace = self.data[0] + self.data[3];
        let disc = (trace * trace - self.det() * 4.0).sqrt();
        let (l1, l2) = ((trace + disc) / 2.0, (trace - disc) / 2.0);
        let r1 = Complex64::from_polar(1.0, l1.arg() / k);
        if (l1 - l2).norm() < EPSILON {
            return Self::identity().scale(r1);
        }
        let r2 = Complex64::from_polar(1.0, l2.arg() / k);
        // Spectral projectors of a normal 2x2 matrix.
        let p1 = self.sub_scalar(l2).scale(ONE / (l1 - l2));
        let p2 = Self::identity().sub(&p1);
        p1.scale(r1).add(&p2.scale(r2))
    }

    fn add(&self, other: &Self) -> Self {
        let mut data = self.data;
        for (d, o) in data.iter_mut().zip(other.data) {
            *d += o;
        }
        Self { data }
    }

    fn sub(&self, other: &Self) -> Self {
        self.add(&other.scale(-ONE))
    }

    fn sub_scalar(&self, value: Complex64) -> Self {
        self.sub(&Self::identity().scale(value))
    }
}

impl Default for Unitary2x2 {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Unitary2x2 {
    type Output = Self;

    #[allow(clippy::needless_pass_by_value)]
    fn mul(self, rhs: Self) -> Self::Output {
        Unitary2x2::mul(&self, &rhs)
    }
}

/// A 4x4 unitary matrix over two qubits, big-endian operand order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unitary4x4 {
    /// Rows of the matrix.
    pub data: [[Complex64; 4]; 4],
}

impl Unitary4x4 {
    /// Create the identity matrix.
    pub fn identity() -> Self {
        let mut data = [[ZERO; 4]; 4];
        for (i, row) in data.iter_mut().enumerate() {
            row[i] = ONE;
        }
        Self { data }
    }

    /// `a ⊗ b`, with `a` acting on the first operand.
    pub fn kron(a: &Unitary2x2, b: &Unitary2x2) -> Self {
        let mut data = [[ZERO; 4]; 4];
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    for l in 0..2 {
                        data[2 * i + k][2 * j + l] = a.at(i, j) * b.at(k, l);
                    }
                }
            }
        }
        Self { data }
    }

    /// `|0⟩⟨0| ⊗ I + |1⟩⟨1| ⊗ u`: `u` applied to the second operand when
    /// the first is set.
    pub fn controlled(u: &Unitary2x2) -> Self {
        let mut m = Self::identity();
        for i in 0..2 {
            for j in 0..2 {
                m.data[2 + i][2 + j] = u.at(i, j);
            }
        }
        m
    }

    /// Diagonal matrix.
    pub fn diagonal(d: [Complex64; 4]) -> Self {
        let mut data = [[ZERO; 4]; 4];
        for (i, v) in d.into_iter().enumerate() {
            data[i][i] = v;
        }
        Self { data }
    }

    /// Build from a row-major slice of sixteen elements.
    pub fn from_slice(data: &[Complex64]) -> Option<Self> {
        if data.len() != 16 {
            return None;
        }
        let mut m = [[ZERO; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            row.copy_from_slice(&data[4 * i..4 * i + 4]);
        }
        Some(Self { data: m })
    }

    /// `exp(-i θ/2 · X⊗X)`.
    pub fn rxx(theta: f64) -> Self {
        let c = Complex64::new((theta / 2.0).cos(), 0.0);
        let s = Complex64::new(0.0, -(theta / 2.0).sin());
        Self {
            data: [
                [c, ZERO, ZERO, s],
                [ZERO, c, s, ZERO],
                [ZERO, s, c, ZERO],
                [s, ZERO, ZERO, c],
            ],
        }
    }

    /// `exp(-i θ/2 · Y⊗Y)`.
    pub fn ryy(theta: f64) -> Self {
        let c = Complex64::new((theta / 2.0).cos(), 0.0);
        let s = Complex64::new(0.0, (theta / 2.0).sin());
        Self {
            data: [
                [c, ZERO, ZERO, s],
                [ZERO, c, -s, ZERO],
                [ZERO, -s, c, ZERO],
                [s, ZERO, ZERO, c],
            ],
        }
    }

    /// `exp(-i θ/2 · Z⊗Z)`.
    pub fn rzz(theta: f64) -> Self {
        let m = Complex64::from_polar(1.0, -theta / 2.0);
        let p = Complex64::from_polar(1.0, theta / 2.0);
        Self::diagonal([m, p, p, m])
    }

    /// Matrix of a two-qubit standard gate.
    ///
    /// `None` for gates of other widths and for gates with unbound angles.
    pub fn from_gate(gate: &StandardGate) -> Option<Self> {
        Some(match gate {
            StandardGate::CX => Self::controlled(&Unitary2x2::x()),
            StandardGate::CY => Self::controlled(&Unitary2x2::y()),
            StandardGate::CZ => Self::controlled(&Unitary2x2::z()),
            StandardGate::CH => Self::controlled(&Unitary2x2::h()),
            StandardGate::CRx(p) => Self::controlled(&Unitary2x2::rx(p.as_f64()?)),
            StandardGate::CRy(p) => Self::controlled(&Unitary2x2::ry(p.as_f64()?)),
            StandardGate::CRz(p) => Self::controlled(&Unitary2x2::rz(p.as_f64()?)),
            StandardGate::CP(p) => Self::controlled(&Unitary2x2::p(p.as_f64()?)),
            StandardGate::Swap => Self {
                data: [
                    [ONE, ZERO, ZERO, ZERO],
                    [ZERO, ZERO, ONE, ZERO],
                    [ZERO, ONE, ZERO, ZERO],
                    [ZERO, ZERO, ZERO, ONE],
                ],
            },
            StandardGate::ISwap => Self {
                data: [
                    [ONE, ZERO, ZERO, ZERO],
                    [ZERO, ZERO, I, ZERO],
                    [ZERO, I, ZERO, ZERO],
                    [ZERO, ZERO, ZERO, ONE],
                ],
            },
            StandardGate::RXX(p) => Self::rxx(p.as_f64()?),
            StandardGate::RYY(p) => Self::ryy(p.as_f64()?),
            StandardGate::RZZ(p) => Self::rzz(p.as_f64()?),
            StandardGate::Mcx(1) => Self::controlled(&Unitary2x2::x()),
            StandardGate::Mcry(1, p) => Self::controlled(&Unitary2x2::ry(p.as_f64()?)),
            StandardGate::Mcu(1, theta, phi, lambda) => Self::controlled(&Unitary2x2::u(
                theta.as_f64()?,
                phi.as_f64()?,
                lambda.as_f64()?,
            )),
            _ => return None,
        })
    }

    /// The same gate with its operands exchanged.
    pub fn swap_operands(&self) -> Self {
        const ORDER: [usize; 4] = [0, 2, 1, 3];
        let mut data = [[ZERO; 4]; 4];
        for (i, row) in data.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = self.data[ORDER[i]][ORDER[j]];
            }
        }
        Self { data }
    }

    /// Matrix product `self * other`.
    pub fn mul(&self, other: &Self) -> Self {
        let mut data = [[ZERO; 4]; 4];
        for (i, row) in data.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.data[i][k] * other.data[k][j]).sum();
            }
        }
        Self { data }
    }

    /// Conjugate transpose.
    pub fn dagger(&self) -> Self {
        let mut data = [[ZERO; 4]; 4];
        for (i, row) in data.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = self.data[j][i].conj();
            }
        }
        Self { data }
    }

    /// Plain transpose.
    pub fn transpose(&self) -> Self {
        let mut data = [[ZERO; 4]; 4];
        for (i, row) in data.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = self.data[j][i];
            }
        }
        Self { data }
    }

    /// Multiply every element by a scalar.
    pub fn scale(&self, factor: Complex64) -> Self {
        Self {
            data: self.data.map(|row| row.map(|v| v * factor)),
        }
    }

    /// Trace.
    pub fn trace(&self) -> Complex64 {
        (0..4).map(|i| self.data[i][i]).sum()
    }

    /// Determinant by Gaussian elimination with partial pivoting.
    pub fn det(&self) -> Complex64 {
        let mut m = self.data;
        let mut det = ONE;
        for col in 0..4 {
            let pivot = (col..4)
                .max_by(|&a, &b| m[a][col].norm().total_cmp(&m[b][col].norm()))
                .unwrap_or(col);
            if m[pivot][col].norm() < f64::MIN_POSITIVE {
                return ZERO;
            }
            if pivot != col {
                m.swap(pivot, col);
                det = -det;
            }
            det *= m[col][col];
            for row in col + 1..4 {
                let factor = m[row][col] / m[col][col];
                for k in col..4 {
                    let v = m[col][k];
                    m[row][k] -= factor * v;
                }
            }
        }
        det
    }

    /// Largest element-wise deviation from `other` after removing the best
    /// common phase.
    pub fn distance_up_to_phase(&self, other: &Self) -> f64 {
        let overlap = self.dagger().mul(other).trace();
        let phase = if overlap.norm() < EPSILON {
            ONE
        } else {
            overlap / overlap.norm()
        };
        let mut worst = 0.0_f64;
        for i in 0..4 {
            for j in 0..4 {
                worst = worst.max((self.data[i][j] * phase - other.data[i][j]).norm());
            }
        }
        worst
    }
}

impl std::ops::Mul for Unitary4x4 {
    type Output = Self;

    #[allow(clippy::needless_pass_by_value)]
    fn mul(self, rhs: Self) -> Self::Output {
        Unitary4x4::mul(&self, &rhs)
    }
}
