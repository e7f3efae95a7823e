//! Numeric synthesis: dense unitaries, Euler angles, the KAK
//! decomposition and the Shannon decomposition of wider unitaries.

pub mod euler;
pub mod kak;
pub mod qsd;
pub mod unitary;

pub use euler::{EulerBasis, OneQubitSequence, SYNTHESIS_TOLERANCE, sequence_matrix, synthesize};
pub use kak::{CxSequence, CxStep, TwoQubitKak, cx_sequence, decompose as kak_decompose};
pub use qsd::{QSD_TOLERANCE, QsdStep, decompose as qsd_decompose};
pub use unitary::{Unitary2x2, Unitary4x4};

/// Tolerance for floating point comparisons.
pub(crate) const EPSILON: f64 = 1e-10;
