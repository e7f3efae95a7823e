//! Unroll passes: wide gates to two-qubit gates, then everything to the
//! backend basis.

pub mod to_2q;
pub mod to_basis;

pub use to_2q::UnrollTo2Qubit;
pub use to_basis::{UnrollToBasis, resolve_euler_basis};
