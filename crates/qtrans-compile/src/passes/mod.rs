//! Built-in compilation passes.
//!
//! - [`unroll`]: rewrite wide and non-native operations
//! - [`mapping`]: place logical qubits and insert swaps
//! - [`optimization`]: shrink the circuit without changing its unitary
//!
//! [`ParameterBinding`] and [`CouplingVerification`] bracket the preset
//! flows.

pub mod bind;
pub mod mapping;
pub mod optimization;
pub mod unroll;
pub mod verification;

#[cfg(test)]
pub(crate) mod testing;

pub use bind::ParameterBinding;
pub use mapping::{SabreLayout, SabreRouting, TrivialLayout, component_layout, initial_layout};
pub use optimization::{GateCombine, OneQubitOptimization};
pub use unroll::{UnrollTo2Qubit, UnrollToBasis, resolve_euler_basis};
pub use verification::CouplingVerification;
