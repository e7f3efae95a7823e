//! Optimization passes.
//!
//! Both passes only ever delete or shorten, so running either one can not
//! increase the gate count or the depth of a circuit.

mod combine;
mod optimize_1q;

pub use combine::GateCombine;
pub use optimize_1q::OneQubitOptimization;
