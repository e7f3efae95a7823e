//! Layout and routing passes.
//!
//! Layout passes decide where each logical qubit starts. Routing passes
//! then rewrite the DAG over the backend's physical qubits, inserting
//! swaps until every two-qubit gate acts on a coupled pair.

mod layout;
mod routing;
pub(crate) mod sabre;

pub use layout::{TrivialLayout, component_layout, initial_layout};
pub use routing::{SabreLayout, SabreRouting};
