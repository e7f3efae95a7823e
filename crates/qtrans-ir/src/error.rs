//! Error types for the IR crate.

use crate::qubit::{ClbitId, QubitId};
use thiserror::Error;

/// Errors raised while building or mutating circuits and DAGs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// Qubit operand outside the circuit's register.
    #[error("Qubit {qubit} out of range for {num_qubits}-qubit circuit{}", format_gate_context(.gate_name))]
    QubitNotFound {
        /// The offending operand.
        qubit: QubitId,
        /// Number of qubits the circuit was built with.
        num_qubits: u32,
        /// Optional gate name for context.
        gate_name: Option<String>,
    },

    /// Classical-bit operand outside the circuit's register.
    #[error("Classical bit {clbit} out of range for {num_clbits}-bit register{}", format_gate_context(.gate_name))]
    ClbitNotFound {
        /// The offending operand.
        clbit: ClbitId,
        /// Number of classical bits the circuit was built with.
        num_clbits: u32,
        /// Optional gate name for context.
        gate_name: Option<String>,
    },

    /// Broken DAG invariant.
    #[error("Invalid DAG structure: {0}")]
    InvalidDag(String),

    /// Node index does not refer to an operation node.
    #[error("Invalid node index")]
    InvalidNode,

    /// Gate applied to the wrong number of qubits.
    #[error("Gate '{gate_name}' requires {expected} qubits, got {got}")]
    QubitCountMismatch {
        /// Name of the gate.
        gate_name: String,
        /// Expected number of qubits.
        expected: u32,
        /// Actual number of qubits provided.
        got: u32,
    },

    /// Measurement with mismatched qubit/clbit lists.
    #[error("Measurement over {qubits} qubits writes {clbits} classical bits")]
    MeasureArity {
        /// Number of measured qubits.
        qubits: usize,
        /// Number of target classical bits.
        clbits: usize,
    },

    /// Parameter is unbound.
    #[error("Parameter '{0}' is unbound")]
    UnboundParameter(String),

    /// Custom gate matrix with the wrong dimension.
    #[error("Matrix of length {got} does not fit a {num_qubits}-qubit gate (expected {expected})")]
    MatrixDimension {
        /// Gate width.
        num_qubits: u32,
        /// Expected element count.
        expected: usize,
        /// Provided element count.
        got: usize,
    },

    /// Same qubit used twice in one operation.
    #[error("Duplicate qubit {qubit} in operation{}", format_gate_context(.gate_name))]
    DuplicateQubit {
        /// The duplicate qubit.
        qubit: QubitId,
        /// Optional gate name for context.
        gate_name: Option<String>,
    },

    /// JSON (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[allow(clippy::ref_option)]
fn format_gate_context(gate_name: &Option<String>) -> String {
    match gate_name {
        Some(name) => format!(" (gate: {name})"),
        None => String::new(),
    }
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;
