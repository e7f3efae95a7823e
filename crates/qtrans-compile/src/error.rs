//! Error types for the compilation crate.

use qtrans_ir::IrError;
use thiserror::Error;

/// Errors that can occur during compilation.
///
/// The first failing pass aborts the whole flow; no partial circuit is
/// ever returned alongside one of these.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// Operand out of range, repeated operand or wrong arity.
    #[error("Malformed circuit: {0}")]
    MalformedCircuit(String),

    /// Circuit wider than the target.
    #[error("Circuit requires {required} qubits but backend only has {available}")]
    InsufficientQubits { required: u32, available: u32 },

    /// A symbolic angle reached a numeric decomposition.
    #[error("Parameter '{parameter}' of gate '{gate}' is unbound")]
    UnboundParameter { gate: String, parameter: String },

    /// No decomposition rule exists for the gate in this context.
    #[error("Unsupported gate '{gate}': {reason}")]
    UnsupportedGate { gate: String, reason: String },

    /// A synthesized sequence does not reproduce its source unitary.
    #[error("Decomposition of '{gate}' missed tolerance: error {error:.3e} > {tolerance:.1e}")]
    DecompositionTolerance {
        gate: String,
        error: f64,
        tolerance: f64,
    },

    /// Interacting qubits cannot be brought together on the coupling graph.
    #[error("Unreachable layout: {0}")]
    UnreachableLayout(String),

    /// Invalid backend or option values.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A pass needs the backend model but none was provided.
    #[error("Missing backend model")]
    MissingBackend,

    /// A pass needs an initial layout but no layout pass ran.
    #[error("Missing layout for routing")]
    MissingLayout,

    /// The flow was cancelled between two passes.
    #[error("Compilation cancelled before pass '{0}'")]
    Cancelled(String),

    /// Broken internal invariant; never expected on valid input.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<IrError> for CompileError {
    fn from(err: IrError) -> Self {
        match err {
            IrError::InvalidDag(_) | IrError::InvalidNode => CompileError::Internal(err.to_string()),
            IrError::UnboundParameter(parameter) => CompileError::UnboundParameter {
                gate: String::new(),
                parameter,
            },
            other => CompileError::MalformedCircuit(other.to_string()),
        }
    }
}

/// Result type for compilation operations.
pub type CompileResult<T> = Result<T, CompileError>;
