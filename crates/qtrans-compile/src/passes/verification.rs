//! Post-routing verification.

use qtrans_ir::CircuitDag;
use tracing::debug;

use crate::error::{CompileError, CompileResult};
use crate::pass::{Pass, PassKind};
use crate::property::{GateCensus, PropertySet};

/// Analysis pass that checks every two-qubit gate against the coupling graph.
///
/// Expects a DAG over physical qubits, as produced by the routing passes.
/// Fails with [`CompileError::UnreachableLayout`] on the first gate whose
/// operands are not adjacent; otherwise stores a [`GateCensus`] in the
/// property set.
pub struct CouplingVerification;

impl Pass for CouplingVerification {
    fn name(&self) -> &'static str {
        "CouplingVerification"
    }

    fn kind(&self) -> PassKind {
        PassKind::Analysis
    }

    fn run(&self, dag: &mut CircuitDag, properties: &mut PropertySet) -> CompileResult<()> {
        let backend = properties
            .backend
            .clone()
            .ok_or(CompileError::MissingBackend)?;

        let mut census = GateCensus::default();
        for (_, inst) in dag.op_nodes() {
            if !inst.is_gate() {
                continue;
            }
            match inst.qubits.as_slice() {
                [_] => census.one_qubit += 1,
                [a, b] => {
                    if !backend.is_adjacent(a.0, b.0) {
                        return Err(CompileError::UnreachableLayout(format!(
                            "'{}' on physical qubits {} and {} which are not coupled",
                            inst.name(),
                            a.0,
                            b.0
                        )));
                    }
                    census.two_qubit += 1;
                }
                _ => {
                    return Err(CompileError::Internal(format!(
                        "'{}' on {} qubits survived unrolling",
                        inst.name(),
                        inst.qubits.len()
                    )));
                }
            }
        }

        debug!(
            "CouplingVerification passed: {} one-qubit, {} two-qubit gates",
            census.one_qubit, census.two_qubit
        );
        properties.insert(census);
        Ok(())
    }
}
