//! The unit of work of a [`PassFlow`](crate::PassFlow).

use qtrans_ir::CircuitDag;

use crate::error::CompileResult;
use crate::property::PropertySet;

/// Whether a pass rewrites the circuit or only inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Leaves the DAG untouched; results go into the [`PropertySet`].
    Analysis,
    /// Rewrites the DAG in place.
    Transformation,
}

/// One step of a transpilation.
///
/// A pass holds only configuration. Layouts, statistics and the backend
/// travel in the [`PropertySet`], so a single pass value is shared by every
/// compilation that runs its flow. Before a layout pass runs, DAG qubits
/// are logical; afterwards they are physical backend qubits.
///
/// Returning an error stops the flow; the caller never sees the DAG.
pub trait Pass: Send + Sync {
    /// Name used in logs and in [`CompileError::Cancelled`](crate::CompileError::Cancelled).
    fn name(&self) -> &str;

    /// Analysis or transformation.
    fn kind(&self) -> PassKind;

    /// Apply the pass.
    fn run(&self, dag: &mut CircuitDag, properties: &mut PropertySet) -> CompileResult<()>;

    /// `false` skips the pass for this compilation.
    fn should_run(&self, _dag: &CircuitDag, _properties: &PropertySet) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Pass for Noop {
        fn name(&self) -> &'static str {
            "noop"
        }

        fn kind(&self) -> PassKind {
            PassKind::Analysis
        }

        fn run(&self, _dag: &mut CircuitDag, _properties: &mut PropertySet) -> CompileResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_should_run() {
        let pass = Noop;
        let dag = CircuitDag::with_size(1, 0);
        assert_eq!(pass.kind(), PassKind::Analysis);
        assert!(pass.should_run(&dag, &PropertySet::new()));
    }
}
