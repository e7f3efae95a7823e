//! Single-qubit run re-synthesis.

use std::collections::BTreeMap;

use qtrans_ir::{CircuitDag, Instruction, NodeIndex, QubitId, StandardGate};
use tracing::debug;

use crate::error::CompileResult;
use crate::pass::{Pass, PassKind};
use crate::passes::unroll::resolve_euler_basis;
use crate::property::PropertySet;
use crate::synthesis::{EPSILON, EulerBasis, sequence_matrix, synthesize};

/// Single-qubit optimization pass.
///
/// Collects maximal runs of consecutive single-qubit gates on each qubit,
/// multiplies each run into one 2x2 unitary and re-synthesizes it in the
/// backend's Euler family (ZYZ without a backend). The new sequence replaces
/// the run only when it is strictly shorter and, with a backend, entirely
/// native.
///
/// Gates with symbolic angles end a run.
#[derive(Debug, Clone, Default)]
pub struct OneQubitOptimization {
    euler_basis: Option<EulerBasis>,
}

impl OneQubitOptimization {
    /// Create an optimizer that infers its Euler family.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a single-qubit synthesis family.
    #[must_use]
    pub fn with_euler_basis(mut self, basis: Option<EulerBasis>) -> Self {
        self.euler_basis = basis;
        self
    }

    fn family(&self, properties: &PropertySet) -> CompileResult<Option<EulerBasis>> {
        match &properties.backend {
            Some(backend) => resolve_euler_basis(backend.basis(), self.euler_basis),
            None => Ok(Some(self.euler_basis.unwrap_or_default())),
        }
    }
}

/// Runs of numeric single-qubit gates, one entry per qubit run.
///
/// Uses one topological order for all qubits; `BTreeMap` keeps the output
/// independent of hashing.
fn find_1q_runs(dag: &CircuitDag) -> CompileResult<Vec<(QubitId, Vec<NodeIndex>)>> {
    let mut qubit_ops: BTreeMap<QubitId, Vec<(NodeIndex, &Instruction)>> = BTreeMap::new();
    for (node, inst) in dag.topological_ops()? {
        for &qubit in &inst.qubits {
            qubit_ops.entry(qubit).or_default().push((node, inst));
        }
    }

    let mut runs = Vec::new();
    for (qubit, ops) in qubit_ops {
        let mut current: Vec<NodeIndex> = Vec::new();
        for (node, inst) in ops {
            if is_optimizable(inst) {
                current.push(node);
            } else if !current.is_empty() {
                runs.push((qubit, std::mem::take(&mut current)));
            }
        }
        if !current.is_empty() {
            runs.push((qubit, current));
        }
    }
    Ok(runs)
}

fn is_optimizable(inst: &Instruction) -> bool {
    let numeric = |g: &StandardGate| !g.parameters().iter().any(|p| p.is_symbolic());
    inst.qubits.len() == 1
        && inst
            .standard_gate()
            .is_some_and(|g| g.num_qubits() == 1 && numeric(g))
}

impl Pass for OneQubitOptimization {
    fn name(&self) -> &'static str {
        "OneQubitOptimization"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, dag: &mut CircuitDag, properties: &mut PropertySet) -> CompileResult<()> {
        let Some(family) = self.family(properties)? else {
            debug!("OneQubitOptimization: basis has no single-qubit family");
            return Ok(());
        };
        let native = |gate: &StandardGate| {
            properties
                .backend
                .as_ref()
                .is_none_or(|b| b.basis().contains(gate.name()))
        };

        let mut rewritten = 0usize;
        for (qubit, nodes) in find_1q_runs(dag)? {
            let gates: Vec<StandardGate> = nodes
                .iter()
                .filter_map(|&n| dag.get_instruction(n).and_then(Instruction::standard_gate))
                .cloned()
                .collect();
            let Some(unitary) = sequence_matrix(&gates) else {
                continue;
            };
            let sequence = synthesize(&unitary, family, EPSILON)?;
            if sequence.gates.len() >= nodes.len() || !sequence.gates.iter().all(native) {
                continue;
            }

            let (keep, remove) = nodes.split_at(sequence.gates.len());
            for (&node, gate) in keep.iter().zip(sequence.gates) {
                dag.replace_op(node, Instruction::single_qubit_gate(gate, qubit))?;
            }
            for &node in remove {
                dag.remove_op(node)?;
            }
            // The run's own phase is the product's; the nodes carried none.
            dag.add_global_phase(sequence.global_phase);
            rewritten += 1;
        }

        debug!("OneQubitOptimization rewrote {} runs", rewritten);
        Ok(())
    }

    fn should_run(&self, dag: &CircuitDag, _properties: &PropertySet) -> bool {
        dag.num_ops() > 0
    }
}
