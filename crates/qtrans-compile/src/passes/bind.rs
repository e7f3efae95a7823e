//! Parameter binding.

use std::collections::BTreeMap;

use qtrans_ir::{CircuitDag, Gate, GateKind, Instruction, InstructionKind};
use tracing::debug;

use crate::error::CompileResult;
use crate::pass::{Pass, PassKind};
use crate::property::PropertySet;

/// Substitutes values for symbolic gate angles.
///
/// Symbols without a value stay symbolic. Constant subexpressions are
/// folded, so a fully bound angle becomes a plain number.
#[derive(Debug, Clone, Default)]
pub struct ParameterBinding {
    values: BTreeMap<String, f64>,
}

impl ParameterBinding {
    /// Bind the given symbol values.
    pub fn new(values: BTreeMap<String, f64>) -> Self {
        Self { values }
    }

    fn bind(&self, inst: &Instruction) -> Option<Instruction> {
        let InstructionKind::Gate(gate) = &inst.kind else {
            return None;
        };
        let kind = match &gate.kind {
            GateKind::Standard(g) if g.is_parameterized() => {
                GateKind::Standard(g.map_parameters(|p| p.bind_all(&self.values)))
            }
            GateKind::Custom(c) if c.params.iter().any(|p| p.is_symbolic()) => {
                let mut custom = c.clone();
                for param in &mut custom.params {
                    *param = param.bind_all(&self.values);
                }
                GateKind::Custom(custom)
            }
            _ => return None,
        };
        Some(Instruction {
            kind: InstructionKind::Gate(Gate {
                kind,
                label: gate.label.clone(),
            }),
            qubits: inst.qubits.clone(),
            clbits: inst.clbits.clone(),
        })
    }
}

impl Pass for ParameterBinding {
    fn name(&self) -> &'static str {
        "ParameterBinding"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, dag: &mut CircuitDag, _properties: &mut PropertySet) -> CompileResult<()> {
        let updates: Vec<_> = dag
            .op_nodes()
            .filter_map(|(node, inst)| self.bind(inst).map(|bound| (node, bound)))
            .collect();
        let count = updates.len();
        for (node, bound) in updates {
            dag.replace_op(node, bound)?;
        }
        debug!("ParameterBinding updated {} gates", count);
        Ok(())
    }

    fn should_run(&self, _dag: &CircuitDag, _properties: &PropertySet) -> bool {
        !self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtrans_ir::{Circuit, ParameterExpression, QubitId, StandardGate};

    #[test]
    fn test_binds_known_symbols() {
        let mut circuit = Circuit::with_size("bind", 2, 0);
        circuit
            .rz(ParameterExpression::symbol("theta") * ParameterExpression::constant(2.0), QubitId(0))
            .unwrap();
        circuit
            .rzz(ParameterExpression::symbol("phi"), QubitId(0), QubitId(1))
            .unwrap();
        let mut dag = circuit.to_dag().unwrap();

        let pass = ParameterBinding::new(BTreeMap::from([("theta".to_string(), 0.25)]));
        pass.run(&mut dag, &mut PropertySet::new()).unwrap();

        let ops = dag.linearize().unwrap();
        match ops[0].standard_gate() {
            Some(StandardGate::Rz(p)) => assert_eq!(p.as_f64(), Some(0.5)),
            other => panic!("expected rz, got {other:?}"),
        }
        match ops[1].standard_gate() {
            Some(StandardGate::RZZ(p)) => assert!(p.is_symbolic()),
            other => panic!("expected rzz, got {other:?}"),
        }
    }

    #[test]
    fn test_skips_without_values() {
        let dag = CircuitDag::with_size(1, 0);
        assert!(!ParameterBinding::default().should_run(&dag, &PropertySet::new()));
    }
}
