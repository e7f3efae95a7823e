//! Circuit instructions combining gates with operands.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::gate::{Gate, GateKind, StandardGate};
use crate::qubit::{ClbitId, QubitId, WireId};

/// The kind of instruction in a circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// A quantum gate operation.
    Gate(Gate),
    /// Measurement operation.
    Measure,
    /// Reset qubit to |0⟩.
    Reset,
    /// Barrier (synchronization point).
    Barrier,
    /// Delay instruction.
    Delay {
        /// Duration in device-specific units.
        duration: u64,
    },
}

/// One operation of a circuit: a kind plus its operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The kind of instruction.
    pub kind: InstructionKind,
    /// Qubits this instruction operates on.
    pub qubits: Vec<QubitId>,
    /// Classical bits this instruction operates on (for measure).
    pub clbits: Vec<ClbitId>,
}

impl Instruction {
    /// Create a gate instruction.
    pub fn gate(gate: impl Into<Gate>, qubits: impl IntoIterator<Item = QubitId>) -> Self {
        Self {
            kind: InstructionKind::Gate(gate.into()),
            qubits: qubits.into_iter().collect(),
            clbits: vec![],
        }
    }

    /// Create a single-qubit gate instruction.
    pub fn single_qubit_gate(gate: StandardGate, qubit: QubitId) -> Self {
        Self::gate(gate, [qubit])
    }

    /// Create a two-qubit gate instruction.
    pub fn two_qubit_gate(gate: StandardGate, q1: QubitId, q2: QubitId) -> Self {
        Self::gate(gate, [q1, q2])
    }

    /// Create a measurement instruction.
    pub fn measure(qubit: QubitId, clbit: ClbitId) -> Self {
        Self {
            kind: InstructionKind::Measure,
            qubits: vec![qubit],
            clbits: vec![clbit],
        }
    }

    /// Create a reset instruction.
    pub fn reset(qubit: QubitId) -> Self {
        Self {
            kind: InstructionKind::Reset,
            qubits: vec![qubit],
            clbits: vec![],
        }
    }

    /// Create a barrier instruction.
    pub fn barrier(qubits: impl IntoIterator<Item = QubitId>) -> Self {
        Self {
            kind: InstructionKind::Barrier,
            qubits: qubits.into_iter().collect(),
            clbits: vec![],
        }
    }

    /// Create a delay instruction.
    pub fn delay(qubit: QubitId, duration: u64) -> Self {
        Self {
            kind: InstructionKind::Delay { duration },
            qubits: vec![qubit],
            clbits: vec![],
        }
    }

    /// Check if this is a gate instruction.
    pub fn is_gate(&self) -> bool {
        matches!(self.kind, InstructionKind::Gate(_))
    }

    /// Check if this is a measurement.
    pub fn is_measure(&self) -> bool {
        matches!(self.kind, InstructionKind::Measure)
    }

    /// Check if this is a barrier.
    pub fn is_barrier(&self) -> bool {
        matches!(self.kind, InstructionKind::Barrier)
    }

    /// Get the gate if this is a gate instruction.
    pub fn as_gate(&self) -> Option<&Gate> {
        match &self.kind {
            InstructionKind::Gate(g) => Some(g),
            _ => None,
        }
    }

    /// The standard gate, if this instruction is one.
    pub fn standard_gate(&self) -> Option<&StandardGate> {
        self.as_gate().and_then(|g| g.kind.as_standard())
    }

    /// A gate instruction acting on exactly two qubits.
    pub fn is_two_qubit_gate(&self) -> bool {
        self.is_gate() && self.qubits.len() == 2
    }

    /// A gate instruction acting on exactly one qubit.
    pub fn is_single_qubit_gate(&self) -> bool {
        self.is_gate() && self.qubits.len() == 1
    }

    /// Get the name of the instruction.
    pub fn name(&self) -> &str {
        match &self.kind {
            InstructionKind::Gate(g) => g.name(),
            InstructionKind::Measure => "measure",
            InstructionKind::Reset => "reset",
            InstructionKind::Barrier => "barrier",
            InstructionKind::Delay { .. } => "delay",
        }
    }

    /// All wires touched, qubits first, in operand order.
    pub fn wires(&self) -> impl Iterator<Item = WireId> + '_ {
        self.qubits
            .iter()
            .map(|&q| WireId::Qubit(q))
            .chain(self.clbits.iter().map(|&c| WireId::Clbit(c)))
    }

    /// The same instruction with every qubit operand passed through `map`.
    #[must_use]
    pub fn map_qubits(&self, map: impl Fn(QubitId) -> QubitId) -> Self {
        Self {
            kind: self.kind.clone(),
            qubits: self.qubits.iter().map(|&q| map(q)).collect(),
            clbits: self.clbits.clone(),
        }
    }

    /// Check operands against a register of the given size.
    ///
    /// Rejects arity mismatches, out-of-range indices and repeated qubits.
    pub fn validate(&self, num_qubits: u32, num_clbits: u32) -> IrResult<()> {
        let gate_name = match &self.kind {
            InstructionKind::Gate(g) => Some(g.name().to_string()),
            _ => None,
        };

        match &self.kind {
            InstructionKind::Gate(gate) => {
                let expected = gate.num_qubits();
                let got = u32::try_from(self.qubits.len()).unwrap_or(u32::MAX);
                if expected != got {
                    return Err(IrError::QubitCountMismatch {
                        gate_name: gate.name().to_string(),
                        expected,
                        got,
                    });
                }
                if let GateKind::Custom(custom) = &gate.kind {
                    if let Some(matrix) = &custom.matrix {
                        let dim = 1usize << custom.num_qubits;
                        if matrix.len() != dim * dim {
                            return Err(IrError::MatrixDimension {
                                num_qubits: custom.num_qubits,
                                expected: dim * dim,
                                got: matrix.len(),
                            });
                        }
                    }
                }
            }
            InstructionKind::Measure => {
                if self.qubits.len() != self.clbits.len() || self.qubits.is_empty() {
                    return Err(IrError::MeasureArity {
                        qubits: self.qubits.len(),
                        clbits: self.clbits.len(),
                    });
                }
            }
            InstructionKind::Reset | InstructionKind::Delay { .. } => {
                if self.qubits.len() != 1 {
                    return Err(IrError::QubitCountMismatch {
                        gate_name: self.name().to_string(),
                        expected: 1,
                        got: u32::try_from(self.qubits.len()).unwrap_or(u32::MAX),
                    });
                }
            }
            InstructionKind::Barrier => {}
        }

        for &qubit in &self.qubits {
            if qubit.0 >= num_qubits {
                return Err(IrError::QubitNotFound {
                    qubit,
                    num_qubits,
                    gate_name: gate_name.clone(),
                });
            }
        }
        for &clbit in &self.clbits {
            if clbit.0 >= num_clbits {
                return Err(IrError::ClbitNotFound {
                    clbit,
                    num_clbits,
                    gate_name: gate_name.clone(),
                });
            }
        }

        let mut seen = FxHashSet::default();
        for &qubit in &self.qubits {
            if !seen.insert(qubit) {
                return Err(IrError::DuplicateQubit { qubit, gate_name });
            }
        }
        Ok(())
    }
}
