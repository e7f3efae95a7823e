//! Ordered gate sequences: the transpiler's input and output format.

use serde::{Deserialize, Serialize};

use crate::dag::CircuitDag;
use crate::error::{IrError, IrResult};
use crate::gate::{Gate, StandardGate};
use crate::instruction::Instruction;
use crate::parameter::ParameterExpression;
use crate::qubit::{ClbitId, QubitId};

/// A quantum circuit as an ordered list of operations over fixed registers.
///
/// Builder methods validate operands as they go. [`Circuit::from_instructions`]
/// accepts an arbitrary sequence; it is validated when converted to a DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    name: String,
    num_qubits: u32,
    num_clbits: u32,
    instructions: Vec<Instruction>,
    #[serde(default)]
    global_phase: f64,
}

impl Circuit {
    /// Create an empty circuit with a given number of qubits and classical bits.
    pub fn with_size(name: impl Into<String>, num_qubits: u32, num_clbits: u32) -> Self {
        Self {
            name: name.into(),
            num_qubits,
            num_clbits,
            instructions: vec![],
            global_phase: 0.0,
        }
    }

    /// Wrap an externally produced gate sequence without validating it.
    pub fn from_instructions(
        name: impl Into<String>,
        num_qubits: u32,
        num_clbits: u32,
        instructions: Vec<Instruction>,
    ) -> Self {
        Self {
            name: name.into(),
            num_qubits,
            num_clbits,
            instructions,
            global_phase: 0.0,
        }
    }

    /// Append a validated instruction.
    pub fn push(&mut self, instruction: Instruction) -> IrResult<&mut Self> {
        instruction.validate(self.num_qubits, self.num_clbits)?;
        self.instructions.push(instruction);
        Ok(self)
    }

    fn one(&mut self, gate: StandardGate, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::single_qubit_gate(gate, qubit))
    }

    fn two(&mut self, gate: StandardGate, a: QubitId, b: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::two_qubit_gate(gate, a, b))
    }

    // =========================================================================
    // Single-qubit gates
    // =========================================================================

    /// Apply Hadamard gate.
    pub fn h(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::H, qubit)
    }

    /// Apply Pauli-X gate.
    pub fn x(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::X, qubit)
    }

    /// Apply Pauli-Y gate.
    pub fn y(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::Y, qubit)
    }

    /// Apply Pauli-Z gate.
    pub fn z(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::Z, qubit)
    }

    /// Apply S gate.
    pub fn s(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::S, qubit)
    }

    /// Apply S-dagger gate.
    pub fn sdg(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::Sdg, qubit)
    }

    /// Apply T gate.
    pub fn t(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::T, qubit)
    }

    /// Apply T-dagger gate.
    pub fn tdg(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::Tdg, qubit)
    }

    /// Apply sqrt(X) gate.
    pub fn sx(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::SX, qubit)
    }

    /// Apply Rx rotation gate.
    pub fn rx(&mut self, theta: impl Into<ParameterExpression>, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::Rx(theta.into()), qubit)
    }

    /// Apply Ry rotation gate.
    pub fn ry(&mut self, theta: impl Into<ParameterExpression>, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::Ry(theta.into()), qubit)
    }

    /// Apply Rz rotation gate.
    pub fn rz(&mut self, theta: impl Into<ParameterExpression>, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::Rz(theta.into()), qubit)
    }

    /// Apply phase gate.
    pub fn p(&mut self, lambda: impl Into<ParameterExpression>, qubit: QubitId) -> IrResult<&mut Self> {
        self.one(StandardGate::P(lambda.into()), qubit)
    }

    /// Apply U(θ, φ, λ).
    pub fn u(
        &mut self,
        theta: impl Into<ParameterExpression>,
        phi: impl Into<ParameterExpression>,
        lambda: impl Into<ParameterExpression>,
        qubit: QubitId,
    ) -> IrResult<&mut Self> {
        self.one(
            StandardGate::U(theta.into(), phi.into(), lambda.into()),
            qubit,
        )
    }

    // =========================================================================
    // Two-qubit gates
    // =========================================================================

    /// Apply CNOT gate.
    pub fn cx(&mut self, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.two(StandardGate::CX, control, target)
    }

    /// Apply controlled-Y gate.
    pub fn cy(&mut self, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.two(StandardGate::CY, control, target)
    }

    /// Apply controlled-Z gate.
    pub fn cz(&mut self, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.two(StandardGate::CZ, control, target)
    }

    /// Apply controlled-Hadamard gate.
    pub fn ch(&mut self, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.two(StandardGate::CH, control, target)
    }

    /// Apply SWAP gate.
    pub fn swap(&mut self, q1: QubitId, q2: QubitId) -> IrResult<&mut Self> {
        self.two(StandardGate::Swap, q1, q2)
    }

    /// Apply iSWAP gate.
    pub fn iswap(&mut self, q1: QubitId, q2: QubitId) -> IrResult<&mut Self> {
        self.two(StandardGate::ISwap, q1, q2)
    }

    /// Apply controlled phase gate.
    pub fn cp(
        &mut self,
        lambda: impl Into<ParameterExpression>,
        control: QubitId,
        target: QubitId,
    ) -> IrResult<&mut Self> {
        self.two(StandardGate::CP(lambda.into()), control, target)
    }

    /// Apply controlled Rx.
    pub fn crx(
        &mut self,
        theta: impl Into<ParameterExpression>,
        control: QubitId,
        target: QubitId,
    ) -> IrResult<&mut Self> {
        self.two(StandardGate::CRx(theta.into()), control, target)
    }

    /// Apply controlled Ry.
    pub fn cry(
        &mut self,
        theta: impl Into<ParameterExpression>,
        control: QubitId,
        target: QubitId,
    ) -> IrResult<&mut Self> {
        self.two(StandardGate::CRy(theta.into()), control, target)
    }

    /// Apply controlled Rz.
    pub fn crz(
        &mut self,
        theta: impl Into<ParameterExpression>,
        control: QubitId,
        target: QubitId,
    ) -> IrResult<&mut Self> {
        self.two(StandardGate::CRz(theta.into()), control, target)
    }

    /// Apply XX rotation.
    pub fn rxx(&mut self, theta: impl Into<ParameterExpression>, q1: QubitId, q2: QubitId) -> IrResult<&mut Self> {
        self.two(StandardGate::RXX(theta.into()), q1, q2)
    }

    /// Apply YY rotation.
    pub fn ryy(&mut self, theta: impl Into<ParameterExpression>, q1: QubitId, q2: QubitId) -> IrResult<&mut Self> {
        self.two(StandardGate::RYY(theta.into()), q1, q2)
    }

    /// Apply ZZ rotation.
    pub fn rzz(&mut self, theta: impl Into<ParameterExpression>, q1: QubitId, q2: QubitId) -> IrResult<&mut Self> {
        self.two(StandardGate::RZZ(theta.into()), q1, q2)
    }

    // =========================================================================
    // Multi-qubit gates
    // =========================================================================

    /// Apply Toffoli gate.
    pub fn ccx(&mut self, c1: QubitId, c2: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::gate(StandardGate::CCX, [c1, c2, target]))
    }

    /// Apply Fredkin gate.
    pub fn cswap(&mut self, control: QubitId, t1: QubitId, t2: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::gate(StandardGate::CSwap, [control, t1, t2]))
    }

    /// Apply X controlled on every qubit of `controls`.
    pub fn mcx(&mut self, controls: &[QubitId], target: QubitId) -> IrResult<&mut Self> {
        let n = control_count("mcx", controls)?;
        self.controlled(StandardGate::Mcx(n), controls, target)
    }

    /// Apply RY(θ) controlled on every qubit of `controls`.
    pub fn mcry(
        &mut self,
        theta: impl Into<ParameterExpression>,
        controls: &[QubitId],
        target: QubitId,
    ) -> IrResult<&mut Self> {
        let n = control_count("mcry", controls)?;
        self.controlled(StandardGate::Mcry(n, theta.into()), controls, target)
    }

    /// Apply U(θ, φ, λ) controlled on every qubit of `controls`.
    pub fn mcu(
        &mut self,
        theta: impl Into<ParameterExpression>,
        phi: impl Into<ParameterExpression>,
        lambda: impl Into<ParameterExpression>,
        controls: &[QubitId],
        target: QubitId,
    ) -> IrResult<&mut Self> {
        let n = control_count("mcu", controls)?;
        let gate = StandardGate::Mcu(n, theta.into(), phi.into(), lambda.into());
        self.controlled(gate, controls, target)
    }

    fn controlled(
        &mut self,
        gate: StandardGate,
        controls: &[QubitId],
        target: QubitId,
    ) -> IrResult<&mut Self> {
        let operands = controls.iter().copied().chain(std::iter::once(target));
        self.push(Instruction::gate(gate, operands))
    }

    // =========================================================================
    // Other operations
    // =========================================================================

    /// Apply a custom gate.
    pub fn gate(
        &mut self,
        gate: impl Into<Gate>,
        qubits: impl IntoIterator<Item = QubitId>,
    ) -> IrResult<&mut Self> {
        self.push(Instruction::gate(gate, qubits))
    }

    /// Measure a qubit to a classical bit.
    pub fn measure(&mut self, qubit: QubitId, clbit: ClbitId) -> IrResult<&mut Self> {
        self.push(Instruction::measure(qubit, clbit))
    }

    /// Measure qubit `i` into bit `i` for every qubit, growing the classical
    /// register if it is too small.
    pub fn measure_all(&mut self) -> IrResult<&mut Self> {
        self.num_clbits = self.num_clbits.max(self.num_qubits);
        for i in 0..self.num_qubits {
            self.push(Instruction::measure(QubitId(i), ClbitId(i)))?;
        }
        Ok(self)
    }

    /// Reset a qubit to |0⟩.
    pub fn reset(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.push(Instruction::reset(qubit))
    }

    /// Apply a barrier to specified qubits.
    pub fn barrier(&mut self, qubits: impl IntoIterator<Item = QubitId>) -> IrResult<&mut Self> {
        self.push(Instruction::barrier(qubits))
    }

    /// Apply a delay to a qubit.
    pub fn delay(&mut self, qubit: QubitId, duration: u64) -> IrResult<&mut Self> {
        self.push(Instruction::delay(qubit, duration))
    }

    // =========================================================================
    // Accessors and conversion
    // =========================================================================

    /// Get the circuit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of qubits.
    pub fn num_qubits(&self) -> u32 {
        self.num_qubits
    }

    /// Get the number of classical bits.
    pub fn num_clbits(&self) -> u32 {
        self.num_clbits
    }

    /// The operations in program order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// True if the circuit has no operations.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Global phase in radians.
    pub fn global_phase(&self) -> f64 {
        self.global_phase
    }

    /// Build the dependency DAG.
    pub fn to_dag(&self) -> IrResult<CircuitDag> {
        let mut dag = CircuitDag::from_instructions(
            self.num_qubits,
            self.num_clbits,
            self.instructions.iter().cloned(),
        )?;
        dag.set_global_phase(self.global_phase);
        Ok(dag)
    }

    /// Linearize a DAG back into a circuit.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_dag(name: impl Into<String>, dag: &CircuitDag) -> IrResult<Self> {
        Ok(Self {
            name: name.into(),
            num_qubits: dag.num_qubits() as u32,
            num_clbits: dag.num_clbits() as u32,
            instructions: dag.linearize()?,
            global_phase: dag.global_phase(),
        })
    }

    /// Circuit depth, computed on the DAG.
    pub fn depth(&self) -> IrResult<usize> {
        Ok(self.to_dag()?.depth())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> IrResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> IrResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    // =========================================================================
    // Pre-built circuits
    // =========================================================================

    /// Create a Bell state circuit.
    pub fn bell() -> IrResult<Self> {
        let mut circuit = Self::with_size("bell", 2, 2);
        circuit
            .h(QubitId(0))?
            .cx(QubitId(0), QubitId(1))?
            .measure(QubitId(0), ClbitId(0))?
            .measure(QubitId(1), ClbitId(1))?;
        Ok(circuit)
    }

    /// Create a GHZ state circuit with measurements.
    pub fn ghz(n: u32) -> IrResult<Self> {
        let mut circuit = Self::with_size("ghz", n, n);
        if n == 0 {
            return Ok(circuit);
        }
        circuit.h(QubitId(0))?;
        for i in 0..n - 1 {
            circuit.cx(QubitId(i), QubitId(i + 1))?;
        }
        circuit.measure_all()?;
        Ok(circuit)
    }

    /// Create a QFT circuit (without measurements).
    pub fn qft(n: u32) -> IrResult<Self> {
        use std::f64::consts::PI;

        let mut circuit = Self::with_size("qft", n, 0);
        for i in 0..n {
            circuit.h(QubitId(i))?;
            for j in (i + 1)..n {
                let angle = PI / f64::from(1u32 << (j - i).min(31));
                circuit.cp(angle, QubitId(j), QubitId(i))?;
            }
        }
        for i in 0..n / 2 {
            circuit.swap(QubitId(i), QubitId(n - 1 - i))?;
        }
        Ok(circuit)
    }
}

fn control_count(gate_name: &str, controls: &[QubitId]) -> IrResult<u32> {
    u32::try_from(controls.len())
        .ok()
        .filter(|&n| n < u32::MAX)
        .ok_or_else(|| IrError::QubitCountMismatch {
            gate_name: gate_name.to_string(),
            expected: u32::MAX,
            got: u32::MAX,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_circuit_with_size() {
        let circuit = Circuit::with_size("test", 3, 2);
        assert_eq!(circuit.num_qubits(), 3);
        assert_eq!(circuit.num_clbits(), 2);
        assert!(circuit.is_empty());
    }

    #[test]
    fn test_bell_state() {
        let circuit = Circuit::bell().unwrap();
        assert_eq!(circuit.len(), 4);
        assert_eq!(circuit.depth().unwrap(), 3); // H, CX, parallel measures
    }

    #[test]
    fn test_builder_rejects_bad_operand() {
        let mut circuit = Circuit::with_size("test", 2, 0);
        let err = circuit.cx(QubitId(0), QubitId(2)).unwrap_err();
        assert!(matches!(err, IrError::QubitNotFound { .. }));
        assert!(circuit.is_empty());
    }

    #[test]
    fn test_unvalidated_sequence_fails_at_dag_build() {
        let circuit = Circuit::from_instructions(
            "raw",
            1,
            0,
            vec![Instruction::two_qubit_gate(
                StandardGate::CX,
                QubitId(0),
                QubitId(1),
            )],
        );
        assert!(circuit.to_dag().is_err());
    }

    #[test]
    fn test_dag_round_trip() {
        let mut circuit = Circuit::with_size("rt", 3, 3);
        circuit
            .h(QubitId(0))
            .unwrap()
            .rz(PI / 3.0, QubitId(2))
            .unwrap()
            .cx(QubitId(0), QubitId(1))
            .unwrap()
            .mcx(&[QubitId(0), QubitId(1)], QubitId(2))
            .unwrap()
            .measure_all()
            .unwrap();

        let dag = circuit.to_dag().unwrap();
        let back = Circuit::from_dag("rt", &dag).unwrap();
        assert_eq!(back, circuit);
    }

    #[test]
    fn test_multi_controlled_builders() {
        let mut circuit = Circuit::with_size("mc", 4, 0);
        let controls = [QubitId(0), QubitId(1), QubitId(2)];
        circuit.mcry(0.4, &controls, QubitId(3)).unwrap();
        circuit.mcu(0.1, 0.2, 0.3, &controls[..1], QubitId(3)).unwrap();

        let ops = circuit.instructions();
        assert_eq!(ops[0].name(), "mcry");
        assert_eq!(ops[0].qubits.len(), 4);
        assert_eq!(ops[1].standard_gate().map(StandardGate::num_qubits), Some(2));
        assert!(circuit.mcry(0.4, &controls, QubitId(4)).is_err());
    }

    #[test]
    fn test_measure_all_grows_register() {
        let mut circuit = Circuit::with_size("m", 3, 1);
        circuit.measure_all().unwrap();
        assert_eq!(circuit.num_clbits(), 3);
        assert_eq!(circuit.len(), 3);
    }

    #[test]
    fn test_json_round_trip() {
        let circuit = Circuit::qft(3).unwrap();
        let json = circuit.to_json().unwrap();
        assert_eq!(Circuit::from_json(&json).unwrap(), circuit);
    }
}
