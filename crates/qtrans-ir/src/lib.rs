//! qtrans Circuit Intermediate Representation
//!
//! This crate provides the two circuit forms the qtrans transpiler works on:
//! an ordered gate sequence ([`Circuit`]) and a dependency graph
//! ([`CircuitDag`]) that passes rewrite in place.
//!
//! # Overview
//!
//! A circuit is built with the fluent [`Circuit`] API, converted to a DAG with
//! [`Circuit::to_dag`], transformed, and flattened back with
//! [`Circuit::from_dag`]. Linearization is deterministic: operations that do
//! not depend on each other come out in the order they were inserted, so a
//! DAG that no pass touched linearizes to its input sequence.
//!
//! # Core Components
//!
//! - **Qubits and Classical Bits**: [`QubitId`], [`ClbitId`] and the [`WireId`]
//!   union used to label DAG edges
//! - **Gates**: [`StandardGate`] for built-in gates and [`CustomGate`] for
//!   user-defined operations with an optional unitary
//! - **Parameters**: [`ParameterExpression`] for bound or symbolic angles
//! - **Instructions**: [`Instruction`] combining an operation with its operands
//! - **DAG**: [`CircuitDag`], nodes stored in a stable graph so indices survive
//!   removal and substitution
//!
//! # Example: Building a Bell State
//!
//! ```rust
//! use qtrans_ir::{Circuit, QubitId};
//!
//! let mut circuit = Circuit::with_size("bell_state", 2, 2);
//! circuit.h(QubitId(0)).unwrap();
//! circuit.cx(QubitId(0), QubitId(1)).unwrap();
//! circuit.measure_all().unwrap();
//!
//! assert_eq!(circuit.num_qubits(), 2);
//! assert_eq!(circuit.depth().unwrap(), 3);
//! ```
//!
//! # Example: Round-tripping Through the DAG
//!
//! ```rust
//! use qtrans_ir::{Circuit, QubitId};
//!
//! let mut circuit = Circuit::with_size("rt", 3, 0);
//! circuit.h(QubitId(2)).unwrap();
//! circuit.x(QubitId(0)).unwrap();
//! circuit.cx(QubitId(0), QubitId(1)).unwrap();
//!
//! let dag = circuit.to_dag().unwrap();
//! assert_eq!(Circuit::from_dag("rt", &dag).unwrap(), circuit);
//! ```
//!
//! # Supported Gates
//!
//! | Gate | Qubits | Description |
//! |------|--------|-------------|
//! | `I`, `X`, `Y`, `Z` | 1 | Identity and Pauli gates |
//! | `H`, `S`, `Sdg`, `T`, `Tdg`, `SX`, `SXdg` | 1 | Clifford+T gates |
//! | `Rx`, `Ry`, `Rz`, `P` | 1 | Rotation and phase gates |
//! | `U` | 1 | Universal single-qubit gate U(θ,φ,λ) |
//! | `CX`, `CY`, `CZ`, `CH` | 2 | Controlled Paulis and Hadamard |
//! | `Swap`, `ISwap` | 2 | Exchange gates |
//! | `CRx`, `CRy`, `CRz`, `CP` | 2 | Controlled rotations and phase |
//! | `RXX`, `RYY`, `RZZ` | 2 | Ising interactions |
//! | `CCX`, `CSwap` | 3 | Toffoli and Fredkin |
//! | `Mcx(n)`, `Mcry(n, θ)`, `Mcu(n, θ, φ, λ)` | n+1 | Multi-controlled X, RY and U |

pub mod circuit;
pub mod dag;
pub mod error;
pub mod gate;
pub mod instruction;
pub mod parameter;
pub mod qubit;

pub use circuit::Circuit;
pub use dag::{CircuitDag, DagEdge, DagNode, NodeIndex, NodeOrder, OpNode};
pub use error::{IrError, IrResult};
pub use gate::{CustomGate, Gate, GateKind, StandardGate};
pub use instruction::{Instruction, InstructionKind};
pub use parameter::ParameterExpression;
pub use qubit::{ClbitId, QubitId, WireId};
