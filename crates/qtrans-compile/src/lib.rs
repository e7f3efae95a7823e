//! qtrans Compilation and Transpilation Framework
//!
//! This crate turns a logical [`Circuit`](qtrans_ir::Circuit) into one that
//! runs on a concrete device: every gate in the device's basis and every
//! two-qubit gate on a coupled pair of physical qubits. It follows a
//! pass-based architecture: each step is a [`Pass`] over a
//! [`CircuitDag`](qtrans_ir::CircuitDag), and a [`PassFlow`] runs them in
//! order.
//!
//! # Overview
//!
//! 1. **Unroll**: split gates on three or more qubits
//! 2. **Layout**: choose a starting physical qubit for every logical one
//! 3. **Routing**: insert swaps until every two-qubit gate is adjacent
//! 4. **Basis**: rewrite every gate into the native set
//! 5. **Optimization**: merge, cancel and re-synthesize
//!
//! # Architecture
//!
//! ```text
//! Input Circuit
//!       │
//!       ▼
//! ┌──────────┐
//! │ PassFlow │ ◄── PropertySet (backend, layouts, stats)
//! └──────────┘
//!       │
//!       ├── ParameterBinding
//!       ├── UnrollTo2Qubit
//!       ├── SabreLayout (levels 1-3)
//!       ├── UnrollToBasis
//!       ├── GateCombine + OneQubitOptimization
//!       └── CouplingVerification (levels 1-3)
//!       │
//!       ▼
//! TranspileResult (physical circuit, layouts, measurement map, stats)
//! ```
//!
//! # Example: Basic Compilation
//!
//! ```rust
//! use std::sync::Arc;
//! use qtrans_compile::{BackendModel, BasisGates, TranspileOptions, Transpiler};
//! use qtrans_ir::Circuit;
//!
//! let backend = BackendModel::star(5).with_basis(BasisGates::ibm());
//! let transpiler =
//!     Transpiler::new(Arc::new(backend), TranspileOptions::with_level(2)).unwrap();
//!
//! let result = transpiler.transpile(&Circuit::ghz(4).unwrap()).unwrap();
//! assert!(result
//!     .stats
//!     .gate_counts
//!     .keys()
//!     .all(|g| ["cx", "rz", "sx", "x", "measure"].contains(&g.as_str())));
//! ```
//!
//! # Optimization Levels
//!
//! | Level | Layout | Heuristic | Optimization |
//! |-------|--------|-----------|--------------|
//! | 0 | none: unroll only, logical qubits kept | none | none |
//! | 1 | SABRE bidirectional | distance | gate combine, 1q re-synthesis |
//! | 2 | SABRE bidirectional | fidelity | gate combine, 1q re-synthesis |
//! | 3 | SABRE bidirectional | mixture | both, looped to a fixed point |
//!
//! # Custom Passes
//!
//! Implement the [`Pass`] trait and add it to a [`PassFlow`]:
//!
//! ```rust
//! use qtrans_compile::{CompileResult, Pass, PassFlow, PassKind, PropertySet};
//! use qtrans_ir::CircuitDag;
//!
//! struct CountOps;
//!
//! impl Pass for CountOps {
//!     fn name(&self) -> &str { "count_ops" }
//!     fn kind(&self) -> PassKind { PassKind::Analysis }
//!
//!     fn run(&self, dag: &mut CircuitDag, props: &mut PropertySet) -> CompileResult<()> {
//!         props.insert(dag.num_ops());
//!         Ok(())
//!     }
//! }
//!
//! let mut flow = PassFlow::new();
//! flow.add_pass(CountOps);
//! let mut dag = qtrans_ir::Circuit::bell().unwrap().to_dag().unwrap();
//! let mut props = PropertySet::new();
//! flow.run(&mut dag, &mut props).unwrap();
//! assert_eq!(props.get::<usize>(), Some(&4));
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod flow;
pub mod pass;
pub mod property;
pub mod synthesis;
pub mod transpiler;

// Built-in passes
pub mod passes;

pub use backend::{BackendModel, BasisGates, Coupling, DEFAULT_FIDELITY};
pub use config::{Heuristic, InitialLayoutStrategy, ResolvedSabre, SabreConfig, TranspileOptions};
pub use error::{CompileError, CompileResult};
pub use flow::{FixedPoint, MAX_FIXED_POINT_ROUNDS, PassFlow, PassFlowBuilder};
pub use pass::{Pass, PassKind};
pub use property::{GateCensus, Layout, PropertySet, RoutingStats};
pub use synthesis::EulerBasis;
pub use transpiler::{TranspileResult, TranspileStats, Transpiler};
