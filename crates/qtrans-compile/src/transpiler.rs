//! End-to-end transpilation against one backend.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::{panic, thread};

use serde::Serialize;
use tracing::{info, instrument};

use qtrans_ir::{Circuit, CircuitDag, InstructionKind, QubitId};

use crate::backend::BackendModel;
use crate::config::TranspileOptions;
use crate::error::{CompileError, CompileResult};
use crate::flow::{PassFlow, PassFlowBuilder};
use crate::passes::resolve_euler_basis;
use crate::property::{Layout, PropertySet, RoutingStats};

/// Summary numbers of a transpiled circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranspileStats {
    /// Operation count per gate name.
    pub gate_counts: BTreeMap<String, usize>,
    /// Longest dependency chain.
    pub depth: usize,
    /// Total operations, measurements and barriers included.
    pub num_ops: usize,
    /// Gates acting on two qubits.
    pub two_qubit_gates: usize,
    /// Swaps added by routing.
    pub swaps_inserted: usize,
    /// Product of the link fidelities of every two-qubit gate; `None` when
    /// a two-qubit gate sits on an uncoupled pair, as unrouted level 0
    /// output may.
    pub estimated_fidelity: Option<f64>,
}

/// Output of [`Transpiler::transpile`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranspileResult {
    /// The circuit over the backend's physical qubits.
    pub circuit: Circuit,
    /// Logical qubit index to physical qubit before the first operation.
    pub initial_layout: BTreeMap<u32, u32>,
    /// Logical qubit index to physical qubit after the last operation.
    pub final_layout: BTreeMap<u32, u32>,
    /// Physical qubit to the classical bit its last measurement writes.
    pub measurement_map: BTreeMap<u32, u32>,
    /// Size and quality figures.
    pub stats: TranspileStats,
}

/// Compiles circuits for one backend with one pass flow.
///
/// The backend and the flow are shared immutably, so a `Transpiler` can be
/// cloned or put behind an `Arc` and used from many threads at once; each
/// call works on its own DAG and [`PropertySet`].
///
/// ```
/// use std::sync::Arc;
/// use qtrans_compile::{BackendModel, TranspileOptions, Transpiler};
/// use qtrans_ir::{Circuit, QubitId};
///
/// let transpiler = Transpiler::new(
///     Arc::new(BackendModel::linear(3)),
///     TranspileOptions::with_level(1),
/// )
/// .unwrap();
///
/// let mut circuit = Circuit::with_size("far", 3, 0);
/// circuit.cx(QubitId(0), QubitId(2)).unwrap();
///
/// let result = transpiler.transpile(&circuit).unwrap();
/// assert_eq!(result.initial_layout.len(), 2);
/// assert!(result.stats.estimated_fidelity.is_some_and(|f| f > 0.0));
/// ```
#[derive(Clone)]
pub struct Transpiler {
    backend: Arc<BackendModel>,
    options: TranspileOptions,
    flow: Arc<PassFlow>,
}

impl Transpiler {
    /// Build the preset flow for `options.optimization_level`.
    ///
    /// Rejects invalid options and an Euler basis the backend cannot run.
    pub fn new(backend: Arc<BackendModel>, options: TranspileOptions) -> CompileResult<Self> {
        options.validate()?;
        if options.euler_basis.is_some() {
            resolve_euler_basis(backend.basis(), options.euler_basis)?;
        }
        let flow = PassFlowBuilder::new().with_options(options.clone()).build();
        Ok(Self {
            backend,
            options,
            flow: Arc::new(flow),
        })
    }

    /// Use an explicit flow instead of a preset.
    pub fn with_flow(backend: Arc<BackendModel>, flow: PassFlow) -> Self {
        Self {
            backend,
            options: TranspileOptions::default(),
            flow: Arc::new(flow),
        }
    }

    /// The target backend.
    pub fn backend(&self) -> &Arc<BackendModel> {
        &self.backend
    }

    /// The options the flow was built from.
    pub fn options(&self) -> &TranspileOptions {
        &self.options
    }

    /// The flow every call runs.
    pub fn flow(&self) -> &PassFlow {
        &self.flow
    }

    /// Compile `circuit`.
    ///
    /// Fails with [`CompileError::InsufficientQubits`] before any pass runs
    /// when the circuit is wider than the backend. Any pass failure is
    /// returned as is, with no partial result.
    #[instrument(skip_all, fields(circuit = circuit.name()))]
    pub fn transpile(&self, circuit: &Circuit) -> CompileResult<TranspileResult> {
        self.transpile_inner(circuit, None)
    }

    /// Compile many circuits on scoped worker threads.
    ///
    /// Results come back in input order and equal what
    /// [`transpile`](Self::transpile) returns for each circuit; one failure
    /// does not stop the others.
    #[instrument(skip_all, fields(circuits = circuits.len()))]
    pub fn transpile_batch(&self, circuits: &[Circuit]) -> Vec<CompileResult<TranspileResult>> {
        let workers = thread::available_parallelism()
            .map_or(1, NonZeroUsize::get)
            .min(circuits.len())
            .max(1);
        let chunk = circuits.len().div_ceil(workers).max(1);
        info!(
            "Transpiling {} circuits on {} threads",
            circuits.len(),
            workers
        );

        thread::scope(|scope| {
            let handles: Vec<_> = circuits
                .chunks(chunk)
                .map(|part| {
                    scope.spawn(move || {
                        part.iter()
                            .map(|circuit| self.transpile(circuit))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_else(|err| panic::resume_unwind(err)))
                .collect()
        })
    }

    /// Like [`transpile`](Self::transpile), stopping between passes once
    /// `cancel` is set.
    #[instrument(skip_all, fields(circuit = circuit.name()))]
    pub fn transpile_cancellable(
        &self,
        circuit: &Circuit,
        cancel: &AtomicBool,
    ) -> CompileResult<TranspileResult> {
        self.transpile_inner(circuit, Some(cancel))
    }

    fn transpile_inner(
        &self,
        circuit: &Circuit,
        cancel: Option<&AtomicBool>,
    ) -> CompileResult<TranspileResult> {
        if circuit.num_qubits() > self.backend.num_qubits() {
            return Err(CompileError::InsufficientQubits {
                required: circuit.num_qubits(),
                available: self.backend.num_qubits(),
            });
        }

        let mut dag = circuit.to_dag()?;
        let referenced = dag.qubits_used();
        let mut properties = PropertySet::new().with_backend(Arc::clone(&self.backend));

        match cancel {
            Some(flag) => self.flow.run_cancellable(&mut dag, &mut properties, flag)?,
            None => self.flow.run(&mut dag, &mut properties)?,
        }

        let result = self.collect(circuit.name(), &dag, &properties, &referenced)?;
        info!(
            "Transpiled '{}': {} ops, depth {}, {} swaps",
            circuit.name(),
            result.stats.num_ops,
            result.stats.depth,
            result.stats.swaps_inserted
        );
        Ok(result)
    }

    fn collect(
        &self,
        name: &str,
        dag: &CircuitDag,
        properties: &PropertySet,
        referenced: &BTreeSet<QubitId>,
    ) -> CompileResult<TranspileResult> {
        let restrict = |layout: Option<&Layout>| -> BTreeMap<u32, u32> {
            referenced
                .iter()
                .map(|&q| (q.0, layout.and_then(|l| l.get_physical(q)).unwrap_or(q.0)))
                .collect()
        };
        let initial_layout = restrict(properties.initial_layout.as_ref());
        let final_layout = restrict(
            properties
                .final_layout
                .as_ref()
                .or(properties.initial_layout.as_ref()),
        );

        let ops = dag.linearize()?;
        let mut measurement_map = BTreeMap::new();
        let mut two_qubit_gates = 0usize;
        let mut estimated_fidelity = Some(1.0f64);
        for inst in &ops {
            match inst.kind {
                InstructionKind::Measure => {
                    for (q, c) in inst.qubits.iter().zip(&inst.clbits) {
                        measurement_map.insert(q.0, c.0);
                    }
                }
                InstructionKind::Gate(_) if inst.qubits.len() == 2 => {
                    two_qubit_gates += 1;
                    let (a, b) = (inst.qubits[0].0, inst.qubits[1].0);
                    estimated_fidelity = estimated_fidelity
                        .zip(self.backend.edge_fidelity(a, b))
                        .map(|(product, link)| product * link);
                }
                _ => {}
            }
        }

        let stats = TranspileStats {
            gate_counts: dag.count_ops(),
            depth: dag.depth(),
            num_ops: dag.num_ops(),
            two_qubit_gates,
            swaps_inserted: properties
                .get::<RoutingStats>()
                .map_or(0, |s| s.swaps_inserted),
            estimated_fidelity,
        };

        Ok(TranspileResult {
            circuit: Circuit::from_dag(name, dag)?,
            initial_layout,
            final_layout,
            measurement_map,
            stats,
        })
    }
}
