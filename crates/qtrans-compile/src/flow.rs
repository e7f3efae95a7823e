//! Pass flow for orchestrating compilation.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, instrument};

use qtrans_ir::CircuitDag;

use crate::config::{Heuristic, TranspileOptions};
use crate::error::{CompileError, CompileResult};
use crate::pass::{Pass, PassKind};
use crate::passes::{
    CouplingVerification, GateCombine, OneQubitOptimization, ParameterBinding, SabreLayout,
    UnrollTo2Qubit, UnrollToBasis,
};
use crate::property::PropertySet;

/// Rounds of the level 3 optimization loop.
pub const MAX_FIXED_POINT_ROUNDS: usize = 8;

/// An ordered sequence of compilation passes.
///
/// Passes run strictly in order over one DAG and one [`PropertySet`]. The
/// first failing pass stops the flow and its error is returned unchanged.
/// A flow holds no per-run state, so one `Arc<PassFlow>` can drive many
/// compilations on different threads.
pub struct PassFlow {
    /// The passes to execute, in order.
    passes: Vec<Box<dyn Pass>>,
}

impl PassFlow {
    /// Create a new empty flow.
    pub fn new() -> Self {
        Self { passes: vec![] }
    }

    /// Append a pass.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Run all passes on the given DAG.
    #[instrument(skip(self, dag, properties))]
    pub fn run(&self, dag: &mut CircuitDag, properties: &mut PropertySet) -> CompileResult<()> {
        self.run_inner(dag, properties, None)
    }

    /// Like [`run`](Self::run), checking `cancel` before every pass.
    ///
    /// A set flag stops the flow with [`CompileError::Cancelled`] naming the
    /// pass that would have run next. A pass that has started always
    /// finishes.
    #[instrument(skip(self, dag, properties, cancel))]
    pub fn run_cancellable(
        &self,
        dag: &mut CircuitDag,
        properties: &mut PropertySet,
        cancel: &AtomicBool,
    ) -> CompileResult<()> {
        self.run_inner(dag, properties, Some(cancel))
    }

    fn run_inner(
        &self,
        dag: &mut CircuitDag,
        properties: &mut PropertySet,
        cancel: Option<&AtomicBool>,
    ) -> CompileResult<()> {
        info!(
            "Running pass flow with {} passes on circuit with {} qubits",
            self.passes.len(),
            dag.num_qubits()
        );

        for pass in &self.passes {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(CompileError::Cancelled(pass.name().to_string()));
            }
            if pass.should_run(dag, properties) {
                debug!("Running pass: {}", pass.name());
                pass.run(dag, properties)?;
                debug!("Pass {} completed, ops: {}", pass.name(), dag.num_ops());
            } else {
                debug!("Skipping pass: {}", pass.name());
            }
        }

        info!(
            "Pass flow completed, final depth: {}, ops: {}",
            dag.depth(),
            dag.num_ops()
        );
        Ok(())
    }

    /// Names of the passes, in order.
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Get the number of passes.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if the flow has no passes.
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl Default for PassFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Repeats a group of passes until the operation count stops shrinking.
pub struct FixedPoint {
    passes: Vec<Box<dyn Pass>>,
    max_rounds: usize,
}

impl FixedPoint {
    /// Loop `passes` for at most `max_rounds` rounds.
    pub fn new(passes: Vec<Box<dyn Pass>>, max_rounds: usize) -> Self {
        Self {
            passes,
            max_rounds: max_rounds.max(1),
        }
    }
}

impl Pass for FixedPoint {
    fn name(&self) -> &'static str {
        "FixedPoint"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, dag: &mut CircuitDag, properties: &mut PropertySet) -> CompileResult<()> {
        for round in 0..self.max_rounds {
            let before = dag.num_ops();
            for pass in &self.passes {
                if pass.should_run(dag, properties) {
                    pass.run(dag, properties)?;
                }
            }
            debug!("FixedPoint round {}: {} -> {} ops", round, before, dag.num_ops());
            if dag.num_ops() >= before {
                break;
            }
        }
        Ok(())
    }
}

/// Builder for the preset flows.
///
/// | Level | Passes |
/// |-------|--------|
/// | 0 | UnrollTo2Qubit, UnrollToBasis |
/// | 1 | UnrollTo2Qubit, SabreLayout, UnrollToBasis, GateCombine, OneQubitOptimization, CouplingVerification |
/// | 2 | as 1, fidelity heuristic |
/// | 3 | as 1, mixture heuristic, optimization pair looped to a fixed point |
///
/// Every flow starts with [`ParameterBinding`] when bindings are configured.
/// Level 0 only rewrites gates: the circuit keeps its logical qubits and is
/// not checked against the coupling graph.
pub struct PassFlowBuilder {
    options: TranspileOptions,
}

impl PassFlowBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            options: TranspileOptions::default(),
        }
    }

    /// Set the optimization level, clamped to 3.
    #[must_use]
    pub fn with_optimization_level(mut self, level: u8) -> Self {
        self.options.optimization_level = level.min(3);
        self
    }

    /// Take every setting from `options`.
    #[must_use]
    pub fn with_options(mut self, options: TranspileOptions) -> Self {
        let level = options.optimization_level.min(3);
        self.options = options;
        self.options.optimization_level = level;
        self
    }

    /// Build the flow.
    pub fn build(self) -> PassFlow {
        let options = self.options;
        let level = options.optimization_level;
        let heuristic = Heuristic::for_level(level);
        let mut flow = PassFlow::new();

        if !options.parameters.is_empty() {
            flow.add_pass(ParameterBinding::new(options.parameters.clone()));
        }
        flow.add_pass(UnrollTo2Qubit);
        if level == 0 {
            flow.add_pass(UnrollToBasis::new().with_euler_basis(options.euler_basis));
            return flow;
        }

        flow.add_pass(SabreLayout::new(options.sabre.clone(), heuristic));
        flow.add_pass(UnrollToBasis::new().with_euler_basis(options.euler_basis));

        let optimize_1q = OneQubitOptimization::new().with_euler_basis(options.euler_basis);
        match level {
            1 | 2 => {
                flow.add_pass(GateCombine::new());
                flow.add_pass(optimize_1q);
            }
            _ => {
                let pair: Vec<Box<dyn Pass>> =
                    vec![Box::new(GateCombine::new()), Box::new(optimize_1q)];
                flow.add_pass(FixedPoint::new(pair, MAX_FIXED_POINT_ROUNDS));
            }
        }

        flow.add_pass(CouplingVerification);
        flow
    }
}

impl Default for PassFlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
