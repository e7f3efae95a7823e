//! SABRE layout and routing passes.

use qtrans_ir::CircuitDag;
use tracing::{debug, info};

use super::layout::{component_layout, initial_layout};
use crate::config::InitialLayoutStrategy;
use super::sabre::{Direction, PhysicalLayout, SabreDag, Sweep, Trial};
use crate::config::{Heuristic, SabreConfig};
use crate::error::{CompileError, CompileResult};
use crate::pass::{Pass, PassKind};
use crate::property::{PropertySet, RoutingStats};

fn logical_width(dag: &CircuitDag) -> CompileResult<u32> {
    u32::try_from(dag.num_qubits())
        .map_err(|_| CompileError::MalformedCircuit("qubit count overflows u32".into()))
}

/// Replace `dag` with the routed circuit and record the layouts.
fn install(
    dag: &mut CircuitDag,
    properties: &mut PropertySet,
    sabre_dag: &SabreDag,
    initial: &PhysicalLayout,
    trial: Trial,
    sweeps: usize,
    num_physical: u32,
) -> CompileResult<()> {
    let stats = RoutingStats {
        swaps_inserted: trial.swaps,
        sweeps,
        forced_routes: trial.forced_routes,
    };
    let final_layout = trial.final_layout.to_layout();
    *dag = trial.into_dag(sabre_dag, num_physical)?;
    properties.initial_layout = Some(initial.to_layout());
    properties.final_layout = Some(final_layout);
    properties.insert(stats);
    Ok(())
}

/// Single forward SABRE sweep from an existing layout.
///
/// Requires [`PropertySet::initial_layout`], normally from
/// [`TrivialLayout`](super::TrivialLayout). The DAG is rewritten over the
/// backend's physical qubits.
#[derive(Debug, Clone)]
pub struct SabreRouting {
    config: SabreConfig,
    heuristic: Heuristic,
}

impl SabreRouting {
    /// Route with `heuristic` unless `config` names one.
    pub fn new(config: SabreConfig, heuristic: Heuristic) -> Self {
        Self { config, heuristic }
    }
}

impl Default for SabreRouting {
    fn default() -> Self {
        Self::new(SabreConfig::default(), Heuristic::Distance)
    }
}

impl Pass for SabreRouting {
    fn name(&self) -> &'static str {
        "SabreRouting"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, dag: &mut CircuitDag, properties: &mut PropertySet) -> CompileResult<()> {
        let backend = properties
            .backend
            .clone()
            .ok_or(CompileError::MissingBackend)?;
        let layout = properties
            .initial_layout
            .as_ref()
            .ok_or(CompileError::MissingLayout)?;
        let config = self.config.resolve(&backend, self.heuristic);

        let start = PhysicalLayout::complete(layout, logical_width(dag)?, backend.num_qubits())?;
        let sabre_dag = SabreDag::from_dag(dag)?;
        let trial = Sweep::new(&sabre_dag, &backend, &config, Direction::Forward)
            .emitting()
            .run(start.clone())?;

        debug!(
            "SabreRouting inserted {} swaps, {} forced routes",
            trial.swaps, trial.forced_routes
        );
        install(dag, properties, &sabre_dag, &start, trial, 1, backend.num_qubits())
    }
}

/// Bidirectional SABRE layout search followed by routing.
///
/// Each iteration routes forward from the current layout, then backward
/// over the reversed DAG; the backward sweep's final layout seeds the next
/// iteration. The starting layout that routed best (fewest swaps, or
/// lowest fidelity cost under the fidelity heuristic) wins, and its
/// forward routing becomes the output DAG.
///
/// Starts from [`PropertySet::initial_layout`] when one is already set.
/// Otherwise the first layout follows [`SabreConfig::initial_layout`]; on a
/// backend with several connected parts it comes from
/// [`component_layout`] so interacting qubits share a part. A circuit
/// without multi-qubit gates keeps the trivial layout and is swept once.
#[derive(Debug, Clone)]
pub struct SabreLayout {
    config: SabreConfig,
    heuristic: Heuristic,
}

impl SabreLayout {
    /// Search with `heuristic` unless `config` names one.
    pub fn new(config: SabreConfig, heuristic: Heuristic) -> Self {
        Self { config, heuristic }
    }
}

impl Default for SabreLayout {
    fn default() -> Self {
        Self::new(SabreConfig::default(), Heuristic::Distance)
    }
}

impl Pass for SabreLayout {
    fn name(&self) -> &'static str {
        "SabreLayout"
    }

    fn kind(&self) -> PassKind {
        PassKind::Transformation
    }

    fn run(&self, dag: &mut CircuitDag, properties: &mut PropertySet) -> CompileResult<()> {
        let backend = properties
            .backend
            .clone()
            .ok_or(CompileError::MissingBackend)?;
        let config = self.config.resolve(&backend, self.heuristic);
        let num_logical = logical_width(dag)?;
        let num_physical = backend.num_qubits();

        // Without multi-qubit gates there is nothing to search for.
        let interacting = dag
            .op_nodes()
            .any(|(_, inst)| inst.is_gate() && inst.qubits.len() > 1);
        let iterations = if interacting { config.max_iterations } else { 1 };

        let seed_layout = match &properties.initial_layout {
            Some(layout) => layout.clone(),
            None if !interacting => initial_layout(
                InitialLayoutStrategy::Trivial,
                num_logical,
                num_physical,
                config.seed,
            )?,
            None if backend.num_components() > 1 => {
                component_layout(dag, &backend, config.initial_layout, config.seed)?
            }
            None => initial_layout(config.initial_layout, num_logical, num_physical, config.seed)?,
        };
        let mut layout = PhysicalLayout::complete(&seed_layout, num_logical, num_physical)?;
        let sabre_dag = SabreDag::from_dag(dag)?;

        let mut sweeps = 0usize;
        let mut best: Option<(PhysicalLayout, Trial)> = None;
        for iteration in 0..iterations {
            let forward = Sweep::new(&sabre_dag, &backend, &config, Direction::Forward)
                .emitting()
                .run(layout.clone())?;
            sweeps += 1;
            info!(
                "SABRE iteration {}: {} swaps, fidelity cost {:.4}",
                iteration, forward.swaps, forward.fidelity_cost
            );

            let end = forward.final_layout.clone();
            if best
                .as_ref()
                .is_none_or(|(_, current)| forward.is_better_than(current, config.heuristic))
            {
                best = Some((layout.clone(), forward));
            }

            if iteration + 1 < iterations {
                let backward =
                    Sweep::new(&sabre_dag, &backend, &config, Direction::Reverse).run(end)?;
                sweeps += 1;
                layout = backward.final_layout;
            }
        }

        let (initial, trial) =
            best.ok_or_else(|| CompileError::Internal("SABRE ran no iterations".into()))?;
        debug!(
            "SabreLayout kept a layout with {} swaps after {} sweeps",
            trial.swaps, sweeps
        );
        install(dag, properties, &sabre_dag, &initial, trial, sweeps, num_physical)
    }
}
