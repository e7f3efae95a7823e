//! SABRE swap search.
//!
//! The search works on a compact copy of the circuit DAG: one entry per
//! operation with its logical operands and its operation neighbours in
//! both directions, so the same structure serves forward and reverse
//! sweeps.
//!
//! Each sweep keeps a front layer of operations whose predecessors have
//! all been committed. Executable front operations are committed; when
//! none is executable, the swap on a coupling edge touching the front
//! layer with the lowest score is applied. Scores combine the mean cost
//! of the front layer, a weighted mean over an extended window of
//! upcoming two-qubit gates, and a per-qubit decay that discourages
//! swapping the same qubits over and over.

use std::cmp::Ordering;

use qtrans_ir::{CircuitDag, Instruction, QubitId, StandardGate};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::backend::BackendModel;
use crate::config::{Heuristic, ResolvedSabre};
use crate::error::{CompileError, CompileResult};
use crate::property::Layout;

/// Two scores closer than this count as equal.
const SCORE_EPSILON: f64 = 1e-12;

/// A swap costs three CX on the same link.
const SWAP_CX_COUNT: f64 = 3.0;

/// Sweep direction over the DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    Reverse,
}

#[derive(Debug, Clone)]
struct SabreNode {
    instruction: Instruction,
    /// Operands as logical indices.
    qubits: Vec<u32>,
    /// Needs its operands adjacent before it can run.
    needs_adjacency: bool,
    successors: Vec<usize>,
    predecessors: Vec<usize>,
}

/// The DAG in the shape the search needs.
#[derive(Debug, Clone)]
pub(crate) struct SabreDag {
    nodes: Vec<SabreNode>,
    num_clbits: usize,
    global_phase: f64,
}

impl SabreDag {
    /// Index the operations of `dag` in topological order.
    pub(crate) fn from_dag(dag: &CircuitDag) -> CompileResult<Self> {
        let order = dag.topological_op_nodes()?;
        let position: rustc_hash::FxHashMap<_, _> =
            order.iter().enumerate().map(|(i, &n)| (n, i)).collect();

        let mut nodes = Vec::with_capacity(order.len());
        for &node in &order {
            let instruction = dag
                .get_instruction(node)
                .cloned()
                .ok_or_else(|| CompileError::Internal(format!("stale node {node:?}")))?;
            if instruction.is_gate() && instruction.qubits.len() > 2 {
                return Err(CompileError::UnsupportedGate {
                    gate: instruction.name().to_string(),
                    reason: "routing needs gates on at most two qubits".into(),
                });
            }
            let index = |n| {
                position
                    .get(&n)
                    .copied()
                    .ok_or_else(|| CompileError::Internal(format!("unordered node {n:?}")))
            };
            let successors = dag
                .op_successors(node)
                .into_iter()
                .map(index)
                .collect::<CompileResult<Vec<_>>>()?;
            let predecessors = dag
                .op_predecessors(node)
                .into_iter()
                .map(index)
                .collect::<CompileResult<Vec<_>>>()?;
            nodes.push(SabreNode {
                qubits: instruction.qubits.iter().map(|q| q.0).collect(),
                needs_adjacency: instruction.is_two_qubit_gate(),
                instruction,
                successors,
                predecessors,
            });
        }

        Ok(Self {
            nodes,
            num_clbits: dag.num_clbits(),
            global_phase: dag.global_phase(),
        })
    }

    fn next(&self, node: usize, direction: Direction) -> &[usize] {
        match direction {
            Direction::Forward => &self.nodes[node].successors,
            Direction::Reverse => &self.nodes[node].predecessors,
        }
    }

    fn prev(&self, node: usize, direction: Direction) -> &[usize] {
        match direction {
            Direction::Forward => &self.nodes[node].predecessors,
            Direction::Reverse => &self.nodes[node].successors,
        }
    }

    fn pair(&self, node: usize) -> [u32; 2] {
        let q = &self.nodes[node].qubits;
        [q[0], q[1]]
    }
}

/// Logical/physical permutation over every physical qubit.
///
/// Logical indices past the circuit width stand for idle physical qubits,
/// so any swap on a coupling edge is a plain permutation update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PhysicalLayout {
    logical_to_physical: Vec<u32>,
    physical_to_logical: Vec<u32>,
    num_logical: u32,
}

impl PhysicalLayout {
    /// Complete `layout` over `num_physical` qubits.
    ///
    /// Logical qubits `0..num_logical` must all be mapped to distinct
    /// physical qubits; the free physical qubits are taken in order.
    pub(crate) fn complete(
        layout: &Layout,
        num_logical: u32,
        num_physical: u32,
    ) -> CompileResult<Self> {
        if num_logical > num_physical {
            return Err(CompileError::InsufficientQubits {
                required: num_logical,
                available: num_physical,
            });
        }
        let mut physical_to_logical = vec![u32::MAX; num_physical as usize];
        let mut logical_to_physical = Vec::with_capacity(num_physical as usize);
        for logical in 0..num_logical {
            let physical = layout
                .get_physical(QubitId(logical))
                .filter(|&p| p < num_physical)
                .ok_or_else(|| {
                    CompileError::InvalidConfiguration(format!(
                        "layout does not place logical qubit {logical} on the backend"
                    ))
                })?;
            let slot = &mut physical_to_logical[physical as usize];
            if *slot != u32::MAX {
                return Err(CompileError::InvalidConfiguration(format!(
                    "layout places two logical qubits on physical qubit {physical}"
                )));
            }
            *slot = logical;
            logical_to_physical.push(physical);
        }
        let mut next_free = 0..num_physical;
        for logical in num_logical..num_physical {
            let physical = next_free
                .find(|&p| physical_to_logical[p as usize] == u32::MAX)
                .ok_or_else(|| CompileError::Internal("ran out of free physical qubits".into()))?;
            physical_to_logical[physical as usize] = logical;
            logical_to_physical.push(physical);
        }
        Ok(Self {
            logical_to_physical,
            physical_to_logical,
            num_logical,
        })
    }

    /// The circuit-width part as a [`Layout`].
    pub(crate) fn to_layout(&self) -> Layout {
        Layout::from_physical(&self.logical_to_physical[..self.num_logical as usize])
    }

    #[inline]
    fn physical(&self, logical: u32) -> u32 {
        self.logical_to_physical[logical as usize]
    }

    fn swap_physical(&mut self, p1: u32, p2: u32) {
        let l1 = self.physical_to_logical[p1 as usize];
        let l2 = self.physical_to_logical[p2 as usize];
        self.physical_to_logical.swap(p1 as usize, p2 as usize);
        self.logical_to_physical[l1 as usize] = p2;
        self.logical_to_physical[l2 as usize] = p1;
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone)]
pub(crate) struct Trial {
    /// Layout after the last operation.
    pub(crate) final_layout: PhysicalLayout,
    /// Operations over physical qubits, swaps included. Empty unless emitted.
    pub(crate) output: Vec<Instruction>,
    pub(crate) swaps: usize,
    pub(crate) forced_routes: usize,
    /// Summed `-ln(fidelity)` of every two-qubit gate and swap.
    pub(crate) fidelity_cost: f64,
}

impl Trial {
    /// Whether this trial beats `other` under `heuristic`.
    pub(crate) fn is_better_than(&self, other: &Trial, heuristic: Heuristic) -> bool {
        let by_cost = || self.fidelity_cost < other.fidelity_cost - SCORE_EPSILON;
        match heuristic {
            Heuristic::Fidelity => by_cost(),
            Heuristic::Distance | Heuristic::Mixture => match self.swaps.cmp(&other.swaps) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => by_cost(),
            },
        }
    }

    /// Materialize the emitted operations as a DAG over physical qubits.
    pub(crate) fn into_dag(self, dag: &SabreDag, num_physical: u32) -> CompileResult<CircuitDag> {
        let num_clbits = u32::try_from(dag.num_clbits)
            .map_err(|_| CompileError::Internal("classical register too wide".into()))?;
        let mut physical = CircuitDag::with_size(num_physical, num_clbits);
        physical.set_global_phase(dag.global_phase);
        for inst in self.output {
            physical.apply(inst)?;
        }
        Ok(physical)
    }
}

/// Swap score; `secondary` only breaks ties of `primary`.
#[derive(Debug, Clone, Copy)]
struct Score {
    primary: f64,
    secondary: f64,
}

impl Score {
    fn less_than(self, other: Score) -> bool {
        if (self.primary - other.primary).abs() > SCORE_EPSILON {
            self.primary < other.primary
        } else {
            self.secondary < other.secondary - SCORE_EPSILON
        }
    }
}

/// One SABRE sweep over `dag` starting from `layout`.
pub(crate) struct Sweep<'a> {
    dag: &'a SabreDag,
    backend: &'a BackendModel,
    config: &'a ResolvedSabre,
    direction: Direction,
    emit: bool,
}

impl<'a> Sweep<'a> {
    pub(crate) fn new(
        dag: &'a SabreDag,
        backend: &'a BackendModel,
        config: &'a ResolvedSabre,
        direction: Direction,
    ) -> Self {
        Self {
            dag,
            backend,
            config,
            direction,
            emit: false,
        }
    }

    /// Also collect the routed operations.
    #[must_use]
    pub(crate) fn emitting(mut self) -> Self {
        self.emit = true;
        self
    }

    /// Route every operation, starting from `layout`.
    pub(crate) fn run(&self, mut layout: PhysicalLayout) -> CompileResult<Trial> {
        self.check_reachable(&layout)?;

        let dag = self.dag;
        let n = dag.nodes.len();
        let num_physical = self.backend.num_qubits() as usize;
        let valve = 10 * num_physical.max(1);

        let mut remaining: Vec<usize> = (0..n)
            .map(|i| dag.prev(i, self.direction).len())
            .collect();
        let mut front: Vec<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
        if self.direction == Direction::Reverse {
            front.reverse();
        }

        let mut decay = vec![1.0f64; num_physical];
        let mut steps_since_reset = 0usize;
        let mut extended: Option<Vec<[u32; 2]>> = None;
        let mut pending: Vec<[u32; 2]> = Vec::new();

        let mut trial = Trial {
            final_layout: layout.clone(),
            output: Vec::new(),
            swaps: 0,
            forced_routes: 0,
            fidelity_cost: 0.0,
        };

        while !front.is_empty() {
            let (ready, blocked): (Vec<usize>, Vec<usize>) =
                front.iter().partition(|&&node| self.is_executable(node, &layout));

            if !ready.is_empty() {
                self.flush_swaps(&mut pending, &mut trial);
                front = blocked;
                for node in ready {
                    self.commit(node, &layout, &mut trial)?;
                    for &next in dag.next(node, self.direction) {
                        remaining[next] -= 1;
                        if remaining[next] == 0 {
                            front.push(next);
                        }
                    }
                }
                decay.fill(1.0);
                steps_since_reset = 0;
                extended = None;
                continue;
            }

            if pending.len() > valve {
                warn!(
                    "SABRE made no progress after {} swaps; forcing a route",
                    pending.len()
                );
                for &[p1, p2] in pending.iter().rev() {
                    layout.swap_physical(p1, p2);
                }
                pending = self.force_route(&front, &mut layout)?;
                trial.forced_routes += 1;
                continue;
            }

            let window = extended.get_or_insert_with(|| self.extended_set(&front, &remaining));
            let [p1, p2] = self.best_swap(&front, window, &mut layout, &decay)?;
            layout.swap_physical(p1, p2);
            pending.push([p1, p2]);

            steps_since_reset += 1;
            if steps_since_reset >= self.config.decay_reset_interval {
                decay.fill(1.0);
                steps_since_reset = 0;
            } else {
                decay[p1 as usize] += self.config.decay_delta;
                decay[p2 as usize] += self.config.decay_delta;
            }
        }

        trial.final_layout = layout;
        Ok(trial)
    }

    /// Interacting qubits must share a connected component; swaps never
    /// move a qubit across components.
    fn check_reachable(&self, layout: &PhysicalLayout) -> CompileResult<()> {
        for (i, node) in self.dag.nodes.iter().enumerate() {
            if !node.needs_adjacency {
                continue;
            }
            let [a, b] = self.dag.pair(i);
            let (pa, pb) = (layout.physical(a), layout.physical(b));
            if self.backend.component(pa) != self.backend.component(pb) {
                return Err(CompileError::UnreachableLayout(format!(
                    "'{}' on q{a} and q{b}: physical qubits {pa} and {pb} are in disconnected parts of '{}'",
                    node.instruction.name(),
                    self.backend.name()
                )));
            }
        }
        Ok(())
    }

    fn is_executable(&self, node: usize, layout: &PhysicalLayout) -> bool {
        if !self.dag.nodes[node].needs_adjacency {
            return true;
        }
        let [a, b] = self.dag.pair(node);
        self.backend
            .is_adjacent(layout.physical(a), layout.physical(b))
    }

    fn commit(&self, node: usize, layout: &PhysicalLayout, trial: &mut Trial) -> CompileResult<()> {
        let entry = &self.dag.nodes[node];
        if entry.needs_adjacency {
            let [a, b] = self.dag.pair(node);
            trial.fidelity_cost += self.link_cost(layout.physical(a), layout.physical(b))?;
        }
        if self.emit {
            trial
                .output
                .push(entry.instruction.map_qubits(|q| QubitId(layout.physical(q.0))));
        }
        Ok(())
    }

    fn flush_swaps(&self, pending: &mut Vec<[u32; 2]>, trial: &mut Trial) {
        for [p1, p2] in pending.drain(..) {
            trial.swaps += 1;
            trial.fidelity_cost += self
                .backend
                .edge_fidelity(p1, p2)
                .map_or(0.0, |f| -SWAP_CX_COUNT * f.ln());
            if self.emit {
                trial.output.push(Instruction::two_qubit_gate(
                    StandardGate::Swap,
                    QubitId(p1),
                    QubitId(p2),
                ));
            }
        }
    }

    fn link_cost(&self, p1: u32, p2: u32) -> CompileResult<f64> {
        self.backend
            .edge_fidelity(p1, p2)
            .map(|f| -f.ln())
            .ok_or_else(|| CompileError::Internal(format!("committed gate on uncoupled {p1}-{p2}")))
    }

    /// Up to `extended_set_size` two-qubit gates that become ready once the
    /// current front layer is done, breadth first.
    fn extended_set(&self, front: &[usize], remaining: &[usize]) -> Vec<[u32; 2]> {
        let limit = self.config.extended_set_size;
        let mut remaining = remaining.to_vec();
        let mut window = Vec::new();
        let mut layer: Vec<usize> = front.to_vec();
        while !layer.is_empty() && window.len() < limit {
            let mut next_layer = Vec::new();
            for &node in &layer {
                for &next in self.dag.next(node, self.direction) {
                    remaining[next] -= 1;
                    if remaining[next] == 0 {
                        next_layer.push(next);
                        if self.dag.nodes[next].needs_adjacency {
                            window.push(self.dag.pair(next));
                            if window.len() >= limit {
                                return window;
                            }
                        }
                    }
                }
            }
            layer = next_layer;
        }
        window
    }

    /// Candidate swaps in discovery order: every coupling edge touching a
    /// physical qubit of a blocked front gate.
    fn candidates(&self, front: &[usize], layout: &PhysicalLayout) -> Vec<[u32; 2]> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        for &node in front {
            if !self.dag.nodes[node].needs_adjacency {
                continue;
            }
            for logical in self.dag.pair(node) {
                let p = layout.physical(logical);
                for &neighbor in self.backend.neighbors(p) {
                    let edge = [p.min(neighbor), p.max(neighbor)];
                    if seen.insert(edge) {
                        out.push(edge);
                    }
                }
            }
        }
        out
    }

    fn best_swap(
        &self,
        front: &[usize],
        extended: &[[u32; 2]],
        layout: &mut PhysicalLayout,
        decay: &[f64],
    ) -> CompileResult<[u32; 2]> {
        let gates: Vec<[u32; 2]> = front
            .iter()
            .filter(|&&n| self.dag.nodes[n].needs_adjacency)
            .map(|&n| self.dag.pair(n))
            .collect();

        let mut best: Option<([u32; 2], Score)> = None;
        for swap in self.candidates(front, layout) {
            layout.swap_physical(swap[0], swap[1]);
            let score = self.score(&gates, extended, layout, swap, decay);
            layout.swap_physical(swap[0], swap[1]);
            if best.is_none_or(|(_, current)| score.less_than(current)) {
                best = Some((swap, score));
            }
        }

        let (swap, score) = best.ok_or_else(|| {
            CompileError::UnreachableLayout("blocked front layer has no candidate swap".into())
        })?;
        debug!(
            "SABRE swap ({}, {}) score {:.4}/{:.4}",
            swap[0], swap[1], score.primary, score.secondary
        );
        Ok(swap)
    }

    fn score(
        &self,
        front: &[[u32; 2]],
        extended: &[[u32; 2]],
        layout: &PhysicalLayout,
        swap: [u32; 2],
        decay: &[f64],
    ) -> Score {
        let hops = |a: u32, b: u32| self.backend.distance(a, b).map_or(f64::INFINITY, f64::from);
        let infidelity = |a: u32, b: u32| self.backend.fidelity_distance(a, b).unwrap_or(f64::INFINITY);
        let factor = decay[swap[0] as usize].max(decay[swap[1] as usize]);

        let distance_score = || factor * self.lookahead(front, extended, layout, hops);
        let fidelity_score = || {
            let swap_penalty = self
                .backend
                .edge_fidelity(swap[0], swap[1])
                .map_or(0.0, |f| -SWAP_CX_COUNT * f.ln());
            factor * self.lookahead(front, extended, layout, infidelity) + swap_penalty
        };

        match self.config.heuristic {
            Heuristic::Distance => Score {
                primary: distance_score(),
                secondary: 0.0,
            },
            Heuristic::Fidelity => Score {
                primary: fidelity_score(),
                secondary: 0.0,
            },
            Heuristic::Mixture => Score {
                primary: distance_score(),
                secondary: fidelity_score(),
            },
        }
    }

    fn lookahead(
        &self,
        front: &[[u32; 2]],
        extended: &[[u32; 2]],
        layout: &PhysicalLayout,
        metric: impl Fn(u32, u32) -> f64,
    ) -> f64 {
        let cost = |gates: &[[u32; 2]]| {
            gates
                .iter()
                .map(|&[a, b]| metric(layout.physical(a), layout.physical(b)))
                .sum::<f64>()
        };
        let mut total = cost(front) / front.len().max(1) as f64;
        if !extended.is_empty() {
            total += self.config.extended_set_weight * cost(extended) / extended.len() as f64;
        }
        total
    }

    /// Move the closest blocked gate's operands together along a shortest
    /// path, meeting in the middle. Returns the swaps applied.
    fn force_route(
        &self,
        front: &[usize],
        layout: &mut PhysicalLayout,
    ) -> CompileResult<Vec<[u32; 2]>> {
        let target = front
            .iter()
            .filter(|&&n| self.dag.nodes[n].needs_adjacency)
            .map(|&n| self.dag.pair(n))
            .min_by_key(|&[a, b]| {
                self.backend
                    .distance(layout.physical(a), layout.physical(b))
                    .unwrap_or(u32::MAX)
            })
            .ok_or_else(|| CompileError::Internal("release valve with no blocked gate".into()))?;

        let [a, b] = target;
        let path = self
            .backend
            .shortest_path(layout.physical(a), layout.physical(b))
            .ok_or_else(|| {
                CompileError::UnreachableLayout(format!("no path between q{a} and q{b}"))
            })?;

        let mut swaps = Vec::new();
        let split = path.len() / 2;
        for window in path[..split].windows(2) {
            swaps.push([window[0], window[1]]);
        }
        for window in path[split..].windows(2).rev() {
            swaps.push([window[1], window[0]]);
        }
        // The final link is the gate itself.
        let needed = path.len().saturating_sub(2);
        let mut applied = Vec::with_capacity(needed);
        for swap in swaps {
            if applied.len() == needed {
                break;
            }
            layout.swap_physical(swap[0], swap[1]);
            applied.push(swap);
        }
        Ok(applied)
    }
}
