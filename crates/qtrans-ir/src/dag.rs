//! Dependency-graph circuit representation.
//!
//! Every operation is a node; an edge `u -> v` labelled with wire `w` means
//! `v` is the next operation on `w` after `u`. Each wire starts at an `In`
//! sentinel and ends at an `Out` sentinel, so an operation touching `k`
//! wires always has exactly `k` incoming and `k` outgoing edges.
//!
//! Nodes live in a [`StableDiGraph`], so removing or substituting a node
//! never invalidates the indices of other nodes held by a running pass.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::f64::consts::TAU;

use petgraph::Direction;
use petgraph::stable_graph::{EdgeIndex, NodeIndex as PetNodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;

use crate::error::{IrError, IrResult};
use crate::instruction::Instruction;
use crate::qubit::{ClbitId, QubitId, WireId};

/// Node index type for the circuit DAG.
pub type NodeIndex = PetNodeIndex<u32>;

const NO_ORDER: &[u32] = &[];

/// Position key used to break ties during linearization.
///
/// Appended operations get `[n]` for the n-th append. Operations created by
/// substituting a node with key `K` get `K ++ [i]`, so they sort exactly
/// where the replaced node sorted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeOrder(Vec<u32>);

impl NodeOrder {
    fn root(position: u32) -> Self {
        NodeOrder(vec![position])
    }

    fn child(&self, index: u32) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        NodeOrder(path)
    }

    /// The raw path.
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

/// An operation node.
#[derive(Debug, Clone, PartialEq)]
pub struct OpNode {
    /// The operation.
    pub instruction: Instruction,
    /// Insertion-order key.
    pub order: NodeOrder,
}

/// A node in the circuit DAG.
#[derive(Debug, Clone, PartialEq)]
pub enum DagNode {
    /// Input node for a wire.
    In(WireId),
    /// Output node for a wire.
    Out(WireId),
    /// Operation node.
    Op(OpNode),
}

impl DagNode {
    /// Check if this is an operation node.
    #[inline]
    pub fn is_op(&self) -> bool {
        matches!(self, DagNode::Op(_))
    }

    /// Get the instruction if this is an operation node.
    #[inline]
    pub fn instruction(&self) -> Option<&Instruction> {
        match self {
            DagNode::Op(op) => Some(&op.instruction),
            _ => None,
        }
    }
}

/// An edge in the circuit DAG representing a wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DagEdge {
    /// The wire this edge represents.
    pub wire: WireId,
}

/// DAG-based circuit representation with fixed qubit and clbit counts.
#[derive(Debug, Clone)]
pub struct CircuitDag {
    graph: StableDiGraph<DagNode, DagEdge, u32>,
    /// `(In, Out)` sentinels per qubit, indexed by qubit id.
    qubit_io: Vec<(NodeIndex, NodeIndex)>,
    /// `(In, Out)` sentinels per classical bit.
    clbit_io: Vec<(NodeIndex, NodeIndex)>,
    next_order: u32,
    global_phase: f64,
}

impl CircuitDag {
    /// Create an empty DAG over `num_qubits` qubits and `num_clbits` bits.
    pub fn with_size(num_qubits: u32, num_clbits: u32) -> Self {
        let mut graph = StableDiGraph::default();
        let mut wire = |w: WireId| {
            let input = graph.add_node(DagNode::In(w));
            let output = graph.add_node(DagNode::Out(w));
            graph.add_edge(input, output, DagEdge { wire: w });
            (input, output)
        };
        let qubit_io = (0..num_qubits)
            .map(|q| wire(WireId::Qubit(QubitId(q))))
            .collect();
        let clbit_io = (0..num_clbits)
            .map(|c| wire(WireId::Clbit(ClbitId(c))))
            .collect();
        Self {
            graph,
            qubit_io,
            clbit_io,
            next_order: 0,
            global_phase: 0.0,
        }
    }

    /// Build a DAG from an ordered gate sequence.
    ///
    /// Fails on the first instruction with an out-of-range or repeated
    /// operand, or with the wrong operand count for its gate.
    pub fn from_instructions(
        num_qubits: u32,
        num_clbits: u32,
        instructions: impl IntoIterator<Item = Instruction>,
    ) -> IrResult<Self> {
        let mut dag = Self::with_size(num_qubits, num_clbits);
        for inst in instructions {
            dag.apply(inst)?;
        }
        Ok(dag)
    }

    /// An empty DAG over the same registers, carrying the global phase.
    pub fn copy_empty_like(&self) -> Self {
        let mut dag = Self::with_size(self.num_qubits_u32(), self.num_clbits_u32());
        dag.global_phase = self.global_phase;
        dag
    }

    #[allow(clippy::cast_possible_truncation)]
    fn num_qubits_u32(&self) -> u32 {
        self.qubit_io.len() as u32
    }

    #[allow(clippy::cast_possible_truncation)]
    fn num_clbits_u32(&self) -> u32 {
        self.clbit_io.len() as u32
    }

    fn io(&self, wire: WireId) -> Option<(NodeIndex, NodeIndex)> {
        match wire {
            WireId::Qubit(q) => self.qubit_io.get(q.index()).copied(),
            WireId::Clbit(c) => self.clbit_io.get(c.index()).copied(),
        }
    }

    fn wire_edge(
        &self,
        node: NodeIndex,
        wire: WireId,
        dir: Direction,
    ) -> Option<(EdgeIndex, NodeIndex)> {
        self.graph
            .edges_directed(node, dir)
            .find(|e| e.weight().wire == wire)
            .map(|e| {
                let other = match dir {
                    Direction::Incoming => e.source(),
                    Direction::Outgoing => e.target(),
                };
                (e.id(), other)
            })
    }

    fn broken_wire(node: NodeIndex, wire: WireId) -> IrError {
        IrError::InvalidDag(format!("wire {wire} is not connected at node {node:?}"))
    }

    /// Append an instruction after everything already on its wires.
    pub fn apply(&mut self, instruction: Instruction) -> IrResult<NodeIndex> {
        instruction.validate(self.num_qubits_u32(), self.num_clbits_u32())?;

        let wires: Vec<WireId> = instruction.wires().collect();
        let order = NodeOrder::root(self.next_order);
        self.next_order += 1;
        let op_node = self.graph.add_node(DagNode::Op(OpNode { instruction, order }));

        for wire in wires {
            let (_, out_node) = self.io(wire).ok_or_else(|| Self::broken_wire(op_node, wire))?;
            let (edge, prev) = self
                .wire_edge(out_node, wire, Direction::Incoming)
                .ok_or_else(|| Self::broken_wire(out_node, wire))?;
            self.graph.remove_edge(edge);
            self.graph.add_edge(prev, op_node, DagEdge { wire });
            self.graph.add_edge(op_node, out_node, DagEdge { wire });
        }

        Ok(op_node)
    }

    /// Get a node by index.
    #[inline]
    pub fn node(&self, node: NodeIndex) -> Option<&DagNode> {
        self.graph.node_weight(node)
    }

    /// Get an instruction by node index.
    #[inline]
    pub fn get_instruction(&self, node: NodeIndex) -> Option<&Instruction> {
        self.graph.node_weight(node).and_then(DagNode::instruction)
    }

    /// The node right before `node` on `wire` (an op or the `In` sentinel).
    pub fn predecessor_on_wire(&self, node: NodeIndex, wire: WireId) -> Option<NodeIndex> {
        self.wire_edge(node, wire, Direction::Incoming).map(|(_, n)| n)
    }

    /// The node right after `node` on `wire` (an op or the `Out` sentinel).
    pub fn successor_on_wire(&self, node: NodeIndex, wire: WireId) -> Option<NodeIndex> {
        self.wire_edge(node, wire, Direction::Outgoing).map(|(_, n)| n)
    }

    /// The next operation on `wire`, skipping the `Out` sentinel.
    pub fn next_op_on_wire(&self, node: NodeIndex, wire: WireId) -> Option<NodeIndex> {
        self.successor_on_wire(node, wire)
            .filter(|&n| self.graph[n].is_op())
    }

    /// The previous operation on `wire`, skipping the `In` sentinel.
    pub fn prev_op_on_wire(&self, node: NodeIndex, wire: WireId) -> Option<NodeIndex> {
        self.predecessor_on_wire(node, wire)
            .filter(|&n| self.graph[n].is_op())
    }

    /// Distinct operation successors, in operand order.
    pub fn op_successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.op_neighbors(node, Direction::Outgoing)
    }

    /// Distinct operation predecessors, in operand order.
    pub fn op_predecessors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.op_neighbors(node, Direction::Incoming)
    }

    fn op_neighbors(&self, node: NodeIndex, dir: Direction) -> Vec<NodeIndex> {
        let Some(inst) = self.get_instruction(node) else {
            return vec![];
        };
        let mut out = Vec::with_capacity(inst.qubits.len() + inst.clbits.len());
        for wire in inst.wires() {
            if let Some((_, n)) = self.wire_edge(node, wire, dir) {
                if self.graph[n].is_op() && !out.contains(&n) {
                    out.push(n);
                }
            }
        }
        out
    }

    /// Remove an operation, reconnecting each of its wires around it.
    pub fn remove_op(&mut self, node: NodeIndex) -> IrResult<Instruction> {
        let wires: Vec<WireId> = self
            .get_instruction(node)
            .ok_or(IrError::InvalidNode)?
            .wires()
            .collect();

        let mut links = Vec::with_capacity(wires.len());
        for wire in wires {
            let prev = self
                .predecessor_on_wire(node, wire)
                .ok_or_else(|| Self::broken_wire(node, wire))?;
            let next = self
                .successor_on_wire(node, wire)
                .ok_or_else(|| Self::broken_wire(node, wire))?;
            links.push((prev, next, wire));
        }

        let Some(DagNode::Op(op)) = self.graph.remove_node(node) else {
            return Err(IrError::InvalidNode);
        };
        for (prev, next, wire) in links {
            self.graph.add_edge(prev, next, DagEdge { wire });
        }
        Ok(op.instruction)
    }

    /// Replace one operation with a sub-sequence spliced in its place.
    ///
    /// The replacement may only touch wires of the replaced node. An empty
    /// replacement is a removal. New nodes inherit the replaced node's
    /// position for linearization.
    pub fn substitute_node(
        &mut self,
        node: NodeIndex,
        replacement: impl IntoIterator<Item = Instruction>,
    ) -> IrResult<Vec<NodeIndex>> {
        let replacement: Vec<Instruction> = replacement.into_iter().collect();
        let count = replacement_width(replacement.len())?;
        let (order, wires) = match self.graph.node_weight(node) {
            Some(DagNode::Op(op)) => (op.order.clone(), op.instruction.wires().collect::<Vec<_>>()),
            _ => return Err(IrError::InvalidNode),
        };

        for inst in &replacement {
            inst.validate(self.num_qubits_u32(), self.num_clbits_u32())?;
            if let Some(stray) = inst.wires().find(|w| !wires.contains(w)) {
                return Err(IrError::InvalidDag(format!(
                    "replacement '{}' touches wire {stray} outside the substituted node",
                    inst.name()
                )));
            }
        }

        // (wire, cursor, successor) per wire of the old node.
        let mut ends = Vec::with_capacity(wires.len());
        for &wire in &wires {
            let prev = self
                .predecessor_on_wire(node, wire)
                .ok_or_else(|| Self::broken_wire(node, wire))?;
            let next = self
                .successor_on_wire(node, wire)
                .ok_or_else(|| Self::broken_wire(node, wire))?;
            ends.push((wire, prev, next));
        }
        self.graph.remove_node(node);

        let mut created = Vec::with_capacity(replacement.len());
        for (i, inst) in (0..count).zip(replacement) {
            let inst_wires: Vec<WireId> = inst.wires().collect();
            let child = order.child(i);
            let new_node = self.graph.add_node(DagNode::Op(OpNode {
                instruction: inst,
                order: child,
            }));
            for wire in inst_wires {
                if let Some(end) = ends.iter_mut().find(|(w, _, _)| *w == wire) {
                    self.graph.add_edge(end.1, new_node, DagEdge { wire });
                    end.1 = new_node;
                }
            }
            created.push(new_node);
        }

        for (wire, cursor, next) in ends {
            self.graph.add_edge(cursor, next, DagEdge { wire });
        }
        Ok(created)
    }

    /// Swap the instruction of a node for one over exactly the same wires.
    pub fn replace_op(&mut self, node: NodeIndex, instruction: Instruction) -> IrResult<()> {
        instruction.validate(self.num_qubits_u32(), self.num_clbits_u32())?;
        let Some(DagNode::Op(op)) = self.graph.node_weight_mut(node) else {
            return Err(IrError::InvalidNode);
        };
        let mut old: Vec<WireId> = op.instruction.wires().collect();
        let mut new: Vec<WireId> = instruction.wires().collect();
        old.sort_unstable();
        new.sort_unstable();
        if old != new {
            return Err(IrError::InvalidDag(format!(
                "replace_op: '{}' does not act on the wires of '{}'",
                instruction.name(),
                op.instruction.name()
            )));
        }
        op.instruction = instruction;
        Ok(())
    }

    fn sort_key(&self, node: NodeIndex) -> (u8, &[u32], NodeIndex) {
        match &self.graph[node] {
            DagNode::In(_) => (0, NO_ORDER, node),
            DagNode::Op(op) => (1, op.order.as_slice(), node),
            DagNode::Out(_) => (2, NO_ORDER, node),
        }
    }

    /// Kahn's algorithm; ties go to the smallest insertion key.
    ///
    /// On a cyclic graph the result is shorter than the node count.
    fn kahn_order(&self) -> Vec<NodeIndex> {
        let mut indegree: FxHashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.edges_directed(n, Direction::Incoming).count()))
            .collect();

        let mut heap: BinaryHeap<_> = indegree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&n, _)| Reverse(self.sort_key(n)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((_, _, node))) = heap.pop() {
            order.push(node);
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                let target = edge.target();
                if let Some(d) = indegree.get_mut(&target) {
                    *d -= 1;
                    if *d == 0 {
                        heap.push(Reverse(self.sort_key(target)));
                    }
                }
            }
        }
        order
    }

    /// Operation nodes in deterministic topological order.
    pub fn topological_op_nodes(&self) -> IrResult<Vec<NodeIndex>> {
        let order = self.kahn_order();
        if order.len() != self.graph.node_count() {
            return Err(IrError::InvalidDag("graph contains a cycle".into()));
        }
        Ok(order
            .into_iter()
            .filter(|&n| self.graph[n].is_op())
            .collect())
    }

    /// Operations in deterministic topological order.
    pub fn topological_ops(&self) -> IrResult<Vec<(NodeIndex, &Instruction)>> {
        Ok(self
            .topological_op_nodes()?
            .into_iter()
            .filter_map(|n| self.get_instruction(n).map(|inst| (n, inst)))
            .collect())
    }

    /// Flatten back to a gate sequence.
    ///
    /// Operations on disjoint wires come out in insertion order, so a DAG
    /// no pass has touched linearizes to its input sequence.
    pub fn linearize(&self) -> IrResult<Vec<Instruction>> {
        Ok(self
            .topological_ops()?
            .into_iter()
            .map(|(_, inst)| inst.clone())
            .collect())
    }

    /// The same circuit with its operation order reversed.
    ///
    /// Gates are not inverted; only the dependency structure is mirrored.
    pub fn reversed(&self) -> IrResult<Self> {
        let mut ops = self.linearize()?;
        ops.reverse();
        let mut dag = Self::from_instructions(self.num_qubits_u32(), self.num_clbits_u32(), ops)?;
        dag.global_phase = self.global_phase;
        Ok(dag)
    }

    /// Iterate over operation nodes in storage order.
    pub fn op_nodes(&self) -> impl Iterator<Item = (NodeIndex, &Instruction)> {
        self.graph
            .node_indices()
            .filter_map(|n| self.graph[n].instruction().map(|inst| (n, inst)))
    }

    /// Get the number of qubits.
    #[inline]
    pub fn num_qubits(&self) -> usize {
        self.qubit_io.len()
    }

    /// Get the number of classical bits.
    #[inline]
    pub fn num_clbits(&self) -> usize {
        self.clbit_io.len()
    }

    /// Get the number of operations.
    #[inline]
    pub fn num_ops(&self) -> usize {
        let io_nodes = 2 * (self.qubit_io.len() + self.clbit_io.len());
        self.graph.node_count().saturating_sub(io_nodes)
    }

    /// Qubits touched by at least one operation.
    pub fn qubits_used(&self) -> BTreeSet<QubitId> {
        self.op_nodes()
            .flat_map(|(_, inst)| inst.qubits.iter().copied())
            .collect()
    }

    /// Operation counts keyed by instruction name.
    pub fn count_ops(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (_, inst) in self.op_nodes() {
            *counts.entry(inst.name().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Longest chain of operations along any wire path.
    ///
    /// Barriers synchronize their wires without adding a layer.
    pub fn depth(&self) -> usize {
        let mut wire_depth: FxHashMap<WireId, usize> = FxHashMap::default();
        let mut max_depth = 0;
        for node in self.kahn_order() {
            let Some(inst) = self.get_instruction(node) else {
                continue;
            };
            let base = inst
                .wires()
                .map(|w| wire_depth.get(&w).copied().unwrap_or(0))
                .max()
                .unwrap_or(0);
            let d = if inst.is_barrier() { base } else { base + 1 };
            for w in inst.wires() {
                wire_depth.insert(w, d);
            }
            max_depth = max_depth.max(d);
        }
        max_depth
    }

    /// Get the global phase.
    pub fn global_phase(&self) -> f64 {
        self.global_phase
    }

    /// Set the global phase, normalized to `[0, 2π)`.
    pub fn set_global_phase(&mut self, phase: f64) {
        self.global_phase = phase.rem_euclid(TAU);
    }

    /// Accumulate a phase produced by a decomposition.
    pub fn add_global_phase(&mut self, delta: f64) {
        self.set_global_phase(self.global_phase + delta);
    }

    /// Check the structural invariants.
    ///
    /// - the graph is acyclic
    /// - every wire runs from its `In` to its `Out` sentinel
    /// - every operation has exactly one incoming and one outgoing edge per
    ///   wire it touches, and no others
    pub fn verify_integrity(&self) -> IrResult<()> {
        if self.kahn_order().len() != self.graph.node_count() {
            return Err(IrError::InvalidDag("graph contains a cycle".into()));
        }

        let wires = (0..self.num_qubits_u32())
            .map(|q| WireId::Qubit(QubitId(q)))
            .chain((0..self.num_clbits_u32()).map(|c| WireId::Clbit(ClbitId(c))));
        for wire in wires {
            let Some((input, output)) = self.io(wire) else {
                return Err(IrError::InvalidDag(format!("wire {wire} has no sentinels")));
            };
            let mut current = input;
            let mut steps = 0;
            while current != output {
                current = self
                    .successor_on_wire(current, wire)
                    .ok_or_else(|| Self::broken_wire(current, wire))?;
                steps += 1;
                if steps > self.graph.node_count() {
                    return Err(IrError::InvalidDag(format!("wire {wire} does not terminate")));
                }
            }
        }

        for (node, inst) in self.op_nodes() {
            let expected = inst.qubits.len() + inst.clbits.len();
            for dir in [Direction::Incoming, Direction::Outgoing] {
                let edges: Vec<WireId> = self
                    .graph
                    .edges_directed(node, dir)
                    .map(|e| e.weight().wire)
                    .collect();
                if edges.len() != expected || inst.wires().any(|w| !edges.contains(&w)) {
                    return Err(IrError::InvalidDag(format!(
                        "operation '{}' at {node:?} has edges {edges:?}",
                        inst.name()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Number of children a substitution creates under one [`NodeOrder`].
fn replacement_width(len: usize) -> IrResult<u32> {
    u32::try_from(len).map_err(|_| {
        IrError::InvalidDag(format!(
            "replacement of {len} operations does not fit one node position"
        ))
    })
}
