//! Target device model: connectivity, link fidelities and native gates.
//!
//! A [`BackendModel`] is built once and shared read-only between
//! compilations. All-pairs tables are derived at construction:
//!
//! - hop distance and next-hop predecessors, by BFS from every qubit
//! - fidelity distance, by Floyd–Warshall over `-ln(fidelity)` edge weights
//! - connected-component ids
//!
//! Connectivity is undirected for routing purposes; an edge given as
//! `(a, b)` allows two-qubit operations in either operand order.

use std::collections::VecDeque;

use ndarray::Array2;
use petgraph::unionfind::UnionFind;
use qtrans_ir::Instruction;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};
use crate::synthesis::EulerBasis;

/// Fidelity used by the topology factories.
pub const DEFAULT_FIDELITY: f64 = 0.99;

/// Operations every backend executes regardless of its gate list.
const ALWAYS_NATIVE: [&str; 4] = ["measure", "barrier", "reset", "delay"];

/// Basis gates for the target device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasisGates {
    /// List of gate names in the basis.
    gates: Vec<String>,
}

impl BasisGates {
    /// Create a new basis gates set.
    pub fn new(gates: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            gates: gates.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if a gate name is in the basis.
    pub fn contains(&self, gate: &str) -> bool {
        ALWAYS_NATIVE.contains(&gate) || self.gates.iter().any(|g| g == gate)
    }

    /// Get the basis gates.
    pub fn gates(&self) -> &[String] {
        &self.gates
    }

    /// IBM-style basis (CX + RZ + SX + X).
    pub fn ibm() -> Self {
        Self::new(["cx", "rz", "sx", "x"])
    }

    /// CZ-based basis.
    pub fn cz() -> Self {
        Self::new(["cz", "rx", "ry", "rz"])
    }

    /// iSWAP-based basis.
    pub fn iswap() -> Self {
        Self::new(["iswap", "rx", "ry", "rz"])
    }

    /// Every standard gate.
    pub fn universal() -> Self {
        Self::new([
            "id", "x", "y", "z", "h", "s", "sdg", "t", "tdg", "sx", "sxdg", "rx", "ry", "rz", "p",
            "u", "cx", "cy", "cz", "ch", "swap", "iswap", "crx", "cry", "crz", "cp", "rxx", "ryy",
            "rzz", "ccx", "cswap", "mcx", "mcry", "mcu",
        ])
    }

    /// Euler family whose gates are all native, preferring the cheapest.
    pub fn euler_basis(&self) -> Option<EulerBasis> {
        [
            EulerBasis::U3,
            EulerBasis::ZSX,
            EulerBasis::ZYZ,
            EulerBasis::ZXZ,
            EulerBasis::XYX,
        ]
        .into_iter()
        .find(|basis| basis.gate_names().iter().all(|g| self.contains(g)))
    }
}

impl Default for BasisGates {
    /// CX + RX + RY + RZ + ID.
    fn default() -> Self {
        Self::new(["cx", "rx", "ry", "rz", "id"])
    }
}

/// One coupling edge with its two-qubit gate fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coupling {
    /// First physical qubit.
    pub source: u32,
    /// Second physical qubit.
    pub target: u32,
    /// Two-qubit gate fidelity in `(0, 1]`.
    pub fidelity: f64,
}

/// Immutable description of a quantum processor.
#[derive(Debug, Clone)]
pub struct BackendModel {
    name: String,
    num_qubits: u32,
    couplings: Vec<Coupling>,
    basis: BasisGates,
    positions: Option<Vec<(i32, i32)>>,
    /// Sorted neighbor lists.
    adjacency: Vec<Vec<u32>>,
    /// Fidelity per unordered pair, keyed `(min, max)`.
    link_fidelity: FxHashMap<(u32, u32), f64>,
    hops: Array2<u32>,
    /// `next_hop[[from, to]]` is the first step on a shortest path.
    next_hop: Array2<u32>,
    fidelity_dist: Array2<f64>,
    components: Vec<u32>,
}

impl BackendModel {
    /// Build a backend from `(i, j, fidelity)` triples.
    ///
    /// Fails on an out-of-range index, a self-loop or a fidelity outside
    /// `(0, 1]`. A repeated pair keeps its first fidelity.
    pub fn new(
        name: impl Into<String>,
        num_qubits: u32,
        edges: impl IntoIterator<Item = (u32, u32, f64)>,
        basis: BasisGates,
    ) -> CompileResult<Self> {
        let mut couplings = Vec::new();
        for (source, target, fidelity) in edges {
            if source >= num_qubits || target >= num_qubits {
                return Err(CompileError::InvalidConfiguration(format!(
                    "edge ({source}, {target}) out of range for {num_qubits} qubits"
                )));
            }
            if source == target {
                return Err(CompileError::InvalidConfiguration(format!(
                    "self-loop on qubit {source}"
                )));
            }
            if !(fidelity > 0.0 && fidelity <= 1.0) {
                return Err(CompileError::InvalidConfiguration(format!(
                    "fidelity {fidelity} of edge ({source}, {target}) outside (0, 1]"
                )));
            }
            couplings.push(Coupling {
                source,
                target,
                fidelity,
            });
        }
        Ok(Self::build(name.into(), num_qubits, couplings, basis))
    }

    fn build(name: String, num_qubits: u32, edges: Vec<Coupling>, basis: BasisGates) -> Self {
        let n = num_qubits as usize;
        let mut couplings = Vec::with_capacity(edges.len());
        let mut link_fidelity = FxHashMap::default();
        let mut adjacency = vec![Vec::new(); n];
        for edge in edges {
            let key = (edge.source.min(edge.target), edge.source.max(edge.target));
            if link_fidelity.contains_key(&key) {
                continue;
            }
            link_fidelity.insert(key, edge.fidelity);
            adjacency[edge.source as usize].push(edge.target);
            adjacency[edge.target as usize].push(edge.source);
            couplings.push(edge);
        }
        for list in &mut adjacency {
            list.sort_unstable();
        }

        let (hops, next_hop) = Self::bfs_tables(&adjacency);
        let fidelity_dist = Self::floyd_warshall(n, &link_fidelity);

        let mut union = UnionFind::<usize>::new(n);
        for &(a, b) in link_fidelity.keys() {
            union.union(a as usize, b as usize);
        }
        // Relabel roots densely in qubit order so ids are deterministic.
        let mut labels = FxHashMap::default();
        let components = (0..n)
            .map(|q| {
                let next = u32::try_from(labels.len()).unwrap_or(u32::MAX);
                *labels.entry(union.find(q)).or_insert(next)
            })
            .collect();

        Self {
            name,
            num_qubits,
            couplings,
            basis,
            positions: None,
            adjacency,
            link_fidelity,
            hops,
            next_hop,
            fidelity_dist,
            components,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn bfs_tables(adjacency: &[Vec<u32>]) -> (Array2<u32>, Array2<u32>) {
        let n = adjacency.len();
        let mut hops = Array2::from_elem((n, n), u32::MAX);
        let mut next_hop = Array2::from_elem((n, n), u32::MAX);

        // BFS from each target; the parent pointer towards the target is
        // the next hop from any node on the way.
        for dst in 0..n {
            hops[[dst, dst]] = 0;
            next_hop[[dst, dst]] = dst as u32;
            let mut queue = VecDeque::from([dst]);
            while let Some(current) = queue.pop_front() {
                for &neighbor in &adjacency[current] {
                    let nb = neighbor as usize;
                    if hops[[nb, dst]] == u32::MAX {
                        hops[[nb, dst]] = hops[[current, dst]] + 1;
                        next_hop[[nb, dst]] = current as u32;
                        queue.push_back(nb);
                    }
                }
            }
        }
        (hops, next_hop)
    }

    fn floyd_warshall(n: usize, links: &FxHashMap<(u32, u32), f64>) -> Array2<f64> {
        let mut dist = Array2::from_elem((n, n), f64::INFINITY);
        for i in 0..n {
            dist[[i, i]] = 0.0;
        }
        for (&(a, b), &f) in links {
            let w = -f.ln();
            let (a, b) = (a as usize, b as usize);
            dist[[a, b]] = dist[[a, b]].min(w);
            dist[[b, a]] = dist[[b, a]].min(w);
        }
        for k in 0..n {
            for i in 0..n {
                let ik = dist[[i, k]];
                if ik.is_infinite() {
                    continue;
                }
                for j in 0..n {
                    let through = ik + dist[[k, j]];
                    if through < dist[[i, j]] {
                        dist[[i, j]] = through;
                    }
                }
            }
        }
        dist
    }

    /// Attach a 2-D embedding, one `(row, column)` per qubit.
    pub fn with_positions(mut self, positions: Vec<(i32, i32)>) -> CompileResult<Self> {
        if positions.len() != self.num_qubits as usize {
            return Err(CompileError::InvalidConfiguration(format!(
                "{} positions for {} qubits",
                positions.len(),
                self.num_qubits
            )));
        }
        self.positions = Some(positions);
        Ok(self)
    }

    /// Replace the native gate set.
    #[must_use]
    pub fn with_basis(mut self, basis: BasisGates) -> Self {
        self.basis = basis;
        self
    }

    /// Create a linear coupling map (0-1-2-3-...).
    pub fn linear(n: u32) -> Self {
        let edges = (1..n).map(|i| (i - 1, i)).collect::<Vec<_>>();
        Self::uniform(format!("linear_{n}"), n, edges)
    }

    /// Create a ring: a line whose ends are joined.
    pub fn ring(n: u32) -> Self {
        let mut edges = (1..n).map(|i| (i - 1, i)).collect::<Vec<_>>();
        if n > 2 {
            edges.push((n - 1, 0));
        }
        Self::uniform(format!("ring_{n}"), n, edges)
    }

    /// Create a star topology (center qubit connected to all others).
    pub fn star(n: u32) -> Self {
        let edges = (1..n).map(|i| (0, i)).collect::<Vec<_>>();
        Self::uniform(format!("star_{n}"), n, edges)
    }

    /// Create a rectangular grid, numbered row-major, with positions.
    #[allow(clippy::cast_possible_wrap)]
    pub fn grid(rows: u32, cols: u32) -> Self {
        let mut edges = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                let q = r * cols + c;
                if c + 1 < cols {
                    edges.push((q, q + 1));
                }
                if r + 1 < rows {
                    edges.push((q, q + cols));
                }
            }
        }
        let mut model = Self::uniform(format!("grid_{rows}x{cols}"), rows * cols, edges);
        model.positions = Some(
            (0..rows)
                .flat_map(|r| (0..cols).map(move |c| (r as i32, c as i32)))
                .collect(),
        );
        model
    }

    /// Create a fully connected coupling map.
    pub fn full(n: u32) -> Self {
        let edges = (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .collect::<Vec<_>>();
        Self::uniform(format!("full_{n}"), n, edges)
    }

    fn uniform(name: String, n: u32, edges: Vec<(u32, u32)>) -> Self {
        let couplings = edges
            .into_iter()
            .map(|(source, target)| Coupling {
                source,
                target,
                fidelity: DEFAULT_FIDELITY,
            })
            .collect();
        Self::build(name, n, couplings, BasisGates::default())
    }

    /// Backend name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of physical qubits.
    #[inline]
    pub fn num_qubits(&self) -> u32 {
        self.num_qubits
    }

    /// Get the coupling edges, duplicates removed.
    pub fn couplings(&self) -> &[Coupling] {
        &self.couplings
    }

    /// The native gate set.
    pub fn basis(&self) -> &BasisGates {
        &self.basis
    }

    /// Optional `(row, column)` per qubit.
    pub fn positions(&self) -> Option<&[(i32, i32)]> {
        self.positions.as_deref()
    }

    /// Neighbors of a qubit in ascending order.
    pub fn neighbors(&self, qubit: u32) -> &[u32] {
        self.adjacency
            .get(qubit as usize)
            .map_or(&[], Vec::as_slice)
    }

    /// Check if two qubits are directly connected.
    #[inline]
    pub fn is_adjacent(&self, q1: u32, q2: u32) -> bool {
        self.link_fidelity
            .contains_key(&(q1.min(q2), q1.max(q2)))
    }

    /// Fidelity of the link between two qubits, if they are coupled.
    pub fn edge_fidelity(&self, q1: u32, q2: u32) -> Option<f64> {
        self.link_fidelity.get(&(q1.min(q2), q1.max(q2))).copied()
    }

    /// Mean fidelity over all links, 1.0 without links.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_fidelity(&self) -> f64 {
        if self.link_fidelity.is_empty() {
            return 1.0;
        }
        self.link_fidelity.values().sum::<f64>() / self.link_fidelity.len() as f64
    }

    /// Shortest-path hop count, `None` when unreachable or out of range.
    pub fn distance(&self, from: u32, to: u32) -> Option<u32> {
        let d = *self.hops.get([from as usize, to as usize])?;
        (d != u32::MAX).then_some(d)
    }

    /// Smallest summed `-ln(fidelity)` over any path.
    pub fn fidelity_distance(&self, from: u32, to: u32) -> Option<f64> {
        let d = *self.fidelity_dist.get([from as usize, to as usize])?;
        d.is_finite().then_some(d)
    }

    /// A shortest hop path `from → to`, both ends included.
    pub fn shortest_path(&self, from: u32, to: u32) -> Option<Vec<u32>> {
        self.distance(from, to)?;
        let mut path = vec![from];
        let mut current = from;
        while current != to {
            current = self.next_hop[[current as usize, to as usize]];
            path.push(current);
        }
        Some(path)
    }

    /// Connected-component id of a qubit; ids are dense and ordered by
    /// their smallest member.
    pub fn component(&self, qubit: u32) -> Option<u32> {
        self.components.get(qubit as usize).copied()
    }

    /// Number of connected components.
    pub fn num_components(&self) -> usize {
        self.components
            .iter()
            .copied()
            .max()
            .map_or(0, |m| m as usize + 1)
    }

    /// Whether the device executes `instruction` without decomposition.
    ///
    /// Measure, barrier, reset and delay are always native.
    pub fn is_native(&self, instruction: &Instruction) -> bool {
        self.basis.contains(instruction.name())
    }
}
