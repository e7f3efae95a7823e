//! Initial layout selection.

use std::collections::VecDeque;

use petgraph::unionfind::UnionFind;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use qtrans_ir::CircuitDag;

use crate::backend::BackendModel;
use crate::config::InitialLayoutStrategy;
use crate::error::{CompileError, CompileResult};
use crate::pass::{Pass, PassKind};
use crate::property::{Layout, PropertySet};

/// Starting layout of `num_logical` qubits on `num_physical`.
///
/// `Random` shuffles the physical qubits with a generator seeded by
/// `seed`, so the same seed always gives the same layout.
pub fn initial_layout(
    strategy: InitialLayoutStrategy,
    num_logical: u32,
    num_physical: u32,
    seed: u64,
) -> CompileResult<Layout> {
    if num_logical > num_physical {
        return Err(CompileError::InsufficientQubits {
            required: num_logical,
            available: num_physical,
        });
    }
    Ok(match strategy {
        InitialLayoutStrategy::Trivial => Layout::trivial(num_logical),
        InitialLayoutStrategy::Random => {
            let mut physical: Vec<u32> = (0..num_physical).collect();
            physical.shuffle(&mut StdRng::seed_from_u64(seed));
            physical.truncate(num_logical as usize);
            Layout::from_physical(&physical)
        }
    })
}

/// Starting layout that keeps every group of interacting logical qubits
/// inside one connected part of `backend`.
///
/// Groups are packed largest first, with backtracking, into the parts that
/// still have room; each group then takes a breadth-first run of its part
/// and idle qubits fill what is left. `Random` starts the runs at a seeded
/// random qubit and shuffles neighbours. Fails with
/// [`CompileError::UnreachableLayout`] only when no packing exists.
pub fn component_layout(
    dag: &CircuitDag,
    backend: &BackendModel,
    strategy: InitialLayoutStrategy,
    seed: u64,
) -> CompileResult<Layout> {
    let num_logical = dag.num_qubits();
    let num_physical = backend.num_qubits();
    if num_logical > num_physical as usize {
        return Err(CompileError::InsufficientQubits {
            required: u32::try_from(num_logical).unwrap_or(u32::MAX),
            available: num_physical,
        });
    }

    let groups = interaction_groups(dag);
    let mut rng = StdRng::seed_from_u64(seed);
    let parts: Vec<Vec<u32>> = (0..backend.num_components())
        .map(|part| breadth_first_run(backend, part, strategy, &mut rng))
        .collect();

    let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
    let mut free: Vec<usize> = parts.iter().map(Vec::len).collect();
    let mut assignment = Vec::with_capacity(groups.len());
    if !pack(&sizes, &mut free, &mut assignment) {
        return Err(CompileError::UnreachableLayout(format!(
            "interacting groups of {:?} qubits do not fit the connected parts of '{}' ({:?} qubits)",
            sizes,
            backend.name(),
            parts.iter().map(Vec::len).collect::<Vec<_>>()
        )));
    }

    let mut physical: Vec<Option<u32>> = vec![None; num_logical];
    let mut used = vec![0usize; parts.len()];
    for (group, &part) in groups.iter().zip(&assignment) {
        for &logical in group {
            physical[logical] = Some(parts[part][used[part]]);
            used[part] += 1;
        }
    }
    let mut spare = parts
        .iter()
        .zip(&used)
        .flat_map(|(part, &taken)| part[taken..].iter().copied());
    for slot in physical.iter_mut().filter(|slot| slot.is_none()) {
        *slot = spare.next();
    }

    let physical: Vec<u32> = physical
        .into_iter()
        .collect::<Option<_>>()
        .ok_or_else(|| CompileError::Internal("component layout ran out of qubits".into()))?;
    Ok(Layout::from_physical(&physical))
}

/// Logical qubits joined by multi-qubit gates, largest group first.
/// Qubits that interact with nobody are left out.
fn interaction_groups(dag: &CircuitDag) -> Vec<Vec<usize>> {
    let n = dag.num_qubits();
    let mut sets = UnionFind::new(n);
    for (_, inst) in dag.op_nodes() {
        if !inst.is_gate() {
            continue;
        }
        for pair in inst.qubits.windows(2) {
            sets.union(pair[0].index(), pair[1].index());
        }
    }

    let labels = sets.into_labeling();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut group_of: Vec<Option<usize>> = vec![None; n];
    for (logical, &root) in labels.iter().enumerate() {
        match group_of[root] {
            Some(g) => groups[g].push(logical),
            None => {
                group_of[root] = Some(groups.len());
                groups.push(vec![logical]);
            }
        }
    }
    groups.retain(|group| group.len() > 1);
    groups.sort_by(|a, b| b.len().cmp(&a.len()));
    groups
}

/// Physical qubits of one connected part in breadth-first order.
fn breadth_first_run(
    backend: &BackendModel,
    part: usize,
    strategy: InitialLayoutStrategy,
    rng: &mut StdRng,
) -> Vec<u32> {
    let members: Vec<u32> = (0..backend.num_qubits())
        .filter(|&q| backend.component(q).is_some_and(|c| c as usize == part))
        .collect();
    let start = match strategy {
        InitialLayoutStrategy::Trivial => members.first().copied(),
        InitialLayoutStrategy::Random => members.choose(rng).copied(),
    };
    let Some(start) = start else {
        return members;
    };

    let mut seen = vec![false; backend.num_qubits() as usize];
    let mut order = Vec::with_capacity(members.len());
    let mut queue = VecDeque::from([start]);
    seen[start as usize] = true;
    while let Some(q) = queue.pop_front() {
        order.push(q);
        let mut next: Vec<u32> = backend.neighbors(q).to_vec();
        if strategy == InitialLayoutStrategy::Random {
            next.shuffle(rng);
        }
        for n in next {
            if !seen[n as usize] {
                seen[n as usize] = true;
                queue.push_back(n);
            }
        }
    }
    order
}

/// Assign each size to a part with room; parts with equal room left are
/// interchangeable, so only one of them is tried per level.
fn pack(sizes: &[usize], free: &mut [usize], assignment: &mut Vec<usize>) -> bool {
    let Some(&size) = sizes.get(assignment.len()) else {
        return true;
    };
    let mut tried = Vec::new();
    for part in 0..free.len() {
        if free[part] < size || tried.contains(&free[part]) {
            continue;
        }
        tried.push(free[part]);
        free[part] -= size;
        assignment.push(part);
        if pack(sizes, free, assignment) {
            return true;
        }
        assignment.pop();
        free[part] += size;
    }
    false
}

/// Trivial layout pass.
///
/// Maps logical qubit i to physical qubit i.
pub struct TrivialLayout;

impl Pass for TrivialLayout {
    fn name(&self) -> &'static str {
        "TrivialLayout"
    }

    fn kind(&self) -> PassKind {
        PassKind::Analysis
    }

    fn run(&self, dag: &mut CircuitDag, properties: &mut PropertySet) -> CompileResult<()> {
        let backend = properties
            .backend
            .as_ref()
            .ok_or(CompileError::MissingBackend)?;
        let num_logical = u32::try_from(dag.num_qubits())
            .map_err(|_| CompileError::MalformedCircuit("qubit count overflows u32".into()))?;
        let layout = initial_layout(
            InitialLayoutStrategy::Trivial,
            num_logical,
            backend.num_qubits(),
            0,
        )?;
        properties.initial_layout = Some(layout);
        Ok(())
    }

    fn should_run(&self, _dag: &CircuitDag, properties: &PropertySet) -> bool {
        properties.initial_layout.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendModel;
    use qtrans_ir::{Circuit, QubitId};
    use std::sync::Arc;

    #[test]
    fn test_trivial_layout() {
        let mut circuit = Circuit::with_size("test", 3, 0);
        circuit.h(QubitId(0)).unwrap();
        let mut dag = circuit.to_dag().unwrap();
        let mut props = PropertySet::new().with_backend(Arc::new(BackendModel::linear(5)));

        TrivialLayout.run(&mut dag, &mut props).unwrap();

        let layout = props.initial_layout.as_ref().unwrap();
        assert_eq!(layout.len(), 3);
        assert_eq!(layout.get_physical(QubitId(2)), Some(2));
    }

    #[test]
    fn test_trivial_layout_too_large() {
        let mut dag = Circuit::with_size("test", 10, 0).to_dag().unwrap();
        let mut props = PropertySet::new().with_backend(Arc::new(BackendModel::linear(5)));

        let result = TrivialLayout.run(&mut dag, &mut props);
        assert!(matches!(
            result,
            Err(CompileError::InsufficientQubits {
                required: 10,
                available: 5
            })
        ));
    }

    #[test]
    fn test_random_layout_is_seeded() {
        let a = initial_layout(InitialLayoutStrategy::Random, 4, 8, 42).unwrap();
        let b = initial_layout(InitialLayoutStrategy::Random, 4, 8, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
        let mut physical: Vec<u32> = a.iter().map(|(_, p)| p).collect();
        physical.sort_unstable();
        physical.dedup();
        assert_eq!(physical.len(), 4);
        assert!(physical.iter().all(|&p| p < 8));
    }

    fn islands() -> BackendModel {
        BackendModel::new(
            "islands",
            5,
            [(0, 1, 0.99), (2, 3, 0.99), (3, 4, 0.99)],
            crate::backend::BasisGates::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_component_layout_keeps_groups_together() {
        let backend = islands();
        let mut circuit = Circuit::with_size("pairs", 4, 0);
        circuit.cx(QubitId(0), QubitId(2)).unwrap();
        circuit.cx(QubitId(2), QubitId(3)).unwrap();
        circuit.h(QubitId(1)).unwrap();
        let dag = circuit.to_dag().unwrap();

        for strategy in [InitialLayoutStrategy::Trivial, InitialLayoutStrategy::Random] {
            let layout = component_layout(&dag, &backend, strategy, 3).unwrap();
            assert_eq!(layout.len(), 4);
            let part = |q: u32| backend.component(layout.get_physical(QubitId(q)).unwrap());
            assert_eq!(part(0), part(2));
            assert_eq!(part(2), part(3));
            assert_eq!(part(0), backend.component(2));
        }
    }

    #[test]
    fn test_component_layout_places_largest_group_first() {
        // Parts of 2 and 3 qubits; groups of 2 and 3 fit only one way round.
        let backend = islands();
        let mut circuit = Circuit::with_size("groups", 5, 0);
        circuit.cx(QubitId(0), QubitId(1)).unwrap();
        circuit.cx(QubitId(2), QubitId(3)).unwrap();
        circuit.cx(QubitId(3), QubitId(4)).unwrap();
        let dag = circuit.to_dag().unwrap();
        let layout = component_layout(&dag, &backend, InitialLayoutStrategy::Trivial, 0).unwrap();
        let part = |q: u32| backend.component(layout.get_physical(QubitId(q)).unwrap());
        assert_eq!(part(0), part(1));
        assert_eq!(part(2), part(4));
        assert_ne!(part(0), part(2));
    }

    #[test]
    fn test_component_layout_rejects_oversized_group() {
        let backend = islands();
        let mut circuit = Circuit::with_size("chain", 4, 0);
        circuit.cx(QubitId(0), QubitId(1)).unwrap();
        circuit.cx(QubitId(1), QubitId(2)).unwrap();
        circuit.cx(QubitId(2), QubitId(3)).unwrap();
        let dag = circuit.to_dag().unwrap();
        assert!(matches!(
            component_layout(&dag, &backend, InitialLayoutStrategy::Trivial, 0),
            Err(CompileError::UnreachableLayout(_))
        ));
    }

    #[test]
    fn test_pack_backtracks() {
        // First fit would put both triples in the first part and strand a pair.
        let mut free = vec![7, 5];
        let mut assignment = Vec::new();
        assert!(pack(&[3, 3, 2, 2, 2], &mut free, &mut assignment));
        assert_eq!(assignment, vec![0, 1, 0, 0, 1]);
        assert_eq!(free, vec![0, 0]);

        let mut free = vec![3, 3];
        let mut assignment = Vec::new();
        assert!(!pack(&[4], &mut free, &mut assignment));
    }
}
