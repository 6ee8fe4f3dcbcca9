//! Dependency resolution over stage specifications.
//!
//! [`resolve_order`] builds a directed acyclic graph over a stage set and
//! yields one valid execution order: every stage appears after all stages
//! it depends on. Ties among stages with no relative ordering constraint
//! are broken by declaration order, so identical pipelines always resolve
//! to identical orders and runs stay reproducible.
//!
//! The resolver handles the general case (arbitrary dependency
//! directions, unknown identities, cycles) even though pipeline assembly
//! already restricts dependencies to previously defined stages. A cycle
//! fails resolution with the stages on the cycle named in order; no
//! partial order is ever returned.

use std::collections::{BTreeSet, HashMap};

use crewforge_pipeline::StageSpec;
use crewforge_utils::error::GraphError;
use crewforge_utils::types::StageId;

/// Compute a deterministic topological execution order for `stages`.
///
/// Implements Kahn's algorithm over declaration indices: the ready set is
/// ordered by declaration position, so stages with no ordering constraint
/// between them execute in the order they were declared.
///
/// # Errors
///
/// - [`GraphError::UnknownDependency`] when a stage references an identity
///   not present in the stage set.
/// - [`GraphError::CycleDetected`] when the graph contains a cycle; the
///   error names the stages on the cycle.
pub fn resolve_order(stages: &[StageSpec]) -> Result<Vec<StageId>, GraphError> {
    let index_of: HashMap<&StageId, usize> =
        stages.iter().enumerate().map(|(i, s)| (&s.id, i)).collect();

    // dependents[i] lists the declaration indices that depend on stage i.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); stages.len()];
    let mut indegree: Vec<usize> = vec![0; stages.len()];

    for (idx, stage) in stages.iter().enumerate() {
        for dep in &stage.deps {
            let Some(&dep_idx) = index_of.get(dep) else {
                return Err(GraphError::UnknownDependency {
                    stage: stage.id.clone(),
                    dependency: dep.to_string(),
                });
            };
            dependents[dep_idx].push(idx);
            indegree[idx] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(stages.len());
    while let Some(&idx) = ready.iter().next() {
        ready.remove(&idx);
        order.push(stages[idx].id.clone());
        for &dependent in &dependents[idx] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < stages.len() {
        return Err(GraphError::CycleDetected {
            stages: find_cycle(stages, &index_of, &indegree),
        });
    }

    Ok(order)
}

/// Walk unresolved dependency edges from any stuck stage until a repeat,
/// then return the stages on the cycle in walk order.
fn find_cycle(
    stages: &[StageSpec],
    index_of: &HashMap<&StageId, usize>,
    indegree: &[usize],
) -> Vec<StageId> {
    let start = indegree
        .iter()
        .position(|d| *d > 0)
        .expect("a cycle leaves at least one stage with unresolved dependencies");

    let mut path: Vec<usize> = Vec::new();
    let mut current = start;
    loop {
        if let Some(pos) = path.iter().position(|&i| i == current) {
            return path[pos..].iter().map(|&i| stages[i].id.clone()).collect();
        }
        path.push(current);

        // Follow any dependency that is itself still unresolved; one must
        // exist for every stage the sort could not place.
        current = stages[current]
            .deps
            .iter()
            .filter_map(|dep| index_of.get(dep).copied())
            .find(|&dep_idx| indegree[dep_idx] > 0)
            .expect("stuck stage has an unresolved dependency");
    }
}
