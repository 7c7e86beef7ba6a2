//! Dependency ordering of a working set.
//!
//! Kahn's algorithm with a lexicographically ordered ready set, so the same
//! working set always yields the same order. `runAfter` ids that are not in the
//! working set are treated as satisfied by history.

use crate::error::MongrateError;
use crate::registry::WorkingSet;
use std::collections::{BTreeMap, BTreeSet};

/// Migration id → ids it must run after, restricted to the working set.
pub type DependencyGraph = BTreeMap<String, BTreeSet<String>>;

/// Build the dependency graph of a working set.
pub fn dependency_graph(set: &WorkingSet) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for migration in set.iter() {
        let mut deps = BTreeSet::new();
        for dep in &migration.run_after {
            if set.contains(dep) {
                deps.insert(dep.clone());
            } else {
                tracing::debug!(
                    migration = %migration.id,
                    dependency = %dep,
                    "dependency outside this run, assuming already applied"
                );
            }
        }
        graph.insert(migration.id.clone(), deps);
    }
    graph
}

/// Forward execution order.
pub fn forward_order(set: &WorkingSet) -> Result<Vec<String>, MongrateError> {
    let graph = dependency_graph(set);

    let mut remaining: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (id, deps) in &graph {
        remaining.insert(id.as_str(), deps.len());
        for dep in deps {
            dependents.entry(dep.as_str()).or_default().push(id.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(id) = ready.pop_first() {
        order.push(id.to_string());
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() < graph.len() {
        let ids: Vec<String> = remaining
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        return Err(MongrateError::CyclicDependency { ids });
    }

    Ok(order)
}

/// Execution order for a run: forward order, reversed for a rollback.
pub fn execution_order(set: &WorkingSet, rollback: bool) -> Result<Vec<String>, MongrateError> {
    let mut order = forward_order(set)?;
    if rollback {
        order.reverse();
    }
    Ok(order)
}
