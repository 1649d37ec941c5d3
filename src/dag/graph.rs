// src/dag/graph.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::scope::Scope;
use crate::errors::{ProbeDagError, Result};
use crate::types::TaskId;

/// Build the inferred dependency graph of a prepared scope.
///
/// Edge direction: dependency -> dependent.
fn build_graph(scope: &Scope) -> DiGraphMap<usize, ()> {
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();

    for idx in 0..scope.len() {
        graph.add_node(idx);
    }
    for (dep, dependent) in scope.edges() {
        graph.add_edge(dep.0, dependent.0, ());
    }

    graph
}

/// Topological order of every probe in `scope`.
///
/// A cycle would leave its members blocked forever, so it is reported as a
/// [`ProbeDagError::DependencyCycle`] naming one probe on the cycle.
pub fn topological_order(scope: &Scope) -> Result<Vec<TaskId>> {
    let graph = build_graph(scope);

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(TaskId).collect()),
        Err(cycle) => {
            let id = TaskId(cycle.node_id());
            let label = scope
                .task(id)
                .map(|t| t.label())
                .unwrap_or_else(|| id.to_string());
            Err(ProbeDagError::DependencyCycle(format!(
                "cycle detected in probe dependencies involving '{label}'"
            )))
        }
    }
}

/// Fail if the scope's dependencies contain a cycle.
pub fn check_acyclic(scope: &Scope) -> Result<()> {
    topological_order(scope).map(|_| ())
}
