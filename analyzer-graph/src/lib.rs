//! Dependency-graph scheduler for same-kind analyzer execution.
//!
//! A [`DependencyGraph`] validates a flat list of `(id, dependencies)` pairs,
//! partitions them into levels via Kahn's algorithm with deterministic
//! (lexicographic) tie-breaking, and runs them level-by-level: every
//! analyzer in a level executes concurrently, and the scheduler waits for
//! the whole level to finish before starting the next one. Nothing here
//! knows about annotations, chains, or entity kinds — callers supply a
//! `run_fn` closure and get back which IDs failed or were skipped.

use std::collections::HashMap;
use std::future::Future;

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

mod error;

pub use error::{GraphError, RunErrors};

/// One analyzer's identity and declared dependency IDs, as seen by the
/// scheduler. The scheduler does not care what kind of analyzer this is —
/// that distinction lives one layer up, in the registry.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub id: String,
    pub dependencies: Vec<String>,
}

impl DependencyNode {
    pub fn new(id: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            id: id.into(),
            dependencies,
        }
    }
}

/// A validated, leveled dependency graph ready to run.
#[derive(Debug)]
pub struct DependencyGraph {
    levels: Vec<Vec<String>>,
    dependencies: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Validate `nodes` and compute its Kahn's-algorithm levelling.
    ///
    /// Rejects an empty or duplicate ID, a self-dependency, or a dependency
    /// on an ID not present in `nodes`. Dependency IDs are deduplicated
    /// silently. Fails with [`GraphError::Cycle`] if any node cannot be
    /// placed into a level (i.e. the graph is not a DAG).
    #[instrument(skip_all, fields(node_count = nodes.len()))]
    pub fn build(nodes: &[DependencyNode]) -> Result<Self, GraphError> {
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::with_capacity(nodes.len());

        for node in nodes {
            if node.id.is_empty() {
                return Err(GraphError::EmptyId);
            }
            if dependencies.contains_key(&node.id) {
                return Err(GraphError::DuplicateId(node.id.clone()));
            }

            let mut deps = Vec::new();
            for dep in &node.dependencies {
                if dep.is_empty() {
                    return Err(GraphError::EmptyId);
                }
                if *dep == node.id {
                    return Err(GraphError::SelfDependency(node.id.clone()));
                }
                if !deps.contains(dep) {
                    deps.push(dep.clone());
                }
            }
            dependencies.insert(node.id.clone(), deps);
        }

        for (id, deps) in &dependencies {
            for dep in deps {
                if !dependencies.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        analyzer: id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let levels = level_by_kahn(&dependencies)?;
        info!(levels = levels.len(), "dependency graph leveled");

        Ok(Self {
            levels,
            dependencies,
        })
    }

    /// The computed levels, in execution order. Each inner `Vec` is sorted
    /// lexicographically. This is a defensive copy — mutating it has no
    /// effect on the graph.
    pub fn levels(&self) -> Vec<Vec<String>> {
        self.levels.clone()
    }

    /// Run every level in order, awaiting the full level before advancing.
    ///
    /// `run_fn` is invoked once per analyzer ID that is *eligible* — i.e.
    /// none of its dependencies failed or were skipped in an earlier level.
    /// An ineligible analyzer is recorded as skipped and never invoked.
    ///
    /// Returns `Ok(())` if every invocation succeeded and nothing was
    /// skipped or cancelled; otherwise returns the union of recorded errors
    /// in the order they were recorded.
    #[instrument(skip_all, fields(levels = self.levels.len()))]
    pub async fn run<F, Fut>(&self, cancel: &CancellationToken, run_fn: F) -> Result<(), RunErrors>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let run_fn = std::sync::Arc::new(run_fn);
        let mut failed: HashMap<String, ()> = HashMap::new();
        let mut errors: Vec<String> = Vec::new();

        for (level_idx, level) in self.levels.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(level_idx, "context cancelled before level started");
                errors.push("context cancelled".to_string());
                break;
            }
            debug!(level_idx, size = level.len(), "starting level");

            let mut join_set: JoinSet<(String, Option<String>)> = JoinSet::new();
            for id in level {
                let deps = self.dependencies.get(id).cloned().unwrap_or_default();
                let dependency_failed = deps.iter().any(|d| failed.contains_key(d));

                if dependency_failed {
                    warn!(analyzer = %id, "skipping analyzer, dependency failed");
                    errors.push(format!("skip analyzer \"{id}\": dependency failure"));
                    failed.insert(id.clone(), ());
                    continue;
                }

                let run_fn = run_fn.clone();
                let id = id.clone();
                join_set.spawn(async move {
                    let outcome = run_fn(id.clone()).await;
                    (id, outcome.err())
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((id, Some(cause))) => {
                        errors.push(format!("run analyzer \"{id}\": {cause}"));
                        failed.insert(id, ());
                    }
                    Ok((_, None)) => {}
                    Err(join_err) => {
                        errors.push(format!("analyzer task panicked: {join_err}"));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RunErrors(errors))
        }
    }
}

/// Kahn's algorithm with deterministic, lexicographically-sorted levels.
fn level_by_kahn(
    dependencies: &HashMap<String, Vec<String>>,
) -> Result<Vec<Vec<String>>, GraphError> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for id in dependencies.keys() {
        graph.add_node(id.as_str());
    }
    for (id, deps) in dependencies {
        for dep in deps {
            // Edge points dependency -> dependent: the dependency must be
            // processed first, so it feeds the dependent's in-degree.
            graph.add_edge(dep.as_str(), id.as_str(), ());
        }
    }

    let mut in_degree: HashMap<&str, usize> = graph
        .nodes()
        .map(|n| (n, graph.neighbors_directed(n, Direction::Incoming).count()))
        .collect();

    let mut levels = Vec::new();
    let mut remaining = dependencies.len();
    let mut frontier: Vec<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(n, _)| *n)
        .collect();
    frontier.sort_unstable();

    while !frontier.is_empty() {
        remaining -= frontier.len();
        levels.push(frontier.iter().map(|s| (*s).to_string()).collect());

        let mut next: Vec<&str> = Vec::new();
        for &node in &frontier {
            for succ in graph.neighbors_directed(node, Direction::Outgoing) {
                let deg = in_degree.get_mut(succ).expect("node indexed");
                *deg -= 1;
                if *deg == 0 {
                    next.push(succ);
                }
            }
        }
        next.sort_unstable();
        frontier = next;
    }

    if remaining != 0 {
        return Err(GraphError::Cycle);
    }

    Ok(levels)
}


#[cfg(test)]
mod scheduling_properties {
    use proptest::prelude::*;

    use super::*;

    /// Builds an acyclic-by-construction node set: node `i` may only depend
    /// on nodes `0..i`, so `edges` (read in row-major `(i, j)` order) can
    /// never describe a cycle.
    fn acyclic_nodes(n: usize, edges: &[bool]) -> Vec<DependencyNode> {
        let mut idx = 0;
        (0..n)
            .map(|i| {
                let deps: Vec<String> = (0..i)
                    .filter(|_| {
                        let bit = edges[idx];
                        idx += 1;
                        bit
                    })
                    .map(|j| format!("n{j}"))
                    .collect();
                DependencyNode::new(format!("n{i}"), deps)
            })
            .collect()
    }

    proptest! {
        /// For any acyclic dependency set, Kahn's-algorithm levelling must
        /// place every node strictly after every one of its dependencies —
        /// the property the scheduler relies on to run a level only once
        /// all earlier levels have fully completed.
        #[test]
        fn every_node_levels_strictly_after_its_dependencies(
            n in 2usize..10,
            raw_edges in prop::collection::vec(any::<bool>(), 0..45),
        ) {
            let needed = n * n.saturating_sub(1) / 2;
            let mut edges = raw_edges;
            if edges.len() < needed {
                edges.resize(needed, false);
            }
            let nodes = acyclic_nodes(n, &edges);
            let graph = DependencyGraph::build(&nodes).unwrap();
            let levels = graph.levels();

            let level_of: HashMap<&str, usize> = levels
                .iter()
                .enumerate()
                .flat_map(|(lvl, ids)| ids.iter().map(move |id| (id.as_str(), lvl)))
                .collect();

            for node in &nodes {
                for dep in &node.dependencies {
                    prop_assert!(level_of[dep.as_str()] < level_of[node.id.as_str()]);
                }
            }
        }
    }
}
