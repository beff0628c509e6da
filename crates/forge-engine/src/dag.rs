//! DAG resolution for pipeline jobs.

use forge_core::pipeline::{JobSpec, PipelineDefinition};
use forge_core::{Error, Result};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// A node in the pipeline DAG.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub name: String,
    pub spec: JobSpec,
}

/// Directed acyclic graph over jobs, edges following `needs`.
///
/// Construction validates the definition; a `PipelineDag` is always acyclic.
#[derive(Debug)]
pub struct PipelineDag {
    graph: DiGraph<DagNode, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    order: Vec<String>,
}

impl PipelineDag {
    /// Build a DAG from a pipeline definition, rejecting cycles and every
    /// other definition error before any job can run.
    pub fn build(definition: &PipelineDefinition) -> Result<Self> {
        definition.validate()?;

        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for job in &definition.jobs {
            let node = DagNode {
                name: job.name.clone(),
                spec: job.clone(),
            };
            let idx = graph.add_node(node);
            name_to_index.insert(job.name.clone(), idx);
        }

        for job in &definition.jobs {
            let job_idx = name_to_index[&job.name];
            for dep in &job.needs {
                // validate() already resolved unknown names
                let dep_idx = name_to_index[dep];
                graph.add_edge(dep_idx, job_idx, ());
            }
        }

        let order = match toposort(&graph, None) {
            Ok(indices) => indices
                .into_iter()
                .map(|idx| graph[idx].name.clone())
                .collect(),
            Err(_) => {
                return Err(Error::CyclicDependency {
                    cycle: find_cycle(&graph),
                });
            }
        };

        Ok(PipelineDag {
            graph,
            name_to_index,
            order,
        })
    }

    /// Jobs with no dependencies.
    pub fn roots(&self) -> Vec<&DagNode> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .count()
                    == 0
            })
            .map(|idx| &self.graph[idx])
            .collect()
    }

    /// Jobs that must reach a terminal state before the given job starts.
    pub fn predecessors(&self, job: &str) -> Vec<&DagNode> {
        self.name_to_index
            .get(job)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .map(|n| &self.graph[n])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Jobs that become candidates once the given job is terminal.
    pub fn successors(&self, job: &str) -> Vec<&DagNode> {
        self.name_to_index
            .get(job)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Outgoing)
                    .map(|n| &self.graph[n])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All jobs.
    pub fn jobs(&self) -> Vec<&DagNode> {
        self.graph.node_indices().map(|idx| &self.graph[idx]).collect()
    }

    /// Job names in a valid execution order (one of possibly many; the graph
    /// imposes only partial order).
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }
}

/// Name the jobs on a dependency cycle, in edge order.
fn find_cycle(graph: &DiGraph<DagNode, ()>) -> Vec<String> {
    for component in tarjan_scc(graph) {
        let on_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&idx| graph.find_edge(idx, idx).is_some());
        if on_cycle {
            return component.into_iter().map(|idx| graph[idx].name.clone()).collect();
        }
    }
    Vec::new()
}
