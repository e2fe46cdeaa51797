//! Execution DAG for recipe ordering.
//!
//! Edges run from a dependency to its dependent. Only requirements on
//! packages that are part of the same execution become edges; the rest must
//! be satisfied by the registry when the dependent runs.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::recipe::{DependencyKind, PackageRef, Requirement};
use crate::resolve::DependencyResolutionError;

#[derive(Debug)]
pub struct ExecutionDag {
  graph: DiGraph<PackageRef, DependencyKind>,
  nodes: HashMap<PackageRef, NodeIndex>,
}

impl ExecutionDag {
  /// Build the DAG from each planned package and its declared requirements.
  ///
  /// # Errors
  ///
  /// Returns `Cycle` naming one package on the cycle.
  pub fn new<'a, I>(entries: I) -> Result<Self, DependencyResolutionError>
  where
    I: IntoIterator<Item = (&'a PackageRef, &'a [Requirement])>,
  {
    let entries: Vec<_> = entries.into_iter().collect();
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    for (reference, _) in &entries {
      let idx = graph.add_node((*reference).clone());
      nodes.insert((*reference).clone(), idx);
    }

    for (reference, requirements) in &entries {
      let dependent = nodes[*reference];
      for requirement in requirements.iter() {
        if let Some(&dependency) = nodes.get(&requirement.reference) {
          graph.update_edge(dependency, dependent, requirement.kind);
        }
      }
    }

    let dag = Self { graph, nodes };
    toposort(&dag.graph, None).map_err(|cycle| DependencyResolutionError::Cycle(dag.graph[cycle.node_id()].clone()))?;
    Ok(dag)
  }

  /// Packages grouped into waves; every dependency of a package sits in an
  /// earlier wave. Each wave is sorted for stable output.
  pub fn waves(&self) -> Vec<Vec<PackageRef>> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[*idx] == 0).copied().collect();
      if ready.is_empty() {
        break;
      }

      for idx in &ready {
        remaining.remove(idx);
        for neighbor in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<PackageRef> = ready.into_iter().map(|idx| self.graph[idx].clone()).collect();
      wave.sort();
      waves.push(wave);
    }

    waves
  }

  /// Direct dependencies of `reference` within this DAG.
  pub fn dependencies(&self, reference: &PackageRef) -> Vec<PackageRef> {
    self.neighbors(reference, Direction::Incoming)
  }

  pub fn dependents(&self, reference: &PackageRef) -> Vec<PackageRef> {
    self.neighbors(reference, Direction::Outgoing)
  }

  fn neighbors(&self, reference: &PackageRef, direction: Direction) -> Vec<PackageRef> {
    let Some(&idx) = self.nodes.get(reference) else {
      return Vec::new();
    };
    let mut out: Vec<PackageRef> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n].clone())
      .collect();
    out.sort();
    out
  }

  pub fn contains(&self, reference: &PackageRef) -> bool {
    self.nodes.contains_key(reference)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}
