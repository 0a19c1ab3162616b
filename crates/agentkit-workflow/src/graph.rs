use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

/// Errors from graph analysis. Either one aborts a run before any node
/// executes.
#[derive(Debug, Error)]
pub enum GraphError {
  #[error("edge references unknown node '{0}'")]
  UnknownNode(String),

  #[error("workflow graph contains a cycle ({sorted} of {total} nodes orderable)")]
  Cycle { sorted: usize, total: usize },
}

/// Graph structure over author-assigned node keys.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Node keys in workflow insertion order.
  keys: Vec<String>,
  /// Edges in insertion order.
  edges: Vec<(String, String)>,
}

impl Graph {
  pub fn new(keys: Vec<String>, edges: Vec<(String, String)>) -> Self {
    Self { keys, edges }
  }

  /// Kahn's algorithm with FIFO tie-break in node insertion order.
  ///
  /// Validates that every edge endpoint names a known node, then drains
  /// zero-in-degree nodes in first-inserted-first order so the result is
  /// deterministic for a fixed graph. A result shorter than the node count
  /// means the graph has a cycle.
  pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
    let known: HashSet<&str> = self.keys.iter().map(String::as_str).collect();
    for (source, target) in &self.edges {
      if !known.contains(source.as_str()) {
        return Err(GraphError::UnknownNode(source.clone()));
      }
      if !known.contains(target.as_str()) {
        return Err(GraphError::UnknownNode(target.clone()));
      }
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> =
      self.keys.iter().map(|k| (k.as_str(), 0)).collect();

    for (source, target) in &self.edges {
      adjacency
        .entry(source.as_str())
        .or_default()
        .push(target.as_str());
      *in_degree.entry(target.as_str()).or_default() += 1;
    }

    let mut queue: VecDeque<&str> = self
      .keys
      .iter()
      .map(String::as_str)
      .filter(|k| in_degree[k] == 0)
      .collect();

    let mut sorted = Vec::with_capacity(self.keys.len());
    while let Some(current) = queue.pop_front() {
      sorted.push(current.to_string());
      for &next in adjacency.get(current).map(Vec::as_slice).unwrap_or(&[]) {
        let degree = in_degree.get_mut(next).expect("edge targets validated");
        *degree -= 1;
        if *degree == 0 {
          queue.push_back(next);
        }
      }
    }

    if sorted.len() < self.keys.len() {
      return Err(GraphError::Cycle {
        sorted: sorted.len(),
        total: self.keys.len(),
      });
    }

    Ok(sorted)
  }
}
