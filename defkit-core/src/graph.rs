//! Named-node dependency graph with deterministic topological ordering
//!
//! Nodes are kept in insertion order and their edges in the order they were
//! added, so the same sequence of calls always yields the same load order.

use std::collections::HashMap;

/// Errors raised while building or ordering a [`DependencyGraph`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("unknown node \"{0}\"")]
    UnknownNode(String),

    #[error("circular dependency detected for \"{0}\"")]
    Cycle(String),
}

#[derive(Debug, Clone)]
struct Node<T> {
    name: String,
    data: T,
    dependencies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Graph of named payloads where each node lists the nodes it depends on
#[derive(Debug, Clone)]
pub struct DependencyGraph<T> {
    nodes: Vec<Node<T>>,
    index: HashMap<String, usize>,
}

impl<T> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DependencyGraph<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a node with an empty dependency set
    ///
    /// Re-adding an existing name replaces its payload, clears its edges and
    /// keeps its original position. The previous payload is returned.
    pub fn add_node(&mut self, name: impl Into<String>, data: T) -> Option<T> {
        let name = name.into();
        match self.index.get(&name) {
            Some(&position) => {
                let node = &mut self.nodes[position];
                node.dependencies.clear();
                Some(std::mem::replace(&mut node.data, data))
            }
            None => {
                self.index.insert(name.clone(), self.nodes.len());
                self.nodes.push(Node {
                    name,
                    data,
                    dependencies: Vec::new(),
                });
                None
            }
        }
    }

    /// Record that `dependency` must be ordered before `node`
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] if `node` was never added. The
    /// dependency itself does not need to be a node: names outside the graph
    /// are treated as already satisfied when ordering.
    pub fn add_dependency(&mut self, node: &str, dependency: impl Into<String>) -> Result<(), GraphError> {
        let position = *self
            .index
            .get(node)
            .ok_or_else(|| GraphError::UnknownNode(node.to_string()))?;
        let dependency = dependency.into();
        let edges = &mut self.nodes[position].dependencies;
        if !edges.contains(&dependency) {
            edges.push(dependency);
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&position| &self.nodes[position].data)
    }

    /// Dependencies of `name` in the order they were added
    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.index
            .get(name)
            .map(|&position| self.nodes[position].dependencies.as_slice())
    }

    /// Node names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }

    /// Compute an order in which every dependency precedes its dependents
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cycle`] naming the node that was revisited while
    /// still in progress. No partial order is returned.
    pub fn topological_order(&self) -> Result<Vec<&str>, GraphError> {
        self.visit()
            .map(|order| order.into_iter().map(|position| self.nodes[position].name.as_str()).collect())
            .map_err(|position| GraphError::Cycle(self.nodes[position].name.clone()))
    }

    /// Payloads in topological order
    pub fn data_order(&self) -> Result<Vec<&T>, GraphError> {
        self.visit()
            .map(|order| order.into_iter().map(|position| &self.nodes[position].data).collect())
            .map_err(|position| GraphError::Cycle(self.nodes[position].name.clone()))
    }

    /// Consume the graph and return its payloads in topological order
    pub fn into_data_order(self) -> Result<Vec<T>, GraphError> {
        let order = match self.visit() {
            Ok(order) => order,
            Err(position) => return Err(GraphError::Cycle(self.nodes[position].name.clone())),
        };
        let mut slots: Vec<Option<T>> = self.nodes.into_iter().map(|node| Some(node.data)).collect();
        Ok(order
            .into_iter()
            .filter_map(|position| slots[position].take())
            .collect())
    }

    /// Same traversal as [`topological_order`](Self::topological_order) but
    /// reports the first node found on a cycle instead of failing
    pub fn first_cycle_member(&self) -> Option<&str> {
        self.visit()
            .err()
            .map(|position| self.nodes[position].name.as_str())
    }

    /// Depth-first traversal with an explicit stack of (node, next edge)
    /// frames. Returns the revisited node on a cycle.
    fn visit(&self) -> Result<Vec<usize>, usize> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        for root in 0..self.nodes.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::InProgress;
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                match self.nodes[node].dependencies.get(frame.1) {
                    Some(dependency) => {
                        frame.1 += 1;
                        // Satisfied outside this graph
                        let Some(&next) = self.index.get(dependency) else {
                            continue;
                        };
                        match marks[next] {
                            Mark::Done => {}
                            Mark::InProgress => return Err(next),
                            Mark::Unvisited => {
                                marks[next] = Mark::InProgress;
                                stack.push((next, 0));
                            }
                        }
                    }
                    None => {
                        marks[node] = Mark::Done;
                        order.push(node);
                        stack.pop();
                    }
                }
            }
        }

        Ok(order)
    }
}
