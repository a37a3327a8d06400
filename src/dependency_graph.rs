/// Dependency graph analysis for audio node execution
///
/// Determines the execution order of a stimulus chain (topological sort) and
/// rejects chains that reference missing nodes or contain feedback, which no
/// stimulus needs.

use crate::audio_node::{AudioNode, NodeId};
use crate::error::{EngineError, EngineResult};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// Represents the audio processing dependency graph
///
/// # Graph Structure
/// - Nodes: Audio processing nodes (oscillators, filters, etc.)
/// - Edges: Dependencies (data flow from input → dependent)
pub struct DependencyGraph {
    graph: DiGraph<NodeId, ()>,
    node_map: HashMap<NodeId, NodeIndex>,
}

impl DependencyGraph {
    /// Build dependency graph from audio nodes
    ///
    /// # Errors
    /// `InvalidGraph` if a node references a non-existent input
    pub fn build(nodes: &[Box<dyn AudioNode>]) -> EngineResult<Self> {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for (node_id, _) in nodes.iter().enumerate() {
            let idx = graph.add_node(node_id);
            node_map.insert(node_id, idx);
        }

        for (node_id, node) in nodes.iter().enumerate() {
            let dependent_idx = node_map[&node_id];

            for input_id in node.input_nodes() {
                match node_map.get(&input_id) {
                    // Edge: input → dependent (data flows this direction)
                    Some(&input_idx) => {
                        graph.add_edge(input_idx, dependent_idx, ());
                    }
                    None => {
                        return Err(EngineError::InvalidGraph(format!(
                            "Node {} ({}) references non-existent input node {}",
                            node_id,
                            node.name(),
                            input_id
                        )));
                    }
                }
            }
        }

        Ok(Self { graph, node_map })
    }

    /// Topologically sorted execution order
    ///
    /// # Errors
    /// `InvalidGraph` if the graph contains a cycle
    pub fn execution_order(&self) -> EngineResult<Vec<NodeId>> {
        toposort(&self.graph, None)
            .map(|order| order.iter().map(|&idx| self.graph[idx]).collect())
            .map_err(|cycle| {
                EngineError::InvalidGraph(format!(
                    "feedback cycle through node {}",
                    self.graph[cycle.node_id()]
                ))
            })
    }

    /// Direct dependencies of a node
    pub fn dependencies(&self, node_id: NodeId) -> Vec<NodeId> {
        self.neighbors(node_id, Direction::Incoming)
    }

    /// Nodes that depend on this node
    pub fn dependents(&self, node_id: NodeId) -> Vec<NodeId> {
        self.neighbors(node_id, Direction::Outgoing)
    }

    fn neighbors(&self, node_id: NodeId, direction: Direction) -> Vec<NodeId> {
        match self.node_map.get(&node_id) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, direction)
                .map(|n| self.graph[n])
                .collect(),
            None => vec![],
        }
    }

    /// Nodes with no dependencies
    pub fn source_nodes(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| self.graph[idx])
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_node::ProcessContext;

    struct MockNode {
        inputs: Vec<NodeId>,
    }

    impl AudioNode for MockNode {
        fn process_block(
            &mut self,
            _inputs: &[&[f32]],
            _output: &mut [f32],
            _sample_rate: f32,
            _context: &ProcessContext,
        ) {
        }

        fn input_nodes(&self) -> Vec<NodeId> {
            self.inputs.clone()
        }
    }

    fn nodes(inputs: &[&[NodeId]]) -> Vec<Box<dyn AudioNode>> {
        inputs
            .iter()
            .map(|i| Box::new(MockNode { inputs: i.to_vec() }) as Box<dyn AudioNode>)
            .collect()
    }

    #[test]
    fn test_simple_linear_graph() {
        // Graph: 0 → 1 → 2
        let graph = DependencyGraph::build(&nodes(&[&[], &[0], &[1]])).unwrap();

        assert_eq!(graph.execution_order().unwrap(), vec![0, 1, 2]);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.source_nodes(), vec![0]);
    }

    #[test]
    fn test_binaural_shape_orders_dependencies_first() {
        // Two oscillator branches merging into nothing; the order must
        // respect each branch independently
        //   0 → 1 → 2     3 → 4 → 5
        let graph =
            DependencyGraph::build(&nodes(&[&[], &[0], &[1], &[], &[3], &[4]])).unwrap();
        let order = graph.execution_order().unwrap();
        let pos = |id| order.iter().position(|&n| n == id).unwrap();

        assert!(pos(0) < pos(1) && pos(1) < pos(2));
        assert!(pos(3) < pos(4) && pos(4) < pos(5));
        assert_eq!(graph.dependents(0), vec![1]);
        assert_eq!(graph.dependencies(5), vec![4]);
    }

    #[test]
    fn test_cycle_rejected() {
        // 0 → 1 → 2 → 0
        let graph = DependencyGraph::build(&nodes(&[&[2], &[0], &[1]])).unwrap();
        assert!(matches!(
            graph.execution_order(),
            Err(EngineError::InvalidGraph(_))
        ));
    }

    #[test]
    fn test_missing_input_rejected() {
        let result = DependencyGraph::build(&nodes(&[&[], &[7]]));
        assert!(matches!(result, Err(EngineError::InvalidGraph(_))));
    }
}
