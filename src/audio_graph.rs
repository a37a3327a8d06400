//! AudioGraph - block-based stimulus graph
//!
//! Owns the nodes of one stimulus chain, processes them once per block in
//! topological order and routes named nodes to output channels.

use crate::audio_node::{AudioNode, NodeId, ProcessContext, BLOCK_SIZE};
use crate::dependency_graph::DependencyGraph;
use crate::error::{EngineError, EngineResult};
use std::collections::BTreeMap;
use std::mem;

/// Most inputs any node may read
pub const MAX_NODE_INPUTS: usize = 4;

/// Block-based audio graph
///
/// # Example
/// ```ignore
/// let mut graph = AudioGraph::new(44100.0);
/// let freq = graph.add_audio_node(Box::new(ConstantNode::new(440.0)));
/// let osc = graph.add_audio_node(Box::new(OscillatorNode::new(freq, 440.0)));
/// graph.set_output(osc);
/// graph.build()?;
///
/// let mut channels = vec![vec![0.0; 512]; 2];
/// graph.process_block(&mut channels, 512);
/// ```
pub struct AudioGraph {
    nodes: Vec<Box<dyn AudioNode>>,
    /// One output buffer per node, reused across blocks
    buffers: Vec<Vec<f32>>,
    /// Input ids per node, captured at build
    node_inputs: Vec<Vec<NodeId>>,
    sample_rate: f32,
    /// Mono output, copied to every channel without a dedicated route
    output_node: Option<NodeId>,
    /// Per-channel routes (channel merger)
    channel_outputs: BTreeMap<usize, NodeId>,
    execution_order: Vec<NodeId>,
    built: bool,
    sample_count: usize,
    block_size: usize,
}

impl AudioGraph {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            nodes: Vec::new(),
            buffers: Vec::new(),
            node_inputs: Vec::new(),
            sample_rate,
            output_node: None,
            channel_outputs: BTreeMap::new(),
            execution_order: Vec::new(),
            built: false,
            sample_count: 0,
            block_size: BLOCK_SIZE,
        }
    }

    /// Add an audio node to the graph, returning its NodeId
    pub fn add_audio_node(&mut self, node: Box<dyn AudioNode>) -> NodeId {
        let node_id = self.nodes.len();
        self.nodes.push(node);
        self.built = false;
        node_id
    }

    /// Route a node to every channel
    pub fn set_output(&mut self, node_id: NodeId) {
        self.output_node = Some(node_id);
    }

    /// Route a node to one channel (0 = left, 1 = right)
    pub fn set_channel_output(&mut self, channel: usize, node_id: NodeId) {
        self.channel_outputs.insert(channel, node_id);
    }

    /// Compute the execution order and allocate buffers
    ///
    /// # Errors
    /// `InvalidGraph` for dangling inputs, cycles, unknown output nodes or
    /// nodes with more than `MAX_NODE_INPUTS` inputs
    pub fn build(&mut self) -> EngineResult<()> {
        let outputs = self.output_node.iter().chain(self.channel_outputs.values());
        for &node_id in outputs {
            if node_id >= self.nodes.len() {
                return Err(EngineError::InvalidGraph(format!(
                    "Invalid output node: {} (have {} nodes)",
                    node_id,
                    self.nodes.len()
                )));
            }
        }

        let node_inputs: Vec<Vec<NodeId>> = self.nodes.iter().map(|n| n.input_nodes()).collect();
        if let Some((node_id, inputs)) = node_inputs
            .iter()
            .enumerate()
            .find(|(_, inputs)| inputs.len() > MAX_NODE_INPUTS)
        {
            return Err(EngineError::InvalidGraph(format!(
                "Node {} has {} inputs (max {})",
                node_id,
                inputs.len(),
                MAX_NODE_INPUTS
            )));
        }

        let dependency_graph = DependencyGraph::build(&self.nodes)?;
        self.execution_order = dependency_graph.execution_order()?;
        self.node_inputs = node_inputs;
        self.buffers = vec![vec![0.0; self.block_size]; self.nodes.len()];
        self.built = true;
        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Number of channels with a dedicated route
    pub fn routed_channels(&self) -> usize {
        self.channel_outputs
            .keys()
            .next_back()
            .map(|&ch| ch + 1)
            .unwrap_or(0)
    }

    /// Frames rendered since the graph started
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Names of all nodes in insertion order
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name().to_string()).collect()
    }

    /// Frequencies reported by oscillator nodes, in insertion order
    pub fn oscillator_frequencies(&self) -> Vec<f32> {
        self.nodes.iter().filter_map(|n| n.frequency()).collect()
    }

    /// Stop every node. Safe to call more than once.
    pub fn stop(&mut self) {
        for node in &mut self.nodes {
            node.stop();
        }
    }

    /// Render `frames` frames into the front of each channel buffer
    ///
    /// `frames` is at most the block size and no longer than any channel.
    /// An unbuilt graph renders silence. Allocation free once built.
    pub fn process_block<C: AsMut<[f32]>>(&mut self, channels: &mut [C], frames: usize) {
        debug_assert!(frames <= self.block_size, "block larger than {}", self.block_size);

        if !self.built || frames == 0 {
            for channel in channels.iter_mut() {
                channel.as_mut()[..frames].fill(0.0);
            }
            return;
        }

        let context = ProcessContext::new(self.sample_count, frames, self.sample_rate);

        for &node_id in &self.execution_order {
            // Take this node's buffer so its inputs can be borrowed from the rest
            let mut output = mem::take(&mut self.buffers[node_id]);
            {
                let input_ids = &self.node_inputs[node_id];
                let mut inputs: [&[f32]; MAX_NODE_INPUTS] = [&[]; MAX_NODE_INPUTS];
                for (slot, &id) in inputs.iter_mut().zip(input_ids) {
                    *slot = &self.buffers[id][..frames];
                }
                self.nodes[node_id].process_block(
                    &inputs[..input_ids.len()],
                    &mut output[..frames],
                    self.sample_rate,
                    &context,
                );
            }
            self.buffers[node_id] = output;
        }

        for (ch, channel) in channels.iter_mut().enumerate() {
            let channel = &mut channel.as_mut()[..frames];
            let route = self.channel_outputs.get(&ch).copied().or(self.output_node);
            match route {
                Some(node_id) => channel.copy_from_slice(&self.buffers[node_id][..frames]),
                None => channel.fill(0.0),
            }
        }

        self.sample_count += frames;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{AdditionNode, ConstantNode, OscillatorNode};

    #[test]
    fn test_mono_output_copied_to_all_channels() {
        let mut graph = AudioGraph::new(44100.0);
        let a = graph.add_audio_node(Box::new(ConstantNode::new(0.25)));
        let b = graph.add_audio_node(Box::new(ConstantNode::new(0.5)));
        let sum = graph.add_audio_node(Box::new(AdditionNode::new(a, b)));
        graph.set_output(sum);
        graph.build().unwrap();

        let mut channels = vec![vec![0.0; 512]; 2];
        graph.process_block(&mut channels, 512);

        assert!(channels[0].iter().all(|&s| s == 0.75));
        assert_eq!(channels[0], channels[1]);
        assert_eq!(graph.sample_count(), 512);
    }

    #[test]
    fn test_channel_routes_override_mono() {
        let mut graph = AudioGraph::new(44100.0);
        let l = graph.add_audio_node(Box::new(ConstantNode::new(-1.0)));
        let r = graph.add_audio_node(Box::new(ConstantNode::new(1.0)));
        graph.set_channel_output(0, l);
        graph.set_channel_output(1, r);
        graph.build().unwrap();

        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];
        graph.process_block(&mut [left.as_mut_slice(), right.as_mut_slice()], 64);

        assert!(left.iter().all(|&s| s == -1.0));
        assert!(right.iter().all(|&s| s == 1.0));
        assert_eq!(graph.routed_channels(), 2);
    }

    #[test]
    fn test_unbuilt_graph_renders_silence() {
        let mut graph = AudioGraph::new(44100.0);
        let c = graph.add_audio_node(Box::new(ConstantNode::new(1.0)));
        graph.set_output(c);

        let mut mono = vec![0.5; 32];
        graph.process_block(&mut [mono.as_mut_slice()], 32);
        assert!(mono.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_partial_block_leaves_tail_untouched() {
        let mut graph = AudioGraph::new(44100.0);
        let c = graph.add_audio_node(Box::new(ConstantNode::new(0.5)));
        graph.set_output(c);
        graph.build().unwrap();

        // Scratch buffers are a full block; only the first frames are written
        let mut channels = vec![vec![-1.0; 512]; 1];
        graph.process_block(&mut channels, 100);
        assert!(channels[0][..100].iter().all(|&s| s == 0.5));
        assert!(channels[0][100..].iter().all(|&s| s == -1.0));
        assert_eq!(graph.sample_count(), 100);
    }

    #[test]
    fn test_invalid_output_rejected() {
        let mut graph = AudioGraph::new(44100.0);
        graph.add_audio_node(Box::new(ConstantNode::new(1.0)));
        graph.set_output(3);
        assert!(matches!(graph.build(), Err(EngineError::InvalidGraph(_))));
    }

    #[test]
    fn test_stop_silences_oscillators() {
        let mut graph = AudioGraph::new(44100.0);
        let f = graph.add_audio_node(Box::new(ConstantNode::new(440.0)));
        let osc = graph.add_audio_node(Box::new(OscillatorNode::new(f, 440.0)));
        graph.set_output(osc);
        graph.build().unwrap();

        assert_eq!(graph.oscillator_frequencies(), vec![440.0]);

        graph.stop();
        graph.stop();
        let mut mono = vec![0.5; 128];
        graph.process_block(&mut [mono.as_mut_slice()], 128);
        assert!(mono.iter().all(|&s| s == 0.0));
    }
}
