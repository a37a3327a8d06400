/// Constant value node - outputs the same value for every sample
///
/// Carrier frequencies, sweep widths and static gains are fed into the
/// graph through constant nodes.

use crate::audio_node::{AudioNode, NodeId, ProcessContext};

pub struct ConstantNode {
    value: f32,
}

impl ConstantNode {
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

impl AudioNode for ConstantNode {
    fn process_block(
        &mut self,
        _inputs: &[&[f32]],
        output: &mut [f32],
        _sample_rate: f32,
        _context: &ProcessContext,
    ) {
        output.fill(self.value);
    }

    fn input_nodes(&self) -> Vec<NodeId> {
        vec![]
    }

    fn name(&self) -> &str {
        "ConstantNode"
    }
}
