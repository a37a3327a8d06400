/// Addition node - sums two input signals
///
/// Used by the sweep chain: carrier frequency + scaled LFO.

use crate::audio_node::{AudioNode, NodeId, ProcessContext};

/// Addition node: out = a + b
pub struct AdditionNode {
    input_a: NodeId,
    input_b: NodeId,
}

impl AdditionNode {
    pub fn new(input_a: NodeId, input_b: NodeId) -> Self {
        Self { input_a, input_b }
    }
}

impl AudioNode for AdditionNode {
    fn process_block(
        &mut self,
        inputs: &[&[f32]],
        output: &mut [f32],
        _sample_rate: f32,
        _context: &ProcessContext,
    ) {
        debug_assert!(
            inputs.len() >= 2,
            "AdditionNode requires 2 inputs, got {}",
            inputs.len()
        );

        for ((out, &a), &b) in output.iter_mut().zip(inputs[0]).zip(inputs[1]) {
            *out = a + b;
        }
    }

    fn input_nodes(&self) -> Vec<NodeId> {
        vec![self.input_a, self.input_b]
    }

    fn name(&self) -> &str {
        "AdditionNode"
    }
}
