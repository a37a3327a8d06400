/// Multiplication node - multiplies two input signals
///
/// Scales the sweep LFO by its half-width before it reaches the carrier.

use crate::audio_node::{AudioNode, NodeId, ProcessContext};

/// Multiplication node: out = a * b
pub struct MultiplicationNode {
    input_a: NodeId,
    input_b: NodeId,
}

impl MultiplicationNode {
    pub fn new(input_a: NodeId, input_b: NodeId) -> Self {
        Self { input_a, input_b }
    }
}

impl AudioNode for MultiplicationNode {
    fn process_block(
        &mut self,
        inputs: &[&[f32]],
        output: &mut [f32],
        _sample_rate: f32,
        _context: &ProcessContext,
    ) {
        debug_assert!(
            inputs.len() >= 2,
            "MultiplicationNode requires 2 inputs, got {}",
            inputs.len()
        );

        for ((out, &a), &b) in output.iter_mut().zip(inputs[0]).zip(inputs[1]) {
            *out = a * b;
        }
    }

    fn input_nodes(&self) -> Vec<NodeId> {
        vec![self.input_a, self.input_b]
    }

    fn name(&self) -> &str {
        "MultiplicationNode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplication_scales_lfo() {
        let mut mul = MultiplicationNode::new(0, 1);
        let lfo = vec![-1.0, 0.0, 0.5, 1.0];
        let width = vec![200.0; 4];
        let mut output = vec![0.0; 4];
        let context = ProcessContext::new(0, 4, 44100.0);

        mul.process_block(&[lfo.as_slice(), width.as_slice()], &mut output, 44100.0, &context);

        assert_eq!(output, vec![-200.0, 0.0, 100.0, 200.0]);
        assert_eq!(mul.input_nodes(), vec![0, 1]);
    }
}
