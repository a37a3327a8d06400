/// Gain node - multiplies input signal by a gain signal
///
/// Output[i] = Input[i] * Gain[i] * level. In stimulus chains the gain
/// input is a fade-in ramp, so the level only ever changes smoothly.
use crate::audio_node::{AudioNode, NodeId, ProcessContext};

/// Gain node: out = input * gain * level
///
/// # Example
/// ```ignore
/// let osc = OscillatorNode::new(0, 440.0);   // NodeId 1
/// let ramp = RampNode::new(0.15, 0.5);       // NodeId 2
/// let gain = GainNode::new(1, 2, 1.0);       // NodeId 3
/// ```
pub struct GainNode {
    input: NodeId,
    gain_input: NodeId,
    level: f32,
}

impl GainNode {
    /// # Parameters
    /// - `input`: NodeId providing signal to amplify
    /// - `gain_input`: NodeId providing per-sample gain
    /// - `level`: Static multiplier applied on top of the gain input
    pub fn new(input: NodeId, gain_input: NodeId, level: f32) -> Self {
        Self {
            input,
            gain_input,
            level,
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }
}

impl AudioNode for GainNode {
    fn process_block(
        &mut self,
        inputs: &[&[f32]],
        output: &mut [f32],
        _sample_rate: f32,
        _context: &ProcessContext,
    ) {
        debug_assert!(
            inputs.len() >= 2,
            "GainNode requires 2 inputs (signal + gain), got {}",
            inputs.len()
        );

        let signal = inputs[0];
        let gain = inputs[1];

        for i in 0..output.len() {
            output[i] = signal[i] * gain[i] * self.level;
        }
    }

    fn input_nodes(&self) -> Vec<NodeId> {
        vec![self.input, self.gain_input]
    }

    fn name(&self) -> &str {
        "GainNode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_multiplies_signal_gain_and_level() {
        let mut gain = GainNode::new(0, 1, 0.5);
        let signal = vec![1.0, -1.0, 0.5, 0.0];
        let ramp = vec![0.0, 0.5, 1.0, 1.0];
        let mut output = vec![9.0; 4];
        let context = ProcessContext::new(0, 4, 44100.0);

        gain.process_block(&[signal.as_slice(), ramp.as_slice()], &mut output, 44100.0, &context);

        assert_eq!(output, vec![0.0, -0.25, 0.25, 0.0]);
        assert_eq!(gain.input_nodes(), vec![0, 1]);
    }
}
