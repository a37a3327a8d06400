/// Ramp generator - linear fade from 0 to a target level
///
/// Drives the gain input of every tonal chain so a stimulus never starts
/// with a step. The ramp starts when the chain first sounds and holds the
/// target once complete.

use crate::audio_node::{AudioNode, NodeId, ProcessContext, MIN_RAMP_SECONDS};

/// Linear ramp node
///
/// # Example
/// ```ignore
/// // 0 -> 0.15 over half a second
/// let ramp = RampNode::new(0.15, 0.5);        // NodeId 0
/// let gain = GainNode::new(osc, 0, 1.0);      // NodeId 1
/// ```
pub struct RampNode {
    target: f32,
    duration_seconds: f32,
    elapsed_samples: u64,
}

impl RampNode {
    /// Durations below `MIN_RAMP_SECONDS` are raised to it
    pub fn new(target: f32, duration_seconds: f32) -> Self {
        let duration_seconds = if duration_seconds.is_finite() {
            duration_seconds.max(MIN_RAMP_SECONDS)
        } else {
            MIN_RAMP_SECONDS
        };
        Self {
            target,
            duration_seconds,
            elapsed_samples: 0,
        }
    }

    pub fn duration_seconds(&self) -> f32 {
        self.duration_seconds
    }

    fn total_samples(&self, sample_rate: f32) -> u64 {
        ((self.duration_seconds * sample_rate).round() as u64).max(1)
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// True once the ramp holds its target
    pub fn is_complete(&self, sample_rate: f32) -> bool {
        self.elapsed_samples >= self.total_samples(sample_rate)
    }
}

impl AudioNode for RampNode {
    fn process_block(
        &mut self,
        _inputs: &[&[f32]],
        output: &mut [f32],
        sample_rate: f32,
        _context: &ProcessContext,
    ) {
        let total = self.total_samples(sample_rate);

        for out in output.iter_mut() {
            *out = if self.elapsed_samples >= total {
                self.target
            } else {
                self.target * self.elapsed_samples as f32 / total as f32
            };
            self.elapsed_samples = self.elapsed_samples.saturating_add(1);
        }
    }

    fn input_nodes(&self) -> Vec<NodeId> {
        vec![]
    }

    fn name(&self) -> &str {
        "RampNode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_is_linear_and_monotonic() {
        // 0.01 s at 10 kHz = 100 samples
        let mut ramp = RampNode::new(1.0, 0.01);
        let context = ProcessContext::new(0, 128, 10000.0);
        let mut output = vec![0.0; 128];

        ramp.process_block(&[], &mut output, 10000.0, &context);

        assert_eq!(output[0], 0.0);
        assert!((output[50] - 0.5).abs() < 1e-6);
        assert!(output.windows(2).all(|w| w[1] >= w[0]));
        assert!(output[100..].iter().all(|&s| s == 1.0));
        assert!(ramp.is_complete(10000.0));
    }

    #[test]
    fn test_ramp_continues_across_blocks() {
        let mut ramp = RampNode::new(0.2, 0.02);
        let context = ProcessContext::new(0, 100, 10000.0);
        let mut first = vec![0.0; 100];
        let mut second = vec![0.0; 100];

        ramp.process_block(&[], &mut first, 10000.0, &context);
        assert!(!ramp.is_complete(10000.0));
        ramp.process_block(&[], &mut second, 10000.0, &context);

        assert!(second[0] > first[99]);
        assert!((second[99] - 0.2).abs() < 1e-3);
    }

    #[test]
    fn test_zero_duration_still_ramps() {
        let mut ramp = RampNode::new(0.3, 0.0);
        assert_eq!(ramp.duration_seconds(), MIN_RAMP_SECONDS);

        // 5 ms at 44.1 kHz is about 220 samples
        let context = ProcessContext::new(0, 256, 44100.0);
        let mut output = vec![0.0; 256];
        ramp.process_block(&[], &mut output, 44100.0, &context);

        assert_eq!(output[0], 0.0);
        assert!(output[1] < 0.01);
        assert!(output.windows(2).all(|w| w[1] >= w[0]));
        assert!(output[..200].iter().all(|&s| s < 0.3));
        assert_eq!(output[255], 0.3);
    }
}
