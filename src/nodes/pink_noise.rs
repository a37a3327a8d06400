/// Pink noise (1/f spectrum) for the noise control condition
///
/// # Algorithm
///
/// White noise is shaped by Paul Kellet's refined filter bank: six one-pole
/// accumulators with fixed coefficients plus a one-sample white term. The
/// sum approximates -3 dB/octave across the audible range. The noise is
/// rendered once into a fixed-duration buffer which `NoiseBufferNode` loops.

use crate::audio_node::{AudioNode, NodeId, ProcessContext};
use rand::Rng;

/// Output scaling that keeps the filter bank's sum roughly within [-1, 1]
const KELLET_SCALE: f32 = 0.11;

/// Kellet pink filter state
#[derive(Debug, Clone, Default)]
pub struct KelletFilter {
    b: [f32; 7],
}

impl KelletFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter one white sample (uniform in [-1, 1]) into one pink sample
    pub fn next(&mut self, white: f32) -> f32 {
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + white * 0.0555179;
        b[1] = 0.99332 * b[1] + white * 0.0750759;
        b[2] = 0.96900 * b[2] + white * 0.1538520;
        b[3] = 0.86650 * b[3] + white * 0.3104856;
        b[4] = 0.55000 * b[4] + white * 0.5329522;
        b[5] = -0.7616 * b[5] - white * 0.0168980;
        let pink = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362;
        b[6] = white * 0.115926;
        pink * KELLET_SCALE
    }
}

/// Render `frames` samples of pink noise
pub fn pink_noise_buffer<R: Rng + ?Sized>(frames: usize, rng: &mut R) -> Vec<f32> {
    let mut filter = KelletFilter::new();
    (0..frames)
        .map(|_| filter.next(rng.gen_range(-1.0f32..=1.0)))
        .collect()
}

/// Source node that loops a pre-rendered buffer
///
/// # Example
/// ```ignore
/// let buffer = pink_noise_buffer(88200, &mut rng);
/// let noise = NoiseBufferNode::new(buffer);      // NodeId 0
/// ```
pub struct NoiseBufferNode {
    buffer: Vec<f32>,
    position: usize,
    stopped: bool,
}

impl NoiseBufferNode {
    pub fn new(buffer: Vec<f32>) -> Self {
        Self {
            buffer,
            position: 0,
            stopped: false,
        }
    }

    /// Length of the looped buffer in frames
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl AudioNode for NoiseBufferNode {
    fn process_block(
        &mut self,
        _inputs: &[&[f32]],
        output: &mut [f32],
        _sample_rate: f32,
        _context: &ProcessContext,
    ) {
        if self.stopped || self.buffer.is_empty() {
            output.fill(0.0);
            return;
        }

        for out in output.iter_mut() {
            *out = self.buffer[self.position];
            self.position += 1;
            if self.position == self.buffer.len() {
                self.position = 0;
            }
        }
    }

    fn input_nodes(&self) -> Vec<NodeId> {
        vec![]
    }

    fn name(&self) -> &str {
        "NoiseBufferNode"
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_pink_noise_seed_reproducibility() {
        let a = pink_noise_buffer(1000, &mut StdRng::seed_from_u64(99999));
        let b = pink_noise_buffer(1000, &mut StdRng::seed_from_u64(99999));
        assert_eq!(a, b);

        let c = pink_noise_buffer(1000, &mut StdRng::seed_from_u64(11111));
        assert_ne!(a, c, "Different seeds should produce different pink noise");
    }

    #[test]
    fn test_pink_noise_is_bounded_and_centered() {
        let output = pink_noise_buffer(88200, &mut StdRng::seed_from_u64(42));

        let rms = (output.iter().map(|s| s * s).sum::<f32>() / output.len() as f32).sqrt();
        assert!(rms > 0.05 && rms < 0.5, "rms {} outside expected level", rms);

        let peak = output.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak < 2.0, "peak {} indicates a runaway filter", peak);

        let mean: f32 = output.iter().sum::<f32>() / output.len() as f32;
        assert!(mean.abs() < 0.05, "Mean {} not close to zero", mean);
    }

    #[test]
    fn test_pink_noise_has_low_frequency_bias() {
        // Adjacent pink samples are strongly correlated; white noise is not
        let output = pink_noise_buffer(8192, &mut StdRng::seed_from_u64(12345));

        let energy: f32 = output.iter().map(|s| s * s).sum();
        let lag1: f32 = output.windows(2).map(|w| w[0] * w[1]).sum();
        let autocorr = lag1 / energy;

        assert!(
            autocorr > 0.3,
            "Pink noise lag-1 autocorrelation {} should show low-frequency bias",
            autocorr
        );
    }

    #[test]
    fn test_buffer_node_loops() {
        let mut node = NoiseBufferNode::new(vec![0.1, 0.2, 0.3]);
        let context = ProcessContext::new(0, 7, 44100.0);
        let mut output = vec![0.0; 7];

        node.process_block(&[], &mut output, 44100.0, &context);

        assert_eq!(output, vec![0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1]);
    }

    #[test]
    fn test_stopped_buffer_node_is_silent() {
        let mut node = NoiseBufferNode::new(vec![0.5; 16]);
        node.stop();
        node.stop();

        let context = ProcessContext::new(0, 16, 44100.0);
        let mut output = vec![1.0; 16];
        node.process_block(&[], &mut output, 44100.0, &context);

        assert!(output.iter().all(|&s| s == 0.0));
    }
}
