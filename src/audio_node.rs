/// Block-based audio processing - core abstraction for stimulus chains
///
/// Every synthesized stimulus is a small graph of AudioNodes. The graph is
/// traversed once per block (512 frames) rather than once per sample.

pub type NodeId = usize;

/// Default block size in frames
pub const BLOCK_SIZE: usize = 512;

/// Shortest fade-in or release; every level change is at least this long
pub const MIN_RAMP_SECONDS: f32 = 0.005;

/// Context passed to all nodes during block processing
#[derive(Debug, Clone)]
pub struct ProcessContext {
    /// Frame offset of this block since the chain started sounding
    pub sample_offset: usize,

    /// Number of samples to process in this block (usually 512)
    pub block_size: usize,

    /// Sample rate (usually 44100.0 or 48000.0 Hz)
    pub sample_rate: f32,
}

impl ProcessContext {
    pub fn new(sample_offset: usize, block_size: usize, sample_rate: f32) -> Self {
        Self {
            sample_offset,
            block_size,
            sample_rate,
        }
    }

    /// Elapsed time in seconds at a frame offset within this block
    pub fn time_at_offset(&self, offset: usize) -> f64 {
        (self.sample_offset + offset) as f64 / self.sample_rate as f64
    }
}

/// Core trait for block-based audio processing
///
/// Nodes read from input buffers that have already been computed by their
/// dependencies, process the whole block, and write to `output`.
pub trait AudioNode: Send {
    /// Process an entire block of audio
    ///
    /// # Arguments
    /// * `inputs` - Input buffers, in the order returned by `input_nodes`
    /// * `output` - Output buffer to write to (length = block_size)
    /// * `sample_rate` - Current sample rate
    /// * `context` - Processing context
    fn process_block(
        &mut self,
        inputs: &[&[f32]],
        output: &mut [f32],
        sample_rate: f32,
        context: &ProcessContext,
    );

    /// Return list of input node IDs this node depends on
    ///
    /// Empty vec for source nodes.
    fn input_nodes(&self) -> Vec<NodeId>;

    /// Get a human-readable name for this node (for debugging)
    fn name(&self) -> &str {
        "AudioNode"
    }

    /// Stop producing sound. Must be safe to call more than once.
    fn stop(&mut self) {}

    /// Oscillator frequency, for nodes that have one
    fn frequency(&self) -> Option<f32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl AudioNode for Silent {
        fn process_block(
            &mut self,
            _inputs: &[&[f32]],
            output: &mut [f32],
            _sample_rate: f32,
            _context: &ProcessContext,
        ) {
            output.fill(0.0);
        }

        fn input_nodes(&self) -> Vec<NodeId> {
            vec![]
        }
    }

    #[test]
    fn test_process_context_time() {
        let ctx = ProcessContext::new(44100, 512, 44100.0);
        assert!((ctx.time_at_offset(0) - 1.0).abs() < 1e-12);
        assert!((ctx.time_at_offset(441) - 1.01).abs() < 1e-9);
    }

    #[test]
    fn test_default_trait_methods() {
        let mut node = Silent;
        assert_eq!(node.name(), "AudioNode");
        assert_eq!(node.frequency(), None);
        node.stop();
        node.stop();
    }
}
