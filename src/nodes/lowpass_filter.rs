/// Low-pass filter node - uses biquad IIR filtering
///
/// 2nd-order Butterworth low-pass with a fixed cutoff, used to darken the
/// pink noise control stimulus.
///
/// # Implementation Details
///
/// Uses biquad::DirectForm2Transposed for efficient IIR filtering with
/// minimal state and good numerical stability. Coefficients are computed
/// once, when the chain is built for a known sample rate.

use crate::audio_node::{AudioNode, NodeId, ProcessContext};
use crate::error::{EngineError, EngineResult};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Q_BUTTERWORTH_F32};

/// Low-pass filter node with a fixed cutoff
///
/// # Example
/// ```ignore
/// let noise = NoiseBufferNode::new(buffer);                      // NodeId 0
/// let lpf = LowPassFilterNode::new(0, 2000.0, 44100.0)?;          // NodeId 1
/// ```
pub struct LowPassFilterNode {
    input: NodeId,
    cutoff_hz: f32,
    filter: DirectForm2Transposed<f32>,
}

impl LowPassFilterNode {
    /// # Errors
    /// `InvalidGraph` when the cutoff is not below Nyquist or not positive
    pub fn new(input: NodeId, cutoff_hz: f32, sample_rate: f32) -> EngineResult<Self> {
        let coeffs = Coefficients::<f32>::from_params(
            biquad::Type::LowPass,
            sample_rate.hz(),
            cutoff_hz.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|e| {
            EngineError::InvalidGraph(format!(
                "lowpass cutoff {} Hz at {} Hz: {:?}",
                cutoff_hz, sample_rate, e
            ))
        })?;

        Ok(Self {
            input,
            cutoff_hz,
            filter: DirectForm2Transposed::<f32>::new(coeffs),
        })
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff_hz
    }

    /// Clear filter memory
    pub fn reset(&mut self) {
        self.filter.reset_state();
    }
}

impl AudioNode for LowPassFilterNode {
    fn process_block(
        &mut self,
        inputs: &[&[f32]],
        output: &mut [f32],
        _sample_rate: f32,
        _context: &ProcessContext,
    ) {
        debug_assert!(!inputs.is_empty(), "LowPassFilterNode requires signal input");

        for (out, &sample) in output.iter_mut().zip(inputs[0].iter()) {
            *out = self.filter.run(sample);
        }
    }

    fn input_nodes(&self) -> Vec<NodeId> {
        vec![self.input]
    }

    fn name(&self) -> &str {
        "LowPassFilterNode"
    }

    fn stop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{ConstantNode, OscillatorNode};

    fn calculate_rms(buffer: &[f32]) -> f32 {
        let sum_squares: f32 = buffer.iter().map(|x| x * x).sum();
        (sum_squares / buffer.len() as f32).sqrt()
    }

    /// RMS of a filtered sine, skipping the first block to let the filter settle
    fn filtered_rms(freq: f32) -> f32 {
        let sr = 44100.0;
        let context = ProcessContext::new(0, 512, sr);
        let mut freq_node = ConstantNode::new(freq);
        let mut osc = OscillatorNode::new(0, freq);
        let mut lpf = LowPassFilterNode::new(1, 2000.0, sr).unwrap();

        let mut freq_buf = vec![0.0; 512];
        let mut osc_buf = vec![0.0; 512];
        let mut out = vec![0.0; 512];
        let mut collected = Vec::new();

        for block in 0..8 {
            freq_node.process_block(&[], &mut freq_buf, sr, &context);
            osc.process_block(&[freq_buf.as_slice()], &mut osc_buf, sr, &context);
            lpf.process_block(&[osc_buf.as_slice()], &mut out, sr, &context);
            if block > 0 {
                collected.extend_from_slice(&out);
            }
        }
        calculate_rms(&collected)
    }

    #[test]
    fn test_lowpass_passes_below_cutoff() {
        // Sine RMS is 0.707; 200 Hz should be essentially untouched
        let rms = filtered_rms(200.0);
        assert!(rms > 0.65, "200 Hz rms {} attenuated", rms);
    }

    #[test]
    fn test_lowpass_attenuates_above_cutoff() {
        // Two octaves above cutoff: ~-24 dB for a 2nd order Butterworth
        let rms = filtered_rms(8000.0);
        assert!(rms < 0.1, "8 kHz rms {} not attenuated", rms);
    }

    #[test]
    fn test_cutoff_above_nyquist_rejected() {
        let result = LowPassFilterNode::new(0, 30000.0, 44100.0);
        assert!(matches!(result, Err(EngineError::InvalidGraph(_))));
    }
}
