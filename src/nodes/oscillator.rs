/// Sine oscillator node - the tone source of every tonal stimulus
///
/// Frequency is read per sample from an input node, so the same oscillator
/// serves fixed tones and LFO-modulated sweeps. Phase is tracked in f64 to
/// keep long-running tones free of drift.

use crate::audio_node::{AudioNode, NodeId, ProcessContext};
use std::f64::consts::TAU;

/// Sine oscillator with a frequency input
///
/// # Example
/// ```ignore
/// let freq = ConstantNode::new(4000.0);          // NodeId 0
/// let osc = OscillatorNode::new(0, 4000.0);      // NodeId 1
/// ```
pub struct OscillatorNode {
    freq_input: NodeId,
    /// Nominal frequency, reported for inspection (the carrier for sweeps).
    /// None for sub-audio modulators.
    nominal_hz: Option<f32>,
    phase: f64,
    stopped: bool,
}

impl OscillatorNode {
    /// # Parameters
    /// - `freq_input`: NodeId providing frequency in Hz
    /// - `nominal_hz`: Frequency reported by `frequency()`
    pub fn new(freq_input: NodeId, nominal_hz: f32) -> Self {
        Self {
            freq_input,
            nominal_hz: Some(nominal_hz),
            phase: 0.0,
            stopped: false,
        }
    }

    /// LFO that does not report a frequency
    pub fn modulator(freq_input: NodeId) -> Self {
        Self {
            freq_input,
            nominal_hz: None,
            phase: 0.0,
            stopped: false,
        }
    }

    /// Current phase (0.0 to 1.0)
    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl AudioNode for OscillatorNode {
    fn process_block(
        &mut self,
        inputs: &[&[f32]],
        output: &mut [f32],
        sample_rate: f32,
        _context: &ProcessContext,
    ) {
        if self.stopped {
            output.fill(0.0);
            return;
        }

        debug_assert!(
            !inputs.is_empty(),
            "OscillatorNode requires frequency input"
        );

        let freq_buffer = inputs[0];
        let sr = sample_rate as f64;

        for (out, &freq) in output.iter_mut().zip(freq_buffer.iter()) {
            *out = (self.phase * TAU).sin() as f32;

            self.phase += freq as f64 / sr;
            self.phase = self.phase.rem_euclid(1.0);
        }
    }

    fn input_nodes(&self) -> Vec<NodeId> {
        vec![self.freq_input]
    }

    fn name(&self) -> &str {
        "OscillatorNode"
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn frequency(&self) -> Option<f32> {
        self.nominal_hz
    }
}
