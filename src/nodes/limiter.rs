/// Limiter node - output protection at the end of every stimulus chain
///
/// A peak envelope follower (separate attack and release) drives smooth gain
/// reduction whenever the envelope exceeds the threshold, followed by a hard
/// ceiling at the same level so no sample ever escapes it.
///
/// Two limiters built with `linked` share a detector: each follows the louder
/// of the pair, so both channels get the same gain reduction and the stereo
/// balance survives limiting.
use crate::audio_node::{AudioNode, NodeId, ProcessContext};

/// Limiter node
///
/// The limiting formula is:
/// ```text
/// threshold_linear = 10^(threshold_db / 20)
/// env = peak follower of |input| (attack/release one-pole)
/// gain = min(1, threshold_linear / env)
/// output = clamp(input * gain, -threshold_linear, threshold_linear)
/// ```
///
/// # Example
/// ```ignore
/// let gain = GainNode::new(1, 2, 1.0);                    // NodeId 3
/// let limiter = LimiterNode::new(3, -1.0, 0.003, 0.25);   // NodeId 4
///
/// // Stereo pair, left on 3 and right on 5
/// let left = LimiterNode::linked(3, 5, -1.0, 0.003, 0.25);
/// let right = LimiterNode::linked(5, 3, -1.0, 0.003, 0.25);
/// ```
pub struct LimiterNode {
    input: NodeId,
    /// Other channel of a stereo pair, read by the detector only
    link: Option<NodeId>,
    threshold_db: f32,
    attack_seconds: f32,
    release_seconds: f32,
    envelope: f32,
}

impl LimiterNode {
    /// # Parameters
    /// - `input`: Audio signal to limit
    /// - `threshold_db`: Threshold and ceiling in dBFS (e.g. -1.0)
    /// - `attack_seconds`: Envelope attack time
    /// - `release_seconds`: Envelope release time
    pub fn new(
        input: NodeId,
        threshold_db: f32,
        attack_seconds: f32,
        release_seconds: f32,
    ) -> Self {
        Self {
            input,
            link: None,
            threshold_db,
            attack_seconds,
            release_seconds,
            envelope: 0.0,
        }
    }

    /// Limiter whose detector follows max(|input|, |link|)
    pub fn linked(
        input: NodeId,
        link: NodeId,
        threshold_db: f32,
        attack_seconds: f32,
        release_seconds: f32,
    ) -> Self {
        Self {
            link: Some(link),
            ..Self::new(input, threshold_db, attack_seconds, release_seconds)
        }
    }

    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    pub fn threshold_linear(&self) -> f32 {
        10.0_f32.powf(self.threshold_db / 20.0)
    }

    /// Current gain reduction in dB (0 when not limiting)
    pub fn gain_reduction_db(&self) -> f32 {
        let threshold = self.threshold_linear();
        if self.envelope > threshold {
            20.0 * (threshold / self.envelope).log10()
        } else {
            0.0
        }
    }
}

/// One-pole smoothing coefficient for a time constant
fn coefficient(seconds: f32, sample_rate: f32) -> f32 {
    if seconds <= 0.0 {
        0.0
    } else {
        (-1.0 / (seconds * sample_rate)).exp()
    }
}

impl AudioNode for LimiterNode {
    fn process_block(
        &mut self,
        inputs: &[&[f32]],
        output: &mut [f32],
        sample_rate: f32,
        _context: &ProcessContext,
    ) {
        debug_assert!(!inputs.is_empty(), "LimiterNode requires signal input");

        let threshold = self.threshold_linear();
        let attack = coefficient(self.attack_seconds, sample_rate);
        let release = coefficient(self.release_seconds, sample_rate);

        let link = inputs.get(1).copied();

        for (i, (out, &sample)) in output.iter_mut().zip(inputs[0].iter()).enumerate() {
            let level = match link {
                Some(other) => sample.abs().max(other.get(i).map_or(0.0, |s| s.abs())),
                None => sample.abs(),
            };
            let coeff = if level > self.envelope { attack } else { release };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * level;

            let gain = if self.envelope > threshold {
                threshold / self.envelope
            } else {
                1.0
            };

            *out = (sample * gain).clamp(-threshold, threshold);
        }
    }

    fn input_nodes(&self) -> Vec<NodeId> {
        match self.link {
            Some(link) => vec![self.input, link],
            None => vec![self.input],
        }
    }

    fn name(&self) -> &str {
        "LimiterNode"
    }

    fn stop(&mut self) {
        self.envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(limiter: &mut LimiterNode, input: &[f32]) -> Vec<f32> {
        let context = ProcessContext::new(0, input.len(), 44100.0);
        let mut output = vec![0.0; input.len()];
        limiter.process_block(&[input], &mut output, 44100.0, &context);
        output
    }

    #[test]
    fn test_limiter_transparent_below_threshold() {
        let mut limiter = LimiterNode::new(0, -1.0, 0.003, 0.25);
        let input: Vec<f32> = (0..512).map(|i| 0.3 * (i as f32 * 0.05).sin()).collect();

        let output = run(&mut limiter, &input);

        for (a, b) in input.iter().zip(output.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert_eq!(limiter.gain_reduction_db(), 0.0);
    }

    #[test]
    fn test_limiter_never_exceeds_threshold() {
        let mut limiter = LimiterNode::new(0, -6.0, 0.003, 0.25);
        let input: Vec<f32> = (0..4096).map(|i| 2.0 * (i as f32 * 0.1).sin()).collect();

        let output = run(&mut limiter, &input);
        let ceiling = limiter.threshold_linear();

        assert!(output.iter().all(|s| s.abs() <= ceiling + 1e-6));
        assert!(limiter.gain_reduction_db() < 0.0);
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_linked_pair_keeps_channel_balance() {
        let left_in: Vec<f32> = (0..8192).map(|i| 2.0 * (i as f32 * 0.1).sin()).collect();
        let right_in: Vec<f32> = left_in.iter().map(|s| s * 0.1).collect();

        let mut left = LimiterNode::linked(0, 1, -6.0, 0.003, 0.25);
        let mut right = LimiterNode::linked(1, 0, -6.0, 0.003, 0.25);
        let context = ProcessContext::new(0, left_in.len(), 44100.0);
        let mut left_out = vec![0.0; left_in.len()];
        let mut right_out = vec![0.0; right_in.len()];
        let (l, r) = (left_in.as_slice(), right_in.as_slice());
        left.process_block(&[l, r], &mut left_out, 44100.0, &context);
        right.process_block(&[r, l], &mut right_out, 44100.0, &context);

        assert_eq!(left.input_nodes(), vec![0, 1]);
        assert_eq!(left.gain_reduction_db(), right.gain_reduction_db());

        // The quiet channel is pulled down with the loud one
        let right_peak = peak(&right_out[4096..]);
        assert!(right_peak < 0.15, "right peak {}", right_peak);

        // Below the ceiling both channels carry the same gain, so the 10:1
        // input balance survives
        let ceiling = left.threshold_linear();
        let mut compared = 0;
        for (l, r) in left_out.iter().zip(&right_out).skip(4096) {
            if l.abs() < 0.95 * ceiling && r.abs() > 1e-3 {
                assert!((l / r - 10.0).abs() < 1e-3, "ratio {}", l / r);
                compared += 1;
            }
        }
        assert!(compared > 1000);

        // Unlinked, the quiet channel passes untouched and the balance collapses
        let mut solo = LimiterNode::new(0, -6.0, 0.003, 0.25);
        let solo_out = run(&mut solo, &right_in);
        assert!(peak(&solo_out[4096..]) > 0.19);
    }

    #[test]
    fn test_limiter_stop_clears_envelope() {
        let mut limiter = LimiterNode::new(0, -6.0, 0.0, 0.25);
        run(&mut limiter, &[1.0; 64]);
        assert!(limiter.gain_reduction_db() < 0.0);

        limiter.stop();
        assert_eq!(limiter.gain_reduction_db(), 0.0);
    }
}
