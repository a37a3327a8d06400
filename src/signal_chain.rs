//! Signal chain builder: realizes one condition as a live stimulus chain
//!
//! # Lifecycle
//!
//! - `set_condition` tears down the current chain, then builds the new one
//!   completely off-line before handing it to the renderer. Nothing partial
//!   is ever installed.
//! - `stop_all` schedules a release of the current chain; the renderer fades
//!   it out and drops it on the audio thread.
//! - `dispose` stops everything and closes the audio context. The builder is
//!   unusable afterwards.
//!
//! The audio context is not opened until the first audible condition is
//! requested.

use crate::audio_context::{AudioBackend, AudioContext};
use crate::audio_graph::AudioGraph;
use crate::audio_node::{NodeId, MIN_RAMP_SECONDS};
use crate::condition::{Condition, ConditionId, Stimulus};
use crate::error::{EngineError, EngineResult};
use crate::nodes::{
    pink_noise_buffer, AdditionNode, ConstantNode, GainNode, LimiterNode, LowPassFilterNode,
    MultiplicationNode, NoiseBufferNode, OscillatorNode, RampNode,
};
use crate::renderer::ChainId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Tunable parameters of every stimulus chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    /// Linear fade-in applied to every audible chain
    pub fade_in_seconds: f32,
    /// Fade-out applied when a chain is superseded or stopped
    pub release_seconds: f32,
    /// Length of the looped pink noise buffer
    pub noise_buffer_seconds: f32,
    /// Fallback low-pass cutoff for noise conditions without one
    pub noise_cutoff_hz: f32,
    pub limiter_threshold_db: f32,
    pub limiter_attack_seconds: f32,
    pub limiter_release_seconds: f32,
    /// Fixed seed for noise buffers; random per chain when unset
    pub noise_seed: Option<u64>,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            fade_in_seconds: 0.5,
            release_seconds: 0.02,
            noise_buffer_seconds: 2.0,
            noise_cutoff_hz: 2000.0,
            limiter_threshold_db: -1.0,
            limiter_attack_seconds: 0.003,
            limiter_release_seconds: 0.25,
            noise_seed: None,
        }
    }
}

impl ChainSettings {
    pub fn validate(&self) -> EngineResult<()> {
        // A step in level is audible as a click
        let ramps = [
            ("fade_in_seconds", self.fade_in_seconds),
            ("release_seconds", self.release_seconds),
        ];
        if let Some((name, _)) = ramps
            .iter()
            .find(|(_, v)| !v.is_finite() || *v < MIN_RAMP_SECONDS)
        {
            return Err(EngineError::Config(format!(
                "{} must be at least {} s",
                name, MIN_RAMP_SECONDS
            )));
        }
        let non_negative = [
            ("limiter_attack_seconds", self.limiter_attack_seconds),
            ("limiter_release_seconds", self.limiter_release_seconds),
        ];
        if let Some((name, _)) = non_negative.iter().find(|(_, v)| *v < 0.0 || !v.is_finite()) {
            return Err(EngineError::Config(format!("{} must be >= 0", name)));
        }
        if self.noise_buffer_seconds <= 0.0 {
            return Err(EngineError::Config("noise_buffer_seconds must be > 0".into()));
        }
        if self.noise_cutoff_hz <= 0.0 {
            return Err(EngineError::Config("noise_cutoff_hz must be > 0".into()));
        }
        if self.limiter_threshold_db > 0.0 {
            return Err(EngineError::Config("limiter_threshold_db must be <= 0".into()));
        }
        Ok(())
    }
}

/// Read-only view of the live chain
#[derive(Debug, Clone, PartialEq)]
pub struct AudioGraphHandle {
    pub condition_id: ConditionId,
    /// None for silence, which installs nothing
    pub chain_id: Option<ChainId>,
    pub node_count: usize,
    pub node_names: Vec<String>,
    pub oscillator_frequencies: Vec<f32>,
    /// Channels with a dedicated route (0 for mono chains)
    pub channels: usize,
}

impl AudioGraphHandle {
    fn silent(condition_id: ConditionId) -> Self {
        Self {
            condition_id,
            chain_id: None,
            node_count: 0,
            node_names: Vec::new(),
            oscillator_frequencies: Vec::new(),
            channels: 0,
        }
    }

    fn describe(condition_id: ConditionId, chain_id: ChainId, graph: &AudioGraph) -> Self {
        Self {
            condition_id,
            chain_id: Some(chain_id),
            node_count: graph.node_count(),
            node_names: graph.node_names(),
            oscillator_frequencies: graph.oscillator_frequencies(),
            channels: graph.routed_channels(),
        }
    }
}

/// Fade-in → gain → limiter tail shared by every mono chain
fn faded_output(
    graph: &mut AudioGraph,
    source: NodeId,
    gain: f32,
    settings: &ChainSettings,
) -> NodeId {
    let ramp = graph.add_audio_node(Box::new(RampNode::new(gain, settings.fade_in_seconds)));
    let amp = graph.add_audio_node(Box::new(GainNode::new(source, ramp, 1.0)));
    graph.add_audio_node(Box::new(LimiterNode::new(
        amp,
        settings.limiter_threshold_db,
        settings.limiter_attack_seconds,
        settings.limiter_release_seconds,
    )))
}

/// Stereo tail: one fade-in for both channels and a linked limiter pair
fn faded_stereo_output(
    graph: &mut AudioGraph,
    left: NodeId,
    right: NodeId,
    gain: f32,
    settings: &ChainSettings,
) -> (NodeId, NodeId) {
    let ramp = graph.add_audio_node(Box::new(RampNode::new(gain, settings.fade_in_seconds)));
    let left_amp = graph.add_audio_node(Box::new(GainNode::new(left, ramp, 1.0)));
    let right_amp = graph.add_audio_node(Box::new(GainNode::new(right, ramp, 1.0)));
    let limiter = |input, link| {
        LimiterNode::linked(
            input,
            link,
            settings.limiter_threshold_db,
            settings.limiter_attack_seconds,
            settings.limiter_release_seconds,
        )
    };
    let left_out = graph.add_audio_node(Box::new(limiter(left_amp, right_amp)));
    let right_out = graph.add_audio_node(Box::new(limiter(right_amp, left_amp)));
    (left_out, right_out)
}

fn tone(graph: &mut AudioGraph, frequency_hz: f32) -> NodeId {
    let freq = graph.add_audio_node(Box::new(ConstantNode::new(frequency_hz)));
    graph.add_audio_node(Box::new(OscillatorNode::new(freq, frequency_hz)))
}

/// Build the graph for a condition without touching any audio device
///
/// Returns `None` for silent conditions.
pub fn build_chain<R: Rng + ?Sized>(
    condition: &Condition,
    settings: &ChainSettings,
    sample_rate: f32,
    rng: &mut R,
) -> EngineResult<Option<AudioGraph>> {
    if condition.is_silent() {
        return Ok(None);
    }

    let mut graph = AudioGraph::new(sample_rate);
    let gain = condition.gain;

    match condition.stimulus {
        Stimulus::Silence => return Ok(None),
        Stimulus::PinkNoise { cutoff_hz } => {
            let cutoff = if cutoff_hz > 0.0 {
                cutoff_hz
            } else {
                settings.noise_cutoff_hz
            };
            let frames = (settings.noise_buffer_seconds * sample_rate).round() as usize;
            let noise = graph.add_audio_node(Box::new(NoiseBufferNode::new(pink_noise_buffer(
                frames.max(1),
                rng,
            ))));
            let lpf = graph.add_audio_node(Box::new(LowPassFilterNode::new(
                noise,
                cutoff,
                sample_rate,
            )?));
            let out = faded_output(&mut graph, lpf, gain, settings);
            graph.set_output(out);
        }
        Stimulus::Tone { frequency_hz } => {
            let osc = tone(&mut graph, frequency_hz);
            let out = faded_output(&mut graph, osc, gain, settings);
            graph.set_output(out);
        }
        Stimulus::Sweep {
            center_hz,
            half_width_hz,
            rate_hz,
        } => {
            // frequency = center + sin(2π·rate·t) · half_width
            let carrier = graph.add_audio_node(Box::new(ConstantNode::new(center_hz)));
            let rate = graph.add_audio_node(Box::new(ConstantNode::new(rate_hz)));
            let lfo = graph.add_audio_node(Box::new(OscillatorNode::modulator(rate)));
            let width = graph.add_audio_node(Box::new(ConstantNode::new(half_width_hz)));
            let deviation = graph.add_audio_node(Box::new(MultiplicationNode::new(lfo, width)));
            let freq = graph.add_audio_node(Box::new(AdditionNode::new(carrier, deviation)));
            let osc = graph.add_audio_node(Box::new(OscillatorNode::new(freq, center_hz)));
            let out = faded_output(&mut graph, osc, gain, settings);
            graph.set_output(out);
        }
        Stimulus::Binaural {
            base_frequency_hz,
            beat_frequency_hz,
        } => {
            let left_osc = tone(&mut graph, base_frequency_hz);
            let right_osc = tone(&mut graph, base_frequency_hz + beat_frequency_hz);
            let (left, right) =
                faded_stereo_output(&mut graph, left_osc, right_osc, gain, settings);
            graph.set_channel_output(0, left);
            graph.set_channel_output(1, right);
        }
    }

    graph.build()?;
    Ok(Some(graph))
}

/// Owns the audio context and the single live chain
pub struct SignalChainBuilder {
    context: AudioContext,
    settings: ChainSettings,
    handle: Option<AudioGraphHandle>,
    next_chain_id: ChainId,
    noise_rng: StdRng,
    disposed: bool,
}

impl SignalChainBuilder {
    pub fn new(backend: Box<dyn AudioBackend>, settings: ChainSettings) -> Self {
        let noise_rng = match settings.noise_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            context: AudioContext::new(backend, settings.release_seconds),
            settings,
            handle: None,
            next_chain_id: 1,
            noise_rng,
            disposed: false,
        }
    }

    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    /// The live chain, if any
    pub fn handle(&self) -> Option<&AudioGraphHandle> {
        self.handle.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    /// Replace the live chain with one realizing `condition`
    ///
    /// # Errors
    /// - `ResourceClosed` after `dispose`
    /// - `AudioUnavailable` when the output cannot be opened, or when a
    ///   binaural condition meets a device with fewer than two channels; no
    ///   chain is left
    /// - `InvalidGraph` when the condition cannot be realized at this sample rate
    pub fn set_condition(&mut self, condition: &Condition) -> EngineResult<AudioGraphHandle> {
        if self.disposed {
            return Err(EngineError::ResourceClosed);
        }
        self.stop_all()?;

        if condition.is_silent() {
            let handle = AudioGraphHandle::silent(condition.id);
            self.handle = Some(handle.clone());
            debug!("condition {} is silent", condition.id);
            return Ok(handle);
        }

        let format = self.context.ensure_open()?;
        if matches!(condition.stimulus, Stimulus::Binaural { .. }) && format.channels < 2 {
            return Err(EngineError::AudioUnavailable(format!(
                "condition {} is binaural but the output has {} channel(s)",
                condition.id, format.channels
            )));
        }
        let graph = build_chain(
            condition,
            &self.settings,
            format.sample_rate as f32,
            &mut self.noise_rng,
        )?
        .ok_or_else(|| EngineError::InvalidGraph(format!("condition {} built no graph", condition.id)))?;

        let chain_id = self.next_chain_id;
        self.next_chain_id += 1;
        let handle = AudioGraphHandle::describe(condition.id, chain_id, &graph);

        self.context.install(chain_id, graph)?;
        info!(
            "condition {} ({}) playing as chain {} with {} nodes",
            condition.id, condition.name, chain_id, handle.node_count
        );
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Release the live chain. Without a chain this does nothing.
    ///
    /// # Errors
    /// `ResourceClosed` after `dispose`
    pub fn stop_all(&mut self) -> EngineResult<()> {
        if self.disposed {
            return Err(EngineError::ResourceClosed);
        }
        if let Some(handle) = self.handle.take() {
            if let Some(chain_id) = handle.chain_id {
                self.context.release(chain_id);
                debug!("released chain {} (condition {})", chain_id, handle.condition_id);
            }
        }
        Ok(())
    }

    /// Stop everything and close the audio context. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.handle = None;
        self.context.close();
        self.disposed = true;
    }
}

impl Drop for SignalChainBuilder {
    fn drop(&mut self) {
        self.dispose();
    }
}
