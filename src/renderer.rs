//! Audio-thread side of the stimulus engine
//!
//! The control thread never touches a sounding graph directly. It queues
//! commands; the output callback applies them at the start of its next
//! buffer. A superseded chain fades out over the release time and is
//! dropped on the audio thread before the next chain starts, so at most one
//! chain is ever audible.

use crate::audio_graph::AudioGraph;
use crate::audio_node::{BLOCK_SIZE, MIN_RAMP_SECONDS};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

pub type ChainId = u64;

/// Renderer shared between the control thread and the output callback
pub type SharedRenderer = Arc<Mutex<Renderer>>;

/// Lock a shared renderer, recovering from a poisoned lock
pub fn lock(renderer: &SharedRenderer) -> MutexGuard<'_, Renderer> {
    renderer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Output format negotiated with the backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

pub enum RenderCommand {
    /// Fade out whatever is sounding, then start this chain
    Install { id: ChainId, graph: AudioGraph },
    /// Fade out a chain if it is sounding or waiting
    Release { id: ChainId },
    /// Fade out everything
    ReleaseAll,
}

struct Voice {
    id: ChainId,
    graph: AudioGraph,
    /// Frames left in the release ramp, if releasing
    release_remaining: Option<usize>,
}

pub struct Renderer {
    format: StreamFormat,
    release_frames: usize,
    pending: VecDeque<RenderCommand>,
    current: Option<Voice>,
    queued: Option<Voice>,
    /// Per-channel scratch buffers, one block each
    scratch: Vec<Vec<f32>>,
    frames_rendered: u64,
}

impl Renderer {
    /// Release times below `MIN_RAMP_SECONDS` are raised to it
    pub fn new(format: StreamFormat, release_seconds: f32) -> Self {
        let channels = format.channels.max(1);
        let release_seconds = if release_seconds.is_finite() {
            release_seconds.max(MIN_RAMP_SECONDS)
        } else {
            MIN_RAMP_SECONDS
        };
        Self {
            format,
            release_frames: ((release_seconds * format.sample_rate as f32).round() as usize).max(1),
            pending: VecDeque::new(),
            current: None,
            queued: None,
            scratch: vec![vec![0.0; BLOCK_SIZE]; channels],
            frames_rendered: 0,
        }
    }

    pub fn shared(format: StreamFormat, release_seconds: f32) -> SharedRenderer {
        Arc::new(Mutex::new(Self::new(format, release_seconds)))
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Time a superseded chain takes to fade out
    pub fn release_duration(&self) -> Duration {
        Duration::from_secs_f64(self.release_frames as f64 / self.format.sample_rate.max(1) as f64)
    }

    /// Queue a chain to replace whatever is sounding
    pub fn install(&mut self, id: ChainId, graph: AudioGraph) {
        self.pending.push_back(RenderCommand::Install { id, graph });
    }

    pub fn release(&mut self, id: ChainId) {
        self.pending.push_back(RenderCommand::Release { id });
    }

    pub fn release_all(&mut self) {
        self.pending.push_back(RenderCommand::ReleaseAll);
    }

    /// Chain currently producing sound (including one fading out)
    pub fn sounding_chain(&self) -> Option<ChainId> {
        self.current.as_ref().map(|v| v.id)
    }

    /// Number of chains producing sound: never more than one
    pub fn sounding_chains(&self) -> usize {
        usize::from(self.current.is_some())
    }

    /// Chain waiting for the current one to finish its release
    pub fn queued_chain(&self) -> Option<ChainId> {
        self.queued.as_ref().map(|v| v.id)
    }

    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing sounds, waits or is pending
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queued.is_none() && self.pending.is_empty()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    fn apply_commands(&mut self) {
        while let Some(command) = self.pending.pop_front() {
            match command {
                RenderCommand::Install { id, graph } => {
                    debug!("installing chain {}", id);
                    self.begin_release();
                    let voice = Voice {
                        id,
                        graph,
                        release_remaining: None,
                    };
                    if self.current.is_none() {
                        self.current = Some(voice);
                    } else {
                        // Replaces (and drops) any chain that never got to sound
                        self.queued = Some(voice);
                    }
                }
                RenderCommand::Release { id } => {
                    if self.queued.as_ref().map(|v| v.id) == Some(id) {
                        self.queued = None;
                    }
                    if self.current.as_ref().map(|v| v.id) == Some(id) {
                        self.begin_release();
                    }
                }
                RenderCommand::ReleaseAll => {
                    self.queued = None;
                    self.begin_release();
                }
            }
        }
    }

    fn begin_release(&mut self) {
        let release_frames = self.release_frames;
        if let Some(voice) = self.current.as_mut() {
            if voice.release_remaining.is_none() {
                voice.release_remaining = Some(release_frames);
            }
        }
        self.retire_finished();
    }

    /// Drop a fully released chain and promote the queued one
    fn retire_finished(&mut self) {
        if let Some(0) = self.current.as_ref().and_then(|v| v.release_remaining) {
            if let Some(mut voice) = self.current.take() {
                voice.graph.stop();
                debug!("chain {} released", voice.id);
            }
            self.current = self.queued.take();
        }
    }

    /// Render interleaved output. Used directly by offline backends and by
    /// the device callback through `process_audio`.
    pub fn render(&mut self, output: &mut [f32]) {
        self.apply_commands();

        let channels = self.format.channels.max(1);
        let total_frames = output.len() / channels;
        let mut frame = 0;

        while frame < total_frames {
            let frames = (total_frames - frame).min(BLOCK_SIZE);
            let out = &mut output[frame * channels..(frame + frames) * channels];
            self.render_block(out, frames, channels);
            frame += frames;
            self.retire_finished();
        }

        self.frames_rendered += total_frames as u64;
    }

    fn render_block(&mut self, out: &mut [f32], frames: usize, channels: usize) {
        let Some(voice) = self.current.as_mut() else {
            out.fill(0.0);
            return;
        };

        voice.graph.process_block(&mut self.scratch, frames);

        for i in 0..frames {
            let gain = match voice.release_remaining.as_mut() {
                Some(remaining) if *remaining == 0 => 0.0,
                Some(remaining) => {
                    let g = *remaining as f32 / self.release_frames.max(1) as f32;
                    *remaining -= 1;
                    g
                }
                None => 1.0,
            };
            for ch in 0..channels {
                out[i * channels + ch] = self.scratch[ch][i] * gain;
            }
        }
    }

    /// Render into a device buffer of any sample type
    pub fn process_audio<T>(&mut self, output: &mut [T], interleaved: &mut Vec<f32>)
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        interleaved.resize(output.len(), 0.0);
        self.render(interleaved);
        for (out, &sample) in output.iter_mut().zip(interleaved.iter()) {
            *out = T::from_sample(sample);
        }
    }
}
