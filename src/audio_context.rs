//! Audio output context: owns a backend and the shared renderer
//!
//! Opening the device is deferred until the first stimulus is requested.
//! `CpalBackend` plays through the host's default output device (JACK,
//! ALSA, CoreAudio, WASAPI); `OfflineBackend` has no device and lets the
//! caller pull rendered frames.

use crate::audio_graph::AudioGraph;
use crate::audio_node::BLOCK_SIZE;
use crate::error::{EngineError, EngineResult};
use crate::renderer::{self, ChainId, Renderer, SharedRenderer, StreamFormat};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Slack on top of the release time for the device to pull its last buffers
const DRAIN_MARGIN: Duration = Duration::from_millis(100);
const DRAIN_POLL: Duration = Duration::from_millis(2);

/// Seam between the engine and an audio output
pub trait AudioBackend {
    fn name(&self) -> &str;

    /// Acquire the output and report its format
    fn open(&mut self) -> EngineResult<StreamFormat>;

    /// Begin pulling audio from the renderer
    fn start(&mut self, renderer: SharedRenderer) -> EngineResult<()>;

    /// Keep pulling until the renderer goes idle or `timeout` passes
    fn drain(&mut self, renderer: &SharedRenderer, timeout: Duration);

    /// Release the output. Safe to call more than once.
    fn close(&mut self);
}

/// Real-time output through cpal
pub struct CpalBackend {
    device: Option<cpal::Device>,
    config: Option<cpal::SupportedStreamConfig>,
    stream: Option<cpal::Stream>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            device: None,
            config: None,
            stream: None,
        }
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        renderer: SharedRenderer,
    ) -> EngineResult<cpal::Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let mut interleaved: Vec<f32> = Vec::new();
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut renderer = renderer::lock(&renderer);
                    renderer.process_audio(data, &mut interleaved);
                },
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| EngineError::AudioUnavailable(e.to_string()))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&mut self) -> EngineResult<StreamFormat> {
        let host = cpal::default_host();
        info!("Audio host: {:?}", host.id());

        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::AudioUnavailable("No audio output device found".into()))?;
        if let Ok(name) = device.name() {
            info!("Audio device: {}", name);
        }

        let config = device
            .default_output_config()
            .map_err(|e| EngineError::AudioUnavailable(e.to_string()))?;
        info!("Audio config: {:?}", config);

        let format = StreamFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels() as usize,
        };
        self.device = Some(device);
        self.config = Some(config);
        Ok(format)
    }

    fn start(&mut self, renderer: SharedRenderer) -> EngineResult<()> {
        let (Some(device), Some(config)) = (self.device.as_ref(), self.config.as_ref()) else {
            return Err(EngineError::AudioUnavailable("device not opened".into()));
        };

        let stream_config: cpal::StreamConfig = config.clone().into();
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(device, &stream_config, renderer),
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(device, &stream_config, renderer),
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(device, &stream_config, renderer),
            other => {
                return Err(EngineError::AudioUnavailable(format!(
                    "Unsupported sample format {:?}",
                    other
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| EngineError::AudioUnavailable(e.to_string()))?;
        info!("Audio stream started at {} Hz", stream_config.sample_rate.0);

        self.stream = Some(stream);
        Ok(())
    }

    fn drain(&mut self, renderer: &SharedRenderer, timeout: Duration) {
        if self.stream.is_none() {
            return;
        }
        // The stream callback does the rendering; wait for it
        let deadline = Instant::now() + timeout;
        while !renderer::lock(renderer).is_idle() {
            if Instant::now() >= deadline {
                warn!("Audio release still running after {:?}", timeout);
                return;
            }
            thread::sleep(DRAIN_POLL);
        }
        debug!("Audio release drained");
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("Audio stream closed");
        }
        self.device = None;
        self.config = None;
    }
}

/// Device-free backend; frames are pulled through an `OfflineTap`
pub struct OfflineBackend {
    format: StreamFormat,
    slot: Arc<Mutex<Option<SharedRenderer>>>,
    failure: Option<String>,
}

impl OfflineBackend {
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            slot: Arc::new(Mutex::new(None)),
            failure: None,
        }
    }

    /// A backend whose `open` always fails, as when no device is present
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let mut backend = Self::new(StreamFormat {
            sample_rate: 44100,
            channels: 2,
        });
        backend.failure = Some(reason.into());
        backend
    }

    /// Handle for pulling rendered audio; valid before and after `start`
    pub fn tap(&self) -> OfflineTap {
        OfflineTap {
            format: self.format,
            slot: self.slot.clone(),
        }
    }
}

impl AudioBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    fn open(&mut self) -> EngineResult<StreamFormat> {
        match &self.failure {
            Some(reason) => Err(EngineError::AudioUnavailable(reason.clone())),
            None => Ok(self.format),
        }
    }

    fn start(&mut self, renderer: SharedRenderer) -> EngineResult<()> {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(renderer);
        Ok(())
    }

    /// Renders the release into a discarded buffer, bounded by `timeout`
    /// of audio time
    fn drain(&mut self, renderer: &SharedRenderer, timeout: Duration) {
        let channels = self.format.channels.max(1);
        let limit = (timeout.as_secs_f64() * self.format.sample_rate as f64).ceil() as usize;
        let mut scratch = vec![0.0; BLOCK_SIZE * channels];
        let mut rendered = 0;
        let mut renderer = renderer::lock(renderer);
        while !renderer.is_idle() && rendered < limit {
            renderer.render(&mut scratch);
            rendered += BLOCK_SIZE;
        }
    }

    fn close(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *slot = None;
    }
}

#[derive(Clone)]
pub struct OfflineTap {
    format: StreamFormat,
    slot: Arc<Mutex<Option<SharedRenderer>>>,
}

impl OfflineTap {
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Render `frames` interleaved frames; silence when not started
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0; frames * self.format.channels.max(1)];
        if let Some(shared) = self.renderer() {
            renderer::lock(&shared).render(&mut output);
        }
        output
    }

    /// The renderer behind a started backend
    pub fn renderer(&self) -> Option<SharedRenderer> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

/// Owns a backend and, once opened, the renderer it plays from
pub struct AudioContext {
    backend: Box<dyn AudioBackend>,
    release_seconds: f32,
    renderer: Option<SharedRenderer>,
}

impl AudioContext {
    /// Does not touch the device
    pub fn new(backend: Box<dyn AudioBackend>, release_seconds: f32) -> Self {
        Self {
            backend,
            release_seconds,
            renderer: None,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_open(&self) -> bool {
        self.renderer.is_some()
    }

    /// Open the backend on first use
    ///
    /// # Errors
    /// `AudioUnavailable` when the backend cannot be opened or started
    pub fn ensure_open(&mut self) -> EngineResult<StreamFormat> {
        if let Some(renderer) = &self.renderer {
            return Ok(renderer::lock(renderer).format());
        }

        let format = self.backend.open()?;
        let shared = Renderer::shared(format, self.release_seconds);
        if let Err(e) = self.backend.start(shared.clone()) {
            self.backend.close();
            return Err(e);
        }
        info!(
            "Audio context opened ({}): {} Hz, {} channels",
            self.backend.name(),
            format.sample_rate,
            format.channels
        );
        self.renderer = Some(shared);
        Ok(format)
    }

    pub fn install(&self, id: ChainId, graph: AudioGraph) -> EngineResult<()> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| EngineError::AudioUnavailable("audio context not open".into()))?;
        renderer::lock(renderer).install(id, graph);
        Ok(())
    }

    pub fn release(&self, id: ChainId) {
        if let Some(renderer) = &self.renderer {
            renderer::lock(renderer).release(id);
        }
    }

    pub fn release_all(&self) {
        if let Some(renderer) = &self.renderer {
            renderer::lock(renderer).release_all();
        }
    }

    pub fn renderer(&self) -> Option<SharedRenderer> {
        self.renderer.clone()
    }

    /// Release everything, let the release play out, then close the
    /// backend. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(shared) = self.renderer.take() {
            let release = {
                let mut renderer = renderer::lock(&shared);
                renderer.release_all();
                renderer.release_duration()
            };
            self.backend.drain(&shared, release + DRAIN_MARGIN);
            info!("Audio context closed ({})", self.backend.name());
        }
        self.backend.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::ConstantNode;

    fn format() -> StreamFormat {
        StreamFormat {
            sample_rate: 8000,
            channels: 2,
        }
    }

    #[test]
    fn test_context_opens_lazily() {
        let backend = OfflineBackend::new(format());
        let tap = backend.tap();
        let mut context = AudioContext::new(Box::new(backend), 0.0);

        assert!(!context.is_open());
        assert!(tap.renderer().is_none());

        assert_eq!(context.ensure_open().unwrap(), format());
        assert!(context.is_open());
        assert!(tap.renderer().is_some());
    }

    #[test]
    fn test_unavailable_backend_reports_error() {
        let mut context = AudioContext::new(Box::new(OfflineBackend::unavailable("no device")), 0.0);
        let err = context.ensure_open().unwrap_err();
        assert!(err.is_audio_fault());
        assert!(!context.is_open());
    }

    #[test]
    fn test_install_before_open_fails() {
        let context = AudioContext::new(Box::new(OfflineBackend::new(format())), 0.0);
        let graph = AudioGraph::new(8000.0);
        assert!(context.install(1, graph).is_err());
    }

    #[test]
    fn test_tap_pulls_installed_chain() {
        let backend = OfflineBackend::new(format());
        let tap = backend.tap();
        let mut context = AudioContext::new(Box::new(backend), 0.0);
        context.ensure_open().unwrap();

        let mut graph = AudioGraph::new(8000.0);
        let c = graph.add_audio_node(Box::new(ConstantNode::new(0.1)));
        graph.set_output(c);
        graph.build().unwrap();
        context.install(7, graph).unwrap();

        let frames = tap.pull(100);
        assert_eq!(frames.len(), 200);
        assert!(frames.iter().all(|&s| (s - 0.1).abs() < 1e-7));

        context.close();
        context.close();
        assert!(tap.pull(10).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_close_plays_out_the_release() {
        let backend = OfflineBackend::new(format());
        let tap = backend.tap();
        // 20 ms at 8 kHz = 160 frames of release
        let mut context = AudioContext::new(Box::new(backend), 0.02);
        context.ensure_open().unwrap();

        let mut graph = AudioGraph::new(8000.0);
        let c = graph.add_audio_node(Box::new(ConstantNode::new(0.5)));
        graph.set_output(c);
        graph.build().unwrap();
        context.install(1, graph).unwrap();
        tap.pull(64);

        let shared = tap.renderer().unwrap();
        context.close();

        // The chain faded out before the backend let go of the renderer
        let renderer = renderer::lock(&shared);
        assert!(renderer.is_idle());
        assert!(renderer.frames_rendered() >= 64 + 160);
        assert!(tap.renderer().is_none());
    }
}
