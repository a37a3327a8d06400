//! Offline rendering of a condition's stimulus
//!
//! Runs the same signal chain the live engine plays, through an
//! [`OfflineBackend`], and writes the result to a WAV file.

use crate::audio_context::OfflineBackend;
use crate::condition::Condition;
use crate::error::EngineResult;
use crate::renderer::StreamFormat;
use crate::signal_chain::{ChainSettings, SignalChainBuilder};
use std::path::Path;
use tracing::info;

/// Configuration for rendering audio
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved output channels
    pub channels: usize,
    /// Duration in seconds
    pub duration: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            duration: 2.0,
        }
    }
}

impl RenderConfig {
    pub fn frames(&self) -> usize {
        (self.duration.max(0.0) * self.sample_rate as f32).round() as usize
    }
}

/// Render a condition into interleaved samples
pub fn render_condition(
    condition: &Condition,
    settings: &ChainSettings,
    config: &RenderConfig,
) -> EngineResult<Vec<f32>> {
    let backend = OfflineBackend::new(StreamFormat {
        sample_rate: config.sample_rate,
        channels: config.channels,
    });
    let tap = backend.tap();
    let mut builder = SignalChainBuilder::new(Box::new(backend), settings.clone());
    builder.set_condition(condition)?;
    let samples = tap.pull(config.frames());
    builder.dispose();
    Ok(samples)
}

/// Render a condition to a 16-bit WAV file
pub fn render_to_file(
    condition: &Condition,
    settings: &ChainSettings,
    config: &RenderConfig,
    path: &Path,
) -> EngineResult<RenderStats> {
    let samples = render_condition(condition, settings, config)?;
    write_wav(path, &samples, config)?;
    info!(
        "Rendered condition {} ({}) to {}",
        condition.id,
        condition.name,
        path.display()
    );
    Ok(RenderStats::from_interleaved(&samples, config))
}

/// Write interleaved samples to a WAV file
pub fn write_wav(path: &Path, samples: &[f32], config: &RenderConfig) -> EngineResult<()> {
    let spec = hound::WavSpec {
        channels: config.channels as u16,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        // Clamp to prevent overflow
        let scaled = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_sample(scaled)?;
    }
    writer.finalize()?;
    Ok(())
}

/// One channel out of an interleaved buffer
pub fn channel(samples: &[f32], channels: usize, index: usize) -> Vec<f32> {
    samples
        .iter()
        .skip(index)
        .step_by(channels.max(1))
        .copied()
        .collect()
}

/// Frequency of the strongest FFT bin (Hann window), None for silence
pub fn dominant_frequency(samples: &[f32], sample_rate: f32) -> Option<f32> {
    use rustfft::{num_complex::Complex, FftPlanner};
    use std::f32::consts::PI;

    let n = samples.len();
    if n < 4 {
        return None;
    }
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);

    let mut spectrum: Vec<Complex<f32>> = samples
        .iter()
        .enumerate()
        .map(|(i, &sample)| {
            let window = 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos());
            Complex::new(sample * window, 0.0)
        })
        .collect();
    fft.process(&mut spectrum);

    let (bin, magnitude) = spectrum[1..n / 2]
        .iter()
        .enumerate()
        .map(|(i, c)| (i + 1, c.norm()))
        .fold((0, 0.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });
    if magnitude <= 1e-6 {
        return None;
    }
    Some(bin as f32 * sample_rate / n as f32)
}

/// Statistics about rendered audio
#[derive(Debug, Clone)]
pub struct RenderStats {
    pub duration: f32,
    pub frames: usize,
    /// Per channel
    pub rms: Vec<f32>,
    pub peak: f32,
    /// Per channel, None for silent channels
    pub dominant_hz: Vec<Option<f32>>,
}

impl RenderStats {
    pub fn from_interleaved(samples: &[f32], config: &RenderConfig) -> Self {
        let channels = config.channels.max(1);
        let frames = samples.len() / channels;
        let per_channel: Vec<Vec<f32>> = (0..channels).map(|c| channel(samples, channels, c)).collect();

        let rms = per_channel
            .iter()
            .map(|ch| {
                if ch.is_empty() {
                    0.0
                } else {
                    (ch.iter().map(|x| x * x).sum::<f32>() / ch.len() as f32).sqrt()
                }
            })
            .collect();

        Self {
            duration: frames as f32 / config.sample_rate as f32,
            frames,
            rms,
            peak: samples.iter().map(|x| x.abs()).fold(0.0f32, f32::max),
            dominant_hz: per_channel
                .iter()
                .map(|ch| dominant_frequency(ch, config.sample_rate as f32))
                .collect(),
        }
    }

    pub fn print_summary(&self) {
        println!("Render Statistics:");
        println!("  Duration:       {:.3} seconds", self.duration);
        println!("  Frames:         {}", self.frames);
        println!("  Peak:           {:.3}", self.peak);
        for (i, (rms, hz)) in self.rms.iter().zip(&self.dominant_hz).enumerate() {
            match hz {
                Some(hz) => println!("  Channel {}:      rms {:.3}, dominant {:.1} Hz", i, rms, hz),
                None => println!("  Channel {}:      rms {:.3}, silent", i, rms),
            }
        }
    }
}
