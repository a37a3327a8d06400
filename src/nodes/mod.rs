/// Audio node implementations for block-based buffer passing
///
/// This module contains concrete implementations of the AudioNode trait used
/// to build stimulus chains.
///
/// # Node Categories
///
/// ## Source Nodes (no inputs)
/// - [`constant::ConstantNode`] - Output constant value
/// - [`ramp::RampNode`] - Linear fade-in from 0 to a target level
/// - [`pink_noise::NoiseBufferNode`] - Looped pre-rendered pink noise
///
/// ## Math Nodes (combine signals)
/// - [`addition::AdditionNode`] - Add two signals
/// - [`multiplication::MultiplicationNode`] - Multiply two signals
/// - [`gain::GainNode`] - Apply a gain signal and a static level
///
/// ## Synthesis Nodes (generate audio)
/// - [`oscillator::OscillatorNode`] - Sine oscillator with frequency input
///
/// ## Filter and Dynamics Nodes (shape audio)
/// - [`lowpass_filter::LowPassFilterNode`] - 2nd-order Butterworth low-pass filter
/// - [`limiter::LimiterNode`] - Envelope-following peak limiter
pub mod addition;
pub mod constant;
pub mod gain;
pub mod limiter;
pub mod lowpass_filter;
pub mod multiplication;
pub mod oscillator;
pub mod pink_noise;
pub mod ramp;

pub use addition::AdditionNode;
pub use constant::ConstantNode;
pub use gain::GainNode;
pub use limiter::LimiterNode;
pub use lowpass_filter::LowPassFilterNode;
pub use multiplication::MultiplicationNode;
pub use oscillator::OscillatorNode;
pub use pink_noise::{pink_noise_buffer, KelletFilter, NoiseBufferNode};
pub use ramp::RampNode;
