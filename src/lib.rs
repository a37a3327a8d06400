//! # Acouphene - psychoacoustic experiment runner
//!
//! Acouphene plays synthesized auditory stimuli (silence, filtered pink
//! noise, pure tones, frequency sweeps, binaural beats) while presenting
//! timed cognitive questions, then compares conditions statistically.
//!
//! ## Layers
//!
//! - **Stimulus engine**: [`signal_chain::SignalChainBuilder`] turns a
//!   [`condition::Condition`] into a block-processed [`audio_graph::AudioGraph`]
//!   and hands it to the [`renderer::Renderer`] that the output callback
//!   plays from. At most one chain sounds at a time.
//! - **Sequencing**: [`state_machine::ExperimentStateMachine`] walks
//!   practice, phase intros, pre-exposure and question phases, recording
//!   response latencies into an immutable [`session::SessionResult`].
//! - **Statistics**: [`aggregate::summarize`] and
//!   [`hypothesis::evaluate_session`] turn a finished session into
//!   per-condition statistics and a verdict.
//!
//! ## Quick Start
//!
//! ```no_run
//! use acouphene::audio_context::CpalBackend;
//! use acouphene::clock::SystemClock;
//! use acouphene::condition::ConditionCatalog;
//! use acouphene::config::Protocol;
//! use acouphene::question::QuestionBank;
//! use acouphene::sampler::QuestionSampler;
//! use acouphene::signal_chain::{ChainSettings, SignalChainBuilder};
//! use acouphene::state_machine::{ExperimentStateMachine, SessionPlan};
//!
//! # fn main() -> Result<(), acouphene::error::EngineError> {
//! let catalog = ConditionCatalog::default();
//! let bank = QuestionBank::builtin()?;
//! let plan = SessionPlan::generate(
//!     &Protocol::original(),
//!     &catalog,
//!     &bank,
//!     &mut QuestionSampler::from_entropy(),
//! )?;
//! let output = SignalChainBuilder::new(Box::new(CpalBackend::new()), ChainSettings::default());
//! let mut machine = ExperimentStateMachine::new(plan, catalog, output, SystemClock::new());
//!
//! machine.start()?;
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod audio_context;
pub mod audio_graph;
pub mod audio_node;
pub mod clock;
pub mod condition;
pub mod config;
pub mod countdown;
pub mod dependency_graph;
pub mod error;
pub mod hypothesis;
pub mod nodes;
pub mod question;
pub mod render;
pub mod renderer;
pub mod runner;
pub mod sampler;
pub mod session;
pub mod signal_chain;
pub mod state_machine;
pub mod stats;
pub mod store;

pub use error::{EngineError, EngineResult};
