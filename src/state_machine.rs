//! Experiment sequencing
//!
//! ```text
//! NotStarted → Practice → PhaseIntro → [PreExposure] → PhaseTest ─┬→ PhaseIntro
//!                                                                  └→ Complete
//! any live state ── abort ──→ Aborted
//! ```
//!
//! Every state has an `enter` and an `exit` action. Entering `PreExposure`
//! or `PhaseTest` starts the phase's stimulus; exiting either stops it and
//! drops the countdown. Exit actions also run on `abort` and on drop, so no
//! audio or timer outlives the state that owns it.
//!
//! A stimulus that cannot be realized does not stop the session. The phase
//! runs in silence, a warning is logged, and the fault is recorded in the
//! session metadata.

use crate::clock::Clock;
use crate::condition::{Condition, ConditionCatalog, ConditionId};
use crate::config::Protocol;
use crate::countdown::{Countdown, CountdownStatus};
use crate::error::{EngineError, EngineResult};
use crate::question::{Question, QuestionBank};
use crate::sampler::{PhaseAssignment, QuestionSampler};
use crate::session::{
    AudioFault, PhaseRecorder, ResponseRecord, SessionMetadata, SessionResult,
    SessionResultBuilder,
};
use crate::signal_chain::SignalChainBuilder;
use rand::Rng;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Where the stimulus of a phase goes
pub trait StimulusOutput {
    fn set_condition(&mut self, condition: &Condition) -> EngineResult<()>;
    fn stop_all(&mut self) -> EngineResult<()>;
}

impl StimulusOutput for SignalChainBuilder {
    fn set_condition(&mut self, condition: &Condition) -> EngineResult<()> {
        SignalChainBuilder::set_condition(self, condition).map(|_| ())
    }

    fn stop_all(&mut self) -> EngineResult<()> {
        SignalChainBuilder::stop_all(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotStarted,
    Practice { question: usize },
    PhaseIntro { phase: usize },
    PreExposure { phase: usize, remaining: u32 },
    PhaseTest { phase: usize, question: usize },
    Complete,
    Aborted,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::NotStarted => "not_started",
            State::Practice { .. } => "practice",
            State::PhaseIntro { .. } => "phase_intro",
            State::PreExposure { .. } => "pre_exposure",
            State::PhaseTest { .. } => "phase_test",
            State::Complete => "complete",
            State::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Complete | State::Aborted)
    }

    /// Phase index for phase-bound states
    pub fn phase(&self) -> Option<usize> {
        match *self {
            State::PhaseIntro { phase }
            | State::PreExposure { phase, .. }
            | State::PhaseTest { phase, .. } => Some(phase),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Practice { question } => write!(f, "practice (question {})", question + 1),
            State::PhaseIntro { phase } => write!(f, "phase {} intro", phase + 1),
            State::PreExposure { phase, remaining } => {
                write!(f, "phase {} pre-exposure ({} s left)", phase + 1, remaining)
            }
            State::PhaseTest { phase, question } => {
                write!(f, "phase {} question {}", phase + 1, question + 1)
            }
            other => f.write_str(other.name()),
        }
    }
}

/// Everything a session needs decided up front
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    protocol: String,
    seed: Option<u64>,
    phase_order: Vec<ConditionId>,
    assignment: PhaseAssignment,
    practice: Vec<Question>,
    pre_exposure_seconds: u32,
}

impl SessionPlan {
    /// Randomized plan: phase order, stratified questions and practice set
    ///
    /// # Errors
    /// `InsufficientQuestions` or `Config` when the protocol cannot run on
    /// this bank and catalog. Nothing is started in that case.
    pub fn generate<R: Rng>(
        protocol: &Protocol,
        catalog: &ConditionCatalog,
        bank: &QuestionBank,
        sampler: &mut QuestionSampler<R>,
    ) -> EngineResult<Self> {
        protocol.validate(catalog, bank)?;
        let phase_order = sampler.random_phase_order(&protocol.condition_ids);
        let assignment = sampler.allocate(bank, protocol.phase_count(), protocol.counts)?;
        let practice = sampler.practice_set(bank, protocol.practice_questions);
        Self::fixed(protocol, catalog, phase_order, assignment, practice, sampler.seed())
    }

    /// Explicit plan for reproducible runs
    pub fn fixed(
        protocol: &Protocol,
        catalog: &ConditionCatalog,
        phase_order: Vec<ConditionId>,
        assignment: PhaseAssignment,
        practice: Vec<Question>,
        seed: Option<u64>,
    ) -> EngineResult<Self> {
        let expected: BTreeSet<ConditionId> = protocol.condition_ids.iter().copied().collect();
        let actual: BTreeSet<ConditionId> = phase_order.iter().copied().collect();
        if actual != expected || phase_order.len() != protocol.condition_ids.len() {
            return Err(EngineError::Config(format!(
                "phase order {:?} is not a permutation of {:?}",
                phase_order, protocol.condition_ids
            )));
        }
        for &id in &phase_order {
            catalog.require(id)?;
        }
        if assignment.phase_count() != phase_order.len() {
            return Err(EngineError::Config(format!(
                "{} phases but {} question sets",
                phase_order.len(),
                assignment.phase_count()
            )));
        }
        if let Some((index, _)) = assignment.iter().find(|(_, q)| q.is_empty()) {
            return Err(EngineError::Config(format!("phase {} has no questions", index)));
        }

        Ok(Self {
            protocol: protocol.name.clone(),
            seed,
            phase_order,
            assignment,
            practice,
            pre_exposure_seconds: protocol.pre_exposure_seconds,
        })
    }

    pub fn phase_order(&self) -> &[ConditionId] {
        &self.phase_order
    }

    pub fn phase_count(&self) -> usize {
        self.phase_order.len()
    }

    pub fn questions(&self, phase: usize) -> &[Question] {
        self.assignment.phase(phase).unwrap_or(&[])
    }

    pub fn practice(&self) -> &[Question] {
        &self.practice
    }

    pub fn pre_exposure_seconds(&self) -> u32 {
        self.pre_exposure_seconds
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

pub struct ExperimentStateMachine<A: StimulusOutput, C: Clock> {
    plan: SessionPlan,
    catalog: ConditionCatalog,
    output: A,
    clock: C,
    state: State,
    builder: Option<SessionResultBuilder>,
    recorder: Option<PhaseRecorder>,
    question_shown_at: f64,
    countdown: Option<Countdown>,
    result: Option<SessionResult>,
    warnings: Vec<String>,
}

impl<A: StimulusOutput, C: Clock> ExperimentStateMachine<A, C> {
    pub fn new(plan: SessionPlan, catalog: ConditionCatalog, output: A, clock: C) -> Self {
        Self {
            plan,
            catalog,
            output,
            clock,
            state: State::NotStarted,
            builder: None,
            recorder: None,
            question_shown_at: 0.0,
            countdown: None,
            result: None,
            warnings: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn plan(&self) -> &SessionPlan {
        &self.plan
    }

    pub fn output(&self) -> &A {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut A {
        &mut self.output
    }

    /// The finalized session once `Complete` or `Aborted`
    pub fn result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    /// Warnings raised since the last call, oldest first
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Condition of the current phase
    pub fn current_condition(&self) -> Option<&Condition> {
        let phase = self.state.phase()?;
        self.catalog.get(*self.plan.phase_order.get(phase)?)
    }

    /// The question on screen, if any
    pub fn current_question(&self) -> Option<&Question> {
        match self.state {
            State::Practice { question } => self.plan.practice.get(question),
            State::PhaseTest { phase, question } => self.plan.questions(phase).get(question),
            _ => None,
        }
    }

    pub fn start(&mut self) -> EngineResult<State> {
        if self.state != State::NotStarted {
            return Err(self.invalid("start"));
        }
        let metadata = SessionMetadata::new(&self.plan.protocol, self.plan.seed, self.catalog.version);
        let builder = SessionResultBuilder::new(self.plan.phase_order.clone(), metadata);
        info!(
            "session {} started: protocol {}, phase order {:?}",
            builder.session_id(),
            self.plan.protocol,
            self.plan.phase_order
        );
        self.builder = Some(builder);

        let next = if self.plan.practice.is_empty() {
            State::PhaseIntro { phase: 0 }
        } else {
            State::Practice { question: 0 }
        };
        self.transition(next)
    }

    /// Answer the current question with one of its options
    pub fn answer(&mut self, option: &str) -> EngineResult<State> {
        let (question, next) = match self.state {
            State::Practice { question } => {
                let next = if question + 1 < self.plan.practice.len() {
                    State::Practice {
                        question: question + 1,
                    }
                } else {
                    State::PhaseIntro { phase: 0 }
                };
                (self.plan.practice.get(question), next)
            }
            State::PhaseTest { phase, question } => {
                let next = if question + 1 < self.plan.questions(phase).len() {
                    State::PhaseTest {
                        phase,
                        question: question + 1,
                    }
                } else if phase + 1 < self.plan.phase_count() {
                    State::PhaseIntro { phase: phase + 1 }
                } else {
                    State::Complete
                };
                (self.plan.questions(phase).get(question), next)
            }
            _ => return Err(self.invalid("answer")),
        };

        let question = question.ok_or_else(|| self.invalid("answer"))?;
        if !question.options.iter().any(|o| o == option) {
            return Err(EngineError::InvalidQuestion(format!(
                "'{}' is not an option of {}",
                option, question.id
            )));
        }
        let latency = self.clock.now() - self.question_shown_at;
        let record = ResponseRecord::new(question, option, latency);
        debug!(
            "{} answered in {:.3} s ({})",
            record.question_id,
            record.latency_seconds,
            if record.correct { "correct" } else { "wrong" }
        );
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(record);
        }

        match (self.state, next) {
            (State::Practice { .. }, State::Practice { question }) => {
                self.state = State::Practice { question };
                self.show_question();
                Ok(self.state)
            }
            (State::PhaseTest { .. }, State::PhaseTest { phase, question }) => {
                self.state = State::PhaseTest { phase, question };
                self.show_question();
                Ok(self.state)
            }
            (State::Practice { .. }, next) => {
                self.commit_practice();
                self.transition(next)
            }
            (State::PhaseTest { phase, .. }, next) => {
                if let Err(e) = self.commit_phase(phase) {
                    // The phase is lost; end the session
                    error!("phase {} could not be stored: {}", phase + 1, e);
                    self.transition(State::Aborted)?;
                    return Err(e);
                }
                self.transition(next)
            }
            _ => Err(self.invalid("answer")),
        }
    }

    /// Leave the intro and start the phase's stimulus
    pub fn start_phase(&mut self) -> EngineResult<State> {
        let State::PhaseIntro { phase } = self.state else {
            return Err(self.invalid("start_phase"));
        };
        let next = if self.plan.pre_exposure_seconds > 0 {
            State::PreExposure {
                phase,
                remaining: self.plan.pre_exposure_seconds,
            }
        } else {
            State::PhaseTest { phase, question: 0 }
        };
        self.transition(next)
    }

    /// One second elapsed. Outside pre-exposure this does nothing.
    pub fn tick(&mut self) -> EngineResult<State> {
        let State::PreExposure { phase, .. } = self.state else {
            return Ok(self.state);
        };
        let status = match self.countdown.as_mut() {
            Some(countdown) => countdown.tick(),
            None => CountdownStatus::Finished,
        };
        match status {
            CountdownStatus::Running(remaining) => {
                self.state = State::PreExposure { phase, remaining };
                Ok(self.state)
            }
            CountdownStatus::Finished | CountdownStatus::Cancelled => {
                self.transition(State::PhaseTest { phase, question: 0 })
            }
        }
    }

    /// Cut pre-exposure short and go straight to the questions
    pub fn skip_pre_exposure(&mut self) -> EngineResult<State> {
        let State::PreExposure { phase, .. } = self.state else {
            return Err(self.invalid("skip_pre_exposure"));
        };
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.cancel();
        }
        info!("pre-exposure of phase {} skipped", phase + 1);
        self.transition(State::PhaseTest { phase, question: 0 })
    }

    /// End the session now, keeping completed phases. Idempotent.
    pub fn abort(&mut self) -> EngineResult<State> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        if self.builder.is_none() {
            let metadata =
                SessionMetadata::new(&self.plan.protocol, self.plan.seed, self.catalog.version);
            self.builder = Some(SessionResultBuilder::new(self.plan.phase_order.clone(), metadata));
        }
        warn!("session aborted in {}", self.state);
        self.transition(State::Aborted)
    }

    fn invalid(&self, event: &'static str) -> EngineError {
        EngineError::InvalidTransition {
            state: self.state.name().to_string(),
            event,
        }
    }

    fn transition(&mut self, next: State) -> EngineResult<State> {
        self.exit();
        debug!("{} -> {}", self.state, next);
        self.state = next;
        self.enter()?;
        Ok(self.state)
    }

    fn enter(&mut self) -> EngineResult<()> {
        match self.state {
            State::NotStarted => {}
            State::Practice { .. } => {
                self.recorder = Some(PhaseRecorder::new(self.plan.practice.len()));
                self.show_question();
            }
            State::PhaseIntro { phase } => {
                info!(
                    "phase {}/{} ready (condition {})",
                    phase + 1,
                    self.plan.phase_count(),
                    self.plan.phase_order[phase]
                );
            }
            State::PreExposure { phase, remaining } => {
                self.start_stimulus(phase);
                self.countdown = Some(Countdown::new(remaining));
            }
            State::PhaseTest { phase, .. } => {
                self.start_stimulus(phase);
                self.recorder = Some(PhaseRecorder::new(self.plan.questions(phase).len()));
                self.show_question();
            }
            State::Complete | State::Aborted => {
                let mut builder = self.builder.take().ok_or(EngineError::ResourceClosed)?;
                if self.state == State::Aborted {
                    builder.mark_aborted();
                }
                let result = builder.finish();
                info!(
                    "session {} {} with {} of {} phases",
                    result.session_id(),
                    self.state.name(),
                    result.phase_count(),
                    result.phase_order().len()
                );
                self.result = Some(result);
            }
        }
        Ok(())
    }

    /// Release whatever the current state holds
    fn exit(&mut self) {
        match self.state {
            State::PreExposure { .. } => {
                if let Some(mut countdown) = self.countdown.take() {
                    countdown.cancel();
                }
                self.stop_stimulus();
            }
            State::PhaseTest { .. } => {
                self.recorder = None;
                self.stop_stimulus();
            }
            State::Practice { .. } => {
                self.recorder = None;
            }
            _ => {}
        }
    }

    fn show_question(&mut self) {
        self.question_shown_at = self.clock.now();
    }

    fn start_stimulus(&mut self, phase: usize) {
        let condition_id = self.plan.phase_order[phase];
        let outcome = match self.catalog.get(condition_id) {
            Some(condition) => self.output.set_condition(condition),
            None => Err(EngineError::Config(format!("unknown condition id {}", condition_id))),
        };
        if let Err(e) = outcome {
            let message = e.to_string();
            let fault = AudioFault {
                phase_index: phase,
                condition_id,
                message: message.clone(),
            };
            let first = self
                .builder
                .as_mut()
                .map_or(true, |builder| builder.record_audio_fault(fault));
            if !first {
                // Pre-exposure already reported this phase
                debug!("phase {} still silent: {}", phase + 1, message);
                return;
            }
            if e.is_audio_fault() {
                warn!("phase {} continues in silence: {}", phase + 1, message);
            } else {
                error!("phase {} continues in silence: {}", phase + 1, message);
            }
            self.warnings.push(format!(
                "condition {} could not be played: {}",
                condition_id, message
            ));
        }
    }

    fn stop_stimulus(&mut self) {
        if let Err(e) = self.output.stop_all() {
            debug!("stop_all during teardown: {}", e);
        }
    }

    fn commit_practice(&mut self) {
        if let (Some(recorder), Some(builder)) = (self.recorder.take(), self.builder.as_mut()) {
            builder.set_practice(recorder.freeze());
        }
    }

    fn commit_phase(&mut self, phase: usize) -> EngineResult<()> {
        let condition_id = self.plan.phase_order[phase];
        if let (Some(recorder), Some(builder)) = (self.recorder.take(), self.builder.as_mut()) {
            builder.push_phase(recorder.freeze_phase(condition_id))?;
        }
        Ok(())
    }
}

impl<A: StimulusOutput, C: Clock> Drop for ExperimentStateMachine<A, C> {
    fn drop(&mut self) {
        self.exit();
    }
}
