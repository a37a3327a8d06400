//! Terminal drivers for the state machine
//!
//! `run_interactive` reads answers from stdin and feeds the pre-exposure
//! countdown from a one-second `tokio` interval. `SimulatedParticipant`
//! answers on its own against a `ManualClock`, so a whole session runs
//! instantly and reproducibly.

use crate::clock::{Clock, ManualClock};
use crate::error::{EngineError, EngineResult};
use crate::question::Question;
use crate::state_machine::{ExperimentStateMachine, State, StimulusOutput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Scripted participant with a fixed accuracy and latency range
pub struct SimulatedParticipant<R: Rng = StdRng> {
    rng: R,
    accuracy: f64,
    mean_latency: f64,
}

impl SimulatedParticipant<StdRng> {
    pub fn seeded(seed: u64, accuracy: f64, mean_latency: f64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), accuracy, mean_latency)
    }
}

impl<R: Rng> SimulatedParticipant<R> {
    pub fn with_rng(rng: R, accuracy: f64, mean_latency: f64) -> Self {
        Self {
            rng,
            accuracy: accuracy.clamp(0.0, 1.0),
            mean_latency: mean_latency.max(0.0),
        }
    }

    /// Pick an answer and a latency, uniform in ±50% of the mean
    pub fn respond(&mut self, question: &Question) -> (String, f64) {
        let latency = self.mean_latency * self.rng.gen_range(0.5..1.5);
        let answer = if self.rng.gen_bool(self.accuracy) {
            question.correct.clone()
        } else {
            question
                .options
                .iter()
                .find(|o| **o != question.correct)
                .unwrap_or(&question.correct)
                .clone()
        };
        (answer, latency)
    }

    /// Run the machine to completion, advancing `clock` as the participant
    /// thinks and as pre-exposure seconds pass
    pub fn drive<A: StimulusOutput>(
        &mut self,
        machine: &mut ExperimentStateMachine<A, ManualClock>,
        clock: &ManualClock,
    ) -> EngineResult<()> {
        loop {
            match machine.state() {
                State::NotStarted => {
                    machine.start()?;
                }
                State::Practice { .. } | State::PhaseTest { .. } => {
                    let question = machine
                        .current_question()
                        .cloned()
                        .ok_or_else(|| EngineError::InvalidQuestion("no question on screen".into()))?;
                    let (answer, latency) = self.respond(&question);
                    clock.advance(latency);
                    machine.answer(&answer)?;
                }
                State::PhaseIntro { .. } => {
                    machine.start_phase()?;
                }
                State::PreExposure { .. } => {
                    clock.advance(1.0);
                    machine.tick()?;
                }
                State::Complete | State::Aborted => return Ok(()),
            }
        }
    }
}

fn print_prompt<A: StimulusOutput, C: Clock>(machine: &ExperimentStateMachine<A, C>) {
    match machine.state() {
        State::Practice { .. } | State::PhaseTest { .. } => {
            if let Some(question) = machine.current_question() {
                println!();
                println!("[{}] {}", machine.state(), question.prompt);
                for (i, option) in question.options.iter().enumerate() {
                    println!("  {}) {}", i + 1, option);
                }
            }
        }
        State::PhaseIntro { phase } => {
            println!();
            println!(
                "Phase {} of {}. Press Enter to begin (q to quit).",
                phase + 1,
                machine.plan().phase_count()
            );
        }
        State::PreExposure { remaining, .. } => {
            println!("Listening... {} s (s to skip)", remaining);
        }
        State::NotStarted | State::Complete | State::Aborted => {}
    }
}

fn handle_line<A: StimulusOutput, C: Clock>(
    machine: &mut ExperimentStateMachine<A, C>,
    line: &str,
) -> EngineResult<()> {
    if line.eq_ignore_ascii_case("q") {
        machine.abort()?;
        return Ok(());
    }
    let outcome = match machine.state() {
        State::PhaseIntro { .. } => machine.start_phase(),
        State::PreExposure { .. } if line.eq_ignore_ascii_case("s") => machine.skip_pre_exposure(),
        State::Practice { .. } | State::PhaseTest { .. } => {
            let answer = machine.current_question().map(|q| {
                line.parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| q.options.get(i).cloned())
                    .unwrap_or_else(|| line.to_string())
            });
            match answer {
                Some(answer) => machine.answer(&answer),
                None => Ok(machine.state()),
            }
        }
        state => Ok(state),
    };
    match outcome {
        Ok(_) => Ok(()),
        Err(e @ (EngineError::InvalidQuestion(_) | EngineError::InvalidTransition { .. })) => {
            println!("  {}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Run a session against stdin until it completes, the input closes or the
/// user interrupts it
pub async fn run_interactive<A: StimulusOutput, C: Clock>(
    machine: &mut ExperimentStateMachine<A, C>,
) -> EngineResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if machine.state() == State::NotStarted {
        machine.start()?;
    }

    let mut shown: Option<State> = None;
    loop {
        for warning in machine.take_warnings() {
            eprintln!("warning: {}", warning);
        }
        let state = machine.state();
        if state.is_terminal() {
            break;
        }
        if shown != Some(state) {
            let entering_pre_exposure = matches!(state, State::PreExposure { .. })
                && !matches!(shown, Some(State::PreExposure { .. }));
            if entering_pre_exposure {
                ticker.reset();
            }
            print_prompt(machine);
            shown = Some(state);
        }

        tokio::select! {
            _ = ticker.tick() => {
                machine.tick()?;
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => handle_line(machine, line.trim())?,
                    None => {
                        info!("Input closed, aborting session");
                        machine.abort()?;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                machine.abort()?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionCatalog;
    use crate::config::Protocol;
    use crate::question::QuestionBank;
    use crate::sampler::QuestionSampler;
    use crate::state_machine::SessionPlan;

    struct NullOutput;

    impl StimulusOutput for NullOutput {
        fn set_condition(&mut self, _: &crate::condition::Condition) -> EngineResult<()> {
            Ok(())
        }

        fn stop_all(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_simulated_session_completes() {
        let catalog = ConditionCatalog::default();
        let bank = QuestionBank::builtin().unwrap();
        let protocol = Protocol::extended();
        let plan =
            SessionPlan::generate(&protocol, &catalog, &bank, &mut QuestionSampler::seeded(11)).unwrap();
        let clock = ManualClock::new();
        let mut machine = ExperimentStateMachine::new(plan, catalog, NullOutput, clock.clone());

        SimulatedParticipant::seeded(5, 0.8, 2.0)
            .drive(&mut machine, &clock)
            .unwrap();

        let result = machine.result().unwrap();
        assert!(result.is_complete());
        assert_eq!(result.phase_count(), 8);
        for phase in result.phases() {
            assert_eq!(phase.records().len(), 6);
            assert!(phase.latencies().iter().all(|&l| (0.99..=3.01).contains(&l)));
        }
        // 8 phases of 180 s pre-exposure
        assert!(clock.now() >= 8.0 * 180.0);
    }

    #[test]
    fn test_perfect_participant() {
        let question = Question {
            id: "q".into(),
            prompt: String::new(),
            options: vec!["a".into(), "b".into()],
            correct: "b".into(),
            difficulty: crate::question::Difficulty::Easy,
            question_type: crate::question::QuestionType::Logic,
        };
        let mut participant = SimulatedParticipant::seeded(1, 1.0, 1.0);
        for _ in 0..10 {
            assert_eq!(participant.respond(&question).0, "b");
        }
        let mut hopeless = SimulatedParticipant::seeded(1, 0.0, 1.0);
        assert_eq!(hopeless.respond(&question).0, "a");
    }
}
