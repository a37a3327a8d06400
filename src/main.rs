//! Acouphene CLI - run sessions, render stimuli and analyze results

use acouphene::aggregate::{self, SessionSummary};
use acouphene::audio_context::{AudioBackend, CpalBackend, OfflineBackend};
use acouphene::clock::{ManualClock, SystemClock};
use acouphene::condition::{ConditionCatalog, ConditionId};
use acouphene::config::{ExperimentConfig, Protocol};
use acouphene::hypothesis::{self, SessionVerdict};
use acouphene::render::{self, RenderConfig};
use acouphene::renderer::StreamFormat;
use acouphene::runner::{self, SimulatedParticipant};
use acouphene::sampler::QuestionSampler;
use acouphene::session::SessionResult;
use acouphene::signal_chain::SignalChainBuilder;
use acouphene::state_machine::{ExperimentStateMachine, SessionPlan};
use acouphene::store::SessionStore;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "acouphene")]
#[command(about = "Auditory stimulus and cognitive testing experiment runner", long_about = None)]
struct Cli {
    /// Experiment configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session in the terminal
    Run {
        /// Protocol preset (original, extended); overrides the config file
        #[arg(short, long)]
        protocol: Option<String>,

        /// Sampler seed for a reproducible session
        #[arg(short, long)]
        seed: Option<u64>,

        /// Answer automatically with this accuracy (0.0-1.0)
        #[arg(long)]
        simulate: Option<f64>,

        /// Mean simulated latency in seconds (default: 2.0)
        #[arg(long, default_value = "2.0")]
        latency: f64,

        /// Run without an audio device
        #[arg(long)]
        offline: bool,

        /// Do not save the session
        #[arg(long)]
        no_save: bool,
    },

    /// Render one condition to WAV
    Render {
        /// Condition id
        condition: ConditionId,

        /// Output WAV file path
        output: PathBuf,

        /// Duration in seconds (default: 5.0)
        #[arg(short, long, default_value = "5.0")]
        duration: f32,

        /// Sample rate in Hz (default: 44100)
        #[arg(short = 'r', long, default_value = "44100")]
        sample_rate: u32,
    },

    /// List the condition catalog
    Catalog,

    /// Summarize a stored session and evaluate the hypotheses
    Analyze {
        /// Session id in the store
        session: Option<String>,

        /// Read a session export from a file instead
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List stored sessions
    Sessions,
}

fn load_config(path: Option<&Path>) -> Result<ExperimentConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::default(),
    })
}

fn open_store(config: &ExperimentConfig) -> Result<SessionStore, Box<dyn std::error::Error>> {
    Ok(match &config.store_dir {
        Some(dir) => SessionStore::new(dir),
        None => SessionStore::default_location()?,
    })
}

fn print_summary(summary: &SessionSummary) {
    println!("Session {}", summary.session_id);
    if let Some(practice) = &summary.practice {
        println!(
            "  practice          n={:<3} accuracy {:5.1}%  latency {:.2} s",
            practice.n,
            practice.accuracy * 100.0,
            practice.latency.mean
        );
    }
    println!();
    println!("  {:<3} {:<18} {:<10} {:>3} {:>7} {:>8} {:>8} {:>6}", "#", "condition", "category", "n", "acc %", "mean s", "sd s", "cv %");
    for phase in &summary.phases {
        let s = &phase.summary;
        println!(
            "  {:<3} {:<18} {:<10} {:>3} {:>7.1} {:>8.3} {:>8.3} {:>6.1}",
            phase.position + 1,
            phase.condition_name,
            phase.category.map(|c| c.to_string()).unwrap_or_default(),
            s.n,
            s.accuracy * 100.0,
            s.latency.mean,
            s.latency.std_dev,
            s.latency.cv
        );
    }
    println!();
    for (category, pooled) in &summary.categories {
        println!(
            "  {:<10} conditions {:?}: n={} accuracy {:.1}% latency {:.3} ± {:.3} s",
            category.to_string(),
            pooled.condition_ids,
            pooled.summary.n,
            pooled.summary.accuracy * 100.0,
            pooled.summary.latency.mean,
            pooled.summary.latency.std_dev
        );
    }
}

fn print_verdict(verdict: Option<&SessionVerdict>) {
    println!();
    match verdict {
        Some(verdict) => {
            println!("Hypotheses ({} vs {}):", verdict.treatment, verdict.baseline);
            for result in &verdict.results {
                println!("  {:<20} {:<12} {}", result.name, result.verdict.to_string(), result.detail);
            }
            println!("  overall: {}", verdict.overall);
        }
        None => println!("Hypotheses: not evaluated (treatment or baseline category missing)"),
    }
}

fn report(
    session: &SessionResult,
    config: &ExperimentConfig,
    catalog: &ConditionCatalog,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let summary = aggregate::summarize(session, catalog);
    let verdict = hypothesis::evaluate_session(&summary, &config.thresholds);
    if json {
        let value = serde_json::json!({ "summary": summary, "verdict": verdict });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_summary(&summary);
        print_verdict(verdict.as_ref());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            protocol,
            seed,
            simulate,
            latency,
            offline,
            no_save,
        } => {
            if let Some(name) = protocol {
                config.protocol =
                    Protocol::by_name(&name).ok_or_else(|| format!("unknown protocol '{}'", name))?;
            }
            let catalog = config.load_catalog()?;
            let bank = config.load_question_bank()?;
            let mut sampler = match seed {
                Some(seed) => QuestionSampler::seeded(seed),
                None => QuestionSampler::from_entropy(),
            };
            let plan = SessionPlan::generate(&config.protocol, &catalog, &bank, &mut sampler)?;

            let backend: Box<dyn AudioBackend> = if offline {
                Box::new(OfflineBackend::new(StreamFormat {
                    sample_rate: 44100,
                    channels: 2,
                }))
            } else {
                Box::new(CpalBackend::new())
            };
            let output = SignalChainBuilder::new(backend, config.engine.clone());

            println!("Acouphene");
            println!("=========");
            println!("Protocol:    {}", config.protocol.name);
            println!("Phases:      {}", plan.phase_count());
            if let Some(seed) = plan.seed() {
                println!("Seed:        {}", seed);
            }
            println!();

            let session = match simulate {
                Some(accuracy) => {
                    let clock = ManualClock::new();
                    let mut machine =
                        ExperimentStateMachine::new(plan, catalog.clone(), output, clock.clone());
                    let participant_seed = plan_seed_or_random(seed);
                    SimulatedParticipant::seeded(participant_seed, accuracy, latency)
                        .drive(&mut machine, &clock)?;
                    machine.result().cloned()
                }
                None => {
                    let mut machine =
                        ExperimentStateMachine::new(plan, catalog.clone(), output, SystemClock::new());
                    runner::run_interactive(&mut machine).await?;
                    machine.result().cloned()
                }
            };

            let Some(session) = session else {
                println!("Session ended without a result");
                return Ok(());
            };
            if !no_save {
                let path = open_store(&config)?.save(&session)?;
                println!("Saved to {}", path.display());
            }
            println!();
            report(&session, &config, &catalog, false)?;
        }

        Commands::Render {
            condition,
            output,
            duration,
            sample_rate,
        } => {
            let catalog = config.load_catalog()?;
            let condition = catalog.require(condition)?;
            let render_config = RenderConfig {
                sample_rate,
                channels: 2,
                duration,
            };
            println!("Rendering condition {} ({}) to {}", condition.id, condition.name, output.display());
            let stats = render::render_to_file(condition, &config.engine, &render_config, &output)?;
            stats.print_summary();
        }

        Commands::Catalog => {
            let catalog = config.load_catalog()?;
            println!("Condition catalog v{}", catalog.version);
            for condition in &catalog.conditions {
                println!(
                    "  {:>2}  {:<18} {:<10} {:<10} gain {:.2}",
                    condition.id,
                    condition.name,
                    condition.category.to_string(),
                    condition.stimulus.kind(),
                    condition.gain
                );
            }
        }

        Commands::Analyze {
            session,
            file,
            json,
        } => {
            let catalog = config.load_catalog()?;
            let session = match (file, session) {
                (Some(path), _) => SessionStore::load_file(&path)?,
                (None, Some(id)) => open_store(&config)?.load(&id)?,
                (None, None) => return Err("give a session id or --file".into()),
            };
            report(&session, &config, &catalog, json)?;
        }

        Commands::Sessions => {
            let store = open_store(&config)?;
            let entries = store.list()?;
            if entries.is_empty() {
                println!("No sessions in {}", store.root().display());
            }
            for entry in entries {
                println!(
                    "{}  {}  {:<9} {} phases{}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.session_id,
                    entry.protocol,
                    entry.phases,
                    if entry.aborted { " (aborted)" } else { "" }
                );
            }
        }
    }

    Ok(())
}

/// The simulated participant reuses the session seed so a seeded run is
/// fully reproducible
fn plan_seed_or_random(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(rand::random)
}
