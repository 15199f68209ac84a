//! # tokweave CLI
//!
//! Command-line interface for token-interleaved multi-agent runs.
//!
//! Usage:
//!   tokweave run <config.json> [--offline] [--concurrent] [--json]
//!   tokweave demo [--offline]
//!   tokweave reward --target <phrase> --agents <n> --cycles <n>
//!
//! Examples:
//!   tokweave demo
//!   tokweave -v run agents.json --concurrent
//!   tokweave reward --target "hello world" --agents 3 --cycles 2

use clap::{Parser, Subcommand};
use tokweave_core::provider::Script;
use tokweave_core::reward::{run_cycle, Learner, PhraseEnv};
use tokweave_core::{
    AgentState, ConcurrentInterleaver, Error, ErrorKind, Interleaver, OpenAIProvider,
    ProviderConfig, RetireReason, RunConfig, RunEvent, RunReport, ScriptedSource, StreamSettings,
    TokenSource, VisibilityMode,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "tokweave")]
#[command(author, version, about = "tokweave - token-level interleaving of LLM agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (debug logs and buffered tokens)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only show the final summary
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agents described in a JSON config file
    Run {
        /// Path to the run config
        #[arg(required = true)]
        file: String,

        /// Replay each agent's prompt instead of calling a model
        #[arg(long)]
        offline: bool,

        /// Emit whichever agent's token arrives first instead of round-robin
        #[arg(long)]
        concurrent: bool,

        /// Print the final views as JSON
        #[arg(long)]
        json: bool,
    },
    /// Alice, Bob and Charlie discuss AI ethics
    Demo {
        #[arg(long)]
        offline: bool,
    },
    /// Offline guess-the-phrase reward loop
    Reward {
        /// Phrase the agents try to reproduce
        #[arg(short, long, default_value = "hello")]
        target: String,

        /// Number of competing agents
        #[arg(short, long, default_value = "2")]
        agents: usize,

        /// Number of cycles
        #[arg(short, long, default_value = "3")]
        cycles: usize,
    },
}

struct Output {
    verbose: bool,
    quiet: bool,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::ERROR
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Scripted stand-in for a model: each agent thinks briefly, then broadcasts its prompt, forever
fn offline_source(config: &RunConfig) -> ScriptedSource {
    config
        .agents
        .iter()
        .fold(ScriptedSource::new().named("offline").repeating(), |source, agent| {
            let said = if agent.prompt.trim().is_empty() {
                format!("hello from {}", agent.name)
            } else {
                agent.prompt.clone()
            };
            let text = format!(
                "{} considering {} {} {} ",
                config.markers.internal, agent.name, config.markers.broadcast, said
            );
            source.agent_script(agent.name.clone(), Script::fragments([text]))
        })
}

fn live_printer(out: &Output) -> impl FnMut(&RunEvent) + 'static {
    let verbose = out.verbose;
    let quiet = out.quiet;
    move |event| {
        if quiet {
            return;
        }
        match event {
            RunEvent::Started { agents } => {
                println!("{}", "=".repeat(60));
                println!("Token-Level Interleaved Streaming: {}", agents.join(", "));
                println!("{}\n", "=".repeat(60));
            }
            RunEvent::Token { agent, token, pending } => {
                let indicator = match token.mode {
                    VisibilityMode::Broadcast => "📢",
                    VisibilityMode::Internal => "🤔",
                };
                if verbose && !pending.is_empty() {
                    println!(
                        "[{}]{} '{}'  [EXTRA: {} tokens buffered: '{}']",
                        agent,
                        indicator,
                        token.text,
                        pending.len(),
                        pending.join(" ")
                    );
                } else {
                    println!("[{}]{} '{}'", agent, indicator, token.text);
                }
            }
            RunEvent::Retired { agent, reason } => {
                let mark = match reason {
                    RetireReason::Exhausted => "✓",
                    RetireReason::Budget => "⏹",
                    RetireReason::Failed(_) => "✗",
                };
                println!("\n[{}] {} {}\n", agent, mark, reason);
            }
            RunEvent::RoundFinished { round, active } => {
                if verbose {
                    println!("--- round {} done, {} active ---", round, active);
                }
            }
        }
    }
}

fn print_summary(report: &RunReport, json: bool) -> Result<(), Error> {
    if json {
        let views = serde_json::to_string_pretty(report.ledger.views()).map_err(|e| {
            Error::new(ErrorKind::SerializationFailed, e.to_string()).set_source(e)
        })?;
        println!("{}", views);
        return Ok(());
    }

    println!("{}", "=".repeat(60));
    if report.rounds > 0 {
        println!("Interleaved streaming complete after {} rounds", report.rounds);
    } else {
        println!("Interleaved streaming complete");
    }
    println!("{}", "=".repeat(60));
    for agent in &report.agents {
        let state = match &agent.state {
            AgentState::Active => "active".to_string(),
            AgentState::Retired(reason) => reason.to_string(),
        };
        println!("  {:<12} {:>4} tokens  ({})", agent.name, agent.emitted, state);
    }
    Ok(())
}

async fn interleave<S: TokenSource>(
    config: &RunConfig,
    source: S,
    concurrent: bool,
    out: &Output,
) -> Result<RunReport, Error> {
    if concurrent {
        ConcurrentInterleaver::new(config, source)?
            .with_observer(live_printer(out))
            .run()
            .await
    } else {
        Interleaver::new(config, source)?
            .with_observer(live_printer(out))
            .run()
            .await
    }
}

fn provider_from_env(config: &RunConfig) -> Result<OpenAIProvider, Error> {
    let Ok(api_key) = std::env::var("OPENAI_API_KEY") else {
        return Err(Error::new(
            ErrorKind::ProviderUnavailable,
            "OPENAI_API_KEY is not set (add it to .env, or pass --offline)",
        ));
    };
    let mut provider_config = ProviderConfig::openai(api_key)
        .with_model(config.model.clone())
        .with_temperature(config.temperature);
    if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
        provider_config = provider_config.with_base_url(base_url);
    }
    OpenAIProvider::new(provider_config).map_err(Error::from)
}

async fn run_config(config: RunConfig, offline: bool, concurrent: bool, json: bool, out: &Output) -> Result<(), Error> {
    let report = if offline {
        interleave(&config, offline_source(&config), concurrent, out).await?
    } else {
        interleave(&config, provider_from_env(&config)?, concurrent, out).await?
    };
    print_summary(&report, json)
}

async fn run_reward(target: &str, agents: usize, cycles: usize, out: &Output) -> Result<(), Error> {
    if agents == 0 {
        return Err(Error::invalid_argument("--agents must be at least 1"));
    }
    let env = PhraseEnv::new(target);
    let pieces = env.target_tokens().to_vec();

    // Each learner starts out knowing a different slice of the phrase.
    let mut learners: Vec<Learner> = (0..agents)
        .map(|i| {
            let guess = pieces
                .iter()
                .enumerate()
                .map(|(j, piece)| if j % agents == i { piece.clone() } else { "?".to_string() });
            Learner::new(format!("agent{}", i + 1), "").with_guess(guess)
        })
        .collect();

    let settings = StreamSettings::default();
    for cycle in 1..=cycles {
        let outcome = run_cycle(&env, &mut learners, &settings).await?;
        if !out.quiet {
            for (name, tokens) in outcome.names.iter().zip(&outcome.tokens) {
                println!("<{}>\n{}\n<{}/>\n", name, tokens.join(" "), name);
            }
        }
        println!(
            "Cycle {} winner: {} with score {}/{}",
            cycle,
            outcome.winner_name(),
            outcome.best_score(),
            pieces.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let out = Output {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Commands::Run { file, offline, concurrent, json } => match RunConfig::from_file(&file) {
            Ok(config) => run_config(config, offline, concurrent, json, &out).await,
            Err(e) => Err(e),
        },
        Commands::Demo { offline } => {
            if !out.quiet {
                println!("Multi-Agent Token-Interleaved Demo\n");
            }
            run_config(RunConfig::demo(), offline, false, false, &out).await
        }
        Commands::Reward { target, agents, cycles } => run_reward(&target, agents, cycles, &out).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
