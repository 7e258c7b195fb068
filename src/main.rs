use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use turnkit::config::Config;
use turnkit::document::{Mode, TurnStatus};
use turnkit::gateway::{self, Engine, ServerConfig};
use turnkit::injection::InjectionManager;
use turnkit::orchestrator::{Orchestrator, TurnEvent};
use turnkit::session::SessionRegistry;

#[derive(Parser)]
#[command(name = "turnkit")]
#[command(version, about = "LLM turn-engine orchestrator")]
struct Cli {
    /// Project directory the engine reads/writes `.turnkit/` under.
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single turn in-process and print its streamed progress.
    Chat {
        message: String,
        #[arg(long, default_value = "default")]
        session: String,
        #[arg(long, default_value = "chat")]
        mode: String,
    },
    /// Start the HTTP gateway (`/chat`, `/inject`, `/intervention/{id}/resolve`, `/healthz`).
    Serve {
        #[arg(long, default_value_t = 4173)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

    let project_dir = cli.project_dir.unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Serve { port } => {
            let config = ServerConfig { port, project_dir, engine_toml_path: None, verbose: cli.verbose };
            match gateway::start_server(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("{} {err:?}", style("error:").red().bold());
                    exit_code(3)
                }
            }
        }
        Commands::Chat { message, session, mode } => {
            match run_chat(project_dir, cli.verbose, message, session, mode).await {
                Ok(code) => code,
                Err(err) => {
                    eprintln!("{} {err:?}", style("error:").red().bold());
                    exit_code(3)
                }
            }
        }
    }
}

fn parse_mode(raw: &str) -> Result<Mode> {
    match raw {
        "chat" => Ok(Mode::Chat),
        "code" => Ok(Mode::Code),
        other => anyhow::bail!("unknown mode '{other}', expected 'chat' or 'code'"),
    }
}

fn exit_code(code: u8) -> ExitCode {
    ExitCode::from(code)
}

/// Drives one turn directly against an in-process [`Engine`], printing
/// each [`TurnEvent`] as it arrives and mapping the terminal status to
/// the exit codes the wire contract defines for CLI front-ends.
async fn run_chat(project_dir: PathBuf, verbose: bool, message: String, session: String, mode: String) -> Result<ExitCode> {
    let mode = parse_mode(&mode)?;
    let config = Config::new(project_dir, verbose, None).context("failed to resolve engine configuration")?;
    let engine = Engine::new(config).context("failed to initialize engine")?;
    let injections = InjectionManager::new();
    let sessions = SessionRegistry::new();
    let (events_tx, mut events_rx) = tokio::sync::broadcast::channel(256);

    let turn_id = uuid::Uuid::new_v4();
    sessions.begin_turn(&session, mode, turn_id);
    let conversation_buffer = sessions.conversation_buffer(&session);
    let external = engine.external_candidates();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}").unwrap());
    spinner.enable_steady_tick(Duration::from_millis(100));

    let printer = tokio::spawn(async move {
        while let Ok(event) = events_rx.recv().await {
            print_event(&spinner, &event);
            if matches!(event, TurnEvent::Finished { .. }) {
                break;
            }
        }
        spinner.finish_and_clear();
    });

    let ctx = engine.phase_context();
    let orchestrator = Orchestrator::new(&ctx, &injections, events_tx);
    let outcome = orchestrator.run_turn(turn_id, &session, mode, &message, &conversation_buffer, external).await;
    let _ = printer.await;

    let outcome = outcome.context("turn did not complete")?;
    sessions.end_turn(&session, &message, &outcome.response_text);

    println!();
    println!("{}", outcome.response_text);

    Ok(match outcome.status {
        TurnStatus::Approved => ExitCode::SUCCESS,
        TurnStatus::Partial | TurnStatus::Failed => exit_code(1),
        TurnStatus::Clarification => ExitCode::SUCCESS,
    })
}

fn print_event(spinner: &ProgressBar, event: &TurnEvent) {
    match event {
        TurnEvent::PhaseStarted { phase } => spinner.set_message(format!("{} {phase}", style("▶").cyan())),
        TurnEvent::PhaseFinished { phase } => spinner.println(format!("  {} {phase}", style("✓").green())),
        TurnEvent::InnerLoopIteration { iteration } => spinner.set_message(format!("executing, iteration {iteration}")),
        TurnEvent::ToolInvoked { name, status } => {
            spinner.println(format!("  {} {name} ({status:?})", style("→").yellow()))
        }
        TurnEvent::ValidationAttempt { attempt, decision, confidence } => spinner.println(format!(
            "  {} attempt {attempt}: {decision:?} (confidence {confidence:.2})",
            style("?").dim()
        )),
        TurnEvent::Redirected { note } => spinner.println(format!("  {} redirected: {note}", style("↪").magenta())),
        TurnEvent::Cancelled => spinner.println(format!("  {} cancelled", style("✗").red())),
        TurnEvent::Finished { status } => spinner.println(format!("{} turn finished: {status:?}", style("●").bold())),
    }
}
