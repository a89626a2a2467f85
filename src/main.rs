use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use speech_session::{
    Config, EngineScript, OutputFormat, ScriptedEngine, SessionError, SpeechSession,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "speech-session", version, about = "Drive a speech recognition session")]
struct Cli {
    /// Configuration file (without extension)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a recorded engine notification script through a session
    Replay {
        /// JSON engine script
        #[arg(long)]
        script: String,

        #[arg(long, value_enum, default_value_t = Mode::Once)]
        mode: Mode,

        /// Keyword for keyword mode
        #[arg(long, default_value = "computer")]
        keyword: String,

        /// Keep the engine's raw result payload
        #[arg(long)]
        detailed: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Once,
    Continuous,
    Keyword,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Replay {
            script,
            mode,
            keyword,
            detailed,
        } => replay(cfg, &script, mode, &keyword, detailed),
    }
}

fn replay(mut cfg: Config, script: &str, mode: Mode, keyword: &str, detailed: bool) -> Result<()> {
    if detailed {
        cfg.session.output_format = OutputFormat::Detailed;
    }

    let script = EngineScript::load(script)?;
    let engine = Arc::new(ScriptedEngine::new(script));
    let session = SpeechSession::new(engine, &cfg.session).context("Failed to create session")?;

    session.session_events().subscribe(|event| println!("[session] {}", event));
    session
        .intermediate_results()
        .subscribe(|result| println!("[intermediate] {}", result.text));
    session
        .final_results()
        .subscribe(|result| match serde_json::to_string(result) {
            Ok(json) => println!("[final] {}", json),
            Err(_) => println!("[final] {}", result.text),
        });
    session
        .errors()
        .subscribe(|error| println!("[error] {} (session {})", error.reason, error.session_id));
    session
        .activities()
        .subscribe(|activity| println!("[activity] {}", activity.activity));

    info!("Replaying script in {:?} mode", mode);

    match mode {
        Mode::Once => match session.recognize_once()?.wait_blocking() {
            Ok(result) => info!("Recognized: {}", result.text),
            Err(SessionError::NotRecognized(notification)) => {
                warn!("Nothing recognized: {}", notification.reason)
            }
            Err(e) => return Err(e.into()),
        },
        Mode::Continuous => {
            session.start_continuous_recognition()?.wait_blocking()?;
            session.stop_continuous_recognition()?.wait_blocking()?;
        }
        Mode::Keyword => {
            session.start_keyword_recognition(keyword)?.wait_blocking()?;
            session.stop_keyword_recognition()?.wait_blocking()?;
        }
    }

    let stats = session.stats();
    session.dispose();

    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
