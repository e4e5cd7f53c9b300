//! Offset logger (ntpo-logger) - Main entry point
//!
//! `run` (default): sample the reference server every interval and append
//! one robust row per cycle to the history file.
//! `analyze`: print a drift and Allan deviation report for a history file.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ntpo_common::config::TomlConfig;
use ntpo_common::history::read_history;
use ntpo_logger::analyze::analyze;
use ntpo_logger::{OffsetLogger, SntpSource};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for ntpo-logger
#[derive(Parser, Debug)]
#[command(name = "ntpo-logger")]
#[command(about = "Robust clock offset logger against an NTP reference")]
#[command(version)]
struct Args {
    /// Config file (overrides NTPO_CONFIG and the default location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reference server host name
    #[arg(short, long, env = "NTPO_SERVER")]
    server: Option<String>,

    /// History file path
    #[arg(long, env = "NTPO_HISTORY")]
    history: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "NTPO_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log offsets until interrupted
    Run,
    /// Report drift and stability of a recorded history file
    Analyze {
        /// Emit JSON instead of a text table
        #[arg(long)]
        json: bool,

        /// History file (defaults to the configured history path)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config resolution logs through a bootstrap subscriber; the configured
    // one needs the config first
    let bootstrap = fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .finish();
    let mut config = tracing::subscriber::with_default(bootstrap, || TomlConfig::resolve(args.config.as_deref()))
        .context("Failed to load configuration")?;

    if let Some(server) = args.server {
        config.source.server = server;
    }
    if let Some(path) = args.history {
        config.history.path = path;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config)?;

    info!(
        "Starting ntpo-logger v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&config).await,
        Command::Analyze { json, path } => {
            let path = path.unwrap_or_else(|| config.history.path.clone());
            report(&path, json)
        }
    }
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging.level)
            .with_context(|| format!("Invalid log level '{}'", config.logging.level))?,
    };

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

async fn run(config: &TomlConfig) -> Result<()> {
    info!(
        server = %config.source.server,
        interval_secs = config.acquisition.interval_secs,
        batch_size = config.acquisition.batch_size,
        window_secs = config.estimator.window_secs,
        "Logging to {}",
        config.history.path.display()
    );

    let source = SntpSource::from_config(&config.source);
    let mut logger = OffsetLogger::init(source, config)
        .with_context(|| format!("Failed to open history {}", config.history.path.display()))?;

    logger.run(shutdown_signal()).await.context("Logger failed")?;

    info!("Shutdown complete");
    Ok(())
}

fn report(path: &std::path::Path, json: bool) -> Result<()> {
    let history = read_history(path).with_context(|| format!("Failed to read history {}", path.display()))?;
    let report = analyze(&history).with_context(|| format!("Cannot analyze {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
