#![forbid(unsafe_code)]

//! `allpath-runner` — local skill daemon binary.
//!
//! Bootstraps configuration, indexes the skill catalog, builds the frozen
//! skill registry, and serves requests on a Unix domain socket until
//! SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use allpath_runner::config::GlobalConfig;
use allpath_runner::ipc::server::{spawn_ipc_server, DaemonState};
use allpath_runner::skills::catalog::SkillCatalog;
use allpath_runner::skills::provider::HttpConnector;
use allpath_runner::skills::security::SkillScanner;
use allpath_runner::skills::{default_registry, SkillContext};
use allpath_runner::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "allpath-runner", about = "Local skill daemon", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the socket path from the configuration.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Override the directory searched recursively for local skill documents.
    #[arg(long)]
    skills_dir: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("allpath-runner bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }
    if let Some(dir) = args.skills_dir {
        config.skills_dir = Some(dir);
    }
    config.validate()?;
    info!(socket = %config.socket_path.display(), "configuration loaded");

    // ── Build the skill registry ────────────────────────
    let scanner = Arc::new(SkillScanner::new());
    let catalog = Arc::new(SkillCatalog::load(config.skills_dir.as_deref(), &scanner)?);
    let connector = Arc::new(HttpConnector::new(&config)?);
    let ctx = SkillContext {
        connector,
        catalog,
        scanner,
    };
    let registry = default_registry(&ctx)?;
    info!(skills = registry.len(), "skill registry frozen");

    let state = Arc::new(DaemonState::new(&config, registry));

    // ── Start the listener ──────────────────────────────
    let ct = CancellationToken::new();
    let server_handle = spawn_ipc_server(state, &config.socket_path, ct.clone())?;

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    if let Err(err) = server_handle.await {
        error!(%err, "ipc server task failed");
    }
    info!("allpath-runner shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
            let _ = ctrl_c.await;
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
