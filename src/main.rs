#![forbid(unsafe_code)]

//! `restart-cascade` — restarts PM2 dependents when their parent restarts.
//!
//! Loads configuration, connects to the PM2 daemon, subscribes to its event
//! bus, and runs the cascade controller until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use restart_cascade::cascade::CascadeController;
use restart_cascade::supervisor::pm2::Pm2Client;
use restart_cascade::{AppError, CascadeConfig, Result};

/// Exit status when the initial supervisor connection fails.
const EXIT_CONNECTION_FAILED: u8 = 2;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "restart-cascade", about = "Restart PM2 dependents when their parent restarts", version, long_about = None)]
struct Cli {
    /// Optional TOML configuration file. Environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// PM2 home directory containing `rpc.sock` and `pub.sock`.
    #[arg(long)]
    pm2_home: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ AppError::Connection(_)) => {
            error!(%err, "error connecting to pm2");
            ExitCode::from(EXIT_CONNECTION_FAILED)
        }
        Err(err) => {
            error!(%err, "restart-cascade failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(ref path) => CascadeConfig::load_from_path(path)?,
        None => CascadeConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(home) = args.pm2_home {
        config.pm2_home = Some(home);
    }
    let pm2_home = config.resolve_pm2_home()?;

    info!(
        tag_key = %config.tag_key,
        ignore_manual = config.ignore_manual_restarts,
        delay_ms = config.restart_delay_ms,
        "listening for parent app restarts using env key \"{}\"",
        config.tag_key
    );

    // ── Connect to the supervisor ───────────────────────
    let client = Arc::new(Pm2Client::connect(pm2_home).await?);

    let ct = CancellationToken::new();
    let controller = Arc::new(CascadeController::new(Arc::clone(&client), &config));

    // ── Subscribe to the event bus ──────────────────────
    let controller_handle = match client.subscribe(ct.child_token()).await {
        Ok(subscription) => Some(tokio::spawn(controller.run(subscription, ct.clone()))),
        Err(err) => {
            error!(%err, "error launching event bus, no restarts will cascade");
            None
        }
    };

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    if let Some(handle) = controller_handle {
        if let Err(err) = handle.await {
            error!(%err, "controller task failed");
        }
    }
    info!("restart-cascade shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
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

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

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
