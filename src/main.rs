//! debug-collector - local log collection endpoint for debugging sessions.
//!
//! Instrumented code creates a session with `POST /session` and then sends
//! entries with `POST /log`; each entry becomes one JSON line in
//! `<project>/.debug/debug-<session>.log`.
//!
//! Starting a second collector on a port that is already taken is a no-op:
//! it prints an `already_running` status line and exits successfully.

use clap::Parser as ClapParser;
use debug_collector::{
    config::{CollectorConfig, DEFAULT_BODY_TIMEOUT, DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT},
    server::{self, StartupError},
};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Collect structured debug logs from instrumented code.
#[derive(ClapParser, Debug)]
#[command(name = "debug-collector", version, about, long_about = None)]
struct Cli {
    /// Project root; logs are written to <PROJECT>/.debug
    project: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, env = "DEBUG_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Seconds a client may take to send a request body
    #[arg(long, default_value_t = DEFAULT_BODY_TIMEOUT.as_secs())]
    body_timeout_secs: u64,

    /// Maximum request body size in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
}

impl Cli {
    fn into_config(self) -> std::io::Result<CollectorConfig> {
        let project = match self.project {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        Ok(CollectorConfig::new(project)?
            .with_host(self.host)
            .with_port(self.port)
            .with_body_timeout(Duration::from_secs(self.body_timeout_secs))
            .with_max_body_bytes(self.max_body_bytes))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "debug collector failed to start");
            eprintln!("debug-collector: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<server::ServeOutcome, StartupError> {
    let config = cli.into_config()?;

    let cancel = CancellationToken::new();
    install_shutdown_handler(cancel.clone())?;

    server::run(config, cancel).await
}

/// Initialize tracing on stderr.
///
/// Stdout carries the JSON status line that launching tools parse, so logs
/// must not go there.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "debug_collector=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Cancel `cancel` on Ctrl+C, or SIGTERM on Unix.
///
/// The SIGTERM handler is registered before this returns, so a signal sent
/// right after the status line is printed still shuts down cleanly.
fn install_shutdown_handler(cancel: CancellationToken) -> std::io::Result<()> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = terminate.recv();
        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => tracing::info!("received Ctrl+C, shutting down"),
                Err(e) => {
                    tracing::warn!(?e, "failed to listen for Ctrl+C");
                    return;
                }
            },
            _ = terminate => tracing::info!("received SIGTERM, shutting down"),
        }
        cancel.cancel();
    });
    Ok(())
}
