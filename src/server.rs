//! Collector startup and serve loop.
//!
//! Probes the port, prepares the debug directory, binds, announces itself
//! with one JSON status line on stdout, then serves until cancelled.

use serde::Serialize;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::{self, AppState, RouterConfig};
use crate::config::CollectorConfig;
use crate::guard::{self, PortStatus};
use crate::session::SessionRegistry;

/// Machine-readable line printed on stdout once per process start.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusLine {
    Started {
        port: u16,
        debug_dir: String,
        project: String,
    },
    AlreadyRunning {
        port: u16,
        message: String,
    },
}

impl StatusLine {
    fn already_running(port: u16) -> Self {
        StatusLine::AlreadyRunning {
            port,
            message: "Debug server already running on this port".to_string(),
        }
    }

    /// Write the line to stdout and flush it so launching tooling sees it
    /// immediately.
    pub fn emit(&self) -> io::Result<()> {
        let line = serde_json::to_string(self)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()
    }
}

/// How a collector run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Another instance holds the port; nothing was started.
    AlreadyRunning,
    /// Served until the cancellation token fired.
    Stopped,
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to probe {addr}: {source}")]
    Probe {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to create debug directory {}: {source}", path.display())]
    DebugDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl StartupError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::Probe { .. } | StartupError::Bind { .. } => 2,
            StartupError::DebugDir { .. } => 3,
            StartupError::Serve(_) | StartupError::Io(_) => 1,
        }
    }
}

/// Run a collector until `cancel` fires.
///
/// Returns [`ServeOutcome::AlreadyRunning`] without touching the debug
/// directory when the port is taken.
pub async fn run(
    config: CollectorConfig,
    cancel: CancellationToken,
) -> Result<ServeOutcome, StartupError> {
    let addr = config.bind_addr();

    match guard::probe(addr).await {
        Ok(PortStatus::Available) => {}
        Ok(PortStatus::InUse) => return already_running(addr),
        Err(source) => return Err(StartupError::Probe { addr, source }),
    }

    let debug_dir = config.debug_dir();
    tokio::fs::create_dir_all(&debug_dir)
        .await
        .map_err(|source| StartupError::DebugDir {
            path: debug_dir.clone(),
            source,
        })?;

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        // Lost the race against another instance started after the probe.
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => return already_running(addr),
        Err(source) => return Err(StartupError::Bind { addr, source }),
    };
    let local_addr = listener.local_addr()?;

    let state = AppState::new(SessionRegistry::new(&debug_dir), local_addr.port());
    let app = api::router(
        state,
        RouterConfig {
            body_timeout: config.body_timeout,
            max_body_bytes: config.max_body_bytes,
        },
    );

    StatusLine::Started {
        port: local_addr.port(),
        debug_dir: debug_dir.display().to_string(),
        project: config.project.display().to_string(),
    }
    .emit()?;
    tracing::info!(addr = %local_addr, debug_dir = %debug_dir.display(), "debug collector listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(StartupError::Serve)?;

    tracing::info!("debug collector stopped");
    Ok(ServeOutcome::Stopped)
}

fn already_running(addr: SocketAddr) -> Result<ServeOutcome, StartupError> {
    tracing::info!(addr = %addr, "port in use, assuming a collector is already running");
    StatusLine::already_running(addr.port()).emit()?;
    Ok(ServeOutcome::AlreadyRunning)
}
