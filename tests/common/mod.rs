#![allow(dead_code)]

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use debug_collector::api::{router, AppState, RouterConfig};
use debug_collector::session::SessionRegistry;

pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a router over a fresh temp debug directory.
///
/// Returns the router, its state (for direct registry access), and the
/// `TempDir`, which must outlive the test.
pub fn create_test_app() -> (axum::Router, AppState, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().unwrap();
    let state = AppState::new(SessionRegistry::new(dir.path()), 8787);
    (router(state.clone(), RouterConfig::default()), state, dir)
}

/// Parse every line of a log file as JSON.
pub fn read_records(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).expect("every record line is valid JSON"))
        .collect()
}

/// Find a free port.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// A collector process started from the built binary.
pub struct Collector {
    pub child: Child,
    pub port: u16,
    /// First stdout line (the JSON status line).
    pub status_line: serde_json::Value,
}

impl Collector {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Send SIGKILL and reap the process.
    pub fn kill(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Start the binary for `project` on `port` and wait for its status line.
pub fn spawn_collector(project: &Path, port: u16) -> Collector {
    let mut child = collector_command(project, port)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn debug-collector");
    let stdout = child.stdout.take().unwrap();
    let status_line = read_status_line(stdout);
    Collector {
        child,
        port,
        status_line,
    }
}

pub fn collector_command(project: &Path, port: u16) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_debug-collector"));
    cmd.arg(project)
        .arg("--port")
        .arg(port.to_string())
        .env("RUST_LOG", "debug_collector=debug");
    cmd
}

/// Read the first stdout line, failing the test if it never arrives.
pub fn read_status_line(stdout: std::process::ChildStdout) -> serde_json::Value {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = BufReader::new(stdout).read_line(&mut line);
        let _ = tx.send(line);
    });
    let line = rx
        .recv_timeout(STARTUP_TIMEOUT)
        .expect("collector did not print a status line in time");
    serde_json::from_str(line.trim()).expect("status line is JSON")
}

/// Wait for a process to exit, killing it if it overstays.
pub fn wait_for_exit(child: &mut Child) -> std::process::ExitStatus {
    let start = std::time::Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("try_wait failed") {
            return status;
        }
        if start.elapsed() > SHUTDOWN_TIMEOUT {
            child.kill().ok();
            panic!("process did not exit in time");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

pub fn log_path(project: &Path, session_id: &str) -> PathBuf {
    project.join(".debug").join(format!("debug-{session_id}.log"))
}
