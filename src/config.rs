use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port used when neither `--port` nor `DEBUG_PORT` is given.
pub const DEFAULT_PORT: u16 = 8787;

/// Name of the directory, relative to the project root, holding session logs.
pub const DEBUG_DIR_NAME: &str = ".debug";

/// Default bound on how long a client may take to send a request body.
pub const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum request body size (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Runtime configuration for one collector process.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Absolute project root. Logs live in `<project>/.debug`.
    pub project: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub body_timeout: Duration,
    pub max_body_bytes: usize,
}

impl CollectorConfig {
    /// Build a config rooted at `project` with default network settings.
    ///
    /// Relative project paths are resolved against the current directory so
    /// that paths reported to clients are always absolute.
    pub fn new(project: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            project: absolutize(project.as_ref())?,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            body_timeout: DEFAULT_BODY_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_body_timeout(mut self, timeout: Duration) -> Self {
        self.body_timeout = timeout;
        self
    }

    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Directory that holds every session's log file.
    pub fn debug_dir(&self) -> PathBuf {
        self.project.join(DEBUG_DIR_NAME)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
