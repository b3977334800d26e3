use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Display name substituted when a session is created without one.
pub const DEFAULT_SESSION_NAME: &str = "debug";

/// Maximum length of the slug portion of a session id.
const MAX_SLUG_LEN: usize = 30;

/// Random bytes in the id suffix (rendered as twice as many hex chars).
const SUFFIX_BYTES: usize = 3;

/// Longest session id accepted from a client.
const MAX_SESSION_ID_LEN: usize = 64;

/// Attempts at drawing a suffix whose log file doesn't exist yet.
const MAX_CREATE_ATTEMPTS: usize = 16;

/// Turn a caller-supplied name into a filesystem-safe slug.
///
/// Lowercases, maps every char outside `[a-z0-9-]` to `-`, collapses runs of
/// `-`, and truncates to 30 chars.
pub fn sanitize_name(name: &str) -> String {
    let mut slug = String::with_capacity(name.len().min(MAX_SLUG_LEN));
    for c in name.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug.truncate(MAX_SLUG_LEN);
    slug
}

/// Random lowercase hex token used to keep same-name sessions apart.
pub fn generate_suffix() -> String {
    let bytes: [u8; SUFFIX_BYTES] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// File name of the log for session `id`.
pub fn log_file_name(id: &str) -> String {
    format!("debug-{id}.log")
}

/// Validate a session id presented by a client.
///
/// Ids are 1-64 chars of `[a-z0-9-]`, which is everything `create` can mint
/// and keeps reconstructed paths inside the debug directory.
pub fn validate_session_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("session id must not be empty".into());
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(format!(
            "session id too long ({} chars, max {MAX_SESSION_ID_LEN})",
            id.len()
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(format!(
            "session id contains invalid characters: {}",
            id.chars().take(MAX_SESSION_ID_LEN).collect::<String>()
        ));
    }
    Ok(())
}

/// A debugging session and its backing log file.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// Name as the caller supplied it, before sanitizing.
    pub name: String,
    pub log_file: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Where an append for a given session id should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// The id belongs to a session created by this process.
    Registered(PathBuf),
    /// The id is unknown here (typically minted before a restart); the path
    /// was rebuilt from the id with the same naming rule `create` uses.
    Reconstructed(PathBuf),
}

impl LogTarget {
    pub fn path(&self) -> &Path {
        match self {
            LogTarget::Registered(path) | LogTarget::Reconstructed(path) => path,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, LogTarget::Registered(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to create log file {}: {source}", path.display())]
    CreateLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no free session id for {0:?} after {} attempts", MAX_CREATE_ATTEMPTS)]
    IdsExhausted(String),
}

/// In-memory index from session id to session metadata.
///
/// The log files on disk are the real state; this map only speeds up lookup
/// and backs the status listing. It is lost on restart, which `resolve`
/// tolerates by rebuilding paths from ids.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    debug_dir: Arc<PathBuf>,
}

impl SessionRegistry {
    pub fn new(debug_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            debug_dir: Arc::new(debug_dir.into()),
        }
    }

    pub fn debug_dir(&self) -> &Path {
        &self.debug_dir
    }

    /// Path of the log file for `id`, whether or not it is registered.
    pub fn log_path_for(&self, id: &str) -> PathBuf {
        self.debug_dir.join(log_file_name(id))
    }

    /// Create a session and its empty log file.
    ///
    /// The file exists by the time this returns. It is created exclusively,
    /// so a suffix that collides with a file left by an earlier run is
    /// redrawn instead of truncating that log.
    pub async fn create(&self, name: Option<String>) -> Result<Session, RegistryError> {
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string());
        let slug = sanitize_name(&name);

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let id = format!("{slug}-{}", generate_suffix());
            if self.inner.read().contains_key(&id) {
                continue;
            }

            let log_file = self.log_path_for(&id);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&log_file)
                .await
            {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => {
                    return Err(RegistryError::CreateLog {
                        path: log_file,
                        source,
                    })
                }
            }

            let session = Session {
                id: id.clone(),
                name,
                log_file,
                created_at: Utc::now(),
            };
            self.inner.write().insert(id, session.clone());
            tracing::info!(
                session_id = %session.id,
                name = %session.name,
                log_file = %session.log_file.display(),
                "session created"
            );
            return Ok(session);
        }

        Err(RegistryError::IdsExhausted(slug))
    }

    /// Resolve the log file for `id`.
    ///
    /// Unknown ids fall back to the reconstructed path and are deliberately
    /// not registered, so appends with stale or stray ids never create
    /// registry entries.
    pub fn resolve(&self, id: &str) -> LogTarget {
        if let Some(session) = self.inner.read().get(id) {
            return LogTarget::Registered(session.log_file.clone());
        }
        LogTarget::Reconstructed(self.log_path_for(id))
    }

    /// Registered session ids, oldest first.
    pub fn ids(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut sessions: Vec<&Session> = inner.values().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions.into_iter().map(|s| s.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
