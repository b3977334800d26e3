//! Append-only per-session log files.
//!
//! Each record is one JSON line written with a single `write_all` on a file
//! opened in append mode. Writers to the same path are serialized through a
//! per-path async mutex; writers to different paths never contend.

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Caller-supplied part of a log record.
///
/// Every field is optional and stored exactly as received, whatever its JSON
/// type. A JSON `null` reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(
        rename = "hypothesisId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub hypothesis_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<Value>,
}

/// A log entry stamped with its receipt time, as written to disk.
#[derive(Debug, Serialize)]
pub struct LogRecord<'a> {
    pub ts: String,
    #[serde(flatten)]
    pub entry: &'a LogEntry,
}

impl<'a> LogRecord<'a> {
    /// Stamp `entry` with the current time (RFC 3339, millisecond precision, UTC).
    pub fn stamp(entry: &'a LogEntry) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            entry,
        }
    }

    /// Encode as a single `\n`-terminated JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>, SinkError> {
        let mut line = serde_json::to_vec(self).map_err(SinkError::Encode)?;
        line.push(b'\n');
        Ok(line)
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to encode log record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to append to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("append task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

type PathLock = Arc<tokio::sync::Mutex<()>>;

/// Appends records to log files, one writer at a time per path.
#[derive(Clone, Default)]
pub struct LogSink {
    locks: Arc<Mutex<HashMap<PathBuf, PathLock>>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `entry` and append it to `path`, creating the file if needed.
    ///
    /// The timestamp is taken after the path's lock is acquired, so records
    /// in one file are in both write order and timestamp order.
    ///
    /// The work runs on its own task and completes even if the caller's
    /// future is dropped, so the path's lock is never released while a
    /// write is still in progress.
    pub async fn append(&self, path: &Path, entry: &LogEntry) -> Result<(), SinkError> {
        let sink = self.clone();
        let path = path.to_path_buf();
        let entry = entry.clone();
        tokio::spawn(async move { sink.append_locked(&path, &entry).await }).await?
    }

    async fn append_locked(&self, path: &Path, entry: &LogEntry) -> Result<(), SinkError> {
        let lock = self.lock_for(path);
        let result = {
            let _guard = lock.lock().await;
            write_record(path, entry).await
        };
        drop(lock);
        self.release(path);
        result
    }

    /// Number of paths with an append in flight.
    pub fn active_paths(&self) -> usize {
        self.locks.lock().len()
    }

    fn lock_for(&self, path: &Path) -> PathLock {
        self.locks
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .clone()
    }

    /// Forget the lock for `path` once no other append holds a handle to it.
    fn release(&self, path: &Path) {
        let mut locks = self.locks.lock();
        if locks.get(path).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(path);
        }
    }
}

async fn write_record(path: &Path, entry: &LogEntry) -> Result<(), SinkError> {
    let line = LogRecord::stamp(entry).to_line()?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || append_line(&path, &line)).await?
}

fn append_line(path: &Path, line: &[u8]) -> Result<(), SinkError> {
    let write = || -> io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(line)
    };
    write().map_err(|source| SinkError::Write {
        path: path.to_path_buf(),
        source,
    })
}
