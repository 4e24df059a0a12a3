//! Append-only history log
//!
//! Every chat, private and presence event is stored as one JSON object per
//! line. Insertion order is the only index; records are never updated or
//! removed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::current_timestamp;
use crate::error::{ChatError, Result};

/// One persisted event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Name of the client that produced the event
    pub sender: String,
    /// Message text, or a command marker such as `/disconnect`
    pub body: String,
    /// Addressee of a private message; absent for public and presence records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Milliseconds since UNIX epoch
    #[serde(default)]
    pub timestamp: u64,
}

impl HistoryRecord {
    /// Record for a broadcast or presence event
    pub fn public(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            recipient: None,
            timestamp: current_timestamp(),
        }
    }

    /// Record for a private message
    pub fn private(
        sender: impl Into<String>,
        body: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            recipient: Some(recipient.into()),
            timestamp: current_timestamp(),
        }
    }

    /// Public records have no recipient (an empty one counts as none)
    pub fn is_public(&self) -> bool {
        self.recipient.as_deref().is_none_or(str::is_empty)
    }

    /// Whether `name` sent or received this record
    pub fn involves(&self, name: &str) -> bool {
        self.sender == name || self.recipient.as_deref() == Some(name)
    }

    /// Whether this is a `/disconnect` marker written by `name`
    pub fn is_disconnect_by(&self, name: &str) -> bool {
        self.sender == name && self.body.starts_with("/disconnect")
    }
}

/// Durable, append-only store of [`HistoryRecord`]s
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    /// Serializes appends from concurrent sessions
    append_lock: Mutex<()>,
}

impl HistoryLog {
    /// Use the log at `path`; the file is created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record after all previously appended ones.
    ///
    /// The record is encoded into a single buffer and written with one
    /// `write_all` on a file opened in append mode.
    pub async fn append(&self, record: &HistoryRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.append_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                ChatError::history(format!("failed to open {}: {}", self.path.display(), e))
            })?;

        file.write_all(&line)
            .await
            .map_err(|e| ChatError::history(format!("failed to append record: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| ChatError::history(format!("failed to flush record: {}", e)))?;

        debug!(sender = %record.sender, "appended history record");
        Ok(())
    }

    /// Best-effort append: failures are logged and swallowed
    pub async fn record(&self, record: HistoryRecord) {
        if let Err(e) = self.append(&record).await {
            warn!(sender = %record.sender, "history write failed: {}", e);
        }
    }

    /// Read every record, oldest first.
    ///
    /// A log that does not exist yet is empty. Any line that fails to decode
    /// fails the whole scan.
    pub async fn scan_all(&self) -> Result<Vec<HistoryRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ChatError::history(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| {
                    ChatError::history(format!("corrupt record on line {}: {}", index + 1, e))
                })
            })
            .collect()
    }
}
