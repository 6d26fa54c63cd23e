//! Durable record of the session the chat is attached to.
//!
//! The chat side remembers which Claude Code session (and working directory)
//! it talks to. When a turn reveals that the session rotated to a new
//! transcript, the manager records the new session id here.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The attached session for a working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub session_id: String,
    pub cwd: PathBuf,
    pub updated_at: DateTime<Utc>,
}

impl Attachment {
    pub fn new(cwd: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            cwd: cwd.into(),
            updated_at: Utc::now(),
        }
    }
}

pub trait AttachmentStore: Send + Sync {
    fn load(&self) -> Option<Attachment>;

    /// Record `session_id` as the attached session for `cwd`.
    fn record_session(&self, cwd: &Path, session_id: &str) -> Result<()>;
}

/// JSON file store, rewritten through a temporary file and a rename.
#[derive(Debug, Clone)]
pub struct FileAttachmentStore {
    path: PathBuf,
}

impl FileAttachmentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AttachmentStore for FileAttachmentStore {
    fn load(&self) -> Option<Attachment> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(attachment) => Some(attachment),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable attachment state");
                None
            }
        }
    }

    fn record_session(&self, cwd: &Path, session_id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let attachment = Attachment::new(cwd, session_id);
        let json = serde_json::to_string_pretty(&attachment)
            .context("failed to serialize attachment state")?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), session = session_id, "attachment recorded");
        Ok(())
    }
}

/// Process-local store for one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryAttachmentStore {
    current: Mutex<Option<Attachment>>,
}

impl MemoryAttachmentStore {
    pub fn with(attachment: Attachment) -> Self {
        Self {
            current: Mutex::new(Some(attachment)),
        }
    }
}

impl AttachmentStore for MemoryAttachmentStore {
    fn load(&self) -> Option<Attachment> {
        self.current.lock().ok()?.clone()
    }

    fn record_session(&self, cwd: &Path, session_id: &str) -> Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| anyhow::anyhow!("attachment state lock poisoned"))?;
        *current = Some(Attachment::new(cwd, session_id));
        Ok(())
    }
}
