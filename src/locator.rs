//! Live transcript resolution for a working directory.
//!
//! Claude Code stores one directory per working directory under the
//! transcript root, named by replacing every non-alphanumeric character of the
//! path with `-`. Each directory can hold several session files: old sessions,
//! and the new ones created after `/clear` or context compaction. Only one of
//! them is live.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, trace};

use crate::transcript::{self, TRANSCRIPT_EXTENSION, TranscriptFile};

/// Subagent sidechains live next to the main sessions in older layouts.
const SIDECHAIN_PREFIX: &str = "agent-";

/// A point in a transcript to start watching from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchBaseline {
    pub file_path: PathBuf,
    pub session_id: String,
    pub byte_offset: u64,
}

/// What a candidate file holds so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileContent {
    /// No well-formed entry (empty, unreadable, or garbage).
    Empty,
    /// Only metadata or user records: a session has started but the
    /// assistant has not answered yet.
    Started,
    /// At least one assistant text or tool-use block.
    Conversational,
}

/// Whether `path` names a main-session transcript (not a subagent sidechain).
pub fn is_session_file(path: &Path) -> bool {
    let is_jsonl = path.extension().and_then(|ext| ext.to_str()) == Some(TRANSCRIPT_EXTENSION);
    let is_sidechain = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(SIDECHAIN_PREFIX));
    is_jsonl && !is_sidechain
}

/// Encode a working directory the way Claude Code names project directories.
pub fn encode_project_dir(cwd: &Path) -> String {
    cwd.to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Resolves live transcript files under a transcript root.
#[derive(Debug, Clone)]
pub struct LogLocator {
    root: PathBuf,
}

impl LogLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self, cwd: &Path) -> PathBuf {
        self.root.join(encode_project_dir(cwd))
    }

    /// Resolve the transcript file that represents the live conversation.
    ///
    /// Candidates are ranked newest first. The newest file wins as soon as a
    /// session has started in it, even before the assistant wrote anything;
    /// otherwise the newest file with assistant content wins. With no content
    /// anywhere the newest file is returned.
    pub async fn resolve_live_file(&self, cwd: &Path) -> Option<TranscriptFile> {
        let dir = self.project_dir(cwd);
        let candidates = list_candidates(&dir).await;
        let newest = candidates.first()?.clone();

        for (index, path) in candidates.iter().enumerate() {
            match scan_file(path).await {
                FileContent::Conversational => {
                    debug!(file = %path.display(), "live transcript has content");
                    return TranscriptFile::from_path(path.clone());
                }
                FileContent::Started if index == 0 => {
                    debug!(file = %path.display(), "live transcript is a fresh session");
                    return TranscriptFile::from_path(path.clone());
                }
                _ => {}
            }
        }

        debug!(file = %newest.display(), "no transcript with content; using newest");
        TranscriptFile::from_path(newest)
    }

    /// Snapshot the live file and its current size.
    pub async fn snapshot_baseline(&self, cwd: &Path) -> Option<WatchBaseline> {
        let file = self.resolve_live_file(cwd).await?;
        let byte_offset = current_size(&file.path).await;
        Some(WatchBaseline {
            file_path: file.path,
            session_id: file.session_id,
            byte_offset,
        })
    }
}

/// Current length of a file in bytes; 0 when it cannot be read.
pub async fn current_size(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0)
}

async fn list_candidates(dir: &Path) -> Vec<PathBuf> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) => {
            trace!(dir = %dir.display(), error = %e, "project directory unavailable");
            return Vec::new();
        }
    };

    let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let path = entry.path();
        if !is_session_file(&path) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((modified, path));
    }

    // Newest first; ties broken by name so the order is stable.
    found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    found.into_iter().map(|(_, path)| path).collect()
}

async fn scan_file(path: &Path) -> FileContent {
    let Ok(bytes) = tokio::fs::read(path).await else {
        return FileContent::Empty;
    };
    let entries = transcript::parse_entries(&String::from_utf8_lossy(&bytes));
    if entries.iter().any(|entry| entry.is_conversational()) {
        FileContent::Conversational
    } else if entries.is_empty() {
        FileContent::Empty
    } else {
        FileContent::Started
    }
}
