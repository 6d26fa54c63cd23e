//! Waiting-state detection across every live transcript.
//!
//! The monitor watches the whole transcript root and, per session file,
//! debounces bursts of appends into one evaluation. An evaluation looks at
//! the latest assistant output and decides whether Claude Code is blocked on
//! the human: a yes/no question, an enter pause, a selection menu on screen,
//! or a plan waiting for approval. Each distinct blocking text is reported
//! once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::events::{WaitingHandler, WaitingState, log_handler_error};
use crate::locator::is_session_file;
use crate::prompt::{self, PLAN_APPROVAL_CHOICES, WaitingKind};
use crate::tmux::{PaneControl, PaneLookup};
use crate::transcript::{self, EXIT_PLAN_MODE_TOOL, TranscriptEntry};

/// Change notifications buffered between the notify thread and the monitor.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Session files sit at `<root>/<project>/<session>.jsonl`.
const SESSION_FILE_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub debounce: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(3),
        }
    }
}

/// Per-path trailing-edge debounce.
///
/// Every touch pushes the path's deadline out by the full delay, so a burst
/// of changes closer together than the delay yields one due path.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    pub fn touch(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now + self.delay);
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Remove and return every path whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &due {
            self.pending.remove(path);
        }
        due
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Watches the transcript root and reports waiting states.
pub struct WaitingStateMonitor {
    root: PathBuf,
    settings: MonitorSettings,
    panes: Arc<dyn PaneControl>,
    handler: Arc<dyn WaitingHandler>,
    /// Last text notified per session file.
    last_notified: HashMap<PathBuf, String>,
}

impl WaitingStateMonitor {
    pub fn new(
        root: impl Into<PathBuf>,
        settings: MonitorSettings,
        panes: Arc<dyn PaneControl>,
        handler: Arc<dyn WaitingHandler>,
    ) -> Self {
        Self {
            root: root.into(),
            settings,
            panes,
            handler,
            last_notified: HashMap::new(),
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Fails only if the transcript root cannot be watched.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        self.root = tokio::fs::canonicalize(&self.root)
            .await
            .with_context(|| format!("transcript root {} is not accessible", self.root.display()))?;

        let (tx, mut rx) = mpsc::channel::<PathBuf>(EVENT_CHANNEL_CAPACITY);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    for path in event.paths {
                        let _ = tx.try_send(path);
                    }
                }
            }
            Err(e) => warn!(error = %e, "transcript watch error"),
        })
        .context("failed to create transcript watcher")?;
        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", self.root.display()))?;

        info!(
            root = %self.root.display(),
            debounce_ms = self.settings.debounce.as_millis() as u64,
            "waiting-state monitor started"
        );

        let mut debouncer = Debouncer::new(self.settings.debounce);
        loop {
            let deadline = debouncer.next_deadline();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(path) = rx.recv() => {
                    if self.is_session_path(&path) {
                        trace!(file = %path.display(), "transcript changed");
                        debouncer.touch(path, Instant::now());
                    }
                }
                _ = sleep_until(deadline) => {
                    for path in debouncer.take_due(Instant::now()) {
                        self.evaluate(&path).await;
                    }
                }
            }
        }

        drop(watcher);
        info!("waiting-state monitor stopped");
        Ok(())
    }

    fn is_session_path(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        relative.components().count() == SESSION_FILE_DEPTH && is_session_file(path)
    }

    /// Evaluate one session file and notify if it shows a new waiting state.
    pub async fn evaluate(&mut self, path: &Path) {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(file = %path.display(), error = %e, "transcript unreadable; skipping");
                return;
            }
        };
        let entries = transcript::parse_entries(&String::from_utf8_lossy(&bytes));
        let Some(session_id) = transcript::session_id_for(path) else {
            return;
        };
        let cwd = transcript::latest_cwd(&entries).unwrap_or_default().to_string();

        let (kind, prompt_text, choices) = if let Some(plan) = plan_prompt(&entries) {
            if self.already_notified(path, &plan) {
                return;
            }
            let choices: Vec<String> = PLAN_APPROVAL_CHOICES.iter().map(|c| c.to_string()).collect();
            (WaitingKind::MultipleChoice, plan, choices)
        } else {
            let Some(text) = transcript::last_assistant_text(&entries) else {
                return;
            };
            if self.already_notified(path, text) {
                return;
            }
            let text = text.to_string();
            match prompt::classify_waiting_type(&text) {
                Some(kind) => (kind, text, Vec::new()),
                None => match self.menu_on_screen(&cwd).await {
                    Some(choices) => (WaitingKind::MultipleChoice, text, choices),
                    None => {
                        trace!(file = %path.display(), "assistant is not waiting");
                        return;
                    }
                },
            }
        };

        self.last_notified.insert(path.to_path_buf(), prompt_text.clone());
        let state = WaitingState {
            session_id,
            project_name: transcript::project_name(&cwd),
            cwd,
            file_path: path.to_path_buf(),
            kind,
            prompt_text,
            choices,
        };
        info!(
            session = %state.session_id,
            project = %state.project_name,
            kind = ?state.kind,
            "assistant is waiting for input"
        );
        log_handler_error("on_waiting", self.handler.on_waiting(state).await);
    }

    fn already_notified(&self, path: &Path, text: &str) -> bool {
        let seen = self.last_notified.get(path).is_some_and(|last| last == text);
        if seen {
            trace!(file = %path.display(), "waiting state already notified");
        }
        seen
    }

    /// Look for a numbered selection menu in the session's pane.
    async fn menu_on_screen(&self, cwd: &str) -> Option<Vec<String>> {
        if cwd.is_empty() {
            return None;
        }
        let panes = Arc::clone(&self.panes);
        let cwd = PathBuf::from(cwd);
        let capture = tokio::task::spawn_blocking(move || capture_for(panes.as_ref(), &cwd))
            .await
            .ok()
            .flatten()?;
        prompt::parse_multiple_choices(&capture)
    }
}

fn capture_for(panes: &dyn PaneControl, cwd: &Path) -> Option<String> {
    let pane = match panes.find_pane(cwd) {
        PaneLookup::Found(pane) => pane,
        PaneLookup::NotFound(reason) => {
            debug!(cwd = %cwd.display(), %reason, "cannot check for a selection menu");
            return None;
        }
    };
    match panes.capture_pane(&pane) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!(pane = %pane, error = %e, "pane capture failed");
            None
        }
    }
}

/// Prompt for a pending plan approval, if the latest assistant entry calls
/// `ExitPlanMode`: the plan itself, else the nearest assistant text.
fn plan_prompt(entries: &[TranscriptEntry]) -> Option<String> {
    let mut assistants = entries
        .iter()
        .rev()
        .filter(|entry| entry.is_conversational())
        .filter_map(TranscriptEntry::as_assistant);
    let latest = assistants.next()?;
    let input = latest.tool_use(EXIT_PLAN_MODE_TOOL)?;

    let plan = input
        .get("plan")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|plan| !plan.is_empty());
    let prompt = match plan {
        Some(plan) => plan.to_string(),
        None => latest
            .last_text()
            .or_else(|| assistants.next().and_then(|prev| prev.last_text()))
            .unwrap_or("Plan ready for approval")
            .to_string(),
    };
    Some(prompt)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
