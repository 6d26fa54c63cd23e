//! Per-injection response watching.
//!
//! A [`ResponseWatcher`] follows one transcript file from a baseline offset
//! and streams the assistant's turn to a [`TurnHandler`]: every new text
//! block as it lands, a ping if the turn runs long without output, images the
//! assistant wrote, and finally completion. The watcher is a single task that
//! owns its state, so a delivery is always finished before the next trigger
//! (or the completion path) runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use notify::{Event, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::events::{DetectedImage, ResponseEvent, TurnHandler, log_handler_error};
use crate::transcript::{self, TranscriptFile};

/// Filesystem timestamps lag the system clock by up to a scheduler tick.
const MTIME_SLACK: Duration = Duration::from_secs(1);

/// Floor for the fallback poll; a zero period would never yield.
const MIN_FALLBACK_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherSettings {
    /// Re-read interval used when change notifications are dropped.
    pub fallback_poll: Duration,
    /// Pause after the completion marker to pick up trailing output.
    pub completion_grace: Duration,
    /// Silence after which the handler is pinged once.
    pub ping_after: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            fallback_poll: Duration::from_secs(2),
            completion_grace: Duration::from_millis(1500),
            ping_after: Duration::from_secs(60),
        }
    }
}

/// Handle to a running [`ResponseWatcher`].
#[derive(Debug, Clone)]
pub struct WatchHandle {
    cancel: CancellationToken,
}

impl WatchHandle {
    /// Stop watching. Idempotent; `on_complete` is not called.
    ///
    /// A delivery the watcher already started can still reach the handler
    /// after this returns; callers that need a hard cutoff gate the handler
    /// themselves, as the manager's relay does.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the watcher was stopped or has finished its turn.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub struct ResponseWatcher {
    file: TranscriptFile,
    offset: u64,
    handler: Arc<dyn TurnHandler>,
    settings: WatcherSettings,
    cancel: CancellationToken,
    started_at: SystemTime,
    cwd: String,
    last_delivered: Option<String>,
    images: Vec<PathBuf>,
}

impl ResponseWatcher {
    /// Spawn a watcher on the current tokio runtime.
    pub fn start(
        file: TranscriptFile,
        baseline: u64,
        handler: Arc<dyn TurnHandler>,
        settings: WatcherSettings,
    ) -> WatchHandle {
        let cancel = CancellationToken::new();
        let watcher = Self {
            file,
            offset: baseline,
            handler,
            settings,
            cancel: cancel.clone(),
            started_at: SystemTime::now(),
            cwd: String::new(),
            last_delivered: None,
            images: Vec::new(),
        };
        tokio::spawn(watcher.run());
        WatchHandle { cancel }
    }

    async fn run(mut self) {
        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        let _fs_watcher = watch_file(&self.file.path, wake_tx);

        self.prime().await;
        info!(
            session = %self.file.session_id,
            file = %self.file.path.display(),
            offset = self.offset,
            "watching for response"
        );

        let mut fallback = tokio::time::interval(self.settings.fallback_poll.max(MIN_FALLBACK_POLL));
        fallback.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ping = tokio::time::sleep(self.settings.ping_after);
        tokio::pin!(ping);
        let mut pinged = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(session = %self.file.session_id, "response watcher stopped");
                    return;
                }
                _ = &mut ping, if !pinged => {
                    pinged = true;
                    if self.last_delivered.is_none() && !self.cancel.is_cancelled() {
                        debug!(session = %self.file.session_id, "no response yet; pinging");
                        log_handler_error("on_ping", self.handler.on_ping().await);
                    }
                    continue;
                }
                Some(()) = wake_rx.recv() => {}
                _ = fallback.tick() => {}
            }

            if self.scan().await {
                self.complete().await;
                return;
            }
        }
    }

    /// Clamp the baseline and learn the session's working directory.
    async fn prime(&mut self) {
        let Ok(bytes) = tokio::fs::read(&self.file.path).await else {
            return;
        };
        let len = bytes.len() as u64;
        if self.offset > len {
            debug!(offset = self.offset, len, "baseline past end of transcript; clamping");
            self.offset = len;
        }
        let start = self.offset as usize;
        let entries = transcript::parse_entries(&String::from_utf8_lossy(&bytes[..start]));
        if let Some(cwd) = transcript::latest_cwd(&entries) {
            self.cwd = cwd.to_string();
        }
    }

    /// Read what was appended after the baseline and deliver new text.
    /// Returns whether the turn is complete.
    async fn scan(&mut self) -> bool {
        let bytes = match tokio::fs::read(&self.file.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                trace!(file = %self.file.path.display(), error = %e, "transcript read failed; retrying later");
                return false;
            }
        };
        if (bytes.len() as u64) < self.offset {
            debug!(offset = self.offset, len = bytes.len(), "transcript shrank; clamping baseline");
            self.offset = bytes.len() as u64;
        }

        let entries = transcript::parse_entries(&transcript::slice_after(&bytes, self.offset));
        if let Some(cwd) = transcript::latest_cwd(&entries) {
            self.cwd = cwd.to_string();
        }
        for path in transcript::image_writes(&entries) {
            if !self.images.contains(&path) {
                self.images.push(path);
            }
        }
        if let Some(text) = transcript::last_assistant_text(&entries) {
            let text = text.to_string();
            self.deliver(text).await;
        }
        transcript::contains_turn_complete(&entries)
    }

    async fn deliver(&mut self, text: String) {
        if self.last_delivered.as_deref() == Some(text.as_str()) || self.cancel.is_cancelled() {
            return;
        }
        self.last_delivered = Some(text.clone());
        let event = ResponseEvent {
            session_id: self.file.session_id.clone(),
            project_name: transcript::project_name(&self.cwd),
            cwd: self.cwd.clone(),
            file_path: self.file.path.clone(),
            text,
        };
        trace!(session = %event.session_id, len = event.text.len(), "delivering response text");
        log_handler_error("on_response", self.handler.on_response(event).await);
    }

    async fn complete(mut self) {
        debug!(session = %self.file.session_id, "completion marker seen");
        tokio::select! {
            _ = self.cancel.cancelled() => return,
            _ = tokio::time::sleep(self.settings.completion_grace) => {}
        }
        self.scan().await;
        if self.cancel.is_cancelled() {
            return;
        }

        let images = self.load_images().await;
        if !images.is_empty() {
            debug!(count = images.len(), "delivering images");
            log_handler_error("on_images", self.handler.on_images(images).await);
        }
        if self.cancel.is_cancelled() {
            return;
        }
        info!(session = %self.file.session_id, "response complete");
        log_handler_error("on_complete", self.handler.on_complete().await);
        self.cancel.cancel();
    }

    /// Encode the images written during this turn.
    async fn load_images(&self) -> Vec<DetectedImage> {
        let mut images = Vec::new();
        for path in &self.images {
            let path = if path.is_relative() && !self.cwd.is_empty() {
                Path::new(&self.cwd).join(path)
            } else {
                path.clone()
            };
            let fresh = tokio::fs::metadata(&path)
                .await
                .and_then(|meta| meta.modified())
                .is_ok_and(|modified| modified + MTIME_SLACK >= self.started_at);
            if !fresh {
                trace!(path = %path.display(), "image missing or older than the turn");
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(bytes) => images.push(DetectedImage {
                    media_type: transcript::image_media_type(&path).to_string(),
                    data_base64: STANDARD.encode(bytes),
                    path,
                }),
                Err(e) => debug!(path = %path.display(), error = %e, "image unreadable"),
            }
        }
        images
    }
}

/// Wake `wake_tx` on changes to `path`. The watcher is kept alive by the
/// caller; `None` leaves the fallback poll in charge.
fn watch_file(path: &Path, wake_tx: mpsc::Sender<()>) -> Option<notify::RecommendedWatcher> {
    let dir = path.parent()?;
    let name = path.file_name()?.to_os_string();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let Ok(event) = res else { return };
        if event.paths.iter().any(|p| p.file_name() == Some(name.as_os_str())) {
            let _ = wake_tx.try_send(());
        }
    })
    .map_err(|e| debug!(error = %e, "file watcher unavailable; polling only"))
    .ok()?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| debug!(dir = %dir.display(), error = %e, "cannot watch transcript directory; polling only"))
        .ok()?;
    Some(watcher)
}
