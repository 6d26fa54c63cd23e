//! Coordination of response watchers across injections.
//!
//! The manager keeps at most one [`ResponseWatcher`] alive. Starting a new
//! injection stops the previous watcher and still completes its turn, so the
//! caller's terminal side effects run for every turn. A generation counter
//! marks which injection is current: resolutions and background polls that
//! belong to an older generation are discarded.
//!
//! When a turn ends without any text, Claude Code has usually compacted the
//! context and continued in a new transcript file. The manager then polls
//! for the rotated file for a bounded time and follows it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::attachment::AttachmentStore;
use crate::events::{DetectedImage, ResponseEvent, TurnHandler, log_handler_error};
use crate::locator::{LogLocator, WatchBaseline};
use crate::tmux::{PaneControl, PaneLookup};
use crate::transcript::TranscriptFile;
use crate::watcher::{ResponseWatcher, WatchHandle, WatcherSettings};

/// Floor for the rotation poll so a zero interval cannot spin.
const MIN_ROTATION_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    pub watcher: WatcherSettings,
    pub rotation_poll_interval: Duration,
    pub rotation_poll_deadline: Duration,
    /// Time Claude Code gets to record an interruption.
    pub interrupt_settle: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            watcher: WatcherSettings::default(),
            rotation_poll_interval: Duration::from_secs(3),
            rotation_poll_deadline: Duration::from_secs(60),
            interrupt_settle: Duration::from_secs(1),
        }
    }
}

/// The session the chat believes it is talking to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedSession {
    pub cwd: PathBuf,
    pub session_id: Option<String>,
}

pub struct InjectionRequest {
    pub attached: AttachedSession,
    pub chat_id: i64,
    pub handler: Arc<dyn TurnHandler>,
    /// Baseline taken before the text was sent, if any.
    pub pre_baseline: Option<WatchBaseline>,
}

struct ActiveWatch {
    generation: u64,
    handle: WatchHandle,
    relay: Arc<TurnRelay>,
}

struct Shared {
    locator: LogLocator,
    store: Arc<dyn AttachmentStore>,
    settings: ManagerSettings,
    generation: AtomicU64,
    active: Mutex<Option<ActiveWatch>>,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, Option<ActiveWatch>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn clear_if_current(&self, generation: u64) {
        let mut active = self.active();
        if active.as_ref().is_some_and(|watch| watch.generation == generation) {
            *active = None;
        }
    }

    fn persist_session(&self, cwd: &Path, session_id: &str) -> Result<()> {
        self.store
            .record_session(cwd, session_id)
            .with_context(|| format!("failed to record session {session_id} for {}", cwd.display()))
    }
}

/// Owns the active watcher. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct WatcherManager {
    shared: Arc<Shared>,
}

impl WatcherManager {
    pub fn new(locator: LogLocator, store: Arc<dyn AttachmentStore>, settings: ManagerSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                locator,
                store,
                settings,
                generation: AtomicU64::new(0),
                active: Mutex::new(None),
            }),
        }
    }

    pub fn locator(&self) -> &LogLocator {
        &self.shared.locator
    }

    /// The live transcript for `cwd` and its current size.
    pub async fn snapshot_baseline(&self, cwd: &Path) -> Option<WatchBaseline> {
        self.shared.locator.snapshot_baseline(cwd).await
    }

    pub fn has_active(&self) -> bool {
        self.shared
            .active()
            .as_ref()
            .is_some_and(|watch| !watch.handle.is_stopped())
    }

    /// Watch the response to text that was just sent to the assistant.
    ///
    /// Returns the baseline being watched, or `None` when no transcript could
    /// be resolved or a newer injection superseded this one.
    pub async fn start_injection_watcher(&self, request: InjectionRequest) -> Result<Option<WatchBaseline>> {
        let InjectionRequest {
            attached,
            chat_id,
            handler,
            pre_baseline,
        } = request;

        self.stop_and_flush().await;
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let baseline = match pre_baseline {
            Some(baseline) => baseline,
            None => match self.shared.locator.snapshot_baseline(&attached.cwd).await {
                Some(baseline) => baseline,
                None => {
                    warn!(chat_id, cwd = %attached.cwd.display(), "no transcript to watch");
                    return Ok(None);
                }
            },
        };

        if self.shared.current_generation() != generation {
            debug!(chat_id, generation, "injection superseded while resolving; discarding");
            return Ok(None);
        }

        if attached.session_id.as_deref() != Some(baseline.session_id.as_str()) {
            info!(
                chat_id,
                previous = attached.session_id.as_deref().unwrap_or("-"),
                session = %baseline.session_id,
                "attached session rotated"
            );
            self.shared.persist_session(&attached.cwd, &baseline.session_id)?;
        }

        let file = TranscriptFile {
            path: baseline.file_path.clone(),
            session_id: baseline.session_id.clone(),
        };
        let relay = TurnRelay::new(
            handler,
            generation,
            attached.cwd.clone(),
            file.path.clone(),
            true,
            Arc::downgrade(&self.shared),
        );
        if !self.install(generation, file, baseline.byte_offset, relay) {
            debug!(chat_id, generation, "injection superseded before its watcher started");
            return Ok(None);
        }

        info!(chat_id, session = %baseline.session_id, offset = baseline.byte_offset, "injection watcher started");
        Ok(Some(baseline))
    }

    /// Start a watcher and register it as active, unless `generation` is stale.
    fn install(&self, generation: u64, file: TranscriptFile, offset: u64, relay: Arc<TurnRelay>) -> bool {
        let mut active = self.shared.active();
        if self.shared.current_generation() != generation {
            return false;
        }
        let handle = ResponseWatcher::start(file, offset, relay.clone(), self.shared.settings.watcher);
        if let Some(previous) = active.replace(ActiveWatch {
            generation,
            handle,
            relay,
        }) {
            previous.handle.stop();
        }
        true
    }

    /// Stop the active watcher and complete its turn for the caller.
    pub async fn stop_and_flush(&self) {
        let previous = self.shared.active().take();
        if let Some(watch) = previous {
            debug!(generation = watch.generation, "stopping active watcher");
            watch.handle.stop();
            watch.relay.finish().await;
        }
    }

    /// Interrupt the assistant's in-flight turn and return a baseline taken
    /// after the interruption was recorded.
    pub async fn interrupt_and_rebaseline(
        &self,
        cwd: &Path,
        panes: Arc<dyn PaneControl>,
    ) -> Result<Option<WatchBaseline>> {
        self.stop_and_flush().await;

        let target = cwd.to_path_buf();
        let interrupted = tokio::task::spawn_blocking(move || match panes.find_pane(&target) {
            PaneLookup::Found(pane) => panes.send_interrupt(&pane).map(|()| Some(pane)),
            PaneLookup::NotFound(reason) => {
                warn!(cwd = %target.display(), %reason, "cannot interrupt; no pane");
                Ok(None)
            }
        })
        .await
        .context("interrupt task failed")??;

        if let Some(pane) = interrupted {
            info!(pane = %pane, "interrupt sent");
            tokio::time::sleep(self.shared.settings.interrupt_settle).await;
        }
        Ok(self.snapshot_baseline(cwd).await)
    }

    /// Look for a transcript that replaced `old_file` after a silent turn.
    ///
    /// Gives up when a newer injection starts or the deadline passes; on the
    /// deadline the handler's turn is completed.
    pub async fn poll_for_post_compaction_session(
        &self,
        generation: u64,
        cwd: PathBuf,
        old_file: PathBuf,
        handler: Arc<dyn TurnHandler>,
    ) {
        let settings = self.shared.settings;
        let started = Instant::now();
        debug!(generation, file = %old_file.display(), "polling for a rotated session");

        loop {
            tokio::time::sleep(settings.rotation_poll_interval.max(MIN_ROTATION_POLL)).await;
            if self.shared.current_generation() != generation {
                debug!(generation, "rotation poll superseded");
                return;
            }

            let rotated = self
                .shared
                .locator
                .resolve_live_file(&cwd)
                .await
                .filter(|live| live.path != old_file);
            if let Some(live) = rotated {
                info!(session = %live.session_id, file = %live.path.display(), "following rotated session");
                if let Err(e) = self.shared.persist_session(&cwd, &live.session_id) {
                    warn!(error = %format!("{e:#}"), "could not persist rotated session");
                }
                let relay = TurnRelay::new(
                    handler,
                    generation,
                    cwd,
                    live.path.clone(),
                    false,
                    Arc::downgrade(&self.shared),
                );
                self.install(generation, live, 0, relay);
                return;
            }

            if started.elapsed() >= settings.rotation_poll_deadline {
                info!(generation, "no rotated session found; completing turn");
                log_handler_error("on_complete", handler.on_complete().await);
                return;
            }
        }
    }
}

/// Forwards one turn's callbacks to the caller and runs the manager's
/// completion bookkeeping.
struct TurnRelay {
    inner: Arc<dyn TurnHandler>,
    generation: u64,
    cwd: PathBuf,
    file: PathBuf,
    /// Poll for a rotated session when the turn ends silently.
    recover: bool,
    delivered: AtomicBool,
    completed: AtomicBool,
    /// Serializes callbacks with completion: once the turn is finished no
    /// callback reaches the caller, and finishing waits for one in flight.
    gate: tokio::sync::Mutex<()>,
    manager: Weak<Shared>,
}

impl TurnRelay {
    fn new(
        inner: Arc<dyn TurnHandler>,
        generation: u64,
        cwd: PathBuf,
        file: PathBuf,
        recover: bool,
        manager: Weak<Shared>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner,
            generation,
            cwd,
            file,
            recover,
            delivered: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            gate: tokio::sync::Mutex::new(()),
            manager,
        })
    }

    fn is_finished(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Complete the caller's turn, at most once.
    async fn finish(&self) {
        let _gate = self.gate.lock().await;
        if !self.completed.swap(true, Ordering::SeqCst) {
            log_handler_error("on_complete", self.inner.on_complete().await);
        }
    }
}

#[async_trait]
impl TurnHandler for TurnRelay {
    async fn on_response(&self, event: ResponseEvent) -> Result<()> {
        let _gate = self.gate.lock().await;
        if self.is_finished() {
            debug!(generation = self.generation, "turn already finished; dropping response");
            return Ok(());
        }
        self.delivered.store(true, Ordering::SeqCst);
        self.inner.on_response(event).await
    }

    async fn on_ping(&self) -> Result<()> {
        let _gate = self.gate.lock().await;
        if self.is_finished() {
            return Ok(());
        }
        self.inner.on_ping().await
    }

    async fn on_images(&self, images: Vec<DetectedImage>) -> Result<()> {
        let _gate = self.gate.lock().await;
        if self.is_finished() {
            return Ok(());
        }
        self.inner.on_images(images).await
    }

    async fn on_complete(&self) -> Result<()> {
        let shared = self.manager.upgrade();
        if let Some(shared) = &shared {
            shared.clear_if_current(self.generation);
        }
        self.finish().await;

        if self.recover && !self.delivered.load(Ordering::SeqCst) {
            if let Some(shared) = shared {
                debug!(generation = self.generation, "turn ended without text");
                let manager = WatcherManager { shared };
                let generation = self.generation;
                let cwd = self.cwd.clone();
                let file = self.file.clone();
                let handler = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    manager
                        .poll_for_post_compaction_session(generation, cwd, file, handler)
                        .await;
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::MemoryAttachmentStore;
    use crate::testing::{FakePanes, RecordingTurns, TurnEvent, append};
    use crate::transcript::fixtures::*;

    const WAIT: Duration = Duration::from_secs(5);

    struct Setup {
        _tmp: tempfile::TempDir,
        cwd: PathBuf,
        dir: PathBuf,
        store: Arc<MemoryAttachmentStore>,
        manager: WatcherManager,
    }

    fn fast() -> ManagerSettings {
        ManagerSettings {
            watcher: WatcherSettings {
                fallback_poll: Duration::from_millis(50),
                completion_grace: Duration::from_millis(100),
                ping_after: Duration::from_secs(30),
            },
            rotation_poll_interval: Duration::from_millis(100),
            rotation_poll_deadline: Duration::from_millis(800),
            interrupt_settle: Duration::from_millis(10),
        }
    }

    fn setup() -> Setup {
        let tmp = tempfile::tempdir().unwrap();
        let cwd = PathBuf::from("/work/demo");
        let locator = LogLocator::new(tmp.path());
        let dir = locator.project_dir(&cwd);
        std::fs::create_dir_all(&dir).unwrap();
        let store = Arc::new(MemoryAttachmentStore::default());
        let manager = WatcherManager::new(locator, store.clone(), fast());
        Setup {
            _tmp: tmp,
            cwd,
            dir,
            store,
            manager,
        }
    }

    fn request(s: &Setup, session: Option<&str>, handler: Arc<RecordingTurns>) -> InjectionRequest {
        InjectionRequest {
            attached: AttachedSession {
                cwd: s.cwd.clone(),
                session_id: session.map(str::to_string),
            },
            chat_id: 42,
            handler,
            pre_baseline: None,
        }
    }

    #[tokio::test]
    async fn watches_a_turn_to_completion() {
        let s = setup();
        let file = s.dir.join("s1.jsonl");
        append(&file, &assistant_text("earlier turn"));
        let turns = Arc::new(RecordingTurns::default());

        let baseline = s
            .manager
            .start_injection_watcher(request(&s, Some("s1"), turns.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(baseline.session_id, "s1");
        assert!(s.manager.has_active());

        append(&file, &assistant_text("Build succeeded."));
        append(&file, &result());
        assert!(turns.wait_until(WAIT, |e| e.contains(&TurnEvent::Complete)).await);

        assert_eq!(
            turns.events(),
            vec![
                TurnEvent::Response("Build succeeded.".into()),
                TurnEvent::Complete
            ]
        );
        assert!(!s.manager.has_active());
        assert!(s.store.load().is_none());
    }

    #[tokio::test]
    async fn missing_transcript_starts_nothing() {
        let s = setup();
        let turns = Arc::new(RecordingTurns::default());
        let started = s
            .manager
            .start_injection_watcher(request(&s, None, turns))
            .await
            .unwrap();
        assert!(started.is_none());
        assert!(!s.manager.has_active());
    }

    #[tokio::test]
    async fn concurrent_injections_keep_only_the_newest() {
        let s = setup();
        let file = s.dir.join("s1.jsonl");
        append(&file, &user_text("first"));
        let older = Arc::new(RecordingTurns::default());
        let newer = Arc::new(RecordingTurns::default());

        let (older_started, newer_started) = tokio::join!(
            s.manager
                .start_injection_watcher(request(&s, Some("s1"), older.clone())),
            s.manager
                .start_injection_watcher(request(&s, Some("s1"), newer.clone())),
        );
        assert!(older_started.unwrap().is_none());
        assert_eq!(newer_started.unwrap().unwrap().session_id, "s1");
        assert!(s.manager.has_active());

        append(&file, &assistant_text("answer"));
        append(&file, &result());
        assert!(newer.wait_until(WAIT, |e| e.contains(&TurnEvent::Complete)).await);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(newer.responses(), vec!["answer"]);
        assert_eq!(newer.count(&TurnEvent::Complete), 1);
        assert!(older.events().is_empty());
        assert!(!s.manager.has_active());
    }

    #[tokio::test]
    async fn finished_relay_drops_late_callbacks() {
        let turns = Arc::new(RecordingTurns::default());
        let relay = TurnRelay::new(
            turns.clone(),
            1,
            PathBuf::from("/work/demo"),
            PathBuf::from("/p/s1.jsonl"),
            false,
            Weak::new(),
        );

        relay.finish().await;
        relay
            .on_response(ResponseEvent {
                session_id: "s1".into(),
                project_name: "demo".into(),
                cwd: "/work/demo".into(),
                file_path: PathBuf::from("/p/s1.jsonl"),
                text: "late".into(),
            })
            .await
            .unwrap();
        relay.on_ping().await.unwrap();
        relay.finish().await;

        assert_eq!(turns.events(), vec![TurnEvent::Complete]);
    }

    #[tokio::test]
    async fn new_injection_flushes_the_previous_turn() {
        let s = setup();
        let file = s.dir.join("s1.jsonl");
        append(&file, &user_text("first"));
        let first = Arc::new(RecordingTurns::default());
        let second = Arc::new(RecordingTurns::default());

        s.manager
            .start_injection_watcher(request(&s, Some("s1"), first.clone()))
            .await
            .unwrap();
        s.manager
            .start_injection_watcher(request(&s, Some("s1"), second.clone()))
            .await
            .unwrap();
        assert_eq!(first.events(), vec![TurnEvent::Complete]);

        append(&file, &assistant_text("answer to second"));
        assert!(second.wait_until(WAIT, |e| !e.is_empty()).await);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(first.events(), vec![TurnEvent::Complete]);
        assert_eq!(second.responses(), vec!["answer to second"]);
    }

    #[tokio::test]
    async fn flush_completes_a_turn_only_once() {
        let s = setup();
        let file = s.dir.join("s1.jsonl");
        append(&file, &user_text("go"));
        let turns = Arc::new(RecordingTurns::default());
        s.manager
            .start_injection_watcher(request(&s, Some("s1"), turns.clone()))
            .await
            .unwrap();

        s.manager.stop_and_flush().await;
        s.manager.stop_and_flush().await;
        append(&file, &assistant_text("late"));
        append(&file, &result());
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(turns.events(), vec![TurnEvent::Complete]);
    }

    #[tokio::test]
    async fn rotated_session_is_persisted() {
        let s = setup();
        append(&s.dir.join("fresh.jsonl"), &snapshot());
        let turns = Arc::new(RecordingTurns::default());

        s.manager
            .start_injection_watcher(request(&s, Some("stale"), turns))
            .await
            .unwrap();

        let attachment = s.store.load().unwrap();
        assert_eq!(attachment.session_id, "fresh");
        assert_eq!(attachment.cwd, s.cwd);
    }

    #[tokio::test]
    async fn rotation_scenario_follows_the_new_session() {
        let s = setup();
        let old = s.dir.join("session-old.jsonl");
        let new = s.dir.join("session-new.jsonl");
        append(&old, &assistant_text("stale answer"));
        filetime::set_file_mtime(&old, filetime::FileTime::from_unix_time(1_000, 0)).unwrap();
        append(&new, &snapshot());

        let baseline = s.manager.snapshot_baseline(&s.cwd).await.unwrap();
        assert_eq!(baseline.session_id, "session-new");

        let turns = Arc::new(RecordingTurns::default());
        let mut req = request(&s, Some("session-old"), turns.clone());
        req.pre_baseline = Some(baseline);
        s.manager.start_injection_watcher(req).await.unwrap();

        append(&new, &assistant_text("fresh answer"));
        append(&new, &result());
        assert!(turns.wait_until(WAIT, |e| e.contains(&TurnEvent::Complete)).await);

        assert_eq!(turns.responses(), vec!["fresh answer"]);
        assert_eq!(s.store.load().unwrap().session_id, "session-new");
    }

    #[tokio::test]
    async fn silent_turn_follows_the_compacted_session() {
        let s = setup();
        let old = s.dir.join("before.jsonl");
        append(&old, &assistant_text("context so far"));
        filetime::set_file_mtime(&old, filetime::FileTime::from_unix_time(1_000, 0)).unwrap();
        let turns = Arc::new(RecordingTurns::default());

        s.manager
            .start_injection_watcher(request(&s, Some("before"), turns.clone()))
            .await
            .unwrap();
        append(&old, &result());
        assert!(turns.wait_until(WAIT, |e| e.contains(&TurnEvent::Complete)).await);
        filetime::set_file_mtime(&old, filetime::FileTime::from_unix_time(1_000, 0)).unwrap();

        let new = s.dir.join("after.jsonl");
        append(&new, &snapshot());
        assert!(
            turns
                .wait_until(WAIT, |_| s.store.load().is_some_and(|a| a.session_id == "after"))
                .await
        );
        assert!(s.manager.has_active());

        append(&new, &assistant_text("continued after compaction"));
        append(&new, &result());
        assert!(turns.wait_until(WAIT, |e| e.len() == 3).await);

        assert_eq!(
            turns.events(),
            vec![
                TurnEvent::Complete,
                TurnEvent::Response("continued after compaction".into()),
                TurnEvent::Complete
            ]
        );
    }

    #[tokio::test]
    async fn silent_turn_completes_again_at_the_poll_deadline() {
        let s = setup();
        let file = s.dir.join("only.jsonl");
        append(&file, &user_text("hi"));
        let turns = Arc::new(RecordingTurns::default());

        s.manager
            .start_injection_watcher(request(&s, Some("only"), turns.clone()))
            .await
            .unwrap();
        append(&file, &result());

        assert!(turns.wait_until(WAIT, |e| e.len() == 2).await);
        assert_eq!(turns.events(), vec![TurnEvent::Complete, TurnEvent::Complete]);
    }

    #[tokio::test]
    async fn newer_injection_aborts_a_pending_poll() {
        let s = setup();
        let file = s.dir.join("only.jsonl");
        append(&file, &user_text("hi"));
        let first = Arc::new(RecordingTurns::default());

        s.manager
            .start_injection_watcher(request(&s, Some("only"), first.clone()))
            .await
            .unwrap();
        append(&file, &result());
        assert!(first.wait_until(WAIT, |e| !e.is_empty()).await);

        let second = Arc::new(RecordingTurns::default());
        s.manager
            .start_injection_watcher(request(&s, Some("only"), second))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1_200)).await;

        assert_eq!(first.events(), vec![TurnEvent::Complete]);
    }

    #[tokio::test]
    async fn stale_poll_returns_without_completing() {
        let s = setup();
        let turns = Arc::new(RecordingTurns::default());
        let poll = s.manager.poll_for_post_compaction_session(
            99,
            s.cwd.clone(),
            s.dir.join("gone.jsonl"),
            turns.clone(),
        );
        tokio::time::timeout(WAIT, poll).await.unwrap();
        assert!(turns.events().is_empty());
    }

    #[tokio::test]
    async fn interrupt_sends_escape_then_rebaselines() {
        let s = setup();
        let file = s.dir.join("s1.jsonl");
        append(&file, &assistant_text("half-written answer"));
        let turns = Arc::new(RecordingTurns::default());
        s.manager
            .start_injection_watcher(request(&s, Some("s1"), turns.clone()))
            .await
            .unwrap();

        let panes = Arc::new(FakePanes::showing(""));
        let baseline = s
            .manager
            .interrupt_and_rebaseline(&s.cwd, panes.clone())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(turns.events(), vec![TurnEvent::Complete]);
        assert_eq!(panes.calls(), vec!["find /work/demo", "interrupt %1"]);
        assert_eq!(baseline.byte_offset, std::fs::metadata(&file).unwrap().len());
        assert!(!s.manager.has_active());
    }

    #[tokio::test]
    async fn interrupt_without_pane_still_rebaselines() {
        let s = setup();
        append(&s.dir.join("s1.jsonl"), &assistant_text("x"));
        let panes = Arc::new(FakePanes::missing());
        let baseline = s
            .manager
            .interrupt_and_rebaseline(&s.cwd, panes.clone())
            .await
            .unwrap();
        assert_eq!(baseline.unwrap().session_id, "s1");
        assert_eq!(panes.calls(), vec!["find /work/demo"]);
    }
}
