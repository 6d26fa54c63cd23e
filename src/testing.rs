//! In-process fakes for the pane and handler seams.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::events::{DetectedImage, ResponseEvent, TurnHandler, WaitingHandler, WaitingState};
use crate::tmux::{PaneControl, PaneLookup, PaneUnavailable};

/// Pane control that answers from fixed data and records every call.
pub struct FakePanes {
    lookup: PaneLookup,
    screen: String,
    pub calls: Mutex<Vec<String>>,
}

impl FakePanes {
    pub fn showing(screen: &str) -> Self {
        Self {
            lookup: PaneLookup::Found("%1".to_string()),
            screen: screen.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn missing() -> Self {
        Self {
            lookup: PaneLookup::NotFound(PaneUnavailable::NoServer),
            screen: String::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PaneControl for FakePanes {
    fn find_pane(&self, cwd: &Path) -> PaneLookup {
        self.calls
            .lock()
            .unwrap()
            .push(format!("find {}", cwd.display()));
        self.lookup.clone()
    }

    fn capture_pane(&self, pane: &str) -> Result<String> {
        self.calls.lock().unwrap().push(format!("capture {pane}"));
        Ok(self.screen.clone())
    }

    fn send_interrupt(&self, pane: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("interrupt {pane}"));
        Ok(())
    }

    fn send_text(&self, pane: &str, text: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("send {pane} {text}"));
        Ok(())
    }
}

/// Waiting handler that keeps every state it receives.
#[derive(Default)]
pub struct RecordingWaits {
    pub states: Mutex<Vec<WaitingState>>,
    pub fail: bool,
}

impl RecordingWaits {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn states(&self) -> Vec<WaitingState> {
        self.states.lock().unwrap().clone()
    }
}

#[async_trait]
impl WaitingHandler for RecordingWaits {
    async fn on_waiting(&self, state: WaitingState) -> Result<()> {
        self.states.lock().unwrap().push(state);
        if self.fail {
            bail!("chat unreachable");
        }
        Ok(())
    }
}

/// One callback observed by [`RecordingTurns`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Response(String),
    Ping,
    Images(Vec<PathBuf>),
    Complete,
}

/// Turn handler that keeps every callback in order.
#[derive(Default)]
pub struct RecordingTurns {
    pub events: Mutex<Vec<TurnEvent>>,
}

impl RecordingTurns {
    pub fn events(&self) -> Vec<TurnEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn responses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TurnEvent::Response(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &TurnEvent) -> usize {
        self.events().iter().filter(|event| *event == wanted).count()
    }

    /// Poll until `check` holds or `limit` elapses; returns the final verdict.
    pub async fn wait_until(&self, limit: Duration, check: impl Fn(&[TurnEvent]) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            if check(&self.events()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    fn push(&self, event: TurnEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl TurnHandler for RecordingTurns {
    async fn on_response(&self, event: ResponseEvent) -> Result<()> {
        self.push(TurnEvent::Response(event.text));
        Ok(())
    }

    async fn on_ping(&self) -> Result<()> {
        self.push(TurnEvent::Ping);
        Ok(())
    }

    async fn on_images(&self, images: Vec<DetectedImage>) -> Result<()> {
        self.push(TurnEvent::Images(
            images.into_iter().map(|image| image.path).collect(),
        ));
        Ok(())
    }

    async fn on_complete(&self) -> Result<()> {
        self.push(TurnEvent::Complete);
        Ok(())
    }
}

/// Append `content` to a file, creating it if needed.
pub fn append(path: &Path, content: &str) {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
}
