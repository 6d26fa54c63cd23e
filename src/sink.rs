//! JSON-lines output for the command-line front end.
//!
//! Every event the bridge produces becomes one self-contained JSON object on
//! its own line, tagged by `event` and stamped with the time it was written.
//! Logs go to stderr, so stdout can be piped straight into another program.

use std::io::{self, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::events::{DetectedImage, ResponseEvent, TurnHandler, WaitingHandler, WaitingState};

#[derive(Debug, Serialize)]
struct SinkLine<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: SinkEvent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum SinkEvent<'a> {
    Waiting(&'a WaitingState),
    Response(&'a ResponseEvent),
    Ping,
    Images { images: &'a [DetectedImage] },
    Complete,
}

/// Writes events as JSON lines and reports turn completions.
pub struct ConsoleSink {
    writer: Mutex<Box<dyn Write + Send>>,
    responses: AtomicUsize,
    completions: Option<mpsc::UnboundedSender<()>>,
}

impl ConsoleSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
            responses: AtomicUsize::new(0),
            completions: None,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Also send a message on the returned channel whenever a turn completes.
    pub fn with_completions(mut self) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.completions = Some(tx);
        (self, rx)
    }

    /// Response texts written so far.
    pub fn response_count(&self) -> usize {
        self.responses.load(Ordering::SeqCst)
    }

    fn emit(&self, event: SinkEvent<'_>) -> Result<()> {
        let line = SinkLine {
            timestamp: Utc::now(),
            event,
        };
        let json = serde_json::to_string(&line).context("failed to serialize event")?;
        trace!(event = %json, "console sink");

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("console writer lock poisoned"))?;
        writeln!(writer, "{json}").context("failed to write event")?;
        writer.flush().context("failed to flush event")?;
        Ok(())
    }
}

#[async_trait]
impl WaitingHandler for ConsoleSink {
    async fn on_waiting(&self, state: WaitingState) -> Result<()> {
        self.emit(SinkEvent::Waiting(&state))
    }
}

#[async_trait]
impl TurnHandler for ConsoleSink {
    async fn on_response(&self, event: ResponseEvent) -> Result<()> {
        self.responses.fetch_add(1, Ordering::SeqCst);
        self.emit(SinkEvent::Response(&event))
    }

    async fn on_ping(&self) -> Result<()> {
        self.emit(SinkEvent::Ping)
    }

    async fn on_images(&self, images: Vec<DetectedImage>) -> Result<()> {
        self.emit(SinkEvent::Images { images: &images })
    }

    async fn on_complete(&self) -> Result<()> {
        self.emit(SinkEvent::Complete)?;
        if let Some(tx) = &self.completions {
            let _ = tx.send(());
        }
        Ok(())
    }
}
