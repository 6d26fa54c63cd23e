//! Events the bridge produces for the chat layer, and the handler traits
//! that receive them.
//!
//! Handlers are async and fallible. The bridge never propagates a handler
//! error: it logs it with context and keeps watching.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::prompt::WaitingKind;

/// The assistant is blocked waiting for human input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitingState {
    pub session_id: String,
    pub project_name: String,
    pub cwd: String,
    pub file_path: PathBuf,
    pub kind: WaitingKind,
    pub prompt_text: String,
    /// Option labels, only for [`WaitingKind::MultipleChoice`].
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

/// One text block delivered from the assistant's current turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseEvent {
    pub session_id: String,
    pub project_name: String,
    pub cwd: String,
    pub file_path: PathBuf,
    pub text: String,
}

/// An image the assistant wrote during the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedImage {
    pub path: PathBuf,
    pub media_type: String,
    pub data_base64: String,
}

/// Receives waiting-state notifications from the monitor.
#[async_trait]
pub trait WaitingHandler: Send + Sync {
    async fn on_waiting(&self, state: WaitingState) -> Result<()>;
}

/// Receives the output of one injected turn.
#[async_trait]
pub trait TurnHandler: Send + Sync {
    async fn on_response(&self, event: ResponseEvent) -> Result<()>;

    /// The turn is taking long and nothing has been delivered yet.
    async fn on_ping(&self) -> Result<()> {
        Ok(())
    }

    async fn on_images(&self, _images: Vec<DetectedImage>) -> Result<()> {
        Ok(())
    }

    /// The turn ended (or was superseded by a newer one).
    async fn on_complete(&self) -> Result<()> {
        Ok(())
    }
}

/// Log a handler failure without interrupting the caller.
pub(crate) fn log_handler_error(callback: &'static str, result: Result<()>) {
    if let Err(e) = result {
        warn!(callback, error = %format!("{e:#}"), "handler failed; continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::WaitingKind;

    #[test]
    fn waiting_state_serializes_kind_in_screaming_case() {
        let state = WaitingState {
            session_id: "s1".into(),
            project_name: "demo".into(),
            cwd: "/work/demo".into(),
            file_path: PathBuf::from("/p/s1.jsonl"),
            kind: WaitingKind::YesNo,
            prompt_text: "Delete? (y/n)".into(),
            choices: vec![],
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["kind"], "YES_NO");
        assert!(value.get("choices").is_none());
    }

    #[test]
    fn multiple_choice_keeps_choices() {
        let state = WaitingState {
            session_id: "s1".into(),
            project_name: "demo".into(),
            cwd: "/work/demo".into(),
            file_path: PathBuf::from("/p/s1.jsonl"),
            kind: WaitingKind::MultipleChoice,
            prompt_text: "Pick".into(),
            choices: vec!["A".into(), "B".into()],
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["kind"], "MULTIPLE_CHOICE");
        assert_eq!(value["choices"][1], "B");
    }
}
