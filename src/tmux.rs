//! tmux pane access for the bridge.
//!
//! Wraps the tmux CLI for the three things the bridge needs from the
//! terminal: finding the pane a Claude Code session runs in (by working
//! directory), capturing what it currently shows, and injecting input.
//! Callers depend on the [`PaneControl`] trait so the monitor and manager can
//! run without a tmux server.

use std::path::Path;
use std::process::{Command, Output};

use anyhow::{Context, Result, bail};
use thiserror::Error;
use tracing::debug;

/// Commands a Claude Code pane reports as its foreground process.
const CLAUDE_COMMANDS: &[&str] = &["claude", "node"];

/// Why a pane could not be used. None of these are errors for the bridge:
/// they mean "cannot classify" or "cannot inject" and are reported as such.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaneUnavailable {
    #[error("no tmux server is running")]
    NoServer,
    #[error("no tmux pane is running in {0}")]
    NoMatch(String),
    #[error("{count} tmux panes are running in {cwd}; cannot tell which one is Claude")]
    Ambiguous { cwd: String, count: usize },
    #[error("tmux query failed: {0}")]
    Failed(String),
}

/// Result of looking up the pane for a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneLookup {
    Found(String),
    NotFound(PaneUnavailable),
}

/// Terminal pane capability consumed by the monitor and the manager.
pub trait PaneControl: Send + Sync {
    /// Locate the pane running the assistant for `cwd`.
    fn find_pane(&self, cwd: &Path) -> PaneLookup;

    /// Text currently visible in the pane.
    fn capture_pane(&self, pane: &str) -> Result<String>;

    /// Interrupt the assistant's current turn.
    fn send_interrupt(&self, pane: &str) -> Result<()>;

    /// Type `text` into the pane and submit it.
    fn send_text(&self, pane: &str, text: &str) -> Result<()>;
}

/// Metadata for a tmux pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneDetails {
    pub id: String,
    pub current_path: String,
    pub command: String,
}

/// [`PaneControl`] backed by the tmux CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TmuxPanes;

impl PaneControl for TmuxPanes {
    fn find_pane(&self, cwd: &Path) -> PaneLookup {
        match list_all_panes() {
            Ok(panes) => select_pane(&panes, cwd),
            Err(reason) => PaneLookup::NotFound(reason),
        }
    }

    fn capture_pane(&self, pane: &str) -> Result<String> {
        capture_pane(pane)
    }

    fn send_interrupt(&self, pane: &str) -> Result<()> {
        send_key(pane, "Escape")
    }

    fn send_text(&self, pane: &str, text: &str) -> Result<()> {
        send_keys(pane, text, true)
    }
}

/// Check that tmux is installed and reachable.
pub fn check_tmux() -> Result<String> {
    let output = Command::new("tmux").arg("-V").output().context(
        "tmux not found; install tmux (e.g., `apt install tmux` or `brew install tmux`)",
    )?;

    if !output.status.success() {
        bail!(
            "tmux -V failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    debug!(version = %version, "tmux found");
    Ok(version)
}

fn run_tmux<I, S>(args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Command::new("tmux")
        .args(args)
        .output()
        .context("failed to run tmux command")
}

/// List every pane on the server with its working directory and command.
pub fn list_all_panes() -> std::result::Result<Vec<PaneDetails>, PaneUnavailable> {
    let output = run_tmux([
        "list-panes",
        "-a",
        "-F",
        "#{pane_id}\t#{pane_current_path}\t#{pane_current_command}",
    ])
    .map_err(|e| PaneUnavailable::Failed(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stderr.contains("no server running") || stderr.contains("error connecting") {
            return Err(PaneUnavailable::NoServer);
        }
        return Err(PaneUnavailable::Failed(stderr.trim().to_string()));
    }

    Ok(parse_pane_listing(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_pane_listing(stdout: &str) -> Vec<PaneDetails> {
    let mut panes = Vec::new();
    for line in stdout.lines() {
        let mut parts = line.split('\t');
        let Some(id) = parts.next() else { continue };
        let Some(current_path) = parts.next() else {
            continue;
        };
        let Some(command) = parts.next() else {
            continue;
        };
        panes.push(PaneDetails {
            id: id.to_string(),
            current_path: current_path.to_string(),
            command: command.to_string(),
        });
    }
    panes
}

/// Pick the pane for `cwd` out of a server-wide listing.
///
/// Several panes in one directory are narrowed to those running Claude;
/// if that still leaves more than one the lookup is ambiguous.
pub fn select_pane(panes: &[PaneDetails], cwd: &Path) -> PaneLookup {
    let wanted = cwd.to_string_lossy();
    let wanted = wanted.trim_end_matches('/');
    let in_dir: Vec<&PaneDetails> = panes
        .iter()
        .filter(|p| p.current_path.trim_end_matches('/') == wanted)
        .collect();

    match in_dir.as_slice() {
        [] => PaneLookup::NotFound(PaneUnavailable::NoMatch(wanted.to_string())),
        [only] => PaneLookup::Found(only.id.clone()),
        many => {
            let claude: Vec<&&PaneDetails> = many
                .iter()
                .filter(|p| CLAUDE_COMMANDS.contains(&p.command.as_str()))
                .collect();
            match claude.as_slice() {
                [only] => PaneLookup::Found(only.id.clone()),
                _ => PaneLookup::NotFound(PaneUnavailable::Ambiguous {
                    cwd: wanted.to_string(),
                    count: many.len(),
                }),
            }
        }
    }
}

/// Send keys to a tmux target.
///
/// The `keys` string is sent literally, followed by Enter if `press_enter` is true.
pub fn send_keys(target: &str, keys: &str, press_enter: bool) -> Result<()> {
    if !keys.is_empty() {
        // `-l` sends text literally so punctuation/symbols are not interpreted as
        // tmux key names.
        let output = run_tmux(["send-keys", "-t", target, "-l", "--", keys])
            .with_context(|| format!("failed to send keys to target '{target}'"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tmux send-keys failed: {stderr}");
        }
    }

    if press_enter {
        // Enter goes as a separate action so the text is always submitted.
        send_key(target, "C-m")?;
    }

    debug!(target = target, len = keys.len(), "sent keys");
    Ok(())
}

/// Send a single named key (for example `Escape` or `C-m`).
pub fn send_key(target: &str, key: &str) -> Result<()> {
    let output = run_tmux(["send-keys", "-t", target, key])
        .with_context(|| format!("failed to send {key} to target '{target}'"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("tmux send-keys {key} failed: {stderr}");
    }
    Ok(())
}

/// Capture the current visible content of a tmux pane.
pub fn capture_pane(target: &str) -> Result<String> {
    let output = run_tmux(["capture-pane", "-t", target, "-p"])
        .with_context(|| format!("failed to capture pane for target '{target}'"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("tmux capture-pane failed: {stderr}");
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
