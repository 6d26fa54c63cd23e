use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::manager::ManagerSettings;
use crate::monitor::MonitorSettings;
use crate::watcher::WatcherSettings;

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = ".claude-bridge";

/// Overrides `[transcripts] root`.
pub const TRANSCRIPT_ROOT_ENV: &str = "CLAUDE_BRIDGE_TRANSCRIPT_ROOT";

#[derive(Debug, Default, Deserialize)]
pub struct TranscriptsConfig {
    /// Defaults to `~/.claude/projects`.
    #[serde(default)]
    pub root: Option<String>,
}

fn default_debounce_millis() -> u64 {
    3000
}

fn default_ping_after_secs() -> u64 {
    60
}

fn default_completion_grace_millis() -> u64 {
    1500
}

fn default_fallback_poll_millis() -> u64 {
    2000
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_poll_deadline_secs() -> u64 {
    60
}

fn default_settle_millis() -> u64 {
    1000
}

#[derive(Debug, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_debounce_millis")]
    pub debounce_millis: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce_millis: default_debounce_millis(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_ping_after_secs")]
    pub ping_after_secs: u64,
    #[serde(default = "default_completion_grace_millis")]
    pub completion_grace_millis: u64,
    #[serde(default = "default_fallback_poll_millis")]
    pub fallback_poll_millis: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            ping_after_secs: default_ping_after_secs(),
            completion_grace_millis: default_completion_grace_millis(),
            fallback_poll_millis: default_fallback_poll_millis(),
        }
    }
}

/// Recovery poll after a turn ends without output.
#[derive(Debug, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_deadline_secs")]
    pub poll_deadline_secs: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            poll_deadline_secs: default_poll_deadline_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InterruptConfig {
    #[serde(default = "default_settle_millis")]
    pub settle_millis: u64,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            settle_millis: default_settle_millis(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AttachmentConfig {
    /// Defaults to `~/.claude-bridge/attachment.json`.
    #[serde(default)]
    pub state_file: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub transcripts: TranscriptsConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub interrupt: InterruptConfig,
    #[serde(default)]
    pub attachment: AttachmentConfig,
}

impl BridgeConfig {
    /// Search upward from `start` for a `.claude-bridge/config.toml` file and
    /// load it. Returns the default config if no file is found.
    pub fn load(start: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = Self::find_config_file(start) {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config: BridgeConfig = toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            config
                .validate()
                .with_context(|| format!("invalid config in {}", path.display()))?;
            Ok((config, Some(path)))
        } else {
            Ok((BridgeConfig::default(), None))
        }
    }

    /// Reject values that would stall or spin the watchers.
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("watcher.fallback_poll_millis", self.watcher.fallback_poll_millis),
            ("rotation.poll_interval_secs", self.rotation.poll_interval_secs),
            ("rotation.poll_deadline_secs", self.rotation.poll_deadline_secs),
        ];
        for (key, value) in intervals {
            if value == 0 {
                bail!("{key} must be greater than zero");
            }
        }
        Ok(())
    }

    fn find_config_file(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILENAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Directory holding one subdirectory of transcripts per project.
    pub fn transcript_root(&self) -> Result<PathBuf> {
        if let Some(root) = std::env::var(TRANSCRIPT_ROOT_ENV).ok().filter(|r| !r.is_empty()) {
            return expand_home(&root);
        }
        match &self.transcripts.root {
            Some(root) => expand_home(root),
            None => Ok(home_dir()?.join(".claude").join("projects")),
        }
    }

    pub fn attachment_path(&self) -> Result<PathBuf> {
        match &self.attachment.state_file {
            Some(path) => expand_home(path),
            None => Ok(home_dir()?.join(CONFIG_DIR).join("attachment.json")),
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            debounce: Duration::from_millis(self.monitor.debounce_millis),
        }
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            watcher: WatcherSettings {
                fallback_poll: Duration::from_millis(self.watcher.fallback_poll_millis),
                completion_grace: Duration::from_millis(self.watcher.completion_grace_millis),
                ping_after: Duration::from_secs(self.watcher.ping_after_secs),
            },
            rotation_poll_interval: Duration::from_secs(self.rotation.poll_interval_secs),
            rotation_poll_deadline: Duration::from_secs(self.rotation.poll_deadline_secs),
            interrupt_settle: Duration::from_millis(self.interrupt.settle_millis),
        }
    }
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("cannot determine the home directory")
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => Ok(home_dir()?.join(rest)),
        None if path == "~" => home_dir(),
        None => Ok(PathBuf::from(path)),
    }
}
