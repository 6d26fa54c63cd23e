use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use claude_bridge::attachment::{AttachmentStore, FileAttachmentStore};
use claude_bridge::cli::{Cli, Command};
use claude_bridge::config::BridgeConfig;
use claude_bridge::locator::LogLocator;
use claude_bridge::manager::{AttachedSession, InjectionRequest, WatcherManager};
use claude_bridge::monitor::WaitingStateMonitor;
use claude_bridge::shell_completion;
use claude_bridge::sink::ConsoleSink;
use claude_bridge::tmux::{self, PaneControl, PaneLookup, TmuxPanes};

fn config_source_label(config_path: Option<&Path>) -> String {
    config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults, no .claude-bridge/config.toml found)".to_string())
}

fn push_kv(output: &mut String, key: &str, value: impl std::fmt::Display) {
    output.push_str(&format!("  {key:<20} {value}\n"));
}

fn path_label(path: Result<PathBuf>) -> String {
    match path {
        Ok(path) => path.display().to_string(),
        Err(e) => format!("(unavailable: {e})"),
    }
}

fn render_config_human(config: &BridgeConfig, config_path: Option<&Path>) -> String {
    let mut output = String::new();
    output.push_str("Transcripts\n");
    push_kv(&mut output, "root", path_label(config.transcript_root()));
    output.push('\n');

    output.push_str("Monitor\n");
    push_kv(&mut output, "debounce", format!("{}ms", config.monitor.debounce_millis));
    output.push('\n');

    output.push_str("Watcher\n");
    push_kv(&mut output, "ping_after", format!("{}s", config.watcher.ping_after_secs));
    push_kv(
        &mut output,
        "completion_grace",
        format!("{}ms", config.watcher.completion_grace_millis),
    );
    push_kv(
        &mut output,
        "fallback_poll",
        format!("{}ms", config.watcher.fallback_poll_millis),
    );
    output.push('\n');

    output.push_str("Rotation\n");
    push_kv(&mut output, "poll_interval", format!("{}s", config.rotation.poll_interval_secs));
    push_kv(&mut output, "poll_deadline", format!("{}s", config.rotation.poll_deadline_secs));
    output.push('\n');

    output.push_str("Interrupt\n");
    push_kv(&mut output, "settle", format!("{}ms", config.interrupt.settle_millis));
    output.push('\n');

    output.push_str("Attachment\n");
    push_kv(&mut output, "state_file", path_label(config.attachment_path()));
    output.push('\n');

    output.push_str("Source Path\n");
    push_kv(&mut output, "path", config_source_label(config_path));

    output
}

fn render_config_json(config: &BridgeConfig, config_path: Option<&Path>) -> Result<String> {
    let payload = serde_json::json!({
        "transcripts": {
            "root": path_label(config.transcript_root())
        },
        "monitor": {
            "debounce_millis": config.monitor.debounce_millis
        },
        "watcher": {
            "ping_after_secs": config.watcher.ping_after_secs,
            "completion_grace_millis": config.watcher.completion_grace_millis,
            "fallback_poll_millis": config.watcher.fallback_poll_millis
        },
        "rotation": {
            "poll_interval_secs": config.rotation.poll_interval_secs,
            "poll_deadline_secs": config.rotation.poll_deadline_secs
        },
        "interrupt": {
            "settle_millis": config.interrupt.settle_millis
        },
        "attachment": {
            "state_file": path_label(config.attachment_path())
        },
        "source_path": config_source_label(config_path)
    });

    serde_json::to_string_pretty(&payload).context("failed to serialize config to JSON")
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted; shutting down");
            token.cancel();
        }
    });
}

async fn run_monitor(config: &BridgeConfig) -> Result<()> {
    let root = config.transcript_root()?;
    if let Err(e) = tmux::check_tmux() {
        warn!(error = %e, "selection menus cannot be detected without tmux");
    }

    let monitor = WaitingStateMonitor::new(
        root,
        config.monitor_settings(),
        Arc::new(TmuxPanes),
        Arc::new(ConsoleSink::stdout()),
    );
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());
    monitor.run(shutdown).await
}

async fn run_locate(config: &BridgeConfig, cwd: &Path) -> Result<()> {
    let locator = LogLocator::new(config.transcript_root()?);
    let Some(baseline) = locator.snapshot_baseline(cwd).await else {
        bail!(
            "no Claude Code transcript for {} under {}",
            cwd.display(),
            locator.project_dir(cwd).display()
        );
    };

    let mut output = String::new();
    push_kv(&mut output, "session", &baseline.session_id);
    push_kv(&mut output, "file", baseline.file_path.display());
    push_kv(&mut output, "size", format!("{} bytes", baseline.byte_offset));
    print!("{output}");
    Ok(())
}

async fn run_send(
    config: &BridgeConfig,
    cwd: &Path,
    text: &str,
    chat_id: i64,
    interrupt: bool,
) -> Result<()> {
    tmux::check_tmux()?;

    let store = Arc::new(FileAttachmentStore::new(config.attachment_path()?));
    let attached = AttachedSession {
        cwd: cwd.to_path_buf(),
        session_id: store
            .load()
            .filter(|attachment| attachment.cwd == cwd)
            .map(|attachment| attachment.session_id),
    };
    let manager = WatcherManager::new(
        LogLocator::new(config.transcript_root()?),
        store,
        config.manager_settings(),
    );
    let panes: Arc<dyn PaneControl> = Arc::new(TmuxPanes);

    let baseline = if interrupt {
        manager.interrupt_and_rebaseline(cwd, Arc::clone(&panes)).await?
    } else {
        manager.snapshot_baseline(cwd).await
    };

    let pane = match panes.find_pane(cwd) {
        PaneLookup::Found(pane) => pane,
        PaneLookup::NotFound(reason) => bail!("cannot send to {}: {reason}", cwd.display()),
    };
    panes.send_text(&pane, text)?;
    info!(pane = %pane, chat_id, "text sent");

    let (sink, completions) = ConsoleSink::stdout().with_completions();
    let sink = Arc::new(sink);
    let started = manager
        .start_injection_watcher(InjectionRequest {
            attached,
            chat_id,
            handler: sink.clone(),
            pre_baseline: baseline,
        })
        .await?;
    if started.is_none() {
        bail!(
            "no Claude Code transcript for {} under {}",
            cwd.display(),
            manager.locator().root().display()
        );
    }

    wait_for_turn(&manager, &sink, completions).await;
    Ok(())
}

/// Wait until the turn completes. A turn that ends without output is
/// followed to its rotated transcript, which completes it a second time.
async fn wait_for_turn(
    manager: &WatcherManager,
    sink: &ConsoleSink,
    mut completions: mpsc::UnboundedReceiver<()>,
) {
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    for round in 0..2 {
        tokio::select! {
            _ = shutdown.cancelled() => {
                manager.stop_and_flush().await;
                return;
            }
            received = completions.recv() => {
                if received.is_none() || sink.response_count() > 0 {
                    return;
                }
                if round == 0 {
                    info!("turn ended without output; waiting for a rotated session");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let is_quiet_command = matches!(
        &cli.command,
        Command::Config { .. } | Command::Completions { .. } | Command::Locate { .. }
    );

    let filter = match cli.verbose {
        0 if is_quiet_command => "claude_bridge=warn",
        0 => "claude_bridge=info",
        1 => "claude_bridge=debug",
        _ => "claude_bridge=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cwd = std::env::current_dir().context("failed to get current directory (was it deleted?)")?;
    let (config, config_path) = BridgeConfig::load(&cwd)?;

    if !is_quiet_command || cli.verbose > 0 {
        match config_path {
            Some(ref p) => info!("loaded config from {}", p.display()),
            None => info!("no .claude-bridge/config.toml found, using defaults"),
        }
    }

    match cli.command {
        Command::Monitor => run_monitor(&config).await?,
        Command::Send {
            text,
            cwd: target,
            chat_id,
            interrupt,
        } => {
            let target = resolve_dir(&cwd, target)?;
            run_send(&config, &target, &text, chat_id, interrupt).await?;
        }
        Command::Locate { cwd: target } => {
            let target = resolve_dir(&cwd, target)?;
            run_locate(&config, &target).await?;
        }
        Command::Config { json } => {
            if json {
                println!("{}", render_config_json(&config, config_path.as_deref())?);
            } else {
                print!("{}", render_config_human(&config, config_path.as_deref()));
            }
        }
        Command::Completions { shell } => shell_completion::print(shell)?,
    }

    Ok(())
}

/// The session directory as Claude Code records it: absolute, symlinks resolved.
fn resolve_dir(cwd: &Path, target: Option<PathBuf>) -> Result<PathBuf> {
    let dir = target.map(|t| cwd.join(t)).unwrap_or_else(|| cwd.to_path_buf());
    std::fs::canonicalize(&dir).with_context(|| format!("cannot resolve {}", dir.display()))
}
