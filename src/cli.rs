use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "claude-bridge",
    about = "Relay Claude Code sessions running in tmux to a chat",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch every transcript and print waiting states until Ctrl-C
    Monitor,

    /// Send text to the Claude Code pane for a directory and stream the reply
    Send {
        /// Text to type into the pane
        text: String,

        /// Working directory of the session (defaults to the current one)
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Chat identifier recorded in logs
        #[arg(long, default_value = "0")]
        chat_id: i64,

        /// Interrupt the running turn before sending
        #[arg(long)]
        interrupt: bool,
    },

    /// Print the live transcript for a directory
    Locate {
        /// Working directory of the session (defaults to the current one)
        #[arg(long)]
        cwd: Option<PathBuf>,
    },

    /// Show effective configuration
    Config {
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        shell: CompletionShell,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
