//! Bridge between a chat front end and Claude Code sessions running in tmux.
//!
//! Claude Code appends every turn to a JSONL transcript. The bridge reads
//! those transcripts to tell when the assistant is blocked on the human
//! ([`monitor`]) and to stream the reply to text injected into its pane
//! ([`watcher`], [`manager`]), following the session when it rotates to a new
//! transcript file.

pub mod attachment;
pub mod cli;
pub mod config;
pub mod events;
pub mod locator;
pub mod manager;
pub mod monitor;
pub mod prompt;
pub mod shell_completion;
pub mod sink;
pub mod tmux;
pub mod transcript;
pub mod watcher;

#[cfg(test)]
mod testing;
