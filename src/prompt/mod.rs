//! Waiting-state classification for assistant output.
//!
//! Claude Code blocks for human input in three shapes: a yes/no question, a
//! "press enter" pause, and a numbered selection menu rendered in its TUI.
//! The first two are recognizable from the assistant's own text. Menus only
//! exist on screen, so they are parsed from a pane capture after ANSI
//! stripping.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Number of trailing non-empty lines a question is expected to sit in.
const QUESTION_TAIL_LINES: usize = 5;

/// Options of the plan-approval menu shown after `ExitPlanMode`.
pub const PLAN_APPROVAL_CHOICES: [&str; 4] = [
    "Yes, clear context and auto-accept edits",
    "Yes, and auto-accept edits",
    "Yes, and manually approve edits",
    "No, keep planning",
];

/// Shape of input the assistant is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitingKind {
    YesNo,
    Enter,
    MultipleChoice,
}

/// Compiled waiting-state patterns.
pub struct WaitingPatterns {
    patterns: Vec<(Regex, WaitingKind)>,
}

impl WaitingPatterns {
    /// Patterns for phrasing Claude Code uses when it stops to ask.
    pub fn claude_code() -> Self {
        Self {
            patterns: vec![
                // "(y/n)", "[y/N]", "(yes/no)"
                (
                    Regex::new(r"(?i)[(\[]\s*(?:y\s*/\s*n|yes\s*/\s*no)\s*[)\]]").unwrap(),
                    WaitingKind::YesNo,
                ),
                // "... yes or no?"
                (Regex::new(r"(?i)\byes\s+or\s+no\b").unwrap(), WaitingKind::YesNo),
                // "Press Enter to continue", "hit return when ready"
                (
                    Regex::new(r"(?i)\b(?:press|hit)\s+(?:the\s+)?(?:enter|return)\b").unwrap(),
                    WaitingKind::Enter,
                ),
            ],
        }
    }

    /// Classify the tail of an assistant message. Only the last few non-empty
    /// lines are considered, where a blocking question sits.
    pub fn classify(&self, text: &str) -> Option<WaitingKind> {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(QUESTION_TAIL_LINES);
        let tail = lines[start..].join("\n");
        self.patterns
            .iter()
            .find(|(regex, _)| regex.is_match(&tail))
            .map(|(_, kind)| *kind)
    }
}

static CLAUDE_PATTERNS: LazyLock<WaitingPatterns> = LazyLock::new(WaitingPatterns::claude_code);

/// Classify assistant text as a yes/no or enter prompt.
///
/// Multiple-choice menus are not recognizable from text; see
/// [`parse_multiple_choices`].
pub fn classify_waiting_type(text: &str) -> Option<WaitingKind> {
    CLAUDE_PATTERNS.classify(text)
}

/// Marker Claude Code prints in front of each block of assistant output.
const OUTPUT_MARKER: char = '⏺';

/// Extract a numbered option menu from a pane capture.
///
/// Only the screen below the last assistant output marker is searched, and a
/// run counts as a menu only if one of its options carries the selection
/// cursor. Numbered prose in the assistant's reply is therefore never a menu.
///
/// Returns the labels of the last run of numbered lines that counts up from
/// 1 without gaps and has at least two entries. Unnumbered lines (wrapped
/// descriptions, borders) between options are ignored; a number out of
/// sequence invalidates the run it interrupts.
pub fn parse_multiple_choices(capture: &str) -> Option<Vec<String>> {
    static OPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*(?:[│|]\s*)?([❯›>]\s*)?(\d{1,2})[.)]\s+(\S.*?)\s*[│|]?\s*$").unwrap()
    });

    let clean = strip_ansi(capture);
    let screen = match clean.rfind(OUTPUT_MARKER) {
        Some(at) => clean[at..].split_once('\n').map_or("", |(_, rest)| rest),
        None => clean.as_str(),
    };

    let mut best: Option<Vec<String>> = None;
    let mut current: Option<MenuRun> = None;

    for line in screen.lines() {
        let Some(caps) = OPTION_RE.captures(line) else {
            continue;
        };
        let Ok(number) = caps[2].parse::<usize>() else {
            continue;
        };
        let selected = caps.get(1).is_some();
        let label = caps[3].to_string();

        match current.as_mut() {
            Some(run) if number == run.labels.len() + 1 => {
                run.labels.push(label);
                run.selected |= selected;
            }
            _ => {
                finish(current.take(), &mut best);
                if number == 1 {
                    current = Some(MenuRun {
                        labels: vec![label],
                        selected,
                    });
                }
            }
        }
    }
    finish(current, &mut best);

    best
}

struct MenuRun {
    labels: Vec<String>,
    selected: bool,
}

fn finish(run: Option<MenuRun>, best: &mut Option<Vec<String>>) {
    if let Some(run) = run.filter(|run| run.selected && run.labels.len() >= 2) {
        *best = Some(run.labels);
    }
}

/// Strip ANSI escape sequences from pane output.
pub fn strip_ansi(input: &str) -> String {
    // Matches CSI sequences (ESC [ ... final byte), OSC sequences (ESC ] ... ST),
    // and simple two-byte escapes (ESC + one char).
    static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[^\[\]]").unwrap()
    });
    ANSI_RE.replace_all(input, "").to_string()
}
