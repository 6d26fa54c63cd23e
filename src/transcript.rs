//! Transcript entry extraction from Claude Code JSONL logs.
//!
//! Each line of a transcript is a self-contained JSON record discriminated by
//! its `type` field. Only the parts the bridge acts on are modelled: assistant
//! text blocks, tool invocations, and the turn-completion markers. Anything
//! else deserializes to [`TranscriptEntry::Metadata`]; lines that are not valid
//! JSON (including a trailing line the writer has not finished yet) are
//! dropped.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

/// File extension used by transcript logs.
pub const TRANSCRIPT_EXTENSION: &str = "jsonl";

/// Tool name Claude Code uses when presenting a plan for approval.
pub const EXIT_PLAN_MODE_TOOL: &str = "ExitPlanMode";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// One line of a transcript.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TranscriptEntry {
    Assistant(ConversationEntry),
    User(ConversationEntry),
    /// Explicit turn-completion marker.
    Result(MarkerEntry),
    System(MarkerEntry),
    /// History snapshots, summaries and every other non-conversational record.
    #[serde(other)]
    Metadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub content: MessageContent,
}

/// `message.content` is either plain text (user prompts) or a block list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Blocks(Vec::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

/// `result` and `system` records. Only the subtype matters here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerEntry {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl ConversationEntry {
    fn blocks(&self) -> &[ContentBlock] {
        match self.message.as_ref().map(|m| &m.content) {
            Some(MessageContent::Blocks(blocks)) => blocks.as_slice(),
            _ => &[],
        }
    }

    /// Non-empty text blocks, in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.blocks().iter().filter_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        })
    }

    /// Tool invocations as `(name, input)` pairs, in order.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.blocks().iter().filter_map(|block| match block {
            ContentBlock::ToolUse { name, input } => Some((name.as_str(), input)),
            _ => None,
        })
    }

    /// Last non-empty text block of this entry.
    pub fn last_text(&self) -> Option<&str> {
        self.texts().last()
    }

    pub fn tool_use(&self, tool: &str) -> Option<&Value> {
        self.tool_uses()
            .find(|(name, _)| *name == tool)
            .map(|(_, input)| input)
    }
}

impl TranscriptEntry {
    pub fn as_assistant(&self) -> Option<&ConversationEntry> {
        match self {
            TranscriptEntry::Assistant(entry) => Some(entry),
            _ => None,
        }
    }

    /// An assistant record with at least one text or tool-use block.
    pub fn is_conversational(&self) -> bool {
        self.as_assistant()
            .is_some_and(|entry| entry.texts().next().is_some() || entry.tool_uses().next().is_some())
    }

    /// Whether this record marks the end of the assistant's turn.
    pub fn is_turn_complete(&self) -> bool {
        match self {
            TranscriptEntry::Result(_) => true,
            TranscriptEntry::System(marker) => marker.subtype.as_deref() == Some("turn_duration"),
            _ => false,
        }
    }

    pub fn cwd(&self) -> Option<&str> {
        match self {
            TranscriptEntry::Assistant(entry) | TranscriptEntry::User(entry) => entry.cwd.as_deref(),
            TranscriptEntry::Result(marker) | TranscriptEntry::System(marker) => marker.cwd.as_deref(),
            TranscriptEntry::Metadata => None,
        }
    }
}

/// Parse every well-formed line of `text`. Malformed lines are skipped.
pub fn parse_entries(text: &str) -> Vec<TranscriptEntry> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<TranscriptEntry>(trimmed) {
            Ok(entry) => entries.push(entry),
            Err(e) => trace!(error = %e, "skipping malformed transcript line"),
        }
    }
    entries
}

/// Most recent non-empty assistant text among `entries`.
pub fn last_assistant_text(entries: &[TranscriptEntry]) -> Option<&str> {
    entries
        .iter()
        .rev()
        .filter_map(TranscriptEntry::as_assistant)
        .find_map(ConversationEntry::last_text)
}

/// Most recent assistant record with conversational content.
pub fn latest_assistant(entries: &[TranscriptEntry]) -> Option<&ConversationEntry> {
    entries
        .iter()
        .rev()
        .filter(|entry| entry.is_conversational())
        .find_map(TranscriptEntry::as_assistant)
}

/// Most recent working directory recorded in `entries`.
pub fn latest_cwd(entries: &[TranscriptEntry]) -> Option<&str> {
    entries.iter().rev().find_map(TranscriptEntry::cwd)
}

pub fn contains_turn_complete(entries: &[TranscriptEntry]) -> bool {
    entries.iter().any(TranscriptEntry::is_turn_complete)
}

/// Paths written by `Write` tool calls that look like images.
pub fn image_writes(entries: &[TranscriptEntry]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for entry in entries.iter().filter_map(TranscriptEntry::as_assistant) {
        for (name, input) in entry.tool_uses() {
            if name != "Write" {
                continue;
            }
            let Some(file_path) = input.get("file_path").and_then(Value::as_str) else {
                continue;
            };
            let path = PathBuf::from(file_path);
            if is_image_path(&path) && !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// MIME type for an image path, by extension.
pub fn image_media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Decode the bytes of a transcript appended after `offset`.
///
/// Offsets beyond EOF are clamped (the file was truncated or replaced).
pub fn slice_after(bytes: &[u8], offset: u64) -> String {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

/// Read a transcript and return the entries appended after `offset`.
pub async fn read_entries_after(path: &Path, offset: u64) -> std::io::Result<Vec<TranscriptEntry>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(parse_entries(&slice_after(&bytes, offset)))
}

/// A transcript file and the session id derived from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFile {
    pub path: PathBuf,
    pub session_id: String,
}

impl TranscriptFile {
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let session_id = session_id_for(&path)?;
        Some(Self { path, session_id })
    }
}

/// Session id of a transcript path (its file stem).
pub fn session_id_for(path: &Path) -> Option<String> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(TRANSCRIPT_EXTENSION) {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

/// Final path component of a working directory, used as a display name.
pub fn project_name(cwd: &str) -> String {
    Path::new(cwd)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| cwd.to_string())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_assistant_text_blocks() {
        let entries = parse_entries(&assistant_text("Build succeeded."));
        assert_eq!(entries.len(), 1);
        assert_eq!(last_assistant_text(&entries), Some("Build succeeded."));
        assert!(entries[0].is_conversational());
    }

    #[test]
    fn malformed_and_partial_lines_are_skipped() {
        let mut text = String::from("not json at all\n");
        text.push_str(&assistant_text("kept"));
        text.push_str(r#"{"type": "assistant", "message": {"content": [{"type": "te"#);
        let entries = parse_entries(&text);
        assert_eq!(entries.len(), 1);
        assert_eq!(last_assistant_text(&entries), Some("kept"));
    }

    #[test]
    fn unknown_record_types_are_metadata() {
        let entries = parse_entries(&snapshot());
        assert!(matches!(entries[0], TranscriptEntry::Metadata));
        assert!(!entries[0].is_conversational());
        assert!(last_assistant_text(&entries).is_none());
    }

    #[test]
    fn user_string_content_is_not_assistant_text() {
        let entries = parse_entries(&user_text("please fix it"));
        assert!(matches!(entries[0], TranscriptEntry::User(_)));
        assert!(last_assistant_text(&entries).is_none());
    }

    #[test]
    fn last_text_skips_whitespace_blocks() {
        let mut text = assistant_text("first");
        text.push_str(&assistant_text("   "));
        let entries = parse_entries(&text);
        assert_eq!(last_assistant_text(&entries), Some("first"));
    }

    #[test]
    fn tool_only_entry_is_conversational() {
        let entries = parse_entries(&assistant_tool("Bash", json!({"command": "ls"})));
        assert!(entries[0].is_conversational());
        assert!(last_assistant_text(&entries).is_none());
    }

    #[test]
    fn result_and_turn_duration_mark_completion() {
        let mut text = result();
        text.push_str(&json!({"type": "system", "subtype": "turn_duration"}).to_string());
        text.push('\n');
        text.push_str(&json!({"type": "system", "subtype": "informational"}).to_string());
        let entries = parse_entries(&text);
        let flags: Vec<bool> = entries.iter().map(TranscriptEntry::is_turn_complete).collect();
        assert_eq!(flags, vec![true, true, false]);
    }

    #[test]
    fn image_writes_collects_image_paths_once() {
        let mut text = assistant_tool("Write", json!({"file_path": "/tmp/chart.PNG", "content": ""}));
        text.push_str(&assistant_tool("Write", json!({"file_path": "/tmp/chart.PNG"})));
        text.push_str(&assistant_tool("Write", json!({"file_path": "/tmp/notes.md"})));
        text.push_str(&assistant_tool("Read", json!({"file_path": "/tmp/other.png"})));
        let entries = parse_entries(&text);
        assert_eq!(image_writes(&entries), vec![PathBuf::from("/tmp/chart.PNG")]);
    }

    #[test]
    fn media_types_by_extension() {
        assert_eq!(image_media_type(Path::new("a.png")), "image/png");
        assert_eq!(image_media_type(Path::new("a.JPEG")), "image/jpeg");
        assert_eq!(image_media_type(Path::new("a.webp")), "image/webp");
    }

    #[test]
    fn slice_after_clamps_offsets_past_eof() {
        assert_eq!(slice_after(b"abcdef", 4), "ef");
        assert_eq!(slice_after(b"abc", 10), "");
    }

    #[test]
    fn session_id_is_file_stem_of_jsonl() {
        assert_eq!(
            session_id_for(Path::new("/p/-work-demo/abc-123.jsonl")).as_deref(),
            Some("abc-123")
        );
        assert!(session_id_for(Path::new("/p/-work-demo/notes.txt")).is_none());
    }

    #[test]
    fn project_name_is_last_component() {
        assert_eq!(project_name("/home/me/code/demo"), "demo");
        assert_eq!(project_name("/"), "/");
    }

    #[test]
    fn latest_cwd_prefers_newest_record() {
        let mut text = assistant_text_in("a", "/one");
        text.push_str(&assistant_text_in("b", "/two"));
        let entries = parse_entries(&text);
        assert_eq!(latest_cwd(&entries), Some("/two"));
    }
}
