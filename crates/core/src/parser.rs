// crates/core/src/parser.rs
//! Async JSONL parser for Claude Code transcripts.
//!
//! A transcript is parsed in a single forward pass. Each line is decoded on
//! its own, so a malformed line or content block costs only itself. Tool
//! results are correlated with the tool calls seen earlier in the same pass.

use crate::discovery::decode_project_dir;
use crate::error::ParseError;
use crate::types::*;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const WORKING_DIR_MARKER: &str = "Working directory:";
const CONTINUATION_MARKER: &str = "This session is being continued";

/// Parse a transcript file into a [`Session`].
///
/// # Errors
/// - `ParseError::NotFound` if the file doesn't exist
/// - `ParseError::PermissionDenied` if the file can't be read
/// - `ParseError::Io` for other I/O errors
///
/// Bad lines never produce an error; they are logged at debug level and skipped.
pub async fn parse_session(file_path: &Path) -> Result<Session, ParseError> {
    let file = File::open(file_path)
        .await
        .map_err(|e| ParseError::io(file_path, e))?;

    let mut segments = BufReader::new(file).split(b'\n');
    let mut builder = SessionBuilder::new(file_path);

    while let Some(raw) = segments
        .next_segment()
        .await
        .map_err(|e| ParseError::io(file_path, e))?
    {
        builder.feed_line(&String::from_utf8_lossy(&raw));
    }

    Ok(builder.finish())
}

/// Run the same pass as [`parse_session`] over bytes already in memory.
pub fn parse_bytes(file_path: &Path, bytes: &[u8]) -> Session {
    let mut builder = SessionBuilder::new(file_path);
    for raw in bytes.split(|b| *b == b'\n') {
        builder.feed_line(&String::from_utf8_lossy(raw));
    }
    builder.finish()
}

/// Incremental state of one parse pass.
pub struct SessionBuilder {
    session: Session,
    line_number: usize,
}

impl SessionBuilder {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            session: Session::new(file_path),
            line_number: 0,
        }
    }

    /// Consume one transcript line.
    pub fn feed_line(&mut self, line: &str) {
        self.line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                debug!(
                    "Skipping malformed JSON at line {} in {:?}: {}",
                    self.line_number, self.session.path, e
                );
                return;
            }
        };

        // Any entry may carry these, typed or not.
        let timestamp = value
            .get("timestamp")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(String::from);
        if self.session.start_time.is_none() {
            self.session.start_time = timestamp.clone();
        }

        if self.session.project_path.is_none() {
            if let Some(cwd) = value.get("cwd").and_then(Value::as_str).filter(|c| !c.is_empty()) {
                self.session.project_path = Some(cwd.to_string());
            }
        }

        let Some(entry_type) = value.get("type").and_then(Value::as_str) else {
            debug!("Skipping line {} with missing/non-string type field", self.line_number);
            return;
        };

        match entry_type {
            "user" => {
                self.session.message_count += 1;
                self.handle_user(&value, timestamp);
            }
            "assistant" => {
                self.session.message_count += 1;
                self.handle_assistant(&value, timestamp);
            }
            "system" => self.handle_system(&value),
            other => {
                debug!("Ignoring entry type {:?} at line {}", other, self.line_number);
            }
        }
    }

    /// Close the pass. Falls back to the containing directory name for the
    /// project path when no entry named one.
    pub fn finish(mut self) -> Session {
        if self.session.project_path.is_none() {
            self.session.project_path = self
                .session
                .path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .and_then(decode_project_dir);
        }
        self.session
    }

    fn handle_system(&mut self, value: &Value) {
        if self.session.project_path.is_some() {
            return;
        }
        let found = ["message", "content"]
            .iter()
            .filter_map(|key| value.get(*key).and_then(Value::as_str))
            .find_map(working_directory_from);
        if let Some(dir) = found {
            self.session.project_path = Some(dir);
        }
    }

    fn handle_user(&mut self, value: &Value, timestamp: Option<String>) {
        if value.get("isMeta").and_then(Value::as_bool) == Some(true) {
            debug!("Skipping meta message at line {}", self.line_number);
            return;
        }

        let content = message_content(value);
        let mut text_parts: Vec<String> = Vec::new();
        let mut result_ids: Vec<String> = Vec::new();

        match content {
            // A missing content field reads as an empty string.
            None => {}
            Some(Value::String(s)) => text_parts.push(s.clone()),
            Some(Value::Array(blocks)) => {
                for raw in blocks {
                    if let Value::String(s) = raw {
                        text_parts.push(s.clone());
                        continue;
                    }
                    match self.decode_block(raw) {
                        Some(ContentBlock::Text { text }) => text_parts.push(text),
                        Some(ContentBlock::ToolResult {
                            tool_use_id,
                            is_error,
                            content,
                        }) => {
                            self.attach_result(&tool_use_id, &content, is_error.unwrap_or(false));
                            result_ids.push(tool_use_id);
                        }
                        _ => {}
                    }
                }
            }
            Some(_) => {
                debug!("Skipping user entry with unexpected content at line {}", self.line_number);
                return;
            }
        }

        // Result-only entries attach to their invocations without a turn of
        // their own; any other empty entry (e.g. an image paste) still counts.
        let text = text_parts.join("\n").trim().to_string();
        if text.is_empty() && !result_ids.is_empty() {
            return;
        }
        if text.starts_with('<') && text.ends_with('>') {
            debug!("Skipping system-wrapper message at line {}", self.line_number);
            return;
        }

        if self.session.summary.is_none() && qualifies_as_summary(&text) {
            self.session.summary = Some(text.clone());
        }

        self.session.turns.push(ConversationTurn {
            uuid: entry_uuid(value),
            role: Role::User,
            timestamp,
            text,
            thinking: String::new(),
            is_tool_result: !result_ids.is_empty(),
            tool_ids: result_ids,
        });
    }

    fn handle_assistant(&mut self, value: &Value, timestamp: Option<String>) {
        let mut text_parts: Vec<String> = Vec::new();
        let mut thinking_parts: Vec<String> = Vec::new();
        let mut tool_ids: Vec<String> = Vec::new();

        match message_content(value) {
            Some(Value::String(s)) => text_parts.push(s.clone()),
            Some(Value::Array(blocks)) => {
                for raw in blocks {
                    match self.decode_block(raw) {
                        Some(ContentBlock::Text { text }) => text_parts.push(text),
                        Some(ContentBlock::Thinking { thinking }) => thinking_parts.push(thinking),
                        Some(ContentBlock::ToolUse { id, name, input }) => {
                            let input = match input {
                                Value::Object(map) => map,
                                _ => Map::new(),
                            };
                            tool_ids.push(id.clone());
                            self.session
                                .push_tool(ToolInvocation::new(id, name, input, timestamp.clone()));
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        let text = text_parts.join("\n").trim().to_string();
        let thinking = thinking_parts.join("\n").trim().to_string();
        if text.is_empty() && thinking.is_empty() && tool_ids.is_empty() {
            return;
        }

        self.session.turns.push(ConversationTurn {
            uuid: entry_uuid(value),
            role: Role::Assistant,
            timestamp,
            text,
            thinking,
            tool_ids,
            is_tool_result: false,
        });
    }

    fn decode_block(&self, raw: &Value) -> Option<ContentBlock> {
        match ContentBlock::deserialize(raw) {
            Ok(block) => Some(block),
            Err(e) => {
                debug!("Skipping content block at line {}: {}", self.line_number, e);
                None
            }
        }
    }

    fn attach_result(&mut self, tool_use_id: &str, content: &Value, is_error: bool) {
        let line = self.line_number;
        match self.session.invocation_mut(tool_use_id) {
            Some(tool) => {
                if !tool.record_result(tool_result_text(content), is_error) {
                    debug!("Ignoring repeated result for {} at line {}", tool_use_id, line);
                }
            }
            None => {
                debug!("Dropping result for unknown tool {} at line {}", tool_use_id, line);
            }
        }
    }
}

fn message_content(value: &Value) -> Option<&Value> {
    value.get("message").and_then(|m| m.get("content"))
}

fn entry_uuid(value: &Value) -> String {
    value
        .get("uuid")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Text after the `Working directory:` marker, up to the end of that line.
fn working_directory_from(text: &str) -> Option<String> {
    let start = text.find(WORKING_DIR_MARKER)? + WORKING_DIR_MARKER.len();
    let rest = &text[start..];
    let line = rest.split('\n').next().unwrap_or(rest).trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Flatten a tool-result payload: strings verbatim, lists by concatenating
/// their text items.
fn tool_result_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let mut out = String::new();
            for item in items {
                match item {
                    Value::String(s) => out.push_str(s),
                    Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("text") => {
                        if let Some(t) = obj.get("text").and_then(Value::as_str) {
                            out.push_str(t);
                        }
                    }
                    _ => {}
                }
            }
            out
        }
        _ => String::new(),
    }
}

/// Whether a user message reads like a real prompt rather than injected context.
pub fn qualifies_as_summary(text: &str) -> bool {
    !text.starts_with('<')
        && !text.starts_with(CONTINUATION_MARKER)
        && !text.to_lowercase().contains("context window")
        && text.chars().count() >= 5
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn parse(lines: &[&str]) -> Session {
        let joined = lines.join("\n");
        parse_bytes(Path::new("/tmp/-work-proj/sess-1.jsonl"), joined.as_bytes())
    }

    const USER_FIX: &str = r#"{"type":"user","cwd":"/proj","message":{"content":"Fix the bug in parser"}}"#;
    const ASSISTANT_READ: &str = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"/proj/a.py"}}]}}"#;
    const RESULT_T1: &str = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":[{"type":"text","text":"contents"}]}]}}"#;

    #[test]
    fn test_basic_correlation_scenario() {
        let session = parse(&[USER_FIX, ASSISTANT_READ, RESULT_T1]);
        assert_eq!(session.summary.as_deref(), Some("Fix the bug in parser"));
        assert_eq!(session.project_path.as_deref(), Some("/proj"));
        assert_eq!(session.tool_count(), 1);
        let tool = &session.tools[0];
        assert_eq!(tool.name, "Read");
        assert_eq!(tool.result_text.as_deref(), Some("contents"));
        assert_eq!(tool.error_text, None);
        assert_eq!(tool.preview, "/proj/a.py");
    }

    #[test]
    fn test_malformed_line_does_not_reduce_counts() {
        let clean = parse(&[USER_FIX, ASSISTANT_READ, RESULT_T1]);
        let dirty = parse(&[USER_FIX, "{not json", ASSISTANT_READ, "", RESULT_T1]);
        assert_eq!(clean.turn_count(), dirty.turn_count());
        assert_eq!(clean.tool_count(), dirty.tool_count());
        assert_eq!(dirty.tools[0].result_text.as_deref(), Some("contents"));
    }

    #[test]
    fn test_system_reminder_skipped() {
        let session = parse(&[
            r#"{"type":"user","message":{"content":"<system-reminder>...</system-reminder>"}}"#,
            r#"{"type":"user","message":{"content":"Real question here"}}"#,
        ]);
        assert_eq!(session.turn_count(), 1);
        assert_eq!(session.summary.as_deref(), Some("Real question here"));
        assert_eq!(session.message_count, 2);
    }

    #[test]
    fn test_summary_rules() {
        let session = parse(&[
            r#"{"type":"user","message":{"content":"This session is being continued from a previous one"}}"#,
            r#"{"type":"user","message":{"content":"We ran out of Context Window space"}}"#,
            r#"{"type":"user","message":{"content":"hi"}}"#,
            r#"{"type":"user","message":{"content":"Add the feature"}}"#,
            r#"{"type":"user","message":{"content":"Something later"}}"#,
        ]);
        assert_eq!(session.summary.as_deref(), Some("Add the feature"));
        assert_eq!(session.turn_count(), 5);
    }

    #[test]
    fn test_meta_entries_skipped_but_counted() {
        let session = parse(&[
            r#"{"type":"user","isMeta":true,"message":{"content":"Caveat: meta text"}}"#,
            r#"{"type":"user","message":{"content":"Real prompt"}}"#,
        ]);
        assert_eq!(session.turn_count(), 1);
        assert_eq!(session.message_count, 2);
        assert_eq!(session.summary.as_deref(), Some("Real prompt"));
    }

    #[test]
    fn test_error_result_sets_error_text() {
        let session = parse(&[
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"b1","name":"Bash","input":{"command":"rm -rf /"}}]}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"b1","is_error":true,"content":"denied"}]}}"#,
        ]);
        let tool = session.invocation("b1").unwrap();
        assert_eq!(tool.error_text.as_deref(), Some("denied"));
        assert_eq!(tool.result_text, None);
        assert_eq!(tool.status(), ToolStatus::Error);
    }

    #[test]
    fn test_unknown_and_repeated_results() {
        let session = parse(&[
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"early","content":"too soon"}]}}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"early","name":"Glob","input":{"pattern":"*.rs"}}]}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"early","content":"first"}]}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"early","is_error":true,"content":"second"}]}}"#,
        ]);
        let tool = session.invocation("early").unwrap();
        assert_eq!(tool.result_text.as_deref(), Some("first"));
        assert_eq!(tool.error_text, None);
    }

    #[test]
    fn test_unresolved_tool_stays_completed() {
        let session = parse(&[ASSISTANT_READ]);
        let tool = session.invocation("t1").unwrap();
        assert!(!tool.has_result());
        assert_eq!(tool.status(), ToolStatus::Completed);
    }

    #[test]
    fn test_assistant_turn_blocks() {
        let session = parse(&[
            r#"{"type":"assistant","uuid":"a1","timestamp":"2026-01-01T00:00:00Z","message":{"content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"Let me look."},{"type":"tool_use","id":"g1","name":"Grep","input":{"pattern":"fn"}},{"type":"tool_use","id":"g2","name":"mcp__x__y","input":{"q":"z"}}]}}"#,
            r#"{"type":"assistant","message":{"content":[]}}"#,
        ]);
        assert_eq!(session.turn_count(), 1);
        let turn = &session.turns[0];
        assert_eq!(turn.uuid, "a1");
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.text, "Let me look.");
        assert_eq!(turn.thinking, "hmm");
        assert_eq!(turn.tool_ids, vec!["g1".to_string(), "g2".to_string()]);
        assert_eq!(session.tools[1].name, "mcp__x__y");
        assert_eq!(session.tools[1].preview, "z");
        assert_eq!(session.tools[0].timestamp.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_bad_block_skipped_alone() {
        let session = parse(&[
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":42},{"type":"tool_use","id":"k","name":"Read","input":{"file_path":"/a"}}]}}"#,
        ]);
        assert_eq!(session.tool_count(), 1);
        assert_eq!(session.turns[0].tool_ids, vec!["k".to_string()]);
    }

    #[test]
    fn test_tool_result_turn_flagged() {
        let session = parse(&[
            ASSISTANT_READ,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":["a","b"]},{"type":"text","text":"and also this"}]}}"#,
        ]);
        assert_eq!(session.tools[0].result_text.as_deref(), Some("ab"));
        let turn = &session.turns[1];
        assert!(turn.is_tool_result);
        assert_eq!(turn.text, "and also this");
        assert_eq!(session.turn_invocations(turn).count(), 1);
    }

    #[test]
    fn test_tool_result_only_entry_adds_no_turn() {
        let session = parse(&[ASSISTANT_READ, RESULT_T1]);
        assert_eq!(session.turn_count(), 1);
        assert_eq!(session.message_count, 2);
    }

    #[test]
    fn test_start_time_first_wins() {
        let session = parse(&[
            r#"{"type":"summary","summary":"x"}"#,
            r#"{"type":"progress","timestamp":"2026-01-01T00:00:00Z"}"#,
            r#"{"type":"user","timestamp":"2026-01-02T00:00:00Z","message":{"content":"hello there"}}"#,
        ]);
        assert_eq!(session.start_time.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_untyped_entry_still_supplies_cwd_and_time() {
        let session = parse(&[
            r#"{"cwd":"/real","timestamp":"2026-03-01T00:00:00Z","sessionId":"x"}"#,
            r#"{"type":"user","timestamp":"2026-03-02T00:00:00Z","message":{"content":"hello there"}}"#,
        ]);
        assert_eq!(session.project_path.as_deref(), Some("/real"));
        assert_eq!(session.start_time.as_deref(), Some("2026-03-01T00:00:00Z"));
        assert_eq!(session.turn_count(), 1);
        assert_eq!(session.message_count, 1);
    }

    #[test]
    fn test_empty_timestamp_does_not_claim_start_time() {
        let session = parse(&[
            r#"{"type":"user","timestamp":"","message":{"content":"first one"}}"#,
            r#"{"type":"assistant","timestamp":"2026-03-02T10:00:00Z","message":{"content":"reply"}}"#,
        ]);
        assert_eq!(session.start_time.as_deref(), Some("2026-03-02T10:00:00Z"));
        assert_eq!(session.turns[0].timestamp, None);
    }

    #[test]
    fn test_project_path_from_system_marker() {
        let session = parse(&[
            r#"{"type":"system","message":"Setup\nWorking directory: /home/u/app\nOther"}"#,
            r#"{"type":"user","cwd":"/elsewhere","message":{"content":"hello there"}}"#,
        ]);
        assert_eq!(session.project_path.as_deref(), Some("/home/u/app"));

        let session = parse(&[r#"{"type":"system","content":"Working directory: /srv"}"#]);
        assert_eq!(session.project_path.as_deref(), Some("/srv"));
    }

    #[test]
    fn test_project_path_from_directory_slug() {
        let session = parse(&[r#"{"type":"user","message":{"content":"hello there"}}"#]);
        assert_eq!(session.project_path.as_deref(), Some("/work/proj"));

        let session = parse_bytes(Path::new("/tmp/plain/s.jsonl"), b"");
        assert_eq!(session.project_path, None);
    }

    #[test]
    fn test_summary_qualification() {
        assert!(qualifies_as_summary("Fix it"));
        assert!(!qualifies_as_summary("abcd"));
        assert!(!qualifies_as_summary("<command-name>/clear</command-name> extra"));
    }

    #[tokio::test]
    async fn test_parse_session_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.jsonl");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{}", USER_FIX).unwrap();
        writeln!(f, "{}", ASSISTANT_READ).unwrap();
        f.write_all(&[0xff, 0xfe, b'\n']).unwrap();
        writeln!(f, "{}", RESULT_T1).unwrap();
        drop(f);

        let session = parse_session(&path).await.unwrap();
        assert_eq!(session.id, "abc");
        assert_eq!(session.tool_count(), 1);
        assert_eq!(session.tools[0].result_text.as_deref(), Some("contents"));

        let again = parse_session(&path).await.unwrap();
        assert_eq!(session, again);
    }

    #[tokio::test]
    async fn test_file_not_found() {
        let result = parse_session(Path::new("/nonexistent/path/file.jsonl")).await;
        assert!(matches!(result, Err(ParseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");
        std::fs::write(&path, "").unwrap();
        let session = parse_session(&path).await.unwrap();
        assert!(session.is_empty());
        assert_eq!(session.message_count, 0);
    }
}
