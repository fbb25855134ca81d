// crates/core/src/types.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Outcome of a tool invocation as far as the transcript shows it.
///
/// There is no pending state: a tool whose result line never arrived is
/// reported as `Completed` with an empty result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Completed,
    Error,
}

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One tool call emitted by an assistant turn, with its correlated result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub input: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

impl ToolInvocation {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        input: Map<String, Value>,
        timestamp: Option<String>,
    ) -> Self {
        let name = name.into();
        let preview = crate::tools::preview(&name, &input);
        Self {
            id: id.into(),
            name,
            input,
            timestamp,
            preview,
            result_text: None,
            error_text: None,
        }
    }

    pub fn status(&self) -> ToolStatus {
        if self.error_text.is_some() {
            ToolStatus::Error
        } else {
            ToolStatus::Completed
        }
    }

    pub fn has_result(&self) -> bool {
        self.result_text.is_some() || self.error_text.is_some()
    }

    /// Attach the result of this invocation.
    ///
    /// The first result wins: once either field is set, later results are
    /// ignored and `false` is returned. At most one of the two fields is ever set.
    pub fn record_result(&mut self, text: String, is_error: bool) -> bool {
        if self.has_result() {
            return false;
        }
        if is_error {
            self.error_text = Some(text);
        } else {
            self.result_text = Some(text);
        }
        true
    }

    pub fn display_name(&self) -> String {
        crate::tools::display_name(&self.name, &self.input)
    }

    /// The file this tool operates on, for tools that have one.
    pub fn file_path(&self) -> Option<&str> {
        crate::tools::file_path(&self.name, &self.input)
    }
}

/// One authored message in a conversation.
///
/// Tool calls are referenced by ID only; resolve them through
/// [`Session::turn_invocations`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub uuid: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thinking: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_ids: Vec<String>,
    pub is_tool_result: bool,
}

/// A parsed transcript plus its liveness as last reconciled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Transcript file stem, assigned by the agent.
    pub id: String,
    pub path: PathBuf,
    pub tools: Vec<ToolInvocation>,
    pub turns: Vec<ConversationTurn>,
    /// Every `user`/`assistant` entry seen, meta entries included.
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    pub is_live: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip)]
    tool_index: HashMap<String, usize>,
}

impl Session {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = session_id_from_path(&path);
        Self {
            id,
            path,
            tools: Vec::new(),
            turns: Vec::new(),
            message_count: 0,
            start_time: None,
            summary: None,
            project_path: None,
            is_live: false,
            pid: None,
            tool_index: HashMap::new(),
        }
    }

    /// Append an invocation and index it by ID. A repeated ID re-points the
    /// index at the newest invocation; both stay in the list. Turns naming
    /// that ID, earlier ones included, then resolve to the newest one.
    pub(crate) fn push_tool(&mut self, tool: ToolInvocation) {
        self.tool_index.insert(tool.id.clone(), self.tools.len());
        self.tools.push(tool);
    }

    pub(crate) fn invocation_mut(&mut self, id: &str) -> Option<&mut ToolInvocation> {
        let idx = *self.tool_index.get(id)?;
        self.tools.get_mut(idx)
    }

    pub fn invocation(&self, id: &str) -> Option<&ToolInvocation> {
        self.tool_index.get(id).and_then(|&idx| self.tools.get(idx))
    }

    /// Resolve a turn's tool references against this session's invocations.
    /// IDs with no invocation (tool-result turns for unseen calls) are skipped.
    pub fn turn_invocations<'a>(
        &'a self,
        turn: &'a ConversationTurn,
    ) -> impl Iterator<Item = &'a ToolInvocation> + 'a {
        turn.tool_ids.iter().filter_map(move |id| self.invocation(id))
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty() && self.tools.is_empty()
    }

    pub fn set_liveness(&mut self, pid: Option<u32>) {
        self.is_live = pid.is_some();
        self.pid = pid;
    }

    /// Short form of the session ID for lists.
    pub fn display_name(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }

    pub fn display_summary(&self) -> String {
        match &self.summary {
            Some(summary) => {
                let flat = summary.trim().replace('\n', " ").replace('\r', "");
                crate::tools::truncate(&flat, 60)
            }
            None => "No summary available".to_string(),
        }
    }

    pub fn project_name(&self) -> &str {
        self.project_path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
    }
}

/// Session ID is the transcript's file stem.
pub fn session_id_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

// ============================================================================
// JSONL Parsing Types (internal, for deserializing Claude Code format)
// ============================================================================

/// One content block of a `message.content` list. Decoded block by block, so
/// a block of unexpected shape is skipped without losing its siblings.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        is_error: Option<bool>,
        #[serde(default)]
        content: Value,
    },
    #[serde(other)]
    Other,
}

// ============================================================================
// Tests
// ============================================================================
