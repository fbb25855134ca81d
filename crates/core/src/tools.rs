// crates/core/src/tools.rs
//! Per-tool formatting strategies.
//!
//! Tool names are an open set. Known names map to a [`ToolFormat`] in a
//! lookup table; every other name falls through to a generic strategy, so a
//! tool the agent adds tomorrow still gets a preview.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

/// Maximum characters in a tool preview.
pub const PREVIEW_BUDGET: usize = 80;

/// Maximum characters of the parameter part of a display name.
pub const DISPLAY_BUDGET: usize = 30;

/// Shorter budget for free-text parameters (patterns, descriptions).
const DISPLAY_TEXT_BUDGET: usize = 20;

type Input = Map<String, Value>;

/// Formatting strategy for one tool name.
#[derive(Clone, Copy)]
pub struct ToolFormat {
    pub preview: fn(&Input) -> String,
    pub display_name: fn(&Input) -> String,
    /// Input parameter holding the file or directory the tool operates on.
    pub file_param: Option<&'static str>,
}

static FORMATS: OnceLock<HashMap<&'static str, ToolFormat>> = OnceLock::new();

const DEFAULT_FORMAT: ToolFormat = ToolFormat {
    preview: generic_preview,
    display_name: |_| String::new(),
    file_param: None,
};

fn formats() -> &'static HashMap<&'static str, ToolFormat> {
    FORMATS.get_or_init(|| {
        let mut m: HashMap<&'static str, ToolFormat> = HashMap::new();
        m.insert(
            "Read",
            ToolFormat {
                preview: |i| param(i, "file_path"),
                display_name: |i| format!("Read: {}", file_label(i)),
                file_param: Some("file_path"),
            },
        );
        m.insert(
            "Edit",
            ToolFormat {
                preview: |i| format!("{} (edit)", param(i, "file_path")),
                display_name: |i| format!("Edit: {}", file_label(i)),
                file_param: Some("file_path"),
            },
        );
        m.insert(
            "Write",
            ToolFormat {
                preview: |i| format!("{} (write)", param(i, "file_path")),
                display_name: |i| format!("Write: {}", file_label(i)),
                file_param: Some("file_path"),
            },
        );
        m.insert(
            "Bash",
            ToolFormat {
                preview: |i| param(i, "command"),
                display_name: |i| {
                    let cmd = param(i, "command");
                    let first = cmd.split_whitespace().next().unwrap_or("command");
                    format!("Bash: {}", truncate(first, DISPLAY_BUDGET))
                },
                file_param: None,
            },
        );
        m.insert(
            "Grep",
            ToolFormat {
                preview: |i| {
                    let path = param(i, "path");
                    let path = if path.is_empty() { ".".to_string() } else { path };
                    format!("{} in {}", param(i, "pattern"), path)
                },
                display_name: |i| format!("Grep: {}", truncate(&param(i, "pattern"), DISPLAY_TEXT_BUDGET)),
                file_param: Some("path"),
            },
        );
        m.insert(
            "Glob",
            ToolFormat {
                preview: |i| param(i, "pattern"),
                display_name: |i| format!("Glob: {}", truncate(&param(i, "pattern"), DISPLAY_TEXT_BUDGET)),
                file_param: Some("path"),
            },
        );
        m.insert(
            "Task",
            ToolFormat {
                preview: |i| param(i, "description"),
                display_name: |i| format!("Task: {}", truncate(&param(i, "description"), DISPLAY_TEXT_BUDGET)),
                file_param: None,
            },
        );
        m
    })
}

/// Strategy for `name`, or the generic one for unrecognized tools.
pub fn format_for(name: &str) -> ToolFormat {
    formats().get(name).copied().unwrap_or(DEFAULT_FORMAT)
}

/// One-line preview of a tool call, within [`PREVIEW_BUDGET`].
pub fn preview(name: &str, input: &Input) -> String {
    truncate(&(format_for(name).preview)(input), PREVIEW_BUDGET)
}

/// Short label such as `Read: main.rs` or `Bash: cargo`. Unknown tools show
/// their bare name.
pub fn display_name(name: &str, input: &Input) -> String {
    let label = (format_for(name).display_name)(input);
    if label.is_empty() {
        name.to_string()
    } else {
        label
    }
}

pub fn file_path<'a>(name: &str, input: &'a Input) -> Option<&'a str> {
    let key = format_for(name).file_param?;
    input.get(key).and_then(Value::as_str)
}

/// Truncate to `max_len` characters, ending in `...` when shortened.
/// Counts characters, so multi-byte text is never split.
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// String value of an input parameter. Non-string values render as JSON,
/// missing or null ones as the empty string.
fn param(input: &Input, key: &str) -> String {
    input.get(key).map(value_text).unwrap_or_default()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn file_label(input: &Input) -> String {
    let path = param(input, "file_path");
    let name = Path::new(&path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "file".to_string());
    truncate(&name, DISPLAY_BUDGET)
}

fn generic_preview(input: &Input) -> String {
    input.values().next().map(value_text).unwrap_or_default()
}
