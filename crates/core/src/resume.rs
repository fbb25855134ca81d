// crates/core/src/resume.rs
//! Hand-off to whatever launches the agent CLI. Nothing here spawns.

use crate::types::Session;
use serde::Serialize;

/// Program name of the monitored CLI.
pub const CLAUDE_PROGRAM: &str = "claude";

/// Where and how to (re)start the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub project_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ResumeRequest {
    /// Start a fresh conversation in `project_path`.
    pub fn new(project_path: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            session_id: None,
        }
    }

    /// Resume `session`. `None` when the session has no known project path.
    pub fn from_session(session: &Session) -> Option<Self> {
        let project_path = session.project_path.clone()?;
        Some(Self {
            project_path,
            session_id: Some(session.id.clone()),
        })
    }

    /// Argument vector for the launcher, program name first.
    pub fn program_args(&self) -> Vec<String> {
        let mut args = vec![CLAUDE_PROGRAM.to_string()];
        if let Some(id) = &self.session_id {
            args.push("--resume".to_string());
            args.push(id.clone());
        }
        args
    }
}
