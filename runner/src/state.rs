//! Task state threaded through the pipeline.
//!
//! Steps never share a mutable reference: each one takes the state by value
//! and hands back the next version. Only the orchestration loop holds it
//! between steps.

use std::fmt;

use serde::{Deserialize, Serialize};
use tool_server::Envelope;

/// Pipeline status tag.
///
/// Values outside the known set are kept verbatim so they survive a
/// round-trip, and route to termination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    New,
    Planned,
    NeedsPrd,
    NeedsImplementation,
    Testing,
    NeedsFix,
    ReadyForPr,
    Done,
    Unrecognized(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "new",
            Self::Planned => "planned",
            Self::NeedsPrd => "needs_prd",
            Self::NeedsImplementation => "needs_implementation",
            Self::Testing => "testing",
            Self::NeedsFix => "needs_fix",
            Self::ReadyForPr => "ready_for_pr",
            Self::Done => "done",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl From<&str> for Status {
    fn from(raw: &str) -> Self {
        match raw {
            "new" => Self::New,
            "planned" => Self::Planned,
            "needs_prd" => Self::NeedsPrd,
            "needs_implementation" => Self::NeedsImplementation,
            "testing" => Self::Testing,
            "needs_fix" => Self::NeedsFix,
            "ready_for_pr" => Self::ReadyForPr,
            "done" => Self::Done,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl From<String> for Status {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record every step reads and returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskState {
    /// Absent until the first step runs; read as [`Status::New`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pm_brief: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prd: Option<String>,
    /// Pull-request target; falls back to runner config when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_repo: Option<String>,
    /// One entry per executed step, in execution order.
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_result: Option<Envelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_response: Option<Envelope>,
}

impl TaskState {
    pub fn new(ticket: Option<String>, goal: Option<String>) -> Self {
        Self {
            ticket,
            goal,
            ..Self::default()
        }
    }

    pub fn status(&self) -> Status {
        self.status.clone().unwrap_or(Status::New)
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Append a note; notes are never rewritten or removed.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}
