//! Step routing: status tag → next step.
//!
//! Pure and total. The router only reads the status; steps decide the next
//! one themselves.

use std::fmt;

use serde::Serialize;

use crate::state::Status;

/// Identifier of a pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    Plan,
    DraftRequirements,
    Implement,
    Verify,
    Publish,
}

impl StepId {
    pub const ALL: [StepId; 5] = [
        Self::Plan,
        Self::DraftRequirements,
        Self::Implement,
        Self::Verify,
        Self::Publish,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::DraftRequirements => "draft-requirements",
            Self::Implement => "implement",
            Self::Verify => "verify",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Next step for `status`, or `None` when the pipeline must stop.
///
/// `done` and every unrecognized status are terminal.
pub fn next_step(status: &Status) -> Option<StepId> {
    match status {
        Status::New | Status::Planned => Some(StepId::Plan),
        Status::NeedsPrd => Some(StepId::DraftRequirements),
        Status::NeedsImplementation | Status::NeedsFix => Some(StepId::Implement),
        Status::Testing => Some(StepId::Verify),
        Status::ReadyForPr => Some(StepId::Publish),
        Status::Done | Status::Unrecognized(_) => None,
    }
}

pub fn is_terminal(status: &Status) -> bool {
    next_step(status).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_table() {
        let table = [
            ("new", Some(StepId::Plan)),
            ("planned", Some(StepId::Plan)),
            ("needs_prd", Some(StepId::DraftRequirements)),
            ("needs_implementation", Some(StepId::Implement)),
            ("testing", Some(StepId::Verify)),
            ("needs_fix", Some(StepId::Implement)),
            ("ready_for_pr", Some(StepId::Publish)),
            ("done", None),
        ];
        for (raw, expected) in table {
            assert_eq!(next_step(&Status::from(raw)), expected, "{raw}");
        }
    }

    #[test]
    fn unknown_status_terminates() {
        for raw in ["", "DONE", "blocked", "needs-prd"] {
            assert!(is_terminal(&Status::from(raw)), "{raw:?}");
        }
    }

    #[test]
    fn step_names_are_kebab_case() {
        let names: Vec<_> = StepId::ALL.iter().map(|id| id.as_str()).collect();
        assert_eq!(
            names,
            vec!["plan", "draft-requirements", "implement", "verify", "publish"]
        );
    }
}
