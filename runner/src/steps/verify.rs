use anyhow::Result;
use serde_json::json;
use tracing::info;

use super::{Step, failure_reason};
use crate::client::ToolClient;
use crate::state::{Status, TaskState};
use crate::supervisor::StepId;

/// Runs the test suite; a failure routes back to implement.
pub struct VerifyStep {
    test_args: Vec<String>,
}

impl VerifyStep {
    pub fn new(test_args: Vec<String>) -> Self {
        Self { test_args }
    }
}

impl Step for VerifyStep {
    fn id(&self) -> StepId {
        StepId::Verify
    }

    fn run(&self, state: TaskState, tools: &dyn ToolClient) -> Result<TaskState> {
        let result = tools.call("tests.run", json!({"args": self.test_args}));
        let (status, note) = if result.ok {
            (Status::ReadyForPr, "Verify: tests passed.")
        } else {
            info!(reason = %failure_reason(&result), "tests failing");
            (Status::NeedsFix, "Verify: tests failing.")
        };

        let mut state = state.with_status(status).with_note(note);
        state.test_result = Some(result);
        Ok(state)
    }
}
