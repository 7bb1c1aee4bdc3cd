use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing::{info, warn};

use super::templates::{APP, TEST_APP, TicketContext};
use super::{Step, Templates, failure_reason, goal_of, ticket_of};
use crate::client::ToolClient;
use crate::config::ImplementConfig;
use crate::state::{Status, TaskState};
use crate::supervisor::StepId;

/// Writes the application, its tests and the PRD through `fs.write`.
pub struct ImplementStep {
    templates: Arc<Templates>,
    config: ImplementConfig,
}

impl ImplementStep {
    pub fn new(templates: Arc<Templates>, config: ImplementConfig) -> Self {
        Self { templates, config }
    }
}

impl Step for ImplementStep {
    fn id(&self) -> StepId {
        StepId::Implement
    }

    fn run(&self, state: TaskState, tools: &dyn ToolClient) -> Result<TaskState> {
        let ticket = ticket_of(&state);
        let goal = goal_of(&state);
        let ctx = TicketContext {
            ticket: &ticket,
            goal: &goal,
        };
        let files = [
            (
                self.config.app_path.as_str(),
                self.templates.render(APP, &ctx)?,
            ),
            (
                self.config.test_path.as_str(),
                self.templates.render(TEST_APP, &ctx)?,
            ),
            (
                self.config.prd_path.as_str(),
                state.prd.clone().unwrap_or_default(),
            ),
        ];

        let mut rejected = Vec::new();
        for (path, content) in &files {
            let env = tools.call("fs.write", json!({"path": path, "content": content}));
            if env.ok {
                info!(path, "wrote artifact");
            } else {
                let reason = failure_reason(&env);
                warn!(path, reason = %reason, "artifact write rejected");
                rejected.push(format!("{path} ({reason})"));
            }
        }

        let note = if rejected.is_empty() {
            "Implement: code and tests written.".to_string()
        } else {
            format!(
                "Implement: {} of {} writes rejected: {}.",
                rejected.len(),
                files.len(),
                rejected.join(", ")
            )
        };
        Ok(state.with_status(Status::Testing).with_note(note))
    }
}
