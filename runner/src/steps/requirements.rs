use std::sync::Arc;

use anyhow::Result;

use super::templates::{PRD, TicketContext};
use super::{Step, Templates, goal_of, ticket_of};
use crate::client::ToolClient;
use crate::state::{Status, TaskState};
use crate::supervisor::StepId;

/// Renders the PRD for the ticket.
pub struct RequirementsStep {
    templates: Arc<Templates>,
}

impl RequirementsStep {
    pub fn new(templates: Arc<Templates>) -> Self {
        Self { templates }
    }
}

impl Step for RequirementsStep {
    fn id(&self) -> StepId {
        StepId::DraftRequirements
    }

    fn run(&self, mut state: TaskState, _tools: &dyn ToolClient) -> Result<TaskState> {
        let ticket = ticket_of(&state);
        let goal = goal_of(&state);
        let prd = self.templates.render(
            PRD,
            &TicketContext {
                ticket: &ticket,
                goal: &goal,
            },
        )?;
        state.prd = Some(prd);
        Ok(state
            .with_status(Status::NeedsImplementation)
            .with_note("Requirements: PRD drafted."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedToolClient;

    #[test]
    fn drafts_prd_for_ticket() {
        let step = RequirementsStep::new(Arc::new(Templates::new().expect("templates")));
        let tools = ScriptedToolClient::always_ok();
        let input = TaskState::new(Some("OPS-42".to_string()), None).with_status(Status::NeedsPrd);

        let state = step.run(input, &tools).expect("run");
        assert!(
            state
                .prd
                .as_deref()
                .expect("prd")
                .starts_with("# PRD for OPS-42")
        );
        assert_eq!(state.status(), Status::NeedsImplementation);
        assert_eq!(state.notes, vec!["Requirements: PRD drafted."]);
    }
}
