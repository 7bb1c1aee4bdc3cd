use anyhow::Result;
use tracing::debug;

use super::{Step, goal_of, ticket_of};
use crate::client::ToolClient;
use crate::state::{Status, TaskState};
use crate::supervisor::StepId;

pub const DEFAULT_TICKET: &str = "MVP-001";
pub const DEFAULT_GOAL: &str = "Build sample FastAPI endpoint with tests.";

/// Fills in ticket and goal, then writes the brief.
pub struct PlanStep;

impl Step for PlanStep {
    fn id(&self) -> StepId {
        StepId::Plan
    }

    fn run(&self, mut state: TaskState, _tools: &dyn ToolClient) -> Result<TaskState> {
        let ticket = ticket_of(&state);
        let goal = goal_of(&state);
        debug!(ticket = %ticket, "planning");

        state.pm_brief = Some(format!("Ticket {ticket}: {goal}"));
        state.ticket = Some(ticket);
        state.goal = Some(goal);
        Ok(state
            .with_status(Status::NeedsPrd)
            .with_note("Plan: brief created."))
    }
}
