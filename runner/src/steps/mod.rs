//! Pipeline steps.
//!
//! A step takes the task state by value, may call tools, and returns the next
//! state with its own status transition and exactly one new note. Tool
//! failures are recorded in the state; `Err` is reserved for faults in the
//! step itself (for example a broken template).

mod implement;
mod plan;
mod publish;
mod requirements;
mod templates;
mod verify;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tool_server::Envelope;

use crate::client::ToolClient;
use crate::config::RunnerConfig;
use crate::state::TaskState;
use crate::supervisor::StepId;

pub use implement::ImplementStep;
pub use plan::{DEFAULT_GOAL, DEFAULT_TICKET, PlanStep};
pub use publish::PublishStep;
pub use requirements::RequirementsStep;
pub use templates::{Templates, TicketContext};
pub use verify::VerifyStep;

pub trait Step {
    fn id(&self) -> StepId;
    fn run(&self, state: TaskState, tools: &dyn ToolClient) -> Result<TaskState>;
}

/// One implementation per [`StepId`].
pub struct StepSet {
    steps: HashMap<StepId, Box<dyn Step>>,
}

impl StepSet {
    /// The built-in steps, configured from `config`.
    pub fn standard(config: &RunnerConfig) -> Result<Self> {
        let templates = Arc::new(Templates::new()?);
        Ok(Self::empty()
            .with_step(PlanStep)
            .with_step(RequirementsStep::new(templates.clone()))
            .with_step(ImplementStep::new(templates, config.implement.clone()))
            .with_step(VerifyStep::new(config.verify.test_args.clone()))
            .with_step(PublishStep::new(config.publish.clone())))
    }

    pub fn empty() -> Self {
        Self {
            steps: HashMap::new(),
        }
    }

    /// Register `step`, replacing any step with the same id.
    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.steps.insert(step.id(), Box::new(step));
        self
    }

    pub fn get(&self, id: StepId) -> Option<&dyn Step> {
        self.steps.get(&id).map(|step| step.as_ref())
    }
}

fn ticket_of(state: &TaskState) -> String {
    state
        .ticket
        .clone()
        .unwrap_or_else(|| DEFAULT_TICKET.to_string())
}

fn goal_of(state: &TaskState) -> String {
    state
        .goal
        .clone()
        .unwrap_or_else(|| DEFAULT_GOAL.to_string())
}

/// Short reason for a failed envelope, for notes and logs.
fn failure_reason(env: &Envelope) -> String {
    if let Some(error) = env.error() {
        return error.to_string();
    }
    match env.get("status").and_then(serde_json::Value::as_u64) {
        Some(status) => format!("status {status}"),
        None => "failed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Status;
    use crate::test_support::ScriptedToolClient;

    struct Stamp;

    impl Step for Stamp {
        fn id(&self) -> StepId {
            StepId::Plan
        }

        fn run(&self, state: TaskState, _tools: &dyn ToolClient) -> Result<TaskState> {
            Ok(state.with_status(Status::Done).with_note("stamped"))
        }
    }

    #[test]
    fn standard_set_covers_every_step() {
        let steps = StepSet::standard(&RunnerConfig::default()).expect("steps");
        for id in StepId::ALL {
            let step = steps.get(id).expect("registered");
            assert_eq!(step.id(), id);
        }
    }

    #[test]
    fn with_step_replaces_by_id() {
        let steps = StepSet::standard(&RunnerConfig::default())
            .expect("steps")
            .with_step(Stamp);
        let tools = ScriptedToolClient::always_ok();
        let state = steps
            .get(StepId::Plan)
            .expect("plan")
            .run(TaskState::default(), &tools)
            .expect("run");
        assert_eq!(state.notes, vec!["stamped"]);
        assert!(tools.calls().is_empty());
    }

    #[test]
    fn failure_reason_prefers_error_tag() {
        assert_eq!(failure_reason(&Envelope::failure("timeout")), "timeout");
        assert_eq!(
            failure_reason(&Envelope::new(false).with("status", 422)),
            "status 422"
        );
        assert_eq!(failure_reason(&Envelope::new(false)), "failed");
    }
}
