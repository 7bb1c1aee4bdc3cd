//! Orchestration loop: route, run one step, repeat.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, info_span, warn};

use crate::client::ToolClient;
use crate::state::{Status, TaskState};
use crate::steps::StepSet;
use crate::supervisor::{StepId, next_step};

/// Limits applied by [`run_loop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on step executions.
    pub max_iterations: u32,
    /// Upper bound on fix cycles (failed verify → implement). `None` leaves
    /// only the iteration budget.
    pub max_fix_attempts: Option<u32>,
    /// Sleep before each fix cycle.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_fix_attempts: None,
            backoff: Duration::ZERO,
        }
    }
}

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The router reported a terminal status.
    Terminal,
    /// `max_iterations` steps ran without reaching a terminal status.
    BudgetExhausted { max_iterations: u32 },
    /// Another fix cycle would exceed `max_fix_attempts`.
    RetriesExhausted {
        fix_attempts: u32,
        max_fix_attempts: u32,
    },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub state: TaskState,
    pub steps_executed: u32,
    pub stop: LoopStop,
}

impl LoopOutcome {
    pub fn is_terminal(&self) -> bool {
        self.stop == LoopStop::Terminal
    }
}

/// What `on_step` sees after each step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// 1-based position of the step in this run.
    pub iteration: u32,
    pub step: StepId,
    pub status: Status,
    pub note: Option<String>,
}

/// Run steps until the router stops, the budget is spent, or the retry
/// policy gives up.
///
/// A step returning `Err` stops the loop with that error; tool failures are
/// recorded in the state by the steps themselves.
pub fn run_loop<F: FnMut(&StepReport)>(
    initial: TaskState,
    steps: &StepSet,
    tools: &dyn ToolClient,
    policy: &RetryPolicy,
    mut on_step: F,
) -> Result<LoopOutcome> {
    let mut state = initial;
    let mut steps_executed = 0u32;
    let mut fix_attempts = 0u32;

    loop {
        let status = state.status();
        let Some(id) = next_step(&status) else {
            info!(status = %status, steps_executed, "pipeline finished");
            return Ok(LoopOutcome {
                state,
                steps_executed,
                stop: LoopStop::Terminal,
            });
        };

        if steps_executed >= policy.max_iterations {
            warn!(status = %status, max_iterations = policy.max_iterations, "iteration budget exhausted");
            return Ok(LoopOutcome {
                state,
                steps_executed,
                stop: LoopStop::BudgetExhausted {
                    max_iterations: policy.max_iterations,
                },
            });
        }

        if status == Status::NeedsFix {
            let exhausted = policy
                .max_fix_attempts
                .filter(|max_fix_attempts| fix_attempts >= *max_fix_attempts);
            if let Some(max_fix_attempts) = exhausted {
                warn!(fix_attempts, "fix attempts exhausted");
                return Ok(LoopOutcome {
                    state,
                    steps_executed,
                    stop: LoopStop::RetriesExhausted {
                        fix_attempts,
                        max_fix_attempts,
                    },
                });
            }
            fix_attempts += 1;
            if !policy.backoff.is_zero() {
                thread::sleep(policy.backoff);
            }
        }

        let step = steps
            .get(id)
            .ok_or_else(|| anyhow!("no step registered for {id}"))?;
        let iteration = steps_executed + 1;
        let _span = info_span!("step", step = %id, iteration).entered();
        state = step
            .run(state, tools)
            .with_context(|| format!("step {id} (iteration {iteration})"))?;
        steps_executed = iteration;

        let report = StepReport {
            iteration,
            step: id,
            status: state.status(),
            note: state.notes.last().cloned(),
        };
        info!(status = %report.status, note = report.note.as_deref().unwrap_or(""), "step done");
        on_step(&report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;
    use crate::steps::Step;
    use crate::test_support::ScriptedToolClient;
    use tool_server::Envelope;

    fn steps() -> StepSet {
        StepSet::standard(&RunnerConfig::default()).expect("steps")
    }

    fn failing_tests() -> ScriptedToolClient {
        ScriptedToolClient::always_ok().fallback("tests.run", Envelope::failure("timeout"))
    }

    #[test]
    fn terminal_input_runs_nothing() {
        let tools = ScriptedToolClient::always_ok();
        let outcome = run_loop(
            TaskState::default().with_status(Status::Done),
            &steps(),
            &tools,
            &RetryPolicy::default(),
            |_| panic!("no step expected"),
        )
        .expect("loop");
        assert_eq!(outcome.stop, LoopStop::Terminal);
        assert_eq!(outcome.steps_executed, 0);
    }

    #[test]
    fn unknown_status_stops_immediately() {
        let tools = ScriptedToolClient::always_ok();
        let state = TaskState::default().with_status(Status::from("blocked"));
        let outcome = run_loop(state, &steps(), &tools, &RetryPolicy::default(), |_| {})
            .expect("loop");
        assert!(outcome.is_terminal());
        assert_eq!(outcome.state.status(), Status::from("blocked"));
        assert!(tools.calls().is_empty());
    }

    #[test]
    fn budget_exhaustion_keeps_last_status() {
        let tools = failing_tests();
        let policy = RetryPolicy {
            max_iterations: 9,
            ..RetryPolicy::default()
        };
        let mut seen = Vec::new();
        let outcome = run_loop(TaskState::default(), &steps(), &tools, &policy, |report| {
            seen.push(report.step);
        })
        .expect("loop");

        assert_eq!(outcome.stop, LoopStop::BudgetExhausted { max_iterations: 9 });
        assert_eq!(outcome.steps_executed, 9);
        // plan, requirements, then implement/verify pairs; the 9th step is implement.
        assert_eq!(outcome.state.status(), Status::Testing);
        assert_eq!(seen.len(), 9);
        assert_eq!(tools.count("tests.run"), 3);
    }

    #[test]
    fn retry_policy_caps_fix_cycles() {
        let tools = failing_tests();
        let policy = RetryPolicy {
            max_fix_attempts: Some(2),
            ..RetryPolicy::default()
        };
        let outcome = run_loop(TaskState::default(), &steps(), &tools, &policy, |_| {})
            .expect("loop");

        assert_eq!(
            outcome.stop,
            LoopStop::RetriesExhausted {
                fix_attempts: 2,
                max_fix_attempts: 2
            }
        );
        assert_eq!(outcome.state.status(), Status::NeedsFix);
        // One initial verify plus one per fix cycle.
        assert_eq!(tools.count("tests.run"), 3);
    }

    #[test]
    fn step_error_stops_the_loop() {
        struct Broken;
        impl Step for Broken {
            fn id(&self) -> StepId {
                StepId::DraftRequirements
            }
            fn run(&self, _state: TaskState, _tools: &dyn ToolClient) -> Result<TaskState> {
                Err(anyhow!("template exploded"))
            }
        }

        let tools = ScriptedToolClient::always_ok();
        let steps = steps().with_step(Broken);
        let err = run_loop(
            TaskState::default(),
            &steps,
            &tools,
            &RetryPolicy::default(),
            |_| {},
        )
        .expect_err("step error");
        let message = format!("{err:#}");
        assert!(message.contains("draft-requirements"), "{message}");
        assert!(message.contains("template exploded"), "{message}");
    }

    #[test]
    fn missing_step_is_an_error() {
        let tools = ScriptedToolClient::always_ok();
        let err = run_loop(
            TaskState::default(),
            &StepSet::empty(),
            &tools,
            &RetryPolicy::default(),
            |_| {},
        )
        .expect_err("empty step set");
        assert!(err.to_string().contains("plan"));
    }
}
