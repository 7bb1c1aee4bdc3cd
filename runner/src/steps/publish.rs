use anyhow::Result;
use serde_json::json;
use tool_server::Envelope;
use tracing::{info, warn};

use super::{Step, failure_reason, goal_of, ticket_of};
use crate::client::ToolClient;
use crate::config::PublishConfig;
use crate::state::{Status, TaskState};
use crate::supervisor::StepId;

/// Branches, commits, pushes and opens the pull request.
///
/// Always finishes the run. VCS failures are logged and the PR is still
/// attempted; the PR envelope is what ends up in the state.
pub struct PublishStep {
    config: PublishConfig,
}

impl PublishStep {
    pub fn new(config: PublishConfig) -> Self {
        Self { config }
    }

    fn call_logged(&self, tools: &dyn ToolClient, tool: &str, args: serde_json::Value) {
        let env = tools.call(tool, args);
        if !env.ok {
            warn!(tool, reason = %failure_reason(&env), "vcs call failed");
        }
    }
}

impl Step for PublishStep {
    fn id(&self) -> StepId {
        StepId::Publish
    }

    fn run(&self, state: TaskState, tools: &dyn ToolClient) -> Result<TaskState> {
        let ticket = ticket_of(&state);
        let goal = goal_of(&state);
        let branch = format!("feat/{}", ticket.to_lowercase());

        self.call_logged(tools, "vcs.branch", json!({"name": branch}));
        self.call_logged(
            tools,
            "vcs.commit",
            json!({"message": format!("{ticket}: {goal}")}),
        );
        self.call_logged(
            tools,
            "vcs.push",
            json!({"remote": self.config.remote, "set_upstream": true}),
        );

        let owner = state
            .github_owner
            .clone()
            .or_else(|| self.config.default_owner.clone());
        let repo = state
            .github_repo
            .clone()
            .or_else(|| self.config.default_repo.clone());
        let pr = match (owner, repo) {
            (Some(owner), Some(repo)) => {
                let body = state
                    .pm_brief
                    .clone()
                    .unwrap_or_else(|| format!("Ticket {ticket}: {goal}"));
                tools.call(
                    "pr.create",
                    json!({
                        "owner": owner,
                        "repo": repo,
                        "head": branch,
                        "base": self.config.base_branch,
                        "title": format!("{ticket}: {goal}"),
                        "body": body,
                    }),
                )
            }
            _ => Envelope::failure("missing_repository"),
        };

        let note = if pr.ok {
            info!(branch = %branch, url = pr.get_str("url").unwrap_or(""), "pull request opened");
            "Publish: PR opened.".to_string()
        } else {
            format!("Publish: PR failed ({}).", failure_reason(&pr))
        };
        let mut state = state.with_status(Status::Done).with_note(note);
        state.pr_response = Some(pr);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedToolClient;

    fn ready(ticket: &str) -> TaskState {
        TaskState::new(Some(ticket.to_string()), Some("Say hello.".to_string()))
            .with_status(Status::ReadyForPr)
    }

    #[test]
    fn opens_pr_against_configured_repository() {
        let tools = ScriptedToolClient::always_ok().respond(
            "pr.create",
            vec![Envelope::success().with("number", 12).with("url", "https://x/pull/12")],
        );
        let step = PublishStep::new(PublishConfig {
            default_owner: Some("acme".to_string()),
            default_repo: Some("widgets".to_string()),
            ..PublishConfig::default()
        });

        let state = step.run(ready("MVP-001"), &tools).expect("run");
        assert_eq!(state.status(), Status::Done);
        assert_eq!(state.notes, vec!["Publish: PR opened."]);

        let calls = tools.calls();
        let names: Vec<_> = calls.iter().map(|(tool, _)| tool.as_str()).collect();
        assert_eq!(names, vec!["vcs.branch", "vcs.commit", "vcs.push", "pr.create"]);
        assert_eq!(calls[0].1, json!({"name": "feat/mvp-001"}));
        assert_eq!(calls[2].1, json!({"remote": "origin", "set_upstream": true}));
        let pr = &calls[3].1;
        assert_eq!(pr["owner"], json!("acme"));
        assert_eq!(pr["head"], json!("feat/mvp-001"));
        assert_eq!(pr["base"], json!("main"));
    }

    #[test]
    fn state_target_wins_over_config() {
        let tools = ScriptedToolClient::always_ok();
        let mut input = ready("OPS-1");
        input.github_owner = Some("me".to_string());
        input.github_repo = Some("mine".to_string());
        let step = PublishStep::new(PublishConfig {
            default_owner: Some("acme".to_string()),
            default_repo: Some("widgets".to_string()),
            ..PublishConfig::default()
        });

        step.run(input, &tools).expect("run");
        let calls = tools.calls();
        assert_eq!(calls[3].1["owner"], json!("me"));
        assert_eq!(calls[3].1["repo"], json!("mine"));
    }

    #[test]
    fn failed_pr_still_finishes() {
        let tools = ScriptedToolClient::always_ok()
            .respond("vcs.push", vec![Envelope::failure("timeout")])
            .respond("pr.create", vec![Envelope::failure("missing_credential")]);
        let mut input = ready("MVP-001");
        input.github_owner = Some("acme".to_string());
        input.github_repo = Some("widgets".to_string());

        let state = PublishStep::new(PublishConfig::default())
            .run(input, &tools)
            .expect("run");
        assert_eq!(state.status(), Status::Done);
        assert_eq!(state.notes, vec!["Publish: PR failed (missing_credential)."]);
        assert_eq!(
            state.pr_response.as_ref().and_then(Envelope::error),
            Some("missing_credential")
        );
    }

    #[test]
    fn missing_target_skips_pr_call() {
        let tools = ScriptedToolClient::always_ok();
        let state = PublishStep::new(PublishConfig::default())
            .run(ready("MVP-001"), &tools)
            .expect("run");
        assert_eq!(state.notes, vec!["Publish: PR failed (missing_repository)."]);
        assert!(tools.calls().iter().all(|(tool, _)| tool != "pr.create"));
    }
}
