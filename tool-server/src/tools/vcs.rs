//! Version-control tools: `vcs.branch`, `vcs.commit`, `vcs.push`.
//!
//! Each call is an independent `git` invocation in the project root. There is
//! no locking between callers: branch, commit and push must be sequenced by a
//! single caller.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::ToolContext;
use crate::envelope::Envelope;
use crate::process::{CommandLimits, run_to_envelope};
use crate::registry::{ParamType, Tool, ToolSpec, str_arg};

/// Thin `git` adapter returning envelopes instead of errors.
#[derive(Debug, Clone)]
pub struct Git {
    command: Vec<String>,
    workdir: PathBuf,
    limits: CommandLimits,
}

impl Git {
    pub fn from_context(ctx: &ToolContext) -> Self {
        Self {
            command: ctx.config.vcs.command.clone(),
            workdir: ctx.project_root.clone(),
            limits: ctx.config.command_limits(),
        }
    }

    /// Create or reset `branch` to the current HEAD and check it out.
    #[instrument(skip(self))]
    pub fn checkout_reset(&self, branch: &str) -> Envelope {
        self.run(&["checkout", "-B", branch])
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Envelope {
        self.run(&["add", "-A"])
    }

    #[instrument(skip_all)]
    pub fn commit(&self, message: &str) -> Envelope {
        self.run(&["commit", "-m", message])
    }

    #[instrument(skip(self))]
    pub fn push_head(&self, remote: &str, set_upstream: bool) -> Envelope {
        if set_upstream {
            self.run(&["push", "-u", remote, "HEAD"])
        } else {
            self.run(&["push", remote, "HEAD"])
        }
    }

    fn run(&self, args: &[&str]) -> Envelope {
        debug!(args = %args.join(" "), "git");
        let Some((program, fixed)) = self.command.split_first() else {
            return Envelope::failure("spawn_failed").with("message", "vcs.command is empty");
        };
        let mut argv = fixed.to_vec();
        argv.extend(args.iter().map(|s| s.to_string()));
        run_to_envelope(program, &argv, &self.workdir, self.limits)
    }
}

pub struct Branch {
    git: Git,
}

impl Branch {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self {
            git: Git::from_context(&ctx),
        }
    }
}

impl Tool for Branch {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("vcs.branch", "Create or switch to a branch").required("name", ParamType::String)
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<Envelope> {
        Ok(self.git.checkout_reset(str_arg(args, "name")?))
    }
}

pub struct Commit {
    git: Git,
}

impl Commit {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self {
            git: Git::from_context(&ctx),
        }
    }
}

impl Tool for Commit {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("vcs.commit", "Stage and commit all changes")
            .required("message", ParamType::String)
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<Envelope> {
        let message = str_arg(args, "message")?;
        let staged = self.git.add_all();
        if !staged.ok {
            return Ok(staged);
        }
        Ok(self.git.commit(message))
    }
}

pub struct Push {
    git: Git,
    default_remote: String,
}

impl Push {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self {
            git: Git::from_context(&ctx),
            default_remote: ctx.config.vcs.default_remote.clone(),
        }
    }
}

impl Tool for Push {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("vcs.push", "Push the current branch")
            .optional("remote", ParamType::String)
            .optional("set_upstream", ParamType::Boolean)
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<Envelope> {
        let remote = args
            .get("remote")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_remote);
        let set_upstream = args
            .get("set_upstream")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        Ok(self.git.push_head(remote, set_upstream))
    }
}
