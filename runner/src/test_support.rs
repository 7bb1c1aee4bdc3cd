//! Test-only collaborators: a scripted tool client and a temp project.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::TempDir;
use tool_server::Envelope;
use tool_server::config::{GithubConfig, ServerConfig, TestsConfig, VcsConfig};

use crate::client::ToolClient;

/// Tool client that answers from per-tool scripts and records every call.
///
/// Each tool first drains its queued responses, then repeats its fallback,
/// then falls back to `{ok: true}`.
#[derive(Default)]
pub struct ScriptedToolClient {
    queued: RefCell<HashMap<String, VecDeque<Envelope>>>,
    fallback: HashMap<String, Envelope>,
    calls: RefCell<Vec<(String, Value)>>,
}

impl ScriptedToolClient {
    pub fn always_ok() -> Self {
        Self::default()
    }

    /// Queue one-shot responses for `tool`, returned in order.
    pub fn respond(self, tool: &str, responses: Vec<Envelope>) -> Self {
        self.queued
            .borrow_mut()
            .entry(tool.to_string())
            .or_default()
            .extend(responses);
        self
    }

    /// Response for `tool` once its queue is empty.
    pub fn fallback(mut self, tool: &str, response: Envelope) -> Self {
        self.fallback.insert(tool.to_string(), response);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, tool: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|(name, _)| name == tool)
            .count()
    }
}

impl ToolClient for ScriptedToolClient {
    fn call(&self, tool: &str, args: Value) -> Envelope {
        self.calls.borrow_mut().push((tool.to_string(), args));
        let queued = self
            .queued
            .borrow_mut()
            .get_mut(tool)
            .and_then(VecDeque::pop_front);
        queued
            .or_else(|| self.fallback.get(tool).cloned())
            .unwrap_or_else(Envelope::success)
    }
}

/// Temp project directory with a tool-server config pointing at it.
///
/// External commands are replaced with `sh -c` one-liners so no real test
/// runner or git is needed, and the PR credential variable is never set.
pub struct TempProject {
    _temp: TempDir,
    root: PathBuf,
}

impl TempProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let root = temp.path().to_path_buf();
        Ok(Self { _temp: temp, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Server config whose test command exits with `tests_exit`.
    pub fn server_config(&self, tests_exit: i32) -> ServerConfig {
        ServerConfig {
            project_root: self.root.clone(),
            tests: TestsConfig {
                command: sh(&format!("exit {tests_exit}")),
                default_args: Vec::new(),
            },
            vcs: VcsConfig {
                command: sh("echo \"$@\" >> .vcs.log"),
                ..VcsConfig::default()
            },
            github: GithubConfig {
                token_env: "RUNNER_TEST_SUPPORT_TOKEN_NEVER_SET".to_string(),
                ..GithubConfig::default()
            },
            ..ServerConfig::default()
        }
    }

    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.root.join(relative);
        std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}

fn sh(script: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        script.to_string(),
        "sh".to_string(),
    ]
}
