//! Runner configuration (`runner.toml`).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::looping::RetryPolicy;

/// Smallest accepted budget; a full pass plus two fix cycles fits in it.
pub const MIN_ITERATIONS: u32 = 10;

/// Runner configuration (TOML).
///
/// Missing fields default to values that work against a local tool server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Base URL of the tool server; the JSON-RPC endpoint is `{server_url}/mcp`.
    pub server_url: String,

    /// Network timeout for one tool call, in seconds. Test runs can be slow.
    pub request_timeout_secs: u64,

    /// Upper bound on step executions per run.
    pub max_iterations: u32,

    pub retry: RetryConfig,
    pub verify: VerifyConfig,
    pub implement: ImplementConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RetryConfig {
    /// Upper bound on fix cycles (failed verify back to implement). Unset
    /// means only the iteration budget applies.
    pub max_fix_attempts: Option<u32>,
    /// Pause between a failed verify and the next implement, in milliseconds.
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifyConfig {
    /// Arguments passed to `tests.run`.
    pub test_args: Vec<String>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            test_args: [
                "-q",
                "--maxfail=1",
                "--disable-warnings",
                "--cov=src",
                "--cov-report=term-missing",
                "--cov-fail-under=85",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImplementConfig {
    /// Project-relative path for the rendered PRD.
    pub prd_path: String,
    /// Project-relative path for the generated application module.
    pub app_path: String,
    /// Project-relative path for the generated test module.
    pub test_path: String,
}

impl Default for ImplementConfig {
    fn default() -> Self {
        Self {
            prd_path: "docs/PRD.md".to_string(),
            app_path: "src/app.py".to_string(),
            test_path: "tests/test_app.py".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PublishConfig {
    pub base_branch: String,
    pub remote: String,
    /// Used when the task state carries no `github_owner`.
    pub default_owner: Option<String>,
    /// Used when the task state carries no `github_repo`.
    pub default_repo: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            base_branch: "main".to_string(),
            remote: "origin".to_string(),
            default_owner: None,
            default_repo: None,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3333".to_string(),
            request_timeout_secs: 900,
            max_iterations: 20,
            retry: RetryConfig::default(),
            verify: VerifyConfig::default(),
            implement: ImplementConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(anyhow!("server_url must be non-empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be > 0"));
        }
        if self.max_iterations < MIN_ITERATIONS {
            return Err(anyhow!(
                "max_iterations must be >= {MIN_ITERATIONS} (got {})",
                self.max_iterations
            ));
        }
        for (key, value) in [
            ("implement.prd_path", &self.implement.prd_path),
            ("implement.app_path", &self.implement.app_path),
            ("implement.test_path", &self.implement.test_path),
            ("publish.base_branch", &self.publish.base_branch),
            ("publish.remote", &self.publish.remote),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{key} must be non-empty"));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_iterations: self.max_iterations,
            max_fix_attempts: self.retry.max_fix_attempts,
            backoff: Duration::from_millis(self.retry.backoff_ms),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        return Ok(RunnerConfig::default());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let config: RunnerConfig =
        toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(config)
}
