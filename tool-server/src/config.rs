//! Tool server configuration (`tool-server.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::process::CommandLimits;

/// Server configuration (TOML).
///
/// Missing fields default to values suitable for a local checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,

    /// Directory all tool paths and commands are relative to.
    pub project_root: PathBuf,

    /// Directories (relative to `project_root`) that `fs.write` may touch.
    pub writable_roots: Vec<String>,

    /// Wall-clock limit for every spawned command.
    pub command_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,

    pub tests: TestsConfig,
    pub vcs: VcsConfig,
    pub github: GithubConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestsConfig {
    /// Test runner program and fixed leading arguments (e.g. `["pytest"]`).
    pub command: Vec<String>,
    /// Arguments used when a `tests.run` call passes none.
    pub default_args: Vec<String>,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            command: vec!["pytest".to_string()],
            default_args: [
                "-q",
                "--maxfail=1",
                "--disable-warnings",
                "--cov=src",
                "--cov-report=term-missing",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VcsConfig {
    /// Version-control program and fixed leading arguments (normally `["git"]`).
    pub command: Vec<String>,
    pub default_remote: String,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            command: vec!["git".to_string()],
            default_remote: "origin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GithubConfig {
    pub api_base: String,
    /// Environment variable holding the bearer token for `pr.create`.
    pub token_env: String,
    pub request_timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3333,
            project_root: PathBuf::from("."),
            writable_roots: vec!["src".to_string(), "tests".to_string(), "docs".to_string()],
            command_timeout_secs: 10 * 60,
            output_limit_bytes: 200_000,
            tests: TestsConfig::default(),
            vcs: VcsConfig::default(),
            github: GithubConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.writable_roots.iter().any(|root| root.trim().is_empty()) {
            return Err(anyhow!("writable_roots entries must be non-empty"));
        }
        if self.tests.command.is_empty() || self.tests.command[0].trim().is_empty() {
            return Err(anyhow!("tests.command must be a non-empty array"));
        }
        if self.vcs.command.is_empty() || self.vcs.command[0].trim().is_empty() {
            return Err(anyhow!("vcs.command must be a non-empty array"));
        }
        if self.github.token_env.trim().is_empty() {
            return Err(anyhow!("github.token_env must be set"));
        }
        if self.github.request_timeout_secs == 0 {
            return Err(anyhow!("github.request_timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn command_limits(&self) -> CommandLimits {
        CommandLimits {
            timeout: Duration::from_secs(self.command_timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ServerConfig::default()`.
pub fn load_config(path: &Path) -> Result<ServerConfig> {
    if !path.exists() {
        let cfg = ServerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ServerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tool-server.toml");
        fs::write(
            &path,
            "port = 4000\n\n[tests]\ncommand = [\"cargo\", \"test\"]\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.tests.command, vec!["cargo", "test"]);
        assert_eq!(cfg.tests.default_args, TestsConfig::default().default_args);
        assert_eq!(cfg.github.token_env, "GITHUB_TOKEN");
    }

    #[test]
    fn rejects_zero_timeout() {
        let cfg = ServerConfig {
            command_timeout_secs: 0,
            ..ServerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_test_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tool-server.toml");
        fs::write(&path, "[tests]\ncommand = []\n").expect("write");
        let err = load_config(&path).expect_err("should reject");
        assert!(err.to_string().contains("tests.command"));
    }
}
