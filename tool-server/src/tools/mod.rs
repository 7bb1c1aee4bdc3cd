//! The built-in tool catalog.
//!
//! | name | module |
//! |---|---|
//! | `fs.read`, `fs.write` | [`fs`] |
//! | `tests.run` | [`tests_run`] |
//! | `vcs.branch`, `vcs.commit`, `vcs.push` | [`vcs`] |
//! | `pr.create`, `checks.wait` | [`pr`] |

pub mod fs;
pub mod pr;
pub mod tests_run;
pub mod vcs;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::ServerConfig;
use crate::guard::{PathGuard, resolve};
use crate::registry::ToolRegistry;

/// Shared, read-only context handed to every tool.
#[derive(Debug)]
pub struct ToolContext {
    pub project_root: PathBuf,
    pub guard: PathGuard,
    pub config: ServerConfig,
}

impl ToolContext {
    pub fn new(config: ServerConfig) -> Self {
        let project_root = resolve(&config.project_root);
        let guard = PathGuard::new(&project_root, config.writable_roots.as_slice());
        Self {
            project_root,
            guard,
            config,
        }
    }

    /// Join a tool-supplied path onto the project root.
    ///
    /// Absolute inputs replace the root, as `Path::join` does; the guard still
    /// judges the result.
    pub fn project_path(&self, relative: &str) -> PathBuf {
        self.project_root.join(Path::new(relative))
    }
}

/// Build the registry holding the whole catalog.
pub fn default_registry(config: ServerConfig) -> Result<ToolRegistry> {
    let ctx = Arc::new(ToolContext::new(config));
    info!(
        project_root = %ctx.project_root.display(),
        roots = ?ctx.guard.roots(),
        "building tool registry"
    );

    let mut registry = ToolRegistry::new();
    registry.register(fs::ReadFile::new(ctx.clone()))?;
    registry.register(fs::WriteFile::new(ctx.clone()))?;
    registry.register(tests_run::RunTests::new(ctx.clone()))?;
    registry.register(vcs::Branch::new(ctx.clone()))?;
    registry.register(vcs::Commit::new(ctx.clone()))?;
    registry.register(vcs::Push::new(ctx.clone()))?;
    registry.register(pr::CreatePullRequest::new(ctx.clone()))?;
    registry.register(pr::WaitForChecks)?;
    Ok(registry)
}
