//! `tests.run`: run the project's test command.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde_json::{Map, Value};
use tracing::info;

use super::ToolContext;
use crate::envelope::Envelope;
use crate::process::run_to_envelope;
use crate::registry::{ParamType, Tool, ToolSpec};

pub struct RunTests {
    ctx: Arc<ToolContext>,
}

impl RunTests {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    /// Caller args, or the configured defaults when absent or empty.
    fn effective_args(&self, args: &Map<String, Value>) -> Vec<String> {
        let requested: Vec<String> = args
            .get("args")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if requested.is_empty() {
            self.ctx.config.tests.default_args.clone()
        } else {
            requested
        }
    }
}

impl Tool for RunTests {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("tests.run", "Run the project test suite")
            .optional("args", ParamType::StringArray)
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<Envelope> {
        let tests = &self.ctx.config.tests;
        let (program, fixed) = tests
            .command
            .split_first()
            .ok_or_else(|| anyhow!("tests.command is empty"))?;
        let mut argv = fixed.to_vec();
        argv.extend(self.effective_args(args));

        info!(program, args = ?argv, "running tests");
        Ok(run_to_envelope(
            program,
            &argv,
            &self.ctx.project_root,
            self.ctx.config.command_limits(),
        ))
    }
}
