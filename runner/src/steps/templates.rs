//! Built-in document templates.

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;

const PRD_TEMPLATE: &str = include_str!("templates/prd.md");
const APP_TEMPLATE: &str = include_str!("templates/app.py");
const TEST_APP_TEMPLATE: &str = include_str!("templates/test_app.py");

pub const PRD: &str = "prd";
pub const APP: &str = "app";
pub const TEST_APP: &str = "test_app";

/// Template engine wrapper around minijinja.
pub struct Templates {
    env: Environment<'static>,
}

/// Values every template can reference.
#[derive(Debug, Serialize)]
pub struct TicketContext<'a> {
    pub ticket: &'a str,
    pub goal: &'a str,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template(PRD, PRD_TEMPLATE)
            .context("load prd template")?;
        env.add_template(APP, APP_TEMPLATE)
            .context("load app template")?;
        env.add_template(TEST_APP, TEST_APP_TEMPLATE)
            .context("load test_app template")?;
        Ok(Self { env })
    }

    pub fn render(&self, name: &str, ctx: &TicketContext<'_>) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("lookup template {name}"))?;
        let mut rendered = template
            .render(ctx)
            .with_context(|| format!("render template {name}"))?;
        if !rendered.ends_with('\n') {
            rendered.push('\n');
        }
        Ok(rendered)
    }
}
