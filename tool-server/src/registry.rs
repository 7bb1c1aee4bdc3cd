//! Tool registry and invoker.
//!
//! Tools are registered once at startup and looked up by name. Every
//! invocation goes through [`ToolRegistry::dispatch`], which validates the
//! arguments against the tool's declared schema before the handler runs and
//! converts handler errors and panics into structured outcomes.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use jsonschema::{Draft, Validator};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use crate::envelope::Envelope;

/// Primitive argument types a tool schema may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Boolean,
    Integer,
    StringArray,
}

impl ParamType {
    fn schema(self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Integer => json!({"type": "integer"}),
            Self::StringArray => json!({"type": "array", "items": {"type": "string"}}),
        }
    }
}

/// Registry entry as published in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    /// Declare a required argument.
    pub fn required(self, name: &str, ty: ParamType) -> Self {
        self.param(name, ty, true)
    }

    /// Declare an optional argument.
    pub fn optional(self, name: &str, ty: ParamType) -> Self {
        self.param(name, ty, false)
    }

    fn param(mut self, name: &str, ty: ParamType, required: bool) -> Self {
        if let Some(props) = self
            .input_schema
            .get_mut("properties")
            .and_then(Value::as_object_mut)
        {
            props.insert(name.to_string(), ty.schema());
        }
        if required
            && let Some(list) = self
                .input_schema
                .get_mut("required")
                .and_then(Value::as_array_mut)
        {
            list.push(Value::String(name.to_string()));
        }
        self
    }
}

/// A named operation callable through the registry.
///
/// `invoke` only sees arguments that already passed schema validation. An
/// `Err` is reported to the caller as a tool fault; expected failures
/// (missing files, nonzero exits) belong in a failed [`Envelope`] instead.
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    fn invoke(&self, args: &Map<String, Value>) -> Result<Envelope>;
}

/// Outcome of a single dispatch, before it is flattened into an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Completed(Envelope),
    UnknownTool(String),
    InvalidArguments(Vec<String>),
    Faulted(String),
}

impl Dispatch {
    pub fn into_envelope(self) -> Envelope {
        match self {
            Self::Completed(env) => env,
            Self::UnknownTool(name) => Envelope::failure("unknown_tool").with("tool", name),
            Self::InvalidArguments(details) => {
                Envelope::failure("invalid_arguments").with("details", details)
            }
            Self::Faulted(message) => Envelope::failure("tool_fault").with("message", message),
        }
    }
}

struct Entry {
    spec: ToolSpec,
    validator: Validator,
    tool: Arc<dyn Tool>,
}

#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; its schema is compiled once here.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        let spec = tool.spec();
        if self.by_name.contains_key(&spec.name) {
            bail!("tool {} registered twice", spec.name);
        }
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&spec.input_schema)
            .with_context(|| format!("compile input schema for {}", spec.name))?;
        debug!(tool = %spec.name, "registered tool");
        self.by_name.insert(spec.name.clone(), self.entries.len());
        self.entries.push(Entry {
            spec,
            validator,
            tool: Arc::new(tool),
        });
        Ok(())
    }

    /// Registered specs in registration order.
    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.entries.iter().map(|entry| &entry.spec)
    }

    /// Invoke `name` and flatten the outcome into an envelope.
    pub fn invoke(&self, name: &str, args: &Value) -> Envelope {
        self.dispatch(name, args).into_envelope()
    }

    /// Validate and run a tool. Never panics on behalf of the handler.
    #[instrument(skip(self, args))]
    pub fn dispatch(&self, name: &str, args: &Value) -> Dispatch {
        let Some(&idx) = self.by_name.get(name) else {
            warn!("unknown tool");
            return Dispatch::UnknownTool(name.to_string());
        };
        let entry = &self.entries[idx];

        let empty = Value::Object(Map::new());
        let args = if args.is_null() { &empty } else { args };
        let problems: Vec<String> = entry
            .validator
            .iter_errors(args)
            .map(|err| err.to_string())
            .collect();
        if !problems.is_empty() {
            debug!(?problems, "rejected arguments");
            return Dispatch::InvalidArguments(problems);
        }
        // The schema root is `type: object`, so this only fails for a schema-less tool.
        let Some(map) = args.as_object() else {
            return Dispatch::InvalidArguments(vec!["arguments must be an object".to_string()]);
        };

        match panic::catch_unwind(AssertUnwindSafe(|| entry.tool.invoke(map))) {
            Ok(Ok(env)) => {
                debug!(ok = env.ok, "tool completed");
                Dispatch::Completed(env)
            }
            Ok(Err(err)) => {
                warn!(err = %format!("{err:#}"), "tool faulted");
                Dispatch::Faulted(format!("{err:#}"))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%message, "tool panicked");
                Dispatch::Faulted(message)
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}

/// Fetch a string argument the schema already declared.
pub fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .with_context(|| format!("missing string argument {key}"))
}
