//! Normalized result envelope returned by every tool invocation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error tag used when a response does not carry the mandatory `ok` flag.
pub const MISSING_OK: &str = "missing_ok";

/// `{ok: bool, ...tool-specific fields}`.
///
/// Tool-specific fields are kept as a JSON map and flattened on the wire, so
/// an envelope serializes to a single flat object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    pub fn new(ok: bool) -> Self {
        Self {
            ok,
            fields: Map::new(),
        }
    }

    /// Successful envelope with no extra fields.
    pub fn success() -> Self {
        Self::new(true)
    }

    /// Failed envelope tagged with `error`.
    pub fn failure(error: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("error".to_string(), Value::String(error.into()));
        Self { ok: false, fields }
    }

    /// Attach a field, replacing any previous value under `key`.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// The `error` tag, if this envelope carries one.
    pub fn error(&self) -> Option<&str> {
        self.fields.get("error").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Interpret an arbitrary JSON response as an envelope.
    ///
    /// Anything that is not an object with a boolean `ok` is a protocol
    /// violation and is reported as a failure; the raw payload is kept under
    /// `raw` for inspection.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => match map.remove("ok") {
                Some(Value::Bool(ok)) => Self { ok, fields: map },
                other => {
                    if let Some(other) = other {
                        map.insert("ok".to_string(), other);
                    }
                    Self::failure(MISSING_OK).with("raw", Value::Object(map))
                }
            },
            other => Self::failure(MISSING_OK).with("raw", other),
        }
    }

    pub fn into_value(self) -> Value {
        let mut map = self.fields;
        map.insert("ok".to_string(), Value::Bool(self.ok));
        Value::Object(map)
    }
}
