//! JSON-RPC 2.0 handling for the `/mcp` endpoint, plus the manifest document.
//!
//! Protocol-level problems are always answered with JSON-RPC error objects;
//! the transport never sees a failure for a well-formed HTTP request.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::registry::{Dispatch, ToolRegistry, ToolSpec};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Tool handler faulted while running.
pub const SERVER_ERROR: i64 = -32000;

pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// JSON-RPC request object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

impl RpcRequest {
    pub fn new(id: impl Into<Value>, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: id.into(),
            method: method.to_string(),
            params,
        }
    }

    /// `tools/call` request for `tool` with `arguments`.
    pub fn tool_call(id: impl Into<Value>, tool: &str, arguments: Value) -> Self {
        Self::new(
            id,
            METHOD_TOOLS_CALL,
            Some(json!({"name": tool, "arguments": arguments})),
        )
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// JSON-RPC response object: exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Manifest document served on the well-known paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub tools: Vec<ToolSpec>,
}

impl Manifest {
    pub fn from_registry(name: &str, version: &str, registry: &ToolRegistry) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            tools: registry.specs().cloned().collect(),
        }
    }
}

/// Handle a raw request body: a single request object or a batch array.
///
/// Batch entries are handled independently and answered in order.
pub fn handle_body(registry: &ToolRegistry, body: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(body) {
        Ok(payload) => handle_payload(registry, payload),
        Err(err) => to_value(RpcResponse::error(
            Value::Null,
            PARSE_ERROR,
            format!("parse error: {err}"),
        )),
    }
}

pub fn handle_payload(registry: &ToolRegistry, payload: Value) -> Value {
    match payload {
        Value::Array(items) if items.is_empty() => to_value(RpcResponse::error(
            Value::Null,
            INVALID_REQUEST,
            "empty batch",
        )),
        Value::Array(items) => {
            debug!(batch = items.len(), "handling batch");
            Value::Array(
                items
                    .into_iter()
                    .map(|item| to_value(handle_entry(registry, item)))
                    .collect(),
            )
        }
        single => to_value(handle_entry(registry, single)),
    }
}

fn handle_entry(registry: &ToolRegistry, entry: Value) -> RpcResponse {
    let id = entry.get("id").cloned().unwrap_or(Value::Null);
    match serde_json::from_value::<RpcRequest>(entry) {
        Ok(request) => handle_request(registry, request),
        Err(err) => RpcResponse::error(id, INVALID_REQUEST, format!("invalid request: {err}")),
    }
}

#[instrument(skip_all, fields(method = %request.method))]
pub fn handle_request(registry: &ToolRegistry, request: RpcRequest) -> RpcResponse {
    let id = request.id;
    match request.method.as_str() {
        METHOD_TOOLS_LIST => {
            let tools: Vec<Value> = registry
                .specs()
                .map(|spec| {
                    json!({
                        "name": spec.name,
                        "description": spec.description,
                        "input_schema": spec.input_schema,
                    })
                })
                .collect();
            RpcResponse::result(id, json!({"tools": tools}))
        }
        METHOD_TOOLS_CALL => {
            let params = request.params.unwrap_or(Value::Null);
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return RpcResponse::error(id, METHOD_NOT_FOUND, "Unknown tool <missing name>");
            };
            let arguments = params
                .get("arguments")
                .or_else(|| params.get("args"))
                .cloned()
                .unwrap_or(Value::Null);
            match registry.dispatch(name, &arguments) {
                Dispatch::UnknownTool(name) => {
                    RpcResponse::error(id, METHOD_NOT_FOUND, format!("Unknown tool {name}"))
                }
                Dispatch::Faulted(message) => RpcResponse::error(id, SERVER_ERROR, message),
                outcome => RpcResponse::result(id, outcome.into_envelope().into_value()),
            }
        }
        other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("Unknown method {other}")),
    }
}

fn to_value(response: RpcResponse) -> Value {
    // Plain data with string keys; serialization cannot fail.
    serde_json::to_value(response).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::registry::{ParamType, Tool};
    use anyhow::{Result, anyhow};
    use serde_json::Map;

    struct Upper;

    impl Tool for Upper {
        fn spec(&self) -> ToolSpec {
            ToolSpec::new("text.upper", "Uppercase").required("text", ParamType::String)
        }

        fn invoke(&self, args: &Map<String, Value>) -> Result<Envelope> {
            let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
            Ok(Envelope::success().with("text", text.to_uppercase()))
        }
    }

    struct Faulty;

    impl Tool for Faulty {
        fn spec(&self) -> ToolSpec {
            ToolSpec::new("faulty", "Faults")
        }

        fn invoke(&self, _args: &Map<String, Value>) -> Result<Envelope> {
            Err(anyhow!("KeyError: path"))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Upper).expect("upper");
        registry.register(Faulty).expect("faulty");
        registry
    }

    #[test]
    fn tools_list_returns_schemas() {
        let resp = handle_payload(
            &registry(),
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        );
        assert_eq!(resp["id"], json!(1));
        assert_eq!(resp["result"]["tools"][0]["name"], json!("text.upper"));
        assert_eq!(
            resp["result"]["tools"][0]["input_schema"]["required"],
            json!(["text"])
        );
    }

    #[test]
    fn tools_call_returns_envelope() {
        let resp = handle_payload(
            &registry(),
            json!({"jsonrpc": "2.0", "id": "a", "method": "tools/call",
                   "params": {"name": "text.upper", "arguments": {"text": "hi"}}}),
        );
        assert_eq!(resp["id"], json!("a"));
        assert_eq!(resp["result"], json!({"ok": true, "text": "HI"}));
        assert!(resp.get("error").is_none());
    }

    #[test]
    fn legacy_args_key_is_accepted() {
        let resp = handle_payload(
            &registry(),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "text.upper", "args": {"text": "x"}}}),
        );
        assert_eq!(resp["result"]["text"], json!("X"));
    }

    #[test]
    fn unknown_method_is_rpc_error() {
        let resp = handle_payload(
            &registry(),
            json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"}),
        );
        assert_eq!(resp["error"]["code"], json!(METHOD_NOT_FOUND));
        assert!(resp.get("result").is_none());
    }

    #[test]
    fn handler_fault_is_rpc_error() {
        let resp = handle_payload(
            &registry(),
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
                   "params": {"name": "faulty", "arguments": {}}}),
        );
        assert_eq!(resp["error"]["code"], json!(SERVER_ERROR));
        assert_eq!(resp["error"]["message"], json!("KeyError: path"));
    }

    #[test]
    fn invalid_arguments_stay_in_result() {
        let resp = handle_payload(
            &registry(),
            json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call",
                   "params": {"name": "text.upper", "arguments": {}}}),
        );
        assert_eq!(resp["result"]["ok"], json!(false));
        assert_eq!(resp["result"]["error"], json!("invalid_arguments"));
    }

    #[test]
    fn batch_isolates_failures_and_keeps_order() {
        let resp = handle_payload(
            &registry(),
            json!([
                {"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                 "params": {"name": "text.upper", "arguments": {"text": "a"}}},
                {"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                 "params": {"name": "no.such.tool", "arguments": {}}},
                {"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                 "params": {"name": "text.upper", "arguments": {"text": "c"}}},
            ]),
        );
        let items = resp.as_array().expect("batch response");
        assert_eq!(items.len(), 3);
        let ids: Vec<_> = items.iter().map(|item| item["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(items[0]["result"]["text"], json!("A"));
        assert_eq!(items[1]["error"]["code"], json!(METHOD_NOT_FOUND));
        assert!(items[1].get("result").is_none());
        assert_eq!(items[2]["result"]["text"], json!("C"));
        assert!(items[0].get("error").is_none());
        assert!(items[2].get("error").is_none());
    }

    #[test]
    fn malformed_entry_in_batch_is_invalid_request() {
        let resp = handle_payload(&registry(), json!([42, {"id": 7, "method": "tools/list"}]));
        assert_eq!(resp[0]["error"]["code"], json!(INVALID_REQUEST));
        assert_eq!(resp[1]["id"], json!(7));
        assert!(resp[1]["result"]["tools"].is_array());
    }

    #[test]
    fn unparseable_body_is_parse_error() {
        let resp = handle_body(&registry(), b"{not json");
        assert_eq!(resp["error"]["code"], json!(PARSE_ERROR));
        assert_eq!(resp["id"], Value::Null);
    }

    #[test]
    fn empty_batch_is_invalid_request() {
        let resp = handle_payload(&registry(), json!([]));
        assert_eq!(resp["error"]["code"], json!(INVALID_REQUEST));
    }

    #[test]
    fn manifest_lists_registry() {
        let manifest = Manifest::from_registry("tool-server", "0.1.0", &registry());
        let names: Vec<_> = manifest.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["text.upper", "faulty"]);
    }
}
