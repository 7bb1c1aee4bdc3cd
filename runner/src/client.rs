//! Tool clients used by steps.
//!
//! Steps see only [`ToolClient`]. Every outcome, including transport and
//! protocol failures, comes back as an [`Envelope`]; a step never has to
//! handle a tool error as a Rust error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tool_server::protocol::{RpcRequest, RpcResponse};
use tool_server::{Envelope, ToolRegistry};
use tracing::{debug, warn};

/// Invokes a named tool with JSON arguments.
pub trait ToolClient {
    fn call(&self, tool: &str, args: Value) -> Envelope;
}

/// JSON-RPC client for a remote tool server.
pub struct HttpToolClient {
    endpoint: String,
    http: reqwest::blocking::Client,
    next_id: AtomicU64,
}

impl HttpToolClient {
    /// `base_url` is the server root; calls go to `{base_url}/mcp`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            endpoint: format!("{}/mcp", base_url.trim_end_matches('/')),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn exchange(&self, request: &RpcRequest) -> Envelope {
        let response = match self.http.post(&self.endpoint).json(request).send() {
            Ok(response) => response,
            Err(err) => {
                warn!(endpoint = %self.endpoint, err = %err, "tool server unreachable");
                return Envelope::failure("transport_error").with("message", err.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Envelope::failure("bad_response")
                .with("status", status.as_u16())
                .with("text", text);
        }

        let rpc: RpcResponse = match response.json() {
            Ok(rpc) => rpc,
            Err(err) => {
                return Envelope::failure("bad_response").with("message", err.to_string());
            }
        };
        into_envelope(rpc)
    }
}

impl ToolClient for HttpToolClient {
    fn call(&self, tool: &str, args: Value) -> Envelope {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(tool, id, "tool call");
        self.exchange(&RpcRequest::tool_call(id, tool, args))
    }
}

/// Map a JSON-RPC response to the envelope a step sees.
fn into_envelope(rpc: RpcResponse) -> Envelope {
    if let Some(err) = rpc.error {
        return Envelope::failure("rpc_error")
            .with("code", err.code)
            .with("message", err.message);
    }
    match rpc.result {
        Some(result) => Envelope::from_value(result),
        None => Envelope::failure("bad_response")
            .with("message", "response has neither result nor error"),
    }
}

/// In-process client that calls a registry directly.
pub struct LocalToolClient {
    registry: Arc<ToolRegistry>,
}

impl LocalToolClient {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }
}

impl ToolClient for LocalToolClient {
    fn call(&self, tool: &str, args: Value) -> Envelope {
        self.registry.invoke(tool, &args)
    }
}
