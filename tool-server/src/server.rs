//! HTTP routes for the tool server.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::envelope::Envelope;
use crate::protocol::{self, Manifest, RpcResponse, SERVER_ERROR};
use crate::registry::ToolRegistry;
use crate::state::AppState;
use crate::tools::default_registry;

pub const MANIFEST_PATH: &str = "/.well-known/mcp/manifest.json";
pub const LEGACY_MANIFEST_PATH: &str = "/.well-known/manifest.json";

/// Build the full router around `registry`.
pub fn router(registry: ToolRegistry) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health))
        .route(MANIFEST_PATH, get(manifest).post(manifest))
        .route(LEGACY_MANIFEST_PATH, get(manifest).post(manifest))
        .route(
            "/.well-known/oauth-authorization-server",
            get(oauth_authorization_server),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(oauth_protected_resource),
        )
        .route("/register", post(register))
        .route("/mcp", post(rpc))
        .route("/tools/{name}", post(call_tool))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(registry))
}

/// Build the catalog from `config` and serve until the process is stopped.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .with_context(|| format!("parse bind address {}:{}", config.bind, config.port))?;
    let registry = default_registry(config)?;
    let app = router(registry);

    info!(addr = %addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve http")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(err = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn health() -> Json<Value> {
    Json(json!({"ok": true}))
}

async fn manifest(State(state): State<AppState>) -> Json<Manifest> {
    Json(state.manifest.as_ref().clone())
}

/// Placeholder metadata for clients that check for OAuth support.
async fn oauth_authorization_server() -> Json<Value> {
    Json(json!({
        "issuer": "https://example.com",
        "authorization_endpoint": "",
        "token_endpoint": "",
        "response_types_supported": [],
        "grant_types_supported": [],
        "code_challenge_methods_supported": [],
    }))
}

async fn oauth_protected_resource() -> Json<Value> {
    Json(json!({"ok": true, "auth": "none"}))
}

async fn register() -> Json<Value> {
    Json(json!({"client_id": "dummy", "client_secret": "dummy"}))
}

/// POST /mcp - single or batched JSON-RPC requests.
async fn rpc(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let registry = state.registry.clone();
    match tokio::task::spawn_blocking(move || protocol::handle_body(&registry, &body)).await {
        Ok(value) => Json(value),
        Err(err) => {
            error!(err = %err, "rpc worker failed");
            let resp = RpcResponse::error(Value::Null, SERVER_ERROR, err.to_string());
            Json(serde_json::to_value(resp).unwrap_or(Value::Null))
        }
    }
}

/// POST /tools/{name} - call one tool with the body as its arguments.
async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Json<Value> {
    let args: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(args) => args,
            Err(err) => {
                let env = Envelope::failure("invalid_json").with("message", err.to_string());
                return Json(env.into_value());
            }
        }
    };

    let registry = state.registry.clone();
    let env = tokio::task::spawn_blocking(move || registry.invoke(&name, &args))
        .await
        .unwrap_or_else(|err| {
            error!(err = %err, "tool worker failed");
            Envelope::failure("tool_fault").with("message", err.to_string())
        });
    Json(env.into_value())
}
