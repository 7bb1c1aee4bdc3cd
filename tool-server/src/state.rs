//! Shared application state for the HTTP server.

use std::sync::Arc;

use crate::protocol::Manifest;
use crate::registry::ToolRegistry;

/// Shared state accessible from all request handlers.
///
/// Both parts are immutable after startup; requests share nothing else
/// in-process.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    pub manifest: Arc<Manifest>,
}

impl AppState {
    pub fn new(registry: ToolRegistry) -> Self {
        let manifest = Manifest::from_registry(
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            &registry,
        );
        Self {
            registry: Arc::new(registry),
            manifest: Arc::new(manifest),
        }
    }
}
