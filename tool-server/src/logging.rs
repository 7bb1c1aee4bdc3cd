//! Tracing setup for the tool server.
//!
//! Reads `RUST_LOG`; defaults to `tool_server=info` so request handling and
//! tool outcomes are visible without configuration. Output goes to stderr.
//!
//! # Example
//! ```bash
//! RUST_LOG=tool_server=debug,tower_http=debug tool-server
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tool_server=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
