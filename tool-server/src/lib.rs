//! Tool-invocation server for the agent pipeline.
//!
//! Exposes a fixed catalog of side-effecting tools (file I/O, test runs,
//! version control, pull requests) over a JSON-RPC endpoint. The pieces are
//! layered leaf-first:
//!
//! - **[`envelope`]**: the `{ok, ...}` result every tool returns.
//! - **[`guard`]**: write confinement to allow-listed roots.
//! - **[`registry`]**: the [`registry::Tool`] trait, schema validation and
//!   fault isolation.
//! - **[`tools`]**: the concrete catalog, with [`process`] for child processes.
//! - **[`protocol`]** / **[`server`]**: JSON-RPC handling and HTTP routes.

pub mod config;
pub mod envelope;
pub mod guard;
pub mod logging;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod state;
pub mod tools;

pub use envelope::Envelope;
pub use registry::{Tool, ToolRegistry, ToolSpec};
