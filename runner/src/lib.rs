//! Supervisor-driven delivery pipeline.
//!
//! A task moves through plan → draft-requirements → implement → verify →
//! publish, one step per iteration, with failed verification routing back to
//! implement. The pieces are kept apart so each can be tested alone:
//!
//! - **[`state`]** and **[`supervisor`]**: the task record and the pure
//!   status → step routing table.
//! - **[`steps`]**: step implementations; they touch the outside world only
//!   through a [`client::ToolClient`].
//! - **[`client`]**: JSON-RPC client for a remote tool server, plus an
//!   in-process client over a `tool_server` registry.
//! - **[`looping`]**: the orchestration loop with its budget and retry policy.

pub mod client;
pub mod config;
pub mod exit_codes;
pub mod logging;
pub mod looping;
pub mod state;
pub mod steps;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
