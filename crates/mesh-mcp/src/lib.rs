// SPDX-License-Identifier: MIT OR Apache-2.0
//! MCP (Model Context Protocol) stdio client.
//!
//! Speaks JSON-RPC 2.0 over the stdin/stdout of a spawned subprocess:
//! one message per line, auto-incrementing request ids, and a background
//! reader task that demultiplexes responses to the caller awaiting each
//! one. A supervisor loop restarts the subprocess with backoff if it
//! exits unexpectedly, up to a configured retry cap.

mod client;
mod config;
mod types;
mod wire;

pub use client::McpClient;
pub use config::McpConfig;
pub use types::{McpEvent, ToolCallMetadata, ToolCallResult, ToolInfo};
pub use wire::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
