// SPDX-License-Identifier: MIT OR Apache-2.0
//! Public request/response shapes for MCP tool invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool advertised by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Metadata attached to a successful [`ToolCallResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallMetadata {
    pub tool_name: String,
    pub request_id: u64,
    pub timestamp: DateTime<Utc>,
}

/// The result of a successful `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub success: bool,
    #[serde(default)]
    pub content: Vec<Value>,
    pub metadata: ToolCallMetadata,
}

/// Events broadcast to subscribers as the connection's lifecycle changes.
#[derive(Debug, Clone)]
pub enum McpEvent {
    /// The subprocess connection was lost; a reconnect attempt will follow
    /// unless the client has been closed.
    Disconnected { reason: String },
    /// A reconnect attempt is about to start.
    Reconnecting { attempt: u32 },
    /// A reconnect attempt succeeded.
    Reconnected,
    /// Reconnect attempts were exhausted; the client is permanently
    /// disconnected until `open()` is called again.
    TerminalDisconnect,
}
