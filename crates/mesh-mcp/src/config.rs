// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration for spawning and supervising an MCP subprocess.

use mesh_resilience::{BackoffPolicy, RetryConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for an [`crate::McpClient`](crate::McpClient).
#[derive(Debug, Clone)]
pub struct McpConfig {
    /// Executable command to run.
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    /// Environment variables set for the process.
    pub env: BTreeMap<String, String>,
    /// Working directory for the process.
    pub cwd: Option<PathBuf>,
    /// `clientInfo.name` sent in `initialize`.
    pub client_name: String,
    /// `clientInfo.version` sent in `initialize`.
    pub client_version: String,
    /// `protocolVersion` sent in `initialize`.
    pub protocol_version: String,
    /// Timeout for the `initialize` handshake.
    pub handshake_timeout: Duration,
    /// Default timeout for `tools/call` invocations.
    pub call_timeout: Duration,
    /// How often the heartbeat probe (`tools/list`) fires.
    pub heartbeat_interval: Duration,
    /// Maximum reconnect attempts after an unexpected process exit.
    pub max_reconnect_retries: u32,
    /// Backoff policy driving the delay between reconnect attempts.
    pub reconnect_backoff: RetryConfig,
}

impl McpConfig {
    /// Build a config with the default 30s heartbeat interval for the
    /// given command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            client_name: "agent-mesh".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: "2024-11-05".to_string(),
            handshake_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            max_reconnect_retries: 5,
            reconnect_backoff: RetryConfig {
                max_retries: 5,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
                overall_timeout: Duration::from_secs(300),
                jitter_factor: 0.2,
                policy: BackoffPolicy::Exponential { multiplier: 2.0 },
            },
        }
    }
}
