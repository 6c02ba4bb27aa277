// SPDX-License-Identifier: MIT OR Apache-2.0
//! The MCP client: subprocess lifecycle, JSON-RPC demultiplexing, tool
//! invocation, heartbeat, and reconnect-with-backoff.

use crate::config::McpConfig;
use crate::types::{McpEvent, ToolCallMetadata, ToolCallResult, ToolInfo};
use crate::wire::{JsonRpcRequest, JsonRpcResponse};
use chrono::Utc;
use mesh_error::{ErrorCode, MeshError};
use mesh_resilience::{compute_delay, CancellationToken};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, oneshot, Mutex as AsyncMutex, RwLock};
use tracing::{debug, warn};

type PendingMap = StdMutex<HashMap<u64, oneshot::Sender<Result<JsonRpcResponse, MeshError>>>>;

struct Shared {
    pending: PendingMap,
    next_id: AtomicU64,
    tool_cache: RwLock<HashMap<String, ToolInfo>>,
    stdin: AsyncMutex<Option<ChildStdin>>,
    events: broadcast::Sender<McpEvent>,
    shutdown: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        let (events, _rx) = broadcast::channel(32);
        Self {
            pending: StdMutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            tool_cache: RwLock::new(HashMap::new()),
            stdin: AsyncMutex::new(None),
            events,
            shutdown: AtomicBool::new(false),
        }
    }

    fn reject_all_pending(&self, err: &MeshError) {
        let mut pending = self.pending.lock().expect("mcp pending lock poisoned");
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(MeshError::new(err.code, err.message.clone())));
        }
    }
}

/// A stdio JSON-RPC client managing a single MCP server subprocess.
#[derive(Clone)]
pub struct McpClient {
    config: Arc<McpConfig>,
    shared: Arc<Shared>,
}

impl McpClient {
    /// Build a client for `config`. The subprocess is not spawned until
    /// [`McpClient::open`] is called.
    pub fn new(config: McpConfig) -> Self {
        Self { config: Arc::new(config), shared: Arc::new(Shared::new()) }
    }

    /// Subscribe to connection lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<McpEvent> {
        self.shared.events.subscribe()
    }

    /// Spawn the subprocess, perform the `initialize` handshake, and start
    /// the background reader and heartbeat tasks.
    pub async fn open(&self) -> Result<Value, MeshError> {
        self.shared.shutdown.store(false, Ordering::SeqCst);
        let (child, stdout) = spawn_process(&self.config).await?;
        *self.shared.stdin.lock().await = None;

        let server_info = self.handshake_and_spawn_reader(child, stdout).await?;
        self.spawn_heartbeat();
        Ok(server_info)
    }

    /// Mark the client as shutting down, reject all pending calls, and kill
    /// the subprocess.
    pub async fn close(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared
            .reject_all_pending(&MeshError::new(ErrorCode::McpConnectionFailed, "mcp client closed"));
        if let Some(mut stdin) = self.shared.stdin.lock().await.take() {
            let _ = stdin.shutdown().await;
        }
    }

    /// Fetch the tool list and refresh the cache.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, MeshError> {
        let result = self.request("tools/list", None, self.config.call_timeout).await?;
        let tools: Vec<ToolInfo> = serde_json::from_value(
            result.get("tools").cloned().unwrap_or(Value::Array(vec![])),
        )
        .map_err(|err| MeshError::new(ErrorCode::ProtocolViolation, err.to_string()).with_source(err))?;

        let mut cache = self.shared.tool_cache.write().await;
        cache.clear();
        for tool in &tools {
            cache.insert(tool.name.clone(), tool.clone());
        }
        Ok(tools)
    }

    /// Look up a tool's schema, refreshing the cache once on a miss.
    pub async fn get_tool_schema(&self, name: &str) -> Result<ToolInfo, MeshError> {
        if let Some(tool) = self.shared.tool_cache.read().await.get(name).cloned() {
            return Ok(tool);
        }
        self.list_tools().await?;
        self.shared
            .tool_cache
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| {
                MeshError::new(ErrorCode::McpToolNotFound, format!("no such tool: {name}"))
                    .with_context("tool", name)
            })
    }

    /// Invoke `name` with `input`, racing the response against `timeout`
    /// and `cancel`.
    pub async fn execute_tool(
        &self,
        name: &str,
        input: Value,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ToolCallResult, MeshError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let params = json!({ "name": name, "arguments": input });
        let request = JsonRpcRequest::new(id, "tools/call", Some(params));

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().expect("mcp pending lock poisoned").insert(id, tx);

        if let Err(err) = self.send_request(&request).await {
            self.shared.pending.lock().expect("mcp pending lock poisoned").remove(&id);
            return Err(err);
        }

        let response = tokio::select! {
            res = rx => res.map_err(|_| {
                MeshError::new(ErrorCode::McpConnectionFailed, "mcp connection closed before response")
            })?,
            _ = tokio::time::sleep(timeout) => {
                self.shared.pending.lock().expect("mcp pending lock poisoned").remove(&id);
                return Err(MeshError::new(ErrorCode::Timeout, "mcp tool call timed out")
                    .with_context("tool", name)
                    .retryable(false));
            }
            _ = cancel.cancelled() => {
                self.shared.pending.lock().expect("mcp pending lock poisoned").remove(&id);
                return Err(MeshError::new(ErrorCode::Cancelled, "mcp tool call cancelled")
                    .with_context("tool", name));
            }
        }?;

        if let Some(error) = response.error {
            return Err(MeshError::new(ErrorCode::ProtocolViolation, error.message)
                .with_context("code", error.code)
                .with_context("method", "tools/call")
                .retryable(false));
        }

        let result = response.result.unwrap_or(Value::Null);
        let content = result.get("content").and_then(|c| c.as_array()).cloned().unwrap_or_default();
        Ok(ToolCallResult {
            success: true,
            content,
            metadata: ToolCallMetadata { tool_name: name.to_string(), request_id: id, timestamp: Utc::now() },
        })
    }

    async fn request(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value, MeshError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().expect("mcp pending lock poisoned").insert(id, tx);

        if let Err(err) = self.send_request(&request).await {
            self.shared.pending.lock().expect("mcp pending lock poisoned").remove(&id);
            return Err(err);
        }

        let response = tokio::time::timeout(timeout, rx)
            .await
            .map_err(|_| MeshError::new(ErrorCode::Timeout, format!("mcp {method} timed out")))?
            .map_err(|_| MeshError::new(ErrorCode::McpConnectionFailed, "mcp connection closed"))??;

        if let Some(error) = response.error {
            return Err(MeshError::new(ErrorCode::ProtocolViolation, error.message)
                .with_context("code", error.code)
                .with_context("method", method)
                .retryable(false));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn send_request(&self, request: &JsonRpcRequest) -> Result<(), MeshError> {
        let mut line = serde_json::to_string(request)
            .map_err(|err| MeshError::new(ErrorCode::ProtocolViolation, err.to_string()).with_source(err))?;
        line.push('\n');

        let mut guard = self.shared.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| MeshError::new(ErrorCode::McpConnectionFailed, "mcp subprocess not connected"))?;
        futures_write(stdin, &line).await
    }

    async fn handshake_and_spawn_reader(
        &self,
        mut child: Child,
        stdout: tokio::process::ChildStdout,
    ) -> Result<Value, MeshError> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MeshError::new(ErrorCode::McpConnectionFailed, "mcp stdin unavailable"))?;
        *self.shared.stdin.lock().await = Some(stdin);

        let this = self.clone();
        tokio::spawn(async move {
            this.run_reader(child, stdout).await;
        });

        let init_params = json!({
            "protocolVersion": self.config.protocol_version,
            "capabilities": {},
            "clientInfo": { "name": self.config.client_name, "version": self.config.client_version },
        });
        self.request("initialize", Some(init_params), self.config.handshake_timeout).await
    }

    async fn run_reader(&self, mut child: Child, stdout: tokio::process::ChildStdout) {
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let s = line.trim_end();
                            if !s.is_empty() {
                                warn!(target: "mesh.mcp.stderr", "{s}");
                            }
                        }
                    }
                }
            });
        }

        let mut reader = BufReader::new(stdout);
        let mut buf = String::new();
        loop {
            buf.clear();
            match reader.read_line(&mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = buf.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JsonRpcResponse>(line) {
                        Ok(response) => {
                            if let Some(id) = response.id {
                                if let Some(tx) =
                                    self.shared.pending.lock().expect("mcp pending lock poisoned").remove(&id)
                                {
                                    let _ = tx.send(Ok(response));
                                }
                            }
                        }
                        Err(err) => {
                            warn!(target: "mesh.mcp", error = %err, "dropping malformed mcp line");
                        }
                    }
                }
                Err(err) => {
                    warn!(target: "mesh.mcp", error = %err, "mcp stdout read error");
                    break;
                }
            }
        }

        let _ = child.kill().await;
        let _ = child.wait().await;
        self.handle_disconnect().await;
    }

    async fn handle_disconnect(&self) {
        *self.shared.stdin.lock().await = None;
        let disconnect_err = MeshError::new(ErrorCode::McpConnectionFailed, "mcp subprocess disconnected");
        self.shared.reject_all_pending(&disconnect_err);

        if self.shared.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let _ = self
            .shared
            .events
            .send(McpEvent::Disconnected { reason: "subprocess exited".to_string() });

        let mut attempt: u32 = 0;
        loop {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                return;
            }
            if attempt >= self.config.max_reconnect_retries {
                let _ = self.shared.events.send(McpEvent::TerminalDisconnect);
                return;
            }
            let _ = self.shared.events.send(McpEvent::Reconnecting { attempt: attempt + 1 });
            let delay = compute_delay(&self.config.reconnect_backoff, attempt);
            tokio::time::sleep(delay).await;

            match spawn_process(&self.config).await {
                Ok((child, stdout)) => match self.handshake_and_spawn_reader(child, stdout).await {
                    Ok(_server_info) => {
                        let _ = self.shared.events.send(McpEvent::Reconnected);
                        self.spawn_heartbeat();
                        return;
                    }
                    Err(err) => {
                        warn!(target: "mesh.mcp", error = %err, attempt, "mcp reconnect handshake failed");
                    }
                },
                Err(err) => {
                    warn!(target: "mesh.mcp", error = %err, attempt, "mcp reconnect spawn failed");
                }
            }
            attempt += 1;
        }
    }

    fn spawn_heartbeat(&self) {
        let this = self.clone();
        let interval = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if this.shared.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(err) = this.list_tools().await {
                    debug!(target: "mesh.mcp", error = %err, "heartbeat probe failed");
                }
            }
        });
    }
}

async fn futures_write(stdin: &mut ChildStdin, line: &str) -> Result<(), MeshError> {
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|err| MeshError::new(ErrorCode::McpConnectionFailed, err.to_string()).with_source(err))?;
    stdin
        .flush()
        .await
        .map_err(|err| MeshError::new(ErrorCode::McpConnectionFailed, err.to_string()).with_source(err))
}

async fn spawn_process(config: &McpConfig) -> Result<(Child, tokio::process::ChildStdout), MeshError> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args).stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Some(cwd) = &config.cwd {
        cmd.current_dir(cwd);
    }
    for (k, v) in &config.env {
        cmd.env(k, v);
    }

    let mut child = cmd
        .spawn()
        .map_err(|err| MeshError::new(ErrorCode::McpConnectionFailed, err.to_string()).with_source(err))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| MeshError::new(ErrorCode::McpConnectionFailed, "mcp stdout unavailable"))?;
    Ok((child, stdout))
}
