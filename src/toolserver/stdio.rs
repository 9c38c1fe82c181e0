//! Stdio transport for subprocess tool servers.
//!
//! Spawns the server as a tokio child with piped stdin/stdout/stderr and
//! speaks line-delimited JSON-RPC over the pipes. Responses are routed back to
//! their callers through a pending-request map of oneshot channels, filled in
//! by a dedicated reader task.
//!
//! The child:
//! - Runs in its own process group (`process_group(0)`) for clean shutdown
//! - Has `kill_on_drop(true)` as a safety net
//! - Is killed via SIGKILL on the whole group when the session closes

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use super::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::error::ToolServerError;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// A live stdio connection to a subprocess tool server.
pub struct StdioTransport {
    server_id: String,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    next_id: AtomicU64,
    child_pid: Option<u32>,
    cancel: CancellationToken,
}

impl StdioTransport {
    /// Spawn the server process and start the reader tasks.
    pub fn spawn(
        server_id: &str,
        command: &str,
        args: &[String],
    ) -> Result<Self, ToolServerError> {
        let mut child = Command::new(command)
            .args(args)
            .process_group(0)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolServerError::SpawnFailed {
                server_id: server_id.to_string(),
                message: e.to_string(),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| ToolServerError::SpawnFailed {
            server_id: server_id.to_string(),
            message: "failed to capture stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ToolServerError::SpawnFailed {
            server_id: server_id.to_string(),
            message: "failed to capture stdout".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| ToolServerError::SpawnFailed {
            server_id: server_id.to_string(),
            message: "failed to capture stderr".to_string(),
        })?;

        let child_pid = child.id();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        // Reader task: route responses to their waiting callers. Messages
        // without an id (server notifications/logs) are traced and dropped.
        {
            let pending = pending.clone();
            let cancel = cancel.clone();
            let server_id = server_id.to_string();
            tokio::spawn(async move {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();
                loop {
                    tokio::select! {
                        line = lines.next_line() => {
                            let Ok(Some(line)) = line else { break };
                            if line.trim().is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<JsonRpcResponse>(&line) {
                                Ok(response) => {
                                    let Some(id) = response.id.as_ref().and_then(|v| v.as_u64()) else {
                                        tracing::debug!(server = %server_id, "tool server notification: {line}");
                                        continue;
                                    };
                                    let mut pending = pending.lock().await;
                                    if let Some(waiter) = pending.remove(&id) {
                                        let _ = waiter.send(response);
                                    } else {
                                        tracing::warn!(server = %server_id, id, "response for unknown request id");
                                    }
                                }
                                Err(e) => {
                                    tracing::debug!(server = %server_id, "unparseable tool server output ({e}): {line}");
                                }
                            }
                        }
                        _ = cancel.cancelled() => break,
                    }
                }
                // EOF or cancellation: drop all waiters so in-flight requests
                // fail immediately instead of running out their timeout.
                pending.lock().await.clear();
            });
        }

        // Stderr reader: the server's own logging, kept at debug level.
        {
            let server_id = server_id.to_string();
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %server_id, "[stderr] {line}");
                }
            });
        }

        // Monitor task: reap the child when it exits on its own.
        {
            let server_id = server_id.to_string();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    status = child.wait() => {
                        tracing::warn!(server = %server_id, ?status, "tool server process exited");
                    }
                    _ = cancel.cancelled() => {
                        // Kill the entire process group via SIGKILL, then reap.
                        if let Some(pid) = child.id() {
                            let pgid = nix::unistd::Pid::from_raw(pid as i32);
                            let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL);
                        }
                        let _ = child.wait().await;
                    }
                }
            });
        }

        Ok(Self {
            server_id: server_id.to_string(),
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            child_pid,
            cancel,
        })
    }

    /// Send a request and wait for its response, with a per-request timeout.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, ToolServerError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        if let Err(e) = self.write_line(&serde_json::to_string(&request).expect("request serializes")).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                Err(ToolServerError::ProtocolError {
                    server_id: self.server_id.clone(),
                    message: format!("response channel closed for method {method}"),
                })
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ToolServerError::RequestTimeout {
                    server_id: self.server_id.clone(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, notification: &JsonRpcNotification) -> Result<(), ToolServerError> {
        self.write_line(&serde_json::to_string(notification).expect("notification serializes"))
            .await
    }

    async fn write_line(&self, line: &str) -> Result<(), ToolServerError> {
        let mut stdin = self.stdin.lock().await;
        let framed = format!("{line}\n");
        stdin
            .write_all(framed.as_bytes())
            .await
            .map_err(|e| ToolServerError::ProtocolError {
                server_id: self.server_id.clone(),
                message: format!("stdin write failed: {e}"),
            })?;
        stdin.flush().await.map_err(|e| ToolServerError::ProtocolError {
            server_id: self.server_id.clone(),
            message: format!("stdin flush failed: {e}"),
        })
    }

    /// Terminate the subprocess and its process group.
    pub fn close(&self) {
        self.cancel.cancel();
        tracing::info!(server = %self.server_id, pid = ?self.child_pid, "stdio tool server closed");
    }
}
