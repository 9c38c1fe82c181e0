//! Streamable-HTTP transport for remote tool servers.
//!
//! Each JSON-RPC request is POSTed to the server endpoint. The server may
//! answer with a plain JSON body or with a short SSE stream whose `data:`
//! lines carry the JSON-RPC response; both shapes are handled. The session id
//! issued during `initialize` (the `Mcp-Session-Id` header) is echoed on every
//! subsequent request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;

use super::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::error::ToolServerError;

const SESSION_HEADER: &str = "Mcp-Session-Id";

/// A live streamable-HTTP connection to a remote tool server.
pub struct HttpTransport {
    server_id: String,
    http: reqwest::Client,
    url: String,
    bearer: Option<String>,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(server_id: &str, url: String, bearer: Option<String>) -> Self {
        Self {
            server_id: server_id.to_string(),
            http: reqwest::Client::new(),
            url,
            bearer,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Send a request and wait for its response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, ToolServerError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let mut builder = self
            .http
            .post(&self.url)
            .header("Accept", "application/json, text/event-stream")
            .json(&request)
            .timeout(timeout);

        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(session) = self.session_id.lock().await.as_ref() {
            builder = builder.header(SESSION_HEADER, session);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolServerError::RequestTimeout {
                    server_id: self.server_id.clone(),
                    timeout_secs: timeout.as_secs(),
                }
            } else {
                ToolServerError::ProtocolError {
                    server_id: self.server_id.clone(),
                    message: format!("request failed: {e}"),
                }
            }
        })?;

        let resp = resp.error_for_status().map_err(|e| ToolServerError::ProtocolError {
            server_id: self.server_id.clone(),
            message: format!("HTTP error: {e}"),
        })?;

        // The initialize response assigns the session id for the connection.
        if let Some(session) = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut guard = self.session_id.lock().await;
            if guard.as_deref() != Some(session) {
                *guard = Some(session.to_string());
            }
        }

        let is_event_stream = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);

        let body = resp.text().await.map_err(|e| ToolServerError::ProtocolError {
            server_id: self.server_id.clone(),
            message: format!("failed to read response body: {e}"),
        })?;

        let payload = if is_event_stream {
            extract_sse_response(&body, id).ok_or_else(|| ToolServerError::ProtocolError {
                server_id: self.server_id.clone(),
                message: format!("no JSON-RPC response for id {id} in event stream"),
            })?
        } else {
            body
        };

        serde_json::from_str(&payload).map_err(|e| ToolServerError::ProtocolError {
            server_id: self.server_id.clone(),
            message: format!("malformed JSON-RPC response: {e}"),
        })
    }

    /// Send a notification; the server acknowledges with an empty 2xx.
    pub async fn notify(&self, notification: &JsonRpcNotification) -> Result<(), ToolServerError> {
        let mut builder = self
            .http
            .post(&self.url)
            .header("Accept", "application/json, text/event-stream")
            .json(notification)
            .timeout(Duration::from_secs(10));

        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(session) = self.session_id.lock().await.as_ref() {
            builder = builder.header(SESSION_HEADER, session);
        }

        builder
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ToolServerError::ProtocolError {
                server_id: self.server_id.clone(),
                message: format!("notification failed: {e}"),
            })?;
        Ok(())
    }
}

/// Pull the JSON-RPC response with the matching id out of an SSE body.
///
/// The stream is already fully buffered at this point; each event's `data:`
/// line holds one JSON payload. Non-matching events (server-initiated
/// notifications) are skipped.
fn extract_sse_response(body: &str, id: u64) -> Option<String> {
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(data) {
            if value.get("id").and_then(|v| v.as_u64()) == Some(id) {
                return Some(data.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_sse_response_finds_matching_id() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"ok\":true}}\n\n";
        let payload = extract_sse_response(body, 7).unwrap();
        assert!(payload.contains("\"ok\":true"));
    }

    #[test]
    fn extract_sse_response_skips_other_events() {
        let body = concat!(
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{}}\n\n",
        );
        assert!(extract_sse_response(body, 3).is_some());
        assert!(extract_sse_response(body, 9).is_none());
    }
}
