//! Tool-server lifecycle management.
//!
//! [`ToolServerManager`] owns the process-wide sessions to external
//! tool-providing servers (browser automation over a stdio subprocess, web
//! search over streamable HTTP). It is initialized once at service startup and
//! torn down once at shutdown:
//!
//! - Startup walks the server specs in order. A server that fails to connect
//!   or hand-shake is marked `Degraded` and logged -- it never aborts startup
//!   of the whole system.
//! - Shutdown walks servers in reverse-of-startup order, attempting close on
//!   each regardless of earlier failures. All failures are logged, none are
//!   re-raised, so resources are released even under partial failure.
//!
//! Consumers never touch connection handles; they read descriptor snapshots
//! via [`ToolServerManager::current_tools`] and invoke served tools through
//! [`ToolServerManager::call_tool`].

pub mod http;
pub mod protocol;
pub mod stdio;

use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use crate::config::AppConfig;
use crate::error::ToolServerError;
use crate::tools::ToolDescriptor;
use protocol::{initialize_params, JsonRpcNotification};

/// Well-known server id for the browser-automation server.
pub const BROWSER_SERVER: &str = "browser";
/// Well-known server id for the web-search server.
pub const SEARCH_SERVER: &str = "search";

/// Time allowed for connect + initialize + tools/list per server. The stdio
/// server is an `npx` download on first run, hence the generous ceiling.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Per tool-call ceiling (browser round-trips can be slow).
const CALL_TIMEOUT: Duration = Duration::from_secs(180);

/// Health of a tool-server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerHealth {
    Starting,
    Ready,
    Degraded,
    Closed,
}

impl std::fmt::Display for ServerHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerHealth::Starting => "starting",
            ServerHealth::Ready => "ready",
            ServerHealth::Degraded => "degraded",
            ServerHealth::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// How to reach a tool server.
#[derive(Debug, Clone)]
pub enum ServerSpec {
    Stdio {
        id: String,
        command: String,
        args: Vec<String>,
    },
    StreamableHttp {
        id: String,
        url: String,
        bearer: Option<String>,
    },
}

impl ServerSpec {
    pub fn id(&self) -> &str {
        match self {
            ServerSpec::Stdio { id, .. } => id,
            ServerSpec::StreamableHttp { id, .. } => id,
        }
    }
}

enum Transport {
    Stdio(stdio::StdioTransport),
    Http(http::HttpTransport),
}

impl Transport {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<protocol::JsonRpcResponse, ToolServerError> {
        match self {
            Transport::Stdio(t) => t.request(method, params, timeout).await,
            Transport::Http(t) => t.request(method, params, timeout).await,
        }
    }

    async fn notify(&self, notification: &JsonRpcNotification) -> Result<(), ToolServerError> {
        match self {
            Transport::Stdio(t) => t.notify(notification).await,
            Transport::Http(t) => t.notify(notification).await,
        }
    }
}

/// One managed server session. The transport and descriptor list are written
/// only during startup; afterwards requests only read them. Health is the one
/// field shutdown mutates, kept behind a std mutex.
struct ServerEntry {
    id: String,
    transport: Option<Transport>,
    tools: Vec<ToolDescriptor>,
    health: Mutex<ServerHealth>,
}

/// Process-wide owner of all tool-server sessions.
pub struct ToolServerManager {
    /// Entries in startup order; shutdown walks them in reverse.
    entries: Vec<ServerEntry>,
}

impl ToolServerManager {
    /// Connect to every configured server, degrading (never failing) on error.
    pub async fn start(specs: Vec<ServerSpec>) -> Self {
        let mut entries = Vec::with_capacity(specs.len());

        for spec in specs {
            let id = spec.id().to_string();
            tracing::info!(server = %id, "starting tool server");

            match tokio::time::timeout(STARTUP_TIMEOUT, connect(&spec)).await {
                Ok(Ok((transport, tools))) => {
                    tracing::info!(server = %id, tools = tools.len(), "tool server ready");
                    entries.push(ServerEntry {
                        id,
                        transport: Some(transport),
                        tools,
                        health: Mutex::new(ServerHealth::Ready),
                    });
                }
                Ok(Err(e)) => {
                    tracing::warn!(server = %id, "tool server unavailable: {e}");
                    entries.push(ServerEntry {
                        id,
                        transport: None,
                        tools: Vec::new(),
                        health: Mutex::new(ServerHealth::Degraded),
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        server = %id,
                        timeout_secs = STARTUP_TIMEOUT.as_secs(),
                        "tool server startup timed out"
                    );
                    entries.push(ServerEntry {
                        id,
                        transport: None,
                        tools: Vec::new(),
                        health: Mutex::new(ServerHealth::Degraded),
                    });
                }
            }
        }

        Self { entries }
    }

    /// Build the standard server set from configuration.
    ///
    /// The search server is cloud-hosted and needs the Z.ai credential; when
    /// the credential is absent the spec is skipped entirely (the manager then
    /// reports the server as degraded), rather than failing startup.
    pub fn default_specs(config: &AppConfig) -> Vec<ServerSpec> {
        let mut specs = vec![ServerSpec::Stdio {
            id: BROWSER_SERVER.to_string(),
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "chrome-devtools-mcp@latest".to_string()],
        }];

        match &config.zai_api_key {
            Some(key) => specs.push(ServerSpec::StreamableHttp {
                id: SEARCH_SERVER.to_string(),
                url: "https://api.z.ai/api/mcp/web_search_prime/mcp".to_string(),
                bearer: Some(key.clone()),
            }),
            None => {
                tracing::warn!("ZAI_API_KEY absent, web search tool server disabled");
            }
        }

        specs
    }

    /// Snapshot of a server's advertised tools. Empty when the server is
    /// unknown, degraded, or closed.
    pub fn current_tools(&self, server_id: &str) -> Vec<ToolDescriptor> {
        self.entries
            .iter()
            .find(|e| e.id == server_id)
            .filter(|e| *e.health.lock().unwrap() == ServerHealth::Ready)
            .map(|e| e.tools.clone())
            .unwrap_or_default()
    }

    /// Health and tool count per managed server (for /health).
    pub fn health_report(&self) -> Vec<(String, ServerHealth, usize)> {
        self.entries
            .iter()
            .map(|e| (e.id.clone(), *e.health.lock().unwrap(), e.tools.len()))
            .collect()
    }

    /// Invoke a served tool. The flattened result string goes back into the
    /// calling agent's reasoning loop.
    pub async fn call_tool(
        &self,
        server_id: &str,
        name: &str,
        arguments: Value,
    ) -> Result<String, ToolServerError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.id == server_id)
            .ok_or_else(|| ToolServerError::NotAvailable {
                server_id: server_id.to_string(),
                state: "unknown".to_string(),
            })?;

        let health = *entry.health.lock().unwrap();
        let transport = match (&entry.transport, health) {
            (Some(t), ServerHealth::Ready) => t,
            _ => {
                return Err(ToolServerError::NotAvailable {
                    server_id: server_id.to_string(),
                    state: health.to_string(),
                });
            }
        };

        let response = transport
            .request(
                "tools/call",
                Some(protocol::tools_call_params(name, arguments)),
                CALL_TIMEOUT,
            )
            .await?;
        let result = protocol::expect_result(server_id, response)?;
        Ok(protocol::flatten_tool_result(&result))
    }

    /// Tear all sessions down in reverse-of-startup order. Best-effort: every
    /// close is attempted, failures are logged and swallowed.
    pub fn shutdown(&self) {
        for entry in self.entries.iter().rev() {
            let mut health = entry.health.lock().unwrap();
            if *health == ServerHealth::Closed {
                continue;
            }
            if let Some(Transport::Stdio(t)) = &entry.transport {
                t.close();
            }
            // HTTP sessions have no explicit close; dropping the client ends them.
            tracing::info!(server = %entry.id, "tool server shut down");
            *health = ServerHealth::Closed;
        }
    }

    /// Construct a manager with no servers (all lookups degrade). Used by
    /// composition tests and by callers that run without external tools.
    pub fn disconnected() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

/// Connect and handshake one server: initialize, initialized notification,
/// then the initial tools/list snapshot.
async fn connect(spec: &ServerSpec) -> Result<(Transport, Vec<ToolDescriptor>), ToolServerError> {
    let server_id = spec.id().to_string();

    let transport = match spec {
        ServerSpec::Stdio { command, args, .. } => {
            Transport::Stdio(stdio::StdioTransport::spawn(&server_id, command, args)?)
        }
        ServerSpec::StreamableHttp { url, bearer, .. } => Transport::Http(
            http::HttpTransport::new(&server_id, url.clone(), bearer.clone()),
        ),
    };

    let init_response = transport
        .request("initialize", Some(initialize_params()), STARTUP_TIMEOUT)
        .await
        .map_err(|e| ToolServerError::HandshakeFailed {
            server_id: server_id.clone(),
            message: e.to_string(),
        })?;
    let init_result = protocol::expect_result(&server_id, init_response)?;
    tracing::debug!(
        server = %server_id,
        info = %init_result.get("serverInfo").cloned().unwrap_or_default(),
        "tool server initialized"
    );

    transport.notify(&JsonRpcNotification::initialized()).await?;

    let list_response = transport
        .request("tools/list", None, STARTUP_TIMEOUT)
        .await?;
    let list_result = protocol::expect_result(&server_id, list_response)?;
    let tools = protocol::parse_tools_list(&server_id, &list_result)?;

    Ok((transport, tools))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_degrades_instead_of_failing() {
        // A command that exits immediately can never complete the handshake.
        let manager = ToolServerManager::start(vec![ServerSpec::Stdio {
            id: "browser".to_string(),
            command: "false".to_string(),
            args: vec![],
        }])
        .await;

        let report = manager.health_report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].1, ServerHealth::Degraded);
        assert!(manager.current_tools("browser").is_empty());
    }

    #[tokio::test]
    async fn call_tool_on_degraded_server_errors() {
        let manager = ToolServerManager::start(vec![ServerSpec::Stdio {
            id: "browser".to_string(),
            command: "false".to_string(),
            args: vec![],
        }])
        .await;

        let err = manager
            .call_tool("browser", "navigate_page", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolServerError::NotAvailable { .. }));
    }

    #[tokio::test]
    async fn unknown_server_yields_empty_tools() {
        let manager = ToolServerManager::disconnected();
        assert!(manager.current_tools("search").is_empty());
    }

    #[tokio::test]
    async fn shutdown_marks_everything_closed() {
        let manager = ToolServerManager::start(vec![ServerSpec::Stdio {
            id: "browser".to_string(),
            command: "false".to_string(),
            args: vec![],
        }])
        .await;

        manager.shutdown();
        let report = manager.health_report();
        assert_eq!(report[0].1, ServerHealth::Closed);
    }
}
