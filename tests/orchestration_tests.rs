//! End-to-end orchestration properties: agent-cache build semantics,
//! composition under tool-server degradation, and built-in tool dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use conductor::agents::compose::compose_supervisor;
use conductor::agents::HelperKind;
use conductor::cache::AgentCache;
use conductor::config::PartialConfig;
use conductor::models::{Locality, ModelRegistry, ResolvedModel};
use conductor::tools::{self, ToolRuntime};
use conductor::toolserver::{ServerSpec, ToolServerManager};

fn local_model(category: &str) -> ResolvedModel {
    ResolvedModel {
        category: category.to_string(),
        name: "qwen3:8b".to_string(),
        base_url: "http://localhost:11434".to_string(),
        locality: Locality::Local,
        context_window: 32768,
    }
}

/// N concurrent callers for the same unbuilt category: exactly one compose
/// runs, and every caller ends up holding the same descriptor.
#[tokio::test]
async fn concurrent_requests_share_a_single_build() {
    let cache = Arc::new(AgentCache::new());
    let builds = Arc::new(AtomicUsize::new(0));
    let config = Arc::new(PartialConfig::default().finalize());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let builds = builds.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_build("main", || {
                    let builds = builds.clone();
                    let config = config.clone();
                    async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(25)).await;
                        let toolservers = ToolServerManager::disconnected();
                        Ok(compose_supervisor(&local_model("main"), &toolservers, &config).await)
                    }
                })
                .await
                .unwrap()
        }));
    }

    let descriptors: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    for d in &descriptors {
        assert!(Arc::ptr_eq(d, &descriptors[0]));
    }
}

/// A deliberately unreachable browser server leaves the browser helper out of
/// the delegation set while the supervisor still comes up with direct tools.
#[tokio::test]
async fn unreachable_tool_server_degrades_composition() {
    // `false` exits immediately: the spawn succeeds, the handshake cannot.
    let toolservers = ToolServerManager::start(vec![ServerSpec::Stdio {
        id: "browser".to_string(),
        command: "false".to_string(),
        args: vec![],
    }])
    .await;
    let config = PartialConfig::default().finalize();

    let supervisor = compose_supervisor(&local_model("main"), &toolservers, &config).await;

    assert!(supervisor.child(HelperKind::Browser.name()).is_none());
    assert!(supervisor.child(HelperKind::DesktopControl.name()).is_some());
    assert!(supervisor.child(HelperKind::Vision.name()).is_some());
    assert_eq!(supervisor.tools.len(), 3, "direct tools must survive degradation");
}

/// Built-in dispatch honors the always-a-string contract, including for
/// unknown tools and malformed arguments.
#[tokio::test]
async fn tool_dispatch_always_returns_a_string_payload() {
    let config = Arc::new(PartialConfig::default().finalize());
    let registry = Arc::new(ModelRegistry::new(&config));
    let runtime = ToolRuntime {
        config,
        registry,
    };

    let unknown = tools::dispatch_tool_call("made_up_tool", &json!({}), &runtime).await;
    let parsed: Value = serde_json::from_str(&unknown).unwrap();
    assert!(parsed["error"].as_str().unwrap().contains("Unknown tool"));

    let missing_arg = tools::dispatch_tool_call("os_exec", &json!({}), &runtime).await;
    let parsed: Value = serde_json::from_str(&missing_arg).unwrap();
    assert!(parsed["error"].as_str().unwrap().contains("command"));

    let ok = tools::dispatch_tool_call("os_exec", &json!({"command": "printf orchestrated"}), &runtime)
        .await;
    let parsed: Value = serde_json::from_str(&ok).unwrap();
    assert_eq!(parsed["stdout"], "orchestrated");
}

/// The file_system tool round-trips content through a temp workspace when
/// driven through the same dispatch entry point the agent loop uses.
#[tokio::test]
async fn file_system_round_trip_through_dispatch() {
    let config = Arc::new(PartialConfig::default().finalize());
    let registry = Arc::new(ModelRegistry::new(&config));
    let runtime = ToolRuntime {
        config,
        registry,
    };

    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("notes/result.txt");

    let write = tools::dispatch_tool_call(
        "file_system",
        &json!({
            "operation": "write",
            "path": path.to_str().unwrap(),
            "content": "delegated output"
        }),
        &runtime,
    )
    .await;
    let parsed: Value = serde_json::from_str(&write).unwrap();
    assert_eq!(parsed["written_bytes"], 16);

    let read = tools::dispatch_tool_call(
        "file_system",
        &json!({"operation": "read", "path": path.to_str().unwrap()}),
        &runtime,
    )
    .await;
    assert_eq!(read, "delegated output");
}
