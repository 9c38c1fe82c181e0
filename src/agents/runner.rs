//! Agent invocation loop.
//!
//! Runs one agent (supervisor or helper) against a task: repeatedly asks the
//! model for the next step, dispatches any tool calls, and feeds the results
//! back until the model answers in plain text or a budget runs out. The final
//! text passes through the response sanitizer before being returned.
//!
//! Tool calls route three ways:
//! - a call matching a delegation child runs that helper agent (one level
//!   deep by construction),
//! - a call on an agent backed by a tool server goes through the lifecycle
//!   manager,
//! - everything else is a built-in tool dispatched locally.
//!
//! Helper failures (timeout, exhausted budget, LLM error) are converted to
//! JSON error strings and returned into the parent's reasoning loop -- the
//! supervisor reacts to them, they never tear down shared state.

use std::future::Future;
use std::pin::Pin;

use genai::chat::{ChatMessage, ChatOptions, ChatRequest, ToolCall, ToolResponse};
use serde_json::json;

use super::types::AgentDescriptor;
use crate::error::AgentError;
use crate::models::sanitize;
use crate::tools::{self, ToolRuntime};
use crate::toolserver::ToolServerManager;

/// Stop sequences for the cloud GLM models, matching the artifacts the
/// sanitizer strips.
const GLM_STOP_SEQUENCES: &[&str] = &["</code>", "</code", "</s>"];

/// Recursion indirection for delegation.
///
/// `run_agent` is an `async fn`, so boxing its opaque future inline at the
/// recursive call site forces the Send auto-trait solver into a cycle
/// (`run_agent` → `run_steps` → `dispatch` → `run_agent`) it resolves
/// pessimistically. Routing the recursive call through a standalone function
/// with a *named* `Pin<Box<dyn Future + Send>>` return type pins the future's
/// Send-ness by annotation and breaks the cycle. Behavior is unchanged: this
/// just boxes the same `run_agent` call the recursion already performed.
fn run_agent_boxed<'a>(
    agent: &'a AgentDescriptor,
    task: &'a str,
    runtime: &'a ToolRuntime,
    toolservers: &'a ToolServerManager,
) -> Pin<Box<dyn Future<Output = Result<String, AgentError>> + Send + 'a>> {
    Box::pin(run_agent(agent, task, runtime, toolservers))
}

/// Run an agent invocation under its wall-clock timeout.
///
/// Exceeding the timeout terminates only this invocation; cached descriptors
/// and tool-server sessions are process-wide and survive it.
pub async fn run_agent(
    agent: &AgentDescriptor,
    task: &str,
    runtime: &ToolRuntime,
    toolservers: &ToolServerManager,
) -> Result<String, AgentError> {
    match tokio::time::timeout(agent.timeout, run_steps(agent, task, runtime, toolservers)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(agent = %agent.name, timeout_secs = agent.timeout.as_secs(), "invocation timed out");
            Err(AgentError::InvocationTimeout {
                timeout_secs: agent.timeout.as_secs(),
            })
        }
    }
}

/// The bounded step loop.
async fn run_steps(
    agent: &AgentDescriptor,
    task: &str,
    runtime: &ToolRuntime,
    toolservers: &ToolServerManager,
) -> Result<String, AgentError> {
    let client = runtime.registry.make_client(&agent.model);

    let mut genai_tools: Vec<genai::chat::Tool> =
        agent.tools.iter().map(|t| t.to_genai_tool()).collect();
    for child in &agent.children {
        genai_tools.push(delegation_tool(child));
    }

    let mut chat_req = ChatRequest::from_system(&agent.instructions)
        .with_tools(genai_tools)
        .append_message(ChatMessage::user(task));

    let mut chat_options = ChatOptions::default();
    if agent.model.is_cloud() {
        chat_options = chat_options
            .with_stop_sequences(GLM_STOP_SEQUENCES.iter().map(|s| s.to_string()).collect());
    }

    for step in 1..=agent.max_steps {
        let chat_res = client
            .exec_chat(&agent.model.name, chat_req.clone(), Some(&chat_options))
            .await
            .map_err(|e| AgentError::LlmError(e.to_string()))?;

        let text = chat_res.content_text_as_str().map(|s| s.to_string());
        let tool_calls: Vec<ToolCall> = chat_res.into_tool_calls().unwrap_or_default();

        if tool_calls.is_empty() {
            let answer = sanitize(&text.unwrap_or_default());
            tracing::debug!(agent = %agent.name, step, "final answer produced");
            return Ok(answer);
        }

        chat_req = chat_req.append_message(ChatMessage::from(tool_calls.clone()));

        for call in &tool_calls {
            tracing::info!(
                agent = %agent.name,
                step,
                tool = %call.fn_name,
                "dispatching tool call"
            );

            let result = dispatch(agent, call, runtime, toolservers).await;

            tracing::debug!(
                agent = %agent.name,
                tool = %call.fn_name,
                result_chars = result.len(),
                "tool call completed"
            );

            chat_req = chat_req.append_message(ToolResponse::new(call.call_id.clone(), result));
        }
    }

    tracing::warn!(agent = %agent.name, max_steps = agent.max_steps, "step budget exhausted");
    Err(AgentError::StepBudgetExhausted {
        max_steps: agent.max_steps,
    })
}

/// Route one tool call: delegation child, tool-server tool, or built-in.
async fn dispatch(
    agent: &AgentDescriptor,
    call: &ToolCall,
    runtime: &ToolRuntime,
    toolservers: &ToolServerManager,
) -> String {
    if let Some(child) = agent.child(&call.fn_name) {
        let task = match render_delegation_task(&call.fn_arguments) {
            Ok(task) => task,
            Err(e) => return e,
        };

        // The recursive call needs indirection; children have no children of
        // their own, so this recurses at most once.
        return match run_agent_boxed(child, &task, runtime, toolservers).await {
            Ok(answer) => answer,
            Err(e) => json!({"error": format!("helper '{}' failed: {e}", child.name)}).to_string(),
        };
    }

    // Only tools actually granted to this agent are dispatchable; a model
    // calling any other name gets the unknown-tool error, so the composer's
    // capability filters hold at execution time, not just in the schema list.
    if !agent.has_tool(&call.fn_name) {
        return json!({"error": format!("Unknown tool: {}", call.fn_name)}).to_string();
    }

    if let Some(server_id) = &agent.tool_server {
        return match toolservers
            .call_tool(server_id, &call.fn_name, call.fn_arguments.clone())
            .await
        {
            Ok(result) => result,
            Err(e) => json!({"error": format!("{}: {e}", call.fn_name)}).to_string(),
        };
    }

    tools::dispatch_tool_call(&call.fn_name, &call.fn_arguments, runtime).await
}

/// Expose a helper agent to its parent as a callable tool.
fn delegation_tool(child: &AgentDescriptor) -> genai::chat::Tool {
    genai::chat::Tool::new(child.name.clone())
        .with_description(child.description.clone())
        .with_schema(json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "A precise, self-contained description of the sub-task"
                },
                "additional_context": {
                    "type": "string",
                    "description": "Optional extra context (paths, prior findings, constraints)"
                }
            },
            "required": ["task"]
        }))
}

/// Build the helper's task prompt from the delegation arguments.
fn render_delegation_task(arguments: &serde_json::Value) -> Result<String, String> {
    let Some(task) = arguments.get("task").and_then(|v| v.as_str()) else {
        return Err(json!({"error": "delegation call: missing 'task' argument"}).to_string());
    };

    match arguments.get("additional_context").and_then(|v| v.as_str()) {
        Some(context) if !context.is_empty() => {
            Ok(format!("{task}\n\nAdditional context:\n{context}"))
        }
        _ => Ok(task.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_delegation_task_requires_task() {
        let err = render_delegation_task(&json!({"additional_context": "x"})).unwrap_err();
        assert!(err.contains("missing 'task'"));
    }

    #[test]
    fn render_delegation_task_appends_context() {
        let task = render_delegation_task(&json!({
            "task": "click the OK button",
            "additional_context": "the dialog is already open"
        }))
        .unwrap();
        assert!(task.starts_with("click the OK button"));
        assert!(task.contains("dialog is already open"));
    }

    #[tokio::test]
    async fn ungranted_tools_are_rejected_at_dispatch() {
        // A supervisor-shaped agent without the desktop tools: calling one by
        // name must hit the unknown-tool path, not the implementation.
        let agent = AgentDescriptor {
            name: "supervisor".to_string(),
            description: String::new(),
            instructions: String::new(),
            tools: crate::tools::direct_tools(),
            model: crate::models::ResolvedModel {
                category: "main".to_string(),
                name: "qwen3:8b".to_string(),
                base_url: "http://localhost:11434".to_string(),
                locality: crate::models::Locality::Local,
                context_window: 32768,
            },
            max_steps: 10,
            timeout: std::time::Duration::from_secs(240),
            tool_server: None,
            children: vec![],
        };

        let config = std::sync::Arc::new(crate::config::PartialConfig::default().finalize());
        let registry = std::sync::Arc::new(crate::models::ModelRegistry::new(&config));
        let runtime = ToolRuntime { config, registry };
        let toolservers = ToolServerManager::disconnected();

        let call = ToolCall {
            call_id: "call-1".to_string(),
            fn_name: "screenshot".to_string(),
            fn_arguments: json!({}),
        };

        let result = dispatch(&agent, &call, &runtime, &toolservers).await;
        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("Unknown tool"));
    }

    #[test]
    fn delegation_tool_uses_child_name_and_description() {
        let child = AgentDescriptor {
            name: "vision".to_string(),
            description: "Analyzes images".to_string(),
            instructions: String::new(),
            tools: vec![],
            model: crate::models::ResolvedModel {
                category: "main".to_string(),
                name: "qwen3:8b".to_string(),
                base_url: "http://localhost:11434".to_string(),
                locality: crate::models::Locality::Local,
                context_window: 32768,
            },
            max_steps: 5,
            timeout: std::time::Duration::from_secs(60),
            tool_server: None,
            children: vec![],
        };

        let tool = delegation_tool(&child);
        assert_eq!(tool.name, "vision");
        assert!(tool.description.as_deref().unwrap().contains("Analyzes"));
    }
}
