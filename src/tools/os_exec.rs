//! Shell execution tool with a per-call timeout.

use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::process::Command;

use super::{require_str, ToolCapability, ToolDescriptor, OS_EXEC};

/// Default timeout when the model does not pass one.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Result of a shell command execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: OS_EXEC.to_string(),
        description: "Execute a shell command via `sh -c` with timeout support. \
                      Returns a JSON object with fields: stdout, stderr, exit_code, timed_out."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 30)"
                }
            },
            "required": ["command"]
        }),
        capabilities: vec![ToolCapability::ProcessExec],
    }
}

pub async fn run(args: &Value) -> String {
    let command = match require_str(args, "command", OS_EXEC) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let timeout_secs = args
        .get("timeout")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    let result = execute(command, Duration::from_secs(timeout_secs)).await;
    serde_json::to_string(&result).unwrap_or_else(|e| {
        json!({"error": format!("Failed to serialize exec result: {}", e)}).to_string()
    })
}

/// Run `sh -c <command>` and capture its output.
///
/// On timeout the output future is dropped, which kills the child via
/// `kill_on_drop`, and a `timed_out: true` result is returned (partial output
/// is not recovered).
pub async fn execute(command: &str, timeout: Duration) -> ExecResult {
    let output_fut = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output_fut).await {
        Ok(Ok(output)) => ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            timed_out: false,
        },
        Ok(Err(e)) => ExecResult {
            stdout: String::new(),
            stderr: format!("Failed to spawn shell process: {e}"),
            exit_code: None,
            timed_out: false,
        },
        Err(_) => ExecResult {
            stdout: String::new(),
            stderr: format!("Command timed out after {}s", timeout.as_secs()),
            exit_code: None,
            timed_out: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_command_and_captures_output() {
        let result = run(&json!({"command": "echo hello"})).await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["stdout"].as_str().unwrap().trim(), "hello");
        assert_eq!(parsed["exit_code"], 0);
        assert_eq!(parsed["timed_out"], false);
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_reported() {
        let result = run(&json!({"command": "exit 3"})).await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["exit_code"], 3);
    }

    #[tokio::test]
    async fn timeout_sets_timed_out_flag() {
        let result = run(&json!({"command": "sleep 5", "timeout": 1})).await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["timed_out"], true);
        assert!(parsed["exit_code"].is_null());
    }

    #[tokio::test]
    async fn missing_command_is_a_json_error() {
        let result = run(&json!({})).await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("command"));
    }
}
