//! Clipboard tool.
//!
//! Shells out to the platform clipboard utility: `wl-paste`/`wl-copy` under
//! Wayland, falling back to `xclip` under X11, `pbpaste`/`pbcopy` on macOS.
//! A missing utility surfaces as a JSON error string, per the tool contract.

use std::process::Stdio;

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{require_str, ToolCapability, ToolDescriptor, CLIPBOARD};

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: CLIPBOARD.to_string(),
        description: "Read or write the system clipboard. \
                      operation='read' returns the current clipboard text; \
                      operation='write' stores 'content' in the clipboard."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "description": "'read' or 'write'",
                    "enum": ["read", "write"]
                },
                "content": {
                    "type": "string",
                    "description": "Text to write (required for operation='write')"
                }
            },
            "required": ["operation"]
        }),
        capabilities: vec![ToolCapability::Clipboard],
    }
}

pub async fn run(args: &Value) -> String {
    let operation = match require_str(args, "operation", CLIPBOARD) {
        Ok(op) => op,
        Err(e) => return e,
    };

    match operation {
        "read" => read().await,
        "write" => {
            let Some(content) = args.get("content").and_then(|v| v.as_str()) else {
                return json!({"error": "clipboard: 'content' is required for operation='write'"})
                    .to_string();
            };
            write(content).await
        }
        other => json!({
            "error": format!("clipboard: unknown operation '{other}'. Use 'read' or 'write'")
        })
        .to_string(),
    }
}

async fn read() -> String {
    let command = if cfg!(target_os = "macos") {
        "pbpaste".to_string()
    } else {
        "wl-paste --no-newline 2>/dev/null || xclip -selection clipboard -o".to_string()
    };

    match Command::new("sh").arg("-c").arg(&command).output().await {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).to_string()
        }
        Ok(output) => json!({
            "error": format!(
                "clipboard read failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )
        })
        .to_string(),
        Err(e) => json!({"error": format!("clipboard read: {e}")}).to_string(),
    }
}

async fn write(content: &str) -> String {
    let command = if cfg!(target_os = "macos") {
        "pbcopy".to_string()
    } else {
        "wl-copy 2>/dev/null || xclip -selection clipboard -i".to_string()
    };

    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(&command)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => return json!({"error": format!("clipboard write: {e}")}).to_string(),
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(content.as_bytes()).await {
            return json!({"error": format!("clipboard write: {e}")}).to_string();
        }
        // Close stdin so the utility commits the content.
        drop(stdin);
    }

    match child.wait().await {
        Ok(status) if status.success() => {
            json!({"written_chars": content.chars().count()}).to_string()
        }
        Ok(status) => json!({
            "error": format!("clipboard write failed with status {status}")
        })
        .to_string(),
        Err(e) => json!({"error": format!("clipboard write: {e}")}).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_operation_is_a_json_error() {
        let result = run(&json!({"operation": "clear"})).await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("unknown operation"));
    }

    #[tokio::test]
    async fn write_without_content_is_a_json_error() {
        let result = run(&json!({"operation": "write"})).await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("content"));
    }
}
