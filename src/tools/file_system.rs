//! File system tool: read, write, create, delete, list, move, and search.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use super::{require_str, ToolCapability, ToolDescriptor, FILE_SYSTEM};

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: FILE_SYSTEM.to_string(),
        description: "File system operations tool. Performs read, write, create, delete, \
                      list, move, and search operations on files and directories. \
                      'write' replaces file content (creating parent directories), 'create' \
                      refuses to overwrite an existing file, 'search' matches a glob-style \
                      pattern (* and ?) against names in a directory."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "description": "One of: read, write, create, delete, list, move, search",
                    "enum": ["read", "write", "create", "delete", "list", "move", "search"]
                },
                "path": {
                    "type": "string",
                    "description": "The file or directory path (absolute or relative)"
                },
                "content": {
                    "type": "string",
                    "description": "Content for 'write' and 'create' operations"
                },
                "destination": {
                    "type": "string",
                    "description": "Destination path for 'move'"
                },
                "pattern": {
                    "type": "string",
                    "description": "Glob-style pattern for 'search' (e.g. '*.txt')"
                }
            },
            "required": ["operation", "path"]
        }),
        capabilities: vec![ToolCapability::FileAccess],
    }
}

pub async fn run(args: &Value) -> String {
    let operation = match require_str(args, "operation", FILE_SYSTEM) {
        Ok(op) => op,
        Err(e) => return e,
    };
    let path = match require_str(args, "path", FILE_SYSTEM) {
        Ok(p) => PathBuf::from(p),
        Err(e) => return e,
    };

    match operation {
        "read" => read_file(&path).await,
        "write" => {
            let Some(content) = args.get("content").and_then(|v| v.as_str()) else {
                return json!({"error": "file_system: 'content' is required for 'write'"}).to_string();
            };
            write_file(&path, content, true).await
        }
        "create" => {
            let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");
            write_file(&path, content, false).await
        }
        "delete" => delete(&path).await,
        "list" => list_directory(&path).await,
        "move" => {
            let Some(dest) = args.get("destination").and_then(|v| v.as_str()) else {
                return json!({"error": "file_system: 'destination' is required for 'move'"})
                    .to_string();
            };
            move_path(&path, Path::new(dest)).await
        }
        "search" => {
            let Some(pattern) = args.get("pattern").and_then(|v| v.as_str()) else {
                return json!({"error": "file_system: 'pattern' is required for 'search'"})
                    .to_string();
            };
            search(&path, pattern).await
        }
        other => json!({
            "error": format!(
                "file_system: unknown operation '{other}'. Valid operations: read, write, create, delete, list, move, search"
            )
        })
        .to_string(),
    }
}

async fn read_file(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => json!({"error": format!("file_system read: {e}")}).to_string(),
    }
}

async fn write_file(path: &Path, content: &str, overwrite: bool) -> String {
    if !overwrite && path.exists() {
        return json!({"error": format!("file_system create: '{}' already exists", path.display())})
            .to_string();
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return json!({"error": format!("file_system: failed to create directories: {e}")})
                    .to_string();
            }
        }
    }

    match tokio::fs::write(path, content).await {
        Ok(()) => json!({
            "written_bytes": content.len(),
            "path": path.display().to_string(),
        })
        .to_string(),
        Err(e) => json!({"error": format!("file_system write: {e}")}).to_string(),
    }
}

async fn delete(path: &Path) -> String {
    let result = if path.is_dir() {
        // Only empty directories are removed; recursive deletion stays manual.
        tokio::fs::remove_dir(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => json!({"deleted": path.display().to_string()}).to_string(),
        Err(e) => json!({"error": format!("file_system delete: {e}")}).to_string(),
    }
}

async fn list_directory(path: &Path) -> String {
    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(rd) => rd,
        Err(e) => return json!({"error": format!("file_system list: {e}")}).to_string(),
    };

    let mut names: Vec<String> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        let suffix = match entry.file_type().await {
            Ok(ft) if ft.is_dir() => "/",
            _ => "",
        };
        names.push(format!("{name}{suffix}"));
    }
    names.sort();

    json!({"path": path.display().to_string(), "entries": names}).to_string()
}

async fn move_path(from: &Path, to: &Path) -> String {
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return json!({"error": format!("file_system move: {e}")}).to_string();
            }
        }
    }
    match tokio::fs::rename(from, to).await {
        Ok(()) => json!({
            "moved": from.display().to_string(),
            "to": to.display().to_string(),
        })
        .to_string(),
        Err(e) => json!({"error": format!("file_system move: {e}")}).to_string(),
    }
}

async fn search(dir: &Path, pattern: &str) -> String {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) => return json!({"error": format!("file_system search: {e}")}).to_string(),
    };

    let mut matches: Vec<String> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if glob_match(pattern, &name) {
            matches.push(entry.path().display().to_string());
        }
    }
    matches.sort();

    json!({"pattern": pattern, "matches": matches}).to_string()
}

/// Minimal glob matcher supporting `*` (any run) and `?` (any single char).
fn glob_match(pattern: &str, name: &str) -> bool {
    fn inner(p: &[char], n: &[char]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                // '*' matches nothing, or one more char of the name.
                inner(&p[1..], n) || (!n.is_empty() && inner(p, &n[1..]))
            }
            (Some('?'), Some(_)) => inner(&p[1..], &n[1..]),
            (Some(pc), Some(nc)) if pc == nc => inner(&p[1..], &n[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    inner(&p, &n)
}
