//! Desktop-control tools: screen capture, UI grounding, pointer and keyboard.
//!
//! Capture and input shell out to the standard desktop utilities (`grim` or
//! `scrot` for capture, `xdotool` for input); a missing utility surfaces as a
//! JSON error string the model can react to. Grounding wraps the
//! [`crate::grounding`] pipeline as a callable tool.

use std::path::Path;

use serde_json::{json, Value};

use super::{require_str, ToolCapability, ToolDescriptor, ToolRuntime, MOUSE_KEYBOARD, SCREENSHOT, UI_GROUNDING};
use crate::config::AppConfig;
use crate::error::GroundingError;
use crate::grounding::{self, GroundingRequest};
use crate::tools::os_exec;

pub fn screenshot_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: SCREENSHOT.to_string(),
        description: "Take a screenshot of the whole screen or a region and save it as a PNG. \
                      Returns the absolute path of the saved file. \
                      Optional region format: 'x,y,width,height'."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "region": {
                    "type": "string",
                    "description": "Optional region as 'x,y,width,height'; whole screen when absent"
                }
            }
        }),
        capabilities: vec![ToolCapability::ScreenCapture],
    }
}

pub fn grounding_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: UI_GROUNDING.to_string(),
        description: "Locate a UI element in a screenshot and return its absolute pixel \
                      coordinates for clicking. Uses a local vision model. \
                      Returns JSON like {\"found\": true, \"x\": 960, \"y\": 540, ...}; \
                      when found is false the coordinates must not be used."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "image_path": {
                    "type": "string",
                    "description": "Absolute path of the screenshot PNG to analyze"
                },
                "element": {
                    "type": "string",
                    "description": "Text description of the element to locate (e.g. 'OK button', 'search field')"
                }
            },
            "required": ["image_path", "element"]
        }),
        capabilities: vec![ToolCapability::ImageAnalysis],
    }
}

pub fn mouse_keyboard_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: MOUSE_KEYBOARD.to_string(),
        description: "Control the mouse and keyboard. Operations: click, double_click, \
                      right_click, move, type, hotkey, drag, scroll. Mouse operations take \
                      x/y (and x2/y2 for drag); 'type' takes text; 'hotkey' takes \
                      comma-separated keys (e.g. 'ctrl,c'); 'scroll' takes clicks \
                      (positive=up, negative=down)."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["click", "double_click", "right_click", "move", "type", "hotkey", "drag", "scroll"]
                },
                "x": {"type": "integer", "description": "X coordinate for mouse operations"},
                "y": {"type": "integer", "description": "Y coordinate for mouse operations"},
                "x2": {"type": "integer", "description": "Destination X for drag"},
                "y2": {"type": "integer", "description": "Destination Y for drag"},
                "text": {"type": "string", "description": "Text to type (operation='type')"},
                "keys": {"type": "string", "description": "Comma-separated keys for hotkey"},
                "clicks": {"type": "integer", "description": "Scroll clicks (positive=up, negative=down)"}
            },
            "required": ["operation"]
        }),
        capabilities: vec![ToolCapability::PointerControl, ToolCapability::ScreenCapture],
    }
}

/// Take a screenshot into the configured directory.
pub async fn run_screenshot(args: &Value, config: &AppConfig) -> String {
    let region = args.get("region").and_then(|v| v.as_str());

    if let Some(region) = region {
        // Validate "x,y,width,height" before handing it to the capture tool.
        let parts: Vec<Result<i64, _>> = region.split(',').map(|p| p.trim().parse()).collect();
        if parts.len() != 4 || parts.iter().any(|p| p.is_err()) {
            return json!({
                "error": format!("screenshot: invalid region '{region}'. Expected 'x,y,width,height'")
            })
            .to_string();
        }
    }

    let dir = &config.screenshot_dir;
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        return json!({"error": format!("screenshot: cannot create {}: {e}", dir.display())})
            .to_string();
    }

    let filename = format!("screen_{}.png", chrono::Local::now().format("%Y%m%d_%H%M%S"));
    let filepath = dir.join(filename);
    let path_str = filepath.display().to_string();

    let command = capture_command(region, &path_str);
    let result = os_exec::execute(&command, std::time::Duration::from_secs(15)).await;

    if result.exit_code == Some(0) && filepath.exists() {
        path_str
    } else {
        json!({
            "error": format!(
                "screenshot capture failed: {}",
                if result.timed_out { "timed out" } else { result.stderr.trim() }
            )
        })
        .to_string()
    }
}

/// Build the capture command: `grim` under Wayland, otherwise `scrot`.
fn capture_command(region: Option<&str>, path: &str) -> String {
    match region {
        Some(region) => {
            let parts: Vec<&str> = region.split(',').map(|p| p.trim()).collect();
            let (x, y, w, h) = (parts[0], parts[1], parts[2], parts[3]);
            format!(
                "if [ -n \"$WAYLAND_DISPLAY\" ]; then grim -g '{x},{y} {w}x{h}' '{path}'; \
                 else scrot -a {x},{y},{w},{h} '{path}'; fi"
            )
        }
        None => format!(
            "if [ -n \"$WAYLAND_DISPLAY\" ]; then grim '{path}'; else scrot '{path}'; fi"
        ),
    }
}

/// Locate a UI element via the grounding pipeline.
///
/// Returns the serialized [`crate::grounding::GroundingResult`]; grounding
/// infrastructure failures become JSON error strings.
pub async fn run_grounding(args: &Value, runtime: &ToolRuntime) -> String {
    let image_path = match require_str(args, "image_path", UI_GROUNDING) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let element = match require_str(args, "element", UI_GROUNDING) {
        Ok(el) => el,
        Err(e) => return e,
    };

    if !Path::new(image_path).exists() {
        return json!({"error": format!("ui_grounding: screenshot not found: {image_path}")})
            .to_string();
    }

    let request = GroundingRequest {
        image_path: image_path.into(),
        element: element.to_string(),
    };

    match grounding::locate(&runtime.registry, &runtime.config.ollama_base_url, &request).await {
        Ok(result) => serde_json::to_string(&result).unwrap_or_else(|e| {
            json!({"error": format!("ui_grounding: failed to serialize result: {e}")}).to_string()
        }),
        Err(GroundingError::GroundingTimeout { timeout_secs }) => json!({
            "error": format!("ui_grounding: vision model timed out after {timeout_secs}s")
        })
        .to_string(),
        Err(e) => json!({"error": format!("ui_grounding: {e}")}).to_string(),
    }
}

/// Execute a pointer/keyboard operation via `xdotool`.
pub async fn run_mouse_keyboard(args: &Value) -> String {
    let operation = match require_str(args, "operation", MOUSE_KEYBOARD) {
        Ok(op) => op,
        Err(e) => return e,
    };

    let x = args.get("x").and_then(|v| v.as_i64());
    let y = args.get("y").and_then(|v| v.as_i64());
    let x2 = args.get("x2").and_then(|v| v.as_i64());
    let y2 = args.get("y2").and_then(|v| v.as_i64());
    let text = args.get("text").and_then(|v| v.as_str());
    let keys = args.get("keys").and_then(|v| v.as_str());
    let clicks = args.get("clicks").and_then(|v| v.as_i64());

    let (command, success_msg) = match operation {
        "click" | "double_click" | "right_click" | "move" => {
            let (Some(x), Some(y)) = (x, y) else {
                return json!({
                    "error": format!("mouse_keyboard: 'x' and 'y' are required for operation='{operation}'")
                })
                .to_string();
            };
            match operation {
                "click" => (
                    format!("xdotool mousemove {x} {y} click 1"),
                    format!("Clicked at ({x}, {y})"),
                ),
                "double_click" => (
                    format!("xdotool mousemove {x} {y} click --repeat 2 1"),
                    format!("Double-clicked at ({x}, {y})"),
                ),
                "right_click" => (
                    format!("xdotool mousemove {x} {y} click 3"),
                    format!("Right-clicked at ({x}, {y})"),
                ),
                _ => (
                    format!("xdotool mousemove {x} {y}"),
                    format!("Moved pointer to ({x}, {y})"),
                ),
            }
        }
        "type" => {
            let Some(text) = text else {
                return json!({"error": "mouse_keyboard: 'text' is required for operation='type'"})
                    .to_string();
            };
            (
                format!("xdotool type --delay 50 -- {}", shell_quote(text)),
                format!("Typed {} characters", text.chars().count()),
            )
        }
        "hotkey" => {
            let Some(keys) = keys else {
                return json!({"error": "mouse_keyboard: 'keys' is required for operation='hotkey'"})
                    .to_string();
            };
            let combo = keys
                .split(',')
                .map(|k| k.trim())
                .collect::<Vec<_>>()
                .join("+");
            (
                format!("xdotool key {}", shell_quote(&combo)),
                format!("Pressed {combo}"),
            )
        }
        "drag" => {
            let (Some(x), Some(y), Some(x2), Some(y2)) = (x, y, x2, y2) else {
                return json!({
                    "error": "mouse_keyboard: 'x', 'y', 'x2', 'y2' are required for operation='drag'"
                })
                .to_string();
            };
            (
                format!(
                    "xdotool mousemove {x} {y} mousedown 1 mousemove --sync {x2} {y2} mouseup 1"
                ),
                format!("Dragged from ({x}, {y}) to ({x2}, {y2})"),
            )
        }
        "scroll" => {
            let (Some(x), Some(y), Some(clicks)) = (x, y, clicks) else {
                return json!({
                    "error": "mouse_keyboard: 'x', 'y' and 'clicks' are required for operation='scroll'"
                })
                .to_string();
            };
            // Button 4 scrolls up, button 5 scrolls down.
            let button = if clicks > 0 { 4 } else { 5 };
            (
                format!(
                    "xdotool mousemove {x} {y} click --repeat {} {button}",
                    clicks.abs().max(1)
                ),
                format!("Scrolled {} clicks at ({x}, {y})", clicks.abs()),
            )
        }
        other => {
            return json!({
                "error": format!(
                    "mouse_keyboard: unknown operation '{other}'. Available: click, double_click, right_click, move, type, hotkey, drag, scroll"
                )
            })
            .to_string();
        }
    };

    let result = os_exec::execute(&command, std::time::Duration::from_secs(15)).await;
    if result.exit_code == Some(0) {
        json!({"ok": true, "message": success_msg}).to_string()
    } else {
        json!({
            "error": format!(
                "mouse_keyboard: {} failed: {}",
                operation,
                if result.timed_out { "timed out" } else { result.stderr.trim() }
            )
        })
        .to_string()
    }
}

/// Single-quote a string for `sh -c` embedding.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
