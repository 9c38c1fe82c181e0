//! Tool schema definitions and dispatch for the built-in tools.
//!
//! Each distinct tool has one static [`ToolDescriptor`] carrying its name,
//! JSON input schema, and the capability set it grants. The descriptors are
//! grouped here into the fixed subsets the sub-agent composer hands out:
//! direct tools for the supervisor, desktop tools for the desktop-control
//! helper, the image-analysis tool for the vision helper. Tools served by
//! external tool servers are described by the lifecycle manager instead.
//!
//! Tool errors are always returned as structured JSON strings (never panics or
//! `Err` variants) so the model can observe the error and react.

pub mod clipboard;
pub mod desktop;
pub mod file_system;
pub mod os_exec;
pub mod vision;

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::models::ModelRegistry;

/// Names of the built-in tools.
pub const FILE_SYSTEM: &str = "file_system";
pub const OS_EXEC: &str = "os_exec";
pub const CLIPBOARD: &str = "clipboard";
pub const SCREENSHOT: &str = "screenshot";
pub const MOUSE_KEYBOARD: &str = "mouse_keyboard";
pub const UI_GROUNDING: &str = "ui_grounding";
pub const ANALYZE_IMAGE: &str = "analyze_image";

/// What a tool is allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCapability {
    FileAccess,
    ProcessExec,
    Clipboard,
    PointerControl,
    ScreenCapture,
    ImageAnalysis,
    NetworkRead,
}

/// Static description of one callable tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub capabilities: Vec<ToolCapability>,
}

impl ToolDescriptor {
    /// Convert to the genai tool schema passed to chat requests.
    pub fn to_genai_tool(&self) -> genai::chat::Tool {
        genai::chat::Tool::new(self.name.clone())
            .with_description(self.description.clone())
            .with_schema(self.input_schema.clone())
    }
}

/// Shared handles the built-in tools need at dispatch time.
#[derive(Clone)]
pub struct ToolRuntime {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ModelRegistry>,
}

/// Direct-I/O tools: the only tools the supervisor holds itself.
pub fn direct_tools() -> Vec<ToolDescriptor> {
    vec![
        file_system::descriptor(),
        os_exec::descriptor(),
        clipboard::descriptor(),
    ]
}

/// Tools for the desktop-control helper: see the screen, locate an element,
/// act on it.
pub fn desktop_tools() -> Vec<ToolDescriptor> {
    vec![
        desktop::screenshot_descriptor(),
        desktop::grounding_descriptor(),
        desktop::mouse_keyboard_descriptor(),
    ]
}

/// Tools for the vision helper.
pub fn vision_tools() -> Vec<ToolDescriptor> {
    vec![vision::descriptor()]
}

/// Dispatch a built-in tool call to its implementation.
///
/// # Returns
///
/// Always returns a `String` -- either a success payload or a JSON error
/// object `{"error": "..."}`. Never panics or returns `Err`. Tools served by
/// external servers are not routed here; the agent runner sends those through
/// the lifecycle manager.
pub async fn dispatch_tool_call(name: &str, args: &Value, runtime: &ToolRuntime) -> String {
    match name {
        FILE_SYSTEM => file_system::run(args).await,
        OS_EXEC => os_exec::run(args).await,
        CLIPBOARD => clipboard::run(args).await,
        SCREENSHOT => desktop::run_screenshot(args, &runtime.config).await,
        MOUSE_KEYBOARD => desktop::run_mouse_keyboard(args).await,
        UI_GROUNDING => desktop::run_grounding(args, runtime).await,
        ANALYZE_IMAGE => vision::run(args, runtime).await,
        unknown => json!({"error": format!("Unknown tool: {}", unknown)}).to_string(),
    }
}

/// Extract a required string argument or produce the standard error payload.
pub(crate) fn require_str<'a>(args: &'a Value, key: &str, tool: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| json!({"error": format!("{tool}: missing or invalid '{key}' argument")}).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_tools_are_exactly_the_supervisor_set() {
        let names: Vec<String> = direct_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec![FILE_SYSTEM, OS_EXEC, CLIPBOARD]);
    }

    #[test]
    fn desktop_and_vision_filters_are_disjoint() {
        let desktop: Vec<String> = desktop_tools().into_iter().map(|t| t.name).collect();
        let vision: Vec<String> = vision_tools().into_iter().map(|t| t.name).collect();
        let direct: Vec<String> = direct_tools().into_iter().map(|t| t.name).collect();

        for name in &desktop {
            assert!(!vision.contains(name));
            assert!(!direct.contains(name));
        }
        for name in &vision {
            assert!(!direct.contains(name));
        }
    }

    #[test]
    fn all_descriptors_have_schemas_and_capabilities() {
        for tool in direct_tools()
            .into_iter()
            .chain(desktop_tools())
            .chain(vision_tools())
        {
            assert!(
                tool.input_schema.get("type").is_some(),
                "tool '{}' should have an object schema",
                tool.name
            );
            assert!(
                !tool.capabilities.is_empty(),
                "tool '{}' should declare capabilities",
                tool.name
            );
            assert!(!tool.description.is_empty());
        }
    }
}
