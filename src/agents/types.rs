//! Agent descriptor types.

use std::sync::Arc;
use std::time::Duration;

use crate::models::ResolvedModel;
use crate::tools::ToolDescriptor;

/// The fixed set of helper kinds the composer knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperKind {
    DesktopControl,
    Vision,
    Browser,
    WebSearch,
}

impl HelperKind {
    pub const ALL: [HelperKind; 4] = [
        HelperKind::DesktopControl,
        HelperKind::Vision,
        HelperKind::Browser,
        HelperKind::WebSearch,
    ];

    /// The delegation name the supervisor addresses this helper by.
    pub fn name(self) -> &'static str {
        match self {
            HelperKind::DesktopControl => "desktop_control",
            HelperKind::Vision => "vision",
            HelperKind::Browser => "browser",
            HelperKind::WebSearch => "web_search",
        }
    }
}

/// A fully-described agent: its tools, model, budgets, and (for the
/// supervisor) the helpers it may delegate to.
///
/// Delegation depth is fixed at one level: helpers have no children, which
/// bounds recursion and rules out cyclic delegation by construction.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub name: String,
    /// Shown to the parent agent as the delegation-target description.
    pub description: String,
    /// System instructions for the agent's own conversation.
    pub instructions: String,
    pub tools: Vec<ToolDescriptor>,
    pub model: ResolvedModel,
    /// Maximum reasoning/tool steps per invocation.
    pub max_steps: usize,
    /// Wall-clock ceiling per invocation.
    pub timeout: Duration,
    /// When set, this agent's tools are served by the named tool server and
    /// invoked through the lifecycle manager instead of the built-in dispatch.
    pub tool_server: Option<String>,
    /// Delegation children (helpers). Empty for helpers themselves.
    pub children: Vec<Arc<AgentDescriptor>>,
}

impl AgentDescriptor {
    /// Find a delegation child by name.
    pub fn child(&self, name: &str) -> Option<&Arc<AgentDescriptor>> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Whether this agent holds a tool with the given name.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }
}
