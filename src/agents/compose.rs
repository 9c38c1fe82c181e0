//! Sub-agent composition.
//!
//! Builds each helper agent bound to its fixed, disjoint tool subset and the
//! chosen model, then the supervising agent holding only the direct-I/O tools
//! plus the successfully built helpers as delegation targets. The supervisor
//! never receives the specialized tools directly -- capability stays inside
//! the helper responsible for it.
//!
//! Helpers that cannot be built (typically because the backing tool server is
//! degraded) are logged and silently omitted from the supervisor's delegation
//! set. Partial degradation is policy here, not a startup failure.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::types::{AgentDescriptor, HelperKind};
use crate::config::AppConfig;
use crate::error::AgentError;
use crate::models::ResolvedModel;
use crate::tools;
use crate::toolserver::{ToolServerManager, BROWSER_SERVER, SEARCH_SERVER};

// Step budgets and execution timeouts per agent. The desktop helper gets the
// largest budget: its screenshot -> grounding -> action workflow needs several
// round trips per element.
const SUPERVISOR_MAX_STEPS: usize = 10;
const SUPERVISOR_TIMEOUT: Duration = Duration::from_secs(240);
const DESKTOP_MAX_STEPS: usize = 15;
const DESKTOP_TIMEOUT: Duration = Duration::from_secs(300);
const VISION_MAX_STEPS: usize = 5;
const VISION_TIMEOUT: Duration = Duration::from_secs(180);
const BROWSER_MAX_STEPS: usize = 12;
const BROWSER_TIMEOUT: Duration = Duration::from_secs(240);
const SEARCH_MAX_STEPS: usize = 8;
const SEARCH_TIMEOUT: Duration = Duration::from_secs(240);

const DESKTOP_INSTRUCTIONS: &str = "\
You are an agent specialized in driving the desktop graphical interface.

To locate an element and click it:
1. Call screenshot() to capture the screen; it returns the PNG path.
2. Call ui_grounding(image_path=<path>, element=\"description of the element\").
3. If the result has found=true, call mouse_keyboard(operation=\"click\", x=<x>, y=<y>).
4. If found=false, refine the element description and try again -- never click
   coordinates from a found=false result.

To type text, use mouse_keyboard(operation=\"type\", text=\"...\").
To analyze what an image shows, report back so the vision agent can be asked instead.

Always finish with a clear summary of what was done or why it failed.";

const VISION_INSTRUCTIONS: &str = "\
You are an agent specialized in image analysis.

Use analyze_image(image_path=\"...\", prompt=\"...\") with a precise prompt:
- To extract text: prompt=\"Extract all visible text in this image\"
- To describe: prompt=\"Describe this image in detail\"
- To diagnose: prompt=\"Are there any errors or problems shown in this image?\"

Structure your final answer in three sections:
1. Task outcome (short version)
2. Task outcome (extremely detailed version)
3. Additional context (if relevant)";

const BROWSER_INSTRUCTIONS: &str = "\
You are an agent specialized in driving Chrome through its DevTools tools.

Recommended workflow:
1. navigate_page(url=...) to open a URL
2. take_snapshot() to get the page structure with element uids
3. click(uid=...) or fill(uid=..., value=...) to interact
4. wait_for(text=...) after navigation when the page loads slowly

Prefer take_snapshot() over take_screenshot() (faster, and the uids are
actionable). For web searches avoid Google (CAPTCHA); prefer DuckDuckGo or
Bing. Always finish with a clear summary of what was done or found.";

const SEARCH_INSTRUCTIONS: &str = "\
You are an agent specialized in web search.

Use the available search tools to find current information, then synthesize
the results. Quote the source URLs for any facts you report. Always finish
with a clear summary of what was found.";

/// Built-in supervisor instructions, used when no skills file is configured.
const DEFAULT_SKILLS: &str = "\
You are a task-planning supervisor. Solve the user's request step by step,
using your direct tools for file, shell, and clipboard work, and delegating
specialized sub-tasks to your helper agents:
- desktop_control: see the screen, locate UI elements, click and type
- vision: analyze an image or screenshot in detail
- browser: navigate and interact with web pages
- web_search: find current information on the web

Delegate by calling the helper as a tool with a precise, self-contained task
description. When the task is complete, answer the user directly.";

/// Build one helper agent bound to its tool subset and the given model.
///
/// Fails when the helper's tool source is unavailable (degraded tool server);
/// the caller decides whether that is fatal (it is not, for composition).
pub fn build_helper(
    kind: HelperKind,
    model: &ResolvedModel,
    toolservers: &ToolServerManager,
) -> Result<AgentDescriptor, AgentError> {
    let descriptor = match kind {
        HelperKind::DesktopControl => AgentDescriptor {
            name: kind.name().to_string(),
            description: "Agent specialized in driving the desktop GUI. Can take \
                          screenshots, locate UI elements precisely (vision grounding), \
                          and control the mouse and keyboard. Use it to open applications, \
                          click buttons, fill forms, and navigate the desktop. For analyzing \
                          image content, use the vision agent instead."
                .to_string(),
            instructions: DESKTOP_INSTRUCTIONS.to_string(),
            tools: tools::desktop_tools(),
            model: model.clone(),
            max_steps: DESKTOP_MAX_STEPS,
            timeout: DESKTOP_TIMEOUT,
            tool_server: None,
            children: Vec::new(),
        },
        HelperKind::Vision => AgentDescriptor {
            name: kind.name().to_string(),
            description: "Agent specialized in image analysis. Describes image content, \
                          extracts text from images, and diagnoses what screenshots show. \
                          Use it to analyze screenshots, read text out of images, and \
                          understand visual interfaces."
                .to_string(),
            instructions: VISION_INSTRUCTIONS.to_string(),
            tools: tools::vision_tools(),
            model: model.clone(),
            max_steps: VISION_MAX_STEPS,
            timeout: VISION_TIMEOUT,
            tool_server: None,
            children: Vec::new(),
        },
        HelperKind::Browser => {
            let served = toolservers.current_tools(BROWSER_SERVER);
            if served.is_empty() {
                return Err(AgentError::HelperBuildFailed {
                    name: kind.name().to_string(),
                    message: "browser tool server is not available".to_string(),
                });
            }
            AgentDescriptor {
                name: kind.name().to_string(),
                description: "Agent specialized in Chrome automation. Can navigate to URLs, \
                              snapshot pages, click elements, fill forms, run JavaScript, and \
                              extract content from web pages. Use it to visit sites, fill \
                              online forms, and pull data out of pages."
                    .to_string(),
                instructions: BROWSER_INSTRUCTIONS.to_string(),
                tools: served,
                model: model.clone(),
                max_steps: BROWSER_MAX_STEPS,
                timeout: BROWSER_TIMEOUT,
                tool_server: Some(BROWSER_SERVER.to_string()),
                children: Vec::new(),
            }
        }
        HelperKind::WebSearch => {
            let served = toolservers.current_tools(SEARCH_SERVER);
            if served.is_empty() {
                return Err(AgentError::HelperBuildFailed {
                    name: kind.name().to_string(),
                    message: "search tool server is not available".to_string(),
                });
            }
            AgentDescriptor {
                name: kind.name().to_string(),
                description: "Agent specialized in web search. Finds current information \
                              on the web and reports it with sources."
                    .to_string(),
                instructions: SEARCH_INSTRUCTIONS.to_string(),
                tools: served,
                model: model.clone(),
                max_steps: SEARCH_MAX_STEPS,
                timeout: SEARCH_TIMEOUT,
                tool_server: Some(SEARCH_SERVER.to_string()),
                children: Vec::new(),
            }
        }
    };

    Ok(descriptor)
}

/// Build the supervising agent from its direct tools and the built helpers.
pub fn build_supervisor(
    model: &ResolvedModel,
    helpers: Vec<Arc<AgentDescriptor>>,
    instructions: String,
) -> AgentDescriptor {
    AgentDescriptor {
        name: "supervisor".to_string(),
        description: String::new(),
        instructions,
        tools: tools::direct_tools(),
        model: model.clone(),
        max_steps: SUPERVISOR_MAX_STEPS,
        timeout: SUPERVISOR_TIMEOUT,
        tool_server: None,
        children: helpers,
    }
}

/// Compose the full supervisor + helpers tree for one resolved model.
///
/// All agents share the supervisor's model; the grounding and image-analysis
/// tools select their own vision model internally. Helper build failures are
/// logged and skipped.
pub async fn compose_supervisor(
    model: &ResolvedModel,
    toolservers: &ToolServerManager,
    config: &AppConfig,
) -> AgentDescriptor {
    tracing::info!(model = %model.name, category = %model.category, "composing agent system");

    let helper_results = join_all(HelperKind::ALL.map(|kind| {
        let model = model.clone();
        async move { (kind, build_helper(kind, &model, toolservers)) }
    }))
    .await;

    let mut helpers: Vec<Arc<AgentDescriptor>> = Vec::new();
    for (kind, result) in helper_results {
        match result {
            Ok(helper) => {
                tracing::info!(
                    helper = kind.name(),
                    tools = helper.tools.len(),
                    "helper agent ready"
                );
                helpers.push(Arc::new(helper));
            }
            Err(e) => {
                tracing::warn!(helper = kind.name(), "helper agent omitted: {e}");
            }
        }
    }

    let instructions = load_skills(config).await;
    let supervisor = build_supervisor(model, helpers, instructions);

    tracing::info!(
        direct_tools = supervisor.tools.len(),
        helpers = supervisor.children.len(),
        "supervisor composed"
    );
    supervisor
}

/// Load the supervisor instruction file, falling back to the built-in text.
async fn load_skills(config: &AppConfig) -> String {
    let Some(path) = &config.skills_path else {
        return DEFAULT_SKILLS.to_string();
    };
    match tokio::fs::read_to_string(path).await {
        Ok(skills) => {
            tracing::info!(path = %path.display(), chars = skills.len(), "skills loaded");
            skills
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "skills file unreadable ({e}), using built-in instructions");
            DEFAULT_SKILLS.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartialConfig;
    use crate::models::Locality;
    use crate::tools::ToolCapability;

    fn test_model() -> ResolvedModel {
        ResolvedModel {
            category: "main".to_string(),
            name: "qwen3:8b".to_string(),
            base_url: "http://localhost:11434".to_string(),
            locality: Locality::Local,
            context_window: 32768,
        }
    }

    #[tokio::test]
    async fn degraded_servers_omit_browser_and_search_helpers() {
        let model = test_model();
        let toolservers = ToolServerManager::disconnected();
        let config = PartialConfig::default().finalize();

        let supervisor = compose_supervisor(&model, &toolservers, &config).await;

        let names: Vec<&str> = supervisor.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["desktop_control", "vision"]);
        // The supervisor itself still initialized with its direct tools.
        assert_eq!(supervisor.tools.len(), 3);
    }

    #[tokio::test]
    async fn supervisor_never_holds_specialized_tools() {
        let model = test_model();
        let toolservers = ToolServerManager::disconnected();
        let config = PartialConfig::default().finalize();

        let supervisor = compose_supervisor(&model, &toolservers, &config).await;

        for tool in &supervisor.tools {
            assert!(
                !tool.capabilities.contains(&ToolCapability::PointerControl)
                    && !tool.capabilities.contains(&ToolCapability::ScreenCapture)
                    && !tool.capabilities.contains(&ToolCapability::ImageAnalysis),
                "supervisor leaked specialized tool '{}'",
                tool.name
            );
        }
    }

    #[test]
    fn helper_tool_filters_are_disjoint() {
        let model = test_model();
        let toolservers = ToolServerManager::disconnected();

        let desktop = build_helper(HelperKind::DesktopControl, &model, &toolservers).unwrap();
        let vision = build_helper(HelperKind::Vision, &model, &toolservers).unwrap();

        for tool in &desktop.tools {
            assert!(!vision.has_tool(&tool.name));
        }
        assert!(desktop.children.is_empty());
        assert!(vision.children.is_empty());
    }

    #[test]
    fn browser_helper_fails_without_live_server() {
        let model = test_model();
        let toolservers = ToolServerManager::disconnected();

        let err = build_helper(HelperKind::Browser, &model, &toolservers).unwrap_err();
        assert!(matches!(err, AgentError::HelperBuildFailed { .. }));
    }

    #[tokio::test]
    async fn missing_skills_file_falls_back_to_builtin() {
        let mut config = PartialConfig::default().finalize();
        config.skills_path = Some("/nonexistent/skills.txt".into());
        let instructions = load_skills(&config).await;
        assert!(instructions.contains("task-planning supervisor"));
    }
}
