use serde::Deserialize;
use std::path::PathBuf;

/// The TOML file structure for conductor.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub server: Option<ServerConfig>,
    pub models: Option<ModelsConfig>,
    pub desktop: Option<DesktopConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: Option<String>,
    /// How many history turns are rendered into the prompt prefix.
    pub history_turns: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ModelsConfig {
    pub ollama_base_url: Option<String>,
    /// Default model category when a request does not name one.
    pub default_category: Option<String>,
    pub zai_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DesktopConfig {
    pub screenshot_dir: Option<String>,
    /// Supervisor instruction file; a built-in fallback applies when absent.
    pub skills_path: Option<String>,
}

/// Fully-resolved runtime configuration. All fields have values except the
/// genuinely optional ones (cloud credential, default-category override).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub history_turns: usize,
    pub ollama_base_url: String,
    /// Explicit default category; when `None` the registry picks one
    /// (cloud "reason" if the credential is present, else "main").
    pub default_category: Option<String>,
    pub zai_base_url: String,
    /// Absent credential silently disables cloud-backed categories.
    pub zai_api_key: Option<String>,
    pub screenshot_dir: PathBuf,
    pub skills_path: Option<PathBuf>,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub bind_addr: Option<String>,
    pub history_turns: Option<usize>,
    pub ollama_base_url: Option<String>,
    pub default_category: Option<String>,
    pub zai_base_url: Option<String>,
    pub zai_api_key: Option<String>,
    pub screenshot_dir: Option<PathBuf>,
    pub skills_path: Option<PathBuf>,
}

impl ConfigFile {
    /// Flatten the sectioned TOML structure into a PartialConfig for merging.
    pub fn to_partial(&self) -> PartialConfig {
        PartialConfig {
            bind_addr: self.server.as_ref().and_then(|s| s.bind_addr.clone()),
            history_turns: self.server.as_ref().and_then(|s| s.history_turns),
            ollama_base_url: self.models.as_ref().and_then(|m| m.ollama_base_url.clone()),
            default_category: self.models.as_ref().and_then(|m| m.default_category.clone()),
            zai_base_url: self.models.as_ref().and_then(|m| m.zai_base_url.clone()),
            zai_api_key: None,
            screenshot_dir: self
                .desktop
                .as_ref()
                .and_then(|d| d.screenshot_dir.as_ref().map(PathBuf::from)),
            skills_path: self
                .desktop
                .as_ref()
                .and_then(|d| d.skills_path.as_ref().map(PathBuf::from)),
        }
    }
}
