//! PartialConfig merging and finalization.
//!
//! Precedence: CLI > environment > global config file > defaults. Each layer
//! is a [`PartialConfig`]; `with_fallback` fills holes from the next layer
//! down, `finalize` applies defaults to whatever is still unset.

use std::path::PathBuf;

use super::schema::{AppConfig, PartialConfig};

/// Default inbound bind address (loopback -- the gateway proxies to us).
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Default local inference server address.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default cloud endpoint for the GLM-backed categories.
pub const DEFAULT_ZAI_URL: &str = "https://api.z.ai/api/coding/paas/v4";

/// Default number of history turns rendered into the prompt prefix.
pub const DEFAULT_HISTORY_TURNS: usize = 10;

impl PartialConfig {
    /// Fill any unset fields from `other` (lower priority).
    pub fn with_fallback(mut self, other: PartialConfig) -> PartialConfig {
        self.bind_addr = self.bind_addr.or(other.bind_addr);
        self.history_turns = self.history_turns.or(other.history_turns);
        self.ollama_base_url = self.ollama_base_url.or(other.ollama_base_url);
        self.default_category = self.default_category.or(other.default_category);
        self.zai_base_url = self.zai_base_url.or(other.zai_base_url);
        self.zai_api_key = self.zai_api_key.or(other.zai_api_key);
        self.screenshot_dir = self.screenshot_dir.or(other.screenshot_dir);
        self.skills_path = self.skills_path.or(other.skills_path);
        self
    }

    /// Apply defaults to any still-unset fields and produce the resolved config.
    pub fn finalize(self) -> AppConfig {
        AppConfig {
            bind_addr: self.bind_addr.unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            history_turns: self.history_turns.unwrap_or(DEFAULT_HISTORY_TURNS),
            ollama_base_url: self
                .ollama_base_url
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            default_category: self.default_category,
            zai_base_url: self.zai_base_url.unwrap_or_else(|| DEFAULT_ZAI_URL.to_string()),
            zai_api_key: self.zai_api_key,
            screenshot_dir: self
                .screenshot_dir
                .unwrap_or_else(|| std::env::temp_dir().join("conductor-shots")),
            skills_path: self.skills_path,
        }
    }
}

/// Build the environment layer from process variables.
///
/// `ZAI_API_KEY` is only ever read here -- the credential never appears in a
/// config file or CLI flag.
pub fn env_partial() -> PartialConfig {
    PartialConfig {
        bind_addr: std::env::var("CONDUCTOR_BIND").ok(),
        history_turns: None,
        ollama_base_url: std::env::var("OLLAMA_BASE_URL").ok(),
        default_category: std::env::var("DEFAULT_MODEL").ok(),
        zai_base_url: std::env::var("ZAI_BASE_URL").ok(),
        zai_api_key: std::env::var("ZAI_API_KEY").ok().filter(|k| !k.is_empty()),
        screenshot_dir: std::env::var("SCREENSHOT_DIR").ok().map(PathBuf::from),
        skills_path: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_fallback_prefers_self() {
        let high = PartialConfig {
            bind_addr: Some("0.0.0.0:9000".into()),
            ..Default::default()
        };
        let low = PartialConfig {
            bind_addr: Some("127.0.0.1:8000".into()),
            ollama_base_url: Some("http://ollama:11434".into()),
            ..Default::default()
        };

        let merged = high.with_fallback(low);
        assert_eq!(merged.bind_addr.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(
            merged.ollama_base_url.as_deref(),
            Some("http://ollama:11434")
        );
    }

    #[test]
    fn finalize_applies_defaults() {
        let config = PartialConfig::default().finalize();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.ollama_base_url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.zai_base_url, DEFAULT_ZAI_URL);
        assert_eq!(config.history_turns, DEFAULT_HISTORY_TURNS);
        assert!(config.zai_api_key.is_none());
        assert!(config.default_category.is_none());
    }

    #[test]
    fn finalize_keeps_explicit_values() {
        let config = PartialConfig {
            default_category: Some("reason".into()),
            zai_api_key: Some("sk-test".into()),
            ..Default::default()
        }
        .finalize();
        assert_eq!(config.default_category.as_deref(), Some("reason"));
        assert_eq!(config.zai_api_key.as_deref(), Some("sk-test"));
    }
}
