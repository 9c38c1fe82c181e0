//! Model category resolution.
//!
//! Maps abstract categories ("fast", "main", "smart", "vision", plus the
//! cloud-backed "code" and "reason") to concrete inference targets. Local
//! categories are resolved by probing the Ollama `/api/tags` listing once and
//! walking each category's preference list in order; cloud categories map to
//! fixed GLM models on the configured Z.ai endpoint.
//!
//! The probe result is cached for the process lifetime (`OnceCell`), so
//! resolution is idempotent: a category resolves to the same concrete model
//! for as long as the process lives. Picking up infrastructure changes
//! (models pulled or removed, servers moved) requires a restart -- a
//! documented limitation, not a bug to fix reactively.

use std::collections::HashMap;

use genai::adapter::AdapterKind;
use genai::resolver::{AuthData, Endpoint, ServiceTargetResolver};
use genai::{Client, ModelIden, ServiceTarget};
use tokio::sync::OnceCell;

use crate::config::AppConfig;
use crate::error::ModelError;
use crate::ollama;

/// Ordered preference lists per local category. The first installed model wins.
pub const MODEL_PREFERENCES: &[(&str, &[&str])] = &[
    ("fast", &["gemma3:latest", "qwen3:4b", "gemma3n:latest"]),
    ("smart", &["qwen3:8b", "qwen3:4b", "gemma3n:latest", "gemma3:latest"]),
    ("main", &["qwen3:8b", "qwen3:4b", "gemma3n:latest", "gemma3:latest"]),
    ("vision", &["qwen3-vl:8b", "qwen3-vl:2b", "qwen3-vl:4b", "llama3.2-vision"]),
];

/// Cloud-backed categories and their concrete GLM models.
pub const CLOUD_MODELS: &[(&str, &str)] = &[("code", "glm-4.7-flash"), ("reason", "glm-4.7")];

/// The fallback category when a requested one cannot be resolved.
pub const FALLBACK_CATEGORY: &str = "main";

/// Context window requested for local models.
const LOCAL_CONTEXT_WINDOW: u32 = 32768;

/// Where a resolved model is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    Local,
    Cloud,
}

/// The concrete inference target bound to a category. Created on first
/// successful probe, immutable thereafter.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub category: String,
    /// Concrete model name, e.g. "qwen3:8b" or "glm-4.7".
    pub name: String,
    pub base_url: String,
    pub locality: Locality,
    pub context_window: u32,
}

impl ResolvedModel {
    pub fn is_cloud(&self) -> bool {
        self.locality == Locality::Cloud
    }
}

/// Immutable snapshot produced by the one-time probe.
#[derive(Debug, Default)]
struct ProbeResult {
    /// Raw `/api/tags` listing (empty when Ollama was unreachable).
    ollama_models: Vec<String>,
    /// Category -> resolved target, in a stable iteration order for /models.
    resolved: Vec<(String, ResolvedModel)>,
}

impl ProbeResult {
    fn get(&self, category: &str) -> Option<&ResolvedModel> {
        self.resolved
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, m)| m)
    }
}

/// Process-wide registry. Construct once at startup and share by reference.
pub struct ModelRegistry {
    ollama_base_url: String,
    zai_base_url: String,
    zai_api_key: Option<String>,
    configured_default: Option<String>,
    probe: OnceCell<ProbeResult>,
}

impl ModelRegistry {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            ollama_base_url: config.ollama_base_url.clone(),
            zai_base_url: config.zai_base_url.clone(),
            zai_api_key: config.zai_api_key.clone(),
            configured_default: config.default_category.clone(),
            probe: OnceCell::new(),
        }
    }

    /// Probe the inference infrastructure once and cache the outcome.
    async fn probe(&self) -> &ProbeResult {
        self.probe
            .get_or_init(|| async {
                let ollama_models = match ollama::list_models(&self.ollama_base_url).await {
                    Ok(models) => {
                        tracing::info!(count = models.len(), "Ollama models detected");
                        models
                    }
                    Err(e) => {
                        tracing::warn!("Ollama not accessible: {e}");
                        Vec::new()
                    }
                };

                let mut resolved: Vec<(String, ResolvedModel)> = Vec::new();

                for (category, preferences) in MODEL_PREFERENCES {
                    match preferences.iter().find(|p| ollama_models.iter().any(|m| m == *p)) {
                        Some(name) => {
                            tracing::info!(category, model = name, "category resolved");
                            resolved.push((
                                category.to_string(),
                                ResolvedModel {
                                    category: category.to_string(),
                                    name: name.to_string(),
                                    base_url: self.ollama_base_url.clone(),
                                    locality: Locality::Local,
                                    context_window: LOCAL_CONTEXT_WINDOW,
                                },
                            ));
                        }
                        None => {
                            tracing::warn!(
                                category,
                                ?preferences,
                                "no installed model matches category preferences"
                            );
                        }
                    }
                }

                for (category, name) in CLOUD_MODELS {
                    resolved.push((
                        category.to_string(),
                        ResolvedModel {
                            category: category.to_string(),
                            name: name.to_string(),
                            base_url: self.zai_base_url.clone(),
                            locality: Locality::Cloud,
                            context_window: LOCAL_CONTEXT_WINDOW,
                        },
                    ));
                }

                ProbeResult {
                    ollama_models,
                    resolved,
                }
            })
            .await
    }

    /// Resolve a category to its concrete model.
    ///
    /// Unknown categories fall back to [`FALLBACK_CATEGORY`], then to any
    /// resolved local category, before failing. Cloud categories fail with
    /// [`ModelError::CredentialMissing`] when the API key is absent -- never
    /// silently routed to the cloud without one.
    pub async fn resolve(&self, category: &str) -> Result<ResolvedModel, ModelError> {
        let probe = self.probe().await;

        let model = match probe.get(category) {
            Some(m) => m.clone(),
            None => match self.fallback(probe) {
                Some(m) => {
                    tracing::warn!(
                        requested = category,
                        fallback = %m.category,
                        "category not resolvable, using fallback"
                    );
                    m
                }
                None => {
                    // No local target at all. Cloud categories are never an
                    // implicit fallback (that would silently route local work
                    // to the cloud), so with no credential this is the one
                    // fatal condition; with one, only the requested category
                    // is unavailable.
                    let any_usable = probe
                        .resolved
                        .iter()
                        .any(|(_, m)| !m.is_cloud() || self.zai_api_key.is_some());
                    return Err(if any_usable {
                        ModelError::ModelUnavailable {
                            category: category.to_string(),
                            preferences: preference_list(category),
                        }
                    } else {
                        ModelError::NoModelsResolvable
                    });
                }
            },
        };

        if model.is_cloud() && self.zai_api_key.is_none() {
            return Err(ModelError::CredentialMissing {
                category: model.category.clone(),
                credential: "ZAI_API_KEY".to_string(),
            });
        }

        Ok(model)
    }

    /// Pick the fallback target: "main" when resolved, else the first
    /// resolved local category (cloud entries are never an implicit fallback).
    fn fallback(&self, probe: &ProbeResult) -> Option<ResolvedModel> {
        if let Some(m) = probe.get(FALLBACK_CATEGORY) {
            return Some(m.clone());
        }
        probe
            .resolved
            .iter()
            .find(|(_, m)| !m.is_cloud())
            .map(|(_, m)| m.clone())
    }

    /// The category used when a request does not name one.
    ///
    /// Priority: configured override (DEFAULT_MODEL) when it resolves, then
    /// "reason" when the cloud credential is present, then "main".
    pub async fn default_category(&self) -> String {
        let probe = self.probe().await;

        if let Some(configured) = &self.configured_default {
            if probe.get(configured).is_some() {
                tracing::debug!(category = %configured, "default category from configuration");
                return configured.clone();
            }
            tracing::warn!(
                category = %configured,
                "configured default category did not resolve, ignoring"
            );
        }

        if self.zai_api_key.is_some() {
            return "reason".to_string();
        }

        FALLBACK_CATEGORY.to_string()
    }

    /// Raw Ollama listing captured by the probe (for /models and grounding).
    pub async fn ollama_models(&self) -> Vec<String> {
        self.probe().await.ollama_models.clone()
    }

    /// Snapshot of every resolved category (for the /models endpoint).
    pub async fn resolved_categories(&self) -> Vec<ResolvedModel> {
        self.probe()
            .await
            .resolved
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Whether request handling is possible at all. The only fatal startup
    /// condition is an empty resolution table.
    pub async fn any_resolvable(&self) -> bool {
        let probe = self.probe().await;
        probe
            .resolved
            .iter()
            .any(|(_, m)| !m.is_cloud() || self.zai_api_key.is_some())
    }

    /// Build a genai client bound to the resolved model's endpoint.
    ///
    /// Local models use the default client (the Ollama adapter picks up
    /// unprefixed model names). Cloud models get a service-target resolver
    /// pointing every call at the OpenAI-compatible Z.ai endpoint with the
    /// configured bearer credential.
    pub fn make_client(&self, model: &ResolvedModel) -> Client {
        if !model.is_cloud() {
            return Client::default();
        }

        // resolve() refuses cloud categories without a credential, so this is
        // only reached with a key present.
        let endpoint_url = format!("{}/", model.base_url.trim_end_matches('/'));
        let api_key = self.zai_api_key.clone().unwrap_or_default();

        let target_resolver = ServiceTargetResolver::from_resolver_fn(
            move |service_target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
                let ServiceTarget { model, .. } = service_target;
                let endpoint = Endpoint::from_owned(endpoint_url.clone());
                let auth = AuthData::from_single(api_key.clone());
                let model = ModelIden::new(AdapterKind::OpenAI, model.model_name);
                Ok(ServiceTarget {
                    endpoint,
                    auth,
                    model,
                })
            },
        );

        Client::builder()
            .with_service_target_resolver(target_resolver)
            .build()
    }
}

/// The preference list for a category, for error reporting.
fn preference_list(category: &str) -> Vec<String> {
    MODEL_PREFERENCES
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, prefs)| prefs.iter().map(|s| s.to_string()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartialConfig;

    fn test_config(zai_key: Option<&str>, default: Option<&str>) -> AppConfig {
        let mut config = PartialConfig::default().finalize();
        config.zai_api_key = zai_key.map(String::from);
        config.default_category = default.map(String::from);
        config
    }

    /// Build a registry whose probe is pre-seeded with a fixed Ollama listing,
    /// bypassing the network.
    fn seeded_registry(config: &AppConfig, installed: &[&str]) -> ModelRegistry {
        let registry = ModelRegistry::new(config);

        let ollama_models: Vec<String> = installed.iter().map(|s| s.to_string()).collect();
        let mut resolved: Vec<(String, ResolvedModel)> = Vec::new();
        for (category, preferences) in MODEL_PREFERENCES {
            if let Some(name) = preferences.iter().find(|p| ollama_models.iter().any(|m| m == *p)) {
                resolved.push((
                    category.to_string(),
                    ResolvedModel {
                        category: category.to_string(),
                        name: name.to_string(),
                        base_url: config.ollama_base_url.clone(),
                        locality: Locality::Local,
                        context_window: LOCAL_CONTEXT_WINDOW,
                    },
                ));
            }
        }
        for (category, name) in CLOUD_MODELS {
            resolved.push((
                category.to_string(),
                ResolvedModel {
                    category: category.to_string(),
                    name: name.to_string(),
                    base_url: config.zai_base_url.clone(),
                    locality: Locality::Cloud,
                    context_window: LOCAL_CONTEXT_WINDOW,
                },
            ));
        }

        registry
            .probe
            .set(ProbeResult {
                ollama_models,
                resolved,
            })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn preference_order_is_stable() {
        let config = test_config(None, None);
        // "main" prefers qwen3:8b > qwen3:4b; with only the latter two
        // installed, qwen3:4b must win every time.
        let registry = seeded_registry(&config, &["qwen3:4b", "gemma3n:latest"]);

        for _ in 0..3 {
            let resolved = registry.resolve("main").await.unwrap();
            assert_eq!(resolved.name, "qwen3:4b");
        }
    }

    #[tokio::test]
    async fn unknown_category_falls_back_to_main() {
        let config = test_config(None, None);
        let registry = seeded_registry(&config, &["qwen3:8b"]);

        let resolved = registry.resolve("no-such-category").await.unwrap();
        assert_eq!(resolved.category, "main");
        assert_eq!(resolved.name, "qwen3:8b");
    }

    #[tokio::test]
    async fn cloud_category_without_credential_is_rejected() {
        let config = test_config(None, None);
        let registry = seeded_registry(&config, &["qwen3:8b"]);

        let err = registry.resolve("reason").await.unwrap_err();
        assert!(matches!(err, ModelError::CredentialMissing { .. }));
    }

    #[tokio::test]
    async fn cloud_category_with_credential_resolves() {
        let config = test_config(Some("sk-test"), None);
        let registry = seeded_registry(&config, &[]);

        let resolved = registry.resolve("reason").await.unwrap();
        assert_eq!(resolved.name, "glm-4.7");
        assert!(resolved.is_cloud());
    }

    #[tokio::test]
    async fn no_local_models_and_no_credential_is_fatal() {
        let config = test_config(None, None);
        let registry = seeded_registry(&config, &[]);

        // Cloud entries exist but are unusable without the credential.
        assert!(!registry.any_resolvable().await);
        // Nothing is usable at all: the one fatal condition.
        let err = registry.resolve("main").await.unwrap_err();
        assert!(matches!(err, ModelError::NoModelsResolvable));
    }

    #[tokio::test]
    async fn cloud_is_never_an_implicit_fallback() {
        // Credential present, no local models: "reason" works directly, but a
        // local category must not silently route to the cloud.
        let config = test_config(Some("sk-test"), None);
        let registry = seeded_registry(&config, &[]);

        assert!(registry.resolve("reason").await.is_ok());
        let err = registry.resolve("main").await.unwrap_err();
        assert!(matches!(err, ModelError::ModelUnavailable { .. }));
    }

    #[tokio::test]
    async fn default_category_prefers_configured_then_cloud_then_main() {
        let with_key = test_config(Some("sk-test"), None);
        let registry = seeded_registry(&with_key, &["qwen3:8b"]);
        assert_eq!(registry.default_category().await, "reason");

        let no_key = test_config(None, None);
        let registry = seeded_registry(&no_key, &["qwen3:8b"]);
        assert_eq!(registry.default_category().await, "main");

        let configured = test_config(Some("sk-test"), Some("fast"));
        let registry = seeded_registry(&configured, &["gemma3:latest"]);
        assert_eq!(registry.default_category().await, "fast");
    }

    #[tokio::test]
    async fn resolution_is_idempotent_within_process() {
        let config = test_config(None, None);
        let registry = seeded_registry(&config, &["qwen3:8b", "qwen3-vl:2b"]);

        let first = registry.resolve("vision").await.unwrap();
        let second = registry.resolve("vision").await.unwrap();
        assert_eq!(first.name, second.name);
        assert_eq!(first.name, "qwen3-vl:2b");
    }
}
