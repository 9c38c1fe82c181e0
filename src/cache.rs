//! Per-category cache of composed supervisor agents.
//!
//! Composing a supervisor is expensive -- it binds several helper agents and
//! a model -- so each resolved category is built at most once per process.
//! The mutex is taken *before* the presence check, which is what makes the
//! guarantee hold: two concurrent requests for the same never-yet-built
//! category serialize on the lock, the second finds the first's entry and
//! reuses it. Builds for distinct keys carry no ordering obligations.
//!
//! The build itself is awaited while holding the lock; it suspends the task
//! instead of blocking the runtime, so the request-dispatch path stays
//! responsive. Entries are never evicted -- a process restart is the only way
//! to pick up infrastructure changes (documented limitation).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::agents::AgentDescriptor;
use crate::error::AgentError;

#[derive(Default)]
pub struct AgentCache {
    entries: Mutex<HashMap<String, Arc<AgentDescriptor>>>,
}

impl AgentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached supervisor for `category`, building it via `build`
    /// if this is the first request for that key. Build failures are not
    /// cached; the next request retries.
    pub async fn get_or_build<F, Fut>(
        &self,
        category: &str,
        build: F,
    ) -> Result<Arc<AgentDescriptor>, AgentError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AgentDescriptor, AgentError>>,
    {
        // Lock before the check: this is the mutual-exclusion region that
        // rules out duplicate builds for the same key.
        let mut entries = self.entries.lock().await;

        if let Some(existing) = entries.get(category) {
            tracing::debug!(category, "agent cache hit");
            return Ok(existing.clone());
        }

        tracing::info!(category, "agent cache miss, composing supervisor");
        let built = Arc::new(build().await?);
        entries.insert(category.to_string(), built.clone());
        Ok(built)
    }

    /// Number of cached entries (for diagnostics).
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
