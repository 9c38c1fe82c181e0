//! Thin HTTP surface over the local Ollama server.
//!
//! Two operations are needed by the orchestration core: the `/api/tags` model
//! listing (consumed by the model registry and the grounding pipeline's vision
//! detection) and a single-shot `/api/chat` call carrying a base64 image
//! (consumed by grounding and the analyze_image tool). Everything else goes
//! through the genai client.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::error::ModelError;

/// Timeout for the `/api/tags` probe. Listing models is cheap; a slow answer
/// means the server is not usable anyway.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// List the model names currently installed on the Ollama server.
pub async fn list_models(base_url: &str) -> Result<Vec<String>, ModelError> {
    let http = reqwest::Client::new();
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));

    let resp = http
        .get(&url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelError::OllamaUnavailable {
            url: url.clone(),
            message: format!("Is Ollama running? {e}"),
        })?;

    let tags: TagsResponse = resp.json().await.map_err(|e| ModelError::OllamaUnavailable {
        url,
        message: format!("Malformed /api/tags response: {e}"),
    })?;

    Ok(tags.models.into_iter().map(|m| m.name).collect())
}

/// Failure modes of a single-shot `/api/chat` call.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("timeout after {secs}s -- model may not be loaded")]
    Timeout { secs: u64 },

    #[error("Ollama not reachable: {0}")]
    Request(String),

    #[error("Malformed /api/chat response: {0}")]
    Malformed(String),
}

/// Run a single non-streamed `/api/chat` completion with an attached image.
///
/// The image is sent base64-encoded in the Ollama-native `images` field.
/// `temperature` is passed through verbatim -- grounding uses 0.0 for
/// deterministic decoding.
pub async fn chat_with_image(
    base_url: &str,
    model: &str,
    prompt: &str,
    image_b64: &str,
    temperature: f64,
    timeout: Duration,
) -> Result<String, ChatError> {
    let http = reqwest::Client::new();
    let url = format!("{}/api/chat", base_url.trim_end_matches('/'));

    let body = json!({
        "model": model,
        "messages": [
            {
                "role": "user",
                "content": prompt,
                "images": [image_b64],
            }
        ],
        "stream": false,
        "options": {
            "temperature": temperature,
            "num_ctx": 32768,
        },
    });

    let resp = http
        .post(&url)
        .json(&body)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ChatError::Timeout {
                    secs: timeout.as_secs(),
                }
            } else {
                ChatError::Request(e.to_string())
            }
        })?;

    let resp = resp
        .error_for_status()
        .map_err(|e| ChatError::Request(format!("Ollama chat failed: {e}")))?;

    let chat: ChatResponse = resp
        .json()
        .await
        .map_err(|e| ChatError::Malformed(e.to_string()))?;

    Ok(chat
        .message
        .map(|m| m.content.trim().to_string())
        .unwrap_or_default())
}
