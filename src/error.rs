use std::path::PathBuf;

/// Errors related to model category resolution.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Ollama not reachable at {url}: {message}")]
    OllamaUnavailable { url: String, message: String },

    #[error("No model available for category '{category}' (preferences: {preferences:?})")]
    ModelUnavailable {
        category: String,
        preferences: Vec<String>,
    },

    #[error("Cloud category '{category}' requires {credential} to be set")]
    CredentialMissing {
        category: String,
        credential: String,
    },

    #[error("No models resolvable at all -- is Ollama running and are any models pulled?")]
    NoModelsResolvable,
}

/// Errors related to external tool-server sessions.
#[derive(Debug, thiserror::Error)]
pub enum ToolServerError {
    #[error("Failed to spawn tool server '{server_id}': {message}")]
    SpawnFailed { server_id: String, message: String },

    #[error("Tool server '{server_id}' handshake failed: {message}")]
    HandshakeFailed { server_id: String, message: String },

    #[error("Tool server '{server_id}' request timed out after {timeout_secs}s")]
    RequestTimeout { server_id: String, timeout_secs: u64 },

    #[error("Tool server '{server_id}' protocol error: {message}")]
    ProtocolError { server_id: String, message: String },

    #[error("Tool server '{server_id}' is not available (state: {state})")]
    NotAvailable { server_id: String, state: String },
}

/// Errors related to the GUI grounding pipeline.
///
/// An *unparseable* model answer is not an error -- it becomes a
/// `GroundingResult { found: false, .. }` so the calling agent can retry with
/// a refined description. Only infrastructure failures surface here.
#[derive(Debug, thiserror::Error)]
pub enum GroundingError {
    #[error("Screenshot not found: {path}")]
    ImageNotFound { path: PathBuf },

    #[error("Failed to read image {path}: {message}")]
    ImageUnreadable { path: PathBuf, message: String },

    #[error("No vision-capable model available -- pull one with `ollama pull qwen3-vl:2b`")]
    NoVisionModelAvailable,

    #[error("Vision model call timed out after {timeout_secs}s")]
    GroundingTimeout { timeout_secs: u64 },

    #[error("Vision model call failed: {0}")]
    VisionCallFailed(String),
}

/// Errors related to agent construction and invocation.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Failed to build helper agent '{name}': {message}")]
    HelperBuildFailed { name: String, message: String },

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Agent invocation exceeded its {timeout_secs}s execution timeout")]
    InvocationTimeout { timeout_secs: u64 },

    #[error("Agent invocation exhausted its step budget of {max_steps} without a final answer")]
    StepBudgetExhausted { max_steps: usize },
}
