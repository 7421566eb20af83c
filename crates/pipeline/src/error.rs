use webui_core::error::CoreError;

/// Errors raised while running a generation.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A domain-level error (validation, forbidden path, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No engine is configured to serve generations.
    #[error("No diffusion engine configured")]
    EngineUnavailable,

    /// The engine rejected or failed the request.
    #[error("Engine error ({status}): {body}")]
    Engine { status: u16, body: String },

    /// A script hook failed while handling the request.
    #[error("Script '{script}' failed: {message}")]
    Script { script: String, message: String },

    /// Transport error talking to a remote engine.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed generation metadata.
    #[error("Invalid generation info JSON: {0}")]
    Json(#[from] serde_json::Error),
}
