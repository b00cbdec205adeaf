use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Embedding errors
    #[error("Embedding request failed: {0}")]
    Embedding(String),

    // Workflow node errors
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Grading failed for document {document}: {message}")]
    GradingFailure { document: String, message: String },

    #[error("Rewrite budget exhausted after {0} rewrites")]
    RewriteExhausted(u32),

    #[error("Answer generation failed: {0}")]
    Generation(String),

    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout { operation: String, timeout_secs: u64 },

    // Graph wiring errors
    #[error("Graph error: {0}")]
    Graph(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RagError {
    /// Whether a collaborator call that failed with this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            RagError::LlmRequest(msg) | RagError::Embedding(msg) | RagError::Retrieval(msg) => {
                msg.contains("429")
                    || msg.contains("500")
                    || msg.contains("502")
                    || msg.contains("503")
                    || msg.contains("timeout")
                    || msg.contains("connection")
            }
            RagError::LlmStream(_) | RagError::Timeout { .. } => true,
            RagError::Database(msg) => msg.contains("locked") || msg.contains("busy"),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
