use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Top-level ragloop configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model used by the Generator.
    #[serde(default)]
    pub model: ModelConfig,
    /// Optional separate model for the decision nodes (analyzer, grader, rewriter).
    /// Falls back to `model` in deterministic mode.
    #[serde(default)]
    pub grader_model: Option<ModelConfig>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Full chat-completions URL. Defaults to the local Ollama endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            extra_headers: HashMap::new(),
            retry: None,
        }
    }
}

impl ModelConfig {
    /// Low-variance copy of this config, used for classification and rewriting.
    pub fn deterministic(&self) -> Self {
        Self {
            temperature: 0.0,
            ..self.clone()
        }
    }

    /// Resolved chat endpoint.
    pub fn endpoint(&self) -> &str {
        self.base_url.as_deref().unwrap_or(match self.provider.as_str() {
            "openai" => OPENAI_CHAT_URL,
            _ => OLLAMA_CHAT_URL,
        })
    }
}

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const OLLAMA_CHAT_URL: &str = "http://localhost:11434/v1/chat/completions";

fn default_provider() -> String { "ollama".to_string() }
fn default_model_id() -> String { "qwen3:latest".to_string() }
fn default_max_tokens() -> u32 { 2048 }
fn default_temperature() -> f32 { 0.7 }

/// Retry configuration for collaborator calls (LLM and vector store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 500 }
fn default_max_backoff() -> u64 { 8000 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Base URL of an OpenAI-compatible API; `/embeddings` is appended.
    #[serde(default = "default_embedding_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_dims")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            base_url: default_embedding_url(),
            api_key: None,
            dimensions: default_embedding_dims(),
        }
    }
}

fn default_embedding_model() -> String { "qwen3-embedding".to_string() }
fn default_embedding_url() -> String { "http://localhost:11434/v1".to_string() }
fn default_embedding_dims() -> usize { 1024 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file holding chunks and their embeddings.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Collection name, so several corpora can share one file.
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            collection: default_collection(),
            retry: None,
        }
    }
}

fn default_db_path() -> String { "~/.ragloop/index.db".to_string() }
fn default_collection() -> String { "default".to_string() }

/// How per-document verdicts are folded into a single "has relevant material" bit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelevancePolicy {
    /// At least one relevant document (recall-favoring).
    #[default]
    Any,
    /// Strictly more than half of the documents are relevant.
    Majority,
    /// Every document is relevant.
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Upper bound on question rewrites per run.
    #[serde(default = "default_max_rewrites")]
    pub max_rewrites: u32,
    /// Documents requested per retrieval.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum in-flight grading calls.
    #[serde(default = "default_grader_concurrency")]
    pub grader_concurrency: usize,
    /// Deadline applied to every collaborator call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    #[serde(default)]
    pub relevance_policy: RelevancePolicy,
    /// Hard cap on node invocations per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Reasoning turns allowed in reasoning-agent mode before a final
    /// answer is forced.
    #[serde(default = "default_react_max_steps")]
    pub react_max_steps: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_rewrites: default_max_rewrites(),
            top_k: default_top_k(),
            grader_concurrency: default_grader_concurrency(),
            call_timeout_secs: default_call_timeout(),
            relevance_policy: RelevancePolicy::default(),
            max_steps: default_max_steps(),
            react_max_steps: default_react_max_steps(),
        }
    }
}

fn default_max_rewrites() -> u32 { 2 }
fn default_top_k() -> usize { 3 }
fn default_grader_concurrency() -> usize { 4 }
fn default_call_timeout() -> u64 { 60 }
fn default_max_steps() -> usize { 32 }
fn default_react_max_steps() -> u32 { 5 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Pages per batch; a checkpoint is written after each batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Progress file. Default: `progress.json` next to the database.
    #[serde(default)]
    pub checkpoint_path: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            checkpoint_path: None,
        }
    }
}

fn default_batch_size() -> usize { 10 }
fn default_chunk_size() -> usize { 500 }
fn default_chunk_overlap() -> usize { 100 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| RagError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| RagError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the workflow cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.workflow.top_k == 0 {
            return Err(RagError::Config("workflow.top_k must be at least 1".into()));
        }
        if self.workflow.grader_concurrency == 0 {
            return Err(RagError::Config(
                "workflow.grader_concurrency must be at least 1".into(),
            ));
        }
        if self.workflow.call_timeout_secs == 0 {
            return Err(RagError::Config(
                "workflow.call_timeout_secs must be at least 1".into(),
            ));
        }
        if self.workflow.react_max_steps == 0 {
            return Err(RagError::Config(
                "workflow.react_max_steps must be at least 1".into(),
            ));
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(RagError::Config(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }
        if self.ingest.batch_size == 0 {
            return Err(RagError::Config("ingest.batch_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Model used by the decision nodes, always in deterministic mode.
    pub fn decision_model(&self) -> ModelConfig {
        self.grader_model
            .as_ref()
            .unwrap_or(&self.model)
            .deterministic()
    }

    /// Resolve the database path (expand ~).
    pub fn db_path(&self) -> PathBuf {
        expand_home(&self.store.db_path)
    }

    /// Resolve the ingestion checkpoint path.
    pub fn checkpoint_path(&self) -> PathBuf {
        match &self.ingest.checkpoint_path {
            Some(p) => expand_home(p),
            None => {
                let db = self.db_path();
                db.parent()
                    .map(|dir| dir.join("progress.json"))
                    .unwrap_or_else(|| PathBuf::from("progress.json"))
            }
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_RAGLOOP_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_RAGLOOP_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_RAGLOOP_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_RAGLOOP_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_RAGLOOP_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.model.provider, "ollama");
        assert_eq!(config.model.model_id, "qwen3:latest");
        assert!((config.model.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.workflow.max_rewrites, 2);
        assert_eq!(config.workflow.top_k, 3);
        assert_eq!(config.workflow.grader_concurrency, 4);
        assert_eq!(config.workflow.relevance_policy, RelevancePolicy::Any);
        assert_eq!(config.ingest.batch_size, 10);
        assert_eq!(config.ingest.chunk_size, 500);
        assert_eq!(config.ingest.chunk_overlap, 100);
        assert_eq!(config.embedding.model, "qwen3-embedding");
        assert!(config.grader_model.is_none());
    }

    #[test]
    fn test_decision_model_is_deterministic() {
        let toml_str = r#"
[model]
model_id = "qwen3:latest"
temperature = 0.9
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let decision = config.decision_model();
        assert_eq!(decision.model_id, "qwen3:latest");
        assert_eq!(decision.temperature, 0.0);
        assert!((config.model.temperature - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_grader_model_override() {
        let toml_str = r#"
[model]
model_id = "big-model"

[grader_model]
model_id = "small-model"
temperature = 0.4
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let decision = config.decision_model();
        assert_eq!(decision.model_id, "small-model");
        assert_eq!(decision.temperature, 0.0);
    }

    #[test]
    fn test_relevance_policy_parsing() {
        let config: AppConfig = toml::from_str(
            r#"
[workflow]
relevance_policy = "majority"
"#,
        )
        .unwrap();
        assert_eq!(config.workflow.relevance_policy, RelevancePolicy::Majority);
    }

    #[test]
    fn test_validate_rejects_bad_chunking() {
        let mut config = AppConfig::default();
        config.ingest.chunk_overlap = 500;
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut config = AppConfig::default();
        config.workflow.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_resolution() {
        let mut model = ModelConfig::default();
        assert_eq!(model.endpoint(), OLLAMA_CHAT_URL);
        model.provider = "openai".into();
        assert_eq!(model.endpoint(), OPENAI_CHAT_URL);
        model.base_url = Some("http://gpu-box:8000/v1/chat/completions".into());
        assert_eq!(model.endpoint(), "http://gpu-box:8000/v1/chat/completions");
    }

    #[test]
    fn test_checkpoint_path_defaults_next_to_db() {
        let mut config = AppConfig::default();
        config.store.db_path = "/tmp/ragloop/index.db".into();
        assert_eq!(
            config.checkpoint_path(),
            PathBuf::from("/tmp/ragloop/progress.json")
        );
    }
}
