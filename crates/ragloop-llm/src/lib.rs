pub mod providers;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

use ragloop_core::config::ModelConfig;
use ragloop_core::traits::LlmClient;

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client for the configured provider, wrapped in retry.
///
/// Ollama, vLLM, OpenAI and most hosted gateways speak the OpenAI
/// chat-completions dialect, so a single client covers them.
pub fn create_client(config: &ModelConfig) -> Arc<dyn LlmClient> {
    let retry = config.retry.clone().unwrap_or_default();
    Arc::new(RetryingClient::new(Box::new(OpenAiClient::new()), retry))
}
