use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::info;

use ragloop_core::config::{ModelConfig, RetryConfig};
use ragloop_core::error::Result;
use ragloop_core::retry::with_retry;
use ragloop_core::traits::LlmClient;
use ragloop_core::types::*;

/// An LLM client that retries transient request failures with backoff.
///
/// Only establishing the stream is retried; once deltas are flowing a
/// mid-stream failure is reported to the caller as-is.
pub struct RetryingClient {
    inner: Box<dyn LlmClient>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn LlmClient>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

impl LlmClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let stream = with_retry(&self.retry_config, "llm_chat", || {
                self.inner.chat_stream(&config, messages.clone())
            })
            .await?;
            info!(model = %config.model_id, "LLM stream established");
            Ok(stream)
        })
    }
}
