use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Streaming chat completion client.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;

    /// Single-prompt completion: sends `prompt` as one user message and
    /// concatenates the streamed text.
    fn complete<'a>(
        &'a self,
        config: &'a ModelConfig,
        prompt: String,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut stream = self
                .chat_stream(config, vec![ChatMessage::user(prompt)])
                .await?;

            let mut text = String::new();
            while let Some(delta) = stream.next().await {
                match delta? {
                    StreamDelta::TextDelta(chunk) => text.push_str(&chunk),
                    StreamDelta::Stop(_) => break,
                    StreamDelta::Usage { .. } => {}
                }
            }
            Ok(text)
        })
    }
}

/// Similarity search over indexed chunks.
pub trait VectorStore: Send + Sync + 'static {
    /// Return up to `k` documents ordered by descending score.
    fn similarity_search(&self, query: &str, k: usize) -> BoxFuture<'_, Result<Vec<Document>>>;

    /// Idempotent upsert keyed by `NewDocument::id`. Returns the number of
    /// chunks that were not already present.
    fn add_documents(&self, docs: Vec<NewDocument>) -> BoxFuture<'_, Result<usize>>;

    /// Flush any buffered state to durable storage.
    fn persist(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Number of indexed chunks.
    fn count(&self) -> BoxFuture<'_, Result<usize>>;
}

/// Embedding provider (OpenAI-compatible APIs, Ollama, ...).
pub trait EmbeddingProvider: Send + Sync + 'static {
    /// Embed a batch of texts into vectors.
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>>;

    /// Number of dimensions in the embedding vectors.
    fn dimensions(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::types::StopReason;

    struct Canned(Vec<&'static str>);

    impl LlmClient for Canned {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            _messages: Vec<ChatMessage>,
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            let mut deltas: Vec<Result<StreamDelta>> = self
                .0
                .iter()
                .map(|s| Ok(StreamDelta::TextDelta(s.to_string())))
                .collect();
            deltas.push(Ok(StreamDelta::Stop(StopReason::EndTurn)));
            Box::pin(async move {
                Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, _>)
            })
        }
    }

    struct Broken;

    impl LlmClient for Broken {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            _messages: Vec<ChatMessage>,
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            Box::pin(async {
                let deltas: Vec<Result<StreamDelta>> = vec![
                    Ok(StreamDelta::TextDelta("partial".into())),
                    Err(RagError::LlmStream("stream reset".into())),
                ];
                Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, _>)
            })
        }
    }

    #[tokio::test]
    async fn test_complete_concatenates_deltas() {
        let llm = Canned(vec!["Hello", ", ", "world"]);
        let text = llm
            .complete(&ModelConfig::default(), "hi".into())
            .await
            .unwrap();
        assert_eq!(text, "Hello, world");
    }

    #[tokio::test]
    async fn test_complete_propagates_stream_errors() {
        let err = Broken
            .complete(&ModelConfig::default(), "hi".into())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::LlmStream(_)));
    }
}
