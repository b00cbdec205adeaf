use std::sync::Arc;

use futures::future::BoxFuture;

use ragloop_core::config::RetryConfig;
use ragloop_core::error::{RagError, Result};
use ragloop_core::retry::with_retry;
use ragloop_core::traits::VectorStore;
use ragloop_core::types::{Document, NewDocument};

/// A vector store that retries transient search failures with backoff.
///
/// Search failures that survive the retry budget surface as
/// `RagError::Retrieval`. Writes are retried too since `add_documents` is
/// an idempotent upsert.
pub struct RetryingStore {
    inner: Arc<dyn VectorStore>,
    retry_config: RetryConfig,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn VectorStore>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

impl VectorStore for RetryingStore {
    fn similarity_search(&self, query: &str, k: usize) -> BoxFuture<'_, Result<Vec<Document>>> {
        let query = query.to_string();
        Box::pin(async move {
            with_retry(&self.retry_config, "vector_search", || {
                self.inner.similarity_search(&query, k)
            })
            .await
            .map_err(|e| match e {
                RagError::Retrieval(_) | RagError::Timeout { .. } => e,
                other => RagError::Retrieval(other.to_string()),
            })
        })
    }

    fn add_documents(&self, docs: Vec<NewDocument>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            with_retry(&self.retry_config, "vector_upsert", || {
                self.inner.add_documents(docs.clone())
            })
            .await
        })
    }

    fn persist(&self) -> BoxFuture<'_, Result<()>> {
        self.inner.persist()
    }

    fn count(&self) -> BoxFuture<'_, Result<usize>> {
        self.inner.count()
    }
}
