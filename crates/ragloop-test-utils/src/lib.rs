//! Mocks and fixtures shared by the ragloop test suites.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use sha2::{Digest, Sha256};

use ragloop_core::config::ModelConfig;
use ragloop_core::error::{RagError, Result};
use ragloop_core::traits::{EmbeddingProvider, LlmClient, VectorStore};
use ragloop_core::types::*;

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// An LLM whose reply is computed from the prompt by a closure.
///
/// The prompt seen by the closure is every message's content joined with
/// newlines. Replies are streamed back as a single text delta.
pub struct FnLlm {
    respond: Responder,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FnLlm {
    pub fn new(respond: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text.
    pub fn fixed(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Sleep before answering. Pair with `start_paused` tests for timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl LlmClient for FnLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.clone());
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let text = (self.respond)(&prompt)?;
            let deltas: Vec<Result<StreamDelta>> = vec![
                Ok(StreamDelta::TextDelta(text)),
                Ok(StreamDelta::Stop(StopReason::EndTurn)),
            ];
            Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, _>)
        })
    }
}

/// A vector store that replays one scripted result per search.
///
/// Once the script runs out, searches return `fallback` (empty by default).
pub struct ScriptedStore {
    script: Mutex<VecDeque<Result<Vec<Document>>>>,
    fallback: Vec<Document>,
    queries: Mutex<Vec<String>>,
    added: Mutex<Vec<NewDocument>>,
}

impl ScriptedStore {
    pub fn new(script: Vec<Result<Vec<Document>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Vec::new(),
            queries: Mutex::new(Vec::new()),
            added: Mutex::new(Vec::new()),
        }
    }

    /// Every search returns the same documents.
    pub fn always(docs: Vec<Document>) -> Self {
        let mut store = Self::new(Vec::new());
        store.fallback = docs;
        store
    }

    /// Queries received so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn added(&self) -> Vec<NewDocument> {
        self.added.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl VectorStore for ScriptedStore {
    fn similarity_search(&self, query: &str, k: usize) -> BoxFuture<'_, Result<Vec<Document>>> {
        let query = query.to_string();
        Box::pin(async move {
            if let Ok(mut queries) = self.queries.lock() {
                queries.push(query);
            }
            let next = self
                .script
                .lock()
                .map_err(|e| RagError::Database(e.to_string()))?
                .pop_front();
            let mut docs = match next {
                Some(result) => result?,
                None => self.fallback.clone(),
            };
            docs.truncate(k);
            Ok(docs)
        })
    }

    fn add_documents(&self, docs: Vec<NewDocument>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let mut added = self
                .added
                .lock()
                .map_err(|e| RagError::Database(e.to_string()))?;
            let fresh: Vec<NewDocument> = docs
                .into_iter()
                .filter(|d| !added.iter().any(|a| a.id == d.id))
                .collect();
            let n = fresh.len();
            added.extend(fresh);
            Ok(n)
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            self.added
                .lock()
                .map(|a| a.len())
                .map_err(|e| RagError::Database(e.to_string()))
        })
    }
}

/// Deterministic bag-of-words embedder: each lowercase token is hashed into
/// one of `dims` buckets. Identical texts embed identically.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text.split_whitespace() {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dims;
            v[bucket] += 1.0;
        }
        v
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
        let vectors = texts.iter().map(|t| self.embed_one(t)).collect();
        Box::pin(async move { Ok(vectors) })
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// A retrieved document from `test.txt` at the given page, score 0.9.
pub fn doc(content: &str, page: usize) -> Document {
    let mut metadata = Metadata::new();
    metadata.insert("source".into(), "test.txt".into());
    metadata.insert("page".into(), page.to_string());
    Document::new(content, metadata, 0.9)
}
