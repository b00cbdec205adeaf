//! The five decision nodes of the RAG workflow.

pub mod analyzer;
pub mod generator;
pub mod grader;
pub mod react;
pub mod retriever;
pub mod rewriter;

use std::sync::Arc;
use std::time::Duration;

use ragloop_core::config::{AppConfig, ModelConfig, WorkflowConfig};
use ragloop_core::error::Result;
use ragloop_core::retry::with_deadline;
use ragloop_core::traits::{LlmClient, VectorStore};

pub use analyzer::QueryAnalyzer;
pub use generator::Generator;
pub use grader::Grader;
pub use react::{ReactFinalizer, ReactReasoner, ReactRetriever};
pub use retriever::Retriever;
pub use rewriter::Rewriter;

/// Collaborators and settings shared by every node of a workflow.
pub struct NodeServices {
    pub llm: Arc<dyn LlmClient>,
    pub store: Arc<dyn VectorStore>,
    /// Answer generation, at the configured temperature.
    pub generator_model: ModelConfig,
    /// Routing, grading and rewriting, always deterministic.
    pub decision_model: ModelConfig,
    pub workflow: WorkflowConfig,
}

impl NodeServices {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<dyn VectorStore>, config: &AppConfig) -> Self {
        Self {
            llm,
            store,
            generator_model: config.model.clone(),
            decision_model: config.decision_model(),
            workflow: config.workflow.clone(),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow.call_timeout_secs)
    }

    /// One deterministic completion, bounded by the call deadline.
    pub(crate) async fn decide(&self, operation: &str, prompt: String) -> Result<String> {
        with_deadline(
            self.call_timeout(),
            operation,
            self.llm.complete(&self.decision_model, prompt),
        )
        .await
    }
}
