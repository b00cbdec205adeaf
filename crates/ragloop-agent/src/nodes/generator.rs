use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use ragloop_core::error::{RagError, Result};
use ragloop_core::retry::with_deadline;
use ragloop_core::types::Document;

use super::NodeServices;
use crate::graph::{AnswerStatus, NodeHandler, QueryRoute, StateUpdate, WorkflowState};
use crate::parse::strip_reasoning;
use crate::prompts;

/// Writes the final answer.
///
/// Context is the relevant documents, or every held document when the run
/// ran out of rewrites, or nothing on the direct route. A failed call
/// produces an "unavailable" answer rather than an error.
pub struct Generator {
    services: Arc<NodeServices>,
}

impl Generator {
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self { services }
    }

    fn context<'s>(&self, state: &'s WorkflowState) -> (Vec<&'s Document>, AnswerStatus) {
        if state.query_route == Some(QueryRoute::RespondDirectly) {
            return (Vec::new(), AnswerStatus::Direct);
        }
        if state.low_confidence {
            return (
                state.retrieved_documents.iter().collect(),
                AnswerStatus::LowConfidence,
            );
        }
        let relevant = state.relevant_documents();
        if relevant.is_empty() {
            (state.retrieved_documents.iter().collect(), AnswerStatus::Grounded)
        } else {
            (relevant, AnswerStatus::Grounded)
        }
    }

    async fn generate(&self, prompt: String) -> Result<String> {
        let text = with_deadline(
            self.services.call_timeout(),
            "generator",
            self.services
                .llm
                .complete(&self.services.generator_model, prompt),
        )
        .await?;
        let text = strip_reasoning(&text);
        if text.is_empty() {
            return Err(RagError::Generation("model returned an empty answer".into()));
        }
        Ok(text)
    }
}

impl NodeHandler for Generator {
    fn run<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let (context, status) = self.context(state);
            let prompt = prompts::generate(&state.current_question, &context);

            let (answer, status) = match self.generate(prompt).await {
                Ok(text) if status == AnswerStatus::LowConfidence => {
                    (format!("{}{}", prompts::LOW_CONFIDENCE_CAVEAT, text), status)
                }
                Ok(text) => (text, status),
                Err(e) => {
                    warn!(error = %e, "Generation failed");
                    (prompts::UNAVAILABLE_ANSWER.to_string(), AnswerStatus::Unavailable)
                }
            };

            info!(%status, context_docs = context.len(), "Generated answer");
            Ok(StateUpdate {
                answer: Some(answer),
                answer_status: Some(status),
                ..Default::default()
            })
        })
    }
}
