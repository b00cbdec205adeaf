use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::info;

use ragloop_core::error::{RagError, Result};
use ragloop_core::retry::with_deadline;

use super::NodeServices;
use crate::graph::{NodeHandler, StateUpdate, WorkflowState};

/// Searches the store with the current question and replaces the held
/// documents. Store failures end the run.
pub struct Retriever {
    services: Arc<NodeServices>,
}

impl Retriever {
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self { services }
    }
}

impl NodeHandler for Retriever {
    fn run<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let k = self.services.workflow.top_k;
            let mut docs = with_deadline(
                self.services.call_timeout(),
                "similarity_search",
                self.services.store.similarity_search(&state.current_question, k),
            )
            .await
            .map_err(|e| match e {
                RagError::Retrieval(_) => e,
                other => RagError::Retrieval(other.to_string()),
            })?;

            docs.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            docs.truncate(k);

            info!(
                query = %state.current_question,
                found = docs.len(),
                attempt = state.rewrite_count + 1,
                "Retrieved documents"
            );

            Ok(StateUpdate {
                retrieved_documents: Some(docs),
                relevance_verdicts: Some(HashMap::new()),
                has_relevant: Some(false),
                ..Default::default()
            })
        })
    }
}
