use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use ragloop_core::error::{RagError, Result};
use ragloop_core::types::{Document, DocumentId};

use super::NodeServices;
use crate::graph::{NodeHandler, StateUpdate, WorkflowState};
use crate::parse::parse_relevance;
use crate::policy::has_relevant;
use crate::prompts;

/// Judges each held document independently and folds the verdicts with
/// the configured relevance policy.
///
/// A grading call that fails, times out or returns something unreadable
/// counts as "not relevant". Grading never fails the run.
pub struct Grader {
    services: Arc<NodeServices>,
}

impl Grader {
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self { services }
    }

    async fn grade(&self, question: &str, doc: &Document) -> (DocumentId, bool) {
        let prompt = prompts::grade(question, doc);
        let verdict = match self.services.decide("grader", prompt).await {
            Ok(reply) => match parse_relevance(&reply) {
                Some(v) => Ok(v),
                None => Err(RagError::GradingFailure {
                    document: doc.id.short().to_string(),
                    message: format!("unparseable verdict: {}", reply.trim()),
                }),
            },
            Err(e) => Err(RagError::GradingFailure {
                document: doc.id.short().to_string(),
                message: e.to_string(),
            }),
        };

        match verdict {
            Ok(relevant) => {
                debug!(doc = doc.id.short(), relevant, "Graded document");
                (doc.id.clone(), relevant)
            }
            Err(e) => {
                warn!(error = %e, "Grading failed, treating document as not relevant");
                (doc.id.clone(), false)
            }
        }
    }
}

impl NodeHandler for Grader {
    fn run<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let question = state.current_question.as_str();
            let concurrency = self.services.workflow.grader_concurrency.max(1);

            let grading: Vec<_> = state
                .retrieved_documents
                .iter()
                .map(|doc| self.grade(question, doc))
                .collect();
            let verdicts: HashMap<DocumentId, bool> = stream::iter(grading)
                .buffer_unordered(concurrency)
                .collect()
                .await;

            let policy = self.services.workflow.relevance_policy;
            let relevant = has_relevant(policy, &verdicts);
            let exhausted = state.rewrite_count >= self.services.workflow.max_rewrites;

            info!(
                graded = verdicts.len(),
                relevant_docs = verdicts.values().filter(|v| **v).count(),
                has_relevant = relevant,
                ?policy,
                "Graded documents"
            );

            Ok(StateUpdate {
                relevance_verdicts: Some(verdicts),
                has_relevant: Some(relevant),
                low_confidence: Some(!relevant && exhausted),
                ..Default::default()
            })
        })
    }
}
