use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use ragloop_core::error::{RagError, Result};

use super::NodeServices;
use crate::graph::{NodeHandler, StateUpdate, WorkflowState};
use crate::parse::parse_rewrite;
use crate::prompts;

/// Reformulates a question whose retrieval came back empty or irrelevant.
///
/// Every invocation below the budget consumes one rewrite, even when the
/// model call fails and the question is kept. At the budget it stops
/// rewriting and flags the run as low confidence instead.
pub struct Rewriter {
    services: Arc<NodeServices>,
}

impl Rewriter {
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self { services }
    }
}

impl NodeHandler for Rewriter {
    fn run<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let max = self.services.workflow.max_rewrites;
            if state.rewrite_count >= max {
                let signal = RagError::RewriteExhausted(max);
                info!(reason = %signal, "Answering without relevant documents");
                return Ok(StateUpdate {
                    low_confidence: Some(true),
                    ..Default::default()
                });
            }

            let prompt = prompts::rewrite(&state.original_question, &state.current_question);
            let rewritten = match self.services.decide("rewriter", prompt).await {
                Ok(reply) => {
                    let parsed = parse_rewrite(&reply);
                    if parsed.is_none() {
                        warn!("Rewriter returned nothing usable, keeping the question");
                    }
                    parsed
                }
                Err(e) => {
                    warn!(error = %e, "Rewrite failed, keeping the question");
                    None
                }
            };

            let question = rewritten.unwrap_or_else(|| state.current_question.clone());
            let rewrite_count = state.rewrite_count + 1;
            info!(
                from = %state.current_question,
                to = %question,
                rewrite_count,
                max_rewrites = max,
                "Rewrote question"
            );

            Ok(StateUpdate {
                current_question: Some(question),
                rewrite_count: Some(rewrite_count),
                ..Default::default()
            })
        })
    }
}
