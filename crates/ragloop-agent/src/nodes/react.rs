//! Reasoning-agent mode: the model drives its own Thought / Action /
//! Observation loop with `retrieve` as its only tool.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use ragloop_core::error::Result;
use ragloop_core::retry::with_deadline;
use ragloop_core::types::Document;

use super::NodeServices;
use crate::graph::{AnswerStatus, NodeHandler, ReactAction, ReactStep, StateUpdate, WorkflowState};
use crate::parse::{parse_react, ReactTurn};
use crate::prompts;

pub const RETRIEVE_TOOL: &str = "retrieve";

fn answered(state: &WorkflowState, answer: String, forced: bool) -> StateUpdate {
    let (answer, status) = if forced {
        (
            format!("{}{}", prompts::LOW_CONFIDENCE_CAVEAT, answer),
            AnswerStatus::LowConfidence,
        )
    } else if state.retrieved_documents.is_empty() {
        (answer, AnswerStatus::Direct)
    } else {
        (answer, AnswerStatus::Grounded)
    };
    StateUpdate {
        answer: Some(answer),
        answer_status: Some(status),
        low_confidence: Some(forced),
        ..Default::default()
    }
}

fn unavailable() -> StateUpdate {
    StateUpdate {
        answer: Some(prompts::UNAVAILABLE_ANSWER.to_string()),
        answer_status: Some(AnswerStatus::Unavailable),
        ..Default::default()
    }
}

/// Asks the model for its next Thought and Action, or its Answer.
///
/// An unreadable reply still uses up a turn. A tool other than `retrieve`
/// is recorded with an error observation so the model can correct itself.
pub struct ReactReasoner {
    services: Arc<NodeServices>,
}

impl ReactReasoner {
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self { services }
    }
}

impl NodeHandler for ReactReasoner {
    fn run<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let turn = state.react_turns + 1;
            let prompt = prompts::react(
                &state.current_question,
                self.services.workflow.react_max_steps,
                &state.react_steps,
                false,
            );

            let reply = match with_deadline(
                self.services.call_timeout(),
                "react_reasoner",
                self.services
                    .llm
                    .complete(&self.services.generator_model, prompt),
            )
            .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, turn, "Reasoning call failed");
                    return Ok(unavailable());
                }
            };

            let mut update = match parse_react(&reply) {
                Some(ReactTurn::Answer { thought, answer }) => {
                    info!(turn, %thought, "Agent answered");
                    answered(state, answer, false)
                }
                Some(ReactTurn::Act {
                    thought,
                    action,
                    input,
                }) if action == RETRIEVE_TOOL => {
                    debug!(turn, %thought, query = %input, "Agent wants to retrieve");
                    StateUpdate {
                        pending_action: Some(ReactAction {
                            thought,
                            action,
                            input,
                        }),
                        ..Default::default()
                    }
                }
                Some(ReactTurn::Act {
                    thought,
                    action,
                    input,
                }) => {
                    warn!(turn, %action, "Agent asked for an unknown tool");
                    let observation = format!(
                        "Error: unknown action '{}'. The only tool is {}.",
                        action, RETRIEVE_TOOL
                    );
                    StateUpdate {
                        react_step: Some(ReactStep {
                            thought,
                            action,
                            input,
                            observation,
                        }),
                        ..Default::default()
                    }
                }
                None => {
                    warn!(turn, "Unreadable agent reply, asking again");
                    StateUpdate::default()
                }
            };
            update.react_turns = Some(turn);
            Ok(update)
        })
    }
}

/// Runs the pending `retrieve` action and records its observation.
///
/// Newly seen documents are added to the held set, which backs the answer's
/// sources. A failed search becomes an error observation, not a failed run.
pub struct ReactRetriever {
    services: Arc<NodeServices>,
}

impl ReactRetriever {
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self { services }
    }
}

impl NodeHandler for ReactRetriever {
    fn run<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let Some(action) = state.pending_action.clone() else {
                return Ok(StateUpdate::default());
            };
            let query = if action.input.trim().is_empty() {
                state.current_question.clone()
            } else {
                action.input.clone()
            };

            let search = with_deadline(
                self.services.call_timeout(),
                "react_retriever",
                self.services
                    .store
                    .similarity_search(&query, self.services.workflow.top_k),
            )
            .await;

            let (observation, held) = match search {
                Ok(docs) => {
                    info!(query = %query, results = docs.len(), "Agent retrieval");
                    let observation = prompts::observation(&docs);
                    let mut seen: HashSet<_> =
                        state.retrieved_documents.iter().map(|d| d.id.clone()).collect();
                    let mut held: Vec<Document> = state.retrieved_documents.clone();
                    held.extend(docs.into_iter().filter(|d| seen.insert(d.id.clone())));
                    (observation, Some(held))
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Agent retrieval failed");
                    (format!("Error: retrieval failed ({}).", e), None)
                }
            };

            Ok(StateUpdate {
                retrieved_documents: held,
                react_step: Some(ReactStep {
                    thought: action.thought,
                    action: action.action,
                    input: query,
                    observation,
                }),
                ..Default::default()
            })
        })
    }
}

/// Forces a final answer once the turn budget is spent.
pub struct ReactFinalizer {
    services: Arc<NodeServices>,
}

impl ReactFinalizer {
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self { services }
    }
}

impl NodeHandler for ReactFinalizer {
    fn run<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let prompt = prompts::react(
                &state.current_question,
                self.services.workflow.react_max_steps,
                &state.react_steps,
                true,
            );
            let reply = with_deadline(
                self.services.call_timeout(),
                "react_finalizer",
                self.services
                    .llm
                    .complete(&self.services.generator_model, prompt),
            )
            .await;

            match reply.map(|r| parse_react(&r)) {
                Ok(Some(ReactTurn::Answer { answer, .. })) => {
                    info!(turns = state.react_turns, "Agent answered after being forced");
                    Ok(answered(state, answer, true))
                }
                Ok(_) => {
                    warn!(turns = state.react_turns, "Agent gave no answer when forced");
                    Ok(StateUpdate {
                        answer: Some(prompts::REACT_NO_ANSWER.to_string()),
                        answer_status: Some(AnswerStatus::LowConfidence),
                        low_confidence: Some(true),
                        ..Default::default()
                    })
                }
                Err(e) => {
                    warn!(error = %e, "Final reasoning call failed");
                    Ok(unavailable())
                }
            }
        })
    }
}
