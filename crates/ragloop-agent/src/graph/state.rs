use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use ragloop_core::types::{Document, DocumentId};

/// Label produced by the query analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryRoute {
    Retrieve,
    RespondDirectly,
}

impl QueryRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryRoute::Retrieve => "retrieve",
            QueryRoute::RespondDirectly => "respond_directly",
        }
    }
}

/// How the final answer came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// Backed by documents the grader judged relevant.
    Grounded,
    /// The analyzer decided no retrieval was needed.
    Direct,
    /// Rewrites ran out without finding relevant material.
    LowConfidence,
    /// The generator call failed.
    Unavailable,
}

impl std::fmt::Display for AnswerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnswerStatus::Grounded => "grounded",
            AnswerStatus::Direct => "direct",
            AnswerStatus::LowConfidence => "low_confidence",
            AnswerStatus::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// A tool call the reasoning agent asked for and has not yet observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactAction {
    pub thought: String,
    pub action: String,
    pub input: String,
}

/// One completed Thought / Action / Observation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactStep {
    pub thought: String,
    pub action: String,
    pub input: String,
    pub observation: String,
}

/// One node invocation, recorded after it returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub node: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub failed: bool,
}

/// The record threaded through one workflow run.
///
/// Nodes never mutate this directly: they return a [`StateUpdate`] that the
/// executor merges with [`WorkflowState::apply`].
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub original_question: String,
    pub current_question: String,
    pub retrieved_documents: Vec<Document>,
    pub relevance_verdicts: HashMap<DocumentId, bool>,
    pub has_relevant: bool,
    pub rewrite_count: u32,
    pub query_route: Option<QueryRoute>,
    pub answer: Option<String>,
    pub answer_status: Option<AnswerStatus>,
    pub low_confidence: bool,
    /// Reasoning-agent mode only.
    pub react_turns: u32,
    pub pending_action: Option<ReactAction>,
    pub react_steps: Vec<ReactStep>,
    pub trace: Vec<TraceEntry>,
}

impl WorkflowState {
    pub fn new(question: impl Into<String>) -> Self {
        let question = question.into();
        Self {
            current_question: question.clone(),
            original_question: question,
            retrieved_documents: Vec::new(),
            relevance_verdicts: HashMap::new(),
            has_relevant: false,
            rewrite_count: 0,
            query_route: None,
            answer: None,
            answer_status: None,
            low_confidence: false,
            react_turns: 0,
            pending_action: None,
            react_steps: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// Merge a node's partial update, field by field.
    ///
    /// Replacing the documents invalidates every verdict, so the verdicts and
    /// `has_relevant` are reset unless the same update supplies them.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(question) = update.current_question {
            if question.trim().is_empty() {
                warn!("Ignoring empty question in state update");
            } else {
                self.current_question = question;
            }
        }
        if let Some(docs) = update.retrieved_documents {
            self.retrieved_documents = docs;
            self.relevance_verdicts.clear();
            self.has_relevant = false;
        }
        if let Some(verdicts) = update.relevance_verdicts {
            self.relevance_verdicts = verdicts;
        }
        if let Some(has_relevant) = update.has_relevant {
            self.has_relevant = has_relevant;
        }
        if let Some(count) = update.rewrite_count {
            self.rewrite_count = count;
        }
        if let Some(route) = update.query_route {
            self.query_route = Some(route);
        }
        if let Some(answer) = update.answer {
            self.answer = Some(answer);
        }
        if let Some(status) = update.answer_status {
            self.answer_status = Some(status);
        }
        if let Some(low_confidence) = update.low_confidence {
            self.low_confidence = low_confidence;
        }
        if let Some(turns) = update.react_turns {
            self.react_turns = turns;
        }
        if let Some(action) = update.pending_action {
            self.pending_action = Some(action);
        }
        // A recorded step settles whatever action was pending.
        if let Some(step) = update.react_step {
            self.pending_action = None;
            self.react_steps.push(step);
        }
    }

    /// Documents with a positive verdict, in retrieval order.
    pub fn relevant_documents(&self) -> Vec<&Document> {
        self.retrieved_documents
            .iter()
            .filter(|d| self.relevance_verdicts.get(&d.id).copied().unwrap_or(false))
            .collect()
    }

    /// Node names in execution order.
    pub fn trace_names(&self) -> Vec<&str> {
        self.trace.iter().map(|t| t.node.as_str()).collect()
    }
}

/// A node's partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub current_question: Option<String>,
    pub retrieved_documents: Option<Vec<Document>>,
    pub relevance_verdicts: Option<HashMap<DocumentId, bool>>,
    pub has_relevant: Option<bool>,
    pub rewrite_count: Option<u32>,
    pub query_route: Option<QueryRoute>,
    pub answer: Option<String>,
    pub answer_status: Option<AnswerStatus>,
    pub low_confidence: Option<bool>,
    pub react_turns: Option<u32>,
    pub pending_action: Option<ReactAction>,
    /// Appended to `react_steps`.
    pub react_step: Option<ReactStep>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragloop_core::types::Metadata;

    fn doc(text: &str) -> Document {
        Document::new(text, Metadata::new(), 0.5)
    }

    #[test]
    fn test_new_state_copies_question() {
        let state = WorkflowState::new("who is the monkey king?");
        assert_eq!(state.original_question, state.current_question);
        assert_eq!(state.rewrite_count, 0);
        assert!(state.answer.is_none());
        assert!(state.trace.is_empty());
    }

    #[test]
    fn test_replacing_documents_clears_verdicts() {
        let mut state = WorkflowState::new("q");
        let first = doc("first");
        state.apply(StateUpdate {
            retrieved_documents: Some(vec![first.clone()]),
            ..Default::default()
        });
        state.apply(StateUpdate {
            relevance_verdicts: Some(HashMap::from([(first.id.clone(), true)])),
            has_relevant: Some(true),
            ..Default::default()
        });
        assert!(state.has_relevant);

        state.apply(StateUpdate {
            retrieved_documents: Some(vec![doc("second")]),
            ..Default::default()
        });
        assert!(state.relevance_verdicts.is_empty());
        assert!(!state.has_relevant);
        assert_eq!(state.retrieved_documents[0].content, "second");
    }

    #[test]
    fn test_update_can_set_documents_and_verdicts_together() {
        let mut state = WorkflowState::new("q");
        let d = doc("both");
        state.apply(StateUpdate {
            retrieved_documents: Some(vec![d.clone()]),
            relevance_verdicts: Some(HashMap::from([(d.id.clone(), true)])),
            has_relevant: Some(true),
            ..Default::default()
        });
        assert!(state.has_relevant);
        assert_eq!(state.relevant_documents().len(), 1);
    }

    #[test]
    fn test_empty_question_is_ignored() {
        let mut state = WorkflowState::new("original");
        state.apply(StateUpdate {
            current_question: Some("   ".into()),
            ..Default::default()
        });
        assert_eq!(state.current_question, "original");
    }

    #[test]
    fn test_original_question_never_changes() {
        let mut state = WorkflowState::new("original");
        state.apply(StateUpdate {
            current_question: Some("rewritten".into()),
            rewrite_count: Some(1),
            ..Default::default()
        });
        assert_eq!(state.original_question, "original");
        assert_eq!(state.current_question, "rewritten");
    }

    #[test]
    fn test_react_step_settles_pending_action() {
        let mut state = WorkflowState::new("q");
        state.apply(StateUpdate {
            react_turns: Some(1),
            pending_action: Some(ReactAction {
                thought: "need the text".into(),
                action: "retrieve".into(),
                input: "monkey king birth".into(),
            }),
            ..Default::default()
        });
        assert!(state.pending_action.is_some());

        state.apply(StateUpdate {
            react_step: Some(ReactStep {
                thought: "need the text".into(),
                action: "retrieve".into(),
                input: "monkey king birth".into(),
                observation: "born from a stone".into(),
            }),
            ..Default::default()
        });
        assert!(state.pending_action.is_none());
        assert_eq!(state.react_steps.len(), 1);
        assert_eq!(state.react_turns, 1);
    }
}
