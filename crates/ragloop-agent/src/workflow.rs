use std::sync::Arc;

use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use ragloop_core::config::AppConfig;
use ragloop_core::error::RagError;
use ragloop_core::traits::{LlmClient, VectorStore};

use crate::graph::{
    AnswerStatus, GraphExecutor, QueryRoute, ReactStep, TraceEntry, WorkflowError, WorkflowState,
    END,
};
use crate::nodes::{
    Generator, Grader, NodeServices, QueryAnalyzer, ReactFinalizer, ReactReasoner, ReactRetriever,
    Retriever, Rewriter,
};

pub const QUERY_ANALYZER: &str = "query_analyzer";
pub const RETRIEVER: &str = "retriever";
pub const GRADER: &str = "grader";
pub const REWRITER: &str = "rewriter";
pub const GENERATOR: &str = "generator";

pub const REACT_REASONER: &str = "react_reasoner";
pub const REACT_RETRIEVER: &str = "react_retriever";
pub const REACT_FINALIZER: &str = "react_finalizer";

/// Wire the self-correcting RAG graph:
///
/// ```text
/// query_analyzer ─┬─ retrieve ─────────> retriever ─┬─ found ─> grader ─┬─ relevant ──> generator ─> END
///                 └─ respond_directly ─> generator  └─ empty ─> rewriter └─ rewrite ──> rewriter
///                                                                        └─ exhausted ─> generator
/// rewriter ─┬─ retrieve ──> retriever
///           └─ exhausted ─> generator
/// ```
pub fn build_rag_graph(services: Arc<NodeServices>) -> GraphExecutor {
    let max_rewrites = services.workflow.max_rewrites;
    let mut graph = GraphExecutor::new().with_max_steps(services.workflow.max_steps);

    graph
        .add_node(QUERY_ANALYZER, QueryAnalyzer::new(services.clone()))
        .add_node(RETRIEVER, Retriever::new(services.clone()))
        .add_node(GRADER, Grader::new(services.clone()))
        .add_node(REWRITER, Rewriter::new(services.clone()))
        .add_node(GENERATOR, Generator::new(services))
        .set_entry(QUERY_ANALYZER);

    graph.add_conditional_edge(
        QUERY_ANALYZER,
        |s| match s.query_route {
            Some(QueryRoute::RespondDirectly) => "respond_directly".into(),
            _ => "retrieve".into(),
        },
        &[("retrieve", RETRIEVER), ("respond_directly", GENERATOR)],
    );

    graph.add_conditional_edge(
        RETRIEVER,
        |s| {
            if s.retrieved_documents.is_empty() {
                "empty".into()
            } else {
                "found".into()
            }
        },
        &[("found", GRADER), ("empty", REWRITER)],
    );

    graph.add_conditional_edge(
        GRADER,
        move |s| {
            if s.has_relevant {
                "relevant".into()
            } else if s.rewrite_count < max_rewrites {
                "rewrite".into()
            } else {
                "exhausted".into()
            }
        },
        &[("relevant", GENERATOR), ("rewrite", REWRITER), ("exhausted", GENERATOR)],
    );

    graph.add_conditional_edge(
        REWRITER,
        |s| {
            if s.low_confidence {
                "exhausted".into()
            } else {
                "retrieve".into()
            }
        },
        &[("retrieve", RETRIEVER), ("exhausted", GENERATOR)],
    );

    graph.add_edge(GENERATOR, END);
    graph
}

/// Wire the reasoning-agent graph:
///
/// ```text
/// react_reasoner ─┬─ answered ─> END
///                 ├─ act ──────> react_retriever ─┬─ think ─────> react_reasoner
///                 ├─ think ────> react_reasoner   └─ exhausted ─> react_finalizer
///                 └─ exhausted ─> react_finalizer ─> END
/// ```
///
/// Every reasoner call is one turn; after `react_max_steps` turns the
/// finalizer forces an answer.
pub fn build_react_graph(services: Arc<NodeServices>) -> GraphExecutor {
    let max_turns = services.workflow.react_max_steps;
    // reasoner + retriever per turn, plus the finalizer
    let max_steps = services.workflow.max_steps.max(2 * max_turns as usize + 1);
    let mut graph = GraphExecutor::new().with_max_steps(max_steps);

    graph
        .add_node(REACT_REASONER, ReactReasoner::new(services.clone()))
        .add_node(REACT_RETRIEVER, ReactRetriever::new(services.clone()))
        .add_node(REACT_FINALIZER, ReactFinalizer::new(services))
        .set_entry(REACT_REASONER);

    graph.add_conditional_edge(
        REACT_REASONER,
        move |s| {
            if s.answer.is_some() {
                "answered".into()
            } else if s.pending_action.is_some() {
                "act".into()
            } else if s.react_turns >= max_turns {
                "exhausted".into()
            } else {
                "think".into()
            }
        },
        &[
            ("answered", END),
            ("act", REACT_RETRIEVER),
            ("think", REACT_REASONER),
            ("exhausted", REACT_FINALIZER),
        ],
    );

    graph.add_conditional_edge(
        REACT_RETRIEVER,
        move |s| {
            if s.react_turns >= max_turns {
                "exhausted".into()
            } else {
                "think".into()
            }
        },
        &[("think", REACT_REASONER), ("exhausted", REACT_FINALIZER)],
    );

    graph.add_edge(REACT_FINALIZER, END);
    graph
}

/// Outcome of one question.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub run_id: String,
    pub question: String,
    /// The question as last sent to the store.
    pub final_question: String,
    pub answer: String,
    pub status: AnswerStatus,
    pub low_confidence: bool,
    pub rewrite_count: u32,
    /// Source labels of the documents the answer was based on.
    pub sources: Vec<String>,
    /// Thought / Action / Observation rounds in reasoning-agent mode.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasoning: Vec<ReactStep>,
    pub trace: Vec<TraceEntry>,
}

impl RagAnswer {
    fn from_state(run_id: String, state: WorkflowState) -> Self {
        let sources = match state.answer_status {
            Some(AnswerStatus::Grounded) if !state.relevance_verdicts.is_empty() => state
                .relevant_documents()
                .iter()
                .map(|d| d.source_label())
                .collect(),
            Some(AnswerStatus::Grounded) => state
                .retrieved_documents
                .iter()
                .map(|d| d.source_label())
                .collect(),
            Some(AnswerStatus::LowConfidence) => state
                .retrieved_documents
                .iter()
                .map(|d| d.source_label())
                .collect(),
            _ => Vec::new(),
        };
        Self {
            run_id,
            question: state.original_question,
            final_question: state.current_question,
            answer: state.answer.unwrap_or_default(),
            status: state.answer_status.unwrap_or(AnswerStatus::Unavailable),
            low_confidence: state.low_confidence,
            rewrite_count: state.rewrite_count,
            sources,
            reasoning: state.react_steps,
            trace: state.trace,
        }
    }

    pub fn trace_names(&self) -> Vec<&str> {
        self.trace.iter().map(|t| t.node.as_str()).collect()
    }
}

/// A question-answering workflow: the self-correcting RAG graph, or the
/// reasoning agent built by [`RagWorkflow::react`].
///
/// One instance can serve many concurrent questions; each run owns its state.
pub struct RagWorkflow {
    graph: GraphExecutor,
}

impl RagWorkflow {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<dyn VectorStore>, config: &AppConfig) -> Self {
        let services = Arc::new(NodeServices::new(llm, store, config));
        Self {
            graph: build_rag_graph(services),
        }
    }

    /// Reasoning-agent mode: the model decides when and what to retrieve.
    pub fn react(llm: Arc<dyn LlmClient>, store: Arc<dyn VectorStore>, config: &AppConfig) -> Self {
        let services = Arc::new(NodeServices::new(llm, store, config));
        Self {
            graph: build_react_graph(services),
        }
    }

    pub fn graph(&self) -> &GraphExecutor {
        &self.graph
    }

    /// Answer one question.
    pub async fn ask(&self, question: &str) -> Result<RagAnswer, WorkflowError> {
        let question = question.trim();
        let initial = WorkflowState::new(question);
        if question.is_empty() {
            return Err(WorkflowError {
                node: "input".into(),
                source: RagError::Config("question must not be empty".into()),
                state: Box::new(initial),
            });
        }

        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("rag_run", run_id = %run_id);
        let state = self.graph.run(initial).instrument(span).await?;

        let answer = RagAnswer::from_state(run_id, state);
        info!(
            run_id = %answer.run_id,
            status = %answer.status,
            rewrites = answer.rewrite_count,
            steps = answer.trace.len(),
            "Question answered"
        );
        Ok(answer)
    }
}
