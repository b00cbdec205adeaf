pub mod graph;
pub mod nodes;
pub mod parse;
pub mod policy;
pub mod prompts;
pub mod workflow;

pub use graph::{
    AnswerStatus, GraphExecutor, NodeHandler, QueryRoute, ReactStep, StateUpdate, TraceEntry,
    WorkflowError, WorkflowState, END,
};
pub use nodes::NodeServices;
pub use workflow::{build_rag_graph, build_react_graph, RagAnswer, RagWorkflow};
