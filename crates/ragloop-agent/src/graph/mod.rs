//! Workflow engine: a small cyclic state machine.
//!
//! A workflow is a set of named `NodeHandler`s. Each node has one outgoing
//! edge, either unconditional or a routing function over the post-update
//! state. The `GraphExecutor` walks the graph from the entry node, merging
//! every node's `StateUpdate` into the `WorkflowState`, until it reaches
//! `END`.

pub mod edge;
pub mod executor;
pub mod node;
pub mod state;

pub use edge::{Edge, Route, RoutingFn, END};
pub use executor::{GraphExecutor, WorkflowError};
pub use node::{FnNode, NodeHandler};
pub use state::{
    AnswerStatus, QueryRoute, ReactAction, ReactStep, StateUpdate, TraceEntry, WorkflowState,
};
