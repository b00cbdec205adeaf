use std::collections::HashMap;

use super::state::WorkflowState;

/// Terminal marker. Routing to it ends the run.
pub const END: &str = "__end__";

/// Where control goes after a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Node(String),
    End,
}

impl Route {
    pub fn to(name: &str) -> Self {
        if name == END {
            Route::End
        } else {
            Route::Node(name.to_string())
        }
    }
}

/// Reads the post-update state and returns a label.
pub type RoutingFn = Box<dyn Fn(&WorkflowState) -> String + Send + Sync>;

/// Outgoing transition of a node.
pub enum Edge {
    Direct(Route),
    Conditional {
        route: RoutingFn,
        targets: HashMap<String, Route>,
    },
}

impl Edge {
    /// Every route this edge can produce.
    pub fn targets(&self) -> Vec<&Route> {
        match self {
            Edge::Direct(route) => vec![route],
            Edge::Conditional { targets, .. } => targets.values().collect(),
        }
    }
}
