use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info};

use ragloop_core::error::RagError;

use super::edge::{Edge, Route, END};
use super::node::NodeHandler;
use super::state::{TraceEntry, WorkflowState};

/// A run that stopped on a node failure or a wiring problem.
///
/// Carries the state as it was when the run stopped, trace included.
#[derive(Debug, thiserror::Error)]
#[error("workflow failed at '{node}': {source}")]
pub struct WorkflowError {
    pub node: String,
    #[source]
    pub source: RagError,
    pub state: Box<WorkflowState>,
}

impl WorkflowError {
    fn new(node: impl Into<String>, source: RagError, state: WorkflowState) -> Self {
        Self {
            node: node.into(),
            source,
            state: Box::new(state),
        }
    }
}

/// Executes a cyclic state-machine workflow.
///
/// Nodes are registered by name. Each node has exactly one outgoing edge:
/// either unconditional, or a routing function whose label picks the target.
/// Starting from the entry node, the executor runs a handler, merges its
/// update into the state, records a trace entry and follows the edge until
/// it reaches [`END`].
pub struct GraphExecutor {
    nodes: HashMap<String, Box<dyn NodeHandler>>,
    edges: HashMap<String, Edge>,
    entry: Option<String>,
    max_steps: usize,
}

impl Default for GraphExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphExecutor {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            max_steps: 32,
        }
    }

    /// Cap on node invocations per run.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn add_node(&mut self, name: &str, handler: impl NodeHandler + 'static) -> &mut Self {
        self.nodes.insert(name.to_string(), Box::new(handler));
        self
    }

    pub fn set_entry(&mut self, name: &str) -> &mut Self {
        self.entry = Some(name.to_string());
        self
    }

    pub fn add_edge(&mut self, from: &str, to: &str) -> &mut Self {
        self.edges.insert(from.to_string(), Edge::Direct(Route::to(to)));
        self
    }

    /// `targets` maps each label the routing function may return to a node
    /// name (or [`END`]).
    pub fn add_conditional_edge<F>(
        &mut self,
        from: &str,
        route: F,
        targets: &[(&str, &str)],
    ) -> &mut Self
    where
        F: Fn(&WorkflowState) -> String + Send + Sync + 'static,
    {
        let targets = targets
            .iter()
            .map(|(label, to)| (label.to_string(), Route::to(to)))
            .collect();
        self.edges.insert(
            from.to_string(),
            Edge::Conditional {
                route: Box::new(route),
                targets,
            },
        );
        self
    }

    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check the wiring: entry set, every node has an outgoing edge, and
    /// every edge points at a registered node or END.
    pub fn validate(&self) -> Result<(), RagError> {
        let entry = self
            .entry
            .as_deref()
            .ok_or_else(|| RagError::Graph("no entry node set".into()))?;
        if !self.nodes.contains_key(entry) {
            return Err(RagError::Graph(format!("entry node '{}' is not registered", entry)));
        }

        for name in self.nodes.keys() {
            if !self.edges.contains_key(name) {
                return Err(RagError::Graph(format!("node '{}' has no outgoing edge", name)));
            }
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(RagError::Graph(format!(
                    "edge starts at unregistered node '{}'",
                    from
                )));
            }
            for route in edge.targets() {
                if let Route::Node(to) = route {
                    if !self.nodes.contains_key(to) {
                        return Err(RagError::Graph(format!(
                            "edge '{}' -> '{}' targets an unregistered node",
                            from, to
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Run the graph to completion.
    pub async fn run(&self, initial: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let mut state = initial;
        if let Err(e) = self.validate() {
            return Err(WorkflowError::new("graph", e, state));
        }
        let Some(mut current) = self.entry.clone() else {
            return Err(WorkflowError::new(
                "graph",
                RagError::Graph("no entry node set".into()),
                state,
            ));
        };

        let run_start = Instant::now();
        let mut steps = 0;

        loop {
            // Guard against a mis-wired cycle
            if steps >= self.max_steps {
                error!(node = %current, max_steps = self.max_steps, "Step limit reached");
                return Err(WorkflowError::new(
                    current,
                    RagError::Graph(format!("step limit of {} reached", self.max_steps)),
                    state,
                ));
            }
            steps += 1;

            let Some(handler) = self.nodes.get(&current) else {
                return Err(WorkflowError::new(
                    current.clone(),
                    RagError::Graph(format!("node '{}' not found in graph", current)),
                    state,
                ));
            };

            let started_at = Utc::now();
            let node_start = Instant::now();
            let result = handler.run(&state).await;
            let elapsed_ms = node_start.elapsed().as_millis() as u64;

            match result {
                Ok(update) => {
                    state.apply(update);
                    state.trace.push(TraceEntry {
                        node: current.clone(),
                        started_at,
                        elapsed_ms,
                        failed: false,
                    });
                    debug!(node = %current, elapsed_ms, "Node complete");
                }
                Err(e) => {
                    state.trace.push(TraceEntry {
                        node: current.clone(),
                        started_at,
                        elapsed_ms,
                        failed: true,
                    });
                    error!(node = %current, elapsed_ms, error = %e, "Node failed");
                    return Err(WorkflowError::new(current, e, state));
                }
            }

            let next = match self.edges.get(&current) {
                Some(Edge::Direct(route)) => route.clone(),
                Some(Edge::Conditional { route, targets }) => {
                    let label = route(&state);
                    match targets.get(&label) {
                        Some(target) => {
                            debug!(node = %current, label = %label, "Routing");
                            target.clone()
                        }
                        None => {
                            return Err(WorkflowError::new(
                                current.clone(),
                                RagError::Graph(format!(
                                    "unknown routing label '{}' from '{}'",
                                    label, current
                                )),
                                state,
                            ));
                        }
                    }
                }
                None => {
                    return Err(WorkflowError::new(
                        current.clone(),
                        RagError::Graph(format!("node '{}' has no outgoing edge", current)),
                        state,
                    ));
                }
            };

            match next {
                Route::End => {
                    info!(
                        steps,
                        elapsed_ms = run_start.elapsed().as_millis() as u64,
                        "Workflow reached {}",
                        END
                    );
                    return Ok(state);
                }
                Route::Node(name) => current = name,
            }
        }
    }
}
