use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use ragloop_core::error::Result;

use super::NodeServices;
use crate::graph::{NodeHandler, QueryRoute, StateUpdate, WorkflowState};
use crate::parse::parse_route;
use crate::prompts;

/// Decides whether the question needs the corpus at all.
///
/// Anything short of a clear `respond_directly` routes to retrieval.
pub struct QueryAnalyzer {
    services: Arc<NodeServices>,
}

impl QueryAnalyzer {
    pub fn new(services: Arc<NodeServices>) -> Self {
        Self { services }
    }
}

impl NodeHandler for QueryAnalyzer {
    fn run<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let prompt = prompts::analyze(&state.current_question);
            let route = match self.services.decide("query_analyzer", prompt).await {
                Ok(reply) => parse_route(&reply).unwrap_or_else(|| {
                    debug!(reply = %reply, "Unparseable route, defaulting to retrieve");
                    QueryRoute::Retrieve
                }),
                Err(e) => {
                    warn!(error = %e, "Query analysis failed, defaulting to retrieve");
                    QueryRoute::Retrieve
                }
            };

            debug!(route = route.as_str(), "Query analyzed");
            Ok(StateUpdate {
                query_route: Some(route),
                ..Default::default()
            })
        })
    }
}
