use futures::future::BoxFuture;

use ragloop_core::error::Result;

use super::state::{StateUpdate, WorkflowState};

/// A named step in the workflow graph.
///
/// Handlers read the current state and return a partial update. They never
/// mutate shared state.
pub trait NodeHandler: Send + Sync {
    fn run<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<StateUpdate>>;
}

/// Adapts a synchronous closure into a [`NodeHandler`].
pub struct FnNode<F>(pub F);

impl<F> NodeHandler for FnNode<F>
where
    F: Fn(&WorkflowState) -> Result<StateUpdate> + Send + Sync,
{
    fn run<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<StateUpdate>> {
        let result = (self.0)(state);
        Box::pin(async move { result })
    }
}
