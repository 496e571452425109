//! Handler trait - the unit of work executed by a shard worker

use std::fmt;
use std::sync::Arc;

use crate::HandlerError;

/// Result of one handler invocation
pub type HandlerResult = Result<(), HandlerError>;

/// Capability invoked once per work item on the owning shard's worker thread.
///
/// Handlers may block. A slow handler stalls every key routed to its shard
/// until it returns.
///
/// Any `Fn(&P) -> HandlerResult + Send + Sync` closure is a handler; its name
/// is the closure's type name. Use [`named`] to give a closure a readable name.
pub trait Handler<P>: Send + Sync {
    /// Handler name (used for logging/metrics)
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Process one payload
    fn handle(&self, payload: &P) -> HandlerResult;
}

impl<P, F> Handler<P> for F
where
    F: Fn(&P) -> HandlerResult + Send + Sync,
{
    fn handle(&self, payload: &P) -> HandlerResult {
        self(payload)
    }
}

/// Shared handler reference carried by work items
pub type HandlerRef<P> = Arc<dyn Handler<P>>;

/// Closure handler with an explicit name
pub struct NamedHandler<F> {
    name: String,
    func: F,
}

impl<F> fmt::Debug for NamedHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedHandler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<P, F> Handler<P> for NamedHandler<F>
where
    F: Fn(&P) -> HandlerResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, payload: &P) -> HandlerResult {
        (self.func)(payload)
    }
}

/// Wrap a closure as a named, shareable handler
pub fn named<P, F>(name: impl Into<String>, func: F) -> HandlerRef<P>
where
    P: 'static,
    F: Fn(&P) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(NamedHandler {
        name: name.into(),
        func,
    })
}
