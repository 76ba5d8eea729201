//! Typed event routing: maps an event's `type` to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StreamError;
use crate::event::Event;

/// Optional per-route predicate; a handler only runs when its filter passes.
pub type FilterFn = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// A handler for one or more event types.
///
/// `C` is the shared application context (clients, caches) handed to every
/// handler on each call.
#[async_trait]
pub trait EventHandler<C: Send + Sync>: Send + Sync {
    async fn handle(&self, event: Event, ctx: Arc<C>) -> Result<(), StreamError>;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

pub(crate) struct Route<C: Send + Sync> {
    pub handler: Arc<dyn EventHandler<C>>,
    pub filter: Option<FilterFn>,
}

/// Explicit registry of handlers keyed by event type.
///
/// Routers are built once at startup and handed to the dispatcher; there is
/// no global registry and no registration after the consumer starts.
pub struct Router<C: Send + Sync> {
    routes: HashMap<String, Vec<Route<C>>>,
}

impl<C: Send + Sync> Default for Router<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + Sync> Router<C> {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Register a handler for an event type. Multiple handlers per type run
    /// in registration order.
    pub fn register(
        mut self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler<C>>,
    ) -> Self {
        self.routes.entry(event_type.into()).or_default().push(Route {
            handler,
            filter: None,
        });
        self
    }

    /// Register a handler gated by a filter over the event's fields.
    pub fn register_with_filter(
        mut self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler<C>>,
        filter: FilterFn,
    ) -> Self {
        self.routes.entry(event_type.into()).or_default().push(Route {
            handler,
            filter: Some(filter),
        });
        self
    }

    /// Fold another router's routes into this one.
    pub fn merge(mut self, other: Router<C>) -> Self {
        for (event_type, mut routes) in other.routes {
            self.routes.entry(event_type).or_default().append(&mut routes);
        }
        self
    }

    pub(crate) fn routes_for(&self, event_type: &str) -> Option<&[Route<C>]> {
        self.routes.get(event_type).map(Vec::as_slice)
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.routes.get(event_type).map_or(0, Vec::len)
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}
