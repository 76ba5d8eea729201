//! Dispatch: run every matching handler for an event, in order.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::StreamError;
use crate::event::Event;
use crate::retry::RetryScheduler;
use crate::router::Router;

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The entry had no `type` field and was dropped
    NoType,
    /// No handlers are registered for this type
    NoHandlers,
    /// All matching handlers ran successfully
    Handled(usize),
}

/// Runs an event through the router's handlers with a shared context.
pub struct Dispatcher<C: Send + Sync> {
    router: Router<C>,
    context: Arc<C>,
    retry: Option<RetryScheduler>,
}

impl<C: Send + Sync> Dispatcher<C> {
    pub fn new(router: Router<C>, context: Arc<C>) -> Self {
        Self {
            router,
            context,
            retry: None,
        }
    }

    /// Schedule failed events for a later retry instead of dropping them.
    pub fn with_retry(mut self, retry: RetryScheduler) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Process one event.
    ///
    /// Handlers run sequentially in registration order and stop at the
    /// first failure; remaining handlers for this delivery are skipped and
    /// will run again on the retried copy. Typeless and unrouted events are
    /// not errors.
    pub async fn process_message(&self, event: &Event) -> Result<Dispatch, StreamError> {
        let Some(event_type) = event.event_type().map(str::to_string) else {
            warn!(fields = ?event.fields(), "Dropping event without a type field");
            return Ok(Dispatch::NoType);
        };

        let Some(routes) = self.router.routes_for(&event_type) else {
            debug!(event_type = %event_type, "No handlers registered for event type");
            return Ok(Dispatch::NoHandlers);
        };

        let mut ran = 0;
        for route in routes {
            if let Some(filter) = &route.filter {
                if !filter(event) {
                    continue;
                }
            }

            let handler_name = route.handler.name();
            if let Err(e) = route
                .handler
                .handle(event.clone(), self.context.clone())
                .await
            {
                error!(
                    event_type = %event_type,
                    handler = %handler_name,
                    retries = event.retries(),
                    error = %e,
                    "Handler failed"
                );

                if let Some(retry) = &self.retry {
                    retry.schedule(event).await;
                }

                return Err(e);
            }

            debug!(event_type = %event_type, handler = %handler_name, "Handler completed");
            ran += 1;
        }

        Ok(Dispatch::Handled(ran))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls {
        ok: AtomicUsize,
        failing: AtomicUsize,
        after: AtomicUsize,
    }

    struct CountingHandler {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl crate::router::EventHandler<Calls> for CountingHandler {
        async fn handle(&self, _event: Event, ctx: Arc<Calls>) -> Result<(), StreamError> {
            match self.name {
                "ok" => ctx.ok.fetch_add(1, Ordering::SeqCst),
                "failing" => ctx.failing.fetch_add(1, Ordering::SeqCst),
                _ => ctx.after.fetch_add(1, Ordering::SeqCst),
            };
            if self.fail {
                Err(StreamError::handler("boom"))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    #[tokio::test]
    async fn test_typeless_event_is_dropped() {
        let router: Router<Calls> = Router::new();
        let dispatcher = Dispatcher::new(router, Arc::new(Calls::default()));

        let event = Event::from_fields(BTreeMap::new());
        let outcome = dispatcher.process_message(&event).await.unwrap();
        assert_eq!(outcome, Dispatch::NoType);
    }

    #[tokio::test]
    async fn test_unknown_type_is_not_an_error() {
        let router: Router<Calls> =
            Router::new().register("known", Arc::new(CountingHandler { name: "ok", fail: false }));
        let dispatcher = Dispatcher::new(router, Arc::new(Calls::default()));

        let event = Event::new("unknown");
        let outcome = dispatcher.process_message(&event).await.unwrap();
        assert_eq!(outcome, Dispatch::NoHandlers);
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_handlers() {
        let calls = Arc::new(Calls::default());
        let router: Router<Calls> = Router::new()
            .register("evt", Arc::new(CountingHandler { name: "ok", fail: false }))
            .register("evt", Arc::new(CountingHandler { name: "failing", fail: true }))
            .register("evt", Arc::new(CountingHandler { name: "after", fail: false }));
        let dispatcher = Dispatcher::new(router, calls.clone());

        let result = dispatcher.process_message(&Event::new("evt")).await;

        assert!(result.is_err());
        assert_eq!(calls.ok.load(Ordering::SeqCst), 1);
        assert_eq!(calls.failing.load(Ordering::SeqCst), 1);
        assert_eq!(calls.after.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_filter_gates_handler() {
        let calls = Arc::new(Calls::default());
        let router: Router<Calls> = Router::new().register_with_filter(
            "evt",
            Arc::new(CountingHandler { name: "ok", fail: false }),
            Arc::new(|event: &Event| event.get("channel") == Some("email")),
        );
        let dispatcher = Dispatcher::new(router, calls.clone());

        let skipped = dispatcher
            .process_message(&Event::new("evt").with_field("channel", "telegram"))
            .await
            .unwrap();
        assert_eq!(skipped, Dispatch::Handled(0));
        assert_eq!(calls.ok.load(Ordering::SeqCst), 0);

        let ran = dispatcher
            .process_message(&Event::new("evt").with_field("channel", "email"))
            .await
            .unwrap();
        assert_eq!(ran, Dispatch::Handled(1));
        assert_eq!(calls.ok.load(Ordering::SeqCst), 1);
    }
}
