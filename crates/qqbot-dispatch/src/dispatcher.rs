//! Event dispatcher with admission control.
//!
//! Every routed event costs one semaphore permit, held by the spawned
//! handler task until it finishes. When the ceiling is reached the dispatch
//! loop stops pulling events, which in turn stalls the gateway reader.

use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::{FutureExt, Stream, StreamExt};
use qqbot_core::{EventHandler, InboundEvent};
use tokio::{sync::Semaphore, task::JoinHandle, time};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Default ceiling on concurrently running handler tasks.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1000;

/// Default handler deadline: five minutes minus a safety margin.
pub const DEFAULT_HANDLER_DEADLINE: Duration = Duration::from_secs(5 * 60 - 5);

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum outstanding handler tasks.
    pub max_in_flight: usize,
    /// Wall-clock deadline per handler task.
    pub handler_deadline: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            handler_deadline: DEFAULT_HANDLER_DEADLINE,
        }
    }
}

/// How a handler task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler returned `Ok`.
    Completed,
    /// The handler returned an error or panicked.
    Failed,
    /// The deadline elapsed; the timeout fallback ran instead.
    TimedOut,
}

/// Routes dispatch events to handlers by event type.
pub struct Dispatcher {
    routes: HashMap<String, Arc<dyn EventHandler>>,
    limiter: Arc<Semaphore>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Create a dispatcher with no routes.
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            routes: HashMap::new(),
            limiter: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
        }
    }

    /// Register the handler for an event type.
    #[must_use]
    pub fn route(mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.routes.insert(event_type.into(), handler);
        self
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Capacity currently available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Handler tasks currently holding capacity.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.config.max_in_flight - self.available()
    }

    /// Dispatch every event of `events` until the stream ends.
    ///
    /// Handler failures never end the loop.
    pub async fn run<S>(&self, events: S)
    where
        S: Stream<Item = InboundEvent>,
    {
        tokio::pin!(events);

        while let Some(event) = events.next().await {
            // Detached: the task owns its ticket and reports its own outcome.
            drop(self.dispatch(event).await);
        }
        info!(in_flight = self.in_flight(), "Event stream ended");
    }

    /// Admit one event.
    ///
    /// Returns `None` when the event is dropped. Otherwise waits for capacity,
    /// spawns the handler task and returns its handle.
    pub async fn dispatch(&self, event: InboundEvent) -> Option<JoinHandle<Outcome>> {
        if !event.is_dispatch() {
            warn!(op = event.op, sequence = ?event.s, "Unexpected event: {:?}", event.d);
            return None;
        }

        let Some(handler) = event
            .event_type()
            .and_then(|event_type| self.routes.get(event_type))
            .cloned()
        else {
            warn!(event_type = ?event.t, sequence = ?event.s, "Unhandled event");
            return None;
        };

        // Suspends the loop while the ceiling is exhausted.
        let ticket = match Arc::clone(&self.limiter).acquire_owned().await {
            Ok(ticket) => ticket,
            Err(e) => {
                error!("Dispatcher capacity closed: {e}");
                return None;
            }
        };

        let task_id = Uuid::new_v4();
        let deadline = self.config.handler_deadline;
        let span = info_span!(
            "handler",
            %task_id,
            event_type = event.event_type().unwrap_or_default(),
            sequence = ?event.s
        );

        let task = async move {
            let _ticket = ticket;
            debug!("Handler started");

            let handled = AssertUnwindSafe(handler.handle(&event)).catch_unwind();
            let result = time::timeout(deadline, handled).await;
            match result {
                Ok(Ok(Ok(()))) => {
                    debug!("Handler completed");
                    Outcome::Completed
                }
                Ok(Ok(Err(e))) => {
                    error!(error = %e, "Handler failed");
                    Outcome::Failed
                }
                Ok(Err(_)) => {
                    error!("Handler panicked");
                    Outcome::Failed
                }
                Err(_) => {
                    warn!(deadline_secs = deadline.as_secs(), "Handler timed out");
                    if let Err(e) = handler.on_timeout(&event).await {
                        error!(error = %e, "Timeout fallback failed");
                    }
                    Outcome::TimedOut
                }
            }
        };

        Some(tokio::spawn(task.instrument(span)))
    }

    /// Wait until every admitted handler task has finished.
    pub async fn drain(&self) {
        let all = u32::try_from(self.config.max_in_flight).unwrap_or(u32::MAX);
        if let Ok(permits) = self.limiter.acquire_many(all).await {
            drop(permits);
        }
    }
}
