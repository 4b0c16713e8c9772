//! Event sink trait and implementations.

use async_trait::async_trait;

use super::TransitionEvent;

/// Receives transition events for logging, monitoring, or analytics.
///
/// Sinks are observers only; nothing in the engine waits on them or reads
/// state back from them.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: &TransitionEvent);

    /// Emits an event without blocking. Must never fail loudly; errors are
    /// logged and suppressed.
    fn try_emit(&self, event: &TransitionEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &TransitionEvent) {}

    fn try_emit(&self, _event: &TransitionEvent) {}
}

/// A sink that logs events through the tracing framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl TracingEventSink {
    fn log(event: &TransitionEvent) {
        match &event.transition {
            super::Transition::Stage { stage, from, to } => {
                tracing::info!(
                    workflow = %event.workflow_id,
                    stage = %stage,
                    from = %from,
                    to = %to,
                    detail = event.detail.as_deref(),
                    "stage transition"
                );
            }
            super::Transition::Workflow { from, to } => {
                tracing::info!(
                    workflow = %event.workflow_id,
                    from = %from,
                    to = %to,
                    detail = event.detail.as_deref(),
                    "workflow transition"
                );
            }
        }
    }
}

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: &TransitionEvent) {
        Self::log(event);
    }

    fn try_emit(&self, event: &TransitionEvent) {
        Self::log(event);
    }
}

/// A collecting sink for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<TransitionEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<TransitionEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &TransitionEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &TransitionEvent) {
        self.events.write().push(event.clone());
    }
}
