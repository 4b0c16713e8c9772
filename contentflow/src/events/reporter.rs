//! Append-only, replayable event stream for external observers.
//!
//! Observers subscribe instead of polling: a subscription replays the full
//! history recorded so far and then receives pushed transitions live. The
//! reporter never influences engine decisions.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{EventSink, TransitionEvent};

/// Buffered events per workflow channel before a slow observer starts
/// losing the oldest ones.
const CHANNEL_CAPACITY: usize = 256;

/// A replayable view of one workflow's event stream.
pub struct Subscription {
    /// Every event recorded before the subscription was taken, oldest first.
    pub history: Vec<TransitionEvent>,
    /// Live receiver for events recorded after the subscription was taken.
    pub live: broadcast::Receiver<TransitionEvent>,
}

struct WorkflowLog {
    events: Vec<TransitionEvent>,
    sender: broadcast::Sender<TransitionEvent>,
}

impl WorkflowLog {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            events: Vec::new(),
            sender,
        }
    }
}

/// Append-only event log of stage and workflow transitions.
#[derive(Default)]
pub struct StatusReporter {
    logs: DashMap<Uuid, WorkflowLog>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Default for WorkflowLog {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    /// Creates a reporter with no extra sinks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an additional sink that receives every recorded event.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Appends an event and pushes it to live subscribers and sinks.
    pub fn record(&self, event: TransitionEvent) {
        let mut log = self.logs.entry(event.workflow_id).or_default();
        log.events.push(event.clone());
        // A send error only means no live subscriber; history keeps the event.
        let _ = log.sender.send(event.clone());
        drop(log);

        for sink in &self.sinks {
            sink.try_emit(&event);
        }
    }

    /// Returns the recorded history for a workflow, oldest first.
    #[must_use]
    pub fn history(&self, workflow_id: Uuid) -> Vec<TransitionEvent> {
        self.logs
            .get(&workflow_id)
            .map(|log| log.events.clone())
            .unwrap_or_default()
    }

    /// Subscribes to a workflow's event stream.
    ///
    /// The returned subscription replays the history recorded so far and
    /// then receives live pushes; any number of observers may subscribe,
    /// and a dropped observer can restart from history at any time.
    #[must_use]
    pub fn subscribe(&self, workflow_id: Uuid) -> Subscription {
        let log = self.logs.entry(workflow_id).or_default();
        Subscription {
            history: log.events.clone(),
            live: log.sender.subscribe(),
        }
    }
}
