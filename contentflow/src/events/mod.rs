//! Transition events and the observer-facing status reporter.

mod reporter;
mod sink;

pub use reporter::{StatusReporter, Subscription};
pub use sink::{CollectingEventSink, EventSink, NoOpEventSink, TracingEventSink};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::Timestamp;
use crate::workflow::{StageName, StageStatus, WorkflowStatus};

/// What changed: one stage's status, or the computed workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Transition {
    /// A stage status change.
    Stage {
        /// The stage.
        stage: StageName,
        /// Status before.
        from: StageStatus,
        /// Status after.
        to: StageStatus,
    },
    /// A computed workflow status change.
    Workflow {
        /// Status before.
        from: WorkflowStatus,
        /// Status after.
        to: WorkflowStatus,
    },
}

/// One append-only entry in a workflow's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// When the transition was recorded.
    pub timestamp: Timestamp,
    /// The owning workflow.
    pub workflow_id: Uuid,
    /// The transition.
    pub transition: Transition,
    /// Free-form context (error cause, skip reason, cancel reason).
    pub detail: Option<String>,
}

impl TransitionEvent {
    /// Creates a stage transition event.
    #[must_use]
    pub fn stage(
        workflow_id: Uuid,
        stage: StageName,
        from: StageStatus,
        to: StageStatus,
        detail: Option<String>,
    ) -> Self {
        Self {
            timestamp: crate::utils::now(),
            workflow_id,
            transition: Transition::Stage { stage, from, to },
            detail,
        }
    }

    /// Creates a workflow transition event.
    #[must_use]
    pub fn workflow(
        workflow_id: Uuid,
        from: WorkflowStatus,
        to: WorkflowStatus,
        detail: Option<String>,
    ) -> Self {
        Self {
            timestamp: crate::utils::now(),
            workflow_id,
            transition: Transition::Workflow { from, to },
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_event_serializes_with_scope_tag() {
        let event = TransitionEvent::stage(
            crate::utils::generate_uuid(),
            StageName::Upload,
            StageStatus::Pending,
            StageStatus::Running,
            None,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["transition"]["scope"], "stage");
        assert_eq!(json["transition"]["stage"], "upload");
    }

    #[test]
    fn test_workflow_event_round_trips() {
        let event = TransitionEvent::workflow(
            crate::utils::generate_uuid(),
            WorkflowStatus::Analyzing,
            WorkflowStatus::Generating,
            Some("join resolved".to_string()),
        );
        let json = serde_json::to_string(&event).unwrap();
        let parsed: TransitionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
