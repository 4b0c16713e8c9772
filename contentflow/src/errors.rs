//! Error taxonomy for the orchestrator.
//!
//! Every failure surfaced to a caller carries a classified [`ErrorKind`] so
//! the retry policy and the workflow engine can decide between retrying,
//! failing fast, and degrading gracefully without string matching.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::artifacts::ArtifactKind;
use crate::registry::Capability;
use crate::workflow::StageName;

/// Classification of an orchestrator failure.
///
/// The kind is what policy code dispatches on: transient kinds are retried
/// under the backoff budget, everything else fails the attempt immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeout, connection failure, or 5xx from a collaborator. Retryable.
    TransientNetwork,
    /// Endpoint known to be unhealthy; failed fast without a network attempt.
    ServiceUnavailable,
    /// Malformed or rejected request (4xx, undecodable body). Never retried.
    Validation,
    /// A stage ran before its required artifact existed. Orchestration bug,
    /// fatal to the workflow regardless of stage criticality.
    Precondition,
    /// The fan-out join deadline expired for a branch.
    JoinTimeout,
    /// The workflow was cancelled.
    Cancelled,
    /// A requested record does not exist.
    NotFound,
    /// Anything that should not happen in correct operation.
    Internal,
}

impl ErrorKind {
    /// Returns true if a failure of this kind may be retried.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::TransientNetwork)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TransientNetwork => "transient_network",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Validation => "validation",
            Self::Precondition => "precondition",
            Self::JoinTimeout => "join_timeout",
            Self::Cancelled => "cancelled",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        };
        write!(f, "{name}")
    }
}

/// The error type for all orchestrator operations.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    /// A retryable network-class failure (timeout, connect, 5xx).
    #[error("transient network failure: {message}")]
    Transient {
        /// What went wrong.
        message: String,
    },

    /// The endpoint is known unusable; no network attempt was made.
    #[error("service for capability '{capability}' is unavailable")]
    Unavailable {
        /// The gated capability.
        capability: Capability,
    },

    /// The collaborator rejected the request or returned a malformed body.
    #[error("request rejected: {message}")]
    Validation {
        /// What was rejected.
        message: String,
    },

    /// A stage was invoked before its prerequisite artifact existed.
    #[error("precondition failed for stage '{stage}': missing {kind} artifact")]
    Precondition {
        /// The stage that was invoked out of order.
        stage: StageName,
        /// The missing prerequisite kind.
        kind: ArtifactKind,
    },

    /// The join deadline expired while waiting for a fan-out branch.
    #[error("join timed out waiting for stage '{stage}'")]
    JoinTimeout {
        /// The branch that did not finish in time.
        stage: StageName,
    },

    /// The workflow was cancelled before the operation could complete.
    #[error("workflow cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason, first one wins.
        reason: String,
    },

    /// No artifact of the requested kind has been written yet.
    ///
    /// Callers treat this as "stage not yet run", not as a system error.
    #[error("no {kind} artifact recorded for workflow {workflow_id}")]
    ArtifactNotFound {
        /// The owning workflow.
        workflow_id: Uuid,
        /// The requested artifact kind.
        kind: ArtifactKind,
    },

    /// The workflow id is unknown to the engine.
    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    /// No endpoint is registered for the capability.
    #[error("no endpoint registered for capability '{0}'")]
    EndpointMissing(Capability),

    /// A bug or an unrepresentable state.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::TransientNetwork,
            Self::Unavailable { .. } | Self::EndpointMissing(_) => ErrorKind::ServiceUnavailable,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Precondition { .. } => ErrorKind::Precondition,
            Self::JoinTimeout { .. } => ErrorKind::JoinTimeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::ArtifactNotFound { .. } | Self::WorkflowNotFound(_) => ErrorKind::NotFound,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the error may be retried under the backoff budget.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }
}

/// Classified failure stored on a stage record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    /// The failure classification.
    pub kind: ErrorKind,
    /// Human-readable cause.
    pub message: String,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&OrchestratorError> for StageError {
    fn from(err: &OrchestratorError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
