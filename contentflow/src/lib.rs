//! # Contentflow
//!
//! An orchestration engine for a multi-service content production pipeline.
//!
//! Contentflow drives a content workflow through its staged lifecycle:
//!
//! - **Staged execution**: upload, parallel trend and material analysis,
//!   generation, quality assessment, finalization
//! - **Health-gated calls**: collaborator endpoints are polled and calls to
//!   known-down services fail fast without consuming the retry budget
//! - **Classified retries**: transient failures back off with jitter,
//!   permanent failures surface immediately
//! - **Graceful degradation**: optional stages that fail are skipped and the
//!   pipeline continues without their output
//! - **Cooperative cancellation**: artifact stores are sealed before a
//!   cancellation is recorded, so cancelled workflows never gain artifacts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use contentflow::prelude::*;
//!
//! let engine = WorkflowEngine::new(OrchestratorConfig::default(), transport);
//! let id = engine.create_workflow();
//!
//! let input = WorkflowInput::new()
//!     .with_file(FileHandle::new("photo.jpg", "file:///photos/photo.jpg", "image/jpeg"))
//!     .with_keywords(vec!["sunset".into()])
//!     .with_description("summer evening promo");
//!
//! let snapshot = engine.run(id, &input).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifacts;
pub mod cancellation;
pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod health;
pub mod observability;
pub mod registry;
pub mod testing;
pub mod utils;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifacts::{Artifact, ArtifactId, ArtifactKind, ArtifactRegistry};
    pub use crate::cancellation::CancellationToken;
    pub use crate::client::{
        FileHandle, HttpTransport, RetryPolicy, ServiceClient, ServiceRequest, ServiceResponse,
        ServiceTransport,
    };
    pub use crate::config::{CriticalityPolicy, EndpointConfig, HealthConfig, OrchestratorConfig};
    pub use crate::errors::{ErrorKind, OrchestratorError, StageError};
    pub use crate::events::{
        EventSink, StatusReporter, Subscription, TracingEventSink, Transition, TransitionEvent,
    };
    pub use crate::health::{HealthMonitor, HealthProbe, HttpHealthProbe};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::registry::{Capability, HealthStatus, ServiceEndpoint, ServiceEndpointRegistry};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
    pub use crate::workflow::{
        StageName, StageRecord, StageStatus, WorkflowEngine, WorkflowInput, WorkflowSnapshot,
        WorkflowStatus,
    };
}
