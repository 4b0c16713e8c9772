//! Versioned, immutable artifact references produced by stages.
//!
//! The registry never holds raw payloads, only opaque storage locators plus
//! string metadata. A re-run of a stage appends a new version; nothing is
//! ever overwritten in place.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::OrchestratorError;
use crate::utils::Timestamp;

/// The kind of result a stage produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Storage reference for user-uploaded source material.
    UploadedFile,
    /// Trend context for the content domain.
    TrendReport,
    /// Keywords and visual summary of the uploaded material.
    AnalysisReport,
    /// Reference to the generated image.
    GeneratedImage,
    /// Quality score, caption, and hashtags for a generated image.
    QualityReport,
    /// The finalized bundle of image + quality report.
    FinalPackage,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UploadedFile => "uploaded_file",
            Self::TrendReport => "trend_report",
            Self::AnalysisReport => "analysis_report",
            Self::GeneratedImage => "generated_image",
            Self::QualityReport => "quality_report",
            Self::FinalPackage => "final_package",
        };
        write!(f, "{name}")
    }
}

/// Unique identifier of one artifact version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId {
    /// The owning workflow.
    pub workflow_id: Uuid,
    /// The artifact kind.
    pub kind: ArtifactKind,
    /// Version number, starting at 1 and strictly increasing per
    /// (workflow, kind).
    pub version: u64,
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/v{}", self.workflow_id, self.kind, self.version)
    }
}

/// An immutable reference to a stage result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// The versioned identifier.
    pub id: ArtifactId,
    /// Opaque storage locator (URL or handle); the orchestrator never holds
    /// the raw bytes.
    pub locator: String,
    /// String metadata attached by the producing stage.
    pub metadata: HashMap<String, String>,
    /// When the artifact was written.
    pub created_at: Timestamp,
}

/// Concurrent store of artifact references, keyed by workflow id and kind.
#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    entries: DashMap<(Uuid, ArtifactKind), Vec<Artifact>>,
    seals: DashMap<Uuid, Arc<RwLock<bool>>>,
}

impl ArtifactRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn seal_flag(&self, workflow_id: Uuid) -> Arc<RwLock<bool>> {
        let flag = self.seals.entry(workflow_id).or_default();
        Arc::clone(flag.value())
    }

    /// Writes a new artifact version and returns its id.
    ///
    /// Always appends; version numbers are monotonically increasing per
    /// (workflow, kind). Fails with `Cancelled` once the workflow has been
    /// sealed, so a late-arriving stage success can never race a recorded
    /// cancellation.
    pub fn put(
        &self,
        workflow_id: Uuid,
        kind: ArtifactKind,
        locator: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> Result<ArtifactId, OrchestratorError> {
        // The seal flag stays read-locked across check and append, so `seal`
        // cannot return in between: any write that passes this check lands
        // before the Cancelled transition is recorded.
        let flag = self.seal_flag(workflow_id);
        let sealed = flag.read();
        if *sealed {
            return Err(OrchestratorError::cancelled(format!(
                "workflow {workflow_id} is sealed, {kind} artifact discarded"
            )));
        }

        let mut versions = self.entries.entry((workflow_id, kind)).or_default();
        let id = ArtifactId {
            workflow_id,
            kind,
            version: versions.len() as u64 + 1,
        };
        versions.push(Artifact {
            id,
            locator: locator.into(),
            metadata,
            created_at: crate::utils::now(),
        });
        tracing::debug!(artifact = %id, "artifact written");
        Ok(id)
    }

    /// Returns the latest artifact of a kind for a workflow.
    ///
    /// `NotFound` means "stage not yet run", not a system error.
    pub fn get(
        &self,
        workflow_id: Uuid,
        kind: ArtifactKind,
    ) -> Result<Artifact, OrchestratorError> {
        self.entries
            .get(&(workflow_id, kind))
            .and_then(|versions| versions.last().cloned())
            .ok_or(OrchestratorError::ArtifactNotFound { workflow_id, kind })
    }

    /// Returns a specific artifact version.
    pub fn get_version(
        &self,
        workflow_id: Uuid,
        kind: ArtifactKind,
        version: u64,
    ) -> Result<Artifact, OrchestratorError> {
        self.entries
            .get(&(workflow_id, kind))
            .and_then(|versions| versions.get(version.checked_sub(1)? as usize).cloned())
            .ok_or(OrchestratorError::ArtifactNotFound { workflow_id, kind })
    }

    /// Returns all versions of a kind for a workflow, oldest first.
    ///
    /// Empty when the stage has not run; supports re-generation audit.
    #[must_use]
    pub fn history(&self, workflow_id: Uuid, kind: ArtifactKind) -> Vec<Artifact> {
        self.entries
            .get(&(workflow_id, kind))
            .map(|versions| versions.clone())
            .unwrap_or_default()
    }

    /// Returns true if at least one artifact of the kind exists.
    #[must_use]
    pub fn contains(&self, workflow_id: Uuid, kind: ArtifactKind) -> bool {
        self.entries
            .get(&(workflow_id, kind))
            .is_some_and(|versions| !versions.is_empty())
    }

    /// Rejects all further writes for the workflow.
    ///
    /// Called when a cancellation is recorded; artifacts already written are
    /// retained for audit. Waits out any in-flight `put`, so once this
    /// returns no new version can appear for the workflow.
    pub fn seal(&self, workflow_id: Uuid) {
        let flag = self.seal_flag(workflow_id);
        *flag.write() = true;
    }

    /// Returns true if the workflow accepts no further writes.
    #[must_use]
    pub fn is_sealed(&self, workflow_id: Uuid) -> bool {
        self.seals
            .get(&workflow_id)
            .is_some_and(|flag| *flag.read())
    }
}
