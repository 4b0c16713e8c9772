//! Workflow and stage state model.
//!
//! A workflow's overall status is a pure function of its stage statuses and
//! the cancellation flag; it is computed on demand and never stored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::artifacts::{ArtifactId, ArtifactKind};
use crate::cancellation::CancellationToken;
use crate::client::{default_style, FileHandle};
use crate::config::CriticalityPolicy;
use crate::errors::{ErrorKind, OrchestratorError, StageError};
use crate::registry::Capability;
use crate::utils::Timestamp;

/// The six stages of the content pipeline, in execution order.
///
/// TrendAnalysis and MaterialAnalysis run concurrently between Upload and
/// Generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Push source material to asset storage.
    Upload,
    /// Fetch trend context (optional branch of the fan-out).
    TrendAnalysis,
    /// Analyze uploaded material (critical branch of the fan-out).
    MaterialAnalysis,
    /// Generate the image.
    Generation,
    /// Score the generated image.
    QualityAssessment,
    /// Bundle image + quality report into the final package.
    Finalization,
}

impl StageName {
    /// All stages in execution order.
    pub const ALL: [Self; 6] = [
        Self::Upload,
        Self::TrendAnalysis,
        Self::MaterialAnalysis,
        Self::Generation,
        Self::QualityAssessment,
        Self::Finalization,
    ];

    /// The collaborator capability this stage is delegated to.
    #[must_use]
    pub fn capability(self) -> Capability {
        match self {
            Self::Upload => Capability::Upload,
            Self::TrendAnalysis => Capability::Trend,
            Self::MaterialAnalysis => Capability::Analyze,
            Self::Generation => Capability::Generate,
            Self::QualityAssessment | Self::Finalization => Capability::AssessQuality,
        }
    }

    /// The artifact kind this stage produces on success.
    #[must_use]
    pub fn artifact_kind(self) -> ArtifactKind {
        match self {
            Self::Upload => ArtifactKind::UploadedFile,
            Self::TrendAnalysis => ArtifactKind::TrendReport,
            Self::MaterialAnalysis => ArtifactKind::AnalysisReport,
            Self::Generation => ArtifactKind::GeneratedImage,
            Self::QualityAssessment => ArtifactKind::QualityReport,
            Self::Finalization => ArtifactKind::FinalPackage,
        }
    }

    /// Artifact kinds that must exist before this stage may run.
    ///
    /// The trend report is deliberately not a Generation prerequisite: the
    /// optional branch may have been skipped.
    #[must_use]
    pub fn prerequisites(self) -> &'static [ArtifactKind] {
        match self {
            Self::Upload => &[],
            Self::TrendAnalysis | Self::MaterialAnalysis => &[ArtifactKind::UploadedFile],
            Self::Generation => &[ArtifactKind::AnalysisReport],
            Self::QualityAssessment => &[ArtifactKind::GeneratedImage],
            Self::Finalization => &[ArtifactKind::GeneratedImage, ArtifactKind::QualityReport],
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Upload => "upload",
            Self::TrendAnalysis => "trend_analysis",
            Self::MaterialAnalysis => "material_analysis",
            Self::Generation => "generation",
            Self::QualityAssessment => "quality_assessment",
            Self::Finalization => "finalization",
        };
        write!(f, "{name}")
    }
}

/// The execution status of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not started.
    #[default]
    Pending,
    /// Dispatched and awaiting a terminal outcome.
    Running,
    /// Finished with an artifact.
    Succeeded,
    /// Finished with a classified error.
    Failed,
    /// Bypassed: optional stage failed, timed out at the join, or lost a
    /// prerequisite to a non-critical failure.
    Skipped,
}

impl StageStatus {
    /// Returns true for terminal statuses.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Returns true if the transition `self → to` is legal.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Running | Self::Skipped)
                | (Self::Running, Self::Succeeded | Self::Failed | Self::Skipped)
        )
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{name}")
    }
}

/// Execution record for one stage of one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// The stage.
    pub name: StageName,
    /// Current status.
    pub status: StageStatus,
    /// How many times the stage has been dispatched (initial run + resumes).
    pub attempts: u32,
    /// When the latest dispatch started.
    pub started_at: Option<Timestamp>,
    /// When the latest terminal status was reached.
    pub finished_at: Option<Timestamp>,
    /// The produced artifact, when succeeded.
    pub artifact: Option<ArtifactId>,
    /// The classified cause, when failed (also kept on skip-after-failure
    /// for audit).
    pub error: Option<StageError>,
}

impl StageRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            status: StageStatus::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            artifact: None,
            error: None,
        }
    }

    fn transition(&mut self, to: StageStatus) -> Result<StageStatus, OrchestratorError> {
        if !self.status.can_transition_to(to) {
            return Err(OrchestratorError::Internal(format!(
                "illegal stage transition {} -> {to} for '{}'",
                self.status, self.name
            )));
        }
        let from = self.status;
        self.status = to;
        Ok(from)
    }

    /// Marks the stage running and counts the attempt. Returns the previous
    /// status.
    pub fn begin(&mut self) -> Result<StageStatus, OrchestratorError> {
        let from = self.transition(StageStatus::Running)?;
        self.attempts += 1;
        self.started_at = Some(crate::utils::now());
        self.finished_at = None;
        Ok(from)
    }

    /// Marks the stage succeeded with its artifact. Returns the previous
    /// status.
    pub fn succeed(&mut self, artifact: ArtifactId) -> Result<StageStatus, OrchestratorError> {
        let from = self.transition(StageStatus::Succeeded)?;
        self.artifact = Some(artifact);
        self.error = None;
        self.finished_at = Some(crate::utils::now());
        Ok(from)
    }

    /// Marks the stage failed with its classified cause. Returns the
    /// previous status.
    pub fn fail(&mut self, error: StageError) -> Result<StageStatus, OrchestratorError> {
        let from = self.transition(StageStatus::Failed)?;
        self.error = Some(error);
        self.finished_at = Some(crate::utils::now());
        Ok(from)
    }

    /// Marks the stage skipped, keeping the triggering error (if any) for
    /// audit. Returns the previous status.
    pub fn skip(&mut self, error: Option<StageError>) -> Result<StageStatus, OrchestratorError> {
        let from = self.transition(StageStatus::Skipped)?;
        self.error = error;
        self.finished_at = Some(crate::utils::now());
        Ok(from)
    }

    /// Resets a failed stage to pending so a resume can retry it.
    pub fn reset_for_retry(&mut self) -> Result<StageStatus, OrchestratorError> {
        if self.status != StageStatus::Failed {
            return Err(OrchestratorError::Internal(format!(
                "cannot reset stage '{}' from {}",
                self.name, self.status
            )));
        }
        let from = self.status;
        self.status = StageStatus::Pending;
        self.error = None;
        self.finished_at = None;
        Ok(from)
    }
}

/// Computed overall workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created, nothing dispatched yet.
    Pending,
    /// Upload in progress.
    Uploading,
    /// Fan-out branches in progress.
    Analyzing,
    /// Generation in progress.
    Generating,
    /// Quality assessment in progress.
    AssessingQuality,
    /// Finalization in progress.
    Finalizing,
    /// Finalization succeeded; terminal.
    Finalized,
    /// A critical stage failed; terminal (resumable).
    Failed,
    /// Cancel was requested before finalization; terminal.
    Cancelled,
}

impl WorkflowStatus {
    /// Returns true for terminal statuses. `Failed` is terminal but
    /// resumable.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Analyzing => "analyzing",
            Self::Generating => "generating",
            Self::AssessingQuality => "assessing_quality",
            Self::Finalizing => "finalizing",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

/// User-supplied inputs for one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInput {
    /// Files to upload as source material.
    pub files: Vec<FileHandle>,
    /// Caller keywords guiding analysis and trend lookup.
    pub keywords: Vec<String>,
    /// Free-form description of the intended content.
    pub description: String,
    /// Generation style.
    pub style: String,
    /// Hashtag budget for the final package.
    pub max_hashtags: usize,
}

impl Default for WorkflowInput {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            keywords: Vec::new(),
            description: String::new(),
            style: default_style(),
            max_hashtags: 15,
        }
    }
}

impl WorkflowInput {
    /// Creates an empty input with default style.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file.
    #[must_use]
    pub fn with_file(mut self, file: FileHandle) -> Self {
        self.files.push(file);
        self
    }

    /// Sets the keywords.
    #[must_use]
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the generation style.
    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }
}

/// One end-to-end run of the content pipeline.
///
/// Mutated only by the workflow engine; terminal snapshots are immutable.
#[derive(Debug)]
pub struct Workflow {
    /// Unique id.
    pub id: Uuid,
    /// Stage records in execution order.
    pub stages: Vec<StageRecord>,
    /// When the workflow was created.
    pub created_at: Timestamp,
    /// Cooperative cancellation flag.
    pub cancel: Arc<CancellationToken>,
}

impl Workflow {
    /// Creates a new workflow with all stages pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: crate::utils::generate_uuid(),
            stages: StageName::ALL.iter().map(|n| StageRecord::new(*n)).collect(),
            created_at: crate::utils::now(),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Returns the record for a stage.
    #[must_use]
    pub fn stage(&self, name: StageName) -> &StageRecord {
        // Construction guarantees one record per stage name.
        self.stages
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| unreachable!("stage record missing for {name}"))
    }

    /// Returns the mutable record for a stage.
    pub fn stage_mut(&mut self, name: StageName) -> &mut StageRecord {
        self.stages
            .iter_mut()
            .find(|s| s.name == name)
            .unwrap_or_else(|| unreachable!("stage record missing for {name}"))
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn status_of(&self, name: StageName) -> StageStatus {
        self.stage(name).status
    }

    /// Computes the overall workflow status from stage statuses and the
    /// cancellation flag. Never stored.
    #[must_use]
    pub fn status(&self, policy: &CriticalityPolicy) -> WorkflowStatus {
        let fatal_failure = self.stages.iter().any(|s| {
            s.status == StageStatus::Failed
                && (policy.is_critical(s.name)
                    || s.error.as_ref().is_some_and(|e| e.kind == ErrorKind::Precondition))
        });
        if fatal_failure {
            return WorkflowStatus::Failed;
        }
        if self.status_of(StageName::Finalization) == StageStatus::Succeeded {
            return WorkflowStatus::Finalized;
        }
        if self.cancel_requested() {
            return WorkflowStatus::Cancelled;
        }

        if self.stages.iter().all(|s| s.status == StageStatus::Pending) {
            return WorkflowStatus::Pending;
        }
        if self.status_of(StageName::Upload) != StageStatus::Succeeded {
            return WorkflowStatus::Uploading;
        }
        if !self.status_of(StageName::TrendAnalysis).is_terminal()
            || !self.status_of(StageName::MaterialAnalysis).is_terminal()
        {
            return WorkflowStatus::Analyzing;
        }
        if self.status_of(StageName::Generation) != StageStatus::Succeeded {
            return WorkflowStatus::Generating;
        }
        if self.status_of(StageName::QualityAssessment) != StageStatus::Succeeded {
            return WorkflowStatus::AssessingQuality;
        }
        WorkflowStatus::Finalizing
    }

    /// Returns the first failed stage, if any.
    #[must_use]
    pub fn failing_stage(&self) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.status == StageStatus::Failed)
    }

    /// Captures a serializable snapshot of the workflow.
    #[must_use]
    pub fn snapshot(&self, policy: &CriticalityPolicy) -> WorkflowSnapshot {
        WorkflowSnapshot {
            id: self.id,
            status: self.status(policy),
            stages: self.stages.clone(),
            created_at: self.created_at,
        }
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

/// Queryable point-in-time view of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    /// Workflow id.
    pub id: Uuid,
    /// Computed overall status at snapshot time.
    pub status: WorkflowStatus,
    /// Stage records, execution order.
    pub stages: Vec<StageRecord>,
    /// Creation time.
    pub created_at: Timestamp,
}

impl WorkflowSnapshot {
    /// Returns the record for a stage.
    #[must_use]
    pub fn stage(&self, name: StageName) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }
}
