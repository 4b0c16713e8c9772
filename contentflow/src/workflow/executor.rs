//! Executes one named stage against its collaborator.
//!
//! The executor validates prerequisite artifacts, builds the stage-specific
//! request from them, performs the exchange through the service client, and
//! writes the resulting artifact version. It never mutates workflow records;
//! it reports a [`StageOutcome`] for the engine to apply.

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::artifacts::{ArtifactId, ArtifactKind, ArtifactRegistry};
use crate::cancellation::CancellationToken;
use crate::client::{
    idempotency_key, AnalysisContext, ServiceClient, ServiceRequest, ServiceResponse, TrendContext,
};
use crate::errors::{OrchestratorError, StageError};
use crate::workflow::state::{StageName, WorkflowInput};

/// List separator inside artifact metadata values.
const LIST_SEP: char = '|';

/// Prompt fallback when neither an analysis summary nor a description is
/// available.
const DEFAULT_PROMPT: &str = "AI generated content";

fn join_list(items: &[String]) -> String {
    items.join(&LIST_SEP.to_string())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(LIST_SEP)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Terminal result of one stage invocation.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// The stage produced a new artifact version.
    Succeeded(ArtifactId),
    /// The stage failed with a classified cause.
    Failed(StageError),
}

impl StageOutcome {
    /// Returns true for the succeeded variant.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Runs single stages: precondition check, collaborator call, artifact write.
pub struct StageExecutor {
    client: Arc<ServiceClient>,
    artifacts: Arc<ArtifactRegistry>,
}

impl StageExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(client: Arc<ServiceClient>, artifacts: Arc<ArtifactRegistry>) -> Self {
        Self { client, artifacts }
    }

    /// Runs one stage to a terminal outcome.
    ///
    /// A missing prerequisite artifact is a sequencing bug and fails with
    /// `Precondition` before any network attempt.
    pub async fn run(
        &self,
        workflow_id: Uuid,
        stage: StageName,
        input: &WorkflowInput,
        cancel: &CancellationToken,
    ) -> StageOutcome {
        for kind in stage.prerequisites() {
            if !self.artifacts.contains(workflow_id, *kind) {
                let err = OrchestratorError::Precondition { stage, kind: *kind };
                tracing::error!(workflow = %workflow_id, stage = %stage, error = %err, "stage sequencing bug");
                return StageOutcome::Failed(StageError::from(&err));
            }
        }

        let request = match self.build_request(workflow_id, stage, input) {
            Ok(request) => request,
            Err(err) => return StageOutcome::Failed(StageError::from(&err)),
        };

        tracing::debug!(workflow = %workflow_id, stage = %stage, "dispatching stage");
        match self.client.call(&request, cancel).await {
            Ok(response) => match self.record_artifact(workflow_id, stage, &response) {
                Ok(artifact) => {
                    tracing::info!(workflow = %workflow_id, stage = %stage, artifact = %artifact, "stage succeeded");
                    StageOutcome::Succeeded(artifact)
                }
                Err(err) => StageOutcome::Failed(StageError::from(&err)),
            },
            Err(err) => {
                tracing::warn!(workflow = %workflow_id, stage = %stage, error = %err, "stage failed");
                StageOutcome::Failed(StageError::from(&err))
            }
        }
    }

    fn uploaded_refs(&self, workflow_id: Uuid) -> Result<Vec<String>, OrchestratorError> {
        let artifact = self.artifacts.get(workflow_id, ArtifactKind::UploadedFile)?;
        Ok(artifact
            .metadata
            .get("refs")
            .map(|refs| split_list(refs))
            .unwrap_or_else(|| vec![artifact.locator.clone()]))
    }

    fn analysis_context(&self, workflow_id: Uuid) -> Option<AnalysisContext> {
        let artifact = self.artifacts.get(workflow_id, ArtifactKind::AnalysisReport).ok()?;
        Some(AnalysisContext {
            keywords: artifact
                .metadata
                .get("keywords")
                .map(|k| split_list(k))
                .unwrap_or_default(),
            visual_summary: artifact
                .metadata
                .get("visual_summary")
                .cloned()
                .unwrap_or_default(),
        })
    }

    fn trend_context(&self, workflow_id: Uuid) -> Option<TrendContext> {
        let artifact = self.artifacts.get(workflow_id, ArtifactKind::TrendReport).ok()?;
        Some(TrendContext {
            trends: artifact
                .metadata
                .get("trends")
                .map(|t| split_list(t))
                .unwrap_or_default(),
            hashtags: artifact
                .metadata
                .get("hashtags")
                .map(|h| split_list(h))
                .unwrap_or_default(),
        })
    }

    fn prompt_for(&self, workflow_id: Uuid, input: &WorkflowInput) -> String {
        let summary = self
            .analysis_context(workflow_id)
            .map(|ctx| ctx.visual_summary)
            .filter(|s| !s.is_empty());
        match summary {
            Some(summary) if input.description.is_empty() => summary,
            Some(summary) => format!("{summary}; {}", input.description),
            None if input.description.is_empty() => DEFAULT_PROMPT.to_string(),
            None => input.description.clone(),
        }
    }

    fn build_request(
        &self,
        workflow_id: Uuid,
        stage: StageName,
        input: &WorkflowInput,
    ) -> Result<ServiceRequest, OrchestratorError> {
        match stage {
            StageName::Upload => {
                let fingerprint = input
                    .files
                    .iter()
                    .map(|f| f.name.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                let mut metadata = HashMap::new();
                metadata.insert("description".to_string(), input.description.clone());
                Ok(ServiceRequest::UploadAsset {
                    files: input.files.clone(),
                    metadata,
                    idempotency_key: idempotency_key(workflow_id, stage, &fingerprint),
                })
            }
            StageName::TrendAnalysis => Ok(ServiceRequest::TrendLookup {
                material_refs: self.uploaded_refs(workflow_id)?,
                keywords: input.keywords.clone(),
            }),
            StageName::MaterialAnalysis => Ok(ServiceRequest::MaterialAnalysis {
                file_refs: self.uploaded_refs(workflow_id)?,
                keywords: input.keywords.clone(),
            }),
            StageName::Generation => {
                let analysis_context = self.analysis_context(workflow_id).ok_or(
                    OrchestratorError::Precondition {
                        stage,
                        kind: ArtifactKind::AnalysisReport,
                    },
                )?;
                Ok(ServiceRequest::GenerateContent {
                    prompt: self.prompt_for(workflow_id, input),
                    style: input.style.clone(),
                    analysis_context,
                    // Absent when the optional branch was skipped.
                    trend_context: self.trend_context(workflow_id),
                })
            }
            StageName::QualityAssessment => {
                let image = self.artifacts.get(workflow_id, ArtifactKind::GeneratedImage)?;
                Ok(ServiceRequest::AssessQuality {
                    image_ref: image.locator,
                    prompt: self.prompt_for(workflow_id, input),
                })
            }
            StageName::Finalization => {
                let image = self.artifacts.get(workflow_id, ArtifactKind::GeneratedImage)?;
                let quality = self.artifacts.get(workflow_id, ArtifactKind::QualityReport)?;
                Ok(ServiceRequest::Finalize {
                    image_ref: image.locator,
                    quality_ref: quality.locator,
                    max_hashtags: input.max_hashtags,
                })
            }
        }
    }

    fn record_artifact(
        &self,
        workflow_id: Uuid,
        stage: StageName,
        response: &ServiceResponse,
    ) -> Result<ArtifactId, OrchestratorError> {
        let kind = stage.artifact_kind();
        let (locator, metadata) = match response {
            ServiceResponse::Uploaded { file_refs } => {
                let mut metadata = HashMap::new();
                metadata.insert("refs".to_string(), join_list(file_refs));
                metadata.insert("count".to_string(), file_refs.len().to_string());
                (
                    file_refs.first().cloned().unwrap_or_default(),
                    metadata,
                )
            }
            ServiceResponse::Trends(ctx) => {
                let mut metadata = HashMap::new();
                metadata.insert("trends".to_string(), join_list(&ctx.trends));
                metadata.insert("hashtags".to_string(), join_list(&ctx.hashtags));
                (format!("trend-report:{workflow_id}"), metadata)
            }
            ServiceResponse::Analysis(ctx) => {
                let mut metadata = HashMap::new();
                metadata.insert("keywords".to_string(), join_list(&ctx.keywords));
                metadata.insert("visual_summary".to_string(), ctx.visual_summary.clone());
                (format!("analysis-report:{workflow_id}"), metadata)
            }
            ServiceResponse::Generated { image_ref } => (image_ref.clone(), HashMap::new()),
            ServiceResponse::Quality(verdict) => {
                let mut metadata = HashMap::new();
                metadata.insert("score".to_string(), format!("{:.4}", verdict.score));
                metadata.insert("caption".to_string(), verdict.caption.clone());
                metadata.insert("hashtags".to_string(), join_list(&verdict.hashtags));
                (format!("quality-report:{workflow_id}"), metadata)
            }
            ServiceResponse::Finalized { package_ref } => {
                (package_ref.clone(), self.package_metadata(workflow_id))
            }
        };

        let expected = matches!(
            (response, kind),
            (ServiceResponse::Uploaded { .. }, ArtifactKind::UploadedFile)
                | (ServiceResponse::Trends(_), ArtifactKind::TrendReport)
                | (ServiceResponse::Analysis(_), ArtifactKind::AnalysisReport)
                | (ServiceResponse::Generated { .. }, ArtifactKind::GeneratedImage)
                | (ServiceResponse::Quality(_), ArtifactKind::QualityReport)
                | (ServiceResponse::Finalized { .. }, ArtifactKind::FinalPackage)
        );
        if !expected {
            return Err(OrchestratorError::validation(format!(
                "collaborator answered stage '{stage}' with a mismatched response"
            )));
        }

        self.artifacts.put(workflow_id, kind, locator, metadata)
    }

    /// FinalPackage metadata bundles the source image and quality verdict so
    /// the package is auditable without dereferencing its locator.
    fn package_metadata(&self, workflow_id: Uuid) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        if let Ok(image) = self.artifacts.get(workflow_id, ArtifactKind::GeneratedImage) {
            metadata.insert("image_artifact".to_string(), image.id.to_string());
            metadata.insert("image_ref".to_string(), image.locator);
        }
        if let Ok(quality) = self.artifacts.get(workflow_id, ArtifactKind::QualityReport) {
            metadata.insert("quality_artifact".to_string(), quality.id.to_string());
            for key in ["score", "caption", "hashtags"] {
                if let Some(value) = quality.metadata.get(key) {
                    metadata.insert(key.to_string(), value.clone());
                }
            }
        }
        metadata
    }
}
