//! The workflow engine: sequencing, fan-out, cancellation, and resume.
//!
//! The engine is the single writer of stage records and the single emitter
//! of transition events. Stage work itself is delegated to the
//! [`StageExecutor`]; this module owns the order in which stages run, the
//! fan-out join, the criticality decision when a stage fails, and the
//! seal-before-cancel ordering that keeps cancelled workflows free of late
//! artifact writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::artifacts::{Artifact, ArtifactKind, ArtifactRegistry};
use crate::client::{ServiceClient, ServiceTransport};
use crate::config::OrchestratorConfig;
use crate::errors::{ErrorKind, OrchestratorError, StageError};
use crate::events::{StatusReporter, Subscription, TransitionEvent};
use crate::health::{HealthMonitor, HealthProbe, HttpHealthProbe};
use crate::registry::{Capability, HealthStatus, ServiceEndpointRegistry};
use crate::workflow::executor::{StageExecutor, StageOutcome};
use crate::workflow::state::{
    StageName, StageRecord, StageStatus, Workflow, WorkflowInput, WorkflowSnapshot, WorkflowStatus,
};

/// How a stage left the driver: keep going, stop with a fatal failure, or
/// stop because cancellation was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Continuation {
    Continue,
    Fatal,
    Cancelled,
}

/// Drives content workflows through the staged pipeline.
pub struct WorkflowEngine {
    config: OrchestratorConfig,
    health: Arc<HealthMonitor>,
    artifacts: Arc<ArtifactRegistry>,
    reporter: Arc<StatusReporter>,
    executor: StageExecutor,
    workflows: DashMap<Uuid, Arc<RwLock<Workflow>>>,
}

impl WorkflowEngine {
    /// Creates an engine with the HTTP health probe.
    #[must_use]
    pub fn new(config: OrchestratorConfig, transport: Arc<dyn ServiceTransport>) -> Self {
        let probe = Arc::new(HttpHealthProbe::new(Duration::from_millis(
            config.health.probe_timeout_ms,
        )));
        Self::with_probe(config, transport, probe)
    }

    /// Creates an engine with an explicit health probe.
    #[must_use]
    pub fn with_probe(
        config: OrchestratorConfig,
        transport: Arc<dyn ServiceTransport>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let registry = Arc::new(ServiceEndpointRegistry::from_config(&config.endpoints));
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            probe,
            config.health.clone(),
        ));
        let client = Arc::new(ServiceClient::new(
            Arc::clone(&registry),
            Arc::clone(&health),
            transport,
            config.retry.clone(),
            Duration::from_millis(config.call_timeout_ms),
        ));
        let artifacts = Arc::new(ArtifactRegistry::new());
        let executor = StageExecutor::new(client, Arc::clone(&artifacts));
        Self {
            config,
            health,
            artifacts,
            reporter: Arc::new(StatusReporter::new()),
            executor,
            workflows: DashMap::new(),
        }
    }

    /// Replaces the status reporter, typically to attach event sinks.
    #[must_use]
    pub fn with_reporter(mut self, reporter: StatusReporter) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// The health monitor, for running the background poll loop.
    #[must_use]
    pub fn health_monitor(&self) -> Arc<HealthMonitor> {
        Arc::clone(&self.health)
    }

    /// Current gated health of every registered collaborator. Reads the
    /// registry without probing.
    #[must_use]
    pub fn health_report(&self) -> HashMap<Capability, HealthStatus> {
        self.health.report()
    }

    /// Creates a workflow with all stages pending and returns its id.
    #[must_use]
    pub fn create_workflow(&self) -> Uuid {
        let workflow = Workflow::new();
        let id = workflow.id;
        self.workflows.insert(id, Arc::new(RwLock::new(workflow)));
        tracing::info!(workflow = %id, "workflow created");
        id
    }

    fn workflow(&self, id: Uuid) -> Result<Arc<RwLock<Workflow>>, OrchestratorError> {
        self.workflows
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(OrchestratorError::WorkflowNotFound(id))
    }

    /// Point-in-time snapshot of a workflow.
    pub fn snapshot(&self, id: Uuid) -> Result<WorkflowSnapshot, OrchestratorError> {
        Ok(self.workflow(id)?.read().snapshot(&self.config.criticality))
    }

    /// Recorded transition history for a workflow, oldest first.
    #[must_use]
    pub fn history(&self, id: Uuid) -> Vec<TransitionEvent> {
        self.reporter.history(id)
    }

    /// Subscribes to a workflow's transitions: full replay plus live push.
    #[must_use]
    pub fn subscribe(&self, id: Uuid) -> Subscription {
        self.reporter.subscribe(id)
    }

    /// Latest version of an artifact.
    pub fn artifact(&self, id: Uuid, kind: ArtifactKind) -> Result<Artifact, OrchestratorError> {
        self.artifacts.get(id, kind)
    }

    /// Full version history of an artifact, oldest first.
    #[must_use]
    pub fn artifact_history(&self, id: Uuid, kind: ArtifactKind) -> Vec<Artifact> {
        self.artifacts.history(id, kind)
    }

    /// Requests cooperative cancellation of a workflow.
    ///
    /// The artifact store is sealed before the cancellation is recorded, so
    /// no stage still in flight can publish an artifact after the workflow
    /// reports `Cancelled`. Cancelling an already-cancelled workflow is a
    /// no-op; cancelling a workflow that already finished or failed is a
    /// validation error.
    pub fn cancel(&self, id: Uuid, reason: impl Into<String>) -> Result<(), OrchestratorError> {
        let reason = reason.into();
        let workflow = self.workflow(id)?;
        let (from, token) = {
            let guard = workflow.read();
            (guard.status(&self.config.criticality), Arc::clone(&guard.cancel))
        };
        if token.is_cancelled() {
            return Ok(());
        }
        if matches!(from, WorkflowStatus::Finalized | WorkflowStatus::Failed) {
            return Err(OrchestratorError::validation(format!(
                "workflow {id} is already {from}"
            )));
        }

        self.artifacts.seal(id);
        token.cancel(reason.clone());
        tracing::info!(workflow = %id, reason = %reason, "workflow cancelled");
        self.reporter.record(TransitionEvent::workflow(
            id,
            from,
            WorkflowStatus::Cancelled,
            Some(reason),
        ));
        Ok(())
    }

    /// Runs a workflow to a terminal status.
    ///
    /// Calling `run` again on a failed workflow is a resume: failed stages
    /// are reset to pending and retried, completed stages keep their
    /// artifacts, and attempt counts accumulate across runs.
    pub async fn run(
        &self,
        id: Uuid,
        input: &WorkflowInput,
    ) -> Result<WorkflowSnapshot, OrchestratorError> {
        let workflow = self.workflow(id)?;

        if workflow.read().cancel_requested() {
            return Ok(workflow.read().snapshot(&self.config.criticality));
        }
        self.reset_failed_stages(&workflow)?;

        if self.drive_stage(&workflow, StageName::Upload, input).await != Continuation::Continue {
            return Ok(workflow.read().snapshot(&self.config.criticality));
        }

        if self.run_analysis_fanout(&workflow, input).await? != Continuation::Continue {
            return Ok(workflow.read().snapshot(&self.config.criticality));
        }

        for stage in [
            StageName::Generation,
            StageName::QualityAssessment,
            StageName::Finalization,
        ] {
            if self.drive_stage(&workflow, stage, input).await != Continuation::Continue {
                break;
            }
        }

        let snapshot = workflow.read().snapshot(&self.config.criticality);
        tracing::info!(workflow = %id, status = %snapshot.status, "run finished");
        Ok(snapshot)
    }

    /// Resets failed stages to pending so a resume re-dispatches them.
    fn reset_failed_stages(
        &self,
        workflow: &Arc<RwLock<Workflow>>,
    ) -> Result<(), OrchestratorError> {
        let failed: Vec<StageName> = workflow
            .read()
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::Failed)
            .map(|s| s.name)
            .collect();
        for stage in failed {
            tracing::info!(workflow = %workflow.read().id, stage = %stage, "resetting failed stage for resume");
            self.transition(workflow, stage, None, StageRecord::reset_for_retry)?;
        }
        Ok(())
    }

    /// Runs the two analysis branches concurrently and joins them.
    ///
    /// Material analysis is awaited in full. The trend branch races the join
    /// deadline; if it is still running when the deadline passes, its future
    /// is dropped and the stage is marked skipped with a join-timeout cause.
    async fn run_analysis_fanout(
        &self,
        workflow: &Arc<RwLock<Workflow>>,
        input: &WorkflowInput,
    ) -> Result<Continuation, OrchestratorError> {
        let join_deadline = Duration::from_millis(self.config.join_timeout_ms);
        let trend = tokio::time::timeout(
            join_deadline,
            self.drive_stage(workflow, StageName::TrendAnalysis, input),
        );
        let material = self.drive_stage(workflow, StageName::MaterialAnalysis, input);
        let (trend_flow, material_flow) = tokio::join!(trend, material);

        match trend_flow {
            Ok(flow) if flow != Continuation::Continue => return Ok(flow),
            Ok(_) => {}
            Err(_) => {
                let id = workflow.read().id;
                tracing::warn!(workflow = %id, "trend branch missed the join deadline");
                // The dropped branch may not have reached Running yet; force
                // any non-terminal status to Skipped so the workflow cannot
                // report Analyzing forever.
                let status = workflow.read().stage(StageName::TrendAnalysis).status;
                if !status.is_terminal() {
                    let cause = StageError::new(
                        ErrorKind::JoinTimeout,
                        "trend analysis missed the join deadline",
                    );
                    let detail = Some(cause.message.clone());
                    self.transition(workflow, StageName::TrendAnalysis, detail, |r| {
                        r.skip(Some(cause))
                    })?;
                }
            }
        }
        Ok(material_flow)
    }

    /// Drives one stage to a terminal status and classifies the result.
    ///
    /// A stage that is already terminal (a resume over completed work) is
    /// left untouched. Failure of a critical stage, or any precondition
    /// failure, is fatal; failure of an optional stage degrades it to
    /// skipped and the pipeline continues.
    async fn drive_stage(
        &self,
        workflow: &Arc<RwLock<Workflow>>,
        stage: StageName,
        input: &WorkflowInput,
    ) -> Continuation {
        let (id, token, status) = {
            let guard = workflow.read();
            (guard.id, Arc::clone(&guard.cancel), guard.stage(stage).status)
        };
        if status.is_terminal() {
            return Continuation::Continue;
        }
        if token.is_cancelled() {
            return Continuation::Cancelled;
        }

        if let Err(err) = self.transition(workflow, stage, None, StageRecord::begin) {
            tracing::error!(workflow = %id, stage = %stage, error = %err, "could not start stage");
            return Continuation::Fatal;
        }

        let outcome = self.executor.run(id, stage, input, &token).await;
        match outcome {
            StageOutcome::Succeeded(artifact) => {
                let result = self.transition(workflow, stage, None, |r| r.succeed(artifact));
                match result {
                    Ok(()) => Continuation::Continue,
                    Err(err) => {
                        tracing::error!(workflow = %id, stage = %stage, error = %err, "could not record success");
                        Continuation::Fatal
                    }
                }
            }
            StageOutcome::Failed(error) if error.kind == ErrorKind::Cancelled => {
                let detail = Some(error.message.clone());
                let _ = self.transition(workflow, stage, detail, |r| r.skip(Some(error)));
                Continuation::Cancelled
            }
            StageOutcome::Failed(error) => {
                let fatal = self.config.criticality.is_critical(stage)
                    || error.kind == ErrorKind::Precondition;
                let detail = Some(error.message.clone());
                let result = if fatal {
                    self.transition(workflow, stage, detail, |r| r.fail(error))
                } else {
                    tracing::warn!(workflow = %id, stage = %stage, "optional stage degraded to skipped");
                    self.transition(workflow, stage, detail, |r| r.skip(Some(error)))
                };
                if let Err(err) = result {
                    tracing::error!(workflow = %id, stage = %stage, error = %err, "could not record failure");
                }
                if fatal {
                    Continuation::Fatal
                } else {
                    Continuation::Continue
                }
            }
        }
    }

    /// Applies one stage record mutation and emits the resulting events.
    ///
    /// Emits the stage transition, and a workflow transition whenever the
    /// computed overall status changed as a consequence.
    fn transition(
        &self,
        workflow: &Arc<RwLock<Workflow>>,
        stage: StageName,
        detail: Option<String>,
        apply: impl FnOnce(&mut StageRecord) -> Result<StageStatus, OrchestratorError>,
    ) -> Result<(), OrchestratorError> {
        let (id, from, to, before, after) = {
            let mut guard = workflow.write();
            let before = guard.status(&self.config.criticality);
            let from = apply(guard.stage_mut(stage))?;
            let to = guard.stage(stage).status;
            let after = guard.status(&self.config.criticality);
            (guard.id, from, to, before, after)
        };

        self.reporter
            .record(TransitionEvent::stage(id, stage, from, to, detail.clone()));
        if before != after {
            self.reporter
                .record(TransitionEvent::workflow(id, before, after, detail));
        }
        Ok(())
    }
}
