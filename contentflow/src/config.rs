//! Injected configuration for the orchestrator.
//!
//! The whole configuration is a plain serde structure handed to the engine
//! at startup; defaults match the standard five-service deployment on local
//! ports 8001-8005.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::client::RetryPolicy;
use crate::registry::Capability;
use crate::workflow::StageName;

/// One collaborator endpoint entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Service name, e.g. `service_upload`.
    pub name: String,
    /// Base address, e.g. `http://localhost:8001`.
    pub base_url: String,
    /// Declared capability.
    pub capability: Capability,
}

impl EndpointConfig {
    /// Creates an endpoint entry.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        capability: Capability,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            capability,
        }
    }
}

/// Health monitoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Interval between probe rounds in milliseconds.
    pub poll_interval_ms: u64,
    /// Per-probe timeout in milliseconds.
    pub probe_timeout_ms: u64,
    /// Consecutive failures before an endpoint is marked unhealthy.
    pub unhealthy_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            probe_timeout_ms: 5_000,
            unhealthy_threshold: 3,
        }
    }
}

/// Which stages are allowed to fail without failing the workflow.
///
/// Criticality is a policy input rather than a hardcoded fact; the default
/// marks only trend analysis as optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalityPolicy {
    /// Stages whose failure degrades the pipeline instead of aborting it.
    pub optional_stages: HashSet<StageName>,
}

impl Default for CriticalityPolicy {
    fn default() -> Self {
        let mut optional_stages = HashSet::new();
        optional_stages.insert(StageName::TrendAnalysis);
        Self { optional_stages }
    }
}

impl CriticalityPolicy {
    /// Returns true if a failure of this stage is workflow-fatal.
    #[must_use]
    pub fn is_critical(&self, stage: StageName) -> bool {
        !self.optional_stages.contains(&stage)
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Collaborator endpoint table.
    pub endpoints: Vec<EndpointConfig>,
    /// Retry/backoff policy for collaborator calls.
    pub retry: RetryPolicy,
    /// Health monitoring parameters.
    pub health: HealthConfig,
    /// Stage criticality policy.
    pub criticality: CriticalityPolicy,
    /// Per-call timeout in milliseconds. Halved for degraded endpoints.
    pub call_timeout_ms: u64,
    /// Deadline for the optional fan-out branch at the join, in milliseconds.
    pub join_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                EndpointConfig::new("service_upload", "http://localhost:8001", Capability::Upload),
                EndpointConfig::new("service_trend", "http://localhost:8002", Capability::Trend),
                EndpointConfig::new(
                    "service_analysis",
                    "http://localhost:8003",
                    Capability::Analyze,
                ),
                EndpointConfig::new(
                    "service_generation",
                    "http://localhost:8004",
                    Capability::Generate,
                ),
                EndpointConfig::new(
                    "service_quality",
                    "http://localhost:8005",
                    Capability::AssessQuality,
                ),
            ],
            retry: RetryPolicy::default(),
            health: HealthConfig::default(),
            criticality: CriticalityPolicy::default(),
            call_timeout_ms: 30_000,
            join_timeout_ms: 120_000,
        }
    }
}

impl OrchestratorConfig {
    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the call timeout.
    #[must_use]
    pub fn with_call_timeout_ms(mut self, ms: u64) -> Self {
        self.call_timeout_ms = ms;
        self
    }

    /// Sets the join timeout for the optional fan-out branch.
    #[must_use]
    pub fn with_join_timeout_ms(mut self, ms: u64) -> Self {
        self.join_timeout_ms = ms;
        self
    }

    /// Sets the criticality policy.
    #[must_use]
    pub fn with_criticality(mut self, criticality: CriticalityPolicy) -> Self {
        self.criticality = criticality;
        self
    }
}
