//! Static table of collaborator endpoints and their declared capability.
//!
//! The registry is built once from injected configuration; there are no
//! process-wide endpoint globals. Health fields on each endpoint record are
//! mutated only through the [`crate::health::HealthMonitor`].

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::EndpointConfig;
use crate::errors::OrchestratorError;
use crate::utils::Timestamp;

/// What a collaborator endpoint can do for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Accepts asset uploads and returns storage references.
    Upload,
    /// Looks up current trend context for the content domain.
    Trend,
    /// Analyzes uploaded material into keywords and a visual summary.
    Analyze,
    /// Generates an image from a prompt and analysis context.
    Generate,
    /// Scores generated content and finalizes the package.
    AssessQuality,
}

impl Capability {
    /// All capabilities the orchestrator knows about.
    pub const ALL: [Self; 5] = [
        Self::Upload,
        Self::Trend,
        Self::Analyze,
        Self::Generate,
        Self::AssessQuality,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Upload => "upload",
            Self::Trend => "trend",
            Self::Analyze => "analyze",
            Self::Generate => "generate",
            Self::AssessQuality => "assess_quality",
        };
        write!(f, "{name}")
    }
}

/// The orchestrator's current belief about an endpoint's availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Not probed yet.
    #[default]
    Unknown,
    /// Last probe succeeded.
    Healthy,
    /// At least one recent probe failed; still worth attempting.
    Degraded,
    /// Consecutive failures crossed the threshold; calls fail fast.
    Unhealthy,
}

impl HealthStatus {
    /// Returns true if calls against an endpoint in this state should be
    /// attempted at all.
    ///
    /// `Unknown` counts as usable so a cold start is not deadlocked waiting
    /// for the first poll; the first real call classifies the endpoint.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Unknown | Self::Healthy | Self::Degraded)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        };
        write!(f, "{name}")
    }
}

/// A registered collaborator endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Service name, e.g. `service_upload`.
    pub name: String,
    /// Base address, e.g. `http://localhost:8001`.
    pub base_url: String,
    /// Declared capability.
    pub capability: Capability,
    /// Rolling health state.
    pub health: HealthStatus,
    /// Consecutive failed probes since the last success.
    pub consecutive_failures: u32,
    /// When the endpoint was last probed.
    pub last_checked: Option<Timestamp>,
}

impl ServiceEndpoint {
    /// Creates an endpoint record in the `Unknown` health state.
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
            health: HealthStatus::Unknown,
            consecutive_failures: 0,
            last_checked: None,
        }
    }
}

/// Configured table of collaborator endpoints, keyed by capability.
///
/// Safe for concurrent access; health state is read and written under
/// per-endpoint synchronization.
#[derive(Debug, Default)]
pub struct ServiceEndpointRegistry {
    endpoints: DashMap<Capability, ServiceEndpoint>,
}

impl ServiceEndpointRegistry {
    /// Builds the registry from injected endpoint configuration.
    #[must_use]
    pub fn from_config(endpoints: &[EndpointConfig]) -> Self {
        let registry = Self::default();
        for cfg in endpoints {
            registry.endpoints.insert(
                cfg.capability,
                ServiceEndpoint::new(cfg.name.clone(), cfg.base_url.clone(), cfg.capability),
            );
        }
        registry
    }

    /// Returns a snapshot of the endpoint for a capability.
    #[must_use]
    pub fn get(&self, capability: Capability) -> Option<ServiceEndpoint> {
        self.endpoints.get(&capability).map(|e| e.clone())
    }

    /// Returns the endpoint for a capability, or an error if none is
    /// registered.
    pub fn require(&self, capability: Capability) -> Result<ServiceEndpoint, OrchestratorError> {
        self.get(capability)
            .ok_or(OrchestratorError::EndpointMissing(capability))
    }

    /// Returns the current health state for a capability.
    ///
    /// Unregistered capabilities report `Unhealthy` so gating fails closed.
    #[must_use]
    pub fn health(&self, capability: Capability) -> HealthStatus {
        self.endpoints
            .get(&capability)
            .map_or(HealthStatus::Unhealthy, |e| e.health)
    }

    /// All registered capabilities.
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        self.endpoints.iter().map(|e| *e.key()).collect()
    }

    /// Applies the outcome of one liveness probe and returns the new state.
    ///
    /// Transition policy: a single failure moves `Healthy` (or `Unknown`) to
    /// `Degraded`; `threshold` consecutive failures move it to `Unhealthy`;
    /// one success restores `Healthy` immediately (fast recovery).
    pub(crate) fn record_probe(
        &self,
        capability: Capability,
        success: bool,
        threshold: u32,
    ) -> HealthStatus {
        let Some(mut entry) = self.endpoints.get_mut(&capability) else {
            return HealthStatus::Unhealthy;
        };

        entry.last_checked = Some(crate::utils::now());
        if success {
            entry.consecutive_failures = 0;
            entry.health = HealthStatus::Healthy;
        } else {
            entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
            entry.health = if entry.consecutive_failures >= threshold {
                HealthStatus::Unhealthy
            } else {
                HealthStatus::Degraded
            };
        }
        entry.health
    }
}
