//! Liveness probing and health-aware gating for collaborator endpoints.
//!
//! A single failed probe moves an endpoint Healthy→Degraded; crossing the
//! consecutive-failure threshold moves it to Unhealthy; one success restores
//! Healthy immediately. Probes are cheap and idempotent, so there are no
//! retries inside a probe.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::config::HealthConfig;
use crate::errors::OrchestratorError;
use crate::registry::{Capability, HealthStatus, ServiceEndpoint, ServiceEndpointRegistry};

/// A single liveness check against one endpoint.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probes the endpoint once. `Ok(())` means alive.
    async fn probe(&self, endpoint: &ServiceEndpoint) -> Result<(), OrchestratorError>;
}

/// Probe hitting the collaborator's `GET /health` route.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpHealthProbe {
    /// Creates a probe with the given per-probe timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, endpoint: &ServiceEndpoint) -> Result<(), OrchestratorError> {
        let url = format!("{}/health", endpoint.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| OrchestratorError::transient(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(OrchestratorError::transient(format!(
                "{} health probe returned {}",
                endpoint.name,
                response.status()
            )))
        }
    }
}

/// Polls endpoint liveness and answers the gating query "is X usable now".
pub struct HealthMonitor {
    registry: Arc<ServiceEndpointRegistry>,
    probe: Arc<dyn HealthProbe>,
    config: HealthConfig,
}

impl HealthMonitor {
    /// Creates a monitor over the given registry.
    #[must_use]
    pub fn new(
        registry: Arc<ServiceEndpointRegistry>,
        probe: Arc<dyn HealthProbe>,
        config: HealthConfig,
    ) -> Self {
        Self {
            registry,
            probe,
            config,
        }
    }

    /// Probes one endpoint and applies the transition policy.
    pub async fn probe_once(&self, capability: Capability) -> HealthStatus {
        let Some(endpoint) = self.registry.get(capability) else {
            return HealthStatus::Unhealthy;
        };

        let success = match self.probe.probe(&endpoint).await {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(service = %endpoint.name, error = %err, "health probe failed");
                false
            }
        };

        let status =
            self.registry
                .record_probe(capability, success, self.config.unhealthy_threshold);
        if status != endpoint.health {
            tracing::info!(
                service = %endpoint.name,
                from = %endpoint.health,
                to = %status,
                "endpoint health changed"
            );
        }
        status
    }

    /// Probes every registered endpoint once and returns the aggregate
    /// capability → health report.
    pub async fn probe_all(&self) -> HashMap<Capability, HealthStatus> {
        let mut report = HashMap::new();
        for capability in self.registry.capabilities() {
            report.insert(capability, self.probe_once(capability).await);
        }
        report
    }

    /// Returns the current health report without probing.
    #[must_use]
    pub fn report(&self) -> HashMap<Capability, HealthStatus> {
        self.registry
            .capabilities()
            .into_iter()
            .map(|c| (c, self.registry.health(c)))
            .collect()
    }

    /// The gating query: true for Healthy and Degraded endpoints (and for
    /// endpoints that have never been probed).
    #[must_use]
    pub fn is_usable(&self, capability: Capability) -> bool {
        self.registry.health(capability).is_usable()
    }

    /// Polls all endpoints on the configured interval until shutdown.
    pub async fn run(&self, shutdown: Arc<CancellationToken>) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.probe_all().await;
                }
                () = shutdown.cancelled() => {
                    tracing::debug!("health monitor stopping");
                    return;
                }
            }
        }
    }
}
