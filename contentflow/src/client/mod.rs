//! Typed collaborator client with health gating and retry policy.
//!
//! One [`ServiceClient::call`] performs a single logical exchange: a
//! pre-flight health gate, a bounded-timeout transport attempt, and a
//! classified retry loop for transient failures.

pub mod contracts;
pub mod retry;
pub mod transport;

pub use contracts::{
    default_style, idempotency_key, AnalysisContext, FileHandle, QualityVerdict, ServiceRequest,
    ServiceResponse, TrendContext,
};
pub use retry::{JitterStrategy, RetryPolicy};
pub use transport::{HttpTransport, ServiceTransport};

use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::errors::OrchestratorError;
use crate::health::HealthMonitor;
use crate::registry::{HealthStatus, ServiceEndpointRegistry};

/// Client for all collaborator exchanges.
pub struct ServiceClient {
    registry: Arc<ServiceEndpointRegistry>,
    health: Arc<HealthMonitor>,
    transport: Arc<dyn ServiceTransport>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl ServiceClient {
    /// Creates a client.
    #[must_use]
    pub fn new(
        registry: Arc<ServiceEndpointRegistry>,
        health: Arc<HealthMonitor>,
        transport: Arc<dyn ServiceTransport>,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            health,
            transport,
            retry,
            call_timeout,
        }
    }

    /// Performs one typed exchange with the collaborator that owns the
    /// request's capability.
    ///
    /// Fails immediately with `ServiceUnavailable` when the endpoint is
    /// gated unusable, so a known-down dependency never consumes the retry
    /// budget. Transient failures are retried up to the attempt ceiling with
    /// jittered exponential backoff; non-transient failures and non
    /// retry-safe requests fail on the first error. The cancellation token
    /// is observed before every attempt and during backoff sleeps.
    pub async fn call(
        &self,
        request: &ServiceRequest,
        cancel: &CancellationToken,
    ) -> Result<ServiceResponse, OrchestratorError> {
        let capability = request.capability();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::cancelled(
                    cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
                ));
            }
            if !self.health.is_usable(capability) {
                return Err(OrchestratorError::Unavailable { capability });
            }

            let endpoint = self.registry.require(capability)?;
            // Degraded endpoints are still attempted, under a tighter budget.
            let timeout = if endpoint.health == HealthStatus::Degraded {
                self.call_timeout / 2
            } else {
                self.call_timeout
            };

            let err = match tokio::time::timeout(
                timeout,
                self.transport.exchange(&endpoint, request, timeout),
            )
            .await
            {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => e,
                Err(_) => OrchestratorError::transient(format!(
                    "call to {} timed out after {}ms",
                    endpoint.name,
                    timeout.as_millis()
                )),
            };

            if !err.is_transient() || !request.is_retry_safe() {
                return Err(err);
            }

            attempt += 1;
            if attempt >= self.retry.max_attempts {
                tracing::warn!(
                    capability = %capability,
                    attempts = attempt,
                    error = %err,
                    "retry budget exhausted"
                );
                return Err(err);
            }

            let delay = self.retry.delay_for_attempt(attempt - 1);
            tracing::debug!(
                capability = %capability,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after transient failure"
            );
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => {
                    return Err(OrchestratorError::cancelled(
                        cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthConfig;
    use crate::registry::Capability;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe that reports whatever the test configured.
    struct FixedProbe {
        healthy: bool,
    }

    #[async_trait]
    impl crate::health::HealthProbe for FixedProbe {
        async fn probe(
            &self,
            _endpoint: &crate::registry::ServiceEndpoint,
        ) -> Result<(), OrchestratorError> {
            if self.healthy {
                Ok(())
            } else {
                Err(OrchestratorError::transient("probe refused"))
            }
        }
    }

    /// Transport returning a scripted sequence of outcomes.
    struct SequenceTransport {
        calls: AtomicUsize,
        outcomes: Mutex<Vec<Result<ServiceResponse, OrchestratorError>>>,
    }

    impl SequenceTransport {
        fn new(outcomes: Vec<Result<ServiceResponse, OrchestratorError>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcomes: Mutex::new(outcomes),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ServiceTransport for SequenceTransport {
        async fn exchange(
            &self,
            _endpoint: &crate::registry::ServiceEndpoint,
            _request: &ServiceRequest,
            _timeout: Duration,
        ) -> Result<ServiceResponse, OrchestratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock();
            if outcomes.is_empty() {
                Ok(ServiceResponse::Trends(TrendContext::default()))
            } else {
                outcomes.remove(0)
            }
        }
    }

    fn build_client(transport: Arc<SequenceTransport>) -> Arc<ServiceClient> {
        let config = crate::config::OrchestratorConfig::default();
        let registry = Arc::new(ServiceEndpointRegistry::from_config(&config.endpoints));
        let health = Arc::new(HealthMonitor::new(
            registry.clone(),
            Arc::new(FixedProbe { healthy: true }),
            HealthConfig::default(),
        ));
        Arc::new(ServiceClient::new(
            registry,
            health,
            transport,
            RetryPolicy::new()
                .with_max_attempts(3)
                .with_base_delay_ms(1)
                .with_jitter(JitterStrategy::None),
            Duration::from_millis(200),
        ))
    }

    fn trend_request() -> ServiceRequest {
        ServiceRequest::TrendLookup {
            material_refs: vec!["ref-1".to_string()],
            keywords: vec!["sunset".to_string()],
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let transport = Arc::new(SequenceTransport::new(vec![Ok(ServiceResponse::Trends(
            TrendContext::default(),
        ))]));
        let client = build_client(transport.clone());
        let cancel = CancellationToken::new();

        let response = client.call(&trend_request(), &cancel).await.unwrap();
        assert!(matches!(response, ServiceResponse::Trends(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_retried_up_to_ceiling() {
        let transport = Arc::new(SequenceTransport::new(vec![
            Err(OrchestratorError::transient("500")),
            Err(OrchestratorError::transient("500")),
            Err(OrchestratorError::transient("500")),
            Err(OrchestratorError::transient("500")),
        ]));
        let client = build_client(transport.clone());
        let cancel = CancellationToken::new();

        let err = client.call(&trend_request(), &cancel).await.unwrap_err();
        assert!(err.is_transient());
        // max_attempts=3 means exactly three dispatches, never more.
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let transport = Arc::new(SequenceTransport::new(vec![
            Err(OrchestratorError::transient("connection reset")),
            Ok(ServiceResponse::Trends(TrendContext::default())),
        ]));
        let client = build_client(transport.clone());
        let cancel = CancellationToken::new();

        assert!(client.call(&trend_request(), &cancel).await.is_ok());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_validation_error_never_retried() {
        let transport = Arc::new(SequenceTransport::new(vec![Err(
            OrchestratorError::validation("bad request"),
        )]));
        let client = build_client(transport.clone());
        let cancel = CancellationToken::new();

        let err = client.call(&trend_request(), &cancel).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Validation);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_unusable_endpoint_fails_fast_without_network() {
        let config = crate::config::OrchestratorConfig::default();
        let registry = Arc::new(ServiceEndpointRegistry::from_config(&config.endpoints));
        let health = Arc::new(HealthMonitor::new(
            registry.clone(),
            Arc::new(FixedProbe { healthy: false }),
            HealthConfig::default(),
        ));
        // Drive the endpoint to Unhealthy.
        for _ in 0..3 {
            health.probe_once(Capability::Trend).await;
        }

        let transport = Arc::new(SequenceTransport::new(vec![]));
        let client = ServiceClient::new(
            registry,
            health,
            transport.clone(),
            RetryPolicy::default(),
            Duration::from_millis(200),
        );
        let cancel = CancellationToken::new();

        let err = client.call(&trend_request(), &cancel).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::ServiceUnavailable);
        assert_eq!(transport.calls(), 0, "no network attempt may be made");
    }

    #[tokio::test]
    async fn test_non_retry_safe_upload_fails_on_first_transient() {
        let transport = Arc::new(SequenceTransport::new(vec![Err(
            OrchestratorError::transient("connection reset"),
        )]));
        let client = build_client(transport.clone());
        let cancel = CancellationToken::new();

        let request = ServiceRequest::UploadAsset {
            files: vec![],
            metadata: std::collections::HashMap::new(),
            idempotency_key: String::new(),
        };
        let err = client.call(&request, &cancel).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let transport = Arc::new(SequenceTransport::new(vec![]));
        let client = build_client(transport.clone());
        let cancel = CancellationToken::new();
        cancel.cancel("user clicked stop");

        let err = client.call(&trend_request(), &cancel).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Cancelled);
        assert_eq!(transport.calls(), 0);
    }
}
