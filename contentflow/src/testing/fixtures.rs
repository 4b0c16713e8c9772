//! Ready-made engine harness for workflow tests.

use std::sync::Arc;

use crate::client::{FileHandle, JitterStrategy, RetryPolicy, ServiceTransport};
use crate::config::OrchestratorConfig;
use crate::health::HealthProbe;
use crate::testing::mocks::{FixedHealthProbe, ScriptedTransport, ToggleHealthProbe};
use crate::workflow::{WorkflowEngine, WorkflowInput};

/// A configuration with millisecond-scale delays so retry and timeout paths
/// run fast under test.
#[must_use]
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig::default()
        .with_retry(
            RetryPolicy::new()
                .with_max_attempts(3)
                .with_base_delay_ms(1)
                .with_max_delay_ms(5)
                .with_jitter(JitterStrategy::None),
        )
        .with_call_timeout_ms(50)
        .with_join_timeout_ms(200)
}

/// A representative workflow input: two photos, keywords, a description.
#[must_use]
pub fn sample_input() -> WorkflowInput {
    WorkflowInput::new()
        .with_file(FileHandle::new("photo_1.jpg", "file:///tmp/photo_1.jpg", "image/jpeg"))
        .with_file(FileHandle::new("photo_2.jpg", "file:///tmp/photo_2.jpg", "image/jpeg"))
        .with_keywords(vec!["sunset".to_string(), "beach".to_string()])
        .with_description("summer evening promo")
}

/// An engine wired to a scripted transport and an always-alive probe.
pub struct TestHarness {
    /// The engine under test.
    pub engine: WorkflowEngine,
    /// Handle to the scripted transport for scripting and inspection.
    pub transport: Arc<ScriptedTransport>,
}

impl TestHarness {
    /// Creates a harness with [`fast_config`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    /// Creates a harness over a specific configuration.
    #[must_use]
    pub fn with_config(config: OrchestratorConfig) -> Self {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = WorkflowEngine::with_probe(
            config,
            Arc::clone(&transport) as Arc<dyn ServiceTransport>,
            Arc::new(FixedHealthProbe::healthy()),
        );
        Self { engine, transport }
    }

    /// Creates a harness whose probe liveness can be flipped per capability,
    /// for outage-and-recovery tests.
    #[must_use]
    pub fn with_toggle_probe() -> (Self, Arc<ToggleHealthProbe>) {
        let transport = Arc::new(ScriptedTransport::new());
        let probe = Arc::new(ToggleHealthProbe::new());
        let engine = WorkflowEngine::with_probe(
            fast_config(),
            Arc::clone(&transport) as Arc<dyn ServiceTransport>,
            Arc::clone(&probe) as Arc<dyn HealthProbe>,
        );
        (Self { engine, transport }, probe)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
