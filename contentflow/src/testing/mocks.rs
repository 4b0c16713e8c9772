//! Scripted collaborators for exercising the engine without a network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::{
    AnalysisContext, QualityVerdict, ServiceRequest, ServiceResponse, ServiceTransport,
    TrendContext,
};
use crate::errors::OrchestratorError;
use crate::health::HealthProbe;
use crate::registry::{Capability, ServiceEndpoint};

/// One scripted answer for a capability.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Answer with this response.
    Respond(ServiceResponse),
    /// Fail with this error.
    Fail(OrchestratorError),
    /// Never answer. The caller's timeout converts this into a transient
    /// failure.
    Hang,
}

/// A transport that answers from per-capability scripts.
///
/// Each call pops the front of the capability's script; an exhausted (or
/// absent) script falls through to a canned happy-path response derived from
/// the request, so tests only script the calls they care about.
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<Capability, VecDeque<ScriptedReply>>>,
    requests: Mutex<Vec<ServiceRequest>>,
}

impl ScriptedTransport {
    /// Creates a transport with no scripts: every call gets the canned
    /// happy-path answer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a reply for a capability.
    pub fn push(&self, capability: Capability, reply: ScriptedReply) {
        self.scripts
            .lock()
            .entry(capability)
            .or_default()
            .push_back(reply);
    }

    /// Queues the same error `n` times.
    pub fn push_failures(&self, capability: Capability, error: &OrchestratorError, n: usize) {
        for _ in 0..n {
            self.push(capability, ScriptedReply::Fail(error.clone()));
        }
    }

    /// Every request seen, in dispatch order.
    #[must_use]
    pub fn requests(&self) -> Vec<ServiceRequest> {
        self.requests.lock().clone()
    }

    /// How many requests hit a capability.
    #[must_use]
    pub fn calls_to(&self, capability: Capability) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.capability() == capability)
            .count()
    }

    fn canned(request: &ServiceRequest) -> ServiceResponse {
        match request {
            ServiceRequest::UploadAsset { files, .. } => ServiceResponse::Uploaded {
                file_refs: files
                    .iter()
                    .map(|f| format!("stored://{}", f.name))
                    .collect(),
            },
            ServiceRequest::TrendLookup { .. } => ServiceResponse::Trends(TrendContext {
                trends: vec!["golden hour reels".to_string()],
                hashtags: vec!["#goldenhour".to_string(), "#trending".to_string()],
            }),
            ServiceRequest::MaterialAnalysis { keywords, .. } => {
                ServiceResponse::Analysis(AnalysisContext {
                    keywords: if keywords.is_empty() {
                        vec!["vivid".to_string()]
                    } else {
                        keywords.clone()
                    },
                    visual_summary: "warm tones over water".to_string(),
                })
            }
            ServiceRequest::GenerateContent { .. } => ServiceResponse::Generated {
                image_ref: "generated://poster-1".to_string(),
            },
            ServiceRequest::AssessQuality { .. } => ServiceResponse::Quality(QualityVerdict {
                score: 0.87,
                caption: "Golden hour by the shore".to_string(),
                hashtags: vec!["#sunset".to_string(), "#shore".to_string()],
            }),
            ServiceRequest::Finalize { .. } => ServiceResponse::Finalized {
                package_ref: "package://final-1".to_string(),
            },
        }
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceTransport for ScriptedTransport {
    async fn exchange(
        &self,
        _endpoint: &ServiceEndpoint,
        request: &ServiceRequest,
        _timeout: Duration,
    ) -> Result<ServiceResponse, OrchestratorError> {
        self.requests.lock().push(request.clone());
        let reply = self
            .scripts
            .lock()
            .get_mut(&request.capability())
            .and_then(VecDeque::pop_front);
        match reply {
            None => Ok(Self::canned(request)),
            Some(ScriptedReply::Respond(response)) => Ok(response),
            Some(ScriptedReply::Fail(error)) => Err(error),
            Some(ScriptedReply::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!("pending future resolved")
            }
        }
    }
}

/// A probe that always reports the scripted liveness.
pub struct FixedHealthProbe {
    healthy: bool,
}

impl FixedHealthProbe {
    /// A probe for which every endpoint is alive.
    #[must_use]
    pub fn healthy() -> Self {
        Self { healthy: true }
    }

    /// A probe for which every endpoint is down.
    #[must_use]
    pub fn unhealthy() -> Self {
        Self { healthy: false }
    }
}

/// A probe whose per-capability liveness can be flipped mid-test.
///
/// Every capability starts alive; mark one down to simulate an outage and
/// bring it back to simulate recovery.
#[derive(Default)]
pub struct ToggleHealthProbe {
    down: Mutex<HashSet<Capability>>,
}

impl ToggleHealthProbe {
    /// Creates a probe with every capability alive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a capability's endpoint as down.
    pub fn set_down(&self, capability: Capability) {
        self.down.lock().insert(capability);
    }

    /// Brings a capability's endpoint back up.
    pub fn set_up(&self, capability: Capability) {
        self.down.lock().remove(&capability);
    }
}

#[async_trait]
impl HealthProbe for ToggleHealthProbe {
    async fn probe(&self, endpoint: &ServiceEndpoint) -> Result<(), OrchestratorError> {
        if self.down.lock().contains(&endpoint.capability) {
            Err(OrchestratorError::transient(format!(
                "{} is scripted down",
                endpoint.name
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HealthProbe for FixedHealthProbe {
    async fn probe(&self, endpoint: &ServiceEndpoint) -> Result<(), OrchestratorError> {
        if self.healthy {
            Ok(())
        } else {
            Err(OrchestratorError::transient(format!(
                "{} is scripted down",
                endpoint.name
            )))
        }
    }
}
