//! Transport seam between the client and the network.
//!
//! All engine logic talks to [`ServiceTransport`]; the HTTP implementation
//! is the only code in the crate that touches the wire, which keeps every
//! workflow path testable with a scripted transport.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::contracts::{AnalysisContext, QualityVerdict, ServiceRequest, ServiceResponse, TrendContext};
use crate::errors::OrchestratorError;
use crate::registry::ServiceEndpoint;

/// A single typed request/response exchange with one collaborator.
#[async_trait]
pub trait ServiceTransport: Send + Sync {
    /// Performs one exchange under the given timeout.
    ///
    /// Implementations classify failures: timeout/connect/5xx map to
    /// transient errors, 4xx and undecodable bodies to validation errors.
    async fn exchange(
        &self,
        endpoint: &ServiceEndpoint,
        request: &ServiceRequest,
        timeout: Duration,
    ) -> Result<ServiceResponse, OrchestratorError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedBody {
    file_refs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TrendBody {
    #[serde(default)]
    trends: Vec<String>,
    #[serde(default)]
    hashtags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisBody {
    #[serde(default)]
    keywords: Vec<String>,
    visual_summary: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedBody {
    image_ref: String,
}

#[derive(Debug, Deserialize)]
struct QualityBody {
    score: f64,
    caption: String,
    #[serde(default)]
    hashtags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizedBody {
    package_ref: String,
}

/// HTTP transport against the collaborator services.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn classify(err: &reqwest::Error) -> OrchestratorError {
        if err.is_timeout() || err.is_connect() {
            OrchestratorError::transient(err.to_string())
        } else if err.is_decode() {
            OrchestratorError::validation(format!("malformed response: {err}"))
        } else {
            OrchestratorError::Internal(err.to_string())
        }
    }
}

#[async_trait]
impl ServiceTransport for HttpTransport {
    async fn exchange(
        &self,
        endpoint: &ServiceEndpoint,
        request: &ServiceRequest,
        timeout: Duration,
    ) -> Result<ServiceResponse, OrchestratorError> {
        let (method, path) = request.route();
        let url = format!("{}{path}", endpoint.base_url.trim_end_matches('/'));

        let builder = match method {
            "GET" => self.client.get(&url),
            _ => self.client.post(&url).json(request),
        };

        let response = builder
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(OrchestratorError::transient(format!(
                "{} returned {status}",
                endpoint.name
            )));
        }
        if !status.is_success() {
            return Err(OrchestratorError::validation(format!(
                "{} rejected the request with {status}",
                endpoint.name
            )));
        }

        let decode_err =
            |e: reqwest::Error| OrchestratorError::validation(format!("malformed response: {e}"));

        match request {
            ServiceRequest::UploadAsset { .. } => {
                let body: UploadedBody = response.json().await.map_err(decode_err)?;
                Ok(ServiceResponse::Uploaded {
                    file_refs: body.file_refs,
                })
            }
            ServiceRequest::TrendLookup { .. } => {
                let body: TrendBody = response.json().await.map_err(decode_err)?;
                Ok(ServiceResponse::Trends(TrendContext {
                    trends: body.trends,
                    hashtags: body.hashtags,
                }))
            }
            ServiceRequest::MaterialAnalysis { .. } => {
                let body: AnalysisBody = response.json().await.map_err(decode_err)?;
                Ok(ServiceResponse::Analysis(AnalysisContext {
                    keywords: body.keywords,
                    visual_summary: body.visual_summary,
                }))
            }
            ServiceRequest::GenerateContent { .. } => {
                let body: GeneratedBody = response.json().await.map_err(decode_err)?;
                Ok(ServiceResponse::Generated {
                    image_ref: body.image_ref,
                })
            }
            ServiceRequest::AssessQuality { .. } => {
                let body: QualityBody = response.json().await.map_err(decode_err)?;
                Ok(ServiceResponse::Quality(QualityVerdict {
                    score: body.score,
                    caption: body.caption,
                    hashtags: body.hashtags,
                }))
            }
            ServiceRequest::Finalize { .. } => {
                let body: FinalizedBody = response.json().await.map_err(decode_err)?;
                Ok(ServiceResponse::Finalized {
                    package_ref: body.package_ref,
                })
            }
        }
    }
}
