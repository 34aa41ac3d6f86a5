//! HTTP implementation of [`AnalysisService`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use tracing::debug;

use crate::config::PollerConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::job::{JobId, JobSnapshot, LaunchReceipt, ResourceId};
use crate::result::AnalysisArtifact;
use crate::service::AnalysisService;

/// Analysis service reached over the REST API.
#[derive(Debug, Clone)]
pub struct HttpAnalysisService {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpAnalysisService {
    /// Build a client from configuration.
    pub fn new(config: &PollerConfig) -> AnalysisResult<Self> {
        config.validate()?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AnalysisError::Configuration(format!("http client: {e}")))?;
        Self::with_client(client, config)
    }

    /// Use an existing `reqwest` client.
    pub fn with_client(client: Client, config: &PollerConfig) -> AnalysisResult<Self> {
        let base_url = Url::parse(config.base_url.trim())
            .map_err(|e| AnalysisError::Configuration(format!("base_url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AnalysisError::Configuration(format!(
                "base_url cannot carry a path: {base_url}"
            )));
        }
        Ok(Self {
            client,
            base_url,
            token: config.auth_token.clone(),
        })
    }

    /// `{base}/{endpoint}/{id}` with `id` percent-encoded as one segment.
    fn url(&self, endpoint: &str, id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(endpoint).push(id);
        }
        url
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

/// Error bodies seen from the API: `{"detail": ...}`, `{"error": ...}` or `{"message": ...}`.
#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

async fn error_message(resp: Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.detail.or(b.error).or(b.message));
    match parsed {
        Some(message) => message,
        None if body.trim().is_empty() => format!("HTTP {status}"),
        None => format!("HTTP {status}: {}", body.trim()),
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    fn name(&self) -> &str {
        self.base_url.as_str()
    }

    async fn start_analysis(&self, resource_id: &ResourceId) -> AnalysisResult<LaunchReceipt> {
        let url = self.url("analyze", &resource_id.0);
        debug!(%url, "starting analysis");
        let resp = self
            .authorize(self.client.post(url))
            .send()
            .await
            .map_err(|e| AnalysisError::LaunchFailed {
                status: None,
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            return Err(AnalysisError::LaunchFailed {
                status: Some(status),
                message: error_message(resp).await,
            });
        }

        resp.json().await.map_err(|e| AnalysisError::LaunchFailed {
            status: None,
            message: format!("malformed launch response: {e}"),
        })
    }

    async fn job_status(&self, job_id: &JobId) -> AnalysisResult<JobSnapshot> {
        let url = self.url("jobs", &job_id.0);
        let resp = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| AnalysisError::PollTransient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AnalysisError::PollTransient(error_message(resp).await));
        }

        resp.json()
            .await
            .map_err(|e| AnalysisError::PollTransient(format!("malformed status response: {e}")))
    }

    async fn analysis_result(&self, resource_id: &ResourceId) -> AnalysisResult<AnalysisArtifact> {
        let url = self.url("analysis-result", &resource_id.0);
        let resp = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| AnalysisError::FetchFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AnalysisError::FetchFailed(error_message(resp).await));
        }

        resp.json()
            .await
            .map_err(|e| AnalysisError::FetchFailed(format!("malformed result response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(server: &mockito::ServerGuard) -> HttpAnalysisService {
        HttpAnalysisService::new(&PollerConfig::new(server.url())).unwrap()
    }

    #[tokio::test]
    async fn test_start_analysis() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/analyze/proj-1")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"job_id":"abc","status":"pending"}"#)
            .create_async()
            .await;

        let config = PollerConfig::new(server.url()).with_auth_token("tok");
        let service = HttpAnalysisService::new(&config).unwrap();
        let receipt = service.start_analysis(&"proj-1".into()).await.unwrap();

        assert_eq!(receipt.job_id, JobId::new("abc"));
        assert_eq!(receipt.initial_status, "pending");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_start_analysis_forbidden() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/analyze/proj-1")
            .with_status(403)
            .with_body(r#"{"detail":"You can only analyze your own projects"}"#)
            .create_async()
            .await;

        let err = service(&server)
            .start_analysis(&"proj-1".into())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AnalysisError::LaunchFailed {
                status: Some(403),
                message: "You can only analyze your own projects".into(),
            }
        );
        assert!(err.is_precondition_failure());
    }

    #[tokio::test]
    async fn test_job_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jobs/abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"processing","progress":45}"#)
            .create_async()
            .await;

        let snap = service(&server).job_status(&"abc".into()).await.unwrap();
        assert_eq!(snap, JobSnapshot::new("processing", Some(45)));
    }

    #[tokio::test]
    async fn test_ids_are_encoded_as_one_segment() {
        let mut server = mockito::Server::new_async().await;
        let truncated = server
            .mock("GET", "/jobs/a")
            .expect(0)
            .with_status(200)
            .with_body(r#"{"status":"completed","progress":100}"#)
            .create_async()
            .await;
        let encoded = server
            .mock("GET", mockito::Matcher::Regex(r"^/jobs/a%3[Ff]b$".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"processing","progress":10}"#)
            .create_async()
            .await;
        let nested = server
            .mock("POST", mockito::Matcher::Regex(r"^/analyze/team%2[Ff]proj$".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"job_id":"x","status":"pending"}"#)
            .create_async()
            .await;

        let service = service(&server);
        let snap = service.job_status(&JobId::new("a?b")).await.unwrap();
        assert_eq!(snap, JobSnapshot::new("processing", Some(10)));
        service.start_analysis(&"team/proj".into()).await.unwrap();

        encoded.assert_async().await;
        nested.assert_async().await;
        truncated.assert_async().await;
    }

    #[tokio::test]
    async fn test_base_url_path_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/jobs/abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"pending"}"#)
            .create_async()
            .await;

        let config = PollerConfig::new(format!("{}/api/v1/", server.url()));
        let service = HttpAnalysisService::new(&config).unwrap();
        assert_eq!(service.name(), format!("{}/api/v1/", server.url()));
        service.job_status(&"abc".into()).await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpAnalysisService::new(&PollerConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));
        let err = HttpAnalysisService::new(&PollerConfig::new("mailto:ops@example.com")).unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_job_status_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jobs/abc")
            .with_status(503)
            .create_async()
            .await;

        let err = service(&server).job_status(&"abc".into()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_analysis_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/analysis-result/proj-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"has_analysis":true,"analysis":"Cohesive palette."}"#)
            .create_async()
            .await;

        let artifact = service(&server)
            .analysis_result(&"proj-1".into())
            .await
            .unwrap();
        assert_eq!(artifact, AnalysisArtifact::new("Cohesive palette."));
    }

    #[tokio::test]
    async fn test_analysis_result_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/analysis-result/proj-1")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let err = service(&server)
            .analysis_result(&"proj-1".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::FetchFailed(_)));
    }
}
