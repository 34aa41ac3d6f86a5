//! Terminal result retrieval.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::job::ResourceId;
use crate::result::AnalysisArtifact;
use crate::service::AnalysisService;

/// Reads the artifact of a completed job.
///
/// Never retries. Every failure, including a success response without
/// content, surfaces as [`AnalysisError::FetchFailed`].
#[derive(Clone)]
pub struct ResultFetcher {
    service: Arc<dyn AnalysisService>,
}

impl ResultFetcher {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }

    /// Fetch the artifact and require it to carry analysis text.
    pub async fn fetch_result(&self, resource_id: &ResourceId) -> AnalysisResult<AnalysisArtifact> {
        let artifact = self.lookup(resource_id).await.and_then(|artifact| {
            artifact.checked_text()?;
            Ok(artifact)
        });
        let service = self.service.name();
        match &artifact {
            Ok(_) => info!(service, resource_id = %resource_id, "analysis result fetched"),
            Err(e) => {
                warn!(service, resource_id = %resource_id, error = %e, "analysis result unavailable")
            }
        }
        artifact
    }

    /// Fetch whatever is stored, present or not.
    pub async fn lookup(&self, resource_id: &ResourceId) -> AnalysisResult<AnalysisArtifact> {
        self.service
            .analysis_result(resource_id)
            .await
            .map_err(|e| match e {
                AnalysisError::FetchFailed(msg) => AnalysisError::FetchFailed(msg),
                other => AnalysisError::FetchFailed(other.to_string()),
            })
    }
}
