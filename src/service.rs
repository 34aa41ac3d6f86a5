//! Analysis service trait.
//!
//! The [`AnalysisService`] trait is the boundary to the external job queue:
//!
//! ```text
//!   start_analysis() ──→ job_status() ──→ … ──→ analysis_result()
//!      (async)            (async, per tick)        (async, once)
//! ```
//!
//! ## Method table
//!
//! | Method | Endpoint | Error on failure |
//! |--------|----------|------------------|
//! | `start_analysis()` | `POST /analyze/{resource_id}` | `LaunchFailed` |
//! | `job_status()` | `GET /jobs/{job_id}` | `PollTransient` |
//! | `analysis_result()` | `GET /analysis-result/{resource_id}` | `FetchFailed` |
//!
//! Each method maps its own failures to the variant above, so callers can
//! tell a failed launch, a failed tick and a failed read apart without
//! inspecting transport details.

use async_trait::async_trait;

use crate::error::AnalysisResult;
use crate::job::{JobId, JobSnapshot, LaunchReceipt, ResourceId};
use crate::result::AnalysisArtifact;

/// Remote service that runs analysis jobs.
///
/// `Send + Sync` so that one service can be shared between the launcher,
/// poll checks and the result fetcher.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Name of this service, for logs.
    fn name(&self) -> &str;

    /// Start an analysis job for a resource.
    ///
    /// The receipt's initial status is normally `pending`.
    async fn start_analysis(&self, resource_id: &ResourceId) -> AnalysisResult<LaunchReceipt>;

    /// Read the current status of a job.
    async fn job_status(&self, job_id: &JobId) -> AnalysisResult<JobSnapshot>;

    /// Read the stored analysis for a resource.
    async fn analysis_result(&self, resource_id: &ResourceId) -> AnalysisResult<AnalysisArtifact>;
}
