//! Job launch with in-flight deduplication.

use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashSet;
use tracing::{info, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::job::{LaunchReceipt, ResourceId};
use crate::service::AnalysisService;

type InFlight = Arc<Mutex<FxHashSet<ResourceId>>>;

/// Issues start requests and refuses a second concurrent start for the same target.
#[derive(Clone)]
pub struct JobLauncher {
    service: Arc<dyn AnalysisService>,
    in_flight: InFlight,
}

impl JobLauncher {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self {
            service,
            in_flight: Arc::default(),
        }
    }

    /// Start an analysis job for `target`.
    ///
    /// Fails with [`AnalysisError::AlreadyInProgress`] while another start
    /// call for the same target has not resolved yet.
    pub async fn start(&self, target: &ResourceId) -> AnalysisResult<LaunchReceipt> {
        let _claim = self.claim(target)?;
        let service = self.service.name();
        match self.service.start_analysis(target).await {
            Ok(receipt) => {
                info!(
                    service,
                    resource_id = %target,
                    job_id = %receipt.job_id,
                    status = %receipt.initial_status,
                    "analysis job launched"
                );
                Ok(receipt)
            }
            Err(e) => {
                warn!(service, resource_id = %target, error = %e, "analysis launch failed");
                Err(normalize(e))
            }
        }
    }

    /// Whether a start call for `target` is currently in flight.
    pub fn is_in_flight(&self, target: &ResourceId) -> bool {
        lock(&self.in_flight).contains(target)
    }

    fn claim(&self, target: &ResourceId) -> AnalysisResult<Claim> {
        if !lock(&self.in_flight).insert(target.clone()) {
            return Err(AnalysisError::AlreadyInProgress(target.0.clone()));
        }
        Ok(Claim {
            in_flight: Arc::clone(&self.in_flight),
            target: target.clone(),
        })
    }
}

/// Services report launch failures as `LaunchFailed`; anything else is folded into it.
fn normalize(e: AnalysisError) -> AnalysisError {
    match e {
        e @ AnalysisError::LaunchFailed { .. } => e,
        other => AnalysisError::LaunchFailed {
            status: None,
            message: other.to_string(),
        },
    }
}

fn lock(set: &InFlight) -> MutexGuard<'_, FxHashSet<ResourceId>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases the in-flight marker when the start call resolves or is dropped.
struct Claim {
    in_flight: InFlight,
    target: ResourceId,
}

impl Drop for Claim {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.target);
    }
}
