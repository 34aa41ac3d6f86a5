//! Minimal in-memory analysis service driven by the poller.
//!
//! Each status check advances a job by one step, so a run goes
//! `pending → processing → completed` in a few ticks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis_poller::{
    AnalysisArtifact, AnalysisController, AnalysisError, AnalysisResult, AnalysisService, JobId,
    JobSnapshot, LaunchReceipt, PollerConfig, ResourceId,
};
use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

const STEPS: &[(&str, u32)] = &[
    ("pending", 0),
    ("processing", 30),
    ("processing", 70),
    ("completed", 100),
];

/// In-memory mock service.
struct MockService {
    /// job id → (resource, step)
    jobs: Mutex<HashMap<String, (ResourceId, usize)>>,
    analyses: Mutex<HashMap<ResourceId, String>>,
    next_id: Mutex<u64>,
}

impl MockService {
    fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            analyses: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }
}

#[async_trait]
impl AnalysisService for MockService {
    fn name(&self) -> &str {
        "mock-analysis"
    }

    async fn start_analysis(&self, resource_id: &ResourceId) -> AnalysisResult<LaunchReceipt> {
        if resource_id.0.starts_with("foreign-") {
            return Err(AnalysisError::LaunchFailed {
                status: Some(403),
                message: "You can only analyze your own projects".into(),
            });
        }

        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("mock-{}", *next)
        };
        self.jobs
            .lock()
            .unwrap()
            .insert(id.clone(), (resource_id.clone(), 0));

        Ok(LaunchReceipt {
            job_id: JobId::new(id),
            initial_status: "pending".into(),
        })
    }

    async fn job_status(&self, job_id: &JobId) -> AnalysisResult<JobSnapshot> {
        let mut jobs = self.jobs.lock().unwrap();
        let (resource, step) = jobs
            .get_mut(&job_id.0)
            .ok_or_else(|| AnalysisError::PollTransient(format!("unknown job {job_id}")))?;

        *step = (*step + 1).min(STEPS.len() - 1);
        let (status, progress) = STEPS[*step];
        if status == "completed" {
            self.analyses.lock().unwrap().insert(
                resource.clone(),
                format!("{resource}: strong composition, consistent colour grading."),
            );
        }
        Ok(JobSnapshot::new(status, Some(progress)))
    }

    async fn analysis_result(&self, resource_id: &ResourceId) -> AnalysisResult<AnalysisArtifact> {
        Ok(match self.analyses.lock().unwrap().get(resource_id) {
            Some(text) => AnalysisArtifact::new(text.clone()),
            None => AnalysisArtifact::missing(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("analysis_poller=info".parse()?))
        .init();

    let config = PollerConfig::default().with_poll_interval(Duration::from_millis(200));
    let service = Arc::new(MockService::new());
    let controller = AnalysisController::new(service, &config)?;

    // Launch rejected by the ownership check
    if let Err(e) = controller.analyze(&"foreign-7".into()).await {
        println!("Launch refused: {e}");
    }

    let existing = controller.load_existing(&"project-42".into()).await?;
    println!("Stored analysis: {}", existing.is_some());

    let mut updates = controller.subscribe();
    let job_id = controller.analyze(&"project-42".into()).await?;
    println!("Job ID: {job_id}");

    loop {
        let snapshot = updates.borrow_and_update().clone();
        println!("  {:<10} {:>3}%", snapshot.run_state, snapshot.progress);
        if snapshot.is_terminal() && (snapshot.artifact.is_some() || snapshot.notice.is_some()) {
            println!();
            match (snapshot.artifact, snapshot.notice) {
                (Some(artifact), _) => println!("Analysis: {}", artifact.text().unwrap_or("")),
                (None, Some(notice)) => println!("Notice: {notice:?}"),
                (None, None) => {}
            }
            break;
        }
        updates.changed().await?;
    }

    println!("Session: {:?}", controller.session_state());
    Ok(())
}
