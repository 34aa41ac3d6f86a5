//! Analysis runs.
//!
//! An [`AnalysisController`] owns one caller context (one screen, one
//! resource at a time). It wires the launcher, scheduler, reconciler and
//! fetcher together and publishes the result as a [`RunSnapshot`] on a
//! `watch` channel. Callers read or subscribe; only the controller writes.
//!
//! ```text
//!   analyze() ──→ JobLauncher ──→ PollScheduler ──tick──→ StatusReconciler
//!                                                             │ completed
//!                                                             ▼
//!                                     RunSnapshot ◀── ResultFetcher (once)
//! ```
//!
//! Every run gets a generation number. Work belonging to an older
//! generation (a late fetch, a tick from a replaced session) never touches
//! the snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::PollerConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::fetcher::ResultFetcher;
use crate::job::{JobId, JobSnapshot, ResourceId, RunState};
use crate::launcher::JobLauncher;
use crate::reconcile::{Reconciled, Reconciliation, StatusReconciler, reconcile};
use crate::result::AnalysisArtifact;
use crate::scheduler::{PollHandle, PollScheduler, SessionState, StopReason, TickControl};
use crate::service::AnalysisService;

/// User-visible notification attached to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Notice {
    /// The job could not be started.
    LaunchFailed(String),
    /// The job succeeded but its result could not be read.
    FetchFailed(String),
    /// Polling gave up before the job finished.
    PollingAbandoned(String),
}

/// What the caller sees of the current run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSnapshot {
    pub resource_id: Option<ResourceId>,
    pub job_id: Option<JobId>,
    pub run_state: RunState,
    pub progress: u8,
    pub artifact: Option<AnalysisArtifact>,
    pub notice: Option<Notice>,
    pub updated_at: DateTime<Utc>,
}

impl Default for RunSnapshot {
    fn default() -> Self {
        Self {
            resource_id: None,
            job_id: None,
            run_state: RunState::Idle,
            progress: 0,
            artifact: None,
            notice: None,
            updated_at: Utc::now(),
        }
    }
}

impl RunSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.run_state.is_terminal()
    }
}

/// Snapshot writer bound to one run generation.
#[derive(Clone)]
struct Publisher {
    snapshot: Arc<watch::Sender<RunSnapshot>>,
    current: Arc<AtomicU64>,
    generation: u64,
}

impl Publisher {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// Apply `update` if this run is still the current one.
    ///
    /// The generation is checked under the channel lock. A successor bumps
    /// the generation before its first write, so a retired run's update
    /// either lands before that write or not at all.
    fn publish(&self, update: impl FnOnce(&mut RunSnapshot)) -> bool {
        self.snapshot.send_if_modified(|snapshot| {
            if !self.is_current() {
                return false;
            }
            update(snapshot);
            snapshot.updated_at = Utc::now();
            true
        })
    }

    fn publish_state(&self, value: Reconciled) {
        self.publish(|s| {
            s.run_state = value.run_state;
            s.progress = value.progress;
        });
    }

    fn publish_fetch(&self, result: &AnalysisResult<AnalysisArtifact>) {
        let published = self.publish(|s| match result {
            Ok(artifact) => {
                s.artifact = Some(artifact.clone());
                s.notice = None;
            }
            Err(e) => s.notice = Some(Notice::FetchFailed(e.to_string())),
        });
        if !published {
            debug!("discarding analysis result of a superseded run");
        }
    }
}

/// Per-session state driven by poll ticks.
struct ActiveRun {
    publisher: Publisher,
    fetcher: ResultFetcher,
    resource_id: ResourceId,
    job_id: JobId,
    reconciler: StatusReconciler,
    failures: u32,
    max_failures: Option<u32>,
}

impl ActiveRun {
    fn on_tick(&mut self, seq: u64, result: AnalysisResult<JobSnapshot>) -> TickControl {
        if !self.publisher.is_current() {
            return TickControl::Stop(StopReason::Cancelled);
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => return self.on_failure(seq, e),
        };
        self.failures = 0;

        match self.reconciler.observe(&snapshot.status, snapshot.progress) {
            Reconciliation::Unrecognized { .. } => TickControl::Continue,
            Reconciliation::Applied(value) => {
                debug!(job_id = %self.job_id, seq, state = %value.run_state, progress = value.progress, "job status");
                self.publisher.publish_state(value);
                if !value.is_terminal {
                    return TickControl::Continue;
                }
                info!(job_id = %self.job_id, state = %value.run_state, "analysis job finished");
                if value.run_state == RunState::Completed {
                    spawn_fetch(
                        self.publisher.clone(),
                        self.fetcher.clone(),
                        self.resource_id.clone(),
                    );
                }
                TickControl::Stop(StopReason::Terminal)
            }
        }
    }

    fn on_failure(&mut self, seq: u64, e: AnalysisError) -> TickControl {
        self.failures += 1;
        warn!(job_id = %self.job_id, seq, failures = self.failures, error = %e, "status check failed");
        match self.max_failures {
            Some(max) if self.failures >= max => {
                let err = AnalysisError::PollingExhausted {
                    job_id: self.job_id.0.clone(),
                    attempts: self.failures,
                };
                self.publisher
                    .publish(|s| s.notice = Some(Notice::PollingAbandoned(err.to_string())));
                TickControl::Stop(StopReason::Exhausted)
            }
            _ => TickControl::Continue,
        }
    }
}

fn spawn_fetch(publisher: Publisher, fetcher: ResultFetcher, resource_id: ResourceId) {
    tokio::spawn(async move {
        let result = fetcher.fetch_result(&resource_id).await;
        publisher.publish_fetch(&result);
    });
}

/// Drives analysis runs for one caller context.
pub struct AnalysisController {
    service: Arc<dyn AnalysisService>,
    launcher: JobLauncher,
    fetcher: ResultFetcher,
    scheduler: PollScheduler,
    max_failures: Option<u32>,
    snapshot: Arc<watch::Sender<RunSnapshot>>,
    generation: Arc<AtomicU64>,
    session: Mutex<Option<PollHandle>>,
}

impl AnalysisController {
    /// Fails with [`AnalysisError::Configuration`] if `config` is invalid.
    pub fn new(service: Arc<dyn AnalysisService>, config: &PollerConfig) -> AnalysisResult<Self> {
        config.validate()?;
        let (snapshot, _) = watch::channel(RunSnapshot::default());
        Ok(Self {
            launcher: JobLauncher::new(Arc::clone(&service)),
            fetcher: ResultFetcher::new(Arc::clone(&service)),
            service,
            scheduler: PollScheduler::from_config(config),
            max_failures: config.max_consecutive_failures,
            snapshot: Arc::new(snapshot),
            generation: Arc::new(AtomicU64::new(0)),
            session: Mutex::new(None),
        })
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receive every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshot.subscribe()
    }

    /// Handle of the most recent poll session, if any.
    pub fn session(&self) -> Option<PollHandle> {
        self.session_slot().clone()
    }

    pub fn session_state(&self) -> SessionState {
        self.session()
            .map(|handle| handle.state())
            .unwrap_or(SessionState::Inactive)
    }

    /// Whether a launch for `resource_id` is awaiting the server.
    pub fn is_launching(&self, resource_id: &ResourceId) -> bool {
        self.launcher.is_in_flight(resource_id)
    }

    /// Launch an analysis of `resource_id` and start polling it.
    ///
    /// On launch failure the snapshot keeps its state, gains a
    /// [`Notice::LaunchFailed`], and no session is created.
    pub async fn analyze(&self, resource_id: &ResourceId) -> AnalysisResult<JobId> {
        let receipt = match self.launcher.start(resource_id).await {
            Ok(receipt) => receipt,
            Err(e @ AnalysisError::AlreadyInProgress(_)) => return Err(e),
            Err(e) => {
                self.current_publisher()
                    .publish(|s| s.notice = Some(Notice::LaunchFailed(e.to_string())));
                return Err(e);
            }
        };

        // Held until the new handle is stored, so `cancel()` never misses it.
        let mut slot = self.session_slot();
        let publisher = self.next_generation(&mut slot);
        let job_id = receipt.job_id.clone();

        // A launch that answers with an unknown status still created a job.
        let initial = match reconcile(&Reconciled::default(), &receipt.initial_status, None) {
            Reconciliation::Applied(value) => value,
            Reconciliation::Unrecognized { .. } => Reconciled::new(RunState::Queued, 0),
        };
        publisher.publish(|s| {
            *s = RunSnapshot {
                resource_id: Some(resource_id.clone()),
                job_id: Some(job_id.clone()),
                run_state: initial.run_state,
                progress: initial.progress,
                ..RunSnapshot::default()
            };
        });

        if initial.is_terminal {
            info!(job_id = %job_id, state = %initial.run_state, "analysis job finished at launch");
            if initial.run_state == RunState::Completed {
                spawn_fetch(publisher, self.fetcher.clone(), resource_id.clone());
            }
            return Ok(job_id);
        }

        let service = Arc::clone(&self.service);
        let check = move |job_id: JobId, _seq: u64| {
            let service = Arc::clone(&service);
            async move { service.job_status(&job_id).await }
        };
        let mut run = ActiveRun {
            publisher: publisher.clone(),
            fetcher: self.fetcher.clone(),
            resource_id: resource_id.clone(),
            job_id: job_id.clone(),
            reconciler: StatusReconciler::starting_at(initial),
            failures: 0,
            max_failures: self.max_failures,
        };
        let handle = self
            .scheduler
            .begin(job_id.clone(), check, move |seq, result| run.on_tick(seq, result));

        tokio::spawn({
            let handle = handle.clone();
            let job_id = job_id.clone();
            async move {
                if handle.finished().await == StopReason::DeadlineElapsed {
                    let err = AnalysisError::Timeout(job_id.0);
                    publisher.publish(|s| s.notice = Some(Notice::PollingAbandoned(err.to_string())));
                }
            }
        });

        *slot = Some(handle);
        Ok(job_id)
    }

    /// Stop polling. The snapshot keeps its last state.
    pub fn cancel(&self) {
        if let Some(handle) = self.session() {
            handle.cancel();
        }
    }

    /// Fetch the result again on explicit request.
    pub async fn refresh_result(&self, resource_id: &ResourceId) -> AnalysisResult<AnalysisArtifact> {
        let publisher = self.current_publisher();
        let result = self.fetcher.fetch_result(resource_id).await;
        publisher.publish_fetch(&result);
        result
    }

    /// Show the stored analysis of `resource_id`, if there is one.
    ///
    /// Replaces the current run: any active session is cancelled.
    pub async fn load_existing(
        &self,
        resource_id: &ResourceId,
    ) -> AnalysisResult<Option<AnalysisArtifact>> {
        let publisher = self.next_generation(&mut self.session_slot());
        let stored = self.fetcher.lookup(resource_id).await;
        let artifact = match stored {
            Ok(artifact) => artifact.is_present().then_some(artifact),
            Err(e) => {
                warn!(resource_id = %resource_id, error = %e, "could not load stored analysis");
                publisher.publish(|s| {
                    *s = RunSnapshot {
                        resource_id: Some(resource_id.clone()),
                        notice: Some(Notice::FetchFailed(e.to_string())),
                        ..RunSnapshot::default()
                    };
                });
                return Err(e);
            }
        };
        publisher.publish(|s| {
            *s = RunSnapshot {
                resource_id: Some(resource_id.clone()),
                run_state: if artifact.is_some() {
                    RunState::Completed
                } else {
                    RunState::Idle
                },
                progress: if artifact.is_some() { 100 } else { 0 },
                artifact: artifact.clone(),
                ..RunSnapshot::default()
            };
        });
        Ok(artifact)
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<PollHandle>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_publisher(&self) -> Publisher {
        Publisher {
            snapshot: Arc::clone(&self.snapshot),
            current: Arc::clone(&self.generation),
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    /// Retire the current run and return a publisher for the next one.
    fn next_generation(&self, slot: &mut Option<PollHandle>) -> Publisher {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        Publisher {
            snapshot: Arc::clone(&self.snapshot),
            current: Arc::clone(&self.generation),
            generation,
        }
    }
}

impl Drop for AnalysisController {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel();
    }
}
