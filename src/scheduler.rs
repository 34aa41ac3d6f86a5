//! Poll sessions.
//!
//! A [`PollScheduler`] turns a status check and an apply step
//! (one state update) into a running session:
//!
//! ```text
//!   begin() ──→ Active ──┬── cancel() ───────────→ Stopped(Cancelled)
//!                        ├── apply → Stop(reason) → Stopped(reason)
//!                        └── deadline ───────────→ Stopped(DeadlineElapsed)
//! ```
//!
//! **Invariants:**
//! - The first tick fires one full interval after `begin()`.
//! - Ticks are issued on a fixed interval and numbered from 1; checks may
//!   overlap, but results are applied one at a time on the session task.
//! - A result is applied only if its sequence number is greater than the
//!   last applied one and the session is not cancelled.
//! - Once [`PollHandle::cancel`] returns, `apply` is never called again.
//! - `Stopped` is permanent; a new `begin()` creates a new session.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Notify, mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::PollerConfig;
use crate::job::JobId;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The caller cancelled the session.
    Cancelled,
    /// The job reached a terminal state.
    Terminal,
    /// Too many consecutive ticks failed.
    Exhausted,
    /// The configured maximum poll duration elapsed.
    DeadlineElapsed,
}

/// Lifecycle state of a poll session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Inactive,
    Active,
    Stopped(StopReason),
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, SessionState::Stopped(_))
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            SessionState::Stopped(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Returned by the apply step after each accepted tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop(StopReason),
}

/// Shortest interval a session ticks at. A zero interval is raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Starts poll sessions on a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct PollScheduler {
    interval: Duration,
    max_duration: Option<Duration>,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_POLL_INTERVAL_MS))
    }
}

impl PollScheduler {
    /// `interval` below [`MIN_POLL_INTERVAL`] is raised to it.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_POLL_INTERVAL),
            max_duration: None,
        }
    }

    pub fn from_config(config: &PollerConfig) -> Self {
        Self {
            max_duration: config.max_poll_duration(),
            ..Self::new(config.poll_interval())
        }
    }

    /// Stop sessions that have not finished after `limit`.
    pub fn with_max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Begin polling `job_id`.
    ///
    /// `check(job_id, seq)` runs once per tick on its own task. `apply(seq,
    /// value)` runs on the session task for every result that is neither
    /// stale nor arriving after cancellation.
    ///
    /// Must be called within a tokio runtime.
    pub fn begin<P, Fut, T, A>(&self, job_id: JobId, check: P, apply: A) -> PollHandle
    where
        P: Fn(JobId, u64) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        A: FnMut(u64, T) -> TickControl + Send + 'static,
    {
        let (state, _) = watch::channel(SessionState::Inactive);
        let shared = Arc::new(Shared {
            job_id,
            cancelled: AtomicBool::new(false),
            gate: Mutex::new(()),
            wake: Notify::new(),
            state,
            issued: AtomicU64::new(0),
            last_applied: AtomicU64::new(0),
        });
        shared.state.send_replace(SessionState::Active);
        debug!(job_id = %shared.job_id, interval_ms = self.interval.as_millis() as u64, "poll session started");

        tokio::spawn(run_session(
            Arc::clone(&shared),
            Instant::now(),
            self.interval,
            self.max_duration,
            check,
            apply,
        ));

        PollHandle { shared }
    }
}

struct Shared {
    job_id: JobId,
    cancelled: AtomicBool,
    /// Held while applying a tick and while cancelling.
    gate: Mutex<()>,
    wake: Notify,
    state: watch::Sender<SessionState>,
    issued: AtomicU64,
    last_applied: AtomicU64,
}

impl Shared {
    fn gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stop(&self, reason: StopReason) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_stopped() {
                return false;
            }
            *state = SessionState::Stopped(reason);
            true
        })
    }
}

/// Handle to a running (or finished) poll session.
#[derive(Clone)]
pub struct PollHandle {
    shared: Arc<Shared>,
}

impl PollHandle {
    pub fn job_id(&self) -> &JobId {
        &self.shared.job_id
    }

    /// Stop the session. Safe to call any number of times.
    pub fn cancel(&self) {
        let _gate = self.shared.gate();
        if self.shared.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.shared.stop(StopReason::Cancelled) {
            debug!(job_id = %self.shared.job_id, "poll session cancelled");
        }
        self.shared.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Number of ticks issued so far.
    pub fn ticks_issued(&self) -> u64 {
        self.shared.issued.load(Ordering::SeqCst)
    }

    /// Sequence number of the last applied tick, 0 if none.
    pub fn last_applied_seq(&self) -> u64 {
        self.shared.last_applied.load(Ordering::SeqCst)
    }

    /// Wait until the session stops.
    pub async fn finished(&self) -> StopReason {
        let mut rx = self.shared.state.subscribe();
        match rx.wait_for(SessionState::is_stopped).await {
            Ok(state) => state.stop_reason().unwrap_or(StopReason::Cancelled),
            Err(_) => StopReason::Cancelled,
        }
    }
}

enum Applied {
    Accepted(TickControl),
    Stale,
    Cancelled,
}

fn apply_tick<T>(
    shared: &Shared,
    apply: &mut impl FnMut(u64, T) -> TickControl,
    seq: u64,
    value: T,
) -> Applied {
    let _gate = shared.gate();
    if shared.cancelled.load(Ordering::SeqCst) {
        return Applied::Cancelled;
    }
    let last = shared.last_applied.load(Ordering::SeqCst);
    if seq <= last {
        return Applied::Stale;
    }
    shared.last_applied.store(seq, Ordering::SeqCst);
    Applied::Accepted(apply(seq, value))
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_session<P, Fut, T, A>(
    shared: Arc<Shared>,
    start: Instant,
    period: Duration,
    max_duration: Option<Duration>,
    check: P,
    mut apply: A,
) where
    P: Fn(JobId, u64) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
    A: FnMut(u64, T) -> TickControl + Send + 'static,
{
    let mut ticker = time::interval_at(start + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // A limit too large to represent never elapses.
    let deadline = max_duration.and_then(|limit| start.checked_add(limit));
    let (tx, mut rx) = mpsc::unbounded_channel::<(u64, T)>();

    let reason = loop {
        tokio::select! {
            biased;
            _ = shared.wake.notified() => break StopReason::Cancelled,
            _ = sleep_until(deadline) => break StopReason::DeadlineElapsed,
            Some((seq, value)) = rx.recv() => {
                match apply_tick(&shared, &mut apply, seq, value) {
                    Applied::Accepted(TickControl::Continue) => {}
                    Applied::Accepted(TickControl::Stop(reason)) => break reason,
                    Applied::Stale => {
                        debug!(job_id = %shared.job_id, seq, "discarding out-of-order poll result");
                    }
                    Applied::Cancelled => break StopReason::Cancelled,
                }
            }
            _ = ticker.tick() => {
                let seq = shared.issued.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(job_id = %shared.job_id, seq, "poll tick");
                let pending = check(shared.job_id.clone(), seq);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let value = pending.await;
                    // The session may be gone; late results are dropped.
                    let _ = tx.send((seq, value));
                });
            }
        }
    };

    if shared.stop(reason) {
        info!(job_id = %shared.job_id, ?reason, "poll session stopped");
    }
}
