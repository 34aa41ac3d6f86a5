//! Server status reconciliation.
//!
//! [`reconcile`] folds one raw status report into the last known
//! [`Reconciled`] value. It is pure and total: every input string yields a
//! value, and an unrecognized status leaves the previous value untouched.

use tracing::warn;

use crate::job::{RunState, ServerStatus};

/// Client-side view of a job after a status report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub run_state: RunState,
    /// Last known progress, 0–100.
    pub progress: u8,
    /// `true` iff `run_state` is `Completed` or `Failed`.
    pub is_terminal: bool,
}

impl Reconciled {
    pub fn new(run_state: RunState, progress: u8) -> Self {
        Self {
            run_state,
            progress,
            is_terminal: run_state.is_terminal(),
        }
    }
}

/// Outcome of reconciling one status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The status was recognized and produced a new value.
    Applied(Reconciled),
    /// The status was not recognized; the previous value stands.
    Unrecognized { raw: String, retained: Reconciled },
}

impl Reconciliation {
    /// The value to publish after this report.
    pub fn value(&self) -> Reconciled {
        match self {
            Reconciliation::Applied(value) => *value,
            Reconciliation::Unrecognized { retained, .. } => *retained,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.value().is_terminal
    }
}

/// Map a raw status report onto the client state.
///
/// Progress passes through (clamped to 100) unless absent, in which case
/// the previous progress is kept.
pub fn reconcile(
    previous: &Reconciled,
    raw_status: &str,
    raw_progress: Option<u32>,
) -> Reconciliation {
    match raw_status.parse::<ServerStatus>() {
        Ok(status) => {
            let progress = raw_progress
                .map(|p| p.min(100) as u8)
                .unwrap_or(previous.progress);
            Reconciliation::Applied(Reconciled::new(status.run_state(), progress))
        }
        Err(_) => Reconciliation::Unrecognized {
            raw: raw_status.to_string(),
            retained: *previous,
        },
    }
}

/// Stateful wrapper that remembers the last reconciled value between ticks.
#[derive(Debug, Clone, Default)]
pub struct StatusReconciler {
    last: Reconciled,
}

impl StatusReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known value, e.g. the launch response.
    pub fn starting_at(last: Reconciled) -> Self {
        Self { last }
    }

    pub fn last(&self) -> Reconciled {
        self.last
    }

    /// Reconcile a report and remember the result.
    pub fn observe(&mut self, raw_status: &str, raw_progress: Option<u32>) -> Reconciliation {
        let outcome = reconcile(&self.last, raw_status, raw_progress);
        if let Reconciliation::Unrecognized { raw, .. } = &outcome {
            warn!(status = %raw, "ignoring unrecognized job status");
        }
        self.last = outcome.value();
        outcome
    }
}
