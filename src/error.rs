//! Analysis error types.
//!
//! Errors are categorized by who has to act on them:
//!
//! | Category | Variants | Recovery |
//! |----------|----------|----------|
//! | **Launch** | `LaunchFailed`, `AlreadyInProgress` | User re-triggers |
//! | **Transient** | `PollTransient` | Continue with the next tick |
//! | **Protocol** | `UnknownStatus` | Ignore the tick, keep the last state |
//! | **Result** | `FetchFailed` | User refreshes explicitly |
//! | **Exhaustion** | `PollingExhausted`, `Timeout` | User re-triggers |
//! | **Config** | `Configuration` | Fix configuration |

use thiserror::Error;

/// Errors that can occur while launching, polling or fetching an analysis.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnalysisError {
    // ── Launch errors ────────────────────────────────────────────────
    /// The server refused to start the job, or the start call never reached it.
    ///
    /// `status` is the HTTP status when the server answered.
    #[error("Analysis launch failed: {message}")]
    LaunchFailed { status: Option<u16>, message: String },

    /// A start call for this target is already in flight.
    #[error("Analysis already in progress for {0}")]
    AlreadyInProgress(String),

    // ── Poll errors ──────────────────────────────────────────────────
    /// A single status check failed (transient — next tick retries).
    #[error("Status check failed: {0}")]
    PollTransient(String),

    /// The server reported a status outside the known vocabulary.
    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    /// Too many consecutive status checks failed.
    #[error("Gave up polling job {job_id} after {attempts} failed status checks")]
    PollingExhausted { job_id: String, attempts: u32 },

    /// The polling deadline elapsed before the job reached a terminal state.
    #[error("Timeout waiting for job {0}")]
    Timeout(String),

    // ── Result errors ────────────────────────────────────────────────
    /// The job succeeded but its artifact could not be retrieved.
    #[error("Analysis result unavailable: {0}")]
    FetchFailed(String),

    // ── Config errors ────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AnalysisError {
    /// Returns `true` if the failure is local to one tick and polling may continue.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PollTransient(_))
    }

    /// Returns `true` if the error should be shown to the user.
    ///
    /// Transient poll failures and unknown statuses degrade silently.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::PollTransient(_) | Self::UnknownStatus(_))
    }

    /// Returns `true` if the server rejected the launch on a precondition
    /// (ownership, content threshold, conflicting state).
    pub fn is_precondition_failure(&self) -> bool {
        matches!(
            self,
            Self::LaunchFailed {
                status: Some(400 | 403 | 409 | 422),
                ..
            }
        )
    }
}

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(AnalysisError::PollTransient("connection reset".into()).is_transient());
        assert!(!AnalysisError::UnknownStatus("archived".into()).is_transient());
        assert!(!AnalysisError::FetchFailed("404".into()).is_transient());
    }

    #[test]
    fn test_user_visibility() {
        assert!(!AnalysisError::PollTransient("x".into()).is_user_visible());
        assert!(!AnalysisError::UnknownStatus("x".into()).is_user_visible());
        assert!(AnalysisError::FetchFailed("x".into()).is_user_visible());
        assert!(
            AnalysisError::LaunchFailed {
                status: None,
                message: "offline".into()
            }
            .is_user_visible()
        );
    }

    #[test]
    fn test_precondition_failure() {
        let forbidden = AnalysisError::LaunchFailed {
            status: Some(403),
            message: "not the owner".into(),
        };
        assert!(forbidden.is_precondition_failure());
        let server = AnalysisError::LaunchFailed {
            status: Some(502),
            message: "bad gateway".into(),
        };
        assert!(!server.is_precondition_failure());
    }

    #[test]
    fn test_error_display() {
        let err = AnalysisError::LaunchFailed {
            status: Some(403),
            message: "You can only analyze your own projects".into(),
        };
        assert_eq!(
            err.to_string(),
            "Analysis launch failed: You can only analyze your own projects"
        );
        let err = AnalysisError::PollingExhausted {
            job_id: "abc".into(),
            attempts: 5,
        };
        assert_eq!(
            err.to_string(),
            "Gave up polling job abc after 5 failed status checks"
        );
    }
}
