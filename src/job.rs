//! Job lifecycle types.
//!
//! The server-side job state machine, as reported by `GET /jobs/{id}`:
//!
//! ```text
//!   POST /analyze ──→ pending ──→ processing ──→ completed
//!                        │            │
//!                        └────────────┴──→ failed
//! ```
//!
//! and its client-side projection, [`RunState`]:
//!
//! ```text
//!   Idle ──→ Queued ──→ Executing ──→ Completed
//!              │            │
//!              └────────────┴──→ Failed
//! ```
//!
//! **Invariants:**
//! - The client never writes a job; the server owns `status` and `progress`.
//! - `Completed` and `Failed` are terminal.
//! - Unrecognized server statuses never map to a `RunState` directly.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Opaque identifier for a server-side job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of the resource (portfolio project) a job analyses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job status in the server's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Project onto the client-facing state.
    pub fn run_state(&self) -> RunState {
        match self {
            Self::Pending => RunState::Queued,
            Self::Processing => RunState::Executing,
            Self::Completed => RunState::Completed,
            Self::Failed => RunState::Failed,
        }
    }
}

impl FromStr for ServerStatus {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(AnalysisError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-facing run state, used for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// No job has been started.
    #[default]
    Idle,
    /// Job accepted and waiting in the server's queue.
    Queued,
    /// Job is being processed.
    Executing,
    /// Job finished successfully.
    Completed,
    /// Job finished with an error.
    Failed,
}

impl RunState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    /// Check if a job is outstanding (queued or executing).
    pub fn is_pending(&self) -> bool {
        matches!(self, RunState::Queued | RunState::Executing)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::Queued => write!(f, "Queued"),
            RunState::Executing => write!(f, "Executing"),
            RunState::Completed => write!(f, "Completed"),
            RunState::Failed => write!(f, "Failed"),
        }
    }
}

/// Response of `POST /analyze/{resource_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchReceipt {
    pub job_id: JobId,
    /// Raw status string as first reported by the server.
    #[serde(rename = "status")]
    pub initial_status: String,
}

/// Response of `GET /jobs/{job_id}`.
///
/// `status` is kept raw so that an unrecognized value reaches the
/// reconciler instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
}

impl JobSnapshot {
    pub fn new(status: impl Into<String>, progress: Option<u32>) -> Self {
        Self {
            status: status.into(),
            progress,
        }
    }
}
