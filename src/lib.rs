//! Analysis Poller — client-side launcher and status poller for portfolio analysis jobs
//!
//! This crate starts an asynchronous analysis job on the portfolio API,
//! polls its status on a fixed interval, reconciles the server's status
//! vocabulary into a client-facing [`RunState`], and fetches the finished
//! artifact exactly once.
//!
//! # Overview
//!
//! - An [`AnalysisService`] trait over the three REST endpoints, with an
//!   [`HttpAnalysisService`] implementation
//! - [`JobLauncher`] to start jobs and refuse duplicate concurrent launches
//! - [`PollScheduler`] / [`PollHandle`] for cancellable, sequence-checked poll sessions
//! - [`reconcile`] / [`StatusReconciler`] mapping server statuses to [`RunState`]
//! - [`ResultFetcher`] for the terminal artifact
//! - [`AnalysisController`] tying them together behind a watchable [`RunSnapshot`]
//! - [`AnalysisError`] with categorized variants
//!
//! # Lifecycle
//!
//! ```text
//!   analyze() ──→ start_analysis() ──→ job_status() × N ──→ analysis_result()
//!    (IDLE)          (QUEUED)          (EXECUTING …)          (COMPLETED)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use analysis_poller::{AnalysisController, HttpAnalysisService, PollerConfig};
//!
//! let config = PollerConfig::from_env()?;
//! let service = Arc::new(HttpAnalysisService::new(&config)?);
//! let controller = AnalysisController::new(service, &config)?;
//!
//! controller.analyze(&"project-42".into()).await?;
//! let mut updates = controller.subscribe();
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow_and_update().clone();
//!     println!("{} {}%", snapshot.run_state, snapshot.progress);
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod job;
pub mod launcher;
pub mod reconcile;
pub mod result;
pub mod scheduler;
pub mod service;

pub use config::PollerConfig;
pub use controller::{AnalysisController, Notice, RunSnapshot};
pub use error::{AnalysisError, AnalysisResult};
pub use fetcher::ResultFetcher;
pub use http::HttpAnalysisService;
pub use job::{JobId, JobSnapshot, LaunchReceipt, ResourceId, RunState, ServerStatus};
pub use launcher::JobLauncher;
pub use reconcile::{Reconciled, Reconciliation, StatusReconciler, reconcile};
pub use result::AnalysisArtifact;
pub use scheduler::{PollHandle, PollScheduler, SessionState, StopReason, TickControl};
pub use service::AnalysisService;
