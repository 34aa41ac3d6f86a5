//! Poller configuration.
//!
//! Defaults reproduce the observed client: a 3 second fixed interval with no
//! failure limit and no deadline. Both limits can be switched on.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Default interval between status checks.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

/// Default per-request timeout for the HTTP transport.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Configuration for the HTTP service and the poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Base URL of the analysis API, without a trailing slash.
    pub base_url: String,
    /// Interval between status checks.
    pub poll_interval_ms: u64,
    /// Per-request timeout. `None` disables it.
    pub request_timeout_ms: Option<u64>,
    /// Stop polling after this many consecutive failed status checks.
    pub max_consecutive_failures: Option<u32>,
    /// Stop polling after this much time without a terminal status.
    pub max_poll_duration_ms: Option<u64>,
    /// Bearer token sent with every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_MS),
            max_consecutive_failures: None,
            max_poll_duration_ms: None,
            auth_token: None,
        }
    }
}

impl PollerConfig {
    /// Create a configuration for an API base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Stop after `attempts` consecutive failed status checks.
    pub fn with_max_consecutive_failures(mut self, attempts: u32) -> Self {
        self.max_consecutive_failures = Some(attempts);
        self
    }

    /// Stop polling after `limit` without a terminal status.
    pub fn with_max_poll_duration(mut self, limit: Duration) -> Self {
        self.max_poll_duration_ms = Some(limit.as_millis() as u64);
        self
    }

    /// Set the bearer token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn max_poll_duration(&self) -> Option<Duration> {
        self.max_poll_duration_ms.map(Duration::from_millis)
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> AnalysisResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AnalysisError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from `ANALYSIS_*` environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `ANALYSIS_API_URL` | `base_url` |
    /// | `ANALYSIS_POLL_INTERVAL_MS` | `poll_interval_ms` |
    /// | `ANALYSIS_REQUEST_TIMEOUT_MS` | `request_timeout_ms` |
    /// | `ANALYSIS_MAX_POLL_FAILURES` | `max_consecutive_failures` |
    /// | `ANALYSIS_MAX_POLL_DURATION_MS` | `max_poll_duration_ms` |
    /// | `ANALYSIS_API_TOKEN` | `auth_token` |
    pub fn from_env() -> AnalysisResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AnalysisResult<Self> {
        let mut config = Self::default();
        if let Some(url) = lookup("ANALYSIS_API_URL") {
            config.base_url = url;
        }
        if let Some(ms) = parse_var(&lookup, "ANALYSIS_POLL_INTERVAL_MS")? {
            config.poll_interval_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "ANALYSIS_REQUEST_TIMEOUT_MS")? {
            config.request_timeout_ms = Some(ms);
        }
        if let Some(n) = parse_var(&lookup, "ANALYSIS_MAX_POLL_FAILURES")? {
            config.max_consecutive_failures = Some(n);
        }
        if let Some(ms) = parse_var(&lookup, "ANALYSIS_MAX_POLL_DURATION_MS")? {
            config.max_poll_duration_ms = Some(ms);
        }
        config.auth_token = lookup("ANALYSIS_API_TOKEN").filter(|t| !t.is_empty());
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the poller cannot run with.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(AnalysisError::Configuration("base_url is empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(AnalysisError::Configuration(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.max_consecutive_failures == Some(0) {
            return Err(AnalysisError::Configuration(
                "max_consecutive_failures must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> AnalysisResult<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AnalysisError::Configuration(format!("{key} is not a number: {raw}"))),
    }
}
