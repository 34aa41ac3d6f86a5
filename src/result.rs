//! Analysis result types.
//!
//! The artifact is read from `GET /analysis-result/{resource_id}` once the
//! job reports `completed`. A job can succeed while its artifact is still
//! missing, so [`AnalysisArtifact::checked_text`] is fallible.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Stored analysis for a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisArtifact {
    /// Whether the server holds an analysis for the resource.
    pub has_analysis: bool,
    /// The analysis text.
    #[serde(default)]
    pub analysis: Option<String>,
}

impl AnalysisArtifact {
    /// Create an artifact carrying analysis text.
    pub fn new(analysis: impl Into<String>) -> Self {
        Self {
            has_analysis: true,
            analysis: Some(analysis.into()),
        }
    }

    /// Create an artifact for a resource without analysis.
    pub fn missing() -> Self {
        Self::default()
    }

    /// Check that the payload actually carries analysis text.
    pub fn is_present(&self) -> bool {
        self.has_analysis && self.analysis.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Borrow the analysis text, if present.
    pub fn text(&self) -> Option<&str> {
        if self.has_analysis {
            self.analysis.as_deref()
        } else {
            None
        }
    }

    /// Require the payload to carry analysis text.
    pub fn checked_text(&self) -> AnalysisResult<&str> {
        match (self.has_analysis, self.analysis.as_deref()) {
            (true, Some(text)) if !text.is_empty() => Ok(text),
            (true, _) => Err(AnalysisError::FetchFailed(
                "server reported an analysis but returned no content".into(),
            )),
            (false, _) => Err(AnalysisError::FetchFailed(
                "no analysis stored for this resource".into(),
            )),
        }
    }
}
