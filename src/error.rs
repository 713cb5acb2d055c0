//! Error taxonomy for the analysis pipeline.

use crate::models::Role;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Every failure mode the pipeline can surface to a caller.
///
/// Role-local analysis errors are contained at the fan-in point and never
/// escape as pipeline errors; storage and admission errors abort the
/// operation that triggered them.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad caller input: empty user id, empty content, missing file key.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Per-user rate limit exceeded. No state was created.
    #[error("rate limit exceeded; retry after {reset_at}")]
    AdmissionRejected {
        remaining: u32,
        reset_at: DateTime<Utc>,
    },

    /// The request id is not known to the store.
    #[error("request '{0}' not found")]
    NotFound(String),

    /// A request with this id already exists.
    #[error("request '{0}' already exists")]
    Conflict(String),

    /// One role's retry budget is exhausted. Attributed to that role
    /// alone; the orchestrator proceeds with the remaining roles.
    #[error("{role} analysis failed: {reason}")]
    AnalysisFailed { role: Role, reason: String },

    /// Synthesis was handed zero successful analyses.
    #[error("no successful analyses to synthesize")]
    EmptyInput,

    /// An underlying storage operation failed. Always surfaced, never
    /// treated as success.
    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

// anyhow::Error does not implement std::error::Error, so thiserror's
// #[from] cannot derive this conversion.
impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Storage(err)
    }
}
