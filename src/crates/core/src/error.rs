//! Error taxonomy shared by every stage of the pipeline.
//!
//! The coordinator classifies failures by [`ErrorKind`] rather than by Rust
//! type: a stage function can fail for many concrete reasons (a network
//! error, a bad response body, a missing file) but the coordinator only
//! needs to know which of a handful of recovery policies applies.

use pipeline_checkpoint::Stage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse failure category driving the coordinator's retry/escalation policy.
///
/// See the error handling design: each kind has a fixed retry policy and a
/// fixed way of surfacing to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient network failure from a fetcher or remote LLM call.
    TransientNetwork,
    /// Remote LLM rate limit; honor backoff, budgeted.
    RateLimited,
    /// Bad URL, bad segment bounds, or other caller input error. Not retried.
    InvalidInput,
    /// Resource gate timeout, disk, or OOM. Downshift config then retry once.
    ResourceExhausted,
    /// Local LLM is down; fall back to remote if enabled.
    ProviderUnavailable,
    /// LLM response failed to parse or didn't match schema. One strict-mode retry.
    ParseFailure,
    /// Translation batch partially failed; carry flagged items forward.
    PartialFailure,
    /// User requested cancellation. Terminal, not a failure.
    Cancelled,
    /// Checkpoint failed to load or violated an invariant. Refuse resume.
    CorruptState,
}

impl ErrorKind {
    /// Whether the coordinator should retry an operation that failed with
    /// this kind, independent of remaining retry budget.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TransientNetwork
                | ErrorKind::RateLimited
                | ErrorKind::ResourceExhausted
                | ErrorKind::ProviderUnavailable
                | ErrorKind::ParseFailure
                | ErrorKind::PartialFailure
        )
    }

    /// Whether this kind terminates the run without being treated as a
    /// caller-facing failure (cancellation).
    pub fn is_terminal_ok(self) -> bool {
        matches!(self, ErrorKind::Cancelled)
    }
}

/// The error returned to the pipeline's caller when a run fails past its
/// stage's retry budget.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[error("{kind:?} in stage {stage}: {cause}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub cause: String,
    pub retryable: bool,
    pub user_message: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, stage: Stage, cause: impl Into<String>) -> Self {
        let cause = cause.into();
        let user_message = default_user_message(kind, &cause);
        Self {
            retryable: kind.is_retryable(),
            kind,
            stage,
            cause,
            user_message,
        }
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }
}

fn default_user_message(kind: ErrorKind, cause: &str) -> String {
    match kind {
        ErrorKind::InvalidInput => format!("The request could not be processed: {cause}"),
        ErrorKind::ResourceExhausted => {
            "The system is under heavy load; try again shortly.".to_string()
        }
        ErrorKind::Cancelled => "The run was cancelled.".to_string(),
        ErrorKind::CorruptState => {
            "A previous run's saved state is corrupt and cannot be resumed.".to_string()
        }
        _ => format!("The pipeline encountered an error: {cause}"),
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
