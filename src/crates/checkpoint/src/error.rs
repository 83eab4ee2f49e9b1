//! Error types for checkpoint storage operations.

use thiserror::Error;

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur while opening, reading, or writing checkpoints.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint exists for the requested run.
    #[error("no checkpoint for run {0}")]
    NotFound(String),

    /// A second process attempted to open a run that is already locked.
    ///
    /// Surfaced to the coordinator as `corrupt_state` / `already_locked`.
    #[error("run {0} is already owned by another process")]
    AlreadyLocked(String),

    /// The checkpoint on disk failed to parse or violated an invariant
    /// (e.g. a stage cursor that moved backwards).
    #[error("checkpoint for run {0} is corrupt: {1}")]
    Corrupt(String, String),

    /// Serialization/deserialization of the checkpoint body failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
