//! Storage-backend abstraction for checkpoints.
//!
//! [`CheckpointStore`] is the interface the pipeline coordinator depends on;
//! [`crate::file_store::FileCheckpointStore`] is the durable, file-backed
//! implementation used in production, and [`crate::memory::InMemoryCheckpointStore`]
//! is a reference implementation for tests.

use crate::error::Result;
use crate::model::{Checkpoint, RunId};
use async_trait::async_trait;

/// A handle on one run's checkpoint slot, held for the lifetime of a
/// `Run`/`RunFromCheckpoint` call. Dropping it releases the run's lock.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Claim exclusive ownership of `run_id`'s checkpoint slot.
    ///
    /// Returns `Err(AlreadyLocked)` if another process already holds it
    /// (§4.3(d), S6). Creates a fresh, pending checkpoint if none exists yet.
    async fn open(&self, run_id: &RunId) -> Result<Checkpoint>;

    /// Persist `checkpoint`, atomically replacing any prior snapshot for
    /// its run. Implementations must never leave a reader observing a
    /// partially-written snapshot.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Load the latest durably-persisted snapshot for `run_id`, if any.
    async fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>>;

    /// Remove a run's checkpoint and release its lock. Called on successful
    /// completion when `checkpoint.cleanup_on_success` is set.
    async fn delete(&self, run_id: &RunId) -> Result<()>;

    /// All runs with a non-terminal checkpoint still on disk.
    async fn list_incomplete(&self) -> Result<Vec<Checkpoint>>;

    /// Release a lock acquired by [`open`](Self::open) without deleting the
    /// checkpoint, so another process may resume the run later.
    async fn release(&self, run_id: &RunId) -> Result<()>;
}
