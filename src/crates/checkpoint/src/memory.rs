//! In-memory checkpoint store.
//!
//! Used by tests and by callers that don't need cross-process resume. Data
//! is lost on process exit; no lock file is written to disk, but the same
//! single-owner semantics are enforced in memory.

use crate::error::{CheckpointError, Result};
use crate::model::{Checkpoint, RunId};
use crate::traits::CheckpointStore;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Storage {
    checkpoints: HashMap<RunId, Checkpoint>,
    locked: HashSet<RunId>,
}

/// Reference `CheckpointStore` implementation backed by an `Arc<RwLock<..>>`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    storage: Arc<RwLock<Storage>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs with a checkpoint currently stored (for test assertions).
    pub async fn len(&self) -> usize {
        self.storage.read().await.checkpoints.len()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn open(&self, run_id: &RunId) -> Result<Checkpoint> {
        let mut storage = self.storage.write().await;
        if storage.locked.contains(run_id) {
            return Err(CheckpointError::AlreadyLocked(run_id.to_string()));
        }
        storage.locked.insert(run_id.clone());
        Ok(storage
            .checkpoints
            .get(run_id)
            .cloned()
            .unwrap_or_else(|| Checkpoint::new(run_id.clone(), serde_json::Value::Null)))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage
            .checkpoints
            .insert(checkpoint.run_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        Ok(self.storage.read().await.checkpoints.get(run_id).cloned())
    }

    async fn delete(&self, run_id: &RunId) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage.checkpoints.remove(run_id);
        storage.locked.remove(run_id);
        Ok(())
    }

    async fn list_incomplete(&self) -> Result<Vec<Checkpoint>> {
        Ok(self
            .storage
            .read()
            .await
            .checkpoints
            .values()
            .filter(|cp| !cp.stage.is_terminal())
            .cloned()
            .collect())
    }

    async fn release(&self, run_id: &RunId) -> Result<()> {
        self.storage.write().await.locked.remove(run_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stage;

    #[tokio::test]
    async fn open_then_save_then_load_round_trips() {
        let store = InMemoryCheckpointStore::new();
        let run_id = RunId::new();
        let mut cp = store.open(&run_id).await.unwrap();
        cp.advance_to(Stage::Fetch);
        store.save(&cp).await.unwrap();

        let loaded = store.load(&run_id).await.unwrap().unwrap();
        assert_eq!(loaded.stage, Stage::Fetch);
    }

    #[tokio::test]
    async fn second_open_is_refused_until_released() {
        let store = InMemoryCheckpointStore::new();
        let run_id = RunId::new();
        let _first = store.open(&run_id).await.unwrap();

        let second = store.open(&run_id).await;
        assert!(matches!(second, Err(CheckpointError::AlreadyLocked(_))));

        store.release(&run_id).await.unwrap();
        assert!(store.open(&run_id).await.is_ok());
    }

    #[tokio::test]
    async fn delete_removes_checkpoint_and_lock() {
        let store = InMemoryCheckpointStore::new();
        let run_id = RunId::new();
        store.open(&run_id).await.unwrap();
        store.delete(&run_id).await.unwrap();

        assert!(store.load(&run_id).await.unwrap().is_none());
        assert!(store.open(&run_id).await.is_ok());
    }

    #[tokio::test]
    async fn list_incomplete_excludes_terminal_runs() {
        let store = InMemoryCheckpointStore::new();
        let run_a = RunId::new();
        let run_b = RunId::new();

        let mut a = store.open(&run_a).await.unwrap();
        a.advance_to(Stage::Translate);
        store.save(&a).await.unwrap();

        let mut b = store.open(&run_b).await.unwrap();
        b.complete();
        store.save(&b).await.unwrap();

        let incomplete = store.list_incomplete().await.unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].run_id, run_a);
    }
}
