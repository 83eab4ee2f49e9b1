//! Durable, file-backed [`CheckpointStore`].
//!
//! Layout under `state_root`:
//!
//! ```text
//! <state_root>/<run_id>/checkpoint.json
//! <state_root>/<run_id>/lock
//! <state_root>/<run_id>/tmp/
//! ```
//!
//! Writes go to a scratch file under `tmp/`, are flushed and fsynced, then
//! renamed into place, so a reader never observes a partially-written
//! snapshot and a crash mid-write leaves the previous snapshot intact.
//! Ownership is enforced by creating `lock` with `O_EXCL`: a second process
//! opening the same run sees the file already exists and is refused.

use crate::error::{CheckpointError, Result};
use crate::model::{Checkpoint, RunId};
use crate::traits::CheckpointStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const CHECKPOINT_FILE: &str = "checkpoint.json";
const LOCK_FILE: &str = "lock";
const TMP_DIR: &str = "tmp";

/// File-backed checkpoint store rooted at a directory shared by every run.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    state_root: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }

    fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.state_root.join(run_id.as_str())
    }

    fn checkpoint_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(CHECKPOINT_FILE)
    }

    fn lock_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(LOCK_FILE)
    }

    fn tmp_dir(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(TMP_DIR)
    }

    async fn acquire_lock(&self, run_id: &RunId) -> Result<()> {
        let run_dir = self.run_dir(run_id);
        fs::create_dir_all(&run_dir).await?;
        fs::create_dir_all(self.tmp_dir(run_id)).await?;

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.lock_path(run_id))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(CheckpointError::AlreadyLocked(run_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_checkpoint(&self, path: &Path) -> Result<Option<Checkpoint>> {
        match fs::read(path).await {
            Ok(bytes) => {
                let checkpoint = serde_json::from_slice(&bytes).map_err(|e| {
                    CheckpointError::Corrupt(path.display().to_string(), e.to_string())
                })?;
                Ok(Some(checkpoint))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn open(&self, run_id: &RunId) -> Result<Checkpoint> {
        self.acquire_lock(run_id).await?;
        match self.read_checkpoint(&self.checkpoint_path(run_id)).await? {
            Some(checkpoint) => Ok(checkpoint),
            None => Ok(Checkpoint::new(run_id.clone(), serde_json::Value::Null)),
        }
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let run_id = &checkpoint.run_id;
        let run_dir = self.run_dir(run_id);
        fs::create_dir_all(&run_dir).await?;
        let tmp_dir = self.tmp_dir(run_id);
        fs::create_dir_all(&tmp_dir).await?;

        let body = serde_json::to_vec_pretty(checkpoint)?;
        let tmp_path = tmp_dir.join(format!("checkpoint-{}.json.tmp", uuid::Uuid::new_v4()));

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, self.checkpoint_path(run_id)).await?;
        debug!(run_id = %run_id, stage = %checkpoint.stage, "checkpoint saved");
        Ok(())
    }

    async fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        self.read_checkpoint(&self.checkpoint_path(run_id)).await
    }

    async fn delete(&self, run_id: &RunId) -> Result<()> {
        let run_dir = self.run_dir(run_id);
        match fs::remove_dir_all(&run_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_incomplete(&self) -> Result<Vec<Checkpoint>> {
        let mut incomplete = Vec::new();
        let mut entries = match fs::read_dir(&self.state_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(incomplete),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path().join(CHECKPOINT_FILE);
            match self.read_checkpoint(&path).await {
                Ok(Some(checkpoint)) if !checkpoint.stage.is_terminal() => {
                    incomplete.push(checkpoint);
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint"),
            }
        }
        Ok(incomplete)
    }

    async fn release(&self, run_id: &RunId) -> Result<()> {
        match fs::remove_file(self.lock_path(run_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stage;

    #[tokio::test]
    async fn save_then_load_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let run_id = RunId::new();

        let mut cp = store.open(&run_id).await.unwrap();
        cp.advance_to(Stage::Transcribe);
        cp.set_stage_progress(0.4);
        store.save(&cp).await.unwrap();

        let loaded = store.load(&run_id).await.unwrap().unwrap();
        assert_eq!(loaded.stage, Stage::Transcribe);
        assert_eq!(loaded.stage_progress, 0.4);
    }

    #[tokio::test]
    async fn second_open_is_refused_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let run_id = RunId::new();

        store.open(&run_id).await.unwrap();
        let second = store.open(&run_id).await;
        assert!(matches!(second, Err(CheckpointError::AlreadyLocked(_))));

        store.release(&run_id).await.unwrap();
        assert!(store.open(&run_id).await.is_ok());
    }

    #[tokio::test]
    async fn load_missing_run_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(store.load(&RunId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_run_directory_and_frees_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let run_id = RunId::new();

        store.open(&run_id).await.unwrap();
        store.delete(&run_id).await.unwrap();

        assert!(store.load(&run_id).await.unwrap().is_none());
        assert!(store.open(&run_id).await.is_ok());
    }

    #[tokio::test]
    async fn list_incomplete_skips_completed_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        let run_a = RunId::new();
        let mut a = store.open(&run_a).await.unwrap();
        a.advance_to(Stage::Export);
        store.save(&a).await.unwrap();

        let run_b = RunId::new();
        let mut b = store.open(&run_b).await.unwrap();
        b.complete();
        store.save(&b).await.unwrap();

        let incomplete = store.list_incomplete().await.unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].run_id, run_a);
    }
}
