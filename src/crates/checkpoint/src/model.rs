//! Core checkpoint data structures.
//!
//! A [`Checkpoint`] is the unit of durability for one end-to-end pipeline
//! invocation: it records which [`Stage`] the run is in, how far that stage
//! has progressed, which items it has already finished, and enough of the
//! run's config to resume deterministically. [`CheckpointStore`] implementors
//! persist and retrieve these snapshots; see [`crate::traits::CheckpointStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Opaque identifier for one end-to-end pipeline invocation.
///
/// Keys the checkpoint store and the run's temp directory. Created at
/// pipeline start and retired once the run's checkpoint is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh, unique run id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id string, e.g. one read back from a progress log.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed pipeline stage sequence the coordinator drives through, plus the
/// three terminal states a run can land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Fetch,
    ExtractAudio,
    Transcribe,
    Analyze,
    AwaitUserSelection,
    Translate,
    GenerateSubtitles,
    EditVideo,
    Export,
    Completed,
    Failed,
    Canceled,
}

impl Stage {
    /// Stages in the order the coordinator executes them.
    pub const SEQUENCE: &'static [Stage] = &[
        Stage::Fetch,
        Stage::ExtractAudio,
        Stage::Transcribe,
        Stage::Analyze,
        Stage::AwaitUserSelection,
        Stage::Translate,
        Stage::GenerateSubtitles,
        Stage::EditVideo,
        Stage::Export,
    ];

    /// A run is terminal iff its stage is one of these three.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed | Stage::Canceled)
    }

    /// The stage that follows this one in the fixed sequence, or `None`
    /// once `Export` completes (the caller should transition to `Completed`).
    pub fn next(self) -> Option<Stage> {
        let idx = Self::SEQUENCE.iter().position(|s| *s == self)?;
        Self::SEQUENCE.get(idx + 1).copied()
    }

    /// Static progress weight used by the coordinator's progress aggregation
    /// (ADR in §4.1: fetch .05, extract .05, transcribe .25, analyze .10,
    /// translate .20, subtitles .05, edit .20, export .10).
    pub fn weight(self) -> f64 {
        match self {
            Stage::Fetch => 0.05,
            Stage::ExtractAudio => 0.05,
            Stage::Transcribe => 0.25,
            Stage::Analyze => 0.10,
            Stage::AwaitUserSelection => 0.0,
            Stage::Translate => 0.20,
            Stage::GenerateSubtitles => 0.05,
            Stage::EditVideo => 0.20,
            Stage::Export => 0.10,
            Stage::Pending | Stage::Completed | Stage::Failed | Stage::Canceled => 0.0,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Durable per-run state: stage cursor, completed item ids, and enough
/// context to resume deterministically.
///
/// Invariant (§3): `stage` is one of `{Completed, Failed}` iff the run is
/// terminal; `completed_items` only ever grows within a stage; callers must
/// never observe the stage cursor move backwards for a given run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: RunId,
    pub stage: Stage,
    /// Progress within the current stage, in `[0, 1]`.
    pub stage_progress: f64,
    /// Item ids already committed in the current stage. Serialized as a
    /// sorted array so two writers produce byte-identical output.
    pub completed_items: BTreeSet<String>,
    pub current_item: Option<String>,
    pub current_item_progress: f64,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Snapshot of the config the run started with, so a resume uses the
    /// same knobs even if the caller's live config has since changed.
    pub config_snapshot: serde_json::Value,
    /// Opaque bag for whatever in-memory artifacts a resume needs to
    /// reconstruct (fetched paths, the in-progress `Project`). The core
    /// doesn't interpret this value; the coordinator reads and writes it.
    #[serde(default)]
    pub artifacts: serde_json::Value,
}

impl Checkpoint {
    /// Start a brand-new, non-terminal checkpoint for `run_id`.
    pub fn new(run_id: RunId, config_snapshot: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            stage: Stage::Pending,
            stage_progress: 0.0,
            completed_items: BTreeSet::new(),
            current_item: None,
            current_item_progress: 0.0,
            last_error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            config_snapshot,
            artifacts: serde_json::Value::Null,
        }
    }

    /// Advance the stage cursor, resetting per-stage progress and the
    /// completed-item set. Refuses to move the cursor backwards.
    pub fn advance_to(&mut self, stage: Stage) {
        debug_assert!(
            Self::ordinal(stage) >= Self::ordinal(self.stage),
            "checkpoint stage must never move backwards"
        );
        self.stage = stage;
        self.stage_progress = 0.0;
        self.completed_items.clear();
        self.current_item = None;
        self.current_item_progress = 0.0;
        self.touch();
    }

    /// Record that `item_id` has fully committed in the current stage.
    pub fn mark_item_completed(&mut self, item_id: impl Into<String>) {
        self.completed_items.insert(item_id.into());
        self.current_item = None;
        self.current_item_progress = 0.0;
        self.touch();
    }

    pub fn set_current_item(&mut self, item_id: impl Into<String>, progress: f64) {
        self.current_item = Some(item_id.into());
        self.current_item_progress = progress.clamp(0.0, 1.0);
        self.touch();
    }

    pub fn set_stage_progress(&mut self, progress: f64) {
        self.stage_progress = progress.clamp(0.0, 1.0);
        self.touch();
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.retry_count += 1;
        self.touch();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.stage = Stage::Failed;
        self.touch();
    }

    pub fn cancel(&mut self) {
        self.stage = Stage::Canceled;
        self.touch();
    }

    pub fn complete(&mut self) {
        self.stage = Stage::Completed;
        self.stage_progress = 1.0;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// `Pending` sorts before everything in `SEQUENCE`; unlisted (terminal)
    /// stages sort after everything, since nothing advances past them.
    fn ordinal(stage: Stage) -> usize {
        if stage == Stage::Pending {
            return 0;
        }
        Stage::SEQUENCE
            .iter()
            .position(|s| *s == stage)
            .map(|i| i + 1)
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_checkpoint_is_pending_and_non_terminal() {
        let cp = Checkpoint::new(RunId::new(), serde_json::json!({}));
        assert_eq!(cp.stage, Stage::Pending);
        assert!(!cp.stage.is_terminal());
    }

    #[test]
    fn advance_resets_per_stage_state() {
        let mut cp = Checkpoint::new(RunId::new(), serde_json::json!({}));
        cp.advance_to(Stage::Fetch);
        cp.mark_item_completed("a");
        cp.set_stage_progress(0.5);
        cp.advance_to(Stage::ExtractAudio);
        assert!(cp.completed_items.is_empty());
        assert_eq!(cp.stage_progress, 0.0);
    }

    #[test]
    fn stage_weights_sum_to_one() {
        let total: f64 = Stage::SEQUENCE.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 1e-9, "weights summed to {total}");
    }

    #[test]
    fn terminal_states() {
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(Stage::Canceled.is_terminal());
        assert!(!Stage::Translate.is_terminal());
    }
}
