//! Generic per-stage execution: cancellation polling, throttled progress,
//! error classification, and checkpoint bookkeeping shared by every stage.

use pipeline_checkpoint::Checkpoint;
use pipeline_core::{CancellationToken, ErrorKind, PipelineError, ProgressSink};
use std::future::Future;
use std::sync::Arc;

/// Aggregate outcome of running a stage over a set of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Every item succeeded.
    Success,
    /// At least `min_success_rate` of items succeeded.
    Partial,
    /// Fewer than `min_success_rate` of items succeeded.
    Failed,
}

/// Result of one [`StageRunner::run`] call.
#[derive(Debug, Clone)]
pub struct StageResult<T> {
    pub successful: Vec<T>,
    pub failed: Vec<(String, String)>,
    pub status: StageStatus,
}

impl<T> StageResult<T> {
    pub fn success_rate(&self) -> f64 {
        let total = self.successful.len() + self.failed.len();
        if total == 0 {
            return 1.0;
        }
        self.successful.len() as f64 / total as f64
    }
}

/// One unit of work the runner drives through `worker_fn`.
///
/// `id()` keys [`Checkpoint::completed_items`] so a resumed run can skip
/// items already committed in the current stage.
pub trait StageItem {
    fn id(&self) -> String;
}

/// Drives a stage's `worker_fn` over `items`, with cancellation polling
/// between items, throttled progress callbacks, and checkpoint writes after
/// each item commits.
pub struct StageRunner {
    min_success_rate: f64,
}

impl Default for StageRunner {
    fn default() -> Self {
        Self {
            min_success_rate: 0.90,
        }
    }
}

impl StageRunner {
    pub fn new(min_success_rate: f64) -> Self {
        Self { min_success_rate }
    }

    /// Runs `worker_fn` over every item not already in
    /// `checkpoint.completed_items`, persisting `checkpoint` via `save_checkpoint`
    /// after each item and reporting overall progress through `progress`.
    ///
    /// `stage_weight` scales this stage's contribution to the overall-progress
    /// value reported to `progress`; `base_progress` is the fraction of overall
    /// progress already completed by prior stages.
    pub async fn run<I, T, F, Fut, S>(
        &self,
        items: Vec<I>,
        worker_fn: F,
        checkpoint: &mut Checkpoint,
        mut save_checkpoint: S,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
        base_progress: f64,
        stage_weight: f64,
    ) -> Result<StageResult<T>, PipelineError>
    where
        I: StageItem,
        F: Fn(&I, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
        S: FnMut(&Checkpoint) -> futures::future::BoxFuture<'static, Result<(), PipelineError>>,
    {
        let total = items.len().max(1);
        let mut successful = Vec::new();
        let mut failed = Vec::new();

        for (idx, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                checkpoint.cancel();
                save_checkpoint(checkpoint).await?;
                return Err(PipelineError::new(
                    ErrorKind::Cancelled,
                    checkpoint.stage,
                    "run was canceled",
                ));
            }

            let item_id = item.id();
            if checkpoint.completed_items.contains(&item_id) {
                continue;
            }

            checkpoint.set_current_item(item_id.clone(), 0.0);

            match worker_fn(item, cancel.clone()).await {
                Ok(output) => {
                    successful.push(output);
                    checkpoint.mark_item_completed(item_id);
                }
                Err(err) => {
                    checkpoint.record_error(err.to_string());
                    failed.push((item_id, err.to_string()));
                }
            }

            let stage_fraction = (idx + 1) as f64 / total as f64;
            checkpoint.set_stage_progress(stage_fraction);
            save_checkpoint(checkpoint).await?;

            let overall = base_progress + stage_fraction * stage_weight;
            progress.report(pipeline_core::ProgressUpdate {
                overall_progress: overall.clamp(0.0, 1.0),
                stage_label: checkpoint.stage.to_string(),
                stage_detail: Some(format!("{}/{}", idx + 1, total)),
            });
        }

        let rate = if successful.is_empty() && failed.is_empty() {
            1.0
        } else {
            successful.len() as f64 / (successful.len() + failed.len()) as f64
        };
        let status = if failed.is_empty() {
            StageStatus::Success
        } else if rate >= self.min_success_rate {
            StageStatus::Partial
        } else {
            StageStatus::Failed
        };

        Ok(StageResult {
            successful,
            failed,
            status,
        })
    }
}
