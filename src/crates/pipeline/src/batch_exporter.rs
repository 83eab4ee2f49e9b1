//! Schedules a queue of export requests across `parallel_exports` concurrent
//! slots, using a [`ResourceGate`] for admission and retrying failures.

use pipeline_core::{JobKind, PipelineError, ProgressSink, ResourceGate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub id: String,
    pub video_path: std::path::PathBuf,
    pub output_dir: std::path::PathBuf,
}

#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub id: String,
    pub result: Result<std::path::PathBuf, String>,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct BatchExporterConfig {
    pub parallel_exports: usize,
    pub continue_on_error: bool,
    pub retry_failed: bool,
    pub max_retries: u32,
    pub acquire_timeout: Duration,
}

impl Default for BatchExporterConfig {
    fn default() -> Self {
        Self {
            parallel_exports: 2,
            continue_on_error: true,
            retry_failed: true,
            max_retries: 2,
            acquire_timeout: Duration::from_secs(300),
        }
    }
}

/// One export job's work function: produces the output path or a failure
/// reason. Implemented by the caller, which owns the concrete `VideoEditor`
/// invocation for this request.
#[async_trait::async_trait]
pub trait ExportJob: Send + Sync {
    async fn export(&self, request: &ExportRequest) -> Result<std::path::PathBuf, String>;
}

pub struct BatchExporter {
    gate: Arc<ResourceGate>,
    config: BatchExporterConfig,
}

impl BatchExporter {
    pub fn new(gate: Arc<ResourceGate>, config: BatchExporterConfig) -> Self {
        Self { gate, config }
    }

    /// Runs `job` over every request, honoring `parallel_exports` concurrency
    /// and the resource gate, retrying failures per `retry_failed`/`max_retries`.
    /// Reports `(completed, total)` progress via `progress` after each
    /// request's final outcome.
    pub async fn run(
        &self,
        requests: Vec<ExportRequest>,
        job: Arc<dyn ExportJob>,
        progress: Arc<dyn ProgressSink>,
    ) -> Vec<ExportOutcome> {
        let total = requests.len().max(1);
        let completed = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.config.parallel_exports));

        let mut tasks = JoinSet::new();
        for request in requests {
            let gate = self.gate.clone();
            let job = job.clone();
            let semaphore = semaphore.clone();
            let completed = completed.clone();
            let progress = progress.clone();
            let config = self.config.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let outcome = run_with_retries(&gate, &config, &request, job.as_ref()).await;

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress.report(pipeline_core::ProgressUpdate {
                    overall_progress: done as f64 / total as f64,
                    stage_label: "export".to_string(),
                    stage_detail: Some(format!("{done}/{total}: {}", request.id)),
                });

                outcome
            });
        }

        let mut outcomes = Vec::new();
        while let Some(result) = tasks.join_next().await {
            if let Ok(outcome) = result {
                let failed = outcome.result.is_err();
                outcomes.push(outcome);
                if failed && !self.config.continue_on_error {
                    tasks.abort_all();
                    break;
                }
            }
        }
        outcomes
    }
}

async fn run_with_retries(
    gate: &ResourceGate,
    config: &BatchExporterConfig,
    request: &ExportRequest,
    job: &dyn ExportJob,
) -> ExportOutcome {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let ticket = gate
            .acquire_with_timeout(JobKind::Export, config.acquire_timeout)
            .await;
        let ticket = match ticket {
            Ok(t) => t,
            Err(e) => {
                return ExportOutcome {
                    id: request.id.clone(),
                    result: Err(e.to_string()),
                    attempts,
                }
            }
        };

        let result = job.export(request).await;
        drop(ticket);

        match result {
            Ok(path) => {
                return ExportOutcome {
                    id: request.id.clone(),
                    result: Ok(path),
                    attempts,
                }
            }
            Err(reason) => {
                if config.retry_failed && attempts <= config.max_retries {
                    continue;
                }
                return ExportOutcome {
                    id: request.id.clone(),
                    result: Err(reason),
                    attempts,
                };
            }
        }
    }
}

/// Converts a batch of [`ExportOutcome`]s into a [`PipelineError`] if every
/// request in the batch failed; callers that tolerate partial batch failure
/// should inspect outcomes directly instead.
pub fn outcomes_to_result(outcomes: &[ExportOutcome], stage: pipeline_checkpoint::Stage) -> Result<(), PipelineError> {
    if outcomes.is_empty() || outcomes.iter().any(|o| o.result.is_ok()) {
        return Ok(());
    }
    let reasons: Vec<String> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().err().cloned())
        .collect();
    Err(PipelineError::new(
        pipeline_core::ErrorKind::PartialFailure,
        stage,
        reasons.join("; "),
    ))
}
