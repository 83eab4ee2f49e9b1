//! Wires every stage and collaborator into the fixed fetch-to-export
//! sequence, owning artifact flow, retry policy, and overall progress.

use crate::adapters::{
    AudioExtractor, Fetcher, Quality, SubtitleFormat, SubtitleStyle, SubtitleWriter, Transcriber,
    VideoEditor, VideoOutputConfig,
};
use crate::config::PipelineConfig;
use crate::llm_router::{LlmRouter, TaskKind};
use crate::model::{Chapter, EditSegment, ExportPlan, ExportPlanItem, Highlight, Project, Segment};
use crate::subtitle_timing::{optimize_timing, SubtitleTimingConfig};
use crate::translation_batcher::TranslationBatcher;
use async_trait::async_trait;
use pipeline_checkpoint::{Checkpoint, CheckpointStore, RunId, Stage};
use pipeline_core::{
    retry_with_backoff, CancellationSource, CancellationToken, ErrorKind, PipelineError,
    ProgressSink, ProgressUpdate, ResourceGate, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything beyond `Checkpoint`'s own fields that a resume needs to pick
/// up where a prior attempt left off: the fetched video/audio paths and the
/// in-progress `Project`. Stashed in `Checkpoint::artifacts` at every stage
/// boundary, since the checkpoint store only knows how to persist a
/// `Checkpoint`, not a `Project`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ResumeState {
    video_path: Option<std::path::PathBuf>,
    audio_path: Option<std::path::PathBuf>,
    project: Project,
}

fn load_resume_state(checkpoint: &Checkpoint) -> ResumeState {
    serde_json::from_value(checkpoint.artifacts.clone()).unwrap_or_default()
}

fn store_resume_state(
    checkpoint: &mut Checkpoint,
    video_path: &Option<std::path::PathBuf>,
    audio_path: &Option<std::path::PathBuf>,
    project: &Project,
) {
    let state = ResumeState {
        video_path: video_path.clone(),
        audio_path: audio_path.clone(),
        project: project.clone(),
    };
    checkpoint.artifacts = serde_json::to_value(state).unwrap_or(serde_json::Value::Null);
}

/// The caller-supplied decision point at `AWAIT_USER_SELECTION`: given the
/// analysis stage's candidate highlights and chapters, produce the edit plan
/// to carry forward. The coordinator awaits this with no timeout by default;
/// callers that need a deadline wrap their implementation with one.
#[async_trait]
pub trait SelectionProvider: Send + Sync {
    async fn select(
        &self,
        highlights: &[Highlight],
        chapters: &[Chapter],
    ) -> Result<Vec<EditSegment>, PipelineError>;
}

pub struct Adapters {
    pub fetcher: Arc<dyn Fetcher>,
    pub audio_extractor: Arc<dyn AudioExtractor>,
    pub transcriber: Arc<dyn Transcriber>,
    pub subtitle_writer: Arc<dyn SubtitleWriter>,
    pub video_editor: Arc<dyn VideoEditor>,
}

/// Drives one end-to-end run through the fixed stage sequence, persisting a
/// checkpoint at every stage boundary so a failed or canceled run can resume.
pub struct PipelineCoordinator {
    store: Arc<dyn CheckpointStore>,
    adapters: Adapters,
    llm_router: Arc<LlmRouter>,
    resource_gate: Arc<ResourceGate>,
    config: PipelineConfig,
    cancel_source: CancellationSource,
    cancel_token: CancellationToken,
}

impl PipelineCoordinator {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        adapters: Adapters,
        llm_router: Arc<LlmRouter>,
        resource_gate: Arc<ResourceGate>,
        config: PipelineConfig,
    ) -> Self {
        let (cancel_source, cancel_token) = CancellationSource::new();
        Self {
            store,
            adapters,
            llm_router,
            resource_gate,
            config,
            cancel_source,
            cancel_token,
        }
    }

    /// Idempotent. Causes the current stage to finish its current item (or
    /// abort at the next safe point) and the run to return a `Cancelled`
    /// error once the in-flight checkpoint write completes.
    pub fn cancel(&self) {
        self.cancel_source.cancel();
    }

    /// Atomic end-to-end execution starting from a fresh checkpoint.
    pub async fn run(
        &self,
        url: &str,
        selection: Arc<dyn SelectionProvider>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Project, PipelineError> {
        let run_id = RunId::new();
        let checkpoint = self
            .store
            .open(&run_id)
            .await
            .map_err(|e| PipelineError::new(ErrorKind::CorruptState, Stage::Pending, e.to_string()))?;
        self.drive(checkpoint, Some(url.to_string()), selection, progress)
            .await
    }

    /// Resumes an in-progress run from its last durable checkpoint.
    pub async fn run_from_checkpoint(
        &self,
        run_id: &RunId,
        selection: Arc<dyn SelectionProvider>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Project, PipelineError> {
        let checkpoint = self
            .store
            .open(run_id)
            .await
            .map_err(|e| PipelineError::new(ErrorKind::CorruptState, Stage::Pending, e.to_string()))?;
        if checkpoint.stage.is_terminal() {
            return Err(PipelineError::new(
                ErrorKind::InvalidInput,
                checkpoint.stage,
                "run already reached a terminal state",
            ));
        }
        self.drive(checkpoint, None, selection, progress).await
    }

    async fn drive(
        &self,
        mut checkpoint: Checkpoint,
        url: Option<String>,
        selection: Arc<dyn SelectionProvider>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Project, PipelineError> {
        let resume = load_resume_state(&checkpoint);
        let mut project = resume.project;
        let mut video_path = resume.video_path;
        let mut audio_path = resume.audio_path;

        if checkpoint.stage == Stage::Pending {
            checkpoint.advance_to(Stage::Fetch);
            self.save(&checkpoint).await?;
        }

        for &stage in Stage::SEQUENCE {
            if ordinal(stage) < ordinal(checkpoint.stage) {
                continue;
            }
            if self.cancel_token.is_cancelled() {
                checkpoint.cancel();
                self.save(&checkpoint).await?;
                return Err(PipelineError::new(ErrorKind::Cancelled, stage, "run was canceled"));
            }

            let base_progress = progress_before(stage);
            self.report_stage_start(&progress, stage, base_progress);

            let policy = RetryPolicy::new(self.config.stage.retry_budget);
            let mut attempt = 0;
            let outcome = loop {
                let result = self
                    .execute_stage(
                        stage,
                        &mut checkpoint,
                        url.as_deref(),
                        &mut video_path,
                        &mut audio_path,
                        &mut project,
                        selection.clone(),
                    )
                    .await;
                match result {
                    Ok(()) => break Ok(()),
                    Err(err) if err.retryable && policy.should_retry(attempt + 1) => {
                        checkpoint.record_error(err.cause.clone());
                        store_resume_state(&mut checkpoint, &video_path, &audio_path, &project);
                        self.save(&checkpoint).await.ok();
                        warn!(?stage, attempt, "stage failed, retrying");
                        tokio::time::sleep(policy.delay_for(attempt)).await;
                        attempt += 1;
                    }
                    Err(err) => break Err(err),
                }
            };

            if let Err(err) = outcome {
                checkpoint.fail(err.cause.clone());
                store_resume_state(&mut checkpoint, &video_path, &audio_path, &project);
                self.save(&checkpoint).await?;
                return Err(err);
            }

            let next = stage.next().unwrap_or(Stage::Completed);
            checkpoint.advance_to(next);
            store_resume_state(&mut checkpoint, &video_path, &audio_path, &project);
            self.save(&checkpoint).await?;

            progress.report(ProgressUpdate {
                overall_progress: progress_before(next),
                stage_label: next.to_string(),
                stage_detail: None,
            });
        }

        checkpoint.complete();
        self.save(&checkpoint).await?;

        if self.config.checkpoint.cleanup_on_success {
            let _ = self.store.delete(&checkpoint.run_id).await;
        } else {
            let _ = self.store.release(&checkpoint.run_id).await;
        }

        Ok(project)
    }

    fn report_stage_start(&self, progress: &Arc<dyn ProgressSink>, stage: Stage, base_progress: f64) {
        progress.report(ProgressUpdate {
            overall_progress: base_progress,
            stage_label: stage.to_string(),
            stage_detail: None,
        });
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), PipelineError> {
        self.store
            .save(checkpoint)
            .await
            .map_err(|e| PipelineError::new(ErrorKind::CorruptState, checkpoint.stage, e.to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_stage(
        &self,
        stage: Stage,
        checkpoint: &mut Checkpoint,
        url: Option<&str>,
        video_path: &mut Option<std::path::PathBuf>,
        audio_path: &mut Option<std::path::PathBuf>,
        project: &mut Project,
        selection: Arc<dyn SelectionProvider>,
    ) -> Result<(), PipelineError> {
        match stage {
            Stage::Fetch => {
                let url = url.ok_or_else(|| {
                    PipelineError::new(ErrorKind::InvalidInput, stage, "no URL for a fresh run")
                })?;
                let temp_dir = std::env::temp_dir().join(checkpoint.run_id.as_str());
                let artifact = self
                    .adapters
                    .fetcher
                    .fetch(url, &temp_dir, Quality::Balanced, self.cancel_token.clone())
                    .await
                    .map_err(|e| PipelineError::new(ErrorKind::TransientNetwork, stage, e.to_string()))?;
                *video_path = Some(artifact.path);
                Ok(())
            }
            Stage::ExtractAudio => {
                let video = video_path
                    .as_ref()
                    .ok_or_else(|| PipelineError::new(ErrorKind::CorruptState, stage, "missing video path"))?;
                let temp_dir = std::env::temp_dir().join(checkpoint.run_id.as_str());
                let path = self
                    .adapters
                    .audio_extractor
                    .extract(video, &temp_dir, self.cancel_token.clone())
                    .await
                    .map_err(|e| PipelineError::new(ErrorKind::ResourceExhausted, stage, e.to_string()))?;
                *audio_path = Some(path);
                Ok(())
            }
            Stage::Transcribe => {
                let audio = audio_path
                    .as_ref()
                    .ok_or_else(|| PipelineError::new(ErrorKind::CorruptState, stage, "missing audio path"))?;
                let result = self
                    .adapters
                    .transcriber
                    .transcribe(audio, None, true, self.cancel_token.clone())
                    .await
                    .map_err(|e| PipelineError::new(ErrorKind::ResourceExhausted, stage, e.to_string()))?;
                project.segments = result.segments;
                Ok(())
            }
            Stage::Analyze => self.analyze(project).await,
            Stage::AwaitUserSelection => {
                project.edit_segments = selection
                    .select(&project.highlights, &project.chapters)
                    .await?;
                Ok(())
            }
            Stage::Translate => self.translate(project, checkpoint).await,
            Stage::GenerateSubtitles => {
                let style = SubtitleStyle::default();
                let temp_dir = std::env::temp_dir().join(checkpoint.run_id.as_str());
                let timed = optimize_timing(&project.translated_segments, &SubtitleTimingConfig::default());
                let path = self
                    .adapters
                    .subtitle_writer
                    .write(&timed, &style, SubtitleFormat::Srt, &temp_dir)
                    .await
                    .map_err(|e| PipelineError::new(ErrorKind::InvalidInput, stage, e.to_string()))?;
                project.translated_segments = timed;
                project.subtitle_paths = vec![path.display().to_string()];
                Ok(())
            }
            Stage::EditVideo => {
                let video = video_path
                    .as_ref()
                    .ok_or_else(|| PipelineError::new(ErrorKind::CorruptState, stage, "missing video path"))?;
                let subtitle = project.subtitle_paths.first().map(std::path::PathBuf::from);
                let temp_dir = std::env::temp_dir().join(checkpoint.run_id.as_str());
                let edited = self
                    .adapters
                    .video_editor
                    .edit(
                        video,
                        &project.edit_segments,
                        subtitle.as_deref(),
                        &VideoOutputConfig::default(),
                        &temp_dir,
                        self.cancel_token.clone(),
                    )
                    .await
                    .map_err(|e| PipelineError::new(ErrorKind::ResourceExhausted, stage, e.to_string()))?;
                project.output_paths = vec![edited.path.display().to_string()];
                project.export_plan = ExportPlan {
                    items: vec![ExportPlanItem {
                        file_type: "mp4".to_string(),
                        target_path: edited.path.display().to_string(),
                        estimated_bytes: edited.bytes,
                    }],
                };
                Ok(())
            }
            Stage::Export => Ok(()),
            Stage::Pending | Stage::Completed | Stage::Failed | Stage::Canceled => Ok(()),
        }
    }

    async fn analyze(&self, project: &mut Project) -> Result<(), PipelineError> {
        let transcript = summarize_segments(&project.segments);

        let highlight_schema = json!({
            "type": "object",
            "required": ["highlights"],
            "properties": {"highlights": {"type": "array"}}
        });
        let highlight_prompt = format!(
            "Identify the most shareable highlight spans in this transcript. \
             Respond as JSON: {{\"highlights\": [{{\"start_segment_id\": <int>, \"end_segment_id\": <int>, \
             \"score\": <float>, \"reason\": \"...\", \"category\": \"...\", \"suggested_title\": \"...\"}}]}}\n\n{transcript}"
        );
        let highlights_value = self
            .llm_router
            .execute(TaskKind::HighlightDetection, &highlight_prompt, &highlight_schema)
            .await?;
        project.highlights = parse_highlights(&highlights_value);

        let chapter_schema = json!({
            "type": "object",
            "required": ["chapters"],
            "properties": {"chapters": {"type": "array"}}
        });
        let chapter_prompt = format!(
            "Segment this transcript into chapters. Respond as JSON: \
             {{\"chapters\": [{{\"id\": <int>, \"start_s\": <float>, \"end_s\": <float>, \"title\": \"...\", \
             \"summary\": \"...\", \"segment_ids\": [<int>]}}]}}\n\n{transcript}"
        );
        let chapters_value = self
            .llm_router
            .execute(TaskKind::ChapterDetection, &chapter_prompt, &chapter_schema)
            .await?;
        project.chapters = parse_chapters(&chapters_value);

        Ok(())
    }

    /// Translates every segment not already recorded in `checkpoint.completed_items`,
    /// so a resume after a mid-stage cancellation or crash does not re-send
    /// already-translated segments to the LLM. Every id the batcher returns
    /// (real translation or source-text fallback) is marked completed, since
    /// `TranslationBatcher` has already exhausted its own per-segment retries.
    async fn translate(&self, project: &mut Project, checkpoint: &mut Checkpoint) -> Result<(), PipelineError> {
        let pending: Vec<Segment> = project
            .segments
            .iter()
            .filter(|s| !checkpoint.completed_items.contains(&s.id.to_string()))
            .cloned()
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        let batcher_config = self.config.translation_batcher_config();
        let batcher = TranslationBatcher::new(&self.llm_router, batcher_config);
        let result = batcher.translate(&pending, "en").await?;

        // Commit every id the batcher settled on — real translation or
        // source-text fallback — before judging the success rate, so a
        // below-threshold result that triggers a stage retry doesn't re-send
        // already-settled segments to the LLM on the next attempt.
        for t in &result.successful {
            checkpoint.mark_item_completed(t.id.to_string());
            project.translated_segments.retain(|existing| existing.id != t.id);
        }
        let failed_count = result.failed.len();
        let success_rate = result.success_rate;
        project.translated_segments.extend(result.successful);
        project.translated_segments.sort_by_key(|t| t.id);

        let mut resume = load_resume_state(checkpoint);
        resume.project = project.clone();
        checkpoint.artifacts = serde_json::to_value(&resume).unwrap_or(serde_json::Value::Null);
        self.save(checkpoint).await?;

        if failed_count > 0 {
            info!(failed = failed_count, "some segments fell back to source text");
        }

        if success_rate < self.config.translation.min_success_rate {
            return Err(PipelineError::new(
                ErrorKind::PartialFailure,
                Stage::Translate,
                format!(
                    "translation success rate {:.2} below minimum {:.2}",
                    success_rate, self.config.translation.min_success_rate
                ),
            ));
        }

        Ok(())
    }
}

fn ordinal(stage: Stage) -> usize {
    Stage::SEQUENCE.iter().position(|s| *s == stage).unwrap_or(usize::MAX)
}

/// Overall progress already accounted for by every stage strictly before `stage`.
fn progress_before(stage: Stage) -> f64 {
    Stage::SEQUENCE
        .iter()
        .take_while(|s| **s != stage)
        .map(|s| s.weight())
        .sum()
}

fn summarize_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| format!("[{}] {}", s.id, s.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_highlights(value: &serde_json::Value) -> Vec<Highlight> {
    value["highlights"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(Highlight {
                        start_segment_id: item["start_segment_id"].as_i64()?,
                        end_segment_id: item["end_segment_id"].as_i64()?,
                        score: item["score"].as_f64().unwrap_or(0.0),
                        reason: item["reason"].as_str().unwrap_or_default().to_string(),
                        category: item["category"].as_str().unwrap_or_default().to_string(),
                        suggested_title: item["suggested_title"].as_str().unwrap_or_default().to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_chapters(value: &serde_json::Value) -> Vec<Chapter> {
    value["chapters"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(Chapter {
                        id: item["id"].as_i64()?,
                        start_s: item["start_s"].as_f64().unwrap_or(0.0),
                        end_s: item["end_s"].as_f64().unwrap_or(0.0),
                        title: item["title"].as_str().unwrap_or_default().to_string(),
                        summary: item["summary"].as_str().unwrap_or_default().to_string(),
                        segment_ids: item["segment_ids"]
                            .as_array()
                            .map(|ids| ids.iter().filter_map(|v| v.as_i64()).collect())
                            .unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_before_fetch_is_zero() {
        assert_eq!(progress_before(Stage::Fetch), 0.0);
    }

    #[test]
    fn progress_before_export_sums_preceding_weights() {
        let expected = Stage::Fetch.weight()
            + Stage::ExtractAudio.weight()
            + Stage::Transcribe.weight()
            + Stage::Analyze.weight()
            + Stage::AwaitUserSelection.weight()
            + Stage::Translate.weight()
            + Stage::GenerateSubtitles.weight()
            + Stage::EditVideo.weight();
        assert!((progress_before(Stage::Export) - expected).abs() < 1e-9);
    }

    #[test]
    fn parse_highlights_skips_malformed_entries() {
        let value = json!({"highlights": [{"start_segment_id": 1, "end_segment_id": 2, "score": 0.8, "reason": "x", "category": "y", "suggested_title": "z"}, {"bad": true}]});
        let highlights = parse_highlights(&value);
        assert_eq!(highlights.len(), 1);
    }
}
