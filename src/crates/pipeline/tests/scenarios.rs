//! End-to-end scenarios driving `PipelineCoordinator` and `BatchExporter`
//! through hand-rolled fakes for every collaborator trait. No real video
//! tooling, speech-to-text model, or LLM HTTP call is ever made.

use async_trait::async_trait;
use pipeline_checkpoint::{CheckpointStore, InMemoryCheckpointStore, RunId, Stage};
use pipeline_core::{
    CancellationToken, PipelineError, ProgressSink, ProgressUpdate, ResourceGate,
    ResourceGateConfig, ResourceMonitor,
};
use pipeline_llm::chat::{ChatModel, ChatRequest, ChatResponse, ChatResult, ChatStreamResponse, Message};
use pipeline_llm::error::LlmError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use video_pipeline::adapters::{
    AudioExtractionError, AudioExtractor, Fetcher, FetchError, Quality, SubtitleFormat,
    SubtitleStyle, SubtitleWriteError, SubtitleWriter, Transcriber, TranscriptionError,
    TranscriptionResult, VideoArtifact, VideoEditError, VideoEditor, VideoMetadata, VideoOutputConfig,
};
use video_pipeline::config::PipelineConfig;
use video_pipeline::llm_router::{LlmRouter, LlmRouterConfig};
use video_pipeline::model::{Chapter, EditSegment, Highlight, Project, Segment, TranslatedSegment};
use video_pipeline::{Adapters, PipelineCoordinator, SelectionProvider};

/// Scripted `ChatModel` that recognizes the four prompt shapes the router
/// actually sends (highlight detection, chapter detection, chunked
/// translation, single-segment translation fallback) and answers each from
/// the prompt's own content, so it serves every scenario below without
/// hardcoding per-test responses.
#[derive(Clone)]
struct ScriptedModel {
    fail_always: bool,
    fail_chunk_requests: bool,
    bad_segment_marker: Option<&'static str>,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedModel {
    fn new() -> Self {
        Self {
            fail_always: false,
            fail_chunk_requests: false,
            bad_segment_marker: None,
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, request: ChatRequest) -> ChatResult<ChatResponse> {
        let prompt = request
            .messages
            .last()
            .and_then(|m| m.text())
            .unwrap_or_default()
            .to_string();
        self.call_log.lock().unwrap().push(prompt.clone());

        if self.fail_always {
            return Err(LlmError::ServiceUnavailable("provider down".into()));
        }

        if prompt.contains("Identify the most shareable highlight") {
            if prompt.ends_with("\n\n") {
                return Ok(reply(r#"{"highlights":[]}"#));
            }
            return Ok(reply(
                r#"{"highlights":[{"start_segment_id":1,"end_segment_id":2,"score":0.9,"reason":"strong reaction","category":"reaction","suggested_title":"Big Moment"}]}"#,
            ));
        }
        if prompt.contains("Segment this transcript into chapters") {
            if prompt.ends_with("\n\n") {
                return Ok(reply(r#"{"chapters":[]}"#));
            }
            return Ok(reply(
                r#"{"chapters":[{"id":1,"start_s":0.0,"end_s":20.0,"title":"Intro","summary":"opening remarks","segment_ids":[1,2,3]}]}"#,
            ));
        }
        if prompt.contains("Translate each non-context line") {
            if self.fail_chunk_requests {
                return Err(LlmError::QuotaExceeded("chunk translation unavailable".into()));
            }
            return Ok(reply(&translate_chunk_reply(&prompt)));
        }
        if prompt.contains("Translate the following line") {
            if let Some(marker) = self.bad_segment_marker {
                if prompt.contains(marker) {
                    return Err(LlmError::QuotaExceeded("segment permanently unsupported".into()));
                }
            }
            let text = prompt.rsplit("\n\n").next().unwrap_or_default();
            return Ok(reply(
                &serde_json::json!({"text": format!("[translated] {text}")}).to_string(),
            ));
        }

        Ok(reply("{}"))
    }

    async fn stream(&self, _request: ChatRequest) -> ChatResult<ChatStreamResponse> {
        Err(LlmError::Other("streaming not used by these scenarios".into()))
    }

    fn clone_box(&self) -> Box<dyn ChatModel> {
        Box::new(self.clone())
    }
}

fn reply(text: &str) -> ChatResponse {
    ChatResponse {
        message: Message::assistant(text.to_string()),
        usage: None,
        reasoning: None,
        metadata: Default::default(),
    }
}

/// Mirrors `build_chunk_prompt`'s `"{id}: {text}"` line format, skipping
/// context-only lines the same way the real batcher does.
fn translate_chunk_reply(prompt: &str) -> String {
    let mut items = Vec::new();
    for line in prompt.lines() {
        if let Some((id_part, rest)) = line.split_once(": ") {
            if let Ok(id) = id_part.trim().parse::<i64>() {
                if rest.contains("[context only") {
                    continue;
                }
                items.push(serde_json::json!({"id": id, "text": format!("[translated] {rest}")}));
            }
        }
    }
    serde_json::json!({"translations": items}).to_string()
}

struct FakeFetcher {
    path: PathBuf,
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(
        &self,
        url: &str,
        _output_dir: &Path,
        _quality: Quality,
        _cancel: CancellationToken,
    ) -> Result<VideoArtifact, FetchError> {
        Ok(VideoArtifact {
            path: self.path.clone(),
            metadata: VideoMetadata {
                title: "test video".to_string(),
                source_url: url.to_string(),
                uploader: None,
            },
            is_short: false,
            duration_s: 60.0,
        })
    }
}

struct FakeAudioExtractor;

#[async_trait]
impl AudioExtractor for FakeAudioExtractor {
    async fn extract(
        &self,
        _video_path: &Path,
        _output_dir: &Path,
        _cancel: CancellationToken,
    ) -> Result<PathBuf, AudioExtractionError> {
        Ok(PathBuf::from("/tmp/scenario-audio.wav"))
    }
}

struct FakeTranscriber {
    segments: Vec<Segment>,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        _audio_path: &Path,
        _language: Option<&str>,
        _diarize: bool,
        _cancel: CancellationToken,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        Ok(TranscriptionResult {
            segments: self.segments.clone(),
            language: "en".to_string(),
            duration_s: 60.0,
        })
    }
}

struct FakeSubtitleWriter;

#[async_trait]
impl SubtitleWriter for FakeSubtitleWriter {
    async fn write(
        &self,
        _segments: &[TranslatedSegment],
        _style: &SubtitleStyle,
        _format: SubtitleFormat,
        output_dir: &Path,
    ) -> Result<PathBuf, SubtitleWriteError> {
        Ok(output_dir.join("subtitles.srt"))
    }
}

struct FakeVideoEditor;

#[async_trait]
impl VideoEditor for FakeVideoEditor {
    async fn edit(
        &self,
        _video_path: &Path,
        _edit_segments: &[EditSegment],
        _subtitle_path: Option<&Path>,
        _output_config: &VideoOutputConfig,
        output_dir: &Path,
        _cancel: CancellationToken,
    ) -> Result<video_pipeline::adapters::EditedVideo, VideoEditError> {
        Ok(video_pipeline::adapters::EditedVideo {
            path: output_dir.join("final.mp4"),
            duration_s: 45.0,
            resolution: "1920x1080".to_string(),
            bytes: 123_456,
        })
    }
}

/// Turns every candidate highlight into an edit segment, unchanged. Real
/// selection is a human decision the coordinator only awaits; these
/// scenarios aren't testing that judgment, just that the coordinator carries
/// whatever comes back.
struct PassthroughSelection;

#[async_trait]
impl SelectionProvider for PassthroughSelection {
    async fn select(
        &self,
        highlights: &[Highlight],
        _chapters: &[Chapter],
    ) -> Result<Vec<EditSegment>, PipelineError> {
        Ok(highlights
            .iter()
            .map(|h| EditSegment {
                id: h.start_segment_id,
                start_s: 0.0,
                end_s: 5.0,
                title: Some(h.suggested_title.clone()),
                title_duration_s: 2.0,
                transition: "cut".to_string(),
                speed: 1.0,
            })
            .collect())
    }
}

struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _update: ProgressUpdate) {}
}

fn segment(id: i64, text: &str) -> Segment {
    Segment {
        id,
        start_s: id as f64,
        end_s: id as f64 + 1.0,
        text: text.to_string(),
        confidence: 0.92,
        words: vec![],
        speaker: None,
    }
}

fn adapters(segments: Vec<Segment>) -> Adapters {
    Adapters {
        fetcher: Arc::new(FakeFetcher {
            path: PathBuf::from("/tmp/scenario-video.mp4"),
        }),
        audio_extractor: Arc::new(FakeAudioExtractor),
        transcriber: Arc::new(FakeTranscriber { segments }),
        subtitle_writer: Arc::new(FakeSubtitleWriter),
        video_editor: Arc::new(FakeVideoEditor),
    }
}

fn gate() -> Arc<ResourceGate> {
    Arc::new(ResourceGate::new(
        Arc::new(ResourceMonitor::start()),
        ResourceGateConfig::default(),
    ))
}

#[tokio::test]
async fn happy_path_produces_a_completed_project_and_clears_its_checkpoint() {
    let segments = vec![
        segment(1, "hello there"),
        segment(2, "this is great"),
        segment(3, "goodbye now"),
    ];
    let store = Arc::new(InMemoryCheckpointStore::new());
    let local: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new());
    let remote: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new());
    let router = Arc::new(LlmRouter::new(local, remote, LlmRouterConfig::default()));
    let config = PipelineConfig::new("/tmp/pipeline-test-s1");
    let coordinator =
        PipelineCoordinator::new(store.clone(), adapters(segments), router, gate(), config);

    let project = coordinator
        .run(
            "https://example.com/video",
            Arc::new(PassthroughSelection),
            Arc::new(NullSink),
        )
        .await
        .unwrap();

    assert_eq!(project.segments.len(), 3);
    assert_eq!(project.translated_segments.len(), 3);
    assert_eq!(project.highlights.len(), 1);
    assert_eq!(project.chapters.len(), 1);
    assert_eq!(project.output_paths.len(), 1);
    assert_eq!(project.subtitle_paths.len(), 1);
    assert_eq!(store.len().await, 0, "a successful run cleans up its checkpoint");
}

#[tokio::test]
async fn resumed_run_translates_only_the_segments_not_already_completed() {
    let segments = vec![
        segment(1, "alpha line"),
        segment(2, "beta line"),
        segment(3, "gamma line"),
        segment(4, "delta line"),
        segment(5, "epsilon line"),
    ];

    let local: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new());
    let remote_model = ScriptedModel::new();
    let remote: Arc<dyn ChatModel> = Arc::new(remote_model.clone());
    let router = Arc::new(LlmRouter::new(local, remote, LlmRouterConfig::default()));

    let store = InMemoryCheckpointStore::new();
    let run_id = RunId::new();
    let mut checkpoint = store.open(&run_id).await.unwrap();
    checkpoint.advance_to(Stage::Translate);
    checkpoint.mark_item_completed("1");
    checkpoint.mark_item_completed("2");

    let mut seeded = Project::default();
    seeded.segments = segments.clone();
    seeded.translated_segments = vec![
        TranslatedSegment {
            id: 1,
            original: "alpha line".to_string(),
            translated: "ligne alpha".to_string(),
            start_s: 1.0,
            end_s: 2.0,
            quality_flags: vec![],
        },
        TranslatedSegment {
            id: 2,
            original: "beta line".to_string(),
            translated: "ligne beta".to_string(),
            start_s: 2.0,
            end_s: 3.0,
            quality_flags: vec![],
        },
    ];
    checkpoint.artifacts = serde_json::json!({
        "video_path": null,
        "audio_path": null,
        "project": seeded,
    });
    store.save(&checkpoint).await.unwrap();
    store.release(&run_id).await.unwrap();

    let config = PipelineConfig::new("/tmp/pipeline-test-s2");
    let coordinator = PipelineCoordinator::new(
        Arc::new(store),
        adapters(segments),
        router,
        gate(),
        config,
    );

    let project = coordinator
        .run_from_checkpoint(&run_id, Arc::new(PassthroughSelection), Arc::new(NullSink))
        .await
        .unwrap();

    assert_eq!(project.translated_segments.len(), 5);

    let log = remote_model.call_log.lock().unwrap();
    let translate_calls: Vec<&String> = log.iter().filter(|p| p.contains("Translate")).collect();
    assert!(!translate_calls.is_empty());
    assert!(translate_calls.iter().any(|p| p.contains("3: gamma line")));
    assert!(translate_calls
        .iter()
        .all(|p| !p.contains("1: alpha line") && !p.contains("2: beta line")));
}

#[tokio::test]
async fn local_failure_falls_back_to_remote_and_increments_router_metrics() {
    let segments = vec![segment(1, "only segment")];
    let local: Arc<dyn ChatModel> = Arc::new(ScriptedModel {
        fail_always: true,
        ..ScriptedModel::new()
    });
    let remote: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new());
    let mut llm_config = LlmRouterConfig::default();
    llm_config.retry_policy.max_attempts = 1;
    let router = Arc::new(LlmRouter::new(local, remote, llm_config));
    let store = Arc::new(InMemoryCheckpointStore::new());
    let config = PipelineConfig::new("/tmp/pipeline-test-s3");
    let coordinator = PipelineCoordinator::new(
        store,
        adapters(segments),
        router.clone(),
        gate(),
        config,
    );

    let project = coordinator
        .run(
            "https://example.com/video",
            Arc::new(PassthroughSelection),
            Arc::new(NullSink),
        )
        .await
        .unwrap();

    assert_eq!(project.highlights.len(), 1);
    // Analysis makes two local-routed calls (highlights, chapters); both
    // providers fail on local, both recover on remote.
    assert_eq!(router.fallback_count(), 2);
    assert_eq!(router.both_failed_count(), 0);
}

#[tokio::test]
async fn translation_continues_past_a_bounded_number_of_permanent_failures() {
    const BROKEN: &str = "##BROKEN##";
    let mut segments = Vec::new();
    for i in 1..=100 {
        let text = if i % 14 == 0 {
            format!("segment content number {i} {BROKEN}")
        } else {
            format!("segment content number {i}")
        };
        segments.push(segment(i, &text));
    }
    let broken_count = segments.iter().filter(|s| s.text.contains(BROKEN)).count();
    assert_eq!(broken_count, 7);

    let local: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new());
    let remote: Arc<dyn ChatModel> = Arc::new(ScriptedModel {
        fail_chunk_requests: true,
        bad_segment_marker: Some(BROKEN),
        ..ScriptedModel::new()
    });
    let mut router_config = LlmRouterConfig::default();
    router_config.rpm = 1_000_000;
    router_config.retry_policy.max_attempts = 1;
    let router = Arc::new(LlmRouter::new(local, remote, router_config));

    let store = Arc::new(InMemoryCheckpointStore::new());
    let config = PipelineConfig::new("/tmp/pipeline-test-s4");
    let coordinator =
        PipelineCoordinator::new(store, adapters(segments), router, gate(), config);

    let project = coordinator
        .run(
            "https://example.com/video",
            Arc::new(PassthroughSelection),
            Arc::new(NullSink),
        )
        .await
        .unwrap();

    assert_eq!(project.translated_segments.len(), 100);
    let failed: Vec<_> = project
        .translated_segments
        .iter()
        .filter(|t| t.quality_flags.contains(&"translation_failed".to_string()))
        .collect();
    assert_eq!(failed.len(), broken_count);
    for t in &failed {
        assert_eq!(t.translated, t.original);
    }
}

#[tokio::test]
async fn export_concurrency_never_exceeds_the_configured_ceiling() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use video_pipeline::batch_exporter::{BatchExporter, BatchExporterConfig, ExportJob, ExportRequest};

    struct TrackedJob {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ExportJob for TrackedJob {
        async fn export(&self, request: &ExportRequest) -> Result<PathBuf, String> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(request.output_dir.join(&request.id))
        }
    }

    let gate_config = ResourceGateConfig {
        max_parallel_exports: 2,
        poll_interval: Duration::from_millis(5),
        ..Default::default()
    };
    let gate = Arc::new(ResourceGate::new(Arc::new(ResourceMonitor::start()), gate_config));
    let job = Arc::new(TrackedJob {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let exporter = BatchExporter::new(
        gate,
        BatchExporterConfig {
            parallel_exports: 5,
            ..Default::default()
        },
    );

    let requests: Vec<ExportRequest> = (0..5)
        .map(|i| ExportRequest {
            id: format!("req-{i}"),
            video_path: PathBuf::from("/tmp/in.mp4"),
            output_dir: PathBuf::from("/tmp/out"),
        })
        .collect();

    let outcomes = exporter.run(requests, job.clone(), Arc::new(NullSink)).await;

    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|o| o.result.is_ok()));
    assert!(job.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn zero_segment_transcript_completes_without_translating_anything() {
    let local: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new());
    let remote_model = ScriptedModel::new();
    let remote: Arc<dyn ChatModel> = Arc::new(remote_model.clone());
    let router = Arc::new(LlmRouter::new(local, remote, LlmRouterConfig::default()));
    let store = Arc::new(InMemoryCheckpointStore::new());
    let config = PipelineConfig::new("/tmp/pipeline-test-s7");
    let coordinator =
        PipelineCoordinator::new(store.clone(), adapters(vec![]), router, gate(), config);

    let project = coordinator
        .run(
            "https://example.com/empty-video",
            Arc::new(PassthroughSelection),
            Arc::new(NullSink),
        )
        .await
        .unwrap();

    assert!(project.segments.is_empty());
    assert!(project.highlights.is_empty());
    assert!(project.chapters.is_empty());
    assert!(project.translated_segments.is_empty());
    assert!(
        remote_model.call_log.lock().unwrap().iter().all(|p| !p.contains("Translate")),
        "an empty segment list must never reach the translation batcher"
    );
    assert_eq!(store.len().await, 0);
}
