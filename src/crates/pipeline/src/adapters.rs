//! Narrow collaborator contracts the coordinator consumes.
//!
//! These traits are the seams where concrete codec invocations, speech-to-text
//! internals, and subtitle file formats plug in. This crate ships no
//! implementations of them; callers supply adapters that wrap their own
//! video-tool, transcription, and writer stacks.

use crate::model::{EditSegment, Segment, TranslatedSegment};
use async_trait::async_trait;
use pipeline_core::CancellationToken;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Best,
    Balanced,
    Smallest,
}

#[derive(Debug, Error, Clone)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("resource not found")]
    NotFound,
    #[error("geo-blocked in the requesting region")]
    GeoBlocked,
    #[error("age-restricted content requires authentication")]
    AgeRestricted,
    #[error("download failed: {0}")]
    DownloadFailed(String),
    #[error("insufficient disk space")]
    DiskSpace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub source_url: String,
    pub uploader: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub path: PathBuf,
    pub metadata: VideoMetadata,
    pub is_short: bool,
    pub duration_s: f64,
}

/// Downloads source video from a remote URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        output_dir: &std::path::Path,
        quality: Quality,
        cancel: CancellationToken,
    ) -> Result<VideoArtifact, FetchError>;
}

#[derive(Debug, Error, Clone)]
pub enum AudioExtractionError {
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("no audio track present")]
    NoAudioTrack,
    #[error("unsupported source format")]
    FormatUnsupported,
}

/// Produces a 16 kHz mono 16-bit PCM WAV from a video file.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract(
        &self,
        video_path: &std::path::Path,
        output_dir: &std::path::Path,
        cancel: CancellationToken,
    ) -> Result<PathBuf, AudioExtractionError>;
}

#[derive(Debug, Error, Clone)]
pub enum TranscriptionError {
    #[error("model failed to load: {0}")]
    ModelLoad(String),
    #[error("out of memory during transcription")]
    Oom,
    #[error("transcription produced no segments")]
    Empty,
    #[error("language could not be detected")]
    LanguageDetect,
    #[error("device error: {0}")]
    DeviceError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub segments: Vec<Segment>,
    pub language: String,
    pub duration_s: f64,
}

/// Converts an audio file into timed, diarized-if-requested segments.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &std::path::Path,
        language: Option<&str>,
        diarize: bool,
        cancel: CancellationToken,
    ) -> Result<TranscriptionResult, TranscriptionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubtitleFormat {
    Srt,
    Ass,
    Vtt,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtitleStyle {
    pub font_family: Option<String>,
    pub font_size: Option<u32>,
    pub primary_color: Option<String>,
}

#[derive(Debug, Error, Clone)]
pub enum SubtitleWriteError {
    #[error("font not found: {0}")]
    FontNotFound(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Serializes translated segments into a subtitle file format.
#[async_trait]
pub trait SubtitleWriter: Send + Sync {
    async fn write(
        &self,
        segments: &[TranslatedSegment],
        style: &SubtitleStyle,
        format: SubtitleFormat,
        output_dir: &std::path::Path,
    ) -> Result<PathBuf, SubtitleWriteError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoOutputConfig {
    pub resolution: Option<String>,
    pub bitrate_kbps: Option<u32>,
    pub hardware_acceleration: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditedVideo {
    pub path: PathBuf,
    pub duration_s: f64,
    pub resolution: String,
    pub bytes: u64,
}

#[derive(Debug, Error, Clone)]
pub enum VideoEditError {
    #[error("encoding failed: {0}")]
    EncodingFailed(String),
    #[error("invalid edit segment: {0}")]
    InvalidSegment(String),
    #[error("hardware acceleration failed: {0}")]
    HwAccelFailed(String),
    #[error("insufficient disk space")]
    DiskSpace,
}

/// Cuts, re-times, and optionally burns subtitles into a video per a set of
/// user-curated [`EditSegment`]s.
#[async_trait]
pub trait VideoEditor: Send + Sync {
    async fn edit(
        &self,
        video_path: &std::path::Path,
        edit_segments: &[EditSegment],
        subtitle_path: Option<&std::path::Path>,
        output_config: &VideoOutputConfig,
        output_dir: &std::path::Path,
        cancel: CancellationToken,
    ) -> Result<EditedVideo, VideoEditError>;
}
