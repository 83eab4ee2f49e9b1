//! # video-pipeline - Fetch-to-Export Orchestration Core
//!
//! Drives a fixed sequence of heavyweight stages — fetch, audio extraction,
//! transcription, analysis, translation, subtitle generation, editing, and
//! export — over a remote video URL, persisting a checkpoint at every stage
//! boundary so a failed or canceled run can resume at item granularity.
//!
//! This crate owns orchestration only. Concrete video tooling, speech-to-text
//! models, and LLM HTTP protocols are supplied by the caller through the
//! narrow contracts in [`adapters`]; see [`coordinator::PipelineCoordinator`]
//! for the entry point.
//!
//! ## Module map
//!
//! - [`model`] - typed artifacts flowing between stages
//! - [`adapters`] - Fetcher/AudioExtractor/Transcriber/SubtitleWriter/VideoEditor contracts
//! - [`stage_runner`] - generic per-stage execution over item lists
//! - [`llm_router`] - per-task provider selection, fallback, rate limiting
//! - [`response_parser`] - multi-strategy structured-output extraction
//! - [`translation_batcher`] - token-budgeted chunking with partial-success accounting
//! - [`subtitle_timing`] - minimum-duration/gap timing cleanup before writing subtitles
//! - [`batch_exporter`] - multi-request export scheduling with resource admission
//! - [`coordinator`] - wires the above into the fixed stage sequence
//! - [`config`] - the environment/config surface

pub mod adapters;
pub mod batch_exporter;
pub mod config;
pub mod coordinator;
pub mod llm_router;
pub mod model;
pub mod response_parser;
pub mod stage_runner;
pub mod subtitle_timing;
pub mod translation_batcher;

pub use coordinator::{Adapters, PipelineCoordinator, SelectionProvider};
pub use model::{
    Chapter, EditSegment, ExportPlan, ExportPlanItem, Highlight, Project, Segment,
    TranslatedSegment, WordTiming,
};
