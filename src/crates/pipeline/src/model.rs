//! Data model: the typed artifacts that flow between stages.
//!
//! Every entity here is immutable after construction unless its doc comment
//! says otherwise. Segments, highlights, chapters, and translations form a
//! citation graph keyed by integer id; callers are responsible for keeping
//! that graph acyclic.

use serde::{Deserialize, Serialize};

/// One word's timing within a [`Segment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start_s: f64,
    pub end_s: f64,
}

/// A transcribed span of speech.
///
/// Invariants: `start_s <= end_s`; `words` cover `[start_s, end_s]`; ids are
/// unique within a run; a `Vec<Segment>` is kept ordered by `start_s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: i64,
    pub start_s: f64,
    pub end_s: f64,
    pub text: String,
    pub confidence: f64,
    pub words: Vec<WordTiming>,
    pub speaker: Option<String>,
}

impl Segment {
    pub fn duration_s(&self) -> f64 {
        self.end_s - self.start_s
    }
}

/// One segment's translation, carrying forward quality signals from
/// [`crate::translation_batcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedSegment {
    pub id: i64,
    pub original: String,
    pub translated: String,
    pub start_s: f64,
    pub end_s: f64,
    pub quality_flags: Vec<String>,
}

/// An LLM-identified candidate highlight spanning a contiguous run of segments.
///
/// Invariant: `end_segment_id >= start_segment_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub start_segment_id: i64,
    pub end_segment_id: i64,
    pub score: f64,
    pub reason: String,
    pub category: String,
    pub suggested_title: String,
}

/// A chapter boundary over a contiguous, non-overlapping run of segments.
///
/// Invariant: chapters in a `Vec<Chapter>` are ordered and non-overlapping;
/// the union of every chapter's `segment_ids` covers all segments exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub start_s: f64,
    pub end_s: f64,
    pub title: String,
    pub summary: String,
    pub segment_ids: Vec<i64>,
}

/// A user-curated edit decision over one highlight or chapter.
///
/// Invariants: `speed > 0`; `title_duration_s >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditSegment {
    pub id: i64,
    pub start_s: f64,
    pub end_s: f64,
    pub title: Option<String>,
    pub title_duration_s: f64,
    pub transition: String,
    pub speed: f64,
}

/// One file produced by export: type, destination, and an estimate used for
/// disk-space and progress accounting. Produced once at export start and
/// immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPlanItem {
    pub file_type: String,
    pub target_path: String,
    pub estimated_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportPlan {
    pub items: Vec<ExportPlanItem>,
}

/// The in-memory result of a completed run. Serialization into a project
/// container (manifest + transcription + analysis + assets) is a
/// collaborator's responsibility, not this crate's.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    pub segments: Vec<Segment>,
    pub translated_segments: Vec<TranslatedSegment>,
    pub highlights: Vec<Highlight>,
    pub chapters: Vec<Chapter>,
    pub edit_segments: Vec<EditSegment>,
    pub subtitle_paths: Vec<String>,
    pub export_plan: ExportPlan,
    pub output_paths: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_duration_is_end_minus_start() {
        let segment = Segment {
            id: 1,
            start_s: 1.5,
            end_s: 4.0,
            text: "hello".into(),
            confidence: 0.95,
            words: vec![],
            speaker: None,
        };
        assert_eq!(segment.duration_s(), 2.5);
    }
}
