//! Chunks segments into token-budgeted translation requests, reassembles the
//! results, and scores per-segment translation quality.

use crate::llm_router::{LlmRouter, TaskKind};
use crate::model::{Segment, TranslatedSegment};
use pipeline_core::PipelineError;
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct TranslationBatcherConfig {
    pub max_tokens_per_request: usize,
    pub overlap_segments: usize,
    pub min_success_rate: f64,
    pub length_ratio_min: f64,
    pub length_ratio_max: f64,
    pub quality_flag_threshold: f64,
}

impl Default for TranslationBatcherConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_request: 4000,
            overlap_segments: 2,
            min_success_rate: 0.90,
            length_ratio_min: 0.3,
            length_ratio_max: 2.0,
            quality_flag_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PartialTranslationResult {
    pub successful: Vec<TranslatedSegment>,
    pub failed: Vec<(i64, String)>,
    pub success_rate: f64,
}

/// Mixed-script token count estimate: 1.5 tokens/char for ideographic runs,
/// 1.3 tokens/word otherwise, summed per segment.
fn estimate_tokens(text: &str) -> f64 {
    let ideographic_chars = text.chars().filter(|c| is_ideographic(*c)).count();
    let other_chars: String = text.chars().filter(|c| !is_ideographic(*c)).collect();
    let word_count = other_chars.split_whitespace().count();
    ideographic_chars as f64 * 1.5 + word_count as f64 * 1.3
}

fn is_ideographic(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3040..=0x30FF // Hiragana/Katakana
        | 0xAC00..=0xD7A3 // Hangul syllables
    )
}

/// One chunk of segments to send in a single translation request, with the
/// trailing overlap from the previous chunk marked context-only.
struct Chunk<'a> {
    segments: Vec<&'a Segment>,
    context_only_ids: Vec<i64>,
    /// Set when this chunk is a single segment whose own token estimate
    /// already exceeds the budget — emitted alone rather than split.
    oversized_ids: Vec<i64>,
}

fn build_chunks(segments: &[Segment], config: &TranslationBatcherConfig) -> Vec<Chunk<'_>> {
    let mut chunks = Vec::new();
    let mut current: Vec<&Segment> = Vec::new();
    let mut current_tokens = 0.0;
    let mut prev_tail: Vec<&Segment> = Vec::new();

    for segment in segments {
        let tokens = estimate_tokens(&segment.text);
        if !current.is_empty() && current_tokens + tokens > config.max_tokens_per_request as f64 {
            chunks.push(finish_chunk(std::mem::take(&mut current), &prev_tail, config));
            prev_tail = last_n(&chunks_last_segments(&chunks), config.overlap_segments);
            current_tokens = 0.0;
        }
        current.push(segment);
        current_tokens += tokens;
    }
    if !current.is_empty() {
        chunks.push(finish_chunk(current, &prev_tail, config));
    }
    chunks
}

fn chunks_last_segments<'a>(chunks: &[Chunk<'a>]) -> Vec<&'a Segment> {
    chunks.last().map(|c| c.segments.clone()).unwrap_or_default()
}

fn last_n<'a>(segments: &[&'a Segment], n: usize) -> Vec<&'a Segment> {
    let len = segments.len();
    segments[len.saturating_sub(n)..].to_vec()
}

fn finish_chunk<'a>(
    body: Vec<&'a Segment>,
    prev_tail: &[&'a Segment],
    config: &TranslationBatcherConfig,
) -> Chunk<'a> {
    let context_only_ids = prev_tail.iter().map(|s| s.id).collect();
    let oversized_ids = if let [only] = body.as_slice() {
        if estimate_tokens(&only.text) > config.max_tokens_per_request as f64 {
            vec![only.id]
        } else {
            Vec::new()
        }
    } else {
        Vec::new()
    };
    let mut segments = prev_tail.to_vec();
    segments.extend(body);
    Chunk {
        segments,
        context_only_ids,
        oversized_ids,
    }
}

pub struct TranslationBatcher<'a> {
    router: &'a LlmRouter,
    config: TranslationBatcherConfig,
}

impl<'a> TranslationBatcher<'a> {
    pub fn new(router: &'a LlmRouter, config: TranslationBatcherConfig) -> Self {
        Self { router, config }
    }

    /// Translates `segments` into `target_language`, chunking by token
    /// budget, retrying failed chunks segment-by-segment, and scoring
    /// quality. Overlap duplicates across chunk boundaries resolve with
    /// later-chunk-wins semantics. A segment too large to share a chunk with
    /// anything else is sent alone and flagged `oversized_segment` rather
    /// than split.
    pub async fn translate(
        &self,
        segments: &[Segment],
        target_language: &str,
    ) -> Result<PartialTranslationResult, PipelineError> {
        let chunks = build_chunks(segments, &self.config);
        let oversized: std::collections::HashSet<i64> =
            chunks.iter().flat_map(|c| c.oversized_ids.iter().copied()).collect();
        let mut by_id: BTreeMap<i64, Result<TranslatedSegment, String>> = BTreeMap::new();

        for chunk in &chunks {
            match self.translate_chunk(chunk, target_language).await {
                Ok(translated) => {
                    for t in translated {
                        by_id.insert(t.id, Ok(t));
                    }
                }
                Err(_chunk_err) => {
                    for segment in &chunk.segments {
                        if chunk.context_only_ids.contains(&segment.id) {
                            continue;
                        }
                        match self.translate_one(segment, target_language).await {
                            Ok(t) => {
                                by_id.insert(t.id, Ok(t));
                            }
                            Err(e) => {
                                by_id.insert(segment.id, Err(e.to_string()));
                            }
                        }
                    }
                }
            }
        }

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for (id, outcome) in by_id {
            match outcome {
                Ok(t) => successful.push(score_quality(t, &self.config)),
                Err(reason) => failed.push((id, reason)),
            }
        }
        // Fall back to the original text for permanently-failed segments so
        // downstream stages always have a subtitle line to render.
        for (id, reason) in &failed {
            if let Some(original) = segments.iter().find(|s| s.id == *id) {
                successful.push(TranslatedSegment {
                    id: *id,
                    original: original.text.clone(),
                    translated: original.text.clone(),
                    start_s: original.start_s,
                    end_s: original.end_s,
                    quality_flags: vec!["translation_failed".to_string()],
                });
                tracing::warn!(segment_id = id, reason, "translation failed permanently, using source text");
            }
        }
        for segment in &mut successful {
            if oversized.contains(&segment.id) && !segment.quality_flags.contains(&"oversized_segment".to_string()) {
                segment.quality_flags.push("oversized_segment".to_string());
            }
        }

        let total = segments.len().max(1);
        let success_rate = (total - failed.len()).max(0) as f64 / total as f64;

        Ok(PartialTranslationResult {
            successful,
            failed,
            success_rate,
        })
    }

    async fn translate_chunk(
        &self,
        chunk: &Chunk<'_>,
        target_language: &str,
    ) -> Result<Vec<TranslatedSegment>, PipelineError> {
        let prompt = build_chunk_prompt(chunk, target_language);
        let schema = json!({
            "type": "object",
            "required": ["translations"],
            "properties": {
                "translations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id", "text"],
                        "properties": {
                            "id": {"type": "integer"},
                            "text": {"type": "string"}
                        }
                    }
                }
            }
        });
        let value = self.router.execute(TaskKind::Translation, &prompt, &schema).await?;
        let mut out = Vec::new();
        if let Some(items) = value["translations"].as_array() {
            for item in items {
                let id = item["id"].as_i64().unwrap_or_default();
                let text = item["text"].as_str().unwrap_or_default().to_string();
                // Don't drop a translation for an id just because this chunk
                // marked it context-only: if the model answers for it anyway,
                // letting it flow into `by_id` preserves later-chunk-wins
                // semantics on overlap ids instead of silently keeping
                // whichever earlier chunk happened to translate it first.
                if let Some(original) = chunk.segments.iter().find(|s| s.id == id) {
                    out.push(TranslatedSegment {
                        id,
                        original: original.text.clone(),
                        translated: text,
                        start_s: original.start_s,
                        end_s: original.end_s,
                        quality_flags: Vec::new(),
                    });
                }
            }
        }
        Ok(out)
    }

    async fn translate_one(
        &self,
        segment: &Segment,
        target_language: &str,
    ) -> Result<TranslatedSegment, PipelineError> {
        let prompt = format!(
            "Translate the following line into {target_language}. Respond as JSON: {{\"text\": \"...\"}}.\n\n{}",
            segment.text
        );
        let schema = json!({
            "type": "object",
            "required": ["text"],
            "properties": {"text": {"type": "string"}}
        });
        let value = self.router.execute(TaskKind::Translation, &prompt, &schema).await?;
        Ok(TranslatedSegment {
            id: segment.id,
            original: segment.text.clone(),
            translated: value["text"].as_str().unwrap_or_default().to_string(),
            start_s: segment.start_s,
            end_s: segment.end_s,
            quality_flags: Vec::new(),
        })
    }
}

fn build_chunk_prompt(chunk: &Chunk<'_>, target_language: &str) -> String {
    let mut lines = Vec::new();
    for segment in &chunk.segments {
        let marker = if chunk.context_only_ids.contains(&segment.id) {
            " [context only, do not translate]"
        } else {
            ""
        };
        lines.push(format!("{}: {}{}", segment.id, segment.text, marker));
    }
    format!(
        "Translate each non-context line into {target_language}. Respond as JSON: \
         {{\"translations\": [{{\"id\": <int>, \"text\": \"...\"}}]}}.\n\n{}",
        lines.join("\n")
    )
}

/// Applies the three quality checks in §4.6(b): length-ratio bounds, source
/// residue, and placeholder/error-marker detection. Confidence starts at 1.0
/// and is adjusted downward; segments below the flag threshold are flagged
/// but still included in the output.
fn score_quality(mut segment: TranslatedSegment, config: &TranslationBatcherConfig) -> TranslatedSegment {
    if segment.quality_flags.contains(&"translation_failed".to_string()) {
        return segment;
    }

    let mut confidence = 1.0_f64;

    let original_len = segment.original.chars().count().max(1) as f64;
    let translated_len = segment.translated.chars().count() as f64;
    let ratio = translated_len / original_len;
    if ratio < config.length_ratio_min || ratio > config.length_ratio_max {
        confidence *= 0.5;
        segment.quality_flags.push("length_ratio_out_of_range".to_string());
    }

    if has_source_residue(&segment.translated) {
        segment.quality_flags.push("source_language_residue".to_string());
    }

    if contains_placeholder_marker(&segment.translated) {
        confidence = 0.0;
        segment.quality_flags.push("placeholder_or_error_marker".to_string());
    }

    if confidence < config.quality_flag_threshold {
        segment.quality_flags.push("low_confidence".to_string());
    }

    segment
}

/// Heuristic: a long run of Latin letters embedded in output otherwise
/// dominated by non-alphabetic (e.g. CJK) characters suggests untranslated
/// source text leaked through.
fn has_source_residue(text: &str) -> bool {
    let total = text.chars().count();
    if total == 0 {
        return false;
    }
    let non_alphabetic = text.chars().filter(|c| !c.is_alphabetic() || is_ideographic(*c)).count();
    if non_alphabetic < total / 2 {
        return false;
    }
    text.split(|c: char| !c.is_ascii_alphabetic())
        .any(|run| run.chars().count() >= 8)
}

fn contains_placeholder_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    const MARKERS: &[&str] = &["[translation error]", "<error>", "{{untranslated}}", "n/a"];
    MARKERS.iter().any(|m| lower.contains(m)) || text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(id: i64, text: &str) -> Segment {
        Segment {
            id,
            start_s: id as f64,
            end_s: id as f64 + 1.0,
            text: text.to_string(),
            confidence: 0.9,
            words: vec![],
            speaker: None,
        }
    }

    #[test]
    fn token_estimate_counts_cjk_by_character() {
        let tokens = estimate_tokens("你好世界");
        assert_eq!(tokens, 4.0 * 1.5);
    }

    #[test]
    fn token_estimate_counts_latin_by_word() {
        let tokens = estimate_tokens("hello there world");
        assert_eq!(tokens, 3.0 * 1.3);
    }

    #[test]
    fn chunking_respects_token_budget() {
        let segments: Vec<Segment> = (0..50).map(|i| segment(i, "word word word word")).collect();
        let config = TranslationBatcherConfig {
            max_tokens_per_request: 20,
            ..Default::default()
        };
        let chunks = build_chunks(&segments, &config);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn a_single_segment_over_budget_is_its_own_chunk_and_flagged() {
        let huge = segment(0, &"word ".repeat(100));
        let segments = vec![huge, segment(1, "short line")];
        let config = TranslationBatcherConfig {
            max_tokens_per_request: 20,
            ..Default::default()
        };
        let chunks = build_chunks(&segments, &config);
        assert_eq!(chunks[0].segments.len(), 1);
        assert_eq!(chunks[0].oversized_ids, vec![0]);
    }

    #[test]
    fn placeholder_marker_zeroes_confidence_flag() {
        let t = TranslatedSegment {
            id: 1,
            original: "hello".into(),
            translated: "[Translation Error]".into(),
            start_s: 0.0,
            end_s: 1.0,
            quality_flags: vec![],
        };
        let scored = score_quality(t, &TranslationBatcherConfig::default());
        assert!(scored.quality_flags.contains(&"placeholder_or_error_marker".to_string()));
    }

    #[test]
    fn length_ratio_out_of_range_is_flagged() {
        let t = TranslatedSegment {
            id: 1,
            original: "a reasonably long sentence about something".into(),
            translated: "ok".into(),
            start_s: 0.0,
            end_s: 1.0,
            quality_flags: vec![],
        };
        let scored = score_quality(t, &TranslationBatcherConfig::default());
        assert!(scored.quality_flags.contains(&"length_ratio_out_of_range".to_string()));
    }
}
