//! Post-processes translated segment timings before handing them to a
//! `SubtitleWriter`: short lines are stretched to a minimum legible
//! duration, and adjacent lines are kept at least a minimum gap apart.
//! Ordering and segment identity are preserved; only `start_s`/`end_s`
//! change.

use crate::model::TranslatedSegment;

#[derive(Debug, Clone, Copy)]
pub struct SubtitleTimingConfig {
    pub min_duration_s: f64,
    pub min_gap_s: f64,
}

impl Default for SubtitleTimingConfig {
    fn default() -> Self {
        Self {
            min_duration_s: 1.0,
            min_gap_s: 0.1,
        }
    }
}

/// Assumes `segments` is already ordered by `start_s`, which is how every
/// producer in this crate (`TranslationBatcher::translate`) emits them.
pub fn optimize_timing(
    segments: &[TranslatedSegment],
    config: &SubtitleTimingConfig,
) -> Vec<TranslatedSegment> {
    let mut out = segments.to_vec();
    let len = out.len();
    for i in 0..len {
        let desired_end = out[i].start_s + config.min_duration_s;
        if out[i].end_s < desired_end {
            out[i].end_s = desired_end;
        }
        if i + 1 < len {
            let max_end = out[i + 1].start_s - config.min_gap_s;
            if out[i].end_s > max_end {
                out[i].end_s = max_end.max(out[i].start_s);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: i64, start_s: f64, end_s: f64) -> TranslatedSegment {
        TranslatedSegment {
            id,
            original: String::new(),
            translated: String::new(),
            start_s,
            end_s,
            quality_flags: vec![],
        }
    }

    #[test]
    fn short_segment_is_stretched_to_minimum_duration() {
        let segments = vec![seg(0, 0.0, 0.2), seg(1, 5.0, 5.3)];
        let out = optimize_timing(&segments, &SubtitleTimingConfig::default());
        assert_eq!(out[0].end_s, 1.0);
        assert_eq!(out[1].end_s, 6.0);
    }

    #[test]
    fn stretch_never_overlaps_into_the_next_segment_gap() {
        let segments = vec![seg(0, 0.0, 0.2), seg(1, 0.5, 1.5)];
        let out = optimize_timing(&segments, &SubtitleTimingConfig::default());
        assert!(out[0].end_s <= out[1].start_s - 0.1);
        assert!(out[0].end_s >= out[0].start_s);
    }

    #[test]
    fn ordering_and_ids_are_preserved() {
        let segments = vec![seg(3, 0.0, 0.5), seg(7, 2.0, 2.5)];
        let out = optimize_timing(&segments, &SubtitleTimingConfig::default());
        assert_eq!(out.iter().map(|s| s.id).collect::<Vec<_>>(), vec![3, 7]);
    }
}
