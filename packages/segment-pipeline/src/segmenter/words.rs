//! Word-count bounded segmentation.
//!
//! Text is cut into fixed-size word groups (pseudo-sentences), which are
//! accumulated greedily into segments. Each new segment is seeded with a
//! short suffix of the previous one, and a tiny trailing segment is folded
//! into its predecessor.

use crate::types::config::WordSegmentConfig;
use crate::types::segment::{OverlapWindow, SegmentDraft};

/// Split text into pseudo-sentences of at most `unit_words` words.
pub fn split_units(text: &str, unit_words: usize) -> Vec<Vec<&str>> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(unit_words.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Number of whitespace-separated words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Number of pseudo-sentences `text` splits into.
pub fn count_units(text: &str, unit_words: usize) -> usize {
    count_words(text).div_ceil(unit_words.max(1))
}

/// Segment text under word-count bounds.
///
/// Empty or whitespace-only text yields no segments. A pseudo-sentence
/// larger than `max_words` becomes its own segment; words are never split.
pub fn segment_words(text: &str, config: &WordSegmentConfig) -> Vec<SegmentDraft> {
    let units = split_units(text, config.unit_words);
    if units.is_empty() {
        return Vec::new();
    }

    let mut segments: Vec<SegmentDraft> = Vec::new();
    let mut current: Vec<&[&str]> = Vec::new();
    let mut count = 0usize;
    let mut carried_units = 0usize;
    let mut carried_words = 0usize;

    for unit in &units {
        let has_fresh = current.len() > carried_units;
        let would_overflow = count + unit.len() > config.max_words;
        let reached_target = count >= config.target_words;

        if has_fresh && (would_overflow || reached_target) {
            segments.push(build_draft(&current, count, carried_words));

            // Carried words plus the next unit must still fit under max_words.
            let budget = config
                .overlap_words
                .min(config.max_words.saturating_sub(unit.len()));
            let (keep, words) = overlap_suffix(&current, budget);

            current = current.split_off(current.len() - keep);
            count = words;
            carried_units = keep;
            carried_words = words;
        }

        current.push(unit.as_slice());
        count += unit.len();
    }

    let last = build_draft(&current, count, carried_words);
    match segments.last_mut() {
        Some(prev) if last.word_count < config.min_final_words => {
            if last.overlap_words > 0 {
                prev.inner_overlap = Some(OverlapWindow {
                    start: prev.word_count,
                    len: last.overlap_words,
                });
            }
            prev.text.push(' ');
            prev.text.push_str(&last.text);
            prev.word_count += last.word_count;
            prev.unit_count += last.unit_count;
        }
        _ => segments.push(last),
    }

    segments
}

/// Longest suffix of whole units totalling at most `budget` words.
///
/// Returns `(units, words)`.
fn overlap_suffix(units: &[&[&str]], budget: usize) -> (usize, usize) {
    let mut taken_units = 0;
    let mut taken_words = 0;

    for unit in units.iter().rev() {
        if taken_words + unit.len() > budget {
            break;
        }
        taken_words += unit.len();
        taken_units += 1;
    }

    (taken_units, taken_words)
}

fn build_draft(units: &[&[&str]], word_count: usize, overlap_words: usize) -> SegmentDraft {
    let text = units
        .iter()
        .flat_map(|unit| unit.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");

    SegmentDraft {
        text,
        word_count,
        unit_count: units.len(),
        overlap_words,
        inner_overlap: None,
        time_span: None,
    }
}
