//! Fixed-interval time segmentation for captioned media.
//!
//! Interval `k` covers `[k*T, (k+1)*T + O)` of media time, so a segment's
//! start depends only on `k` and never on how densely captions fall. The
//! last interval is closed at its end.

use std::time::Duration;

use crate::segmenter::words::count_words;
use crate::types::caption::CaptionEntry;
use crate::types::config::DurationSegmentConfig;
use crate::types::segment::{SegmentDraft, TimeSpan};

/// Segment caption entries into absolute time intervals.
///
/// An entry lands in every interval it overlaps. Intervals holding no text
/// are skipped, but each emitted segment keeps its interval index, so the
/// nominal start is always `index * target_duration`.
pub fn segment_by_duration(
    entries: &[CaptionEntry],
    config: &DurationSegmentConfig,
) -> Vec<SegmentDraft> {
    let mut order: Vec<usize> = (0..entries.len())
        .filter(|&i| !entries[i].is_blank())
        .collect();
    if order.is_empty() {
        return Vec::new();
    }
    order.sort_by_key(|&i| (entries[i].start, entries[i].end));

    let target = config.target_duration.as_millis().max(1);
    let overlap = config.overlap_duration.as_millis();
    let min_final = config.min_final_duration.as_millis();

    let media_end = order
        .iter()
        .map(|&i| entries[i].end.max(entries[i].start).as_millis())
        .max()
        .unwrap_or(0);
    let intervals = media_end.div_ceil(target).max(1);

    let mut members: Vec<Vec<usize>> = (0..intervals)
        .map(|k| {
            let iv_start = k * target;
            let iv_end = (k + 1) * target + overlap;
            // The last interval also owns an instant entry sitting on media end.
            let last = k + 1 == intervals;
            order
                .iter()
                .copied()
                .filter(|&i| {
                    let start = entries[i].start.as_millis();
                    let end = entries[i].end.as_millis();
                    let opens_in_time = start < iv_end || (last && start <= iv_end);
                    opens_in_time && (end > iv_start || start >= iv_start)
                })
                .collect()
        })
        .collect();

    let mut ends: Vec<u128> = (0..intervals)
        .map(|k| ((k + 1) * target + overlap).min(media_end))
        .collect();

    // Fold a short final interval into the one before it.
    let final_span = media_end - (intervals - 1) * target;
    if intervals >= 2 && final_span < min_final {
        if let Some(tail) = members.pop() {
            ends.pop();
            if let (Some(prev), Some(prev_end)) = (members.last_mut(), ends.last_mut()) {
                for i in tail {
                    if !prev.contains(&i) {
                        prev.push(i);
                    }
                }
                *prev_end = media_end;
            }
        }
    }

    let mut segments = Vec::new();
    let mut previous: &[usize] = &[];

    for (k, indices) in members.iter().enumerate() {
        if indices.is_empty() {
            continue;
        }

        let text = indices
            .iter()
            .flat_map(|&i| entries[i].text.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ");
        let overlap_words = indices
            .iter()
            .filter(|i| previous.contains(i))
            .map(|&i| count_words(&entries[i].text))
            .sum();

        segments.push(SegmentDraft {
            word_count: count_words(&text),
            text,
            unit_count: indices.len(),
            overlap_words,
            inner_overlap: None,
            time_span: Some(TimeSpan {
                index: k,
                start: millis(k as u128 * target),
                end: millis(ends[k]),
            }),
        });
        previous = indices;
    }

    segments
}

fn millis(ms: u128) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX))
}
