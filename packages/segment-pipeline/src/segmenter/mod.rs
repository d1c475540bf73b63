//! Segmenters: pure functions from source content to ordered segment drafts.
//!
//! - [`words`] - word-count bounds with overlap and tail merging
//! - [`duration`] - fixed media-time intervals
//! - [`transcript`] - SRT parsing and transcript cleanup

pub mod duration;
pub mod transcript;
pub mod words;

use serde::{Deserialize, Serialize};

use crate::types::caption::CaptionEntry;
use crate::types::config::{PipelineConfig, SegmentationStrategy};
use crate::types::segment::SegmentDraft;

pub use duration::segment_by_duration;
pub use transcript::{captions_to_text, clean_srt_text, parse_srt, remove_fillers};
pub use words::{count_units, count_words, segment_words, split_units};

/// Content handed to the pipeline for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceDocument {
    /// Plain text (book chapter, cleaned transcript)
    Text(String),
    /// Time-tagged captions
    Captions(Vec<CaptionEntry>),
}

impl SourceDocument {
    /// True when there is nothing to segment.
    pub fn is_empty(&self) -> bool {
        match self {
            SourceDocument::Text(text) => text.trim().is_empty(),
            SourceDocument::Captions(entries) => entries.iter().all(CaptionEntry::is_blank),
        }
    }
}

/// Run the segmenter selected by `config` over a source document.
///
/// Plain text always uses word bounds. Captions use the configured strategy;
/// under word bounds they are flattened to text first.
pub fn segment_source(source: &SourceDocument, config: &PipelineConfig) -> Vec<SegmentDraft> {
    match (source, config.strategy) {
        (SourceDocument::Text(text), _) => segment_words(text, &config.words),
        (SourceDocument::Captions(entries), SegmentationStrategy::Duration) => {
            segment_by_duration(entries, &config.duration)
        }
        (SourceDocument::Captions(entries), SegmentationStrategy::Words) => {
            segment_words(&captions_to_text(entries), &config.words)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captions_follow_strategy() {
        let entries: Vec<CaptionEntry> = (0..120)
            .map(|s| CaptionEntry::from_secs(s as f64, (s + 1) as f64, format!("w{s}")))
            .collect();
        let source = SourceDocument::Captions(entries);

        let by_words = segment_source(&source, &PipelineConfig::default());
        assert_eq!(by_words.len(), 1);
        assert!(by_words[0].time_span.is_none());

        let duration = crate::types::config::DurationSegmentConfig::new()
            .with_target(std::time::Duration::from_secs(60))
            .with_overlap(std::time::Duration::from_secs(5))
            .with_min_final(std::time::Duration::from_secs(10));
        let config = PipelineConfig::default()
            .with_strategy(SegmentationStrategy::Duration)
            .with_duration(duration);

        let by_time = segment_source(&source, &config);
        assert_eq!(by_time.len(), 2);
        assert_eq!(by_time[1].time_span.map(|t| t.index), Some(1));
    }

    #[test]
    fn test_blank_source_is_empty() {
        assert!(SourceDocument::Text(" \n ".into()).is_empty());
        assert!(SourceDocument::Captions(vec![]).is_empty());
        assert!(!SourceDocument::Text("words".into()).is_empty());
    }
}
