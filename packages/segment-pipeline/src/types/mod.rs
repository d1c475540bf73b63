//! Domain types for segmentation and enrichment.

pub mod caption;
pub mod config;
pub mod prompts;
pub mod segment;

pub use caption::CaptionEntry;
pub use config::{
    DurationSegmentConfig, EnrichmentConfig, PipelineConfig, SegmentationStrategy,
    WordSegmentConfig,
};
pub use prompts::{ContentKind, FieldPrompt, PromptSet};
pub use segment::{
    FieldName, FieldUpdate, NewSegment, OverlapWindow, Segment, SegmentBody, SegmentDraft,
    SegmentFields, TextRef, TimeSpan,
};
