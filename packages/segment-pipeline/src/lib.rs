//! Segmentation and Enrichment Pipeline
//!
//! Splits long-form documents (video transcripts, book chapters) into
//! bounded, overlapping segments, fills each segment's descriptive fields
//! through a rate-limited text generator, and keeps segment order
//! consistent under reordering and deletion.
//!
//! # Design Philosophy
//!
//! - Segmentation is pure: same input and config, same segments
//! - Field failures are data, not errors; sibling fields keep going
//! - Every persisted snapshot keeps positions unique
//! - Storage and generation sit behind traits; the app picks backends
//!
//! # Usage
//!
//! ```rust,ignore
//! use segment_pipeline::{Pipeline, PipelineConfig, SourceDocument, MemoryStore};
//! use segment_pipeline::testing::MockGenerator;
//!
//! let store = Arc::new(MemoryStore::new());
//! let generator = Arc::new(MockGenerator::new());
//! let pipeline = Pipeline::new(store, generator, PipelineConfig::default())?;
//!
//! // Segment and enrich in one call
//! let report = pipeline.full("lecture-7", &SourceDocument::Text(text)).await?;
//! println!("{}", report.summary());
//!
//! // Move the last segment to the front
//! pipeline.reorder("lecture-7", &[4, 1, 2, 3]).await?;
//! ```
//!
//! # Modules
//!
//! - [`segmenter`] - Word-budget and duration segmenters, subtitle cleanup
//! - [`enrichment`] - Retrying field client and bounded worker pool
//! - [`reindex`] - Two-phase collision-free reordering and compaction
//! - [`pipeline`] - Stage orchestration, run state, reports
//! - [`traits`] - Store and generator abstractions
//! - [`types`] - Segments, captions, prompts, configuration
//! - [`stores`] - In-memory store implementations
//! - [`testing`] - Mock generator and fault-injecting store

pub mod enrichment;
pub mod error;
pub mod pipeline;
pub mod reindex;
pub mod segmenter;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use error::{
    ConfigError, GenerateError, PipelineError, ReorderViolation, Result, StoreError, StoreResult,
};
pub use traits::{
    generator::{GenerateRequest, TextGenerator},
    store::{SegmentStore, TextStore},
};
pub use types::{
    caption::CaptionEntry,
    config::{
        DurationSegmentConfig, EnrichmentConfig, PipelineConfig, SegmentationStrategy,
        WordSegmentConfig,
    },
    prompts::{ContentKind, FieldPrompt, PromptSet},
    segment::{
        FieldName, FieldUpdate, NewSegment, OverlapWindow, Segment, SegmentBody, SegmentDraft,
        SegmentFields, TextRef, TimeSpan,
    },
};

// Re-export pipeline components
pub use pipeline::{
    EnrichFilter, EnrichReport, FieldFailureRecord, Pipeline, Progress, RunReport, RunState,
    SegmentReport,
};

// Re-export segmenters
pub use segmenter::{
    captions_to_text, clean_srt_text, parse_srt, remove_fillers, segment_by_duration,
    segment_source, segment_words, SourceDocument,
};

// Re-export enrichment
pub use enrichment::{
    EnrichmentClient, EnrichmentCoordinator, FieldFailure, FieldOutcome, SegmentEnrichment,
};

// Re-export reindexing
pub use reindex::{plan_compaction, plan_reorder, PositionMove, ReorderPlan};

// Re-export stores
pub use stores::{MemoryStore, MemoryTextStore};

#[cfg(feature = "openai")]
pub use ai::OpenAIGenerator;

// Re-export testing utilities
pub use testing::{FailingStore, MockGenerator};
