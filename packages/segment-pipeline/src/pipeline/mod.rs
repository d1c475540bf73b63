//! Pipeline orchestration - the entry points applications call.
//!
//! The pipeline sequences:
//! - Segmentation (word or duration bounds)
//! - Placeholder persistence (one bulk insert)
//! - Parallel enrichment
//! - Field-only persistence (one small write per segment)

pub mod orchestrator;
pub mod report;
pub mod state;

pub use orchestrator::{EnrichFilter, Pipeline};
pub use report::{EnrichReport, FieldFailureRecord, Progress, RunReport, SegmentReport};
pub use state::{RunEvent, RunState, RunTracker};
