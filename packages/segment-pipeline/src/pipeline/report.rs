//! Stage reports.
//!
//! Partial enrichment is a normal outcome: failed fields are counted and
//! listed here instead of being raised as errors.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::enrichment::client::FieldFailure;
use crate::types::segment::FieldName;

/// Result of a segment-only run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub doc_id: String,

    /// Segments persisted
    pub segments: usize,

    /// Total words across segments (overlap counted in each segment)
    pub words: usize,

    /// Segments removed before the new ones were written
    pub replaced: usize,
}

/// One field that was not produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFailureRecord {
    pub position: i64,
    pub field: FieldName,
    pub failure: FieldFailure,
}

/// Result of an enrich-only run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichReport {
    pub doc_id: String,

    /// Segments sent for enrichment
    pub total: usize,

    /// Segments left out by the filter
    pub skipped: usize,

    /// Segments whose every requested field was generated
    pub segments_enriched: usize,

    pub fields_generated: usize,
    pub fields_failed: usize,

    /// Per-field failures, in position order
    pub failures: Vec<FieldFailureRecord>,
}

impl EnrichReport {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            ..Default::default()
        }
    }

    /// Every selected segment got every field.
    pub fn is_success(&self) -> bool {
        self.fields_failed == 0
    }

    /// Fold in an `Unprocessed` retry of this run.
    ///
    /// The retry regenerates every field of the segments that had failures,
    /// so their first-attempt fields are replaced, not added.
    pub fn merge_retry(&mut self, retry: EnrichReport) {
        let per_segment = if self.total == 0 {
            0
        } else {
            (self.fields_generated + self.fields_failed) / self.total
        };
        let retried: BTreeSet<i64> = self.failures.iter().map(|f| f.position).collect();
        let superseded = (retried.len() * per_segment).saturating_sub(self.fields_failed);

        self.fields_generated =
            self.fields_generated.saturating_sub(superseded) + retry.fields_generated;
        self.segments_enriched += retry.segments_enriched;
        self.fields_failed = retry.fields_failed;
        self.failures = retry.failures;
    }
}

/// Result of a full run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub segmentation: SegmentReport,
    pub enrichment: EnrichReport,
}

impl RunReport {
    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "{} segments created, {}/{} enriched ({} fields failed)",
            self.segmentation.segments,
            self.enrichment.segments_enriched,
            self.enrichment.total,
            self.enrichment.fields_failed
        )
    }
}

/// How far enrichment has got for a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub processed: usize,
    pub unprocessed: usize,

    /// Processed share, 0.0 to 100.0
    pub percent: f64,
}

impl Progress {
    pub fn new(total: usize, processed: usize) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            processed as f64 * 100.0 / total as f64
        };
        Self {
            total,
            processed,
            unprocessed: total.saturating_sub(processed),
            percent,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.unprocessed == 0
    }
}
