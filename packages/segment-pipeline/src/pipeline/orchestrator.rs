//! Pipeline orchestration: segment, enrich, persist.
//!
//! Stages are separate entry points so a failed enrichment never forces the
//! document to be segmented again:
//!
//! - [`Pipeline::segment_only`] replaces a document's segments
//! - [`Pipeline::enrich_only`] fills AI fields with field-only writes
//! - [`Pipeline::full`] runs both, stopping if segmentation yields nothing

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::enrichment::coordinator::EnrichmentCoordinator;
use crate::error::{PipelineError, Result, StoreError};
use crate::pipeline::report::{
    EnrichReport, FieldFailureRecord, Progress, RunReport, SegmentReport,
};
use crate::pipeline::state::{RunEvent, RunState, RunTracker};
use crate::reindex::{self, ReorderPlan};
use crate::segmenter::{count_units, count_words, segment_source, SourceDocument};
use crate::traits::generator::TextGenerator;
use crate::traits::store::{SegmentStore, TextStore};
use crate::types::config::PipelineConfig;
use crate::types::prompts::PromptSet;
use crate::types::segment::{FieldUpdate, NewSegment, Segment, SegmentBody};

/// Which segments an enrich-only run touches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichFilter {
    /// Every segment, regenerating existing fields
    #[default]
    All,
    /// Segments missing at least one required field
    Unprocessed,
    /// Only the listed positions
    Positions(Vec<i64>),
}

/// Segmentation and enrichment for documents held in a [`SegmentStore`].
///
/// # Example
///
/// ```rust,ignore
/// use segment_pipeline::{Pipeline, PipelineConfig, SourceDocument, MemoryStore};
/// use segment_pipeline::testing::MockGenerator;
///
/// let pipeline = Pipeline::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(MockGenerator::new()),
///     PipelineConfig::default(),
/// )?;
///
/// let report = pipeline.full("video-42", &SourceDocument::Text(transcript)).await?;
/// println!("{}", report.summary());
/// ```
pub struct Pipeline<S: ?Sized, G: ?Sized> {
    store: Arc<S>,
    texts: Option<Arc<dyn TextStore>>,
    coordinator: EnrichmentCoordinator<G>,
    config: PipelineConfig,
    prompts: PromptSet,
    runs: RunTracker,
}

impl<S, G> Pipeline<S, G>
where
    S: SegmentStore + ?Sized,
    G: TextGenerator + ?Sized + 'static,
{
    /// Create a pipeline. The prompt set follows `config.content_kind`.
    pub fn new(store: Arc<S>, generator: Arc<G>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            texts: None,
            coordinator: EnrichmentCoordinator::new(generator, config.enrichment.clone()),
            prompts: PromptSet::for_kind(config.content_kind),
            config,
            runs: RunTracker::new(),
        })
    }

    /// Keep segment text in a separate text store.
    pub fn with_text_store(mut self, texts: Arc<dyn TextStore>) -> Self {
        self.texts = Some(texts);
        self
    }

    /// Replace the prompt set.
    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run state for a document.
    pub fn state(&self, doc_id: &str) -> RunState {
        self.runs.state(doc_id)
    }

    // =========================================================================
    // Stages
    // =========================================================================

    /// Segment a document and persist the segments with every field unset.
    ///
    /// Existing segments are replaced, never merged. Empty source content
    /// fails with `SegmentationEmpty` before anything is deleted.
    pub async fn segment_only(&self, doc_id: &str, source: &SourceDocument) -> Result<SegmentReport> {
        let run = self.begin(doc_id, RunEvent::StartSegmenting)?;

        let drafts = segment_source(source, &self.config);
        if drafts.is_empty() {
            warn!(doc_id = %doc_id, "segmentation produced no segments");
            return Err(PipelineError::SegmentationEmpty {
                doc_id: doc_id.to_string(),
            });
        }

        let replaced = self
            .store
            .delete_by_doc(doc_id)
            .await
            .map_err(|e| PipelineError::write("delete_by_doc", e))?;
        if let Some(texts) = &self.texts {
            texts
                .delete_for_doc(doc_id)
                .await
                .map_err(|e| PipelineError::write("delete_text", e))?;
        }

        let mut rows = Vec::with_capacity(drafts.len());
        for (ordinal, draft) in drafts.iter().enumerate() {
            let body = match &self.texts {
                Some(texts) => SegmentBody::Stored(
                    texts
                        .put(doc_id, ordinal + 1, &draft.text)
                        .await
                        .map_err(|e| PipelineError::write("put_text", e))?,
                ),
                None => SegmentBody::Inline(draft.text.clone()),
            };

            rows.push(NewSegment {
                position: ordinal as i64 + 1,
                body,
                word_count: draft.word_count,
                unit_count: draft.unit_count,
                time_span: draft.time_span,
            });
        }

        self.store
            .bulk_insert(doc_id, &rows)
            .await
            .map_err(|e| PipelineError::write("bulk_insert", e))?;

        let report = SegmentReport {
            doc_id: doc_id.to_string(),
            segments: rows.len(),
            words: drafts.iter().map(|d| d.word_count).sum(),
            replaced,
        };
        info!(
            doc_id = %doc_id,
            segments = report.segments,
            words = report.words,
            replaced,
            "document segmented"
        );

        run.succeed();
        Ok(report)
    }

    /// Generate AI fields for a document's existing segments.
    ///
    /// Each segment gets one field-only write holding just the fields that
    /// were generated; failed fields stay unset and are listed in the report.
    /// A store write failure ends the stage, and earlier writes stay written.
    pub async fn enrich_only(&self, doc_id: &str, filter: EnrichFilter) -> Result<EnrichReport> {
        let run = self.begin(doc_id, RunEvent::StartEnriching)?;
        let report = self.enrich_selected(doc_id, &filter).await?;
        run.succeed();
        Ok(report)
    }

    /// Enrichment body. The caller holds the document.
    async fn enrich_selected(&self, doc_id: &str, filter: &EnrichFilter) -> Result<EnrichReport> {
        let segments = self
            .store
            .list_by_doc(doc_id)
            .await
            .map_err(PipelineError::StoreRead)?;
        let available = segments.len();

        let required = self.prompts.required_fields();
        let selected: Vec<Segment> = segments
            .into_iter()
            .filter(|segment| match filter {
                EnrichFilter::All => true,
                EnrichFilter::Unprocessed => !segment.is_processed(&required),
                EnrichFilter::Positions(positions) => positions.contains(&segment.position),
            })
            .collect();

        let mut report = EnrichReport::new(doc_id);
        report.total = selected.len();
        report.skipped = available - selected.len();

        if selected.is_empty() {
            info!(doc_id = %doc_id, skipped = report.skipped, "nothing to enrich");
            return Ok(report);
        }

        let mut texts = Vec::with_capacity(selected.len());
        for segment in &selected {
            texts.push(self.segment_text(doc_id, segment).await?);
        }

        let results = self.coordinator.enrich(texts, &self.prompts).await;

        for (segment, result) in selected.iter().zip(results) {
            let update = result.to_update();
            if !update.is_empty() {
                self.store
                    .update_fields(doc_id, segment.position, &update)
                    .await
                    .map_err(|e| PipelineError::write("update_fields", e))?;
            }

            report.fields_generated += update.len();
            report.fields_failed += result.failed_count();
            if result.failures.is_empty() {
                report.segments_enriched += 1;
            } else {
                warn!(
                    doc_id = %doc_id,
                    position = segment.position,
                    failed = result.failed_count(),
                    "segment partially enriched"
                );
            }

            report
                .failures
                .extend(result.failures.into_iter().map(|(field, failure)| {
                    FieldFailureRecord {
                        position: segment.position,
                        field,
                        failure,
                    }
                }));
        }

        info!(
            doc_id = %doc_id,
            total = report.total,
            enriched = report.segments_enriched,
            fields_generated = report.fields_generated,
            fields_failed = report.fields_failed,
            "document enriched"
        );

        Ok(report)
    }

    /// Segment then enrich every segment.
    pub async fn full(&self, doc_id: &str, source: &SourceDocument) -> Result<RunReport> {
        let segmentation = self.segment_only(doc_id, source).await?;
        let enrichment = self.enrich_only(doc_id, EnrichFilter::All).await?;

        Ok(RunReport {
            segmentation,
            enrichment,
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Segments of a document in position order.
    pub async fn segments(&self, doc_id: &str) -> Result<Vec<Segment>> {
        self.store
            .list_by_doc(doc_id)
            .await
            .map_err(PipelineError::StoreRead)
    }

    /// How many segments have every required field.
    pub async fn progress(&self, doc_id: &str) -> Result<Progress> {
        let segments = self.segments(doc_id).await?;
        let required = self.prompts.required_fields();
        let processed = segments.iter().filter(|s| s.is_processed(&required)).count();

        Ok(Progress::new(segments.len(), processed))
    }

    /// Resolve a segment's text, reading the text store when it was offloaded.
    pub async fn segment_text(&self, doc_id: &str, segment: &Segment) -> Result<String> {
        let unavailable = || PipelineError::TextUnavailable {
            doc_id: doc_id.to_string(),
            position: segment.position,
        };

        match &segment.body {
            SegmentBody::Inline(text) => Ok(text.clone()),
            SegmentBody::Stored(text_ref) => {
                let texts = self.texts.as_ref().ok_or_else(unavailable)?;
                texts
                    .get(text_ref)
                    .await
                    .map_err(PipelineError::StoreRead)?
                    .ok_or_else(unavailable)
            }
        }
    }

    // =========================================================================
    // Maintenance
    //
    // Each operation holds the document for its whole duration, so no stage
    // can read positions mid-shuffle or write fields to a moved segment.
    // =========================================================================

    /// Replace one segment's text.
    ///
    /// Word and unit counts are recomputed. Existing fields are kept unless
    /// `reenrich` is set, in which case they are cleared and regenerated for
    /// this segment only. The document's run state is left as it was.
    pub async fn update_segment_text(
        &self,
        doc_id: &str,
        position: i64,
        text: &str,
        reenrich: bool,
    ) -> Result<Option<EnrichReport>> {
        let _hold = self.begin(doc_id, RunEvent::StartMaintenance)?;
        let segment = self.require_segment(doc_id, position).await?;

        let body = match (&segment.body, &self.texts) {
            (SegmentBody::Stored(old_ref), Some(texts)) => {
                let new_ref = texts
                    .put(doc_id, position.max(1) as usize, text)
                    .await
                    .map_err(|e| PipelineError::write("put_text", e))?;
                if let Err(e) = texts.delete(old_ref).await {
                    warn!(doc_id = %doc_id, text_ref = %old_ref, error = %e, "failed to delete replaced text");
                }
                SegmentBody::Stored(new_ref)
            }
            _ => SegmentBody::Inline(text.to_string()),
        };

        let word_count = count_words(text);
        let unit_count = count_units(text, self.config.words.unit_words);
        self.store
            .update_text(doc_id, position, &body, word_count, unit_count)
            .await
            .map_err(|e| self.not_found_or_write(doc_id, position, "update_text", e))?;
        debug!(doc_id = %doc_id, position, word_count, "segment text updated");

        if !reenrich {
            return Ok(None);
        }

        self.store
            .update_fields(doc_id, position, &FieldUpdate::clear_all())
            .await
            .map_err(|e| PipelineError::write("update_fields", e))?;

        let report = self
            .enrich_selected(doc_id, &EnrichFilter::Positions(vec![position]))
            .await?;
        Ok(Some(report))
    }

    /// Set or clear the user note on a segment.
    pub async fn update_note(&self, doc_id: &str, position: i64, note: Option<&str>) -> Result<()> {
        let _hold = self.begin(doc_id, RunEvent::StartMaintenance)?;
        self.store
            .update_note(doc_id, position, note)
            .await
            .map_err(|e| self.not_found_or_write(doc_id, position, "update_note", e))
    }

    /// Delete one segment and shift later segments down to close the gap.
    pub async fn delete_segment(&self, doc_id: &str, position: i64) -> Result<()> {
        let _hold = self.begin(doc_id, RunEvent::StartMaintenance)?;
        let segment = self.require_segment(doc_id, position).await?;

        let removed = self
            .store
            .delete_segment(doc_id, position)
            .await
            .map_err(|e| PipelineError::write("delete_segment", e))?;
        if !removed {
            return Err(PipelineError::SegmentNotFound {
                doc_id: doc_id.to_string(),
                position,
            });
        }

        if let (Some(text_ref), Some(texts)) = (segment.body.text_ref(), &self.texts) {
            if let Err(e) = texts.delete(text_ref).await {
                warn!(doc_id = %doc_id, text_ref = %text_ref, error = %e, "failed to delete segment text");
            }
        }

        let moved = reindex::compact(self.store.as_ref(), doc_id).await?;
        info!(doc_id = %doc_id, position, moved, "segment deleted");
        Ok(())
    }

    /// Delete every segment of a document and its stored text.
    pub async fn delete_document(&self, doc_id: &str) -> Result<usize> {
        let hold = self.begin(doc_id, RunEvent::StartMaintenance)?;

        let removed = self
            .store
            .delete_by_doc(doc_id)
            .await
            .map_err(|e| PipelineError::write("delete_by_doc", e))?;
        if let Some(texts) = &self.texts {
            texts
                .delete_for_doc(doc_id)
                .await
                .map_err(|e| PipelineError::write("delete_text", e))?;
        }

        drop(hold);
        self.runs.clear(doc_id);
        info!(doc_id = %doc_id, removed, "document deleted");
        Ok(removed)
    }

    /// Reorder segments. `order` lists current positions in the new order.
    pub async fn reorder(&self, doc_id: &str, order: &[i64]) -> Result<ReorderPlan> {
        let _hold = self.begin(doc_id, RunEvent::StartMaintenance)?;
        reindex::reorder(self.store.as_ref(), doc_id, order).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn begin(&self, doc_id: &str, event: RunEvent) -> Result<RunGuard<'_>> {
        self.runs
            .begin(doc_id, event)
            .map_err(|state| PipelineError::RunInProgress {
                doc_id: doc_id.to_string(),
                state,
            })?;

        Ok(RunGuard {
            tracker: &self.runs,
            doc_id: doc_id.to_string(),
            succeeded: false,
        })
    }

    async fn require_segment(&self, doc_id: &str, position: i64) -> Result<Segment> {
        self.store
            .get_segment(doc_id, position)
            .await
            .map_err(PipelineError::StoreRead)?
            .ok_or_else(|| PipelineError::SegmentNotFound {
                doc_id: doc_id.to_string(),
                position,
            })
    }

    fn not_found_or_write(
        &self,
        doc_id: &str,
        position: i64,
        operation: &'static str,
        error: StoreError,
    ) -> PipelineError {
        match error {
            StoreError::NotFound { .. } => PipelineError::SegmentNotFound {
                doc_id: doc_id.to_string(),
                position,
            },
            other => PipelineError::write(operation, other),
        }
    }
}

/// Releases the document when dropped.
///
/// A stage is marked failed unless it reports success first; maintenance
/// restores the prior state. Covers early returns and callers that stop
/// awaiting mid-operation.
struct RunGuard<'a> {
    tracker: &'a RunTracker,
    doc_id: String,
    succeeded: bool,
}

impl RunGuard<'_> {
    fn succeed(mut self) {
        self.succeeded = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let state = self.tracker.finish(&self.doc_id, self.succeeded);
        debug!(doc_id = %self.doc_id, state = %state, "run finished");
    }
}
