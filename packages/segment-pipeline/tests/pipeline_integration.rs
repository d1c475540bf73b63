//! End-to-end pipeline tests against the in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use segment_pipeline::testing::{FailingStore, MockGenerator, WriteKind};
use segment_pipeline::{
    EnrichFilter, EnrichmentConfig, FieldFailure, FieldName, MemoryStore, MemoryTextStore,
    Pipeline, PipelineConfig, PipelineError, ReorderViolation, RunState, SegmentBody,
    SegmentStore, SourceDocument, TextStore, WordSegmentConfig,
};

const DOC: &str = "doc-1";

fn numbered_words(n: usize) -> String {
    (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
}

/// One word per unit, two words per segment, no overlap.
fn pair_config() -> PipelineConfig {
    PipelineConfig::default().with_words(
        WordSegmentConfig::new()
            .with_bounds(2, 2)
            .with_overlap(0)
            .with_min_final(1)
            .with_unit_words(1),
    )
}

/// Four segments: "a1 a2", "b1 b2", "c1 c2", "d1 d2".
fn four_pairs() -> SourceDocument {
    SourceDocument::Text("a1 a2 b1 b2 c1 c2 d1 d2".to_string())
}

fn memory_pipeline(generator: &MockGenerator) -> (Arc<MemoryStore>, Pipeline<MemoryStore, MockGenerator>) {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(store.clone(), Arc::new(generator.clone()), pair_config())
        .expect("valid config");
    (store, pipeline)
}

async fn texts_in_order<S: SegmentStore + ?Sized>(pipeline: &Pipeline<S, MockGenerator>) -> Vec<String> {
    let mut texts = Vec::new();
    for segment in pipeline.segments(DOC).await.expect("list") {
        texts.push(pipeline.segment_text(DOC, &segment).await.expect("text"));
    }
    texts
}

// =============================================================================
// Segment + enrich
// =============================================================================

#[tokio::test]
async fn test_full_run_segments_and_enriches() {
    let generator = MockGenerator::new().echo_segment();
    let store = Arc::new(MemoryStore::new());
    let config = PipelineConfig::default().with_words(
        WordSegmentConfig::new()
            .with_bounds(1000, 1500)
            .with_overlap(100)
            .with_min_final(500),
    );
    let pipeline = Pipeline::new(store.clone(), Arc::new(generator.clone()), config).unwrap();

    let report = pipeline
        .full(DOC, &SourceDocument::Text(numbered_words(2050)))
        .await
        .unwrap();

    assert_eq!(report.segmentation.segments, 2);
    assert_eq!(report.enrichment.total, 2);
    assert_eq!(report.enrichment.segments_enriched, 2);
    assert_eq!(report.enrichment.fields_generated, 8);
    assert!(report.enrichment.is_success());
    assert_eq!(generator.call_count(), 8);
    assert_eq!(pipeline.state(DOC), RunState::Complete);

    let segments = store.list_by_doc(DOC).await.unwrap();
    assert_eq!(segments.iter().map(|s| s.position).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(segments[0].word_count, 1000);
    assert_eq!(segments[1].word_count, 1210);

    let second = segments[1].body.inline_text().unwrap();
    assert!(second.starts_with("w920 "));
    assert!(second.ends_with(" w2049"));
    for segment in &segments {
        let text = segment.body.inline_text().unwrap();
        for field in FieldName::ALL {
            assert_eq!(segment.fields.get(field), Some(text));
        }
    }
}

#[tokio::test]
async fn test_empty_source_persists_nothing() {
    let generator = MockGenerator::new();
    let (store, pipeline) = memory_pipeline(&generator);

    let err = pipeline
        .segment_only(DOC, &SourceDocument::Text("  \n ".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::SegmentationEmpty { .. }));
    assert!(store.write_log().is_empty());
    assert_eq!(pipeline.state(DOC), RunState::Failed);
}

#[tokio::test]
async fn test_empty_source_keeps_existing_segments() {
    let generator = MockGenerator::new();
    let (store, pipeline) = memory_pipeline(&generator);
    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();

    let result = pipeline
        .segment_only(DOC, &SourceDocument::Captions(Vec::new()))
        .await;

    assert!(matches!(result, Err(PipelineError::SegmentationEmpty { .. })));
    assert_eq!(store.count(DOC).await.unwrap(), 4);
}

#[tokio::test]
async fn test_resegmenting_replaces_segments() {
    let generator = MockGenerator::new();
    let (store, pipeline) = memory_pipeline(&generator);
    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();

    let report = pipeline
        .segment_only(DOC, &SourceDocument::Text("x1 x2 y1 y2".into()))
        .await
        .unwrap();

    assert_eq!(report.replaced, 4);
    assert_eq!(report.segments, 2);
    assert_eq!(texts_in_order(&pipeline).await, vec!["x1 x2", "y1 y2"]);
    assert!(store.write_log().iter().all(|e| !e.has_duplicate_positions()));
}

#[tokio::test]
async fn test_failed_fields_stay_unset_and_note_survives() {
    let generator =
        MockGenerator::new().fail_when_prompt_contains("concise title", "content policy");
    let (store, pipeline) = memory_pipeline(&generator);

    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();
    pipeline.update_note(DOC, 2, Some("check the audio")).await.unwrap();

    let report = pipeline.enrich_only(DOC, EnrichFilter::All).await.unwrap();

    assert_eq!(report.total, 4);
    assert_eq!(report.fields_generated, 12);
    assert_eq!(report.fields_failed, 4);
    assert_eq!(report.segments_enriched, 0);
    assert!(!report.is_success());
    assert!(report.failures.iter().all(|f| f.field == FieldName::Title
        && matches!(f.failure, FieldFailure::Rejected { .. })));
    assert_eq!(
        report.failures.iter().map(|f| f.position).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );

    let segments = store.list_by_doc(DOC).await.unwrap();
    assert!(segments.iter().all(|s| s.fields.title.is_none()));
    assert!(segments.iter().all(|s| s.fields.field_1.is_some()));
    assert_eq!(segments[1].user_note.as_deref(), Some("check the audio"));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_rate_limits_write_nothing() {
    let generator = MockGenerator::new().rate_limit_first(1000);
    let store = Arc::new(MemoryStore::new());
    let config = pair_config().with_enrichment(
        EnrichmentConfig::new().with_retries(1, Duration::from_millis(10)),
    );
    let pipeline = Pipeline::new(store.clone(), Arc::new(generator.clone()), config).unwrap();

    pipeline
        .segment_only(DOC, &SourceDocument::Text("a1 a2".into()))
        .await
        .unwrap();
    let report = pipeline.enrich_only(DOC, EnrichFilter::All).await.unwrap();

    assert_eq!(report.fields_generated, 0);
    assert_eq!(report.fields_failed, 4);
    assert!(report
        .failures
        .iter()
        .all(|f| f.failure == FieldFailure::RateLimitExhausted { attempts: 2 }));
    assert_eq!(generator.call_count(), 8);
    assert!(store
        .write_log()
        .iter()
        .all(|e| e.operation != "update_fields"));
}

#[tokio::test]
async fn test_unprocessed_filter_resumes_only_gaps() {
    let flaky = MockGenerator::new().fail_when_prompt_contains("b1 b2", "upstream error");
    let (store, pipeline) = memory_pipeline(&flaky);

    pipeline.full(DOC, &four_pairs()).await.unwrap();

    let progress = pipeline.progress(DOC).await.unwrap();
    assert_eq!(progress.total, 4);
    assert_eq!(progress.processed, 3);
    assert!(!progress.is_complete());

    let healthy = MockGenerator::new();
    let resumed = Pipeline::new(store.clone(), Arc::new(healthy.clone()), pair_config()).unwrap();
    let report = resumed.enrich_only(DOC, EnrichFilter::Unprocessed).await.unwrap();

    assert_eq!(report.total, 1);
    assert_eq!(report.skipped, 3);
    assert_eq!(healthy.call_count(), 4);
    assert!(healthy.calls().iter().all(|c| c.prompt.contains("b1 b2")));
    assert!(resumed.progress(DOC).await.unwrap().is_complete());
}

#[tokio::test]
async fn test_retry_report_counts_each_field_once() {
    let flaky = MockGenerator::new()
        .fail_when_prompt_contains("b1 b2\n\nGenerate only the title", "upstream error");
    let (store, pipeline) = memory_pipeline(&flaky);

    let mut report = pipeline.full(DOC, &four_pairs()).await.unwrap().enrichment;
    assert_eq!(report.fields_generated, 15);
    assert_eq!(report.fields_failed, 1);

    let healthy = MockGenerator::new();
    let resumed = Pipeline::new(store.clone(), Arc::new(healthy), pair_config()).unwrap();
    let retry = resumed.enrich_only(DOC, EnrichFilter::Unprocessed).await.unwrap();
    assert_eq!(retry.fields_generated, 4);
    report.merge_retry(retry);

    // Segment 2's three first-attempt fields were regenerated, not added.
    assert_eq!(report.fields_generated, 16);
    assert_eq!(report.fields_failed, 0);
    assert_eq!(report.segments_enriched, 4);
    assert!(report.is_success());

    let stored: usize = store
        .list_by_doc(DOC)
        .await
        .unwrap()
        .iter()
        .map(|s| FieldName::ALL.iter().filter(|f| s.fields.is_set(**f)).count())
        .sum();
    assert_eq!(stored, report.fields_generated);
}

#[tokio::test]
async fn test_positions_filter_targets_listed_segments() {
    let generator = MockGenerator::new();
    let (_store, pipeline) = memory_pipeline(&generator);
    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();

    let report = pipeline
        .enrich_only(DOC, EnrichFilter::Positions(vec![1, 3]))
        .await
        .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(generator.call_count(), 8);
    assert_eq!(pipeline.progress(DOC).await.unwrap().processed, 2);
}

#[tokio::test]
async fn test_store_write_failure_ends_enrichment() {
    let generator = MockGenerator::new();
    let store = Arc::new(FailingStore::new(MemoryStore::new()).fail_nth(WriteKind::UpdateFields, 2));
    let pipeline = Pipeline::new(store.clone(), Arc::new(generator), pair_config()).unwrap();

    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();
    let err = pipeline.enrich_only(DOC, EnrichFilter::All).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::StoreWrite {
            operation: "update_fields",
            ..
        }
    ));
    assert_eq!(pipeline.state(DOC), RunState::Failed);

    // The first segment's write landed and stays.
    let progress = pipeline.progress(DOC).await.unwrap();
    assert_eq!(progress.processed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_stage_is_refused() {
    let generator = MockGenerator::new().with_delay(|_| Duration::from_secs(10));
    let store = Arc::new(MemoryStore::new());
    let pipeline =
        Arc::new(Pipeline::new(store, Arc::new(generator), pair_config()).unwrap());
    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();

    let running = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.enrich_only(DOC, EnrichFilter::All).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(pipeline.state(DOC), RunState::Enriching);
    let err = pipeline.segment_only(DOC, &four_pairs()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::RunInProgress {
            state: RunState::Enriching,
            ..
        }
    ));
    assert!(matches!(
        pipeline.reorder(DOC, &[4, 3, 2, 1]).await,
        Err(PipelineError::RunInProgress { .. })
    ));

    running.await.unwrap().unwrap();
    assert_eq!(pipeline.state(DOC), RunState::Complete);
}

// =============================================================================
// Reorder and maintenance
// =============================================================================

#[tokio::test]
async fn test_reorder_keeps_positions_unique() {
    let generator = MockGenerator::new();
    let (store, pipeline) = memory_pipeline(&generator);
    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();
    let ids_before: Vec<_> = store.list_by_doc(DOC).await.unwrap().iter().map(|s| s.id).collect();

    let plan = pipeline.reorder(DOC, &[3, 1, 4, 2]).await.unwrap();

    assert_eq!(plan.len(), 8);
    assert_eq!(
        texts_in_order(&pipeline).await,
        vec!["c1 c2", "a1 a2", "d1 d2", "b1 b2"]
    );

    let ids_after: Vec<_> = store.list_by_doc(DOC).await.unwrap().iter().map(|s| s.id).collect();
    assert_eq!(
        ids_after,
        vec![ids_before[2], ids_before[0], ids_before[3], ids_before[1]]
    );

    let log = store.write_log_for(DOC);
    assert_eq!(log.iter().filter(|e| e.operation == "update_position").count(), 8);
    assert!(log.iter().all(|e| !e.has_duplicate_positions()));
}

#[tokio::test]
async fn test_reorder_rejection_issues_no_writes() {
    let generator = MockGenerator::new();
    let (store, pipeline) = memory_pipeline(&generator);
    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();
    let writes_before = store.write_log().len();

    let err = pipeline.reorder(DOC, &[1, 2, 3]).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::ReorderPreconditionViolated(ReorderViolation::LengthMismatch {
            expected: 4,
            actual: 3
        })
    ));

    let err = pipeline.reorder(DOC, &[1, 2, 2, 4]).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::ReorderPreconditionViolated(ReorderViolation::DuplicatePosition(2))
    ));

    assert_eq!(store.write_log().len(), writes_before);
}

#[tokio::test]
async fn test_interrupted_reorder_never_duplicates_positions() {
    let generator = MockGenerator::new();
    let store = Arc::new(FailingStore::new(MemoryStore::new()).fail_nth(WriteKind::UpdatePosition, 6));
    let pipeline = Pipeline::new(store.clone(), Arc::new(generator), pair_config()).unwrap();
    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();

    let err = pipeline.reorder(DOC, &[3, 1, 4, 2]).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::StoreWrite {
            operation: "reorder_final",
            ..
        }
    ));

    let positions: Vec<i64> = store
        .list_by_doc(DOC)
        .await
        .unwrap()
        .iter()
        .map(|s| s.position)
        .collect();
    assert_eq!(positions, vec![-4, -3, -2, 1]);
    assert!(store.inner().write_log().iter().all(|e| !e.has_duplicate_positions()));

    // Positions are no longer 1..=N, so a retry is refused outright.
    let err = pipeline.reorder(DOC, &[3, 1, 4, 2]).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::ReorderPreconditionViolated(ReorderViolation::NonContiguous)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_reorder_holds_document_until_positions_settle() {
    let generator = MockGenerator::new().echo_segment();
    let store = Arc::new(
        FailingStore::new(MemoryStore::new())
            .delay_writes(WriteKind::UpdatePosition, Duration::from_millis(10)),
    );
    let pipeline =
        Arc::new(Pipeline::new(store.clone(), Arc::new(generator), pair_config()).unwrap());
    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();

    let reordering = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.reorder(DOC, &[4, 3, 2, 1]).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    // Mid-reorder some positions are negative; nothing else may start.
    assert_eq!(pipeline.state(DOC), RunState::Maintaining);
    assert!(matches!(
        pipeline.enrich_only(DOC, EnrichFilter::All).await,
        Err(PipelineError::RunInProgress {
            state: RunState::Maintaining,
            ..
        })
    ));
    assert!(matches!(
        pipeline.segment_only(DOC, &four_pairs()).await,
        Err(PipelineError::RunInProgress {
            state: RunState::Maintaining,
            ..
        })
    ));
    assert!(matches!(
        pipeline.delete_segment(DOC, 1).await,
        Err(PipelineError::RunInProgress { .. })
    ));
    assert!(matches!(
        pipeline.reorder(DOC, &[1, 2, 3, 4]).await,
        Err(PipelineError::RunInProgress { .. })
    ));

    reordering.await.unwrap().unwrap();
    assert_eq!(pipeline.state(DOC), RunState::Segmented);

    pipeline.enrich_only(DOC, EnrichFilter::All).await.unwrap();
    let segments = store.list_by_doc(DOC).await.unwrap();
    let texts = texts_in_order(&*pipeline).await;
    assert_eq!(texts, vec!["d1 d2", "c1 c2", "b1 b2", "a1 a2"]);
    for (segment, text) in segments.iter().zip(&texts) {
        assert_eq!(segment.fields.field_1.as_deref(), Some(text.as_str()));
    }
}

#[tokio::test]
async fn test_text_store_follows_segments_through_reorder() {
    let generator = MockGenerator::new().echo_segment();
    let store = Arc::new(MemoryStore::new());
    let texts = Arc::new(MemoryTextStore::new());
    let pipeline = Pipeline::new(store.clone(), Arc::new(generator), pair_config())
        .unwrap()
        .with_text_store(texts.clone());

    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();
    assert_eq!(texts.len(), 4);

    let segments = store.list_by_doc(DOC).await.unwrap();
    assert!(segments
        .iter()
        .all(|s| matches!(s.body, SegmentBody::Stored(_))));

    pipeline.reorder(DOC, &[4, 3, 2, 1]).await.unwrap();
    pipeline.enrich_only(DOC, EnrichFilter::All).await.unwrap();

    assert_eq!(
        texts_in_order(&pipeline).await,
        vec!["d1 d2", "c1 c2", "b1 b2", "a1 a2"]
    );
    let first = &store.list_by_doc(DOC).await.unwrap()[0];
    assert_eq!(first.fields.field_1.as_deref(), Some("d1 d2"));
}

#[tokio::test]
async fn test_missing_stored_text_is_reported() {
    let generator = MockGenerator::new();
    let store = Arc::new(MemoryStore::new());
    let texts = Arc::new(MemoryTextStore::new());
    let pipeline = Pipeline::new(store.clone(), Arc::new(generator), pair_config())
        .unwrap()
        .with_text_store(texts.clone());

    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();
    let segment = store.get_segment(DOC, 3).await.unwrap().unwrap();
    let text_ref = segment.body.text_ref().unwrap().clone();
    assert!(texts.delete(&text_ref).await.unwrap());

    let err = pipeline.enrich_only(DOC, EnrichFilter::All).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::TextUnavailable { position: 3, .. }
    ));
}

#[tokio::test]
async fn test_delete_segment_closes_gap() {
    let generator = MockGenerator::new();
    let store = Arc::new(MemoryStore::new());
    let texts = Arc::new(MemoryTextStore::new());
    let pipeline = Pipeline::new(store.clone(), Arc::new(generator), pair_config())
        .unwrap()
        .with_text_store(texts.clone());
    pipeline.segment_only(DOC, &four_pairs()).await.unwrap();

    pipeline.delete_segment(DOC, 2).await.unwrap();

    let positions: Vec<i64> = store.list_by_doc(DOC).await.unwrap().iter().map(|s| s.position).collect();
    assert_eq!(positions, vec![1, 2, 3]);
    assert_eq!(texts_in_order(&pipeline).await, vec!["a1 a2", "c1 c2", "d1 d2"]);
    assert_eq!(texts.len(), 3);
    assert!(store.write_log().iter().all(|e| !e.has_duplicate_positions()));

    let err = pipeline.delete_segment(DOC, 9).await.unwrap_err();
    assert!(matches!(err, PipelineError::SegmentNotFound { position: 9, .. }));
}

#[tokio::test]
async fn test_update_text_with_and_without_reenrich() {
    let generator = MockGenerator::new().echo_segment();
    let (store, pipeline) = memory_pipeline(&generator);
    pipeline.full(DOC, &four_pairs()).await.unwrap();
    generator.reset();

    let report = pipeline
        .update_segment_text(DOC, 2, "fresh words only", false)
        .await
        .unwrap();
    assert!(report.is_none());
    assert_eq!(generator.call_count(), 0);

    let segment = store.get_segment(DOC, 2).await.unwrap().unwrap();
    assert_eq!(segment.word_count, 3);
    assert_eq!(segment.fields.field_1.as_deref(), Some("b1 b2"));

    let report = pipeline
        .update_segment_text(DOC, 2, "rewritten text", true)
        .await
        .unwrap()
        .expect("reenrich report");
    assert_eq!(report.total, 1);
    assert_eq!(report.fields_generated, 4);
    assert_eq!(generator.call_count(), 4);
    assert_eq!(pipeline.state(DOC), RunState::Complete);

    let segments = store.list_by_doc(DOC).await.unwrap();
    assert_eq!(segments[1].fields.field_1.as_deref(), Some("rewritten text"));
    assert_eq!(segments[0].fields.field_1.as_deref(), Some("a1 a2"));

    let err = pipeline
        .update_segment_text(DOC, 7, "nowhere", false)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::SegmentNotFound { position: 7, .. }));
}

#[tokio::test]
async fn test_delete_document_forgets_everything() {
    let generator = MockGenerator::new();
    let store = Arc::new(MemoryStore::new());
    let texts = Arc::new(MemoryTextStore::new());
    let pipeline = Pipeline::new(store.clone(), Arc::new(generator), pair_config())
        .unwrap()
        .with_text_store(texts.clone());
    pipeline.full(DOC, &four_pairs()).await.unwrap();

    assert_eq!(pipeline.delete_document(DOC).await.unwrap(), 4);
    assert_eq!(store.document_count(), 0);
    assert!(texts.is_empty());
    assert_eq!(pipeline.state(DOC), RunState::NotStarted);
}
