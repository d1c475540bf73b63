//! Bounded fan-out of segment enrichment across a fixed worker pool.
//!
//! ```text
//! enrich(texts)
//!     │
//!     ├─► job queue (bounded, capacity = workers)
//!     │       └─► worker 0..N: generate every field of one segment
//!     │               └─► result channel: (input index, enrichment)
//!     └─► reassemble by input index
//! ```
//!
//! Workers finish out of order; each result carries its input index and
//! lands in its own slot, so callers always see input order.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::enrichment::client::{EnrichmentClient, FieldFailure, FieldOutcome};
use crate::traits::generator::TextGenerator;
use crate::types::config::EnrichmentConfig;
use crate::types::prompts::PromptSet;
use crate::types::segment::{FieldName, FieldUpdate, SegmentFields};

/// Generated fields for one segment plus the fields that could not be produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEnrichment {
    pub fields: SegmentFields,
    pub failures: BTreeMap<FieldName, FieldFailure>,
}

impl SegmentEnrichment {
    /// Every requested field failed because no worker reported back.
    pub fn abandoned(prompts: &PromptSet) -> Self {
        Self {
            fields: SegmentFields::default(),
            failures: prompts
                .iter()
                .map(|p| (p.field, FieldFailure::WorkerLost))
                .collect(),
        }
    }

    pub fn generated_count(&self) -> usize {
        FieldName::ALL
            .iter()
            .filter(|name| self.fields.is_set(**name))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// Field-only write containing just the generated values.
    ///
    /// Failed fields are left out, so they stay unset in the store.
    pub fn to_update(&self) -> FieldUpdate {
        FieldUpdate::from_fields(&self.fields)
    }

    fn record(&mut self, field: FieldName, outcome: FieldOutcome) {
        match outcome {
            FieldOutcome::Generated(value) => self.fields.set(field, Some(value)),
            FieldOutcome::Failed(failure) => {
                self.failures.insert(field, failure);
            }
        }
    }
}

/// Enriches ordered segment lists with a bounded worker pool.
///
/// Holds no state between calls; enriching the same texts twice simply
/// generates fresh values.
pub struct EnrichmentCoordinator<G: ?Sized> {
    client: EnrichmentClient<G>,
}

impl<G: ?Sized> Clone for EnrichmentCoordinator<G> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<G: TextGenerator + ?Sized + 'static> EnrichmentCoordinator<G> {
    /// Create a coordinator around a generator.
    pub fn new(generator: Arc<G>, config: EnrichmentConfig) -> Self {
        Self {
            client: EnrichmentClient::new(generator, config),
        }
    }

    pub fn client(&self) -> &EnrichmentClient<G> {
        &self.client
    }

    /// Enrich every text with every prompt in `prompts`.
    ///
    /// The i-th result always belongs to the i-th input. A failed field never
    /// stops its siblings or other segments.
    pub async fn enrich(&self, texts: Vec<String>, prompts: &PromptSet) -> Vec<SegmentEnrichment> {
        let total = texts.len();
        if total == 0 || prompts.is_empty() {
            return vec![SegmentEnrichment::default(); total];
        }

        let width = self.client.config().workers.max(1).min(total);
        let prompts = Arc::new(prompts.clone());

        let (job_tx, job_rx) = mpsc::channel::<(usize, String)>(width);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(usize, SegmentEnrichment)>();

        info!(
            segments = total,
            fields = prompts.len(),
            workers = width,
            "starting enrichment"
        );

        let mut workers = Vec::with_capacity(width);
        for worker_id in 0..width {
            let jobs = Arc::clone(&job_rx);
            let results = result_tx.clone();
            let client = self.client.clone();
            let prompts = Arc::clone(&prompts);

            workers.push(tokio::spawn(async move {
                loop {
                    let job = jobs.lock().await.recv().await;
                    let Some((index, text)) = job else { break };

                    let enrichment = enrich_segment(&client, &text, &prompts).await;
                    debug!(
                        worker_id,
                        index,
                        generated = enrichment.generated_count(),
                        failed = enrichment.failed_count(),
                        "segment enriched"
                    );

                    // Receiver gone means the caller stopped waiting.
                    if results.send((index, enrichment)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(job_rx);
        drop(result_tx);

        for (index, text) in texts.into_iter().enumerate() {
            if job_tx.send((index, text)).await.is_err() {
                error!(index, "all enrichment workers stopped; remaining segments abandoned");
                break;
            }
        }
        drop(job_tx);

        let mut slots: Vec<Option<SegmentEnrichment>> = vec![None; total];
        while let Some((index, enrichment)) = result_rx.recv().await {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(enrichment);
            }
        }

        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "enrichment worker panicked");
            }
        }

        let results: Vec<SegmentEnrichment> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    warn!(index, "no result for segment");
                    SegmentEnrichment::abandoned(&prompts)
                })
            })
            .collect();

        let generated: usize = results.iter().map(SegmentEnrichment::generated_count).sum();
        let failed: usize = results.iter().map(SegmentEnrichment::failed_count).sum();
        info!(
            segments = total,
            fields_generated = generated,
            fields_failed = failed,
            "enrichment finished"
        );

        results
    }
}

async fn enrich_segment<G: TextGenerator + ?Sized>(
    client: &EnrichmentClient<G>,
    text: &str,
    prompts: &PromptSet,
) -> SegmentEnrichment {
    let mut enrichment = SegmentEnrichment::default();

    if client.config().field_fan_out {
        let outcomes = join_all(prompts.iter().map(|prompt| async move {
            (prompt.field, client.generate_field(text, prompt).await)
        }))
        .await;
        for (field, outcome) in outcomes {
            enrichment.record(field, outcome);
        }
    } else {
        for prompt in prompts.iter() {
            let outcome = client.generate_field(text, prompt).await;
            enrichment.record(prompt.field, outcome);
        }
    }

    enrichment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGenerator;
    use crate::traits::generator::GenerateRequest;
    use proptest::prelude::*;
    use std::time::Duration;

    fn coordinator(generator: &MockGenerator, workers: usize) -> EnrichmentCoordinator<MockGenerator> {
        EnrichmentCoordinator::new(
            Arc::new(generator.clone()),
            EnrichmentConfig::new()
                .with_workers(workers)
                .with_retries(2, Duration::from_millis(10)),
        )
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("segment-{i}")).collect()
    }

    /// Index `i` of the `segment-{i}` text embedded in a prompt.
    fn segment_index(request: &GenerateRequest) -> usize {
        request
            .prompt
            .split("segment-")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_empty_input() {
        let generator = MockGenerator::new();
        let results = coordinator(&generator, 3).enrich(vec![], &PromptSet::video()).await;

        assert!(results.is_empty());
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_every_field_generated() {
        let generator = MockGenerator::new().echo_segment();
        let results = coordinator(&generator, 2)
            .enrich(texts(4), &PromptSet::book())
            .await;

        assert_eq!(results.len(), 4);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.generated_count(), 3);
            assert!(result.failures.is_empty());
            assert!(result.fields.title.is_none());
            assert_eq!(result.fields.field_1.as_deref(), Some(format!("segment-{i}").as_str()));
        }
        assert_eq!(generator.call_count(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverse_completion_keeps_input_order() {
        // Earlier segments finish last.
        let generator = MockGenerator::new()
            .echo_segment()
            .with_delay(|request| Duration::from_millis(100 * (10 - segment_index(request) as u64)));

        let results = coordinator(&generator, 5)
            .enrich(texts(10), &PromptSet::book())
            .await;

        let firsts: Vec<String> = results
            .iter()
            .filter_map(|r| r.fields.field_1.clone())
            .collect();
        assert_eq!(firsts, texts(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_bounds_concurrency() {
        let generator = MockGenerator::new().with_delay(|_| Duration::from_millis(50));
        let coordinator = EnrichmentCoordinator::new(
            Arc::new(generator.clone()),
            EnrichmentConfig::new().with_workers(3).with_field_fan_out(false),
        );

        coordinator.enrich(texts(12), &PromptSet::video()).await;

        assert_eq!(generator.call_count(), 48);
        assert_eq!(generator.peak_in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_field_does_not_stop_siblings() {
        let generator = MockGenerator::new()
            .echo_segment()
            .fail_when_prompt_contains("segment-1\n\nGenerate only the title", "content policy");

        let results = coordinator(&generator, 2)
            .enrich(texts(3), &PromptSet::video())
            .await;

        assert_eq!(results[1].generated_count(), 3);
        assert_eq!(
            results[1].failures.get(&FieldName::Title),
            Some(&FieldFailure::Rejected {
                message: "content policy".into()
            })
        );
        assert!(results[1].to_update().iter().all(|(f, _)| f != FieldName::Title));
        assert_eq!(results[0].generated_count(), 4);
        assert_eq!(results[2].generated_count(), 4);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_any_completion_order_keeps_input_order(
            delays in prop::collection::vec(0u64..50, 1..12),
            workers in 1usize..6,
        ) {
            let n = delays.len();
            let per_segment = delays.clone();
            // Fields of one segment also finish at different times.
            let generator = MockGenerator::new().echo_segment().with_delay(move |request| {
                let jitter = (request.prompt.len() % 7) as u64;
                Duration::from_millis(per_segment[segment_index(request)] + jitter)
            });

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();
            let results = runtime.block_on(
                coordinator(&generator, workers).enrich(texts(n), &PromptSet::video()),
            );

            prop_assert_eq!(results.len(), n);
            for (i, result) in results.iter().enumerate() {
                let expected = format!("segment-{i}");
                prop_assert_eq!(result.fields.field_1.as_deref(), Some(expected.as_str()));
                prop_assert_eq!(result.fields.title.as_deref(), Some(expected.as_str()));
                prop_assert!(result.failures.is_empty());
            }
        }
    }
}
