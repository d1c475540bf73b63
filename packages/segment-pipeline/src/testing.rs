//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the pipeline without
//! making real AI calls, and for injecting store failures at precise points.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::error::{GenerateError, StoreError, StoreResult};
use crate::traits::generator::{GenerateRequest, TextGenerator};
use crate::traits::store::SegmentStore;
use crate::types::segment::{FieldUpdate, NewSegment, Segment, SegmentBody};

type Responder = Arc<dyn Fn(&GenerateRequest) -> String + Send + Sync>;
type DelayFn = Arc<dyn Fn(&GenerateRequest) -> Duration + Send + Sync>;

/// A mock text generator for testing.
///
/// Responses, delays, rate limits and failures are all scriptable. Clones
/// share call tracking, so keep a clone to assert on after handing one to
/// the pipeline.
#[derive(Clone)]
pub struct MockGenerator {
    /// Computes the response for a request
    responder: Option<Responder>,

    /// Used when no responder is set
    default_response: String,

    /// Per-request latency
    delay: Option<DelayFn>,

    /// Calls still to be answered with a rate limit
    rate_limits_remaining: Arc<AtomicUsize>,

    /// `retry_after` hint attached to scripted rate limits
    retry_after: Option<Duration>,

    /// `(prompt substring, message)` pairs answered with a hard failure
    failures: Arc<RwLock<Vec<(String, String)>>>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<GenerateRequest>>>,

    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerator {
    /// Create a mock that answers every request with `"mock response"`.
    pub fn new() -> Self {
        Self {
            responder: None,
            default_response: "mock response".to_string(),
            delay: None,
            rate_limits_remaining: Arc::new(AtomicUsize::new(0)),
            retry_after: None,
            failures: Arc::new(RwLock::new(Vec::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer every request with a fixed string.
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Compute responses from the request.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&GenerateRequest) -> String + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Answer with the segment text embedded in the prompt.
    ///
    /// Takes the block after the first `:` line up to the next blank line,
    /// which is where every built-in template places the text.
    pub fn echo_segment(self) -> Self {
        self.with_responder(|request| embedded_text(&request.prompt).to_string())
    }

    /// Delay each response by a request-dependent duration.
    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&GenerateRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Arc::new(delay));
        self
    }

    /// Answer the next `n` calls with a rate limit.
    pub fn rate_limit_first(self, n: usize) -> Self {
        self.rate_limits_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Attach a `retry_after` hint to scripted rate limits.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Fail (without retry) any request whose prompt contains `needle`.
    pub fn fail_when_prompt_contains(
        self,
        needle: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((needle.into(), message.into()));
        self
    }

    /// Every request received, in arrival order.
    pub fn calls(&self) -> Vec<GenerateRequest> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Highest number of requests outstanding at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Clear the call history and the in-flight gauge.
    pub fn reset(&self) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.peak_in_flight.store(0, Ordering::SeqCst);
    }

    fn take_rate_limit(&self) -> bool {
        self.rate_limits_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn scripted_failure(&self, prompt: &str) -> Option<String> {
        self.failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, message)| message.clone())
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, GenerateError> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = &self.delay {
            let wait = delay(request);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }

        let result = if self.take_rate_limit() {
            Err(GenerateError::RateLimited {
                retry_after: self.retry_after,
            })
        } else if let Some(message) = self.scripted_failure(&request.prompt) {
            Err(GenerateError::Other(message))
        } else {
            Ok(match &self.responder {
                Some(responder) => responder(request),
                None => self.default_response.clone(),
            })
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn embedded_text(prompt: &str) -> &str {
    let Some((_, rest)) = prompt.split_once(":\n") else {
        return prompt.trim();
    };
    rest.split("\n\n").next().unwrap_or(rest).trim()
}

/// Store write kinds that [`FailingStore`] can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    BulkInsert,
    UpdateFields,
    UpdatePosition,
    UpdateText,
    UpdateNote,
    DeleteByDoc,
    DeleteSegment,
}

/// Wraps a store and fails or slows chosen writes.
///
/// `fail_nth(kind, n)` makes the n-th call (1-based) of that kind return a
/// backend error without reaching the inner store. `delay_writes(kind, d)`
/// sleeps before every write of that kind. Reads always pass through.
pub struct FailingStore<S> {
    inner: S,
    plan: RwLock<HashMap<WriteKind, usize>>,
    delays: RwLock<HashMap<WriteKind, Duration>>,
    counts: RwLock<HashMap<WriteKind, usize>>,
}

impl<S: SegmentStore> FailingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            plan: RwLock::new(HashMap::new()),
            delays: RwLock::new(HashMap::new()),
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// Fail the n-th write of `kind`.
    pub fn fail_nth(self, kind: WriteKind, n: usize) -> Self {
        self.plan
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, n);
        self
    }

    /// Sleep before each write of `kind`.
    pub fn delay_writes(self, kind: WriteKind, delay: Duration) -> Self {
        self.delays
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, delay);
        self
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Calls seen so far for `kind`, including the failed one.
    pub fn calls(&self, kind: WriteKind) -> usize {
        self.counts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    async fn check(&self, kind: WriteKind) -> StoreResult<()> {
        let delay = self
            .delays
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.count(kind)
    }

    fn count(&self, kind: WriteKind) -> StoreResult<()> {
        let mut counts = self.counts.write().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(kind).or_insert(0);
        *count += 1;

        let planned = self
            .plan
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .copied();
        if planned == Some(*count) {
            return Err(StoreError::backend(format!(
                "injected failure on {kind:?} call {count}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: SegmentStore> SegmentStore for FailingStore<S> {
    async fn bulk_insert(&self, doc_id: &str, segments: &[NewSegment]) -> StoreResult<()> {
        self.check(WriteKind::BulkInsert).await?;
        self.inner.bulk_insert(doc_id, segments).await
    }

    async fn update_fields(
        &self,
        doc_id: &str,
        position: i64,
        update: &FieldUpdate,
    ) -> StoreResult<()> {
        self.check(WriteKind::UpdateFields).await?;
        self.inner.update_fields(doc_id, position, update).await
    }

    async fn update_position(
        &self,
        doc_id: &str,
        old_position: i64,
        new_position: i64,
    ) -> StoreResult<()> {
        self.check(WriteKind::UpdatePosition).await?;
        self.inner
            .update_position(doc_id, old_position, new_position)
            .await
    }

    async fn list_by_doc(&self, doc_id: &str) -> StoreResult<Vec<Segment>> {
        self.inner.list_by_doc(doc_id).await
    }

    async fn delete_by_doc(&self, doc_id: &str) -> StoreResult<usize> {
        self.check(WriteKind::DeleteByDoc).await?;
        self.inner.delete_by_doc(doc_id).await
    }

    async fn delete_segment(&self, doc_id: &str, position: i64) -> StoreResult<bool> {
        self.check(WriteKind::DeleteSegment).await?;
        self.inner.delete_segment(doc_id, position).await
    }

    async fn update_text(
        &self,
        doc_id: &str,
        position: i64,
        body: &SegmentBody,
        word_count: usize,
        unit_count: usize,
    ) -> StoreResult<()> {
        self.check(WriteKind::UpdateText).await?;
        self.inner
            .update_text(doc_id, position, body, word_count, unit_count)
            .await
    }

    async fn update_note(
        &self,
        doc_id: &str,
        position: i64,
        note: Option<&str>,
    ) -> StoreResult<()> {
        self.check(WriteKind::UpdateNote).await?;
        self.inner.update_note(doc_id, position, note).await
    }
}
