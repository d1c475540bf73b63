//! Storage traits for segment records and segment text.
//!
//! The storage layer is split in two:
//! - `SegmentStore`: positioned records with their AI fields
//! - `TextStore`: bulk segment text, addressed by reference

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::segment::{FieldUpdate, NewSegment, Segment, SegmentBody, TextRef};

/// Record store for positioned segments.
///
/// `(doc_id, position)` is a unique key. Implementations must reject any
/// write that would make two segments of one document share a position.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Insert a batch of new segments in one write.
    async fn bulk_insert(&self, doc_id: &str, segments: &[NewSegment]) -> StoreResult<()>;

    /// Write only the named fields of one segment.
    async fn update_fields(
        &self,
        doc_id: &str,
        position: i64,
        update: &FieldUpdate,
    ) -> StoreResult<()>;

    /// Move one segment to a new position.
    ///
    /// Fails with `PositionTaken` if another segment holds `new_position`.
    async fn update_position(
        &self,
        doc_id: &str,
        old_position: i64,
        new_position: i64,
    ) -> StoreResult<()>;

    /// All segments of a document, ordered by position.
    async fn list_by_doc(&self, doc_id: &str) -> StoreResult<Vec<Segment>>;

    /// Delete every segment of a document. Returns the number removed.
    async fn delete_by_doc(&self, doc_id: &str) -> StoreResult<usize>;

    /// Delete one segment. Returns false if nothing was at `position`.
    async fn delete_segment(&self, doc_id: &str, position: i64) -> StoreResult<bool>;

    /// Replace a segment's text and derived counts. Fields are left alone.
    async fn update_text(
        &self,
        doc_id: &str,
        position: i64,
        body: &SegmentBody,
        word_count: usize,
        unit_count: usize,
    ) -> StoreResult<()>;

    /// Set or clear the user note.
    async fn update_note(&self, doc_id: &str, position: i64, note: Option<&str>)
        -> StoreResult<()>;

    /// Get one segment.
    async fn get_segment(&self, doc_id: &str, position: i64) -> StoreResult<Option<Segment>> {
        let segments = self.list_by_doc(doc_id).await?;
        Ok(segments.into_iter().find(|s| s.position == position))
    }

    /// Count segments for a document.
    async fn count(&self, doc_id: &str) -> StoreResult<usize> {
        Ok(self.list_by_doc(doc_id).await?.len())
    }
}

/// Storage for segment text kept outside the record store.
///
/// References returned by `put` stay valid when segments are reordered.
#[async_trait]
pub trait TextStore: Send + Sync {
    /// Fetch text by reference.
    async fn get(&self, text_ref: &TextRef) -> StoreResult<Option<String>>;

    /// Store text for the segment at `ordinal` and return its reference.
    async fn put(&self, doc_id: &str, ordinal: usize, text: &str) -> StoreResult<TextRef>;

    /// Remove one stored text. Returns false if it was already gone.
    async fn delete(&self, text_ref: &TextRef) -> StoreResult<bool>;

    /// Remove all text stored for a document. Returns the number of objects removed.
    async fn delete_for_doc(&self, doc_id: &str) -> StoreResult<usize>;
}
