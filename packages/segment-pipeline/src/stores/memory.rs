//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{SegmentStore, TextStore};
use crate::types::segment::{FieldUpdate, NewSegment, Segment, SegmentBody, TextRef};

/// Positions of every segment of one document right after a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteLogEntry {
    pub doc_id: String,
    pub operation: &'static str,

    /// `(segment id, position)` pairs in storage order
    pub snapshot: Vec<(Uuid, i64)>,
}

impl WriteLogEntry {
    /// True when two segments share a position in this snapshot.
    pub fn has_duplicate_positions(&self) -> bool {
        let mut positions: Vec<i64> = self.snapshot.iter().map(|(_, p)| *p).collect();
        positions.sort_unstable();
        positions.windows(2).any(|w| w[0] == w[1])
    }
}

/// In-memory segment records.
///
/// Enforces the unique `(doc_id, position)` key the way a database index
/// would, and keeps an append-only log of position snapshots after every
/// successful write. Not suitable for production as data is lost on restart.
pub struct MemoryStore {
    docs: RwLock<HashMap<String, Vec<Segment>>>,
    log: RwLock<Vec<WriteLogEntry>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            log: RwLock::new(Vec::new()),
        }
    }

    /// Clear all stored data and the write log.
    pub fn clear(&self) {
        write(&self.docs).clear();
        write(&self.log).clear();
    }

    /// Number of documents holding at least one segment.
    pub fn document_count(&self) -> usize {
        read(&self.docs).values().filter(|s| !s.is_empty()).count()
    }

    /// Every logged write, oldest first.
    pub fn write_log(&self) -> Vec<WriteLogEntry> {
        read(&self.log).clone()
    }

    /// Logged writes for one document.
    pub fn write_log_for(&self, doc_id: &str) -> Vec<WriteLogEntry> {
        read(&self.log)
            .iter()
            .filter(|e| e.doc_id == doc_id)
            .cloned()
            .collect()
    }

    fn record(&self, doc_id: &str, operation: &'static str, segments: &[Segment]) {
        write(&self.log).push(WriteLogEntry {
            doc_id: doc_id.to_string(),
            operation,
            snapshot: segments.iter().map(|s| (s.id, s.position)).collect(),
        });
    }

    /// Run `f` against one segment, then log the write.
    fn modify<F>(&self, doc_id: &str, position: i64, operation: &'static str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Segment),
    {
        let mut docs = write(&self.docs);
        let segments = docs.entry(doc_id.to_string()).or_default();
        let segment = segments
            .iter_mut()
            .find(|s| s.position == position)
            .ok_or_else(|| not_found(doc_id, position))?;

        f(segment);
        self.record(doc_id, operation, segments);
        Ok(())
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn bulk_insert(&self, doc_id: &str, rows: &[NewSegment]) -> StoreResult<()> {
        let mut docs = write(&self.docs);
        let segments = docs.entry(doc_id.to_string()).or_default();

        let mut seen: Vec<i64> = segments.iter().map(|s| s.position).collect();
        for row in rows {
            if seen.contains(&row.position) {
                return Err(StoreError::PositionTaken {
                    doc_id: doc_id.to_string(),
                    position: row.position,
                });
            }
            seen.push(row.position);
        }

        segments.extend(rows.iter().cloned().map(Segment::from_new));
        self.record(doc_id, "bulk_insert", segments);
        debug!(doc_id = %doc_id, rows = rows.len(), "bulk insert");
        Ok(())
    }

    async fn update_fields(
        &self,
        doc_id: &str,
        position: i64,
        update: &FieldUpdate,
    ) -> StoreResult<()> {
        self.modify(doc_id, position, "update_fields", |s| s.fields.apply(update))
    }

    async fn update_position(
        &self,
        doc_id: &str,
        old_position: i64,
        new_position: i64,
    ) -> StoreResult<()> {
        if old_position == new_position {
            return Ok(());
        }

        let mut docs = write(&self.docs);
        let segments = docs.entry(doc_id.to_string()).or_default();

        if segments.iter().any(|s| s.position == new_position) {
            return Err(StoreError::PositionTaken {
                doc_id: doc_id.to_string(),
                position: new_position,
            });
        }
        let segment = segments
            .iter_mut()
            .find(|s| s.position == old_position)
            .ok_or_else(|| not_found(doc_id, old_position))?;

        segment.position = new_position;
        self.record(doc_id, "update_position", segments);
        Ok(())
    }

    async fn list_by_doc(&self, doc_id: &str) -> StoreResult<Vec<Segment>> {
        let mut segments = read(&self.docs).get(doc_id).cloned().unwrap_or_default();
        segments.sort_by_key(|s| s.position);
        Ok(segments)
    }

    async fn delete_by_doc(&self, doc_id: &str) -> StoreResult<usize> {
        let removed = write(&self.docs).remove(doc_id).map_or(0, |s| s.len());
        self.record(doc_id, "delete_by_doc", &[]);
        Ok(removed)
    }

    async fn delete_segment(&self, doc_id: &str, position: i64) -> StoreResult<bool> {
        let mut docs = write(&self.docs);
        let Some(segments) = docs.get_mut(doc_id) else {
            return Ok(false);
        };

        let before = segments.len();
        segments.retain(|s| s.position != position);
        let removed = segments.len() < before;
        if removed {
            self.record(doc_id, "delete_segment", segments);
        }
        Ok(removed)
    }

    async fn update_text(
        &self,
        doc_id: &str,
        position: i64,
        body: &SegmentBody,
        word_count: usize,
        unit_count: usize,
    ) -> StoreResult<()> {
        self.modify(doc_id, position, "update_text", |s| {
            s.body = body.clone();
            s.word_count = word_count;
            s.unit_count = unit_count;
        })
    }

    async fn update_note(
        &self,
        doc_id: &str,
        position: i64,
        note: Option<&str>,
    ) -> StoreResult<()> {
        self.modify(doc_id, position, "update_note", |s| {
            s.user_note = note.map(str::to_string);
        })
    }
}

/// In-memory text store addressed by `{doc_id}/{uuid}.txt` paths.
///
/// Paths are random rather than position-based, so a reorder never leaves a
/// reference pointing at another segment's text.
#[derive(Default)]
pub struct MemoryTextStore {
    objects: RwLock<HashMap<String, String>>,
}

impl MemoryTextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        read(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.objects).is_empty()
    }
}

#[async_trait]
impl TextStore for MemoryTextStore {
    async fn get(&self, text_ref: &TextRef) -> StoreResult<Option<String>> {
        Ok(read(&self.objects).get(text_ref.as_str()).cloned())
    }

    async fn put(&self, doc_id: &str, ordinal: usize, text: &str) -> StoreResult<TextRef> {
        let path = format!("{}/{}.txt", doc_id, Uuid::new_v4());
        write(&self.objects).insert(path.clone(), text.to_string());
        debug!(doc_id = %doc_id, ordinal, path = %path, "text stored");
        Ok(TextRef(path))
    }

    async fn delete(&self, text_ref: &TextRef) -> StoreResult<bool> {
        Ok(write(&self.objects).remove(text_ref.as_str()).is_some())
    }

    async fn delete_for_doc(&self, doc_id: &str) -> StoreResult<usize> {
        let prefix = format!("{doc_id}/");
        let mut objects = write(&self.objects);
        let before = objects.len();
        objects.retain(|path, _| !path.starts_with(&prefix));
        Ok(before - objects.len())
    }
}

fn not_found(doc_id: &str, position: i64) -> StoreError {
    StoreError::NotFound {
        doc_id: doc_id.to_string(),
        position,
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
