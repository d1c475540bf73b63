//! Segment types - segmenter output, persisted records, and AI field sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// The closed set of AI-derived fields a segment can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldName {
    /// Short title (video segments only)
    #[serde(rename = "title")]
    Title,
    #[serde(rename = "field_1")]
    Field1,
    #[serde(rename = "field_2")]
    Field2,
    #[serde(rename = "field_3")]
    Field3,
}

impl FieldName {
    /// Every recognized field, in display order.
    pub const ALL: [FieldName; 4] = [
        FieldName::Title,
        FieldName::Field1,
        FieldName::Field2,
        FieldName::Field3,
    ];

    /// Stable storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Title => "title",
            FieldName::Field1 => "field_1",
            FieldName::Field2 => "field_2",
            FieldName::Field3 => "field_3",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AI-derived outputs for one segment. `None` means not yet enriched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentFields {
    pub title: Option<String>,
    pub field_1: Option<String>,
    pub field_2: Option<String>,
    pub field_3: Option<String>,
}

impl SegmentFields {
    /// Create an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one field.
    pub fn get(&self, name: FieldName) -> Option<&str> {
        self.slot(name).as_deref()
    }

    /// Write one field.
    pub fn set(&mut self, name: FieldName, value: Option<String>) {
        *self.slot_mut(name) = value;
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: FieldName, value: impl Into<String>) -> Self {
        self.set(name, Some(value.into()));
        self
    }

    /// True when the field holds a non-blank value.
    pub fn is_set(&self, name: FieldName) -> bool {
        self.get(name).is_some_and(|v| !v.trim().is_empty())
    }

    /// True when every listed field is set.
    pub fn is_complete(&self, required: &[FieldName]) -> bool {
        required.iter().all(|name| self.is_set(*name))
    }

    /// Apply a targeted update.
    pub fn apply(&mut self, update: &FieldUpdate) {
        for (name, value) in update.iter() {
            self.set(name, value.map(str::to_string));
        }
    }

    fn slot(&self, name: FieldName) -> &Option<String> {
        match name {
            FieldName::Title => &self.title,
            FieldName::Field1 => &self.field_1,
            FieldName::Field2 => &self.field_2,
            FieldName::Field3 => &self.field_3,
        }
    }

    fn slot_mut(&mut self, name: FieldName) -> &mut Option<String> {
        match name {
            FieldName::Title => &mut self.title,
            FieldName::Field1 => &mut self.field_1,
            FieldName::Field2 => &mut self.field_2,
            FieldName::Field3 => &mut self.field_3,
        }
    }
}

/// A field-only write: names the fields to change and nothing else.
///
/// `Some(value)` sets a field, `None` clears it. Fields not mentioned are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    changes: BTreeMap<FieldName, Option<String>>,
}

impl FieldUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field.
    pub fn set(mut self, name: FieldName, value: impl Into<String>) -> Self {
        self.changes.insert(name, Some(value.into()));
        self
    }

    /// Clear a field.
    pub fn clear(mut self, name: FieldName) -> Self {
        self.changes.insert(name, None);
        self
    }

    /// Clear every recognized field.
    pub fn clear_all() -> Self {
        FieldName::ALL
            .iter()
            .fold(Self::new(), |update, name| update.clear(*name))
    }

    /// Build an update that writes every `Some` field of `fields`.
    pub fn from_fields(fields: &SegmentFields) -> Self {
        FieldName::ALL
            .iter()
            .filter_map(|name| fields.get(*name).map(|v| (*name, v)))
            .fold(Self::new(), |update, (name, value)| update.set(name, value))
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Iterate over changes in field order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldName, Option<&str>)> {
        self.changes.iter().map(|(k, v)| (*k, v.as_deref()))
    }
}

/// Where a duration-bounded segment sits on the media timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    /// Interval index `k`
    pub index: usize,

    /// Nominal start, always `k * target_duration`
    pub start: Duration,

    /// End of the covered range (overlap included, clamped to media end)
    pub end: Duration,
}

/// One segment as produced by a segmenter, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDraft {
    /// Segment content, words joined by single spaces
    pub text: String,

    /// Number of words in `text`
    pub word_count: usize,

    /// Number of pseudo-sentences (word mode) or caption entries (duration mode)
    pub unit_count: usize,

    /// Leading words repeated from the previous segment
    pub overlap_words: usize,

    /// Repeated words inside `text` where a short final segment was folded in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_overlap: Option<OverlapWindow>,

    /// Timeline placement (duration mode only)
    pub time_span: Option<TimeSpan>,
}

impl SegmentDraft {
    /// Words of `text` outside every overlap window.
    ///
    /// Concatenated across a segmenter's output, these give back the input
    /// word sequence.
    pub fn fresh_words(&self) -> impl Iterator<Item = &str> {
        let inner = self.inner_overlap;
        self.text
            .split_whitespace()
            .enumerate()
            .filter(move |(i, _)| {
                *i >= self.overlap_words && !inner.is_some_and(|w| w.contains(*i))
            })
            .map(|(_, word)| word)
    }
}

/// A run of repeated words inside a segment, as word offsets into its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapWindow {
    /// Offset of the first repeated word
    pub start: usize,

    /// Number of repeated words
    pub len: usize,
}

impl OverlapWindow {
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.start + self.len
    }
}

/// Opaque reference to text held by a [`TextStore`](crate::traits::store::TextStore).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRef(pub String);

impl TextRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Segment text, either inline in the record or offloaded to a text store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SegmentBody {
    Inline(String),
    Stored(TextRef),
}

impl SegmentBody {
    /// Inline text, if the record carries it.
    pub fn inline_text(&self) -> Option<&str> {
        match self {
            SegmentBody::Inline(text) => Some(text),
            SegmentBody::Stored(_) => None,
        }
    }

    /// Text store reference, if offloaded.
    pub fn text_ref(&self) -> Option<&TextRef> {
        match self {
            SegmentBody::Inline(_) => None,
            SegmentBody::Stored(r) => Some(r),
        }
    }
}

/// Row written by a bulk insert. Fields start unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSegment {
    pub position: i64,
    pub body: SegmentBody,
    pub word_count: usize,
    pub unit_count: usize,
    pub time_span: Option<TimeSpan>,
}

/// A persisted segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Stable identity; survives reorders
    pub id: Uuid,

    /// 1-indexed, unique within the document
    pub position: i64,

    pub body: SegmentBody,
    pub word_count: usize,
    pub unit_count: usize,
    pub time_span: Option<TimeSpan>,

    /// AI-derived fields
    #[serde(default)]
    pub fields: SegmentFields,

    /// User-owned note. The pipeline never writes it.
    pub user_note: Option<String>,
}

impl Segment {
    /// Materialize a new row with a fresh id and no fields.
    pub fn from_new(row: NewSegment) -> Self {
        Self {
            id: Uuid::new_v4(),
            position: row.position,
            body: row.body,
            word_count: row.word_count,
            unit_count: row.unit_count,
            time_span: row.time_span,
            fields: SegmentFields::default(),
            user_note: None,
        }
    }

    /// True when every required field is set.
    pub fn is_processed(&self, required: &[FieldName]) -> bool {
        self.fields.is_complete(required)
    }
}
