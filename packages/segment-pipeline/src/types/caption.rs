//! Time-tagged caption entries.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One subtitle cue: a span of media time and the words spoken in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionEntry {
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

impl CaptionEntry {
    /// Create a caption entry.
    pub fn new(start: Duration, end: Duration, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Convenience constructor from fractional seconds.
    pub fn from_secs(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self::new(
            Duration::from_secs_f64(start.max(0.0)),
            Duration::from_secs_f64(end.max(0.0)),
            text,
        )
    }

    /// True when the cue carries no words.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
