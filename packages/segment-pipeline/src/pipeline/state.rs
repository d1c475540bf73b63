//! Per-document run state.
//!
//! ```text
//! NotStarted -> Segmenting -> Segmented -> Enriching -> Complete
//!                   |                         |
//!                   +--------> Failed <-------+
//! ```
//!
//! A document may be segmented again from any settled state and enriched
//! again from `Segmented`, `Complete` or `Failed`. Only one stage runs per
//! document at a time.
//!
//! Maintenance (reorder, delete, text edits) holds the document in
//! `Maintaining` and hands it back in the state it found it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Where a document is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    NotStarted,
    Segmenting,
    Segmented,
    Enriching,
    Complete,
    Failed,
    Maintaining,
}

impl RunState {
    /// Something holds the document; every other start is refused.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            RunState::Segmenting | RunState::Enriching | RunState::Maintaining
        )
    }

    /// State after `event`, or `None` if the event is not valid here.
    pub fn next(self, event: RunEvent) -> Option<RunState> {
        use RunEvent::*;
        use RunState::*;

        match (self, event) {
            (current, _) if current.is_running() && event.is_start() => None,
            (_, StartMaintenance) => Some(Maintaining),
            (_, StartSegmenting) => Some(Segmenting),
            (Segmented | Complete | Failed, StartEnriching) => Some(Enriching),
            (Segmenting, Succeeded) => Some(Segmented),
            (Enriching, Succeeded) => Some(Complete),
            (Segmenting | Enriching, Errored) => Some(Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::NotStarted => "not_started",
            RunState::Segmenting => "segmenting",
            RunState::Segmented => "segmented",
            RunState::Enriching => "enriching",
            RunState::Complete => "complete",
            RunState::Failed => "failed",
            RunState::Maintaining => "maintaining",
        };
        f.write_str(name)
    }
}

/// Transition triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    StartSegmenting,
    StartEnriching,
    StartMaintenance,
    Succeeded,
    Errored,
}

impl RunEvent {
    pub fn is_start(&self) -> bool {
        matches!(
            self,
            RunEvent::StartSegmenting | RunEvent::StartEnriching | RunEvent::StartMaintenance
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    state: RunState,
    /// State to restore when maintenance ends
    resume: RunState,
}

/// Run state for every document this process has touched.
///
/// Documents never seen are `NotStarted`. A document the tracker has not
/// seen but that already has segments in the store can still be enriched;
/// see [`RunTracker::begin`].
#[derive(Debug, Default)]
pub struct RunTracker {
    states: Mutex<HashMap<String, Entry>>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a document.
    pub fn state(&self, doc_id: &str) -> RunState {
        self.lock().get(doc_id).map(|e| e.state).unwrap_or_default()
    }

    /// Atomically start a stage or a maintenance operation.
    ///
    /// `StartEnriching` on a `NotStarted` document is allowed (its segments
    /// may predate this process). Returns the current state on refusal.
    pub fn begin(&self, doc_id: &str, event: RunEvent) -> Result<RunState, RunState> {
        let mut states = self.lock();
        let current = states.get(doc_id).map(|e| e.state).unwrap_or_default();

        let next = match (current, event) {
            (RunState::NotStarted, RunEvent::StartEnriching) => Some(RunState::Enriching),
            _ => current.next(event),
        };

        match next {
            Some(state) => {
                states.insert(
                    doc_id.to_string(),
                    Entry {
                        state,
                        resume: current,
                    },
                );
                Ok(state)
            }
            None => Err(current),
        }
    }

    /// Finish whatever holds the document.
    ///
    /// Maintenance restores the state it started from, whatever the outcome.
    pub fn finish(&self, doc_id: &str, succeeded: bool) -> RunState {
        let mut states = self.lock();
        let entry = states.get(doc_id).copied().unwrap_or_default();
        let event = if succeeded {
            RunEvent::Succeeded
        } else {
            RunEvent::Errored
        };

        let next = match entry.state {
            RunState::Maintaining => entry.resume,
            current => current.next(event).unwrap_or(current),
        };
        states.insert(
            doc_id.to_string(),
            Entry {
                state: next,
                resume: next,
            },
        );
        next
    }

    /// Forget a document (after it is deleted).
    pub fn clear(&self, doc_id: &str) {
        self.lock().remove(doc_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
