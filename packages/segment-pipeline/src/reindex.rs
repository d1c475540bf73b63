//! Collision-free renumbering of positioned segments.
//!
//! Positions are a unique key, so a reorder cannot simply write the new
//! numbers: moving C to 1 while A still holds 1 collides. Every item is first
//! parked at a negative staging position `-(rank+1)`, which no real position
//! or other staged item can hold, and then moved to its final `rank+1`.
//!
//! Plans are computed as pure values so they can be checked without a store.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, ReorderViolation, Result};
use crate::traits::store::SegmentStore;

/// One `update_position` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionMove {
    pub from: i64,
    pub to: i64,
}

/// The writes that carry out a reorder, in issue order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderPlan {
    /// Current position to negative staging position
    pub phase_a: Vec<PositionMove>,

    /// Staging position to final position
    pub phase_b: Vec<PositionMove>,
}

impl ReorderPlan {
    /// All moves, phase A first.
    pub fn moves(&self) -> impl Iterator<Item = &PositionMove> {
        self.phase_a.iter().chain(self.phase_b.iter())
    }

    pub fn len(&self) -> usize {
        self.phase_a.len() + self.phase_b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phase_a.is_empty() && self.phase_b.is_empty()
    }

    /// Apply the plan to an in-memory position map.
    ///
    /// Fails with the offending position if a move would land on an occupied
    /// slot or start from an empty one. Moves before the failure stay applied.
    pub fn apply_to<T>(&self, items: &mut BTreeMap<i64, T>) -> std::result::Result<(), i64> {
        apply_moves(self.moves(), items)
    }
}

/// Compute the two-phase plan that puts the items at `order` into positions `1..=N`.
///
/// `current` must be exactly `1..=N` (in any order) and `order` must list each
/// of those positions once. Nothing is planned otherwise.
pub fn plan_reorder(
    current: &[i64],
    order: &[i64],
) -> std::result::Result<ReorderPlan, ReorderViolation> {
    let mut sorted = current.to_vec();
    sorted.sort_unstable();
    if sorted.iter().zip(1i64..).any(|(p, expected)| *p != expected) {
        return Err(ReorderViolation::NonContiguous);
    }

    let known: HashSet<i64> = sorted.iter().copied().collect();
    let mut seen = HashSet::with_capacity(order.len());
    for &position in order {
        if !known.contains(&position) {
            return Err(ReorderViolation::UnknownPosition(position));
        }
        if !seen.insert(position) {
            return Err(ReorderViolation::DuplicatePosition(position));
        }
    }
    if order.len() != current.len() {
        return Err(ReorderViolation::LengthMismatch {
            expected: current.len(),
            actual: order.len(),
        });
    }

    let ranks = order.iter().zip(1i64..);
    Ok(ReorderPlan {
        phase_a: ranks
            .clone()
            .map(|(&from, rank)| PositionMove { from, to: -rank })
            .collect(),
        phase_b: ranks
            .map(|(_, rank)| PositionMove {
                from: -rank,
                to: rank,
            })
            .collect(),
    })
}

/// Moves that close gaps so positions become `1..=N`, keeping relative order.
///
/// Moves run in ascending order; each target was vacated by an earlier move
/// or never held, so no write collides.
pub fn plan_compaction(positions: &[i64]) -> Vec<PositionMove> {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();

    sorted
        .into_iter()
        .zip(1i64..)
        .filter(|(from, to)| from != to)
        .map(|(from, to)| PositionMove { from, to })
        .collect()
}

/// Reorder a document's segments.
///
/// `order` lists current positions in the desired new order. The request is
/// validated against the store before any write; a rejected request leaves
/// the document untouched. Only `update_position` is issued.
pub async fn reorder<S: SegmentStore + ?Sized>(
    store: &S,
    doc_id: &str,
    order: &[i64],
) -> Result<ReorderPlan> {
    let current: Vec<i64> = store
        .list_by_doc(doc_id)
        .await
        .map_err(PipelineError::StoreRead)?
        .iter()
        .map(|s| s.position)
        .collect();

    let plan = plan_reorder(&current, order).map_err(|violation| {
        warn!(doc_id = %doc_id, error = %violation, "reorder rejected");
        violation
    })?;

    for (phase, moves) in [("reorder_stage", &plan.phase_a), ("reorder_final", &plan.phase_b)] {
        for m in moves {
            store
                .update_position(doc_id, m.from, m.to)
                .await
                .map_err(|e| PipelineError::write(phase, e))?;
        }
        debug!(doc_id = %doc_id, phase, moves = moves.len(), "reorder phase applied");
    }

    info!(doc_id = %doc_id, segments = current.len(), "segments reordered");
    Ok(plan)
}

/// Close any position gaps in a document (for example after a delete).
///
/// Returns the number of segments moved.
pub async fn compact<S: SegmentStore + ?Sized>(store: &S, doc_id: &str) -> Result<usize> {
    let positions: Vec<i64> = store
        .list_by_doc(doc_id)
        .await
        .map_err(PipelineError::StoreRead)?
        .iter()
        .map(|s| s.position)
        .collect();

    let moves = plan_compaction(&positions);
    for m in &moves {
        store
            .update_position(doc_id, m.from, m.to)
            .await
            .map_err(|e| PipelineError::write("compact", e))?;
    }

    if !moves.is_empty() {
        debug!(doc_id = %doc_id, moved = moves.len(), "positions compacted");
    }
    Ok(moves.len())
}

fn apply_moves<'a, T>(
    moves: impl Iterator<Item = &'a PositionMove>,
    items: &mut BTreeMap<i64, T>,
) -> std::result::Result<(), i64> {
    for m in moves {
        if items.contains_key(&m.to) {
            return Err(m.to);
        }
        let item = items.remove(&m.from).ok_or(m.from)?;
        items.insert(m.to, item);
    }
    Ok(())
}
