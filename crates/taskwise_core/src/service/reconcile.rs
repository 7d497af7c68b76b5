//! Maps validated model rows back onto live task identities.
//!
//! # Invariants
//! - A row with an echoed id matches that task only.
//! - A row without an id matches the first snapshot task with the exact
//!   same title and description.
//! - Rows matching nothing produce no update and no error.
//! - At most one update per task, in snapshot order; the first row wins.

use crate::ai::PrioritizedTask;
use crate::model::task::{Priority, Task, TaskId};
use crate::repo::task_repo::PriorityUpdate;
use log::warn;
use std::collections::HashMap;

/// Builds the priority batch for `snapshot` from `rows`.
pub fn reconcile(snapshot: &[Task], rows: &[PrioritizedTask]) -> Vec<PriorityUpdate> {
    let mut chosen: HashMap<TaskId, Priority> = HashMap::with_capacity(rows.len());
    let mut unmatched = 0usize;
    for row in rows {
        match match_row(snapshot, row) {
            Some(id) => {
                chosen.entry(id).or_insert(row.priority);
            }
            None => unmatched += 1,
        }
    }

    let updates: Vec<PriorityUpdate> = snapshot
        .iter()
        .filter_map(|task| {
            chosen.get(&task.id).map(|priority| PriorityUpdate {
                id: task.id,
                priority: *priority,
            })
        })
        .collect();

    if unmatched > 0 {
        warn!(
            "event=reconcile module=service status=partial matched={} unmatched_rows={}",
            updates.len(),
            unmatched
        );
    }
    let missing = snapshot.len().saturating_sub(updates.len());
    if missing > 0 {
        warn!(
            "event=reconcile module=service status=partial snapshot_size={} unprioritized={}",
            snapshot.len(),
            missing
        );
    }

    updates
}

fn match_row(snapshot: &[Task], row: &PrioritizedTask) -> Option<TaskId> {
    let found = match row.id {
        Some(id) => snapshot.iter().find(|task| task.id == id),
        None => snapshot
            .iter()
            .find(|task| task.title == row.title && task.description == row.description),
    };
    found.map(|task| task.id)
}
