//! Bounded undo history of dataset snapshots.

use std::collections::VecDeque;

use log::trace;

use crate::dataset::Snapshot;

/// Number of snapshots a session keeps.
pub const DEFAULT_UNDO_DEPTH: usize = 2;

/// Most-recent-last stack of snapshots holding at most `depth` entries.
///
/// Pushing onto a full history discards the oldest snapshot.
///
/// ```
/// use u_statkit::dataset::Dataset;
/// use u_statkit::history::UndoHistory;
///
/// let mut history = UndoHistory::new(2);
/// for _ in 0..3 {
///     history.push(Dataset::new().snapshot());
/// }
/// assert_eq!(history.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct UndoHistory {
    depth: usize,
    snapshots: VecDeque<Snapshot>,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_DEPTH)
    }
}

impl UndoHistory {
    /// Empty history keeping at most `depth` snapshots.
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            snapshots: VecDeque::with_capacity(depth),
        }
    }

    /// Records a snapshot, evicting the oldest one when full.
    pub fn push(&mut self, snapshot: Snapshot) {
        if self.depth == 0 {
            return;
        }
        if self.snapshots.len() == self.depth {
            self.snapshots.pop_front();
            trace!("undo history full, oldest snapshot discarded");
        }
        self.snapshots.push_back(snapshot);
        trace!("snapshot pushed ({}/{})", self.snapshots.len(), self.depth);
    }

    /// Removes and returns the most recent snapshot.
    pub fn pop(&mut self) -> Option<Snapshot> {
        let snapshot = self.snapshots.pop_back();
        if snapshot.is_some() {
            trace!("snapshot popped ({} left)", self.snapshots.len());
        }
        snapshot
    }

    /// Number of snapshots held.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns `true` when there is nothing to undo.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Maximum number of snapshots kept.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Drops every snapshot.
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}
