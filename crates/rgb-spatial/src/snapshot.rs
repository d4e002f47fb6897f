//! Point-in-time captures of a grid for replay verification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::GridBuffers;
use crate::{CellRange, DirtyOp, Entry, GridState};

/// Copy of a grid's state and buffers taken at `tick`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub tick: u64,
    pub state: GridState,
    pub entries: Vec<Entry>,
    pub ranges: Vec<CellRange>,
    pub dirty_ops: Vec<DirtyOp>,
}

/// First field where a snapshot and a live grid disagree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotMismatch {
    pub field: String,
    pub snapshot: String,
    pub live: String,
}

impl SnapshotMismatch {
    fn new(field: impl Into<String>, snapshot: impl fmt::Debug, live: impl fmt::Debug) -> Self {
        Self {
            field: field.into(),
            snapshot: format!("{snapshot:?}"),
            live: format!("{live:?}"),
        }
    }
}

impl fmt::Display for SnapshotMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} differs: snapshot has {}, live grid has {}",
            self.field, self.snapshot, self.live
        )
    }
}

/// Scalar summary of how far apart two snapshots are (`later - earlier`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub entry_count_delta: i64,
    pub cell_range_delta: i64,
    pub dirty_op_delta: i64,
    pub version_delta: i64,
}

impl SnapshotDiff {
    /// Whether nothing changed between the two snapshots.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.entry_count_delta == 0
            && self.cell_range_delta == 0
            && self.dirty_op_delta == 0
            && self.version_delta == 0
    }
}

fn delta(earlier: usize, later: usize) -> i64 {
    later as i64 - earlier as i64
}

macro_rules! check_field {
    ($snapshot:expr, $live:expr, $($field:ident).+) => {
        if $snapshot.$($field).+ != $live.$($field).+ {
            return Some(SnapshotMismatch::new(
                stringify!($($field).+),
                $snapshot.$($field).+,
                $live.$($field).+,
            ));
        }
    };
}

impl GridSnapshot {
    /// Copy the given state, buffers and pending ops.
    #[must_use]
    pub fn capture(tick: u64, state: &GridState, buffers: &GridBuffers, dirty_ops: &[DirtyOp]) -> Self {
        Self {
            tick,
            state: *state,
            entries: buffers.entries().to_vec(),
            ranges: buffers.ranges().to_vec(),
            dirty_ops: dirty_ops.to_vec(),
        }
    }

    /// Compare against a live grid, reporting the first difference.
    ///
    /// Rebuild durations are wall-clock measurements and are not compared.
    #[must_use]
    pub fn compare(
        &self,
        state: &GridState,
        buffers: &GridBuffers,
        dirty_ops: &[DirtyOp],
    ) -> Option<SnapshotMismatch> {
        let snap = &self.state;
        check_field!(snap, state, version);
        check_field!(snap, state, entry_count);
        check_field!(snap, state, active_buffer);
        check_field!(snap, state, last_dirty_tick);
        check_field!(snap, state, last_dirty_version);
        check_field!(snap, state, dirty.adds);
        check_field!(snap, state, dirty.updates);
        check_field!(snap, state, dirty.removes);
        check_field!(snap, state, unmapped_count);
        check_field!(snap, state, last_rebuild_strategy);

        if self.entries.len() != buffers.len() {
            return Some(SnapshotMismatch::new("entries.len", self.entries.len(), buffers.len()));
        }
        if self.ranges.len() != buffers.ranges().len() {
            return Some(SnapshotMismatch::new(
                "ranges.len",
                self.ranges.len(),
                buffers.ranges().len(),
            ));
        }
        if self.dirty_ops.len() != dirty_ops.len() {
            return Some(SnapshotMismatch::new("dirty_ops.len", self.dirty_ops.len(), dirty_ops.len()));
        }

        let entries = self.entries.iter().zip(buffers.entries());
        if let Some((index, (ours, live))) = entries.enumerate().find(|(_, (a, b))| a != b) {
            return Some(SnapshotMismatch::new(format!("entries[{index}]"), ours, live));
        }
        let ranges = self.ranges.iter().zip(buffers.ranges());
        if let Some((index, (ours, live))) = ranges.enumerate().find(|(_, (a, b))| a != b) {
            return Some(SnapshotMismatch::new(format!("ranges[{index}]"), ours, live));
        }
        let ops = self.dirty_ops.iter().zip(dirty_ops);
        if let Some((index, (ours, live))) = ops.enumerate().find(|(_, (a, b))| a != b) {
            return Some(SnapshotMismatch::new(format!("dirty_ops[{index}]"), ours, live));
        }
        None
    }

    /// Scalar deltas from `self` to `later`.
    #[must_use]
    pub fn diff(&self, later: &Self) -> SnapshotDiff {
        SnapshotDiff {
            entry_count_delta: delta(self.state.entry_count, later.state.entry_count),
            cell_range_delta: delta(self.ranges.len(), later.ranges.len()),
            dirty_op_delta: delta(self.dirty_ops.len(), later.dirty_ops.len()),
            version_delta: later.state.version as i64 - self.state.version as i64,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
