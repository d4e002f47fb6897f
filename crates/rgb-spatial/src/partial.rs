//! Incremental application of dirty ops to the sorted buffers.
//!
//! Ops replay in order against a scratch copy of the entry buffer while
//! per-cell counts and starts are tracked alongside. The scratch copy is
//! swapped in only when the whole batch applies, so a failed batch leaves
//! the active buffers exactly as they were.

use crate::storage::GridBuffers;
use crate::{
    CellId, CellRange, DirtyOp, DirtyOpKind, Entity, Entry, GridConfig, LayoutError,
    PartialRebuildError,
};

/// What a successful partial pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartialOutcome {
    pub applied: usize,
    /// Adds and updates whose target could not be resolved to a cell.
    pub unmapped: usize,
}

/// Reusable scratch memory for partial rebuilds.
#[derive(Debug, Default)]
pub struct PartialUpdater {
    entries: Vec<Entry>,
    counts: Vec<u32>,
    starts: Vec<u32>,
}

impl PartialUpdater {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `ops` to `buffers`, or leave them untouched and report why not.
    pub fn apply(
        &mut self,
        config: &GridConfig,
        buffers: &mut GridBuffers,
        ops: &[DirtyOp],
    ) -> Result<PartialOutcome, PartialRebuildError> {
        let cell_count = config.cell_count();
        if buffers.ranges.len() != cell_count {
            return Err(PartialRebuildError::RangeCountMismatch {
                ranges: buffers.ranges.len(),
                configured: cell_count,
            });
        }
        buffers.check_ranges().map_err(|err| match err {
            LayoutError::NonContiguous {
                cell,
                start,
                expected,
            } => PartialRebuildError::NonContiguousRanges {
                cell,
                start,
                expected,
            },
            _ => PartialRebuildError::EntryCountMismatch {
                entries: buffers.entries.len(),
                counted: buffers.ranges.iter().map(|r| r.count as usize).sum(),
            },
        })?;

        self.entries.clear();
        self.entries.extend_from_slice(&buffers.entries);
        self.counts.clear();
        self.counts.extend(buffers.ranges.iter().map(|r| r.count));
        self.starts.clear();
        self.starts.extend(buffers.ranges.iter().map(|r| r.start));

        let mut outcome = PartialOutcome::default();
        for op in ops {
            if self.apply_op(op, cell_count)? {
                outcome.unmapped += 1;
            }
            outcome.applied += 1;
        }

        std::mem::swap(&mut buffers.entries, &mut self.entries);
        buffers.ranges.clear();
        buffers.ranges.extend(
            self.starts
                .iter()
                .zip(&self.counts)
                .map(|(&start, &count)| CellRange::new(start, count)),
        );
        debug_assert_eq!(buffers.validate_layout(), Ok(()));
        Ok(outcome)
    }

    /// Returns `true` when the op's entity ended up unmapped.
    fn apply_op(&mut self, op: &DirtyOp, cell_count: usize) -> Result<bool, PartialRebuildError> {
        match op.kind {
            DirtyOpKind::Add => {
                let Some(target) = target_cell(op.new_cell, cell_count)? else {
                    return Ok(true);
                };
                self.upsert(target, op);
                Ok(false)
            }
            DirtyOpKind::Remove => {
                let Some(source) = target_cell(op.old_cell, cell_count)? else {
                    // Never placed in a bucket, nothing to take out.
                    return Ok(false);
                };
                let Ok(slot) = self.find(source, op.entity) else {
                    return Err(PartialRebuildError::StaleRemove {
                        entity: op.entity,
                        cell: op.old_cell,
                    });
                };
                self.remove_at(source, slot);
                Ok(false)
            }
            DirtyOpKind::Update => self.update(op, cell_count),
        }
    }

    fn update(&mut self, op: &DirtyOp, cell_count: usize) -> Result<bool, PartialRebuildError> {
        let source = target_cell(op.old_cell, cell_count)?;
        let target = target_cell(op.new_cell, cell_count)?;
        let stale = PartialRebuildError::StaleUpdate {
            entity: op.entity,
            cell: op.old_cell,
        };

        match (source, target) {
            (None, None) => Ok(true),
            (None, Some(target)) => {
                self.upsert(target, op);
                Ok(false)
            }
            (Some(source), None) => {
                let slot = self.find(source, op.entity).map_err(|_| stale)?;
                self.remove_at(source, slot);
                Ok(true)
            }
            (Some(source), Some(target)) if source == target => {
                let slot = self.find(source, op.entity).map_err(|_| stale)?;
                self.entries[slot].position = op.position;
                Ok(false)
            }
            (Some(source), Some(target)) => {
                if let Ok(slot) = self.find(source, op.entity) {
                    self.remove_at(source, slot);
                    self.upsert(target, op);
                } else if let Ok(slot) = self.find(target, op.entity) {
                    // Same move replayed: the entity already lives in the target.
                    self.entries[slot].position = op.position;
                } else {
                    return Err(stale);
                }
                Ok(false)
            }
        }
    }

    /// Absolute slot of `entity` within `cell`, or where it would be inserted.
    fn find(&self, cell: usize, entity: Entity) -> Result<usize, usize> {
        let start = self.starts[cell] as usize;
        let end = start + self.counts[cell] as usize;
        self.entries[start..end]
            .binary_search_by(|entry| entry.entity.cmp(&entity))
            .map(|offset| start + offset)
            .map_err(|offset| start + offset)
    }

    fn upsert(&mut self, cell: usize, op: &DirtyOp) {
        match self.find(cell, op.entity) {
            Ok(slot) => self.entries[slot].position = op.position,
            Err(slot) => {
                self.entries.insert(
                    slot,
                    Entry::new(op.entity, op.position, CellId(cell as i32)),
                );
                self.counts[cell] += 1;
                for start in &mut self.starts[cell + 1..] {
                    *start += 1;
                }
            }
        }
    }

    fn remove_at(&mut self, cell: usize, slot: usize) {
        self.entries.remove(slot);
        self.counts[cell] -= 1;
        for start in &mut self.starts[cell + 1..] {
            *start -= 1;
        }
    }
}

/// Map an op's cell to a range-table index.
///
/// `Ok(None)` for the unresolved sentinel, an error for anything else
/// outside the table.
fn target_cell(cell: CellId, cell_count: usize) -> Result<Option<usize>, PartialRebuildError> {
    if cell == CellId::UNRESOLVED {
        return Ok(None);
    }
    cell.index(cell_count)
        .map(Some)
        .ok_or(PartialRebuildError::CellOutOfBounds { cell, cell_count })
}
