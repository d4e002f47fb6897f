//! The active sorted entry buffer and its per-cell range table.

use std::ops::Range;

use crate::{CellRange, Entry, LayoutError};

/// Entries sorted by `(cell, entity)` plus one [`CellRange`] per cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridBuffers {
    pub(crate) entries: Vec<Entry>,
    pub(crate) ranges: Vec<CellRange>,
}

impl GridBuffers {
    /// Empty buffers laid out for `cell_count` cells.
    #[must_use]
    pub fn with_cells(cell_count: usize) -> Self {
        Self {
            entries: Vec::new(),
            ranges: vec![CellRange::default(); cell_count],
        }
    }

    /// Build from already sorted entries and matching ranges.
    ///
    /// The pair is checked with [`validate_layout`](Self::validate_layout)
    /// so every query can slice the entry buffer by range.
    pub fn from_parts(entries: Vec<Entry>, ranges: Vec<CellRange>) -> Result<Self, LayoutError> {
        let buffers = Self { entries, ranges };
        buffers.validate_layout()?;
        Ok(buffers)
    }

    /// All entries, sorted by `(cell, entity)`.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// One range per cell, indexed by flattened cell id.
    #[must_use]
    pub fn ranges(&self) -> &[CellRange] {
        &self.ranges
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries stored in one cell; empty for ids outside the table.
    #[must_use]
    pub fn cell_entries(&self, cell: usize) -> &[Entry] {
        self.ranges
            .get(cell)
            .map_or(&[][..], |range| &self.entries[range.as_range()])
    }

    /// Drop all entries and reshape the range table.
    pub fn reset(&mut self, cell_count: usize) {
        self.entries.clear();
        self.ranges.clear();
        self.ranges.resize(cell_count, CellRange::default());
    }

    /// Ranges start where the previous one ends and cover every entry.
    ///
    /// Once this holds, slicing the entry buffer by any range is in bounds.
    pub(crate) fn check_ranges(&self) -> Result<(), LayoutError> {
        let mut expected = 0u64;
        for (cell, range) in self.ranges.iter().enumerate() {
            if u64::from(range.start) != expected {
                return Err(LayoutError::NonContiguous {
                    cell,
                    start: range.start,
                    expected,
                });
            }
            expected += u64::from(range.count);
        }

        if expected != self.entries.len() as u64 {
            return Err(LayoutError::CountMismatch {
                entries: self.entries.len(),
                counted: expected as usize,
            });
        }
        Ok(())
    }

    /// Check every layout invariant the rebuild paths promise.
    pub fn validate_layout(&self) -> Result<(), LayoutError> {
        self.check_ranges()?;

        for (cell, range) in self.ranges.iter().enumerate() {
            for index in range.as_range() {
                let tagged = self.entries[index].cell;
                if tagged.index(self.ranges.len()) != Some(cell) {
                    return Err(LayoutError::WrongCell {
                        index,
                        tagged,
                        stored: cell,
                    });
                }
            }
        }

        for (index, pair) in self.entries.windows(2).enumerate() {
            let ordered = pair[0].cell < pair[1].cell
                || (pair[0].cell == pair[1].cell && pair[0].entity <= pair[1].entity);
            if !ordered {
                return Err(LayoutError::Unsorted {
                    index,
                    next: index + 1,
                });
            }
        }

        Ok(())
    }
}

/// Rebuild a contiguous range table from per-cell counts.
pub(crate) fn ranges_from_counts(counts: &[u32], ranges: &mut Vec<CellRange>) {
    ranges.clear();
    ranges.reserve(counts.len());
    let mut start = 0u32;
    for &count in counts {
        ranges.push(CellRange::new(start, count));
        start += count;
    }
}

/// Slices of the entry buffer covering `cells` (a contiguous id span).
pub(crate) fn span(ranges: &[CellRange], cells: Range<usize>) -> Range<usize> {
    if cells.is_empty() {
        return 0..0;
    }
    ranges[cells.start].start as usize..ranges[cells.end - 1].end() as usize
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::{CellId, Entity};

    fn entry(index: u32, cell: i32) -> Entry {
        Entry::new(Entity::from_index(index), Vec3::ZERO, CellId(cell))
    }

    #[test]
    fn test_valid_layout() {
        let buffers = GridBuffers::from_parts(
            vec![entry(1, 0), entry(4, 0), entry(2, 2)],
            vec![
                CellRange::new(0, 2),
                CellRange::new(2, 0),
                CellRange::new(2, 1),
            ],
        )
        .unwrap();
        assert_eq!(buffers.cell_entries(0).len(), 2);
        assert!(buffers.cell_entries(1).is_empty());
        assert!(buffers.cell_entries(9).is_empty());
        assert_eq!(span(buffers.ranges(), 0..3), 0..3);
        assert_eq!(span(buffers.ranges(), 1..2), 2..2);
    }

    #[test]
    fn test_detects_count_mismatch() {
        let result = GridBuffers::from_parts(
            vec![entry(1, 0), entry(2, 0)],
            vec![CellRange::new(0, 1), CellRange::new(1, 0)],
        );
        assert!(matches!(result, Err(LayoutError::CountMismatch { .. })));
    }

    #[test]
    fn test_detects_unsorted_entities() {
        let result = GridBuffers::from_parts(vec![entry(5, 0), entry(2, 0)], vec![CellRange::new(0, 2)]);
        assert_eq!(result, Err(LayoutError::Unsorted { index: 0, next: 1 }));
    }

    #[test]
    fn test_rejects_ranges_past_the_buffer() {
        let result = GridBuffers::from_parts(
            vec![entry(1, 0)],
            vec![CellRange::new(3, 1), CellRange::new(0, 0)],
        );
        assert_eq!(
            result,
            Err(LayoutError::NonContiguous {
                cell: 0,
                start: 3,
                expected: 0,
            })
        );

        let result = GridBuffers::from_parts(
            Vec::new(),
            vec![CellRange::new(0, u32::MAX), CellRange::new(u32::MAX, 1)],
        );
        assert!(matches!(result, Err(LayoutError::CountMismatch { .. })));
    }

    #[test]
    fn test_ranges_from_counts() {
        let mut ranges = Vec::new();
        ranges_from_counts(&[2, 0, 3], &mut ranges);
        assert_eq!(
            ranges,
            vec![
                CellRange::new(0, 2),
                CellRange::new(2, 0),
                CellRange::new(2, 3)
            ]
        );
    }
}
