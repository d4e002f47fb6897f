//! Cells, cell ranges and the entries bucketed into them.

use std::cmp::Ordering;
use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::Entity;

/// Flattened row-major cell identifier.
///
/// Negative values mean "unresolved": the position could not be mapped to
/// a cell of the active configuration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub i32);

impl CellId {
    /// Sentinel for a position outside the configured bounds.
    pub const UNRESOLVED: Self = Self(-1);

    /// Whether this id names a real cell.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        self.0 >= 0
    }

    /// The cell as an index into a range table of `cell_count` cells.
    #[must_use]
    pub const fn index(self, cell_count: usize) -> Option<usize> {
        if self.0 >= 0 && (self.0 as usize) < cell_count {
            Some(self.0 as usize)
        } else {
            None
        }
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_resolved() {
            write!(f, "Cell({})", self.0)
        } else {
            f.write_str("Cell(unresolved)")
        }
    }
}

/// Slice of the entry buffer owned by one cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    pub start: u32,
    pub count: u32,
}

impl CellRange {
    #[must_use]
    pub const fn new(start: u32, count: u32) -> Self {
        Self { start, count }
    }

    /// One past the last entry of the cell.
    #[must_use]
    pub const fn end(self) -> u32 {
        self.start + self.count
    }

    /// Entry indices covered by the cell.
    #[must_use]
    pub const fn as_range(self) -> std::ops::Range<usize> {
        self.start as usize..self.end() as usize
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.count == 0
    }
}

/// An indexed entity: its handle, last known position and resolved cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub entity: Entity,
    pub position: Vec3,
    pub cell: CellId,
}

impl Entry {
    #[must_use]
    pub const fn new(entity: Entity, position: Vec3, cell: CellId) -> Self {
        Self {
            entity,
            position,
            cell,
        }
    }

    /// Canonical buffer order: cell, then entity.
    ///
    /// Positions break the remaining ties so duplicated handles still sort
    /// reproducibly.
    #[must_use]
    pub fn layout_cmp(&self, other: &Self) -> Ordering {
        self.cell
            .cmp(&other.cell)
            .then(self.entity.cmp(&other.entity))
            .then_with(|| self.position.x.total_cmp(&other.position.x))
            .then_with(|| self.position.y.total_cmp(&other.position.y))
            .then_with(|| self.position.z.total_cmp(&other.position.z))
    }
}

/// An entity the host wants indexed, as fed to a full rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedEntity {
    pub entity: Entity,
    pub position: Vec3,
}

impl IndexedEntity {
    #[must_use]
    pub const fn new(entity: Entity, position: Vec3) -> Self {
        Self { entity, position }
    }
}
