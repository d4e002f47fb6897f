//! Dirty operations emitted by the upstream movement system.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{CellId, Entity, GridConfig, quantize};

/// Kind of membership change a [`DirtyOp`] carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirtyOpKind {
    Add,
    Update,
    Remove,
}

/// One pending membership change.
///
/// `Add` carries `old_cell = UNRESOLVED`, `Remove` carries
/// `new_cell = UNRESOLVED`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirtyOp {
    pub entity: Entity,
    pub position: Vec3,
    pub old_cell: CellId,
    pub new_cell: CellId,
    pub kind: DirtyOpKind,
}

impl DirtyOp {
    /// Add with an already resolved target cell.
    #[must_use]
    pub const fn add(entity: Entity, position: Vec3, new_cell: CellId) -> Self {
        Self {
            entity,
            position,
            old_cell: CellId::UNRESOLVED,
            new_cell,
            kind: DirtyOpKind::Add,
        }
    }

    /// Move between two already resolved cells.
    #[must_use]
    pub const fn update(entity: Entity, position: Vec3, old_cell: CellId, new_cell: CellId) -> Self {
        Self {
            entity,
            position,
            old_cell,
            new_cell,
            kind: DirtyOpKind::Update,
        }
    }

    /// Remove from the cell the entity was last placed in.
    #[must_use]
    pub const fn remove(entity: Entity, position: Vec3, old_cell: CellId) -> Self {
        Self {
            entity,
            position,
            old_cell,
            new_cell: CellId::UNRESOLVED,
            kind: DirtyOpKind::Remove,
        }
    }

    /// `Add` with the target cell resolved against `config`.
    #[must_use]
    pub fn add_at(entity: Entity, position: Vec3, config: &GridConfig) -> Self {
        Self::add(entity, position, quantize::cell_id(position, config))
    }

    /// `Update` from a known cell to wherever `position` now resolves.
    #[must_use]
    pub fn update_to(entity: Entity, position: Vec3, old_cell: CellId, config: &GridConfig) -> Self {
        Self::update(entity, position, old_cell, quantize::cell_id(position, config))
    }
}

/// Per-kind tallies of dirty ops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyCounters {
    pub adds: u64,
    pub updates: u64,
    pub removes: u64,
}

impl DirtyCounters {
    /// Count one op of `kind`.
    pub fn record(&mut self, kind: DirtyOpKind) {
        match kind {
            DirtyOpKind::Add => self.adds += 1,
            DirtyOpKind::Update => self.updates += 1,
            DirtyOpKind::Remove => self.removes += 1,
        }
    }

    /// Per-kind counts of a batch.
    #[must_use]
    pub fn tally(ops: &[DirtyOp]) -> Self {
        let mut counters = Self::default();
        for op in ops {
            counters.record(op.kind);
        }
        counters
    }

    /// Ops of every kind.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.adds + self.updates + self.removes
    }
}

#[cfg(test)]
mod tests {
    use glam::UVec3;

    use super::*;

    #[test]
    fn test_constructors_fill_sentinels() {
        let entity = Entity::from_index(3);
        let add = DirtyOp::add(entity, Vec3::ZERO, CellId(4));
        assert_eq!(add.old_cell, CellId::UNRESOLVED);
        let remove = DirtyOp::remove(entity, Vec3::ZERO, CellId(4));
        assert_eq!(remove.new_cell, CellId::UNRESOLVED);
    }

    #[test]
    fn test_resolving_constructors() {
        let config = GridConfig::uniform(Vec3::ZERO, 1.0, UVec3::splat(4));
        let entity = Entity::from_index(0);
        let add = DirtyOp::add_at(entity, Vec3::new(1.5, 0.5, 0.5), &config);
        assert_eq!(add.new_cell, CellId(16));
        let update = DirtyOp::update_to(entity, Vec3::splat(0.5), add.new_cell, &config);
        assert_eq!((update.old_cell, update.new_cell), (CellId(16), CellId(0)));
    }

    #[test]
    fn test_tally() {
        let entity = Entity::from_index(0);
        let ops = [
            DirtyOp::add(entity, Vec3::ZERO, CellId(0)),
            DirtyOp::update(entity, Vec3::ZERO, CellId(0), CellId(1)),
            DirtyOp::update(entity, Vec3::ZERO, CellId(1), CellId(1)),
            DirtyOp::remove(entity, Vec3::ZERO, CellId(1)),
        ];
        let counters = DirtyCounters::tally(&ops);
        assert_eq!((counters.adds, counters.updates, counters.removes), (1, 2, 1));
        assert_eq!(counters.total(), 4);
    }
}
