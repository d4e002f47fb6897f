//! Reverse index from entity to its slot in the entry buffer.
//!
//! Rebuilt wholesale after every mutation pass. Patching it alongside the
//! shifting inserts of a partial rebuild would touch every downstream slot
//! anyway, and a full rebuild keeps it from drifting out of sync.

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::{CellId, Entity, Entry};

/// Where an entity currently sits in the entry buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LookupSlot {
    pub index: u32,
    pub cell: CellId,
}

/// Reverse index from entity to its slot in the entry buffer.
#[derive(Debug, Default, Clone)]
pub struct EntryLookup {
    slots: HashMap<Entity, LookupSlot, FxBuildHasher>,
}

impl EntryLookup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole index with the contents of `entries`.
    pub fn rebuild(&mut self, entries: &[Entry]) {
        self.slots.clear();
        self.slots.reserve(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            self.slots.insert(
                entry.entity,
                LookupSlot {
                    index: index as u32,
                    cell: entry.cell,
                },
            );
        }
    }

    /// Slot and cell of `entity`, if indexed.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<LookupSlot> {
        self.slots.get(&entity).copied()
    }

    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.slots.contains_key(&entity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[test]
    fn test_rebuild_replaces_previous_contents() {
        let a = Entity::from_index(1);
        let b = Entity::from_index(2);
        let mut lookup = EntryLookup::new();

        lookup.rebuild(&[
            Entry::new(a, Vec3::ZERO, CellId(0)),
            Entry::new(b, Vec3::ONE, CellId(3)),
        ]);
        assert_eq!(
            lookup.get(b),
            Some(LookupSlot {
                index: 1,
                cell: CellId(3)
            })
        );

        lookup.rebuild(&[Entry::new(b, Vec3::ONE, CellId(1))]);
        assert!(!lookup.contains(a));
        assert_eq!(lookup.get(b).map(|slot| slot.index), Some(0));
        assert_eq!(lookup.len(), 1);
    }
}
