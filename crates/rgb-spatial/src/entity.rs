//! Versioned entity handles.
//!
//! The index never owns entities; it only stores the handles the upstream
//! movement system hands it. Handles carry a generation so a recycled slot
//! is never confused with the entity that previously occupied it, and they
//! have a total order (index, then generation) that every deterministic
//! sort in this crate relies on.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Generation counter for a recycled entity slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Generation(u32);

impl Generation {
    /// First generation of a fresh slot.
    pub const FIRST: Self = Self(0);

    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The generation a slot gets after being freed.
    #[must_use]
    pub const fn bumped(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// An opaque `(index, generation)` entity handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    index: u32,
    generation: Generation,
}

impl Entity {
    #[must_use]
    pub const fn new(index: u32, generation: Generation) -> Self {
        Self { index, generation }
    }

    /// Shorthand for a first-generation handle.
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self::new(index, Generation::FIRST)
    }

    /// Slot index, reused once the entity is freed.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation distinguishing reuses of the same index.
    #[must_use]
    pub const fn generation(self) -> Generation {
        self.generation
    }

    /// Pack into a single `u64` (generation in the high half).
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation.0 as u64) << 32) | (self.index as u64)
    }

    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: Generation((bits >> 32) as u32),
        }
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index
            .cmp(&other.index)
            .then(self.generation.cmp(&other.generation))
    }
}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation.0)
    }
}

/// Hands out entity handles and recycles freed slots with a bumped generation.
///
/// Hosts that already have an entity allocator don't need this; it exists
/// for simulations and tools that drive the index directly.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    generations: Vec<Generation>,
    free: Vec<u32>,
    alive: u32,
}

impl EntityAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            generations: Vec::new(),
            free: Vec::new(),
            alive: 0,
        }
    }

    /// Hand out a fresh handle, reusing freed slots first.
    pub fn allocate(&mut self) -> Entity {
        self.alive += 1;
        if let Some(index) = self.free.pop() {
            return Entity::new(index, self.generations[index as usize]);
        }
        let index = self.generations.len() as u32;
        self.generations.push(Generation::FIRST);
        Entity::new(index, Generation::FIRST)
    }

    /// Free a live entity. Returns `false` for stale or unknown handles.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = &mut self.generations[entity.index() as usize];
        *slot = slot.bumped();
        self.free.push(entity.index());
        self.alive -= 1;
        true
    }

    /// Whether `entity` is the live occupant of its slot.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.generations
            .get(entity.index() as usize)
            .is_some_and(|generation| *generation == entity.generation())
            && !self.free.contains(&entity.index())
    }

    #[must_use]
    pub const fn alive_count(&self) -> u32 {
        self.alive
    }
}
