//! Versioned summary of the active buffers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DirtyCounters;

/// How the buffers were last rebuilt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RebuildStrategy {
    #[default]
    None,
    Full,
    Partial,
}

/// Versioned bookkeeping for the active buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridState {
    /// Which of the two entry buffers is live; flips on every full rebuild.
    pub active_buffer: u8,
    pub entry_count: usize,
    /// Bumped on every successful rebuild and on config changes.
    pub version: u64,
    pub last_dirty_tick: u64,
    pub last_dirty_version: u64,
    /// Ops consumed by the most recent maintenance pass.
    pub dirty: DirtyCounters,
    /// Entities the most recent rebuild pass could not place in any cell.
    pub unmapped_count: usize,
    pub last_rebuild_duration: Duration,
    pub last_rebuild_strategy: RebuildStrategy,
}

impl GridState {
    pub(crate) fn record_rebuild(
        &mut self,
        strategy: RebuildStrategy,
        entry_count: usize,
        duration: Duration,
    ) {
        self.entry_count = entry_count;
        self.version += 1;
        self.last_rebuild_duration = duration;
        self.last_rebuild_strategy = strategy;
        if strategy == RebuildStrategy::Full {
            self.active_buffer ^= 1;
        }
    }
}
