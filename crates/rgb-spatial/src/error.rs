//! Error types.

use thiserror::Error;

use crate::{CellId, Entity, ProviderId};

/// A grid configuration a provider refuses to activate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("cell size must be positive and finite, got {0}")]
    NonPositiveCellSize(f32),

    #[error("world bounds must be finite")]
    NonFiniteBounds,

    #[error("world min must not exceed world max on any axis")]
    InvertedBounds,

    #[error("cell count on axis {axis} must be positive")]
    ZeroCellCount { axis: char },

    #[error("total cell count does not fit a cell id")]
    CellCountOverflow,

    #[error(
        "uniform grid must tile the world exactly: axis {axis} extent is {expected}, cells cover {actual}"
    )]
    UniformTilingMismatch {
        axis: char,
        expected: f32,
        actual: f32,
    },

    #[error("no provider registered under {0:?}")]
    UnknownProvider(ProviderId),

    #[error("provider id space exhausted")]
    ProviderIdsExhausted,

    #[error("provider name already registered: {0}")]
    DuplicateProviderName(String),
}

/// Why a batch of dirty ops could not be applied incrementally.
///
/// The buffers are untouched whenever this is returned; the caller is
/// expected to fall back to a full rebuild for the tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartialRebuildError {
    #[error("remove of {entity} is stale: not present in cell {cell:?}")]
    StaleRemove { entity: Entity, cell: CellId },

    #[error("update of {entity} is stale: not present in cell {cell:?}")]
    StaleUpdate { entity: Entity, cell: CellId },

    #[error("cell {cell:?} is outside the grid of {cell_count} cells")]
    CellOutOfBounds { cell: CellId, cell_count: usize },

    #[error("{ranges} cell ranges recorded but the config has {configured} cells")]
    RangeCountMismatch { ranges: usize, configured: usize },

    #[error("{entries} entries stored but cell ranges account for {counted}")]
    EntryCountMismatch { entries: usize, counted: usize },

    #[error("cell {cell} range starts at {start}, previous range ends at {expected}")]
    NonContiguousRanges {
        cell: usize,
        start: u32,
        expected: u64,
    },
}

/// A malformed output layout for a batched query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("{queries} queries but {slots} slots and {counts} counts")]
    LengthMismatch {
        queries: usize,
        slots: usize,
        counts: usize,
    },

    #[error("slot {index} ends at {end}, past the output length {len}")]
    SlotOutOfBounds { index: usize, end: usize, len: usize },

    #[error("slot {index} starts at {start}, before the previous slot ends at {previous_end}")]
    OverlappingSlots {
        index: usize,
        start: usize,
        previous_end: usize,
    },
}

/// A violated entry/range layout invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("cell ranges count {counted} entries, buffer holds {entries}")]
    CountMismatch { entries: usize, counted: usize },

    #[error("cell {cell} starts at {start}, expected {expected}")]
    NonContiguous {
        cell: usize,
        start: u32,
        expected: u64,
    },

    #[error("entries {index} and {next} are out of (cell, entity) order")]
    Unsorted { index: usize, next: usize },

    #[error("entry {index} is tagged {tagged:?} but stored in cell {stored}")]
    WrongCell {
        index: usize,
        tagged: CellId,
        stored: usize,
    },
}
