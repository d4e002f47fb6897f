//! Full rebuild: parallel gather, deterministic sort, sequential bucketing.
//!
//! ```text
//! indexed entities ──par_chunks──▶ per-thread Vec<Entry>   (gather, rayon)
//!                                        │ barrier
//!                                        ▼
//!                          merged + sorted by (cell, entity) (single thread)
//!                                        │
//!                                        ▼
//!                       cell boundaries ─▶ CellRange table   (single thread)
//!                                        │
//!                                        ▼
//!                          swap staging ◀─▶ active buffers
//! ```
//!
//! The comparator, not the merge order of the per-thread buffers, is what
//! makes the output identical across runs and thread counts.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use thread_local::ThreadLocal;

use crate::storage::{GridBuffers, ranges_from_counts};
use crate::{CellRange, Entry, GridConfig, IndexedEntity, quantize};

/// Entities handed to one gather task.
const GATHER_CHUNK: usize = 2048;

/// What a full rebuild produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FullRebuildOutcome {
    pub entry_count: usize,
    /// Entities dropped because their position resolved to no cell.
    pub unmapped: usize,
}

/// Scratch buffers for full rebuilds, overwritten on every call.
///
/// After a rebuild the staging side holds the previous active buffers so
/// their allocations get reused next time.
#[derive(Default)]
pub struct RebuildStaging {
    gather: ThreadLocal<RefCell<Vec<Entry>>>,
    entries: Vec<Entry>,
    counts: Vec<u32>,
    ranges: Vec<CellRange>,
}

impl fmt::Debug for RebuildStaging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebuildStaging")
            .field("entries_capacity", &self.entries.capacity())
            .finish_non_exhaustive()
    }
}

impl RebuildStaging {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild `buffers` from scratch out of `indexed`.
    pub fn rebuild(
        &mut self,
        config: &GridConfig,
        indexed: &[IndexedEntity],
        buffers: &mut GridBuffers,
    ) -> FullRebuildOutcome {
        let unmapped = self.gather(config, indexed);
        self.merge_and_sort(indexed.len());
        self.bucketize(config.cell_count());

        std::mem::swap(&mut buffers.entries, &mut self.entries);
        std::mem::swap(&mut buffers.ranges, &mut self.ranges);

        FullRebuildOutcome {
            entry_count: buffers.entries.len(),
            unmapped,
        }
    }

    /// Quantize every entity in parallel into per-thread buffers.
    fn gather(&mut self, config: &GridConfig, indexed: &[IndexedEntity]) -> usize {
        for local in self.gather.iter_mut() {
            local.get_mut().clear();
        }

        let cell_count = config.cell_count();
        let unmapped = AtomicUsize::new(0);
        let gather = &self.gather;

        indexed.par_chunks(GATHER_CHUNK).for_each(|chunk| {
            let mut local = gather.get_or_default().borrow_mut();
            local.reserve(chunk.len());
            let mut dropped = 0;
            for item in chunk {
                let cell = quantize::cell_id(item.position, config);
                if cell.index(cell_count).is_some() {
                    local.push(Entry::new(item.entity, item.position, cell));
                } else {
                    dropped += 1;
                }
            }
            if dropped > 0 {
                unmapped.fetch_add(dropped, Ordering::Relaxed);
            }
        });

        unmapped.into_inner()
    }

    fn merge_and_sort(&mut self, expected: usize) {
        self.entries.clear();
        self.entries.reserve(expected);
        for local in self.gather.iter_mut() {
            self.entries.append(local.get_mut());
        }
        self.entries.sort_unstable_by(Entry::layout_cmp);
    }

    /// One pass over the sorted entries, cutting at every cell boundary.
    fn bucketize(&mut self, cell_count: usize) {
        self.counts.clear();
        self.counts.resize(cell_count, 0);

        let mut run_start = 0;
        while run_start < self.entries.len() {
            let cell = self.entries[run_start].cell;
            let run_end = self.entries[run_start..]
                .iter()
                .position(|entry| entry.cell != cell)
                .map_or(self.entries.len(), |offset| run_start + offset);
            if let Some(index) = cell.index(cell_count) {
                self.counts[index] = (run_end - run_start) as u32;
            }
            run_start = run_end;
        }

        ranges_from_counts(&self.counts, &mut self.ranges);
    }
}
