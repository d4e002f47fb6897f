//! Batched queries writing into caller-partitioned output.
//!
//! The caller sizes one [`BatchSlot`] per query inside a single output
//! slice. Slots must be ascending and disjoint, which lets the batch split
//! the output with `split_at_mut` and hand each half to `rayon::join`
//! without any synchronisation on the write side.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::knn::Ranked;
use super::{Aabb, EntityFilter, GridView, KnnQuery, RadiusQuery};
use crate::{BatchError, Entity};

/// Below this many queries a batch half runs on the current thread.
const SEQUENTIAL_QUERIES: usize = 4;

/// Region of the shared output slice reserved for one query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSlot {
    pub start: usize,
    pub capacity: usize,
}

impl BatchSlot {
    #[must_use]
    pub const fn new(start: usize, capacity: usize) -> Self {
        Self { start, capacity }
    }

    /// One past the slot's last output index.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.start + self.capacity
    }

    /// Back-to-back slots with the given capacities.
    #[must_use]
    pub fn packed(capacities: &[usize]) -> Vec<Self> {
        let mut start = 0;
        capacities
            .iter()
            .map(|&capacity| {
                let slot = Self::new(start, capacity);
                start += capacity;
                slot
            })
            .collect()
    }
}

/// One result of a batched query.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchHit {
    /// Index of the query that produced this hit.
    pub query_index: u32,
    pub entity: Entity,
    /// Squared distance to the query origin, or to the box center for
    /// overlap queries.
    pub distance_sq: f32,
}

impl Default for BatchHit {
    fn default() -> Self {
        Self {
            query_index: u32::MAX,
            entity: Entity::from_index(u32::MAX),
            distance_sq: f32::INFINITY,
        }
    }
}

impl Ranked for BatchHit {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.distance_sq
            .total_cmp(&other.distance_sq)
            .then(self.entity.cmp(&other.entity))
    }
}

fn validate(queries: usize, slots: &[BatchSlot], out: usize, counts: usize) -> Result<(), BatchError> {
    if slots.len() != queries || counts != queries {
        return Err(BatchError::LengthMismatch {
            queries,
            slots: slots.len(),
            counts,
        });
    }
    let mut previous_end = 0;
    for (index, slot) in slots.iter().enumerate() {
        if slot.start < previous_end {
            return Err(BatchError::OverlappingSlots {
                index,
                start: slot.start,
                previous_end,
            });
        }
        let end = slot.start.checked_add(slot.capacity).unwrap_or(usize::MAX);
        if end > out {
            return Err(BatchError::SlotOutOfBounds { index, end, len: out });
        }
        previous_end = end;
    }
    Ok(())
}

/// Run `run_one` for every query, splitting the work with `rayon::join`.
///
/// `out` begins at absolute offset `base` of the caller's slice and
/// `first` is the absolute index of `queries[0]`.
fn split<Q, R>(
    queries: &[Q],
    slots: &[BatchSlot],
    out: &mut [BatchHit],
    counts: &mut [usize],
    base: usize,
    first: usize,
    run_one: &R,
) where
    Q: Sync,
    R: Fn(u32, &Q, &mut [BatchHit]) -> usize + Sync,
{
    if queries.len() <= SEQUENTIAL_QUERIES {
        for (offset, ((query, slot), count)) in queries.iter().zip(slots).zip(counts).enumerate() {
            let local = slot.start - base;
            let window = &mut out[local..local + slot.capacity];
            *count = run_one((first + offset) as u32, query, window);
        }
        return;
    }

    let mid = queries.len() / 2;
    let cut = slots[mid].start;
    let (left_out, right_out) = out.split_at_mut(cut - base);
    let (left_counts, right_counts) = counts.split_at_mut(mid);
    rayon::join(
        || split(&queries[..mid], &slots[..mid], left_out, left_counts, base, first, run_one),
        || split(&queries[mid..], &slots[mid..], right_out, right_counts, cut, first + mid, run_one),
    );
}

impl GridView<'_> {
    /// Run every radius query, writing hits into its slot of `out` and the
    /// hit count into `counts`.
    ///
    /// A slot caps its query like `max_results` does; the smaller cap wins.
    pub fn radius_batch<F: EntityFilter + Sync>(
        &self,
        queries: &[RadiusQuery],
        filter: &F,
        slots: &[BatchSlot],
        out: &mut [BatchHit],
        counts: &mut [usize],
    ) -> Result<(), BatchError> {
        validate(queries.len(), slots, out.len(), counts.len())?;
        split(queries, slots, out, counts, 0, 0, &|query_index, query: &RadiusQuery, window: &mut [BatchHit]| {
            let limit = query.max_results.unwrap_or(usize::MAX).min(window.len());
            let mut written = 0;
            self.scan_radius(query, filter, limit, |entry, distance_sq| {
                window[written] = BatchHit {
                    query_index,
                    entity: entry.entity,
                    distance_sq,
                };
                written += 1;
            });
            if query.sort {
                window[..written].sort_unstable_by(|a, b| a.entity.cmp(&b.entity));
            }
            written
        });
        Ok(())
    }

    /// Batched [`GridView::overlap`]. Hits within a slot are sorted by entity.
    pub fn overlap_batch<F: EntityFilter + Sync>(
        &self,
        boxes: &[Aabb],
        filter: &F,
        slots: &[BatchSlot],
        out: &mut [BatchHit],
        counts: &mut [usize],
    ) -> Result<(), BatchError> {
        validate(boxes.len(), slots, out.len(), counts.len())?;
        split(boxes, slots, out, counts, 0, 0, &|query_index, aabb: &Aabb, window: &mut [BatchHit]| {
            let center = aabb.center();
            let limit = window.len();
            let mut written = 0;
            self.scan_overlap(aabb, filter, limit, |entry| {
                window[written] = BatchHit {
                    query_index,
                    entity: entry.entity,
                    distance_sq: center.distance_squared(entry.position),
                };
                written += 1;
            });
            window[..written].sort_unstable_by(|a, b| a.entity.cmp(&b.entity));
            written
        });
        Ok(())
    }

    /// Batched [`GridView::k_nearest`]. Each query keeps at most
    /// `min(k, slot capacity)` hits, nearest first.
    pub fn k_nearest_batch<F: EntityFilter + Sync>(
        &self,
        queries: &[KnnQuery],
        filter: &F,
        slots: &[BatchSlot],
        out: &mut [BatchHit],
        counts: &mut [usize],
    ) -> Result<(), BatchError> {
        validate(queries.len(), slots, out.len(), counts.len())?;
        split(queries, slots, out, counts, 0, 0, &|query_index, query: &KnnQuery, window: &mut [BatchHit]| {
            let keep = query.k.min(window.len());
            self.k_nearest_into(query, filter, &mut window[..keep], |entity, distance_sq| BatchHit {
                query_index,
                entity,
                distance_sq,
            })
        });
        Ok(())
    }
}
