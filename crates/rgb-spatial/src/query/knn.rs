//! K-nearest neighbours with a bounded insertion-sorted result list.

use std::cmp::Ordering;

use glam::Vec3;

use super::{EntityFilter, GridView, Neighbor, RadiusQuery};
use crate::Entity;

/// Parameters of a k-nearest query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KnnQuery {
    pub origin: Vec3,
    pub k: usize,
    /// `f32::INFINITY` scans every entry, giving the exact global answer.
    pub radius: f32,
    pub exclude: Option<Entity>,
}

impl KnnQuery {
    /// `k` nearest within `radius` of `origin`.
    #[must_use]
    pub const fn new(origin: Vec3, k: usize, radius: f32) -> Self {
        Self {
            origin,
            k,
            radius,
            exclude: None,
        }
    }

    /// `k` nearest over the whole grid.
    #[must_use]
    pub const fn unbounded(origin: Vec3, k: usize) -> Self {
        Self::new(origin, k, f32::INFINITY)
    }

    #[must_use]
    pub const fn excluding(mut self, entity: Entity) -> Self {
        self.exclude = Some(entity);
        self
    }

    pub(crate) const fn as_radius(&self) -> RadiusQuery {
        let mut query = RadiusQuery::new(self.origin, self.radius);
        query.exclude = self.exclude;
        query
    }
}

/// Something a k-nearest result list can hold.
pub(crate) trait Ranked: Copy {
    fn rank_cmp(&self, other: &Self) -> Ordering;
}

impl Ranked for Neighbor {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        Self::rank_cmp(self, other)
    }
}

/// Insert `candidate` into the sorted prefix `best[..*len]`, dropping the
/// worst element once `best` is full.
fn insert_ranked<T: Ranked>(best: &mut [T], len: &mut usize, candidate: T) {
    let capacity = best.len();
    if *len == capacity {
        match best.last() {
            Some(worst) if candidate.rank_cmp(worst).is_lt() => {}
            _ => return,
        }
    }
    let at = best[..*len].partition_point(|held| held.rank_cmp(&candidate).is_lt());
    if *len < capacity {
        *len += 1;
    }
    best[at..*len].rotate_right(1);
    best[at] = candidate;
}

impl GridView<'_> {
    /// Write up to `query.k` nearest accepted entities into `out`, nearest
    /// first with ties broken by entity order. Returns the number written.
    pub fn k_nearest<F: EntityFilter>(
        &self,
        query: &KnnQuery,
        filter: &F,
        out: &mut Vec<Neighbor>,
    ) -> usize {
        out.clear();
        if query.k == 0 {
            return 0;
        }
        out.resize(query.k.min(self.entries.len()), Neighbor::default());
        let found = self.k_nearest_into(query, filter, out, Neighbor::new);
        out.truncate(found);
        found
    }

    /// Slice form of [`GridView::k_nearest`]: `best.len()` bounds the result.
    pub(crate) fn k_nearest_into<F: EntityFilter, T: Ranked>(
        &self,
        query: &KnnQuery,
        filter: &F,
        best: &mut [T],
        make: impl Fn(Entity, f32) -> T,
    ) -> usize {
        let mut len = 0;
        if best.is_empty() {
            return 0;
        }
        self.scan_radius(&query.as_radius(), filter, usize::MAX, |entry, distance_sq| {
            insert_ranked(best, &mut len, make(entry.entity, distance_sq));
        });
        len
    }
}
