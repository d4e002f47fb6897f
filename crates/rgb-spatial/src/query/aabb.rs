//! Axis-aligned box overlap.

use std::ops::ControlFlow;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{CellBox, EntityFilter, GridView};
use crate::{Entity, Entry, quantize};

/// Inclusive axis-aligned box in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box of `half_extent` on each side of `center`.
    #[must_use]
    pub fn from_center(center: Vec3, half_extent: Vec3) -> Self {
        Self::new(center - half_extent, center + half_extent)
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// False for every point when the box is inverted on any axis.
    #[must_use]
    pub fn contains(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    /// Whether `min` exceeds `max` on any axis.
    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }
}

impl<'a> GridView<'a> {
    /// Collect entities inside `aabb` into `out`, sorted by entity.
    pub fn overlap<F: EntityFilter>(&self, aabb: &Aabb, filter: &F, out: &mut Vec<Entity>) -> usize {
        out.clear();
        self.scan_overlap(aabb, filter, usize::MAX, |entry| out.push(entry.entity));
        out.sort_unstable();
        out.len()
    }

    pub(crate) fn scan_overlap<F: EntityFilter>(
        &self,
        aabb: &Aabb,
        filter: &F,
        limit: usize,
        mut emit: impl FnMut(&'a Entry),
    ) -> usize {
        if limit == 0 || !self.is_queryable() || aabb.is_inverted() || aabb.min.is_nan() || aabb.max.is_nan() {
            return 0;
        }
        let cells = CellBox {
            min: quantize::quantize(aabb.min, self.config),
            max: quantize::quantize(aabb.max, self.config),
        };

        let mut found = 0;
        let _ = self.for_each_run(cells, |run| {
            for entry in run {
                if aabb.contains(entry.position) && filter.accept(entry.entity) {
                    emit(entry);
                    found += 1;
                    if found == limit {
                        return ControlFlow::Break(());
                    }
                }
            }
            ControlFlow::Continue(())
        });
        found
    }
}
