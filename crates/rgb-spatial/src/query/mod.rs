//! Read-only proximity queries over the active buffers.
//!
//! Every query runs on a [`GridView`], a `Copy` borrow of the config and
//! the sorted buffers. Views are `Sync`, so any number of threads can query
//! the same grid at once. Results go into caller-owned buffers; nothing in
//! this module allocates on its own.

mod aabb;
mod batch;
mod filter;
mod knn;
mod nearest;
mod radius;

use std::cmp::Ordering;
use std::ops::ControlFlow;

use glam::IVec3;

pub use aabb::Aabb;
pub use batch::{BatchHit, BatchSlot};
pub use filter::{AcceptAll, EntityFilter, Whitelist};
pub use knn::KnnQuery;
pub use radius::RadiusQuery;

use crate::storage::{GridBuffers, span};
use crate::{CellRange, Entity, Entry, GridConfig, quantize};

/// Slack added to squared radii so points sitting exactly on the sphere
/// survive rounding.
pub const DISTANCE_EPSILON: f32 = 1e-5;

/// A query hit with its squared distance to the query origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub entity: Entity,
    pub distance_sq: f32,
}

impl Neighbor {
    #[must_use]
    pub const fn new(entity: Entity, distance_sq: f32) -> Self {
        Self {
            entity,
            distance_sq,
        }
    }

    /// Nearest first, ties broken by entity order.
    #[must_use]
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        self.distance_sq
            .total_cmp(&other.distance_sq)
            .then(self.entity.cmp(&other.entity))
    }
}

impl Default for Neighbor {
    fn default() -> Self {
        Self::new(Entity::from_index(u32::MAX), f32::INFINITY)
    }
}

/// Read-only view of a grid.
#[derive(Clone, Copy, Debug)]
pub struct GridView<'a> {
    config: &'a GridConfig,
    entries: &'a [Entry],
    ranges: &'a [CellRange],
}

impl<'a> GridView<'a> {
    /// View over `buffers` laid out by `config`.
    #[must_use]
    pub fn new(config: &'a GridConfig, buffers: &'a GridBuffers) -> Self {
        Self {
            config,
            entries: buffers.entries(),
            ranges: buffers.ranges(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &'a GridConfig {
        self.config
    }

    #[must_use]
    pub const fn entries(&self) -> &'a [Entry] {
        self.entries
    }

    #[must_use]
    pub const fn ranges(&self) -> &'a [CellRange] {
        self.ranges
    }

    /// Whether the config and buffers can be queried at all.
    #[must_use]
    pub fn is_queryable(&self) -> bool {
        self.config.is_queryable() && self.ranges.len() == self.config.cell_count()
    }

    fn max_coord(&self) -> IVec3 {
        self.config.cell_counts.as_ivec3() - IVec3::ONE
    }

    /// Cell box reaching `reach` cells out from the cell containing `origin`.
    fn box_around(&self, origin: glam::Vec3, reach: IVec3) -> CellBox {
        let center = quantize::quantize(origin, self.config);
        let max = self.max_coord();
        let reach = reach.min(max + IVec3::ONE);
        CellBox {
            min: (center - reach).max(IVec3::ZERO),
            max: (center + reach).min(max),
        }
    }

    fn whole_grid(&self) -> CellBox {
        CellBox {
            min: IVec3::ZERO,
            max: self.max_coord(),
        }
    }

    /// Feed every entry slice of `cells` to `visit`, one z-run at a time.
    fn for_each_run(
        &self,
        cells: CellBox,
        mut visit: impl FnMut(&'a [Entry]) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        if cells.is_empty() {
            return ControlFlow::Continue(());
        }
        let ny = self.config.cell_counts.y as usize;
        let nz = self.config.cell_counts.z as usize;
        for x in cells.min.x..=cells.max.x {
            for y in cells.min.y..=cells.max.y {
                let row = x as usize * ny * nz + y as usize * nz;
                let first = row + cells.min.z as usize;
                let last = row + cells.max.z as usize;
                visit(&self.entries[span(self.ranges, first..last + 1)])?;
            }
        }
        ControlFlow::Continue(())
    }
}

/// Inclusive box of cell coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CellBox {
    min: IVec3,
    max: IVec3,
}

impl CellBox {
    fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    fn covers(&self, other: &Self) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }
}


#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::test_support::*;
    use super::*;

    #[test]
    fn test_box_clamps_to_grid() {
        let config = config();
        let buffers = build(&config, &[]);
        let view = GridView::new(&config, &buffers);

        let cells = view.box_around(Vec3::splat(0.5), IVec3::splat(2));
        assert_eq!(cells.min, IVec3::ZERO);
        assert_eq!(cells.max, IVec3::splat(2));

        let huge = view.box_around(Vec3::splat(4.0), IVec3::splat(i32::MAX));
        assert!(huge.covers(&view.whole_grid()));
    }

    #[test]
    fn test_runs_visit_every_entry_once() {
        let config = config();
        let points: Vec<_> = (0..64)
            .map(|i| (i, Vec3::new((i % 8) as f32 + 0.5, (i / 8) as f32 + 0.5, 3.5)))
            .collect();
        let buffers = build(&config, &points);
        let view = GridView::new(&config, &buffers);

        let mut seen = 0;
        let _ = view.for_each_run(view.whole_grid(), |run| {
            seen += run.len();
            ControlFlow::Continue(())
        });
        assert_eq!(seen, 64);
    }
}
