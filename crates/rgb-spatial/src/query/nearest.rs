//! Single nearest neighbour by expanding rings of cells.

use std::ops::ControlFlow;

use glam::{IVec3, Vec3};

use super::{CellBox, EntityFilter, GridView, Neighbor};
use crate::Entity;

impl GridView<'_> {
    /// Closest accepted entity to `origin`, ties broken by entity order.
    ///
    /// Searches ring 1 (the 3x3x3 block around the origin cell), then the
    /// shell of ring 2, and so on. Stops after the first ring that produced
    /// a candidate, or once the searched box covers the whole grid.
    ///
    /// A closer entity in the next ring out can be missed. Use
    /// [`GridView::k_nearest`] with an unbounded radius for the exact answer.
    #[must_use]
    pub fn nearest<F: EntityFilter>(
        &self,
        origin: Vec3,
        filter: &F,
        exclude: Option<Entity>,
    ) -> Option<Neighbor> {
        if !self.is_queryable() || self.entries.is_empty() {
            return None;
        }
        let grid = self.whole_grid();
        let mut best: Option<Neighbor> = None;
        let mut previous: Option<CellBox> = None;

        for ring in 1.. {
            let cells = self.box_around(origin, IVec3::splat(ring));
            self.scan_shell(cells, previous, |run| {
                for entry in run {
                    if exclude == Some(entry.entity) || !filter.accept(entry.entity) {
                        continue;
                    }
                    let candidate = Neighbor::new(entry.entity, origin.distance_squared(entry.position));
                    if best.is_none_or(|current| candidate.rank_cmp(&current).is_lt()) {
                        best = Some(candidate);
                    }
                }
            });
            if best.is_some() || cells.covers(&grid) {
                break;
            }
            previous = Some(cells);
        }
        best
    }

    /// Visit `cells` minus the already scanned `inner` box.
    fn scan_shell(
        &self,
        cells: CellBox,
        inner: Option<CellBox>,
        mut visit: impl FnMut(&[crate::Entry]),
    ) {
        let Some(inner) = inner else {
            let _ = self.for_each_run(cells, |run| {
                visit(run);
                ControlFlow::Continue(())
            });
            return;
        };

        // Slabs below and above the inner box on x, then y, then z.
        let mut rest = cells;
        for axis in 0..3 {
            let mut low = rest;
            low.max[axis] = inner.min[axis] - 1;
            let mut high = rest;
            high.min[axis] = inner.max[axis] + 1;
            for slab in [low, high] {
                let _ = self.for_each_run(slab, |run| {
                    visit(run);
                    ControlFlow::Continue(())
                });
            }
            rest.min[axis] = inner.min[axis];
            rest.max[axis] = inner.max[axis];
        }
    }
}
