//! Radius queries.

use std::ops::ControlFlow;

use glam::{IVec3, Vec3, Vec3Swizzles};

use super::{CellBox, DISTANCE_EPSILON, EntityFilter, GridView};
use crate::{Entity, Entry};

/// Parameters of a radius query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadiusQuery {
    pub origin: Vec3,
    /// `f32::INFINITY` scans the whole grid.
    pub radius: f32,
    pub max_results: Option<usize>,
    /// Measure distance on the XZ plane, ignoring height.
    pub project_2d: bool,
    /// Sort results by entity so the output is independent of scan order.
    pub sort: bool,
    pub exclude: Option<Entity>,
}

impl RadiusQuery {
    /// Everything within `radius` of `origin`.
    #[must_use]
    pub const fn new(origin: Vec3, radius: f32) -> Self {
        Self {
            origin,
            radius,
            max_results: None,
            project_2d: false,
            sort: false,
            exclude: None,
        }
    }

    /// Every indexed entity, measured from `origin`.
    #[must_use]
    pub const fn unbounded(origin: Vec3) -> Self {
        Self::new(origin, f32::INFINITY)
    }

    /// Stop after `max` hits.
    #[must_use]
    pub const fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    /// Measure on the XZ plane, ignoring height.
    #[must_use]
    pub const fn projected_2d(mut self) -> Self {
        self.project_2d = true;
        self
    }

    /// Sort hits by entity.
    #[must_use]
    pub const fn sorted(mut self) -> Self {
        self.sort = true;
        self
    }

    /// Never report `entity`.
    #[must_use]
    pub const fn excluding(mut self, entity: Entity) -> Self {
        self.exclude = Some(entity);
        self
    }

    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        !self.radius.is_finite()
    }

    pub(crate) fn distance_sq(&self, position: Vec3) -> f32 {
        if self.project_2d {
            self.origin.xz().distance_squared(position.xz())
        } else {
            self.origin.distance_squared(position)
        }
    }
}

impl<'a> GridView<'a> {
    /// Collect entities within `query.radius` of `query.origin` into `out`.
    ///
    /// `out` is cleared first. Returns the number of hits.
    pub fn radius<F: EntityFilter>(
        &self,
        query: &RadiusQuery,
        filter: &F,
        out: &mut Vec<Entity>,
    ) -> usize {
        out.clear();
        let limit = query.max_results.unwrap_or(usize::MAX);
        self.scan_radius(query, filter, limit, |entry, _| out.push(entry.entity));
        if query.sort {
            out.sort_unstable();
        }
        out.len()
    }

    /// Drive `emit` with each hit until `limit` hits were produced.
    pub(crate) fn scan_radius<F: EntityFilter>(
        &self,
        query: &RadiusQuery,
        filter: &F,
        limit: usize,
        mut emit: impl FnMut(&'a Entry, f32),
    ) -> usize {
        if limit == 0 || !self.is_queryable() || query.radius.is_nan() || query.radius < 0.0 {
            return 0;
        }
        let cells = self.radius_cells(query);
        let radius_sq = query.radius * query.radius + DISTANCE_EPSILON;

        let mut found = 0;
        let _ = self.for_each_run(cells, |run| {
            for entry in run {
                if query.exclude == Some(entry.entity) || !filter.accept(entry.entity) {
                    continue;
                }
                let distance_sq = query.distance_sq(entry.position);
                if distance_sq <= radius_sq {
                    emit(entry, distance_sq);
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

    fn radius_cells(&self, query: &RadiusQuery) -> CellBox {
        if query.is_unbounded() {
            return self.whole_grid();
        }
        let reach_world = (query.radius * query.radius + DISTANCE_EPSILON).sqrt();
        let reach = (reach_world / self.config.cell_size).ceil() as i32;
        let mut cells = self.box_around(query.origin, IVec3::splat(reach));
        if query.project_2d {
            cells.min.y = 0;
            cells.max.y = self.max_coord().y;
        }
        cells
    }
}
