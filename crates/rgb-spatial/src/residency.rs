//! Per-entity cached cell membership.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{CellId, GridConfig, quantize};

/// The cell an entity resolved to, stamped with the grid version it was
/// resolved against.
///
/// Only trust `cell` while `version` matches the grid's current version;
/// otherwise re-quantize with [`Residency::resolve`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Residency {
    pub cell: CellId,
    pub position: Vec3,
    pub version: u64,
}

impl Residency {
    /// Quantize `position` and stamp the result with `version`.
    #[must_use]
    pub fn resolve(position: Vec3, config: &GridConfig, version: u64) -> Self {
        Self {
            cell: quantize::cell_id(position, config),
            position,
            version,
        }
    }

    /// Whether the stamp matches the grid version `version`.
    #[must_use]
    pub const fn is_current(&self, version: u64) -> bool {
        self.version == version
    }

    /// The cached cell, if it is still valid at `version`.
    #[must_use]
    pub const fn cell_if_current(&self, version: u64) -> Option<CellId> {
        if self.is_current(version) { Some(self.cell) } else { None }
    }
}
