//! Grid configuration and tuning knobs.

use std::fmt;

use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Byte-sized identifier of a grid provider.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(pub u8);

impl ProviderId {
    /// Lenient grid over arbitrary world bounds.
    pub const HASHED: Self = Self(0);
    /// Strict grid whose cells tile the world bounds exactly.
    pub const UNIFORM: Self = Self(1);
    /// First id handed out to registered providers.
    pub const FIRST_CUSTOM: Self = Self(2);

    /// Whether this id is one of the two built-in providers.
    #[must_use]
    pub const fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_CUSTOM.0
    }
}

impl fmt::Debug for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::HASHED => f.write_str("Provider(hashed)"),
            Self::UNIFORM => f.write_str("Provider(uniform)"),
            Self(id) => write!(f, "Provider({id})"),
        }
    }
}

/// Shape of the grid: bounds, cell size and per-axis cell counts.
///
/// A config is immutable once handed to a [`SpatialGrid`](crate::SpatialGrid);
/// replacing it bumps the grid version.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub cell_size: f32,
    pub world_min: Vec3,
    pub world_max: Vec3,
    pub cell_counts: UVec3,
    #[serde(default)]
    pub hash_seed: u32,
    #[serde(default = "default_provider")]
    pub provider: ProviderId,
}

const fn default_provider() -> ProviderId {
    ProviderId::HASHED
}

impl GridConfig {
    /// Hashed grid covering `[world_min, world_max]`, rounding the cell
    /// counts up so the last cell on each axis may overhang the bounds.
    #[must_use]
    pub fn from_bounds(world_min: Vec3, world_max: Vec3, cell_size: f32) -> Self {
        let cells = ((world_max - world_min) / cell_size).ceil().max(Vec3::ONE);
        Self {
            cell_size,
            world_min,
            world_max,
            cell_counts: cells.as_uvec3(),
            hash_seed: 0,
            provider: ProviderId::HASHED,
        }
    }

    /// Uniform grid of `cell_counts` cubes of side `cell_size` starting at `world_min`.
    #[must_use]
    pub fn uniform(world_min: Vec3, cell_size: f32, cell_counts: UVec3) -> Self {
        Self {
            cell_size,
            world_min,
            world_max: world_min + cell_counts.as_vec3() * cell_size,
            cell_counts,
            hash_seed: 0,
            provider: ProviderId::UNIFORM,
        }
    }

    /// Same grid, validated and rebuilt by `provider`.
    #[must_use]
    pub const fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = provider;
        self
    }

    /// Seed mixed into [`quantize::morton_key`](crate::quantize::morton_key).
    #[must_use]
    pub const fn with_hash_seed(mut self, seed: u32) -> Self {
        self.hash_seed = seed;
        self
    }

    /// Total number of cells, saturating instead of overflowing.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        (self.cell_counts.x as usize)
            .saturating_mul(self.cell_counts.y as usize)
            .saturating_mul(self.cell_counts.z as usize)
    }

    /// World size per axis: `world_max - world_min`.
    #[must_use]
    pub fn extent(&self) -> Vec3 {
        self.world_max - self.world_min
    }

    /// Whether queries can run against this config at all.
    #[must_use]
    pub fn is_queryable(&self) -> bool {
        self.cell_count() > 0 && self.cell_size > 0.0
    }
}

/// Counters thresholds deciding between partial and full rebuilds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildThresholds {
    /// Below this many entries a full rebuild is always cheaper.
    pub min_entry_count_for_partial: usize,
    pub max_dirty_ops_for_partial: usize,
    /// Dirty ops per stored entry at which a full rebuild wins.
    pub max_dirty_ratio_for_partial: f32,
}

impl Default for RebuildThresholds {
    fn default() -> Self {
        Self {
            min_entry_count_for_partial: 100,
            max_dirty_ops_for_partial: 1024,
            max_dirty_ratio_for_partial: 0.35,
        }
    }
}

/// Rate limit for external diagnostic loggers.
///
/// The index never consults this itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticThrottle {
    pub min_tick_delta: u64,
    pub log_only_on_change: bool,
}

impl DiagnosticThrottle {
    /// Whether a logger that last emitted at `last_tick` should emit at `tick`.
    #[must_use]
    pub fn should_emit(&self, last_tick: Option<u64>, tick: u64, changed: bool) -> bool {
        if self.log_only_on_change && !changed {
            return false;
        }
        last_tick.is_none_or(|last| tick.saturating_sub(last) >= self.min_tick_delta)
    }
}

/// Everything needed to stand up a grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialSettings {
    pub grid: GridConfig,
    #[serde(default)]
    pub thresholds: RebuildThresholds,
    #[serde(default)]
    pub diagnostics: DiagnosticThrottle,
}

impl SpatialSettings {
    /// Settings for `grid` with default thresholds and throttle.
    #[must_use]
    pub fn new(grid: GridConfig) -> Self {
        Self {
            grid,
            thresholds: RebuildThresholds::default(),
            diagnostics: DiagnosticThrottle::default(),
        }
    }
}
