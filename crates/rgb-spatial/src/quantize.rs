//! Position to cell mapping.
//!
//! Quantization never fails: positions outside the world are clamped onto
//! the border cells. Only a degenerate config (a zero axis, or more cells
//! than fit a cell id) yields [`CellId::UNRESOLVED`].

use glam::{IVec3, Vec3};

use crate::{CellId, GridConfig};

/// Integer cell coordinate.
pub type CellCoord = IVec3;

/// Bias, in cell units, added before flooring so positions computed with a
/// little rounding error on a boundary land on the same side every time.
pub const BOUNDARY_EPSILON: f32 = 1e-4;

/// Clamp-and-floor a world position onto a cell coordinate.
#[must_use]
pub fn quantize(position: Vec3, config: &GridConfig) -> CellCoord {
    let local = (position - config.world_min) / config.cell_size;
    let max = config.cell_counts.as_ivec3() - IVec3::ONE;
    // `as` saturates and maps NaN to zero.
    let raw = IVec3::new(
        (local.x + BOUNDARY_EPSILON).floor() as i32,
        (local.y + BOUNDARY_EPSILON).floor() as i32,
        (local.z + BOUNDARY_EPSILON).floor() as i32,
    );
    raw.max(IVec3::ZERO).min(max.max(IVec3::ZERO))
}

/// Row-major flatten: `x * ny * nz + y * nz + z`.
#[must_use]
pub fn flatten(coord: CellCoord, config: &GridConfig) -> CellId {
    let counts = config.cell_counts.as_i64vec3();
    let c = coord.as_i64vec3();
    if c.cmplt(glam::I64Vec3::ZERO).any() || c.cmpge(counts).any() {
        return CellId::UNRESOLVED;
    }
    let flat = c.x * counts.y * counts.z + c.y * counts.z + c.z;
    i32::try_from(flat).map_or(CellId::UNRESOLVED, CellId)
}

/// Inverse of [`flatten`]. `None` for negative ids, ids past the grid, or
/// a degenerate config.
#[must_use]
pub fn unflatten(cell: CellId, config: &GridConfig) -> Option<CellCoord> {
    let index = cell.index(config.cell_count())?;
    let ny = config.cell_counts.y as usize;
    let nz = config.cell_counts.z as usize;
    let plane = ny * nz;
    if plane == 0 {
        return None;
    }
    Some(IVec3::new(
        (index / plane) as i32,
        ((index % plane) / nz) as i32,
        (index % nz) as i32,
    ))
}

/// Resolve a position straight to its cell id.
#[must_use]
pub fn cell_id(position: Vec3, config: &GridConfig) -> CellId {
    if config.cell_counts.cmpeq(glam::UVec3::ZERO).any() || !(config.cell_size > 0.0) {
        return CellId::UNRESOLVED;
    }
    let cell = flatten(quantize(position, config), config);
    match cell.index(config.cell_count()) {
        Some(_) => cell,
        None => CellId::UNRESOLVED,
    }
}

/// Spread the low 21 bits of `v` so there are two zero bits between each.
const fn spread_bits(v: u32) -> u64 {
    let mut x = (v & 0x1f_ffff) as u64;
    x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
    x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
    x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x << 2)) & 0x1249_2492_4924_9249;
    x
}

/// Seeded Z-order key for locality-sensitive ordering.
///
/// Negative coordinates are clamped to zero; 21 bits per axis are kept.
#[must_use]
pub fn morton_key(coord: CellCoord, seed: u32) -> u64 {
    let c = coord.max(IVec3::ZERO).as_uvec3();
    let key = spread_bits(c.x) | (spread_bits(c.y) << 1) | (spread_bits(c.z) << 2);
    key ^ (u64::from(seed)).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}
