//! RGB Spatial - uniform-grid spatial index
//!
//! Buckets moving point entities into a flat 3D grid and answers proximity
//! queries against it.
//!
//! # Layout
//!
//! Entries live in one array sorted by `(cell, entity)`, with a
//! [`CellRange`] per cell pointing into it. The sort order is total and
//! independent of thread scheduling, so two grids built from the same input
//! are identical byte for byte.
//!
//! # Keeping it current
//!
//! - **Partial rebuild**: replays a batch of [`DirtyOp`]s against the sorted
//!   array. All or nothing; a stale op rejects the whole batch.
//! - **Full rebuild**: parallel gather with rayon, single-threaded sort and
//!   bucketing.
//!
//! [`RebuildThresholds`] picks between them each tick, and
//! [`SpatialGrid::maintain`] falls back to a full rebuild whenever a partial
//! one fails.
//!
//! # Queries
//!
//! ```ignore
//! let view = grid.view();
//! let mut hits = Vec::new();
//! view.radius(&RadiusQuery::new(origin, 8.0).sorted(), &AcceptAll, &mut hits);
//! let nearest = view.nearest(origin, &AcceptAll, None);
//! ```

mod cell;
mod config;
mod dirty;
mod entity;
mod error;
mod grid;
mod lookup;
mod partial;
mod policy;
mod provider;
pub mod quantize;
pub mod query;
mod rebuild;
mod residency;
mod snapshot;
mod state;
mod storage;

pub use cell::{CellId, CellRange, Entry, IndexedEntity};
pub use config::{DiagnosticThrottle, GridConfig, ProviderId, RebuildThresholds, SpatialSettings};
pub use dirty::{DirtyCounters, DirtyOp, DirtyOpKind};
pub use entity::{Entity, EntityAllocator, Generation};
pub use error::{BatchError, ConfigError, LayoutError, PartialRebuildError};
pub use grid::{MaintenanceReport, SpatialGrid};
pub use lookup::{EntryLookup, LookupSlot};
pub use partial::{PartialOutcome, PartialUpdater};
pub use provider::{
    ActiveProvider, GridProvider, HashedProvider, ProviderRegistry, RegisteredProvider,
    UniformProvider,
};
pub use query::{GridView, Neighbor};
pub use rebuild::{FullRebuildOutcome, RebuildStaging};
pub use residency::Residency;
pub use snapshot::{GridSnapshot, SnapshotDiff, SnapshotMismatch};
pub use state::{GridState, RebuildStrategy};
pub use storage::GridBuffers;

/// Everything a typical caller needs.
pub mod prelude {
    pub use crate::query::{
        Aabb, AcceptAll, BatchHit, BatchSlot, EntityFilter, KnnQuery, RadiusQuery, Whitelist,
    };
    pub use crate::{
        DirtyOp, Entity, GridConfig, GridView, IndexedEntity, Neighbor, RebuildStrategy,
        SpatialGrid, SpatialSettings,
    };
}
