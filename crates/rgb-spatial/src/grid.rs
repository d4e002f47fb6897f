//! The grid orchestrator: pending dirty ops, strategy selection, rebuilds.

use std::time::{Duration, Instant};

use tracing::{debug, debug_span, info, trace, warn};

use crate::lookup::EntryLookup;
use crate::partial::PartialUpdater;
use crate::provider::{ActiveProvider, GridProvider, ProviderRegistry};
use crate::query::GridView;
use crate::rebuild::RebuildStaging;
use crate::snapshot::{GridSnapshot, SnapshotMismatch};
use crate::storage::GridBuffers;
use crate::{
    ConfigError, DiagnosticThrottle, DirtyCounters, DirtyOp, Entity, GridConfig, GridState,
    IndexedEntity, LayoutError, PartialRebuildError, RebuildStrategy, RebuildThresholds, Residency,
    SpatialSettings,
};

/// What one maintenance pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// `None` when there was nothing to do.
    pub strategy: RebuildStrategy,
    /// A partial rebuild was attempted, failed, and a full rebuild ran instead.
    pub fell_back: bool,
    pub applied_ops: usize,
    pub unmapped: usize,
}

/// Uniform-grid spatial index.
///
/// Upstream systems queue [`DirtyOp`]s with [`SpatialGrid::push_dirty`] and
/// call [`SpatialGrid::maintain`] once per tick. Queries go through
/// [`SpatialGrid::view`], which borrows the grid immutably and can be
/// shared across threads.
#[derive(Debug)]
pub struct SpatialGrid {
    config: GridConfig,
    provider: ActiveProvider,
    thresholds: RebuildThresholds,
    diagnostics: DiagnosticThrottle,
    state: GridState,
    buffers: GridBuffers,
    lookup: EntryLookup,
    pending: Vec<DirtyOp>,
    /// Set by config changes; the next pass must rebuild from scratch.
    force_full: bool,
    updater: PartialUpdater,
    staging: RebuildStaging,
}

impl SpatialGrid {
    /// Empty grid with default thresholds, resolving the provider in the
    /// global registry.
    pub fn new(config: GridConfig) -> Result<Self, ConfigError> {
        Self::with_settings(SpatialSettings::new(config))
    }

    /// Grid with custom thresholds, resolving providers in the global registry.
    pub fn with_settings(settings: SpatialSettings) -> Result<Self, ConfigError> {
        Self::with_registry(settings, &ProviderRegistry::global().read())
    }

    /// Like [`SpatialGrid::with_settings`] with an explicit registry.
    pub fn with_registry(
        settings: SpatialSettings,
        registry: &ProviderRegistry,
    ) -> Result<Self, ConfigError> {
        let config = settings.grid;
        let provider = ActiveProvider::resolve(config.provider, registry)?;
        provider.validate(&config)?;
        info!(
            provider = provider.name(),
            cells = config.cell_count(),
            cell_size = config.cell_size,
            "created spatial grid"
        );

        Ok(Self {
            config,
            provider,
            thresholds: settings.thresholds,
            diagnostics: settings.diagnostics,
            state: GridState::default(),
            buffers: GridBuffers::with_cells(config.cell_count()),
            lookup: EntryLookup::new(),
            pending: Vec::new(),
            force_full: false,
            updater: PartialUpdater::new(),
            staging: RebuildStaging::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &GridConfig {
        &self.config
    }

    #[must_use]
    pub const fn provider(&self) -> &ActiveProvider {
        &self.provider
    }

    /// Versioned bookkeeping of the active buffers.
    #[must_use]
    pub const fn state(&self) -> &GridState {
        &self.state
    }

    /// Bumped by every successful rebuild and config change.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.state.version
    }

    #[must_use]
    pub const fn thresholds(&self) -> &RebuildThresholds {
        &self.thresholds
    }

    /// Replace the policy used by later [`maintain`](Self::maintain) calls.
    pub fn set_thresholds(&mut self, thresholds: RebuildThresholds) {
        self.thresholds = thresholds;
    }

    #[must_use]
    pub const fn diagnostics(&self) -> &DiagnosticThrottle {
        &self.diagnostics
    }

    #[must_use]
    pub const fn buffers(&self) -> &GridBuffers {
        &self.buffers
    }

    /// Entity to slot index, as of the last pass.
    #[must_use]
    pub const fn lookup(&self) -> &EntryLookup {
        &self.lookup
    }

    /// Ops queued since the last maintenance pass.
    #[must_use]
    pub fn pending(&self) -> &[DirtyOp] {
        &self.pending
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Replace the config, resolving its provider in the global registry.
    pub fn set_config(&mut self, config: GridConfig) -> Result<(), ConfigError> {
        self.set_config_with(config, &ProviderRegistry::global().read())
    }

    /// Validate and install `config`.
    ///
    /// The buffers are emptied, the version is bumped, and the next
    /// maintenance pass is forced to be a full rebuild. On error the grid is
    /// left as it was.
    pub fn set_config_with(
        &mut self,
        config: GridConfig,
        registry: &ProviderRegistry,
    ) -> Result<(), ConfigError> {
        if config == self.config {
            return Ok(());
        }
        let provider = ActiveProvider::resolve(config.provider, registry)?;
        provider.validate(&config)?;
        info!(
            provider = provider.name(),
            cells = config.cell_count(),
            version = self.state.version + 1,
            "grid config changed"
        );

        self.config = config;
        self.provider = provider;
        self.buffers.reset(config.cell_count());
        self.lookup.clear();
        self.state.entry_count = 0;
        self.state.version += 1;
        self.force_full = true;
        Ok(())
    }

    /// Queue one op for the next pass.
    pub fn push_dirty(&mut self, op: DirtyOp) {
        self.pending.push(op);
        self.state.last_dirty_version = self.state.version;
    }

    /// Queue a batch of ops for the next pass.
    pub fn extend_dirty(&mut self, ops: impl IntoIterator<Item = DirtyOp>) {
        let before = self.pending.len();
        self.pending.extend(ops);
        if self.pending.len() > before {
            self.state.last_dirty_version = self.state.version;
        }
    }

    /// Bring the buffers up to date for `tick`.
    ///
    /// `indexed` is the authoritative set of indexed entities; it is only
    /// read when a full rebuild runs.
    pub fn maintain(&mut self, tick: u64, indexed: &[IndexedEntity]) -> MaintenanceReport {
        if self.pending.is_empty() && !self.force_full {
            return MaintenanceReport::default();
        }

        let strategy = if self.force_full {
            RebuildStrategy::Full
        } else {
            self.thresholds.select(self.pending.len(), self.buffers.len())
        };
        debug!(
            tick,
            ?strategy,
            dirty_ops = self.pending.len(),
            entries = self.buffers.len(),
            "selected rebuild strategy"
        );

        if strategy == RebuildStrategy::Partial {
            match self.apply_partial(tick) {
                Ok(report) => return report,
                Err(error) => {
                    warn!(tick, %error, "partial rebuild failed, falling back to full rebuild");
                    let mut report = self.rebuild_full(tick, indexed);
                    report.fell_back = true;
                    return report;
                }
            }
        }
        self.rebuild_full(tick, indexed)
    }

    /// Rebuild from `indexed`, consuming every pending op.
    pub fn rebuild_full(&mut self, tick: u64, indexed: &[IndexedEntity]) -> MaintenanceReport {
        let span = debug_span!("full_rebuild", tick, indexed = indexed.len());
        let _enter = span.enter();

        let started = Instant::now();
        let outcome =
            self.provider
                .rebuild_full(&mut self.staging, &self.config, indexed, &mut self.buffers);
        self.provider.rebuild_lookup(&mut self.lookup, &self.buffers);

        let report = MaintenanceReport {
            strategy: RebuildStrategy::Full,
            fell_back: false,
            applied_ops: self.pending.len(),
            unmapped: outcome.unmapped,
        };
        self.force_full = false;
        self.finish(tick, &report, started.elapsed());
        report
    }

    /// Apply the pending ops incrementally.
    ///
    /// On error nothing changes: buffers, lookup, state and the pending
    /// queue are all left as they were.
    pub fn apply_partial(&mut self, tick: u64) -> Result<MaintenanceReport, PartialRebuildError> {
        let started = Instant::now();
        let outcome = self.provider.apply_partial(
            &mut self.updater,
            &self.config,
            &mut self.buffers,
            &self.pending,
        )?;
        self.provider.rebuild_lookup(&mut self.lookup, &self.buffers);

        let report = MaintenanceReport {
            strategy: RebuildStrategy::Partial,
            fell_back: false,
            applied_ops: outcome.applied,
            unmapped: outcome.unmapped,
        };
        self.finish(tick, &report, started.elapsed());
        Ok(report)
    }

    fn finish(&mut self, tick: u64, report: &MaintenanceReport, duration: Duration) {
        if !self.pending.is_empty() {
            self.state.last_dirty_tick = tick;
        }
        self.state.dirty = DirtyCounters::tally(&self.pending);
        self.state.unmapped_count = report.unmapped;
        self.state
            .record_rebuild(report.strategy, self.buffers.len(), duration);
        self.pending.clear();

        trace!(
            tick,
            strategy = ?report.strategy,
            entries = self.state.entry_count,
            unmapped = report.unmapped,
            version = self.state.version,
            micros = duration.as_micros() as u64,
            "rebuild finished"
        );
    }

    /// Read-only view for queries.
    #[must_use]
    pub fn view(&self) -> GridView<'_> {
        GridView::new(&self.config, &self.buffers)
    }

    /// Cell of an indexed entity as resolved by the last pass, stamped with
    /// the current version.
    ///
    /// The stamp is always current at the moment of the call. Callers keep
    /// the returned value and check [`Residency::is_current`] later, or hand
    /// it to [`refresh_residency`](Self::refresh_residency).
    #[must_use]
    pub fn residency(&self, entity: Entity) -> Option<Residency> {
        let slot = self.lookup.get(entity)?;
        let entry = self.buffers.entries().get(slot.index as usize)?;
        Some(Residency {
            cell: slot.cell,
            position: entry.position,
            version: self.state.version,
        })
    }

    /// Residencies published by the last pass, in entry order.
    pub fn residencies(&self) -> impl Iterator<Item = (Entity, Residency)> + '_ {
        let version = self.state.version;
        self.buffers.entries().iter().map(move |entry| {
            let residency = Residency {
                cell: entry.cell,
                position: entry.position,
                version,
            };
            (entry.entity, residency)
        })
    }

    /// Bring a caller-held residency up to the current version.
    ///
    /// Returns `false` when `cached` was already current. Entities the grid
    /// no longer indexes are re-quantized from their cached position.
    pub fn refresh_residency(&self, entity: Entity, cached: &mut Residency) -> bool {
        if cached.is_current(self.state.version) {
            return false;
        }
        *cached = self.residency(entity).unwrap_or_else(|| {
            Residency::resolve(cached.position, &self.config, self.state.version)
        });
        true
    }

    /// Capture state, buffers and pending ops for later comparison.
    #[must_use]
    pub fn snapshot(&self, tick: u64) -> GridSnapshot {
        GridSnapshot::capture(tick, &self.state, &self.buffers, &self.pending)
    }

    /// First field where the live grid differs from `snapshot`.
    #[must_use]
    pub fn compare_snapshot(&self, snapshot: &GridSnapshot) -> Option<SnapshotMismatch> {
        snapshot.compare(&self.state, &self.buffers, &self.pending)
    }

    /// Check the layout invariants of the active buffers.
    pub fn validate_layout(&self) -> Result<(), LayoutError> {
        self.buffers.validate_layout()
    }
}

#[cfg(test)]
mod tests {
    use glam::{UVec3, Vec3};

    use super::*;
    use crate::{CellId, ProviderId, quantize};

    fn config() -> GridConfig {
        GridConfig::uniform(Vec3::ZERO, 1.0, UVec3::splat(16))
    }

    fn scattered(n: u32) -> Vec<IndexedEntity> {
        (0..n)
            .map(|i| {
                let p = Vec3::new((i % 16) as f32, ((i / 16) % 16) as f32, (i / 256) as f32) + 0.5;
                IndexedEntity::new(Entity::from_index(i), p)
            })
            .collect()
    }

    fn seeded(n: u32) -> (SpatialGrid, Vec<IndexedEntity>) {
        let mut grid = SpatialGrid::with_registry(SpatialSettings::new(config()), &ProviderRegistry::new())
            .unwrap();
        let indexed = scattered(n);
        let config = *grid.config();
        grid.extend_dirty(
            indexed
                .iter()
                .map(|item| DirtyOp::add_at(item.entity, item.position, &config)),
        );
        let report = grid.maintain(1, &indexed);
        assert_eq!(report.strategy, RebuildStrategy::Full);
        (grid, indexed)
    }

    #[test]
    fn test_idle_pass_does_nothing() {
        let (mut grid, indexed) = seeded(10);
        let version = grid.version();
        assert_eq!(grid.maintain(2, &indexed), MaintenanceReport::default());
        assert_eq!(grid.version(), version);
    }

    #[test]
    fn test_small_batch_goes_partial() {
        let (mut grid, _) = seeded(400);
        assert_eq!(grid.len(), 400);

        let entity = Entity::from_index(3);
        let old = grid.residency(entity).unwrap();
        let moved = Vec3::new(10.5, 10.5, 10.5);
        let op = DirtyOp::update_to(entity, moved, old.cell, grid.config());
        grid.push_dirty(op);

        let report = grid.maintain(2, &[]);
        assert_eq!(report.strategy, RebuildStrategy::Partial);
        assert!(!report.fell_back);
        assert_eq!(report.applied_ops, 1);
        assert_eq!(grid.state().dirty.updates, 1);
        assert_eq!(grid.state().last_dirty_tick, 2);
        assert_eq!(grid.validate_layout(), Ok(()));

        let now = grid.residency(entity).unwrap();
        assert_eq!(now.position, moved);
        assert!(!old.is_current(grid.version()));
        assert!(now.is_current(grid.version()));
    }

    #[test]
    fn test_cached_residency_tracks_passes() {
        let (mut grid, _) = seeded(400);
        let entity = Entity::from_index(7);
        let mut cached = grid.residency(entity).unwrap();
        assert!(!grid.refresh_residency(entity, &mut cached));

        let moved = Vec3::new(12.5, 1.5, 3.5);
        grid.push_dirty(DirtyOp::update_to(entity, moved, cached.cell, grid.config()));
        assert_eq!(grid.maintain(3, &[]).strategy, RebuildStrategy::Partial);
        assert_eq!(cached.cell_if_current(grid.version()), None);

        assert!(grid.refresh_residency(entity, &mut cached));
        assert_eq!(cached.position, moved);
        assert_eq!(cached.cell, quantize::cell_id(moved, grid.config()));
        assert_eq!(cached.cell_if_current(grid.version()), Some(cached.cell));

        let published: Vec<_> = grid.residencies().collect();
        assert_eq!(published.len(), grid.len());
        assert!(published.contains(&(entity, cached)));
        assert!(published.iter().all(|(_, r)| r.is_current(grid.version())));
    }

    #[test]
    fn test_stale_op_falls_back_to_full() {
        let (mut grid, indexed) = seeded(400);
        grid.push_dirty(DirtyOp::remove(Entity::from_index(999), Vec3::ZERO, CellId(0)));

        let report = grid.maintain(2, &indexed);
        assert_eq!(report.strategy, RebuildStrategy::Full);
        assert!(report.fell_back);
        assert!(grid.pending().is_empty());
        assert_eq!(grid.len(), 400);
        assert_eq!(grid.state().last_rebuild_strategy, RebuildStrategy::Full);
    }

    #[test]
    fn test_failed_partial_keeps_queue() {
        let (mut grid, _) = seeded(400);
        let before = grid.snapshot(5);
        grid.push_dirty(DirtyOp::remove(Entity::from_index(999), Vec3::ZERO, CellId(0)));
        assert!(grid.apply_partial(5).is_err());
        assert_eq!(grid.pending().len(), 1);
        assert_eq!(grid.buffers().entries(), before.entries.as_slice());
    }

    #[test]
    fn test_config_change_forces_full_rebuild() {
        let (mut grid, indexed) = seeded(400);
        let version = grid.version();

        let bigger = GridConfig::uniform(Vec3::ZERO, 2.0, UVec3::splat(8));
        grid.set_config_with(bigger, &ProviderRegistry::new()).unwrap();
        assert_eq!(grid.version(), version + 1);
        assert!(grid.is_empty());
        assert_eq!(grid.buffers().ranges().len(), 512);

        let report = grid.maintain(2, &indexed);
        assert_eq!(report.strategy, RebuildStrategy::Full);
        assert_eq!(grid.len(), 400);
        assert_eq!(grid.validate_layout(), Ok(()));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (mut grid, _) = seeded(10);
        let lopsided = GridConfig::from_bounds(Vec3::ZERO, Vec3::new(10.0, 10.0, 3.0), 4.0)
            .with_provider(ProviderId::UNIFORM);
        assert!(grid.set_config_with(lopsided, &ProviderRegistry::new()).is_err());
        assert_eq!(grid.config(), &config());

        let unknown = config().with_provider(ProviderId(42));
        assert_eq!(
            grid.set_config_with(unknown, &ProviderRegistry::new()),
            Err(ConfigError::UnknownProvider(ProviderId(42)))
        );
    }

    #[test]
    fn test_snapshot_round_trip_against_live_grid() {
        let (mut grid, indexed) = seeded(200);
        let snapshot = grid.snapshot(1);
        assert_eq!(grid.compare_snapshot(&snapshot), None);

        grid.push_dirty(DirtyOp::remove(Entity::from_index(0), Vec3::splat(0.5), CellId(0)));
        grid.maintain(2, &indexed[1..]);
        let mismatch = grid.compare_snapshot(&snapshot).unwrap();
        assert_eq!(mismatch.field, "version");

        let later = grid.snapshot(2);
        let diff = snapshot.diff(&later);
        assert_eq!(diff.entry_count_delta, -1);
        assert_eq!(diff.version_delta, 1);
    }
}
