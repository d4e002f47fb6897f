//! Integration tests for rgb-spatial

use glam::{UVec3, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rgb_spatial::prelude::*;
use rgb_spatial::{
    CellId, EntityAllocator, GridBuffers, PartialRebuildError, PartialUpdater, ProviderRegistry,
    RebuildStaging, RebuildThresholds, quantize,
};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> GridConfig {
    GridConfig::uniform(Vec3::ZERO, 1.0, UVec3::splat(16))
}

fn random_entities(count: usize, seed: u64) -> Vec<IndexedEntity> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut allocator = EntityAllocator::new();
    (0..count)
        .map(|_| {
            let position = Vec3::new(
                rng.gen_range(0.0..16.0),
                rng.gen_range(0.0..16.0),
                rng.gen_range(0.0..16.0),
            );
            IndexedEntity::new(allocator.allocate(), position)
        })
        .collect()
}

fn full_build(config: &GridConfig, indexed: &[IndexedEntity]) -> GridBuffers {
    let mut buffers = GridBuffers::with_cells(config.cell_count());
    RebuildStaging::new().rebuild(config, indexed, &mut buffers);
    buffers
}

fn grid_with(indexed: &[IndexedEntity]) -> SpatialGrid {
    let mut grid = SpatialGrid::with_registry(SpatialSettings::new(config()), &ProviderRegistry::new())
        .unwrap();
    grid.rebuild_full(0, indexed);
    grid
}

fn counted(buffers: &GridBuffers) -> usize {
    buffers.ranges().iter().map(|range| range.count as usize).sum()
}

// ============================================================================
// Layout invariants
// ============================================================================

#[test]
fn test_invariants_hold_across_mixed_ticks() {
    init_tracing();
    let config = config();
    let mut indexed = random_entities(500, 1);
    let mut grid = grid_with(&indexed);
    let mut rng = StdRng::seed_from_u64(2);

    for tick in 1..40 {
        let moves = if tick % 10 == 0 { 400 } else { rng.gen_range(1..60) };
        for _ in 0..moves {
            let slot = rng.gen_range(0..indexed.len());
            let item = &mut indexed[slot];
            let old_cell = quantize::cell_id(item.position, &config);
            item.position = Vec3::new(
                rng.gen_range(0.0..16.0),
                rng.gen_range(0.0..16.0),
                rng.gen_range(0.0..16.0),
            );
            grid.push_dirty(DirtyOp::update_to(item.entity, item.position, old_cell, &config));
        }

        let report = grid.maintain(tick, &indexed);
        assert_ne!(report.strategy, RebuildStrategy::None);
        assert!(!report.fell_back, "tick {tick} fell back");
        assert_eq!(counted(grid.buffers()), grid.len());
        assert_eq!(grid.validate_layout(), Ok(()));
        assert_eq!(grid.len(), indexed.len());
    }

    assert_eq!(grid.buffers(), &full_build(&config, &indexed));
}

#[test]
fn test_add_then_remove_restores_layout() {
    let config = config();
    let indexed = random_entities(300, 3);
    let mut buffers = full_build(&config, &indexed);
    let before = buffers.clone();

    let entity = Entity::from_index(10_000);
    let position = Vec3::new(4.2, 9.9, 0.1);
    let add = DirtyOp::add_at(entity, position, &config);
    let remove = DirtyOp::remove(entity, position, add.new_cell);

    let mut updater = PartialUpdater::new();
    updater.apply(&config, &mut buffers, &[add]).unwrap();
    assert_eq!(buffers.len(), before.len() + 1);
    updater.apply(&config, &mut buffers, &[remove]).unwrap();
    assert_eq!(buffers, before);
}

#[test]
fn test_replayed_update_only_touches_position() {
    let config = config();
    let indexed = random_entities(300, 4);
    let mut buffers = full_build(&config, &indexed);
    let target = indexed[7];
    let old_cell = quantize::cell_id(target.position, &config);
    let moved = DirtyOp::update_to(target.entity, Vec3::splat(15.5), old_cell, &config);

    let mut updater = PartialUpdater::new();
    updater.apply(&config, &mut buffers, &[moved]).unwrap();
    let once = buffers.clone();
    updater.apply(&config, &mut buffers, &[moved]).unwrap();
    assert_eq!(buffers, once);

    let nudged = DirtyOp { position: Vec3::splat(15.6), ..moved };
    updater.apply(&config, &mut buffers, &[nudged]).unwrap();
    let changed: Vec<_> = buffers
        .entries()
        .iter()
        .zip(once.entries())
        .filter(|(a, b)| a != b)
        .collect();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].0.entity, target.entity);
    assert_eq!(buffers.ranges(), once.ranges());
}

#[test]
fn test_stale_remove_leaves_buffers_untouched() {
    let config = config();
    let indexed = random_entities(300, 5);
    let mut buffers = full_build(&config, &indexed);
    let before = buffers.clone();

    let present = indexed[0];
    let wrong_cell = CellId((quantize::cell_id(present.position, &config).0 + 1) % 4096);
    let ops = [
        DirtyOp::add_at(Entity::from_index(9_999), Vec3::ONE, &config),
        DirtyOp::remove(present.entity, present.position, wrong_cell),
    ];

    let result = PartialUpdater::new().apply(&config, &mut buffers, &ops);
    assert!(matches!(result, Err(PartialRebuildError::StaleRemove { .. })));
    assert_eq!(buffers, before);
}

// ============================================================================
// Full vs incremental equivalence
// ============================================================================

#[test]
fn test_sequential_adds_match_full_rebuild() {
    let config = config();
    let indexed = random_entities(1000, 6);
    let full = full_build(&config, &indexed);

    let mut incremental = GridBuffers::with_cells(config.cell_count());
    let mut updater = PartialUpdater::new();
    for item in &indexed {
        let op = DirtyOp::add_at(item.entity, item.position, &config);
        updater.apply(&config, &mut incremental, &[op]).unwrap();
    }
    assert_eq!(incremental, full);

    let origin = Vec3::ZERO;
    let query = RadiusQuery::new(origin, 2.0 * config.cell_size).sorted();
    let mut from_full = Vec::new();
    let mut from_incremental = Vec::new();
    GridView::new(&config, &full).radius(&query, &AcceptAll, &mut from_full);
    GridView::new(&config, &incremental).radius(&query, &AcceptAll, &mut from_incremental);
    assert_eq!(from_full, from_incremental);

    let expected: Vec<Entity> = {
        let mut within: Vec<_> = indexed
            .iter()
            .filter(|item| item.position.length_squared() <= 4.0)
            .map(|item| item.entity)
            .collect();
        within.sort_unstable();
        within
    };
    assert_eq!(from_full, expected);
}

#[test]
fn test_full_rebuild_is_independent_of_thread_count() {
    let config = config();
    let indexed = random_entities(20_000, 7);

    let build_with = |threads: usize| {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap();
        pool.install(|| full_build(&config, &indexed))
    };

    let single = build_with(1);
    assert_eq!(single.validate_layout(), Ok(()));
    assert_eq!(build_with(3), single);
    assert_eq!(build_with(8), single);
}

// ============================================================================
// Policy and queries
// ============================================================================

#[test]
fn test_policy_scenarios() {
    let thresholds = RebuildThresholds::default();
    assert_eq!(thresholds.select(1025, 2000), RebuildStrategy::Full);
    assert_eq!(thresholds.select(10, 2000), RebuildStrategy::Partial);
    assert_eq!(thresholds.select(10, 50), RebuildStrategy::Full);
}

#[test]
fn test_cell_ids_on_small_grid() {
    let config = GridConfig::uniform(Vec3::ZERO, 1.0, UVec3::splat(4));
    assert_eq!(quantize::cell_id(Vec3::splat(0.5), &config), CellId(0));
    assert_eq!(quantize::cell_id(Vec3::splat(3.9), &config), CellId(63));

    for k in 0..4u8 {
        let on_boundary = f32::from(k);
        let below = f32::from_bits(on_boundary.to_bits().saturating_sub(1)).max(0.0);
        let a = quantize::cell_id(Vec3::new(on_boundary, 0.0, 0.0), &config);
        let b = quantize::cell_id(Vec3::new(below, 0.0, 0.0), &config);
        assert_eq!(a, b, "boundary {k}");
    }
}

#[test]
fn test_knn_with_fewer_entities_than_k() {
    let indexed = [
        IndexedEntity::new(Entity::from_index(1), Vec3::new(9.0, 9.0, 9.0)),
        IndexedEntity::new(Entity::from_index(2), Vec3::new(1.0, 1.0, 1.0)),
        IndexedEntity::new(Entity::from_index(3), Vec3::new(3.0, 3.0, 3.0)),
    ];
    let grid = grid_with(&indexed);
    let mut out = Vec::new();
    let found = grid
        .view()
        .k_nearest(&KnnQuery::new(Vec3::ZERO, 5, 100.0), &AcceptAll, &mut out);

    assert_eq!(found, 3);
    let order: Vec<u32> = out.iter().map(|n| n.entity.index()).collect();
    assert_eq!(order, vec![2, 3, 1]);
    assert!(out.windows(2).all(|w| w[0].distance_sq < w[1].distance_sq));
}

#[test]
fn test_concurrent_queries_agree() {
    let indexed = random_entities(2000, 8);
    let grid = grid_with(&indexed);
    let view = grid.view();

    let origins: Vec<Vec3> = indexed.iter().take(64).map(|item| item.position).collect();
    let expected: Vec<Vec<Entity>> = origins
        .iter()
        .map(|&origin| {
            let mut out = Vec::new();
            view.radius(&RadiusQuery::new(origin, 1.5).sorted(), &AcceptAll, &mut out);
            out
        })
        .collect();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let mut out = Vec::new();
                for (origin, expected) in origins.iter().zip(&expected) {
                    view.radius(&RadiusQuery::new(*origin, 1.5).sorted(), &AcceptAll, &mut out);
                    assert_eq!(&out, expected);
                }
            });
        }
    });

    let queries: Vec<RadiusQuery> = origins
        .iter()
        .map(|&origin| RadiusQuery::new(origin, 1.5).sorted())
        .collect();
    let capacity = expected.iter().map(Vec::len).max().unwrap_or(0);
    let slots = BatchSlot::packed(&vec![capacity; queries.len()]);
    let mut hits = vec![BatchHit::default(); capacity * queries.len()];
    let mut counts = vec![0; queries.len()];
    view.radius_batch(&queries, &AcceptAll, &slots, &mut hits, &mut counts)
        .unwrap();
    for (i, expected) in expected.iter().enumerate() {
        let batch: Vec<Entity> = hits[slots[i].start..slots[i].start + counts[i]]
            .iter()
            .map(|hit| hit.entity)
            .collect();
        assert_eq!(&batch, expected);
    }
}

#[test]
fn test_filters_never_change_membership() {
    let indexed = random_entities(100, 9);
    let grid = grid_with(&indexed);
    let view = grid.view();

    let allowed: Vec<Entity> = indexed.iter().step_by(3).map(|item| item.entity).collect();
    let mut out = Vec::new();
    view.radius(
        &RadiusQuery::unbounded(Vec3::ZERO).sorted(),
        &Whitelist::new(&allowed),
        &mut out,
    );
    assert_eq!(out, allowed);
    assert_eq!(grid.len(), 100);
}
