//! Partial-vs-full rebuild decision.

use crate::{RebuildStrategy, RebuildThresholds};

impl RebuildThresholds {
    /// Pick the rebuild strategy for a tick with `dirty_ops` pending ops
    /// against `entry_count` stored entries.
    ///
    /// Pure function of its inputs; never returns [`RebuildStrategy::None`].
    #[must_use]
    pub fn select(&self, dirty_ops: usize, entry_count: usize) -> RebuildStrategy {
        if entry_count < self.min_entry_count_for_partial {
            return RebuildStrategy::Full;
        }
        if dirty_ops > self.max_dirty_ops_for_partial {
            return RebuildStrategy::Full;
        }
        let ratio = if entry_count == 0 {
            f32::INFINITY
        } else {
            dirty_ops as f32 / entry_count as f32
        };
        if ratio >= self.max_dirty_ratio_for_partial {
            return RebuildStrategy::Full;
        }
        RebuildStrategy::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_grids_always_rebuild_fully() {
        let thresholds = RebuildThresholds::default();
        assert_eq!(thresholds.select(1, 99), RebuildStrategy::Full);
        assert_eq!(thresholds.select(1, 100), RebuildStrategy::Partial);
    }

    #[test]
    fn test_op_count_limit() {
        let thresholds = RebuildThresholds::default();
        assert_eq!(thresholds.select(1024, 10_000), RebuildStrategy::Partial);
        assert_eq!(thresholds.select(1025, 2000), RebuildStrategy::Full);
    }

    #[test]
    fn test_ratio_limit_is_inclusive() {
        let thresholds = RebuildThresholds::default();
        assert_eq!(thresholds.select(34, 100), RebuildStrategy::Partial);
        assert_eq!(thresholds.select(35, 100), RebuildStrategy::Full);
    }

    #[test]
    fn test_zero_minimum_with_empty_grid() {
        let thresholds = RebuildThresholds {
            min_entry_count_for_partial: 0,
            ..RebuildThresholds::default()
        };
        assert_eq!(thresholds.select(0, 0), RebuildStrategy::Full);
    }
}
