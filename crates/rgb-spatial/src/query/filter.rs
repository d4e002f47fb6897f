//! Statically dispatched entity filters.

use crate::Entity;

/// Decides whether a candidate entity may appear in query results.
///
/// Queries are generic over the filter so the check inlines into the scan.
pub trait EntityFilter {
    fn accept(&self, entity: Entity) -> bool;
}

/// Accepts every entity.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl EntityFilter for AcceptAll {
    #[inline]
    fn accept(&self, _entity: Entity) -> bool {
        true
    }
}

/// Accepts only entities contained in a sorted slice.
#[derive(Clone, Copy, Debug)]
pub struct Whitelist<'a> {
    sorted: &'a [Entity],
}

impl<'a> Whitelist<'a> {
    /// `sorted` must be in ascending entity order.
    #[must_use]
    pub fn new(sorted: &'a [Entity]) -> Self {
        debug_assert!(sorted.windows(2).all(|pair| pair[0] <= pair[1]));
        Self { sorted }
    }
}

impl EntityFilter for Whitelist<'_> {
    #[inline]
    fn accept(&self, entity: Entity) -> bool {
        self.sorted.binary_search(&entity).is_ok()
    }
}

impl<F> EntityFilter for F
where
    F: Fn(Entity) -> bool,
{
    #[inline]
    fn accept(&self, entity: Entity) -> bool {
        self(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitelist() {
        let allowed = [Entity::from_index(2), Entity::from_index(5)];
        let filter = Whitelist::new(&allowed);
        assert!(filter.accept(Entity::from_index(5)));
        assert!(!filter.accept(Entity::from_index(3)));
    }

    #[test]
    fn test_closure_filter() {
        let even = |entity: Entity| entity.index() % 2 == 0;
        assert!(even.accept(Entity::from_index(4)));
        assert!(!even.accept(Entity::from_index(7)));
        assert!(AcceptAll.accept(Entity::from_index(7)));
    }
}
