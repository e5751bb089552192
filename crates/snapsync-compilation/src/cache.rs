//! Compiled-unit cache keyed by dependent checksum
//!
//! Two trackers whose project and transitive dependencies have identical
//! content produce interchangeable units, so a finished unit can be reused by
//! any later build with the same dependent checksum (an undo, a revert, a
//! sibling snapshot).

use crate::unit::CompiledUnit;
use moka::future::Cache;
use snapsync_checksum::Checksum;
use std::sync::Arc;

/// Bounded concurrent cache of complete compiled units
#[derive(Debug, Clone)]
pub struct CompiledUnitCache {
    inner: Cache<Checksum, Arc<CompiledUnit>>,
}

impl CompiledUnitCache {
    /// Cache holding at most `max_capacity` units
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Store a unit under its dependent checksum
    ///
    /// Partial units are never stored.
    pub async fn insert(&self, unit: Arc<CompiledUnit>) {
        if unit.is_partial() {
            return;
        }
        self.inner.insert(unit.dependent_checksum(), unit).await;
    }

    /// Unit built for `dependent_checksum`, if still cached
    pub async fn get(&self, dependent_checksum: &Checksum) -> Option<Arc<CompiledUnit>> {
        self.inner.get(dependent_checksum).await
    }
}

impl Default for CompiledUnitCache {
    /// Cache with default capacity (1,024 units)
    fn default() -> Self {
        Self::new(1_024)
    }
}
