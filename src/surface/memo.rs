//! Scoped memoization of pure capability results.
//!
//! A `MemoCache` belongs to exactly one surface. Entries are keyed by a
//! [`Fingerprint`] of (data generation, capability, arguments). Any in-place
//! mutation of the surface data must call [`MemoCache::invalidate`], which
//! bumps the generation and drops every entry, so a stale value can never be
//! returned for mutated data.

use crate::types::Arguments;
use std::collections::HashMap;
use std::sync::Arc;

/// Cache key for one memoized computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub generation: u64,
    pub capability: String,
    pub arguments: String,
}

#[derive(Debug, Default)]
pub struct MemoCache {
    generation: u64,
    entries: HashMap<Fingerprint, Arc<[f64]>>,
    hits: u64,
    misses: u64,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current data generation. Increases on every invalidation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fingerprint(&self, capability: &str, args: &Arguments) -> Fingerprint {
        Fingerprint {
            generation: self.generation,
            capability: capability.to_string(),
            arguments: args.canonical(),
        }
    }

    /// Return the cached values for `(capability, args)`, computing and
    /// storing them on a miss. Errors are not cached.
    pub fn get_or_try_insert_with<E, F>(
        &mut self,
        capability: &str,
        args: &Arguments,
        compute: F,
    ) -> Result<Arc<[f64]>, E>
    where
        F: FnOnce() -> Result<Vec<f64>, E>,
    {
        let key = self.fingerprint(capability, args);
        if let Some(values) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(values));
        }
        self.misses += 1;
        let values: Arc<[f64]> = compute()?.into();
        self.entries.insert(key, Arc::clone(&values));
        Ok(values)
    }

    /// Invalidation hook: must be fired whenever the underlying data changes.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
