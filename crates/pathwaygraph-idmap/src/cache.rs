//! Memoizing wrapper for slow mapping tables.
//!
//! Misses are cached as well as hits; errors are not, so a transient backend
//! failure is retried on the next lookup.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{MappedId, MappingQuery, MappingTable};

pub struct CachedMappingTable<T> {
    inner: T,
    cache: DashMap<MappingQuery, Option<MappedId>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl<T: MappingTable> CachedMappingTable<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl<T: MappingTable> MappingTable for CachedMappingTable<T> {
    fn lookup_normalized(&self, query: &MappingQuery) -> anyhow::Result<Option<MappedId>> {
        if let Some(cached) = self.cache.get(query) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = self.inner.lookup_normalized(query)?;
        self.cache.insert(query.clone(), result.clone());
        Ok(result)
    }
}
