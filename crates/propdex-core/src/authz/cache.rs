use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::FilterCacheConfig;
use crate::error::{PropdexError, Result};

use super::{AclQueryAuthorizationFilterFactory, QueryAuthorizationFilterFactory, QueryFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// A principal that reads everything is cached as `Unrestricted`, so it is
/// not recomputed on every lookup.
#[derive(Debug, Clone)]
enum CachedValue {
    Unrestricted,
    Filter(Arc<QueryFilter>),
}

impl CachedValue {
    fn from_filter(filter: Option<&Arc<QueryFilter>>) -> Self {
        filter.map_or(Self::Unrestricted, |filter| Self::Filter(Arc::clone(filter)))
    }

    fn into_filter(self) -> Option<Arc<QueryFilter>> {
        match self {
            Self::Unrestricted => None,
            Self::Filter(filter) => Some(filter),
        }
    }
}

#[derive(Debug)]
struct CachedFilter {
    /// `None` once reclaimed under memory pressure.
    value: Option<CachedValue>,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheState {
    entries: LruCache<String, CachedFilter>,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn record_hit(&mut self) {
        if self.hits == u64::MAX {
            self.reset_counters();
        }
        self.hits += 1;
    }

    fn record_miss(&mut self) {
        if self.misses == u64::MAX {
            self.reset_counters();
        }
        self.misses += 1;
    }

    fn reset_counters(&mut self) {
        debug!(hits = self.hits, misses = self.misses, "filter cache counters reset");
        self.hits = 0;
        self.misses = 0;
    }
}

/// Per-principal filter cache in front of [`AclQueryAuthorizationFilterFactory`].
///
/// Entries are bounded by an LRU capacity and a time-to-live. Expired,
/// evicted and reclaimed entries are misses; a stale filter is never served.
/// Anonymous lookups bypass the cache and share one read-for-all filter.
pub struct CachingQueryAuthorizationFilterFactory {
    inner: AclQueryAuthorizationFilterFactory,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Mutex<CacheState>,
    read_for_all: Arc<QueryFilter>,
}

impl std::fmt::Debug for CachingQueryAuthorizationFilterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingQueryAuthorizationFilterFactory")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CachingQueryAuthorizationFilterFactory {
    pub fn new(inner: AclQueryAuthorizationFilterFactory, config: FilterCacheConfig) -> Self {
        Self::with_clock(inner, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        inner: AclQueryAuthorizationFilterFactory,
        config: FilterCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        let read_for_all = inner.read_for_all_filter_query();
        Self {
            inner,
            clock,
            ttl: config.ttl,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
            read_for_all,
        }
    }

    pub fn stats(&self) -> Result<FilterCacheStats> {
        let state = self.lock_state()?;
        Ok(FilterCacheStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.entries.len(),
        })
    }

    /// Drops every cached filter value while keeping the keys.
    pub fn release_memory(&self) -> Result<usize> {
        let mut state = self.lock_state()?;
        let mut released = 0usize;
        for (_, entry) in state.entries.iter_mut() {
            if entry.value.take().is_some() {
                released += 1;
            }
        }
        debug!(released, "filter cache values released");
        Ok(released)
    }

    pub fn clear(&self) -> Result<()> {
        self.lock_state()?.entries.clear();
        Ok(())
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|_| PropdexError::mutex_poisoned("filter cache"))
    }

    #[cfg(test)]
    fn set_counters_for_test(&self, hits: u64, misses: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.hits = hits;
            state.misses = misses;
        }
    }
}

impl QueryAuthorizationFilterFactory for CachingQueryAuthorizationFilterFactory {
    fn authorization_query_filter(&self, token: Option<&str>) -> Result<Option<Arc<QueryFilter>>> {
        let Some(principal) = self.inner.principal_for_token(token) else {
            return Ok(Some(self.read_for_all_filter_query()));
        };
        let key = principal.qualified_name();
        let now = self.clock.now();

        {
            let mut state = self.lock_state()?;
            let lookup = state
                .entries
                .get(&key)
                .map(|entry| (entry.expires_at > now, entry.value.clone()));
            let cached = match lookup {
                Some((true, value)) => value,
                Some((false, _)) => {
                    state.entries.pop(&key);
                    None
                }
                None => None,
            };
            if let Some(value) = cached {
                state.record_hit();
                return Ok(value.into_filter());
            }
            state.record_miss();
        }

        let filter = self.inner.filter_for_principal(&principal)?;
        let mut state = self.lock_state()?;
        state.entries.put(
            key,
            CachedFilter {
                value: Some(CachedValue::from_filter(filter.as_ref())),
                expires_at: now + self.ttl,
            },
        );
        Ok(filter)
    }

    fn read_for_all_filter_query(&self) -> Arc<QueryFilter> {
        Arc::clone(&self.read_for_all)
    }
}
