//! Cached unfiltered row counts

use crate::database::Database;
use crate::query::CompiledQuery;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabula_core::{Result, TabulaError};

struct CachedCount {
    count: u64,
    cached_at: Instant,
}

/// Row counts per table name, shared by every table handle of a database
pub struct CountCache {
    entries: RwLock<HashMap<String, CachedCount>>,
    ttl: Duration,
}

impl CountCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached count, if still within the TTL
    pub fn get(&self, table: &str) -> Option<u64> {
        self.entries
            .read()
            .get(table)
            .filter(|cached| cached.cached_at.elapsed() < self.ttl)
            .map(|cached| cached.count)
    }

    pub fn insert(&self, table: &str, count: u64) {
        self.entries.write().insert(
            table.to_string(),
            CachedCount {
                count,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, table: &str) {
        if self.entries.write().remove(table).is_some() {
            tracing::debug!(table = %table, "record count invalidated");
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl std::fmt::Debug for CountCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountCache")
            .field("entries", &self.entries.read().len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Row counter of one table
#[derive(Debug, Clone)]
pub struct RecordCounter {
    table: String,
    cache: Arc<CountCache>,
}

impl RecordCounter {
    pub fn new(table: impl Into<String>, cache: Arc<CountCache>) -> Self {
        Self {
            table: table.into(),
            cache,
        }
    }

    /// Count rows matching `query`. Only unfiltered counts of base
    /// tables (`cacheable`) are served from and stored in the cache.
    #[tracing::instrument(skip(self, db, query), fields(table = %self.table))]
    pub async fn get_count(
        &self,
        db: &Database,
        query: &CompiledQuery,
        cacheable: bool,
    ) -> Result<u64> {
        if cacheable {
            if let Some(count) = self.cache.get(&self.table) {
                tracing::debug!(table = %self.table, count, "count served from cache");
                return Ok(count);
            }
        }

        let result = db.query(&query.sql, &query.params).await?;
        let count = result
            .scalar()
            .and_then(|v| v.as_i64())
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| {
                TabulaError::Query(format!("Count of '{}' returned no number", self.table))
            })?;

        if cacheable {
            self.cache.insert(&self.table, count);
        }
        Ok(count)
    }

    pub fn clear(&self) {
        self.cache.invalidate(&self.table);
    }

    pub fn cached(&self) -> Option<u64> {
        self.cache.get(&self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_ttl() {
        let cache = CountCache::new(Duration::from_secs(300));
        assert_eq!(cache.get("items"), None);
        cache.insert("items", 3);
        assert_eq!(cache.get("items"), Some(3));
        cache.invalidate("items");
        assert_eq!(cache.get("items"), None);

        let expired = CountCache::new(Duration::ZERO);
        expired.insert("items", 3);
        assert_eq!(expired.get("items"), None);
    }

    #[test]
    fn test_counters_share_cache() {
        let cache = Arc::new(CountCache::new(Duration::from_secs(60)));
        let a = RecordCounter::new("items", cache.clone());
        let b = RecordCounter::new("items", cache.clone());
        cache.insert("items", 7);
        assert_eq!(a.cached(), Some(7));
        b.clear();
        assert_eq!(a.cached(), None);
    }
}
