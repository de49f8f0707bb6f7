use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{Platform, SearchResult};

/// Default freshness window for cached searches.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Time source for cache expiry.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    platform: Platform,
    query: String,
    ceiling_bits: u64,
}

impl CacheKey {
    pub fn new(platform: Platform, query: &str, price_ceiling: f64) -> Self {
        Self {
            platform,
            query: normalize_query(query),
            ceiling_bits: price_ceiling.to_bits(),
        }
    }
}

/// Lowercases, trims and collapses inner whitespace.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: SearchResult,
    fetched_at: DateTime<Utc>,
}

/// Process-wide search cache. Entries are checked for freshness lazily on lookup
/// and replaced wholesale on store; nothing is ever deleted explicitly.
#[derive(Clone, Debug)]
pub struct ProductCache {
    entries: moka::future::Cache<CacheKey, CacheEntry>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ProductCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: moka::future::Cache::builder().max_capacity(10_000).build(),
            clock,
            ttl,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn lookup(&self, key: &CacheKey) -> Option<SearchResult> {
        let entry = self.entries.get(key).await?;
        let age = self.clock.now() - entry.fetched_at;

        if age < ChronoDuration::zero() {
            warn!(
                query = %key.query,
                fetched_at = %entry.fetched_at,
                "cache entry stamped in the future, ignoring"
            );
            return None;
        }

        let ttl = ChronoDuration::from_std(self.ttl).unwrap_or(ChronoDuration::MAX);
        if age >= ttl {
            debug!(query = %key.query, age_secs = age.num_seconds(), "cache entry expired");
            return None;
        }

        Some(entry.result)
    }

    pub async fn store(&self, key: CacheKey, result: SearchResult) {
        let entry = CacheEntry {
            fetched_at: result.fetched_at,
            result,
        };
        self.entries.insert(key, entry).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_at(query: &str, at: DateTime<Utc>) -> SearchResult {
        SearchResult::new(query, 2000.0, Vec::new(), at)
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Cricket   BAT "), "cricket bat");
        assert_eq!(
            CacheKey::new(Platform::Amazon, "Laptop Bag", 3000.0),
            CacheKey::new(Platform::Amazon, " laptop  bag", 3000.0)
        );
        assert_ne!(
            CacheKey::new(Platform::Amazon, "laptop bag", 3000.0),
            CacheKey::new(Platform::Flipkart, "laptop bag", 3000.0)
        );
        assert_ne!(
            CacheKey::new(Platform::Amazon, "laptop bag", 3000.0),
            CacheKey::new(Platform::Amazon, "laptop bag", 3001.0)
        );
    }

    #[tokio::test]
    async fn test_hit_within_ttl_and_miss_after() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = ProductCache::new(DEFAULT_TTL, clock.clone());
        let key = CacheKey::new(Platform::Amazon, "laptop bag", 3000.0);

        assert!(cache.lookup(&key).await.is_none());

        let stored = result_at("laptop bag", cache.now());
        cache.store(key.clone(), stored.clone()).await;

        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.lookup(&key).await, Some(stored));

        clock.advance(Duration::from_secs(1));
        assert!(cache.lookup(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_future_timestamp_is_a_miss() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = ProductCache::new(DEFAULT_TTL, clock.clone());
        let key = CacheKey::new(Platform::Flipkart, "bat", 100.0);

        let skewed = cache.now() + ChronoDuration::seconds(60);
        cache.store(key.clone(), result_at("bat", skewed)).await;
        assert!(cache.lookup(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = ProductCache::new(DEFAULT_TTL, clock.clone());
        let key = CacheKey::new(Platform::Amazon, "bat", 100.0);

        cache.store(key.clone(), result_at("bat", cache.now())).await;
        clock.advance(Duration::from_secs(400));
        let fresh = result_at("bat v2", cache.now());
        cache.store(key.clone(), fresh.clone()).await;

        assert_eq!(cache.lookup(&key).await, Some(fresh));
    }
}
