//! Result cache and per-query rate limiter.
//!
//! Both sit on a [`KvStore`] and fail open: when the backing store errors,
//! lookups miss and every query is admitted. Callers never see store errors.

pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::models::ExtractionResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use memory::MemoryKvStore;
pub use postgres::PgKvStore;

pub const RESULT_TTL: Duration = Duration::from_secs(10 * 60);
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Key/value backing store with expiring entries
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Value for `key`, or `None` if missing or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value and expiry
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomically increment the counter at `key` and return the new count.
    /// A counter that does not exist (or has expired) starts at 1 and
    /// expires `ttl` later; later increments keep that expiry.
    async fn incr_ex(&self, key: &str, ttl: Duration) -> Result<i64>;
}

/// Cache key shared by every filter with the same matching fields.
///
/// Free-text fields are percent-encoded so the `:` separators are unambiguous.
pub fn signature(query: &str, min_price: i64, max_price: i64, city: &str) -> String {
    format!(
        "scraping:{}:{}:{}:{}",
        urlencoding::encode(query),
        min_price,
        max_price,
        urlencoding::encode(city)
    )
}

fn rate_limit_key(query: &str) -> String {
    format!("rate_limit:{}", query)
}

#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn KvStore>,
    result_ttl: Duration,
    rate_limit_window: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_ttls(store, RESULT_TTL, RATE_LIMIT_WINDOW)
    }

    pub fn with_ttls(store: Arc<dyn KvStore>, result_ttl: Duration, rate_limit_window: Duration) -> Self {
        Self {
            store,
            result_ttl,
            rate_limit_window,
        }
    }

    /// Cached result for a signature. Store or decode failures read as a miss.
    pub async fn get(&self, signature: &str) -> Option<ExtractionResult> {
        let raw = match self.store.get(signature).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(signature, error = %e, "Cache lookup failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(signature, error = %e, "Cached entry is not a valid result, ignoring");
                None
            }
        }
    }

    /// Store a result under its signature. Failures are logged and swallowed.
    pub async fn put(&self, signature: &str, result: &ExtractionResult) {
        let raw = match serde_json::to_string(result) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(signature, error = %e, "Failed to encode result for cache");
                return;
            }
        };

        match self.store.set_ex(signature, &raw, self.result_ttl).await {
            Ok(()) => debug!(signature, count = result.listings.len(), "Cached extraction result"),
            Err(e) => warn!(signature, error = %e, "Failed to write cache entry"),
        }
    }

    /// Admit the first lookup of a raw query per window; refuse the rest.
    /// An unreachable store admits everything.
    pub async fn admit(&self, query: &str) -> bool {
        match self.store.incr_ex(&rate_limit_key(query), self.rate_limit_window).await {
            Ok(count) => count == 1,
            Err(e) => {
                warn!(query, error = %e, "Rate limiter unavailable, admitting query");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoutError;
    use crate::models::Listing;

    struct BrokenStore;

    #[async_trait]
    impl KvStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(ScoutError::Http("connection refused".to_string()))
        }

        async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(ScoutError::Http("connection refused".to_string()))
        }

        async fn incr_ex(&self, _key: &str, _ttl: Duration) -> Result<i64> {
            Err(ScoutError::Http("connection refused".to_string()))
        }
    }

    fn result() -> ExtractionResult {
        ExtractionResult::new(vec![Listing {
            url: "https://www.olx.ua/d/uk/obyavlenie/a-ID1.html".to_string(),
            title: "A".to_string(),
            price: "100 грн.".to_string(),
            price_int: 100,
            location: "Київ".to_string(),
        }])
    }

    #[test]
    fn signature_is_deterministic() {
        assert_eq!(
            signature("iphone", 100, 200, "kyiv"),
            signature("iphone", 100, 200, "kyiv")
        );
    }

    #[test]
    fn signature_changes_with_every_field() {
        let base = signature("iphone", 100, 200, "kyiv");
        assert_ne!(base, signature("iphone 15", 100, 200, "kyiv"));
        assert_ne!(base, signature("iphone", 101, 200, "kyiv"));
        assert_ne!(base, signature("iphone", 100, 201, "kyiv"));
        assert_ne!(base, signature("iphone", 100, 200, "lviv"));
        assert_ne!(base, signature("iphone", 100, 200, ""));
    }

    #[test]
    fn signature_separators_cannot_collide() {
        assert_ne!(signature("a:1", 2, 3, "x"), signature("a", 1, 2, "3:x"));
    }

    #[tokio::test]
    async fn put_then_get() {
        let cache = ResultCache::new(Arc::new(MemoryKvStore::new()));
        let sig = signature("iphone", 0, 0, "");

        assert!(cache.get(&sig).await.is_none());
        cache.put(&sig, &result()).await;

        let cached = cache.get(&sig).await.expect("cached");
        assert_eq!(cached.listings, result().listings);
    }

    #[tokio::test(start_paused = true)]
    async fn results_expire_after_ttl() {
        let cache = ResultCache::new(Arc::new(MemoryKvStore::new()));
        let sig = signature("iphone", 0, 0, "");
        cache.put(&sig, &result()).await;

        tokio::time::advance(RESULT_TTL - Duration::from_secs(1)).await;
        assert!(cache.get(&sig).await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(&sig).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn admit_once_per_window() {
        let cache = ResultCache::new(Arc::new(MemoryKvStore::new()));

        assert!(cache.admit("iphone").await);
        assert!(!cache.admit("iphone").await);
        assert!(cache.admit("samsung").await);

        tokio::time::advance(RATE_LIMIT_WINDOW - Duration::from_secs(1)).await;
        assert!(!cache.admit("iphone").await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.admit("iphone").await);
        assert!(!cache.admit("iphone").await);
    }

    #[tokio::test]
    async fn admit_is_independent_of_cached_results() {
        let cache = ResultCache::new(Arc::new(MemoryKvStore::new()));
        cache.put(&signature("iphone", 0, 0, ""), &result()).await;

        assert!(cache.admit("iphone").await);
    }

    #[tokio::test]
    async fn broken_store_fails_open() {
        let cache = ResultCache::new(Arc::new(BrokenStore));
        let sig = signature("iphone", 0, 0, "");

        cache.put(&sig, &result()).await;
        assert!(cache.get(&sig).await.is_none());
        assert!(cache.admit("iphone").await);
        assert!(cache.admit("iphone").await);
    }

    #[tokio::test]
    async fn corrupt_entry_reads_as_miss() {
        let store = Arc::new(MemoryKvStore::new());
        store.set_ex("scraping:x", "not json", RESULT_TTL).await.unwrap();

        let cache = ResultCache::new(store);
        assert!(cache.get("scraping:x").await.is_none());
    }
}
