//! In-memory registry of active filters.
//!
//! The periodic scheduler iterates snapshots of this map while the event
//! consumer inserts into it. Snapshots are copies, so no lock is held while
//! a cycle runs.

use crate::error::Result;
use crate::models::Filter;
use crate::storage::FilterStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Default)]
pub struct FilterRegistry {
    filters: RwLock<HashMap<i64, Filter>>,
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by id. The incoming copy always wins.
    pub async fn upsert(&self, filter: Filter) -> usize {
        let mut filters = self.filters.write().await;
        filters.insert(filter.id, filter);
        filters.len()
    }

    /// Point-in-time copy of all entries, ordered by id
    pub async fn snapshot(&self) -> Vec<Filter> {
        let filters = self.filters.read().await;
        let mut snapshot: Vec<Filter> = filters.values().cloned().collect();
        snapshot.sort_by_key(|f| f.id);
        snapshot
    }

    pub async fn get(&self, id: i64) -> Option<Filter> {
        self.filters.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.filters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.filters.read().await.is_empty()
    }

    /// Replace the contents with every active filter in `store`.
    ///
    /// On error the registry is left untouched.
    pub async fn load_from(&self, store: &dyn FilterStore) -> Result<usize> {
        let loaded = store.list_active_filters().await?;

        for filter in &loaded {
            info!(
                filter_id = filter.id,
                user_id = filter.user_id,
                query = %filter.query,
                "Loaded filter"
            );
        }

        let count = loaded.len();
        let mut filters = self.filters.write().await;
        *filters = loaded.into_iter().map(|f| (f.id, f)).collect();

        info!(count, "Loaded active filters for monitoring");
        Ok(count)
    }

    /// Mark a filter as being scraped. Returns `None` if a scrape of the same
    /// filter is already running; the marker clears when the guard drops.
    pub fn try_begin(&self, filter_id: i64) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(filter_id) {
            return None;
        }

        Some(InFlightGuard {
            filter_id,
            in_flight: Arc::clone(&self.in_flight),
        })
    }
}

pub struct InFlightGuard {
    filter_id: i64,
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.filter_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoutError;
    use crate::storage::MemoryFilterStore;
    use async_trait::async_trait;
    use chrono::Utc;

    fn filter(id: i64, query: &str, is_active: bool) -> Filter {
        Filter {
            id,
            user_id: 1,
            name: String::new(),
            query: query.to_string(),
            min_price: 0,
            max_price: 0,
            city: String::new(),
            is_active,
            created_at: Utc::now(),
        }
    }

    struct FailingStore;

    #[async_trait]
    impl FilterStore for FailingStore {
        async fn list_active_filters(&self) -> Result<Vec<Filter>> {
            Err(ScoutError::Config("database unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn upsert_overwrites() {
        let registry = FilterRegistry::new();
        registry.upsert(filter(1, "iphone", true)).await;
        let count = registry.upsert(filter(1, "samsung", true)).await;

        assert_eq!(count, 1);
        assert_eq!(registry.get(1).await.unwrap().query, "samsung");
    }

    #[tokio::test]
    async fn snapshot_is_detached_and_ordered() {
        let registry = FilterRegistry::new();
        registry.upsert(filter(3, "c", true)).await;
        registry.upsert(filter(1, "a", true)).await;

        let snapshot = registry.snapshot().await;
        registry.upsert(filter(2, "b", true)).await;

        let ids: Vec<_> = snapshot.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn load_replaces_with_active_filters() {
        let registry = FilterRegistry::new();
        registry.upsert(filter(99, "stale", true)).await;

        let store = MemoryFilterStore::new(vec![filter(1, "a", true), filter(2, "b", false)]);
        let loaded = registry.load_from(&store).await.unwrap();

        assert_eq!(loaded, 1);
        assert!(registry.get(99).await.is_none());
        assert!(registry.get(2).await.is_none());
        assert!(registry.get(1).await.is_some());
    }

    #[tokio::test]
    async fn failed_load_keeps_existing_entries() {
        let registry = FilterRegistry::new();
        registry.upsert(filter(5, "kept", true)).await;

        assert!(registry.load_from(&FailingStore).await.is_err());
        assert_eq!(registry.len().await, 1);
    }

    #[test]
    fn in_flight_marker_blocks_second_scrape() {
        let registry = FilterRegistry::new();

        let guard = registry.try_begin(1).expect("first scrape starts");
        assert!(registry.try_begin(1).is_none());
        assert!(registry.try_begin(2).is_some());

        drop(guard);
        assert!(registry.try_begin(1).is_some());
    }

    #[tokio::test]
    async fn concurrent_upserts_and_snapshots() {
        let registry = Arc::new(FilterRegistry::new());

        let mut handles = Vec::new();
        for id in 0..50 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.upsert(filter(id, "q", true)).await;
                registry.snapshot().await.len()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap() >= 1);
        }

        assert_eq!(registry.len().await, 50);
    }
}
