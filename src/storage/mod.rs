pub mod postgres;

use crate::error::Result;
use crate::models::Filter;
use async_trait::async_trait;

pub use postgres::PgFilterStore;

/// Durable storage for user filters, as seen by the scraper
#[async_trait]
pub trait FilterStore: Send + Sync {
    /// All filters with the active flag set
    async fn list_active_filters(&self) -> Result<Vec<Filter>>;
}

/// Fixed set of filters, for wiring without a database and for tests
#[derive(Debug, Default, Clone)]
pub struct MemoryFilterStore {
    filters: Vec<Filter>,
}

impl MemoryFilterStore {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }
}

#[async_trait]
impl FilterStore for MemoryFilterStore {
    async fn list_active_filters(&self) -> Result<Vec<Filter>> {
        Ok(self.filters.iter().filter(|f| f.is_active).cloned().collect())
    }
}
