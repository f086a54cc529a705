use crate::error::Result;
use crate::models::Listing;
use crate::scrapers::types::SearchFilters;
use async_trait::async_trait;

/// Common trait for marketplace extractors.
/// Markup-specific code lives behind this so the scheduler and registry
/// never change when a site does.
#[async_trait]
pub trait ListingScraper: Send + Sync {
    /// Fetch one search results page and return the matching listings,
    /// deduplicated by URL. Errors only on transport failure.
    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Listing>>;

    /// Get the name of the scraper source
    fn source_name(&self) -> &'static str;
}
