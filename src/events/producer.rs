use crate::error::Result;
use crate::events::{EventLog, FilterCreated, NewListings, ScoutEvent, ScrapeRequest};
use crate::models::{Filter, Listing};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct EventProducer {
    log: Arc<dyn EventLog>,
}

impl EventProducer {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    /// Append an event under its partition key and return its offset
    pub async fn publish(&self, event: &ScoutEvent) -> Result<i64> {
        let payload = event.encode()?;
        let offset = self.log.append(&event.key(), &payload).await?;
        Ok(offset)
    }

    pub async fn publish_filter_created(&self, filter: &Filter) -> Result<i64> {
        let offset = self
            .publish(&ScoutEvent::FilterCreated(FilterCreated::from(filter)))
            .await?;

        info!(
            filter_id = filter.id,
            user_id = filter.user_id,
            offset,
            "Published filter_created event"
        );
        Ok(offset)
    }

    pub async fn publish_scrape_request(&self) -> Result<i64> {
        let offset = self
            .publish(&ScoutEvent::ScrapeRequest(ScrapeRequest {
                timestamp: Utc::now(),
            }))
            .await?;

        info!(offset, "Published scrape_request event");
        Ok(offset)
    }

    pub async fn publish_new_listings(&self, filter: &Filter, listings: Vec<Listing>) -> Result<i64> {
        let count = listings.len();
        let offset = self
            .publish(&ScoutEvent::NewListings(NewListings {
                filter_id: filter.id,
                user_id: filter.user_id,
                query: filter.query.clone(),
                listings,
                found_at: Utc::now(),
            }))
            .await?;

        info!(
            filter_id = filter.id,
            count,
            offset,
            "Published new_listings event"
        );
        Ok(offset)
    }
}
