//! Event channel: wire types, the log abstraction, producer and consumer.
//!
//! Every message is a JSON object whose `event_type` field selects the
//! payload shape. Decoding goes straight to [`ScoutEvent`]; an unknown
//! `event_type` is a decode error, never a silent skip.

pub mod consumer;
pub mod log;
pub mod postgres;
pub mod producer;

use crate::models::{Filter, Listing};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use consumer::{EventConsumer, EventHandler};
pub use log::{EventLog, LogRecord, MemoryEventLog};
pub use postgres::PgEventLog;
pub use producer::EventProducer;

pub const SCRAPE_REQUEST_KEY: &str = "scrape_request";

/// A filter was persisted and should be monitored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterCreated {
    pub user_id: i64,
    pub filter_id: i64,
    pub query: String,
    #[serde(default)]
    pub min_price: i64,
    #[serde(default)]
    pub max_price: i64,
    #[serde(default)]
    pub city: String,
    pub created_at: DateTime<Utc>,
}

/// Manual request for a full scrape cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeRequest {
    pub timestamp: DateTime<Utc>,
}

/// Listings found for a filter, for the notifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewListings {
    pub filter_id: i64,
    pub user_id: i64,
    pub query: String,
    pub listings: Vec<Listing>,
    pub found_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ScoutEvent {
    FilterCreated(FilterCreated),
    ScrapeRequest(ScrapeRequest),
    NewListings(NewListings),
}

impl ScoutEvent {
    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Partition key for the log
    pub fn key(&self) -> String {
        match self {
            ScoutEvent::FilterCreated(e) => format!("filter_{}", e.filter_id),
            ScoutEvent::ScrapeRequest(_) => SCRAPE_REQUEST_KEY.to_string(),
            ScoutEvent::NewListings(e) => format!("listings_filter_{}", e.filter_id),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ScoutEvent::FilterCreated(_) => "filter_created",
            ScoutEvent::ScrapeRequest(_) => "scrape_request",
            ScoutEvent::NewListings(_) => "new_listings",
        }
    }
}

impl From<&Filter> for FilterCreated {
    fn from(filter: &Filter) -> Self {
        Self {
            user_id: filter.user_id,
            filter_id: filter.id,
            query: filter.query.clone(),
            min_price: filter.min_price,
            max_price: filter.max_price,
            city: filter.city.clone(),
            created_at: filter.created_at,
        }
    }
}

impl From<FilterCreated> for Filter {
    fn from(event: FilterCreated) -> Self {
        Filter {
            id: event.filter_id,
            user_id: event.user_id,
            name: String::new(),
            query: event.query,
            min_price: event.min_price,
            max_price: event.max_price,
            city: event.city,
            is_active: true,
            created_at: event.created_at,
        }
    }
}
