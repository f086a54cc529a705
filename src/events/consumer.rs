use crate::error::{Result, ScoutError};
use crate::events::{EventLog, FilterCreated, LogRecord, NewListings, ScoutEvent, ScrapeRequest};
use crate::shutdown::sleep_or_cancel;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const BATCH_SIZE: usize = 100;

/// Receives decoded events, one call per message
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_filter_created(&self, event: FilterCreated) -> Result<()>;
    async fn handle_scrape_request(&self, event: ScrapeRequest) -> Result<()>;
    async fn handle_new_listings(&self, event: NewListings) -> Result<()>;
}

/// Polls the log for a consumer group and dispatches each message.
///
/// A message that fails to decode or whose handler errors is logged and
/// committed past; it never stops the loop.
pub struct EventConsumer {
    log: Arc<dyn EventLog>,
    group: String,
    poll_interval: Duration,
}

impl EventConsumer {
    pub fn new(log: Arc<dyn EventLog>, group: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            log,
            group: group.into(),
            poll_interval,
        }
    }

    /// Consume until `token` is cancelled
    pub async fn run(&self, handler: &dyn EventHandler, token: CancellationToken) -> Result<()> {
        let Some(mut next) = self.starting_offset(&token).await else {
            info!(group = %self.group, "Consumer stopped before start");
            return Ok(());
        };

        info!(group = %self.group, offset = next, "Consumer started");

        while !token.is_cancelled() {
            let batch = tokio::select! {
                _ = token.cancelled() => break,
                batch = self.log.read_from(next, BATCH_SIZE) => batch,
            };

            let records = match batch {
                Ok(records) => records,
                Err(e) => {
                    warn!(group = %self.group, error = %e, "Error reading from event log");
                    if sleep_or_cancel(&token, self.poll_interval).await {
                        break;
                    }
                    continue;
                }
            };

            if records.is_empty() {
                if sleep_or_cancel(&token, self.poll_interval).await {
                    break;
                }
                continue;
            }

            for record in records {
                if token.is_cancelled() {
                    break;
                }

                if let Err(e) = dispatch(&record, handler).await {
                    warn!(offset = record.offset, key = %record.key, error = %e, "Error handling message");
                }

                next = record.offset + 1;
                if let Err(e) = self.log.commit(&self.group, next).await {
                    warn!(group = %self.group, offset = next, error = %e, "Failed to commit offset");
                }
            }
        }

        info!(group = %self.group, "Consumer stopping...");
        Ok(())
    }

    /// Committed cursor, or the current end of the log for a new group.
    /// Retries until the log answers or the token is cancelled.
    async fn starting_offset(&self, token: &CancellationToken) -> Option<i64> {
        loop {
            let offset = match self.log.committed_offset(&self.group).await {
                Ok(Some(offset)) => Ok(offset),
                Ok(None) => self.log.end_offset().await,
                Err(e) => Err(e),
            };

            match offset {
                Ok(offset) => return Some(offset),
                Err(e) => {
                    warn!(group = %self.group, error = %e, "Event log unavailable, retrying");
                    if sleep_or_cancel(token, self.poll_interval).await {
                        return None;
                    }
                }
            }
        }
    }
}

async fn dispatch(record: &LogRecord, handler: &dyn EventHandler) -> Result<()> {
    debug!(offset = record.offset, key = %record.key, "Received message");

    let event = ScoutEvent::decode(&record.payload).map_err(|e| ScoutError::Decode {
        offset: record.offset,
        message: e.to_string(),
    })?;
    debug!(offset = record.offset, event_type = event.event_type(), "Dispatching event");

    match event {
        ScoutEvent::FilterCreated(e) => handler.handle_filter_created(e).await,
        ScoutEvent::ScrapeRequest(e) => handler.handle_scrape_request(e).await,
        ScoutEvent::NewListings(e) => handler.handle_new_listings(e).await,
    }
}
