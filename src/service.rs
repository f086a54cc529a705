//! The scraper service: one scrape per filter, full cycles over the
//! registry, reactions to channel events, and cached on-demand lookups.

use crate::cache::{signature, ResultCache};
use crate::config::ScheduleConfig;
use crate::error::Result;
use crate::events::{EventHandler, EventProducer, FilterCreated, NewListings, ScrapeRequest};
use crate::models::{ExtractionResult, Filter};
use crate::registry::FilterRegistry;
use crate::scrapers::{ListingScraper, SearchFilters};
use crate::shutdown::sleep_or_cancel;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Listings logged per scrape at info level
const SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Scraped { found: usize },
    /// Another scrape of the same filter was already running
    Skipped,
}

/// Result of one pass over the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub success: usize,
    pub errors: usize,
    pub skipped: usize,
    pub total: usize,
    pub duration: Duration,
}

/// Answer to an on-demand lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Cached(ExtractionResult),
    Fresh(ExtractionResult),
    /// Same query was fetched within the cool-down window and nothing is cached
    RateLimited,
}

#[derive(Clone)]
pub struct ScraperService {
    registry: Arc<FilterRegistry>,
    scraper: Arc<dyn ListingScraper>,
    producer: EventProducer,
    cache: ResultCache,
    schedule: ScheduleConfig,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl ScraperService {
    pub fn new(
        registry: Arc<FilterRegistry>,
        scraper: Arc<dyn ListingScraper>,
        producer: EventProducer,
        cache: ResultCache,
        schedule: ScheduleConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            scraper,
            producer,
            cache,
            schedule,
            tasks: TaskTracker::new(),
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    pub fn schedule(&self) -> ScheduleConfig {
        self.schedule
    }

    /// Ad-hoc scrapes spawned by event handlers
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Scrape one filter, cache the result and announce any listings.
    ///
    /// Skips without error if the same filter is already being scraped.
    pub async fn scrape_one(&self, filter: &Filter) -> Result<ScrapeOutcome> {
        let Some(_in_flight) = self.registry.try_begin(filter.id) else {
            info!(filter_id = filter.id, "Filter is already being scraped, skipping");
            return Ok(ScrapeOutcome::Skipped);
        };

        info!(filter_id = filter.id, query = %filter.query, "Scraping filter");

        let listings = self.scraper.search(&SearchFilters::from(filter)).await?;
        let found = listings.len();

        info!(
            filter_id = filter.id,
            found,
            source = self.scraper.source_name(),
            "Found listings for filter"
        );
        for (i, listing) in listings.iter().take(SAMPLE_SIZE).enumerate() {
            info!("    {}. {} - {} ({})", i + 1, listing.title, listing.price, listing.location);
        }

        let sig = signature(&filter.query, filter.min_price, filter.max_price, &filter.city);
        self.cache.put(&sig, &ExtractionResult::new(listings.clone())).await;

        if found > 0 {
            self.producer.publish_new_listings(filter, listings).await?;
        }

        Ok(ScrapeOutcome::Scraped { found })
    }

    /// One full cycle over a registry snapshot, paced and failure-isolated.
    ///
    /// Cancellation is checked before each filter and during the pause, so an
    /// extraction already started always runs to completion.
    pub async fn scrape_all_filters(&self, token: &CancellationToken) -> CycleSummary {
        let started = Instant::now();
        let filters = self.registry.snapshot().await;

        if filters.is_empty() {
            info!("No active filters to scrape");
            return CycleSummary::default();
        }

        let total = filters.len();
        let mut summary = CycleSummary {
            total,
            ..CycleSummary::default()
        };

        info!(total, "Starting scraping session");

        for (i, filter) in filters.iter().enumerate() {
            if token.is_cancelled() {
                info!(processed = i, total, "Scraping session interrupted by shutdown");
                break;
            }

            match self.scrape_one(filter).await {
                Ok(ScrapeOutcome::Scraped { .. }) => {
                    info!("✅ [{}/{}] Successfully scraped filter {}", i + 1, total, filter.id);
                    summary.success += 1;
                }
                Ok(ScrapeOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!(
                        filter_id = filter.id,
                        query = %filter.query,
                        error = %e,
                        "[{}/{}] Error scraping filter",
                        i + 1,
                        total
                    );
                    summary.errors += 1;
                }
            }

            if i + 1 < total && sleep_or_cancel(token, self.schedule.pacing).await {
                info!(processed = i + 1, total, "Scraping session interrupted by shutdown");
                break;
            }
        }

        summary.duration = started.elapsed();
        info!(
            success = summary.success,
            errors = summary.errors,
            skipped = summary.skipped,
            total = summary.total,
            duration_secs = summary.duration.as_secs(),
            "Scraping session completed"
        );

        summary
    }

    /// Cached listings for a filter, or a fresh extraction if the query is
    /// admitted by the rate limiter.
    pub async fn lookup(&self, filter: &Filter) -> Result<Lookup> {
        let sig = signature(&filter.query, filter.min_price, filter.max_price, &filter.city);

        if let Some(cached) = self.cache.get(&sig).await {
            debug!(filter_id = filter.id, "Serving listings from cache");
            return Ok(Lookup::Cached(cached));
        }

        if !self.cache.admit(&filter.query).await {
            info!(filter_id = filter.id, query = %filter.query, "Query rate limited");
            return Ok(Lookup::RateLimited);
        }

        let listings = self.scraper.search(&SearchFilters::from(filter)).await?;
        let result = ExtractionResult::new(listings);
        self.cache.put(&sig, &result).await;

        Ok(Lookup::Fresh(result))
    }
}

#[async_trait]
impl EventHandler for ScraperService {
    async fn handle_filter_created(&self, event: FilterCreated) -> Result<()> {
        info!(
            filter_id = event.filter_id,
            user_id = event.user_id,
            query = %event.query,
            min_price = event.min_price,
            max_price = event.max_price,
            city = %event.city,
            "🆕 Received filter_created event"
        );

        let filter = Filter::from(event);
        if !filter.has_valid_bounds() {
            warn!(
                filter_id = filter.id,
                min_price = filter.min_price,
                max_price = filter.max_price,
                "Filter has contradictory price bounds and will match nothing"
            );
        }
        let total = self.registry.upsert(filter.clone()).await;
        info!(filter_id = filter.id, total, "Added filter to active monitoring");

        let service = self.clone();
        self.tasks.spawn(async move {
            if sleep_or_cancel(&service.shutdown, service.schedule.new_filter_delay).await {
                return;
            }

            info!(filter_id = filter.id, "Starting immediate scraping for new filter");
            match service.scrape_one(&filter).await {
                Ok(_) => info!(filter_id = filter.id, "Immediate scraping completed"),
                Err(e) => error!(filter_id = filter.id, error = %e, "Error in immediate scraping"),
            }
        });

        Ok(())
    }

    async fn handle_scrape_request(&self, event: ScrapeRequest) -> Result<()> {
        info!(requested_at = %event.timestamp, "Received scrape_request event, triggering manual scraping");

        let service = self.clone();
        self.tasks.spawn(async move {
            info!("Starting manual scraping session...");
            service.scrape_all_filters(&service.shutdown).await;
            info!("Manual scraping session completed");
        });

        Ok(())
    }

    async fn handle_new_listings(&self, event: NewListings) -> Result<()> {
        debug!(filter_id = event.filter_id, "Ignoring new_listings event (meant for the notifier)");
        Ok(())
    }
}
