use anyhow::Context;
use listing_scout::cache::{PgKvStore, ResultCache};
use listing_scout::config::AppConfig;
use listing_scout::events::{EventConsumer, EventLog, EventProducer, PgEventLog};
use listing_scout::registry::FilterRegistry;
use listing_scout::scheduler::Scheduler;
use listing_scout::scrapers::OlxScraper;
use listing_scout::service::ScraperService;
use listing_scout::shutdown;
use listing_scout::storage::{postgres, PgFilterStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🔎 Listing Scout - OLX Scraper Service");
    info!("======================================");

    let cfg = AppConfig::from_env().context("Failed to load configuration")?;

    let pool = postgres::connect(&cfg.database_url)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to apply database migrations")?;
    info!("Database connected");

    let event_log: Arc<dyn EventLog> = Arc::new(PgEventLog::new(pool.clone()));
    event_log
        .end_offset()
        .await
        .context("Failed to reach the event log")?;
    let producer = EventProducer::new(event_log.clone());
    info!("Event log ready");

    // `listing-scout scrape-now` asks the running service for a manual cycle
    if std::env::args().nth(1).as_deref() == Some("scrape-now") {
        producer
            .publish_scrape_request()
            .await
            .context("Failed to publish scrape request")?;
        return Ok(());
    }

    let registry = Arc::new(FilterRegistry::new());
    info!("Loading existing filters...");
    if let Err(e) = registry.load_from(&PgFilterStore::new(pool.clone())).await {
        warn!(error = %e, "Failed to load existing filters, continuing with an empty registry");
    }

    let scraper = OlxScraper::with_options(&cfg.olx_base_url, cfg.location_hour_offset)
        .context("Failed to create OLX scraper")?;
    let cache = ResultCache::new(Arc::new(PgKvStore::new(pool.clone())));

    let token = CancellationToken::new();
    let service = ScraperService::new(
        registry,
        Arc::new(scraper),
        producer,
        cache,
        cfg.schedule,
        token.clone(),
    );

    let consumer_task = {
        let consumer = EventConsumer::new(event_log, cfg.consumer_group.clone(), cfg.event_poll_interval);
        let service = service.clone();
        let token = token.clone();
        tokio::spawn(async move {
            info!("Starting event consumer...");
            if let Err(e) = consumer.run(&service, token).await {
                error!(error = %e, "Consumer error");
            }
            info!("Event consumer stopped");
        })
    };

    let scheduler_task = {
        let scheduler = Scheduler::new(service.clone());
        let token = token.clone();
        tokio::spawn(async move {
            info!("Starting periodic scraper...");
            let cycles = scheduler.run(token).await;
            info!(cycles, "Periodic scraper stopped");
        })
    };

    info!("✅ Scraper Service is running!");
    info!("📡 Listening for events (group '{}')", cfg.consumer_group);
    info!("⏰ Periodic scraping every {:?}", cfg.schedule.interval);
    info!("Press Ctrl+C to stop...");

    wait_for_shutdown_signal().await;
    info!("Shutdown signal received, stopping Scraper Service");
    token.cancel();

    let _ = tokio::join!(consumer_task, scheduler_task);
    shutdown::drain(service.tasks(), cfg.shutdown_grace).await;

    pool.close().await;
    info!("Scraper Service stopped gracefully");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
    }
}
