use crate::service::ScraperService;
use crate::shutdown::sleep_or_cancel;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Drives the periodic scrape cycles
pub struct Scheduler {
    service: ScraperService,
}

impl Scheduler {
    pub fn new(service: ScraperService) -> Self {
        Self { service }
    }

    /// Wait out the warm-up, run a cycle, then one cycle per interval until
    /// `token` is cancelled. Returns the number of cycles started.
    pub async fn run(&self, token: CancellationToken) -> u64 {
        let schedule = self.service.schedule();
        let mut cycles = 0;

        info!("Waiting {:?} before first scraping...", schedule.warmup);
        if sleep_or_cancel(&token, schedule.warmup).await {
            info!("Stopping periodic scraper due to shutdown signal...");
            return cycles;
        }

        info!("Starting initial scraping...");
        cycles += 1;
        self.service.scrape_all_filters(&token).await;

        let mut ticker = interval_at(Instant::now() + schedule.interval, schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    info!("Stopping periodic scraper due to shutdown signal...");
                    break;
                }
                _ = ticker.tick() => {
                    info!("Starting scheduled scraping session...");
                    cycles += 1;
                    self.service.scrape_all_filters(&token).await;
                }
            }
        }

        cycles
    }
}
