use crate::error::{Result, ScoutError};
use crate::scrapers::olx::DEFAULT_BASE_URL;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Timing of the scrape cycles and ad-hoc scrapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Delay before the first cycle after startup
    pub warmup: Duration,
    /// Period between cycles
    pub interval: Duration,
    /// Pause between two filters of one cycle
    pub pacing: Duration,
    /// Delay before the immediate scrape of a newly created filter
    pub new_filter_delay: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(30),
            interval: Duration::from_secs(5 * 60),
            pacing: Duration::from_secs(3),
            new_filter_delay: Duration::from_secs(5),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub olx_base_url: String,
    pub consumer_group: String,
    pub schedule: ScheduleConfig,
    pub event_poll_interval: Duration,
    pub shutdown_grace: Duration,
    /// Hours added to "today/yesterday at HH:MM" in location lines
    pub location_hour_offset: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = ScheduleConfig::default();

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ScoutError::Config("DATABASE_URL is not set".to_string()))?;

        let interval = secs(&lookup, "SCRAPE_INTERVAL_SECS", defaults.interval)?;
        if interval.is_zero() {
            return Err(ScoutError::Config("SCRAPE_INTERVAL_SECS must be positive".to_string()));
        }

        Ok(Self {
            database_url,
            olx_base_url: lookup("OLX_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            consumer_group: lookup("CONSUMER_GROUP").unwrap_or_else(|| "scraper-service".to_string()),
            schedule: ScheduleConfig {
                warmup: secs(&lookup, "SCRAPE_WARMUP_SECS", defaults.warmup)?,
                interval,
                pacing: secs(&lookup, "SCRAPE_PACING_SECS", defaults.pacing)?,
                new_filter_delay: secs(&lookup, "NEW_FILTER_DELAY_SECS", defaults.new_filter_delay)?,
            },
            event_poll_interval: Duration::from_millis(parse(&lookup, "EVENT_POLL_INTERVAL_MS", 1000)?),
            shutdown_grace: secs(&lookup, "SHUTDOWN_GRACE_SECS", Duration::from_secs(10))?,
            location_hour_offset: parse(&lookup, "LOCATION_HOUR_OFFSET", 3)?,
        })
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ScoutError::Config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Result<Duration> {
    parse(lookup, key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_applied() {
        let cfg = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/olx")])).unwrap();

        assert_eq!(cfg.olx_base_url, "https://www.olx.ua");
        assert_eq!(cfg.consumer_group, "scraper-service");
        assert_eq!(cfg.schedule, ScheduleConfig::default());
        assert_eq!(cfg.schedule.interval, Duration::from_secs(300));
        assert_eq!(cfg.event_poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.location_hour_offset, 3);
    }

    #[test]
    fn overrides_parsed() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/olx"),
            ("SCRAPE_INTERVAL_SECS", "60"),
            ("SCRAPE_PACING_SECS", " 1 "),
            ("LOCATION_HOUR_OFFSET", "0"),
        ]))
        .unwrap();

        assert_eq!(cfg.schedule.interval, Duration::from_secs(60));
        assert_eq!(cfg.schedule.pacing, Duration::from_secs(1));
        assert_eq!(cfg.location_hour_offset, 0);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        assert!(AppConfig::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn invalid_number_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/olx"),
            ("SCRAPE_INTERVAL_SECS", "five minutes"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("SCRAPE_INTERVAL_SECS"));
    }

    #[test]
    fn zero_interval_is_an_error() {
        assert!(AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/olx"),
            ("SCRAPE_INTERVAL_SECS", "0"),
        ]))
        .is_err());
    }
}
