use crate::cache::KvStore;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// [`KvStore`] over the `kv_entries` table.
///
/// Expired rows are invisible to reads and get deleted by a purge that runs
/// after a write at most once per purge interval.
#[derive(Clone)]
pub struct PgKvStore {
    pool: PgPool,
    purge_interval: Duration,
    last_purge: Arc<Mutex<Option<Instant>>>,
}

impl PgKvStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_purge_interval(pool, DEFAULT_PURGE_INTERVAL)
    }

    pub fn with_purge_interval(pool: PgPool, purge_interval: Duration) -> Self {
        Self {
            pool,
            purge_interval,
            last_purge: Arc::new(Mutex::new(None)),
        }
    }

    /// Delete every expired row and return how many went
    pub async fn purge_expired(&self) -> Result<u64> {
        let done = sqlx::query("DELETE FROM kv_entries WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;

        Ok(done.rows_affected())
    }

    /// Claim the next purge slot; false if one ran within the interval
    fn purge_due(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last_purge.lock().unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(at) if now.duration_since(at) < self.purge_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    async fn purge_if_due(&self) {
        if !self.purge_due() {
            return;
        }

        match self.purge_expired().await {
            Ok(removed) => debug!(removed, "Purged expired cache entries"),
            Err(e) => warn!(error = %e, "Failed to purge expired cache entries"),
        }
    }
}

fn millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl KvStore for PgKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT value FROM kv_entries WHERE key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.0))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, $2, now() + $3::bigint * interval '1 millisecond')
            ON CONFLICT (key)
            DO UPDATE SET value = EXCLUDED.value,
                          expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(millis(ttl))
        .execute(&self.pool)
        .await?;

        self.purge_if_due().await;
        Ok(())
    }

    async fn incr_ex(&self, key: &str, ttl: Duration) -> Result<i64> {
        // An expired row restarts at 1 with a fresh window.
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, '1', now() + $2::bigint * interval '1 millisecond')
            ON CONFLICT (key)
            DO UPDATE SET
                value = CASE WHEN kv_entries.expires_at <= now() THEN '1'
                             ELSE (kv_entries.value::bigint + 1)::text END,
                expires_at = CASE WHEN kv_entries.expires_at <= now() THEN EXCLUDED.expires_at
                                  ELSE kv_entries.expires_at END
            RETURNING value::bigint
            "#,
        )
        .bind(key)
        .bind(millis(ttl))
        .fetch_one(&self.pool)
        .await?;

        self.purge_if_due().await;
        Ok(row.0)
    }
}
