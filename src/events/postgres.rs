//! Event log backed by Postgres.
//!
//! `events.seq` comes from a BIGSERIAL, which hands out numbers at INSERT
//! time, not at COMMIT. Appends therefore insert and commit while holding the
//! transaction-scoped advisory lock [`APPEND_LOCK_KEY`], so seq order equals
//! commit order. Reads take the same lock in shared mode, which makes them
//! wait for appends that are still open.
//!
//! Producers outside this crate writing to `events` must follow the same
//! protocol. For a writer that does not, `read_from` stops at the first gap
//! and only steps over it once the record after the gap is older than the
//! gap grace, which covers both a slow transaction and a rolled-back append.
//!
//! Consumer cursors live in `consumer_offsets`.

use crate::error::Result;
use crate::events::log::{EventLog, LogRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, warn};

/// Advisory lock key serializing appends to `events`
pub const APPEND_LOCK_KEY: i64 = 0x6c73_6576_656e_7473;

pub const DEFAULT_GAP_GRACE: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct PgEventLog {
    pool: PgPool,
    gap_grace: Duration,
}

impl PgEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self::with_gap_grace(pool, DEFAULT_GAP_GRACE)
    }

    /// How long a seq gap may stay open before readers step over it
    pub fn with_gap_grace(pool: PgPool, gap_grace: Duration) -> Self {
        Self { pool, gap_grace }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    seq: i64,
    key: String,
    payload: String,
    ts: DateTime<Utc>,
    /// Older than the gap grace, by the database clock
    settled: bool,
}

/// Records from `from` up to the first gap that has not settled yet.
fn contiguous(from: i64, rows: Vec<EventRow>) -> Vec<LogRecord> {
    let mut records = Vec::with_capacity(rows.len());
    let mut expected = from;

    for row in rows {
        if row.seq != expected {
            if !row.settled {
                debug!(expected, next = row.seq, "Gap in event log, waiting for it to close");
                break;
            }
            warn!(from = expected, to = row.seq - 1, "Skipping event log gap that never closed");
        }

        expected = row.seq + 1;
        records.push(LogRecord {
            offset: row.seq,
            key: row.key,
            payload: row.payload,
            ts: row.ts,
        });
    }

    records
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl EventLog for PgEventLog {
    async fn append(&self, key: &str, payload: &str) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO events (key, payload)
            VALUES ($1, $2)
            RETURNING seq
            "#,
        )
        .bind(key)
        .bind(payload)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.0)
    }

    async fn read_from(&self, from: i64, limit: usize) -> Result<Vec<LogRecord>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock_shared($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT seq, key, payload, ts,
                   ts <= now() - $3::bigint * interval '1 millisecond' AS settled
            FROM events
            WHERE seq >= $1
            ORDER BY seq ASC
            LIMIT $2
            "#,
        )
        .bind(from)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(millis(self.gap_grace))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(contiguous(from, rows))
    }

    async fn end_offset(&self) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock_shared($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, (Option<i64>,)>("SELECT MAX(seq) FROM events")
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.0.unwrap_or(0) + 1)
    }

    async fn committed_offset(&self, group: &str) -> Result<Option<i64>> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT next_seq FROM consumer_offsets WHERE consumer_group = $1",
        )
        .bind(group)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.0))
    }

    async fn commit(&self, group: &str, next_offset: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consumer_offsets (consumer_group, next_seq, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (consumer_group)
            DO UPDATE SET next_seq = EXCLUDED.next_seq,
                          updated_at = now()
            "#,
        )
        .bind(group)
        .bind(next_offset)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(seq: i64, settled: bool) -> EventRow {
        EventRow {
            seq,
            key: format!("k{}", seq),
            payload: "{}".to_string(),
            ts: Utc::now(),
            settled,
        }
    }

    fn offsets(records: &[LogRecord]) -> Vec<i64> {
        records.iter().map(|r| r.offset).collect()
    }

    #[test]
    fn contiguous_rows_pass_through() {
        let records = contiguous(3, vec![row(3, false), row(4, false), row(5, false)]);
        assert_eq!(offsets(&records), vec![3, 4, 5]);
    }

    #[test]
    fn fresh_gap_stops_the_batch() {
        // seq 2 is still in flight
        let records = contiguous(1, vec![row(1, false), row(3, false), row(4, false)]);
        assert_eq!(offsets(&records), vec![1]);

        // Nothing before the gap: the batch is empty and the cursor stays put
        assert!(contiguous(2, vec![row(3, false)]).is_empty());
    }

    #[test]
    fn settled_gap_is_skipped() {
        let records = contiguous(1, vec![row(1, true), row(3, true), row(4, false)]);
        assert_eq!(offsets(&records), vec![1, 3, 4]);
    }
}
