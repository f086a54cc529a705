use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// One message in the log. Offsets start at 1 and increase by append order.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub offset: i64,
    pub key: String,
    pub payload: String,
    pub ts: DateTime<Utc>,
}

/// Ordered, replayable, at-least-once message log with per-group cursors
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append a message and return its offset
    async fn append(&self, key: &str, payload: &str) -> Result<i64>;

    /// Up to `limit` records with `offset >= from`, in offset order
    async fn read_from(&self, from: i64, limit: usize) -> Result<Vec<LogRecord>>;

    /// Offset the next appended record will get
    async fn end_offset(&self) -> Result<i64>;

    /// Next offset to read for a consumer group, if it ever committed
    async fn committed_offset(&self, group: &str) -> Result<Option<i64>>;

    async fn commit(&self, group: &str, next_offset: i64) -> Result<()>;
}

/// Process-local log
#[derive(Default)]
pub struct MemoryEventLog {
    inner: Mutex<MemoryLogState>,
}

#[derive(Default)]
struct MemoryLogState {
    records: Vec<LogRecord>,
    cursors: std::collections::HashMap<String, i64>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record appended so far
    pub fn records(&self) -> Vec<LogRecord> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).records.clone()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, key: &str, payload: &str) -> Result<i64> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let offset = state.records.len() as i64 + 1;
        state.records.push(LogRecord {
            offset,
            key: key.to_string(),
            payload: payload.to_string(),
            ts: Utc::now(),
        });
        Ok(offset)
    }

    async fn read_from(&self, from: i64, limit: usize) -> Result<Vec<LogRecord>> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let start = usize::try_from(from.max(1) - 1).unwrap_or(0);
        Ok(state.records.iter().skip(start).take(limit).cloned().collect())
    }

    async fn end_offset(&self) -> Result<i64> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.records.len() as i64 + 1)
    }

    async fn committed_offset(&self, group: &str) -> Result<Option<i64>> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.cursors.get(group).copied())
    }

    async fn commit(&self, group: &str, next_offset: i64) -> Result<()> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.cursors.insert(group.to_string(), next_offset);
        Ok(())
    }
}
