use crate::error::Result;
use crate::models::Filter;
use crate::storage::FilterStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Open the shared connection pool
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

#[derive(Debug, sqlx::FromRow)]
struct FilterRow {
    id: i64,
    user_id: i64,
    name: String,
    query: String,
    min_price: i64,
    max_price: i64,
    city: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<FilterRow> for Filter {
    fn from(row: FilterRow) -> Self {
        Filter {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            query: row.query,
            min_price: row.min_price,
            max_price: row.max_price,
            city: row.city.unwrap_or_default(),
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

/// Reads filters from the `user_filters` table
#[derive(Clone)]
pub struct PgFilterStore {
    pool: PgPool,
}

impl PgFilterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FilterStore for PgFilterStore {
    async fn list_active_filters(&self) -> Result<Vec<Filter>> {
        let rows = sqlx::query_as::<_, FilterRow>(
            r#"
            SELECT id, user_id, name, query, min_price, max_price, city, is_active, created_at
            FROM user_filters
            WHERE is_active = TRUE
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Filter::from).collect())
    }
}
