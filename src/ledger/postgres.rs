use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use super::{ContractStore, StoreError};
use crate::models::FilteredContract;

/// PostgreSQL-backed ledger store for production persistence
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given connection string
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;

        info!("Database migrations complete");

        Ok(())
    }
}

#[async_trait]
impl ContractStore for PostgresStore {
    async fn insert_ignoring_duplicates(
        &self,
        rows: &[FilteredContract],
    ) -> Result<u64, StoreError> {
        let mut numbers: Vec<i64> = Vec::with_capacity(rows.len());
        let mut months: Vec<String> = Vec::with_capacity(rows.len());
        let mut analyzed: Vec<DateTime<Utc>> = Vec::with_capacity(rows.len());
        let mut users: Vec<Option<String>> = Vec::with_capacity(rows.len());

        for row in rows {
            numbers.push(row.contract_number);
            months.push(row.reference_month.clone());
            analyzed.push(row.analyzed_at);
            users.push(row.user.clone());
        }

        // Single set-oriented statement: ON CONFLICT DO NOTHING also covers
        // duplicates within the batch itself, so the row set is applied
        // atomically or not at all.
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO filtered_contracts (contract_number, reference_month, analyzed_at, "user")
            SELECT * FROM UNNEST($1::bigint[], $2::varchar[], $3::timestamptz[], $4::varchar[])
            ON CONFLICT (contract_number, reference_month) DO NOTHING
            "#,
        )
        .bind(&numbers)
        .bind(&months)
        .bind(&analyzed)
        .bind(&users)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(inserted = result.rows_affected(), "Bulk insert complete");

        Ok(result.rows_affected())
    }

    async fn find_registered(&self, numbers: &[i64], month: &str) -> Result<Vec<i64>, StoreError> {
        let found = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT contract_number
            FROM filtered_contracts
            WHERE contract_number = ANY($1) AND reference_month = $2
            "#,
        )
        .bind(numbers)
        .bind(month)
        .fetch_all(&self.pool)
        .await?;

        Ok(found)
    }
}
