pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::FilteredContract;

/// Error raised by a ledger storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    Backend(String),
}

/// Storage backend for the filtered-contracts ledger.
///
/// The backend owns the uniqueness guarantee: no two rows may share the same
/// (contract_number, reference_month) pair. Conflict resolution happens in
/// the insert itself, never as a check followed by a write, so concurrent
/// registrations for the same month cannot race into duplicates.
#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Bulk-insert rows, skipping any that collide with an existing
    /// (contract_number, reference_month) pair, in one transaction.
    /// Returns the number of rows actually inserted.
    async fn insert_ignoring_duplicates(
        &self,
        rows: &[FilteredContract],
    ) -> Result<u64, StoreError>;

    /// The distinct contract numbers from `numbers` already registered for
    /// `month`.
    async fn find_registered(&self, numbers: &[i64], month: &str) -> Result<Vec<i64>, StoreError>;
}
