use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::{ContractStore, StoreError};
use crate::models::FilteredContract;

/// In-memory ledger store, for tests and dry runs.
///
/// Keeps the same insert-if-absent semantics as the PostgreSQL backend, keyed
/// by (contract_number, reference_month).
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<(i64, String), FilteredContract>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held.
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<(i64, String), FilteredContract>>, StoreError> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Backend("ledger mutex poisoned".to_string()))
    }
}

#[async_trait]
impl ContractStore for MemoryStore {
    async fn insert_ignoring_duplicates(
        &self,
        rows: &[FilteredContract],
    ) -> Result<u64, StoreError> {
        let mut held = self.lock()?;

        let mut inserted = 0;
        for row in rows {
            let key = (row.contract_number, row.reference_month.clone());
            if let Entry::Vacant(slot) = held.entry(key) {
                slot.insert(row.clone());
                inserted += 1;
            }
        }

        debug!(inserted, "Memory store insert complete");

        Ok(inserted)
    }

    async fn find_registered(&self, numbers: &[i64], month: &str) -> Result<Vec<i64>, StoreError> {
        let held = self.lock()?;

        let found: BTreeSet<i64> = numbers
            .iter()
            .copied()
            .filter(|&n| held.contains_key(&(n, month.to_string())))
            .collect();

        Ok(found.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(contract_number: i64, month: &str) -> FilteredContract {
        FilteredContract {
            contract_number,
            reference_month: month.to_string(),
            analyzed_at: Utc::now(),
            user: Some("tester".to_string()),
        }
    }

    #[tokio::test]
    async fn test_insert_skips_existing_pairs() {
        let store = MemoryStore::new();

        let first = store
            .insert_ignoring_duplicates(&[row(1, "05-2026"), row(2, "05-2026")])
            .await
            .unwrap();
        assert_eq!(first, 2);

        // 2 collides, 3 is new
        let second = store
            .insert_ignoring_duplicates(&[row(2, "05-2026"), row(3, "05-2026")])
            .await
            .unwrap();
        assert_eq!(second, 1);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_insert_dedups_within_batch() {
        let store = MemoryStore::new();

        let inserted = store
            .insert_ignoring_duplicates(&[row(9, "05-2026"), row(9, "05-2026")])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn test_same_contract_different_months() {
        let store = MemoryStore::new();

        store
            .insert_ignoring_duplicates(&[row(5, "04-2026")])
            .await
            .unwrap();
        let inserted = store
            .insert_ignoring_duplicates(&[row(5, "05-2026")])
            .await
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_find_registered_filters_by_month() {
        let store = MemoryStore::new();
        store
            .insert_ignoring_duplicates(&[row(1, "05-2026"), row(2, "04-2026")])
            .await
            .unwrap();

        let found = store.find_registered(&[1, 2, 3], "05-2026").await.unwrap();
        assert_eq!(found, vec![1]);

        let found = store.find_registered(&[1, 2, 3], "06-2026").await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_find_registered_distinct() {
        let store = MemoryStore::new();
        store
            .insert_ignoring_duplicates(&[row(7, "05-2026")])
            .await
            .unwrap();

        let found = store.find_registered(&[7, 7, 7], "05-2026").await.unwrap();
        assert_eq!(found, vec![7]);
    }
}
