use std::collections::HashSet;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::ledger::ContractStore;
use crate::models::{
    analysis_date, extract_contract_number, reference_month, FilteredContract, RegistrationResult,
};

/// Service tracking which contracts were already filtered in a calendar
/// month, so a monthly batch run never processes the same contract twice.
///
/// The store is injected so the service runs unchanged against PostgreSQL in
/// production and [`MemoryStore`](crate::ledger::MemoryStore) in tests.
pub struct FilteredContractsService<S> {
    store: S,
}

impl<S: ContractStore> FilteredContractsService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Register a batch of contracts as filtered for the current month.
    ///
    /// Registration is idempotent: contracts already registered for the month
    /// are counted as `duplicates_ignored` and no duplicate rows are created,
    /// so re-running a batch after a partial failure is always safe. Records
    /// without a usable contract number are skipped with a warning. Failures
    /// are reported through the result, never as an error.
    pub async fn register_batch(&self, contracts: &[Value], user: &str) -> RegistrationResult {
        if contracts.is_empty() {
            return RegistrationResult::rejected(0, "contract batch is empty");
        }

        // One timestamp for the whole batch so every row lands in the same
        // reference month even across a midnight rollover.
        let now = Utc::now();
        let month = reference_month(now);
        let date = analysis_date(now);
        let total = contracts.len();

        info!(total, month = %month, "Registering filtered contracts");

        let mut rows = Vec::with_capacity(total);
        for record in contracts {
            match extract_contract_number(record) {
                Some(number) => rows.push(FilteredContract {
                    contract_number: number,
                    reference_month: month.clone(),
                    analyzed_at: now,
                    user: Some(user.to_string()),
                }),
                None => warn!(%record, "Record without a usable contract number, skipping"),
            }
        }

        if rows.is_empty() {
            return RegistrationResult::rejected(total, "no valid contract numbers in batch");
        }

        let valid = rows.len() as u64;

        match self.store.insert_ignoring_duplicates(&rows).await {
            Ok(new_records) => {
                let duplicates_ignored = valid - new_records;
                info!(new_records, duplicates_ignored, "Registration complete");

                RegistrationResult {
                    success: true,
                    total_contracts: total,
                    new_records,
                    duplicates_ignored,
                    reference_month: Some(month),
                    analysis_date: Some(date),
                    user: Some(user.to_string()),
                    error: None,
                }
            }
            Err(err) => {
                error!(%err, "Failed to register filtered contracts");

                RegistrationResult {
                    success: false,
                    total_contracts: total,
                    new_records: 0,
                    duplicates_ignored: 0,
                    reference_month: Some(month),
                    analysis_date: Some(date),
                    user: Some(user.to_string()),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Contract numbers from `contracts` already registered for `month`
    /// (current month when `None`).
    ///
    /// Fail-open: a storage error is logged and reported as "nothing known to
    /// be registered", since this is a pre-check for filtering, not a safety
    /// gate. Records without a usable contract number are silently skipped.
    pub async fn list_already_registered(
        &self,
        contracts: &[Value],
        month: Option<&str>,
    ) -> Vec<i64> {
        if contracts.is_empty() {
            return Vec::new();
        }

        let month = month
            .map(str::to_string)
            .unwrap_or_else(|| reference_month(Utc::now()));

        let numbers: Vec<i64> = contracts.iter().filter_map(extract_contract_number).collect();
        if numbers.is_empty() {
            return Vec::new();
        }

        match self.store.find_registered(&numbers, &month).await {
            Ok(found) => found,
            Err(err) => {
                error!(%err, month = %month, "Failed to query registered contracts");
                Vec::new()
            }
        }
    }

    /// The subset of `contracts` not yet registered for `month` (current
    /// month when `None`), in input order.
    ///
    /// When nothing is registered the input is returned unchanged; otherwise
    /// records without a usable contract number are dropped along with the
    /// already-registered ones.
    pub async fn select_unprocessed(
        &self,
        contracts: &[Value],
        month: Option<&str>,
    ) -> Vec<Value> {
        let registered = self.list_already_registered(contracts, month).await;
        if registered.is_empty() {
            return contracts.to_vec();
        }

        let registered: HashSet<i64> = registered.into_iter().collect();

        let remaining: Vec<Value> = contracts
            .iter()
            .filter(|record| {
                extract_contract_number(record)
                    .map(|n| !registered.contains(&n))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        info!(
            remaining = remaining.len(),
            total = contracts.len(),
            "Selected unprocessed contracts"
        );

        remaining
    }
}
