use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field names that may carry a contract number in an incoming record, in
/// priority order. The first present, non-falsy field wins per record.
pub const CONTRACT_NUMBER_FIELDS: [&str; 4] =
    ["numero_contrato", "numeroContrato", "number", "id"];

/// One "contract was filtered in month M" fact, as persisted in the ledger.
///
/// The surrogate `id` column is assigned by storage and never travels through
/// application code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredContract {
    pub contract_number: i64,
    /// `MM-YYYY`, shared by every row of a registration batch.
    pub reference_month: String,
    pub analyzed_at: DateTime<Utc>,
    /// Who triggered the registration, for attribution only.
    pub user: Option<String>,
}

/// Structured outcome of a batch registration.
///
/// Failure is a field, not an error type: callers of the batch job read
/// `success` and decide whether to retry (safe, registration is idempotent)
/// or abort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResult {
    pub success: bool,
    pub total_contracts: usize,
    pub new_records: u64,
    pub duplicates_ignored: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegistrationResult {
    /// Failure before any storage access: all counts zero except the total.
    pub fn rejected(total_contracts: usize, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            total_contracts,
            new_records: 0,
            duplicates_ignored: 0,
            reference_month: None,
            analysis_date: None,
            user: None,
            error: Some(reason.into()),
        }
    }
}

/// Format a timestamp as a `MM-YYYY` reference month.
pub fn reference_month(at: DateTime<Utc>) -> String {
    at.format("%m-%Y").to_string()
}

/// Format a timestamp as a `DD-MM-YYYY` analysis date, for reporting only.
pub fn analysis_date(at: DateTime<Utc>) -> String {
    at.format("%d-%m-%Y").to_string()
}

/// Check that a caller-supplied reference month is `MM-YYYY`.
pub fn is_valid_reference_month(month: &str) -> bool {
    let bytes = month.as_bytes();
    if bytes.len() != 7 || bytes[2] != b'-' {
        return false;
    }
    if !bytes.iter().enumerate().all(|(i, b)| i == 2 || b.is_ascii_digit()) {
        return false;
    }
    matches!(month[..2].parse::<u32>(), Ok(m) if (1..=12).contains(&m))
}

/// Extract a contract number from a loosely-typed record.
///
/// Tries each field in [`CONTRACT_NUMBER_FIELDS`] order and returns the first
/// present, non-falsy value coerced to an integer. Null, zero, empty strings
/// and values that do not parse as an integer are treated as absent and the
/// next field is tried. Note that this drops a legitimate contract number 0,
/// a quirk inherited from the upstream ingestion convention.
pub fn extract_contract_number(record: &Value) -> Option<i64> {
    let fields = record.as_object()?;
    for name in CONTRACT_NUMBER_FIELDS {
        let Some(value) = fields.get(name) else {
            continue;
        };
        let number = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match number {
            Some(n) if n != 0 => return Some(n),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_reference_month_zero_padded() {
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(reference_month(at), "03-2025");
    }

    #[test]
    fn test_reference_month_year_boundary() {
        let dec = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(reference_month(dec), "12-2025");

        let jan = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(reference_month(jan), "01-2026");
    }

    #[test]
    fn test_analysis_date_leap_day() {
        let at = Utc.with_ymd_and_hms(2024, 2, 29, 10, 30, 0).unwrap();
        assert_eq!(analysis_date(at), "29-02-2024");
        assert_eq!(reference_month(at), "02-2024");
    }

    #[test]
    fn test_valid_reference_month() {
        assert!(is_valid_reference_month("01-2026"));
        assert!(is_valid_reference_month("12-2025"));

        assert!(!is_valid_reference_month("13-2025"));
        assert!(!is_valid_reference_month("00-2025"));
        assert!(!is_valid_reference_month("1-2025"));
        assert!(!is_valid_reference_month("01/2025"));
        assert!(!is_valid_reference_month("2025-01"));
        assert!(!is_valid_reference_month(""));
    }

    #[test]
    fn test_extract_field_priority() {
        // numero_contrato outranks id
        let record = json!({"numero_contrato": 123, "id": 999});
        assert_eq!(extract_contract_number(&record), Some(123));

        let record = json!({"numeroContrato": 456, "number": 1, "id": 2});
        assert_eq!(extract_contract_number(&record), Some(456));

        let record = json!({"number": 789});
        assert_eq!(extract_contract_number(&record), Some(789));

        let record = json!({"id": 42, "fornecedor": "Empresa A"});
        assert_eq!(extract_contract_number(&record), Some(42));
    }

    #[test]
    fn test_extract_coerces_string_digits() {
        let record = json!({"numero_contrato": "12345"});
        assert_eq!(extract_contract_number(&record), Some(12345));
    }

    #[test]
    fn test_extract_falsy_values_fall_through() {
        // 0 and null on the preferred field do not shadow a later one
        let record = json!({"numero_contrato": 0, "id": 7});
        assert_eq!(extract_contract_number(&record), Some(7));

        let record = json!({"numero_contrato": null, "number": ""});
        assert_eq!(extract_contract_number(&record), None);

        let record = json!({"id": "0"});
        assert_eq!(extract_contract_number(&record), None);
    }

    #[test]
    fn test_extract_no_usable_field() {
        assert_eq!(extract_contract_number(&json!({"fornecedor": "X"})), None);
        assert_eq!(extract_contract_number(&json!({"number": "abc"})), None);
        assert_eq!(extract_contract_number(&json!({})), None);
        assert_eq!(extract_contract_number(&json!("not an object")), None);
    }

    #[test]
    fn test_rejected_result() {
        let result = RegistrationResult::rejected(5, "no valid contracts");
        assert!(!result.success);
        assert_eq!(result.total_contracts, 5);
        assert_eq!(result.new_records, 0);
        assert_eq!(result.duplicates_ignored, 0);
        assert_eq!(result.error.as_deref(), Some("no valid contracts"));
    }
}
