use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Categories known to the backend for a date range: `category -> [subcategory]`.
pub type CategoryTree = BTreeMap<String, Vec<String>>;

/// Timestamps as the backend writes them.
///
/// The backend emits RFC3339 when the stored value carries an offset and a
/// bare `YYYY-MM-DDTHH:MM:SS[.ffffff]` otherwise. Bare values are UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|err| format!("invalid timestamp {raw:?}: {err}"))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Body of every non-2xx response (`{"detail": "..."}`).
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

pub mod transaction {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Transaction {
        pub id: Uuid,
        #[serde(with = "crate::timestamp")]
        pub date: DateTime<Utc>,
        /// Major units, as sent by the backend (two decimals).
        pub amount: f64,
        pub merchant: String,
        pub primary_category: String,
        pub subcategory: String,
        /// Classifier confidence in `[0, 1]`.
        pub confidence: f64,
        pub description: String,
        #[serde(default)]
        pub card_type: Option<String>,
        /// Excluded transactions are listed but left out of budget totals.
        #[serde(default)]
        pub excluded: bool,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct CategorySummary {
        pub total: f64,
        pub count: u64,
        pub average: f64,
        pub merchants: Vec<String>,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct CardSummary {
        pub total: f64,
        pub count: u64,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct TransactionSummary {
        pub total_spending: f64,
        pub transaction_count: u64,
        pub average_transaction: f64,
        #[serde(default)]
        pub by_primary_category: BTreeMap<String, CategorySummary>,
        /// Keyed by `"{category} - {subcategory}"`.
        #[serde(default)]
        pub by_subcategory: BTreeMap<String, CategorySummary>,
        #[serde(default)]
        pub by_card_type: BTreeMap<String, CardSummary>,
        #[serde(default)]
        pub merchants: Vec<String>,
    }

    /// One page of `GET /transactions`.
    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct TransactionListResponse {
        pub transactions: Vec<Transaction>,
        #[serde(default)]
        pub transaction_summary: TransactionSummary,
        /// Categories present in the requested range.
        #[serde(default)]
        pub categories: CategoryTree,
    }

    /// A `(category, subcategory)` filter predicate, sent as one JSON-encoded
    /// `categories` query parameter.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CategoryFilter {
        pub category: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub subcategory: Option<String>,
    }

    /// Query shared by the list and count endpoints.
    ///
    /// `start_date` is inclusive; `end_date` is the last instant of the range.
    #[derive(Clone, Debug, PartialEq)]
    pub struct TransactionQuery {
        pub start_date: DateTime<Utc>,
        pub end_date: DateTime<Utc>,
        pub categories: Vec<CategoryFilter>,
        pub min_confidence: f64,
        /// Absent for count queries.
        pub limit: Option<u32>,
        pub offset: Option<u64>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionCount {
        pub count: u64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ExcludeToggle {
        pub excluded: bool,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct TransactionNew {
        #[serde(with = "crate::timestamp")]
        pub date: DateTime<Utc>,
        pub merchant: String,
        pub amount: f64,
        pub primary_category: String,
        pub subcategory: String,
        pub card_type: String,
        pub description: String,
    }
}

pub mod rule {
    use super::*;

    /// Merchant classification rule: every transaction from `merchant` is
    /// categorized as `category / subcategory`.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Rule {
        pub merchant: String,
        pub category: String,
        pub subcategory: String,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RuleResponse {
        pub merchant: String,
        pub category: String,
        pub subcategory: String,
        pub success: bool,
    }
}

#[cfg(test)]
mod tests {
    use super::transaction::{CategoryFilter, Transaction, TransactionListResponse};

    #[test]
    fn timestamp_accepts_naive_and_offset_values() {
        let naive = super::timestamp::parse("2024-05-01T10:30:00").unwrap();
        let fractional = super::timestamp::parse("2024-05-01T10:30:00.250000").unwrap();
        let offset = super::timestamp::parse("2024-05-01T05:30:00-05:00").unwrap();
        assert_eq!(naive, offset);
        assert_eq!(fractional.timestamp_millis() - naive.timestamp_millis(), 250);
        assert!(super::timestamp::parse("yesterday").is_err());
    }

    #[test]
    fn list_response_tolerates_missing_optional_sections() {
        let body = r#"{
            "transactions": [{
                "id": "6f1c3a52-8f5e-4c53-9d0e-3f1a2b6c7d8e",
                "date": "2024-05-03T12:00:00",
                "amount": 1250.5,
                "merchant": "HI-LO",
                "primary_category": "Food",
                "subcategory": "Groceries",
                "confidence": 0.92,
                "description": "Supermarket"
            }]
        }"#;
        let parsed: TransactionListResponse = serde_json::from_str(body).unwrap();
        let tx: &Transaction = &parsed.transactions[0];
        assert!(!tx.excluded);
        assert_eq!(tx.card_type, None);
        assert!(parsed.categories.is_empty());
        assert_eq!(parsed.transaction_summary.transaction_count, 0);
    }

    #[test]
    fn bare_category_filter_omits_subcategory() {
        let bare = CategoryFilter {
            category: "Food".to_string(),
            subcategory: None,
        };
        assert_eq!(
            serde_json::to_string(&bare).unwrap(),
            r#"{"category":"Food"}"#
        );
    }
}
