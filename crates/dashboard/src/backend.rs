use std::future::Future;

use api_types::{
    CategoryTree,
    rule::{Rule, RuleResponse},
    transaction::{Transaction, TransactionListResponse, TransactionNew, TransactionQuery},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ApiError;

/// The transaction, category and rule store the dashboard reads and writes.
///
/// Categories are scoped to a date range: the backend only reports categories
/// that occur between `start` and `end`.
pub trait Backend {
    fn fetch_transactions(
        &self,
        query: &TransactionQuery,
    ) -> impl Future<Output = Result<TransactionListResponse, ApiError>> + Send;

    fn transaction_count(
        &self,
        query: &TransactionQuery,
    ) -> impl Future<Output = Result<u64, ApiError>> + Send;

    fn categories(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<CategoryTree, ApiError>> + Send;

    fn set_excluded(
        &self,
        id: Uuid,
        excluded: bool,
    ) -> impl Future<Output = Result<Transaction, ApiError>> + Send;

    fn add_rule(&self, rule: &Rule) -> impl Future<Output = Result<RuleResponse, ApiError>> + Send;

    fn update_rule(
        &self,
        rule: &Rule,
    ) -> impl Future<Output = Result<RuleResponse, ApiError>> + Send;

    fn add_transaction(
        &self,
        transaction: &TransactionNew,
    ) -> impl Future<Output = Result<Transaction, ApiError>> + Send;
}
