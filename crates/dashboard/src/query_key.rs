//! Cache keys derived from the filter, date and pagination stores.
//!
//! Keys compare structurally. Filter selections are canonicalized (sorted on
//! `(category, subcategory or "")`, duplicates dropped) so the order in which
//! the user picked them never produces a different key, and dates are stored
//! as calendar days so equal days always compare equal.
use std::fmt;

use api_types::transaction::{CategoryFilter, TransactionQuery};
use chrono::TimeZone;
use serde::{Deserialize, Serialize};

use crate::{date_range::DateRange, filters::CategorySelection, pagination::Page};

/// Which backend read a key addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryScope {
    Transactions,
    Count,
    Categories,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    scope: QueryScope,
    filters: Vec<CategorySelection>,
    range: DateRange,
    page: Option<Page>,
    /// Minimum classifier confidence in basis points (`0..=10_000`).
    min_confidence_bp: u16,
}

impl QueryKey {
    pub fn scope(&self) -> QueryScope {
        self.scope
    }

    /// Canonically ordered selections.
    pub fn filters(&self) -> &[CategorySelection] {
        &self.filters
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn page(&self) -> Option<Page> {
        self.page
    }

    pub fn min_confidence(&self) -> f64 {
        f64::from(self.min_confidence_bp) / 10_000.0
    }

    /// Request parameters for the list and count endpoints, with the range
    /// resolved to instants in `tz`.
    pub fn to_transaction_query<Tz: TimeZone>(&self, tz: &Tz) -> TransactionQuery {
        let (start_date, end_date) = self.range.to_instants(tz);
        TransactionQuery {
            start_date,
            end_date,
            categories: self.filters.iter().map(CategoryFilter::from).collect(),
            min_confidence: self.min_confidence(),
            limit: self.page.map(|page| page.limit),
            offset: self.page.map(|page| page.offset),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

/// Builds [`QueryKey`]s. Holds the settings that are part of every key but
/// not owned by any store.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryKeyBuilder {
    min_confidence_bp: u16,
}

impl QueryKeyBuilder {
    /// `min_confidence` is clamped to `[0, 1]`.
    pub fn new(min_confidence: f64) -> Self {
        let clamped = if min_confidence.is_finite() {
            min_confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            min_confidence_bp: (clamped * 10_000.0).round() as u16,
        }
    }

    /// Key for one page of transactions.
    pub fn build(&self, filters: &[CategorySelection], range: DateRange, page: Page) -> QueryKey {
        self.key(QueryScope::Transactions, filters, range, Some(page))
    }

    /// Key for the total behind a filter combination; independent of paging.
    pub fn count(&self, filters: &[CategorySelection], range: DateRange) -> QueryKey {
        self.key(QueryScope::Count, filters, range, None)
    }

    /// Key for the category tree, which only depends on the date range.
    pub fn categories(&self, range: DateRange) -> QueryKey {
        QueryKey {
            scope: QueryScope::Categories,
            filters: Vec::new(),
            range,
            page: None,
            min_confidence_bp: 0,
        }
    }

    fn key(
        &self,
        scope: QueryScope,
        filters: &[CategorySelection],
        range: DateRange,
        page: Option<Page>,
    ) -> QueryKey {
        QueryKey {
            scope,
            filters: canonical(filters),
            range,
            page,
            min_confidence_bp: self.min_confidence_bp,
        }
    }
}

fn canonical(filters: &[CategorySelection]) -> Vec<CategorySelection> {
    let mut sorted = filters.to_vec();
    // The trailing flag separates a bare category from an empty subcategory.
    sorted.sort_by(|a, b| {
        (a.sort_key(), a.subcategory.is_some()).cmp(&(b.sort_key(), b.subcategory.is_some()))
    });
    sorted.dedup();
    sorted
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn range() -> DateRange {
        DateRange {
            start: NaiveDate::from_ymd_opt(2024, 4, 25).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        }
    }

    fn first_page() -> Page {
        Page { limit: 100, offset: 0 }
    }

    #[test]
    fn key_ignores_selection_order() {
        let builder = QueryKeyBuilder::default();
        let a = CategorySelection::category("A");
        let b = CategorySelection::new("B", Some("x"));

        let forward = builder.build(&[a.clone(), b.clone()], range(), first_page());
        let backward = builder.build(&[b, a], range(), first_page());
        assert_eq!(forward, backward);
        assert_eq!(forward.to_string(), backward.to_string());
    }

    #[test]
    fn key_distinguishes_bare_category_from_subcategory() {
        let builder = QueryKeyBuilder::default();
        let bare = builder.build(&[CategorySelection::category("Food")], range(), first_page());
        let narrowed = builder.build(
            &[CategorySelection::new("Food", Some("Dining"))],
            range(),
            first_page(),
        );
        let empty_sub = builder.build(
            &[CategorySelection::new("Food", Some(""))],
            range(),
            first_page(),
        );
        assert_ne!(bare, narrowed);
        assert_ne!(bare, empty_sub);
    }

    #[test]
    fn key_changes_with_page_and_scope() {
        let builder = QueryKeyBuilder::default();
        let first = builder.build(&[], range(), first_page());
        let second = builder.build(&[], range(), Page { limit: 100, offset: 100 });
        assert_ne!(first, second);
        assert_ne!(first, builder.count(&[], range()));
        assert_eq!(builder.count(&[], range()).page(), None);
    }

    #[test]
    fn categories_key_only_tracks_range() {
        let loose = QueryKeyBuilder::new(0.0).categories(range());
        let strict = QueryKeyBuilder::new(0.8).categories(range());
        assert_eq!(loose, strict);
    }

    #[test]
    fn transaction_query_carries_all_parameters() {
        let key = QueryKeyBuilder::new(0.5).build(
            &[CategorySelection::new("Food", Some("Dining"))],
            range(),
            Page { limit: 50, offset: 100 },
        );
        let query = key.to_transaction_query(&chrono::Utc);
        assert_eq!(query.limit, Some(50));
        assert_eq!(query.offset, Some(100));
        assert_eq!(query.min_confidence, 0.5);
        assert_eq!(query.categories.len(), 1);
        assert_eq!(query.start_date.to_rfc3339(), "2024-04-25T00:00:00+00:00");
    }

    #[test]
    fn min_confidence_is_clamped() {
        assert_eq!(QueryKeyBuilder::new(3.0).categories(range()).min_confidence(), 0.0);
        let key = QueryKeyBuilder::new(3.0).count(&[], range());
        assert_eq!(key.min_confidence(), 1.0);
        let key = QueryKeyBuilder::new(f64::NAN).count(&[], range());
        assert_eq!(key.min_confidence(), 0.0);
    }
}
