use std::fmt;

use api_types::transaction::CategoryFilter;
use serde::{Deserialize, Serialize};

/// A category filter predicate.
///
/// A bare category (`subcategory: None`) and the same category narrowed to a
/// subcategory are different selections.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategorySelection {
    pub category: String,
    pub subcategory: Option<String>,
}

impl CategorySelection {
    pub fn new(category: impl Into<String>, subcategory: Option<impl Into<String>>) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.map(Into::into),
        }
    }

    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            subcategory: None,
        }
    }

    fn matches(&self, category: &str, subcategory: Option<&str>) -> bool {
        self.category == category && self.subcategory.as_deref() == subcategory
    }

    /// Sort key used for canonical ordering: a missing subcategory sorts as `""`.
    pub(crate) fn sort_key(&self) -> (&str, &str) {
        (self.category.as_str(), self.subcategory.as_deref().unwrap_or(""))
    }
}

impl fmt::Display for CategorySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subcategory {
            Some(sub) => write!(f, "{} / {sub}", self.category),
            None => f.write_str(&self.category),
        }
    }
}

impl From<&CategorySelection> for CategoryFilter {
    fn from(selection: &CategorySelection) -> Self {
        Self {
            category: selection.category.clone(),
            subcategory: selection.subcategory.clone(),
        }
    }
}

/// Selected category filters, unique by `(category, subcategory)`.
///
/// Insertion order is kept so the selections render as pills in the order
/// the user picked them. Matching never depends on that order.
#[derive(Debug, Clone, Default)]
pub struct FilterStore {
    selections: Vec<CategorySelection>,
}

impl FilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selections(&self) -> &[CategorySelection] {
        &self.selections
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    /// Exact-pair membership: a subcategory selection does not make its
    /// parent category selected.
    pub fn is_selected(&self, category: &str, subcategory: Option<&str>) -> bool {
        self.position(category, subcategory).is_some()
    }

    /// Removes the pair if present, appends it otherwise.
    ///
    /// Returns `true` if the pair is selected afterwards.
    pub fn toggle(&mut self, category: &str, subcategory: Option<&str>) -> bool {
        match self.position(category, subcategory) {
            Some(idx) => {
                self.selections.remove(idx);
                false
            }
            None => {
                self.selections
                    .push(CategorySelection::new(category, subcategory));
                true
            }
        }
    }

    /// Returns `true` if something was removed.
    pub fn remove(&mut self, category: &str, subcategory: Option<&str>) -> bool {
        match self.position(category, subcategory) {
            Some(idx) => {
                self.selections.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if the store was not already empty.
    pub fn clear(&mut self) -> bool {
        let had_any = !self.selections.is_empty();
        self.selections.clear();
        had_any
    }

    fn position(&self, category: &str, subcategory: Option<&str>) -> Option<usize> {
        self.selections
            .iter()
            .position(|sel| sel.matches(category, subcategory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_adds_then_removes_exact_pair() {
        let mut store = FilterStore::new();
        assert!(store.toggle("Food", Some("Groceries")));
        assert!(store.is_selected("Food", Some("Groceries")));
        assert!(!store.toggle("Food", Some("Groceries")));
        assert!(store.is_empty());
    }

    #[test]
    fn bare_category_and_subcategory_are_independent() {
        let mut store = FilterStore::new();
        store.toggle("Food", Some("Groceries"));
        assert!(!store.is_selected("Food", None));

        store.toggle("Food", None);
        assert_eq!(store.len(), 2);

        store.toggle("Food", Some("Groceries"));
        assert!(store.is_selected("Food", None));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn insertion_order_is_kept_for_display() {
        let mut store = FilterStore::new();
        store.toggle("Transport", None);
        store.toggle("Food", Some("Dining"));
        store.toggle("Bills", None);
        let labels: Vec<String> = store.selections().iter().map(ToString::to_string).collect();
        assert_eq!(labels, ["Transport", "Food / Dining", "Bills"]);
    }

    #[test]
    fn remove_and_clear_report_changes() {
        let mut store = FilterStore::new();
        store.toggle("Food", None);
        assert!(!store.remove("Food", Some("Dining")));
        assert!(store.remove("Food", None));
        assert!(!store.clear());
        store.toggle("Bills", None);
        assert!(store.clear());
        assert!(store.is_empty());
    }
}
