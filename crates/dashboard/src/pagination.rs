use serde::{Deserialize, Serialize};

use crate::error::PaginationError;

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// The `limit`/`offset` pair a query is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u64,
}

/// Offset pagination over a server-reported total.
///
/// Invariant: `offset == (current_page - 1) * limit`.
#[derive(Debug, Clone)]
pub struct PaginationStore {
    limit: u32,
    offset: u64,
    current_page: u32,
    total: Option<u64>,
}

impl Default for PaginationStore {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
            current_page: 1,
            total: None,
        }
    }
}

impl PaginationStore {
    pub fn new(limit: u32) -> Result<Self, PaginationError> {
        if limit == 0 {
            return Err(PaginationError::InvalidLimit);
        }
        Ok(Self {
            limit,
            offset: 0,
            current_page: 1,
            total: None,
        })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn page(&self) -> Page {
        Page {
            limit: self.limit,
            offset: self.offset,
        }
    }

    /// Total reported by the last count fetch, if any.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Records the total and pulls the current page back to the last page
    /// if the total shrank below it.
    pub fn set_total(&mut self, total: u64) {
        self.total = Some(total);
        let last = self.page_count();
        if self.current_page > last {
            self.current_page = last;
            self.offset = u64::from(last - 1) * u64::from(self.limit);
        }
    }

    pub fn clear_total(&mut self) {
        self.total = None;
    }

    /// Number of pages for the known total; at least 1.
    pub fn page_count(&self) -> u32 {
        let total = self.total.unwrap_or(0);
        let pages = total.div_ceil(u64::from(self.limit)).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    pub fn has_prev(&self) -> bool {
        self.current_page > 1
    }

    /// Without a known total, assume there may be more.
    pub fn has_next(&self) -> bool {
        match self.total {
            Some(_) => self.current_page < self.page_count(),
            None => true,
        }
    }

    /// Changes the page size and goes back to the first page.
    pub fn set_limit(&mut self, limit: u32) -> Result<(), PaginationError> {
        if limit == 0 {
            return Err(PaginationError::InvalidLimit);
        }
        self.limit = limit;
        self.reset_to_first_page();
        Ok(())
    }

    /// Moves to a 1-based page. Pages below 1 are rejected without any change.
    pub fn go_to_page(&mut self, page: i64) -> Result<(), PaginationError> {
        let Ok(page) = u32::try_from(page) else {
            return Err(PaginationError::InvalidPage(page));
        };
        if page < 1 {
            return Err(PaginationError::InvalidPage(i64::from(page)));
        }
        self.current_page = page;
        self.offset = u64::from(page - 1) * u64::from(self.limit);
        Ok(())
    }

    pub fn reset_to_first_page(&mut self) {
        self.current_page = 1;
        self.offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_to_page_keeps_offset_in_step() {
        let mut store = PaginationStore::new(100).unwrap();
        store.go_to_page(4).unwrap();
        assert_eq!(store.current_page(), 4);
        assert_eq!(store.offset(), 300);
    }

    #[test]
    fn non_positive_pages_are_rejected() {
        let mut store = PaginationStore::new(100).unwrap();
        store.go_to_page(2).unwrap();

        assert_eq!(store.go_to_page(0), Err(PaginationError::InvalidPage(0)));
        assert_eq!(store.go_to_page(-1), Err(PaginationError::InvalidPage(-1)));
        assert_eq!(store.current_page(), 2);
        assert_eq!(store.offset(), 100);
    }

    #[test]
    fn set_limit_resets_and_rejects_zero() {
        let mut store = PaginationStore::new(100).unwrap();
        store.go_to_page(3).unwrap();
        store.set_limit(25).unwrap();
        assert_eq!(store.page(), Page { limit: 25, offset: 0 });
        assert_eq!(store.current_page(), 1);
        assert_eq!(store.set_limit(0), Err(PaginationError::InvalidLimit));
        assert_eq!(store.limit(), 25);
        assert!(PaginationStore::new(0).is_err());
    }

    #[test]
    fn page_count_follows_total() {
        let mut store = PaginationStore::new(100).unwrap();
        assert_eq!(store.page_count(), 1);
        assert!(store.has_next());

        store.set_total(0);
        assert_eq!(store.page_count(), 1);
        assert!(!store.has_next());

        store.set_total(250);
        assert_eq!(store.page_count(), 3);
        store.go_to_page(3).unwrap();
        assert!(!store.has_next());
        assert!(store.has_prev());
    }

    #[test]
    fn shrinking_total_pulls_back_to_last_page() {
        let mut store = PaginationStore::new(100).unwrap();
        store.set_total(450);
        store.go_to_page(5).unwrap();

        store.set_total(150);
        assert_eq!(store.current_page(), 2);
        assert_eq!(store.offset(), 100);

        store.set_total(0);
        assert_eq!(store.page(), Page { limit: 100, offset: 0 });

        store.clear_total();
        assert_eq!(store.total(), None);
        assert!(store.has_next());
    }
}
