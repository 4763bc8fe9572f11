//! Client-side state for the budget dashboard.
//!
//! The crate owns everything between the user's input and the backend reads:
//! the draft and applied date ranges, category filters, pagination, the cache
//! keys derived from them, stale-while-revalidate fetch slots and the refresh
//! that follows a successful write. It performs no I/O on its own; the
//! [`Backend`] trait is implemented by the HTTP client in the TUI and by fakes
//! in tests.
mod backend;
mod date_range;
mod error;
mod fetch;
mod filters;
mod money;
mod mutation;
mod pagination;
mod query_key;
mod session;

pub use backend::Backend;
pub use date_range::{
    DateRange, DateRangeStore, DraftRange, STATEMENT_DAY, validate, validate_at,
};
pub use error::{ApiError, MutationError, PaginationError, ValidationError};
pub use fetch::{
    CacheEntry, FetchCoordinator, FetchState, FetchStatus, FetchTicket, RetryPolicy,
    fetch_with_retry,
};
pub use filters::{CategorySelection, FilterStore};
pub use money::{AmountError, Money};
pub use mutation::{Mutation, MutationOutput, MutationRefresher, MutationTicket};
pub use pagination::{DEFAULT_PAGE_SIZE, Page, PaginationStore};
pub use query_key::{QueryKey, QueryKeyBuilder, QueryScope};
pub use session::{
    Clock, Dashboard, DashboardBuilder, FetchOutcome, FetchRequest, execute, perform,
};
