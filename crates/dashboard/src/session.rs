//! The dashboard session: stores, cache slots and the rules tying them
//! together.
//!
//! Every store write goes through [`Dashboard`], which applies the reset
//! rules: a new applied date range clears the category filters (categories
//! are date scoped) and any filter or range change returns to page 1.
//! [`Dashboard::sync`] turns the current store state into keys and reports
//! the fetches that must run; results come back through
//! [`Dashboard::complete`].
use std::{fmt, sync::Arc, time::Duration};

use api_types::{CategoryTree, transaction::TransactionListResponse};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::{
    backend::Backend,
    date_range::{DateRange, DateRangeStore, DraftRange, validate_at},
    error::{ApiError, MutationError, PaginationError, ValidationError},
    fetch::{FetchCoordinator, FetchState, FetchTicket, RetryPolicy, fetch_with_retry},
    filters::FilterStore,
    mutation::{Mutation, MutationOutput, MutationRefresher, MutationTicket},
    pagination::{DEFAULT_PAGE_SIZE, PaginationStore},
    query_key::{QueryKey, QueryKeyBuilder, QueryScope},
};

/// Local wall clock of the session.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// A fetch the caller must run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    Transactions(FetchTicket<QueryKey>),
    Count(FetchTicket<QueryKey>),
    Categories(FetchTicket<QueryKey>),
}

impl FetchRequest {
    pub fn key(&self) -> &QueryKey {
        match self {
            Self::Transactions(ticket) | Self::Count(ticket) | Self::Categories(ticket) => {
                ticket.key()
            }
        }
    }
}

/// A finished fetch, handed back to [`Dashboard::complete`].
#[derive(Debug)]
pub enum FetchOutcome {
    Transactions(FetchTicket<QueryKey>, Result<TransactionListResponse, ApiError>),
    Count(FetchTicket<QueryKey>, Result<u64, ApiError>),
    Categories(FetchTicket<QueryKey>, Result<CategoryTree, ApiError>),
}

pub struct Dashboard {
    dates: DateRangeStore,
    filters: FilterStore,
    pagination: PaginationStore,
    keys: QueryKeyBuilder,
    transactions: FetchCoordinator<QueryKey, TransactionListResponse>,
    count: FetchCoordinator<QueryKey, u64>,
    categories: FetchCoordinator<QueryKey, CategoryTree>,
    mutations: MutationRefresher,
    clock: Clock,
}

impl fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dashboard")
            .field("dates", &self.dates)
            .field("filters", &self.filters)
            .field("pagination", &self.pagination)
            .field("transactions", &self.transactions)
            .field("count", &self.count)
            .field("categories", &self.categories)
            .finish_non_exhaustive()
    }
}

impl Dashboard {
    /// Return a builder for `Dashboard`.
    pub fn builder() -> DashboardBuilder {
        DashboardBuilder::default()
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    pub fn dates(&self) -> &DateRangeStore {
        &self.dates
    }

    pub fn filters(&self) -> &FilterStore {
        &self.filters
    }

    pub fn pagination(&self) -> &PaginationStore {
        &self.pagination
    }

    /// The applied range, if it is still usable for a query.
    pub fn query_range(&self) -> Option<DateRange> {
        let applied = self.dates.applied();
        let start = applied.start.and_time(chrono::NaiveTime::MIN);
        let end = applied.end.and_time(chrono::NaiveTime::MIN);
        validate_at(Some(start), Some(end), self.now()).ok()?;
        Some(applied)
    }

    pub fn set_draft(&mut self, range: DraftRange) {
        self.dates.set_draft(range);
    }

    /// Commits the draft range. Returns whether the applied range changed.
    pub fn apply_draft(&mut self) -> Result<bool, ValidationError> {
        let now = self.now();
        let changed = self.dates.commit_draft(now)?;
        if changed {
            self.filters.clear();
            self.restart_paging();
        }
        Ok(changed)
    }

    /// Returns `true` if the pair is selected afterwards.
    pub fn toggle_category(&mut self, category: &str, subcategory: Option<&str>) -> bool {
        let selected = self.filters.toggle(category, subcategory);
        self.restart_paging();
        selected
    }

    pub fn remove_category(&mut self, category: &str, subcategory: Option<&str>) -> bool {
        let removed = self.filters.remove(category, subcategory);
        if removed {
            self.restart_paging();
        }
        removed
    }

    pub fn clear_categories(&mut self) -> bool {
        let cleared = self.filters.clear();
        if cleared {
            self.restart_paging();
        }
        cleared
    }

    pub fn go_to_page(&mut self, page: i64) -> Result<(), PaginationError> {
        self.pagination.go_to_page(page)
    }

    /// Returns `false` when already on the last known page.
    pub fn next_page(&mut self) -> bool {
        if !self.pagination.has_next() {
            return false;
        }
        let next = i64::from(self.pagination.current_page()) + 1;
        self.pagination.go_to_page(next).is_ok()
    }

    pub fn prev_page(&mut self) -> bool {
        if !self.pagination.has_prev() {
            return false;
        }
        let prev = i64::from(self.pagination.current_page()) - 1;
        self.pagination.go_to_page(prev).is_ok()
    }

    pub fn set_page_size(&mut self, limit: u32) -> Result<(), PaginationError> {
        self.pagination.set_limit(limit)
    }

    /// Key of the transaction page the stores currently describe, or `None`
    /// while the applied range is unusable.
    pub fn transactions_key(&self) -> Option<QueryKey> {
        let range = self.query_range()?;
        Some(
            self.keys
                .build(self.filters.selections(), range, self.pagination.page()),
        )
    }

    /// Observes every slot with the keys derived from the stores.
    pub fn sync(&mut self) -> Vec<FetchRequest> {
        let Some(range) = self.query_range() else {
            tracing::debug!("applied range unusable, not fetching");
            return Vec::new();
        };
        let now = self.stamp();
        let selections = self.filters.selections();
        let page_key = self.keys.build(selections, range, self.pagination.page());
        let count_key = self.keys.count(selections, range);
        let categories_key = self.keys.categories(range);

        let mut requests = Vec::new();
        if let Some(ticket) = self.transactions.observe_at(page_key, now) {
            requests.push(FetchRequest::Transactions(ticket));
        }
        if let Some(ticket) = self.count.observe_at(count_key, now) {
            requests.push(FetchRequest::Count(ticket));
        }
        if let Some(ticket) = self.categories.observe_at(categories_key, now) {
            requests.push(FetchRequest::Categories(ticket));
        }
        self.absorb_count();
        requests
    }

    /// Routes a finished fetch to its slot. Returns `false` if it was stale.
    pub fn complete(&mut self, outcome: FetchOutcome) -> bool {
        let now = self.stamp();
        match outcome {
            FetchOutcome::Transactions(ticket, result) => {
                self.transactions.complete_at(ticket, result, now)
            }
            FetchOutcome::Count(ticket, result) => {
                let applied = self.count.complete_at(ticket, result, now);
                if applied {
                    self.absorb_count();
                }
                applied
            }
            FetchOutcome::Categories(ticket, result) => {
                self.categories.complete_at(ticket, result, now)
            }
        }
    }

    /// Manual refresh of every slot, e.g. after an error.
    pub fn refresh(&mut self) -> Vec<FetchRequest> {
        let mut requests = Vec::new();
        if let Some(ticket) = self.transactions.refetch() {
            requests.push(FetchRequest::Transactions(ticket));
        }
        if let Some(ticket) = self.count.refetch() {
            requests.push(FetchRequest::Count(ticket));
        }
        if let Some(ticket) = self.categories.refetch() {
            requests.push(FetchRequest::Categories(ticket));
        }
        requests
    }

    pub fn transactions(&self) -> FetchState<'_, QueryKey, TransactionListResponse> {
        self.transactions.state()
    }

    pub fn count(&self) -> FetchState<'_, QueryKey, u64> {
        self.count.state()
    }

    pub fn categories(&self) -> FetchState<'_, QueryKey, CategoryTree> {
        self.categories.state()
    }

    pub fn begin_mutation(&mut self, mutation: Mutation) -> Result<MutationTicket, MutationError> {
        self.mutations.begin(mutation)
    }

    /// Settles a mutation. On success the affected slots are invalidated and
    /// their fetches returned; on failure no slot or store is touched.
    pub fn finish_mutation(
        &mut self,
        ticket: MutationTicket,
        result: Result<MutationOutput, ApiError>,
    ) -> Result<(MutationOutput, Vec<FetchRequest>), MutationError> {
        let (output, scopes) = self.mutations.settle(ticket, result)?;
        let mut requests = Vec::new();
        for scope in scopes {
            let request = match scope {
                QueryScope::Transactions => self
                    .transactions
                    .invalidate()
                    .map(FetchRequest::Transactions),
                QueryScope::Count => self.count.invalidate().map(FetchRequest::Count),
                QueryScope::Categories => {
                    self.categories.invalidate().map(FetchRequest::Categories)
                }
            };
            requests.extend(request);
        }
        Ok((output, requests))
    }

    pub fn is_toggle_pending(&self, id: uuid::Uuid) -> bool {
        self.mutations.is_pending(id)
    }

    /// Issues `mutation` against `backend` and settles it in one step.
    pub async fn mutate<B: Backend>(
        &mut self,
        backend: &B,
        mutation: Mutation,
    ) -> Result<(MutationOutput, Vec<FetchRequest>), MutationError> {
        let ticket = self.begin_mutation(mutation)?;
        let result = perform(backend, ticket.mutation()).await;
        self.finish_mutation(ticket, result)
    }

    /// Cache ages are measured on the session clock.
    fn stamp(&self) -> DateTime<Utc> {
        self.now().and_utc()
    }

    /// Back to page 1 with an unknown total until the new count lands.
    fn restart_paging(&mut self) {
        self.pagination.reset_to_first_page();
        self.pagination.clear_total();
    }

    /// A count retained from another key says nothing about this one.
    fn absorb_count(&mut self) {
        let state = self.count.state();
        if state.is_previous_data {
            self.pagination.clear_total();
            return;
        }
        if let Some(total) = state.data.copied() {
            self.pagination.set_total(total);
        }
    }
}

/// Runs one fetch request against `backend`, with dates resolved in `tz`.
pub async fn execute<B, Tz>(
    backend: &B,
    tz: &Tz,
    policy: RetryPolicy,
    request: FetchRequest,
) -> FetchOutcome
where
    B: Backend,
    Tz: TimeZone,
{
    match request {
        FetchRequest::Transactions(ticket) => {
            let query = ticket.key().to_transaction_query(tz);
            let result = fetch_with_retry(policy, || backend.fetch_transactions(&query)).await;
            FetchOutcome::Transactions(ticket, result)
        }
        FetchRequest::Count(ticket) => {
            let query = ticket.key().to_transaction_query(tz);
            let result = fetch_with_retry(policy, || backend.transaction_count(&query)).await;
            FetchOutcome::Count(ticket, result)
        }
        FetchRequest::Categories(ticket) => {
            let (start, end) = ticket.key().range().to_instants(tz);
            let result = fetch_with_retry(policy, || backend.categories(start, end)).await;
            FetchOutcome::Categories(ticket, result)
        }
    }
}

/// Issues a single write. Writes are never retried automatically.
pub async fn perform<B: Backend>(
    backend: &B,
    mutation: &Mutation,
) -> Result<MutationOutput, ApiError> {
    match mutation {
        Mutation::SetExcluded { id, excluded } => backend
            .set_excluded(*id, *excluded)
            .await
            .map(MutationOutput::Transaction),
        Mutation::AddTransaction(transaction) => backend
            .add_transaction(transaction)
            .await
            .map(MutationOutput::Transaction),
        Mutation::AddRule(rule) => backend.add_rule(rule).await.map(MutationOutput::Rule),
        Mutation::UpdateRule(rule) => backend.update_rule(rule).await.map(MutationOutput::Rule),
    }
}

pub struct DashboardBuilder {
    page_size: u32,
    min_confidence: f64,
    stale_after: Option<Duration>,
    clock: Option<Clock>,
}

impl Default for DashboardBuilder {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            min_confidence: 0.0,
            stale_after: Some(Duration::from_secs(30)),
            clock: None,
        }
    }
}

impl DashboardBuilder {
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// `None` keeps fetched data until a manual refresh or a write.
    pub fn stale_after(mut self, window: Option<Duration>) -> Self {
        self.stale_after = window;
        self
    }

    /// Clock used for "today" and date validation. Defaults to local time.
    pub fn clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn build(self) -> Result<Dashboard, PaginationError> {
        let clock: Clock = self
            .clock
            .unwrap_or_else(|| Arc::new(|| chrono::Local::now().naive_local()));
        let today = clock().date();

        let mut transactions = FetchCoordinator::new("transactions");
        let mut count = FetchCoordinator::new("count");
        let mut categories = FetchCoordinator::new("categories");
        if let Some(window) = self.stale_after {
            transactions = transactions.with_stale_after(window);
            count = count.with_stale_after(window);
            categories = categories.with_stale_after(window);
        }

        Ok(Dashboard {
            dates: DateRangeStore::new(today),
            filters: FilterStore::new(),
            pagination: PaginationStore::new(self.page_size)?,
            keys: QueryKeyBuilder::new(self.min_confidence),
            transactions,
            count,
            categories,
            mutations: MutationRefresher::new(),
            clock,
        })
    }
}
