//! Stale-while-revalidate fetch coordination for a single cache slot.
//!
//! A [`FetchCoordinator`] is an explicit state machine
//! (`idle -> loading -> success | error`) with a side pointer to the last
//! entry that had data. It never performs I/O itself: `observe` and `refetch`
//! hand out a [`FetchTicket`] when a fetch must be issued, and the caller
//! reports the result through [`FetchCoordinator::complete`]. Every ticket
//! carries a generation number; only the most recently issued ticket may
//! change the slot, so a late response for a superseded request is dropped.
use std::{fmt, future::Future, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::ApiError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct CacheEntry<K, T> {
    pub key: K,
    pub data: Option<T>,
    pub status: FetchStatus,
    pub error: Option<ApiError>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<K, T> CacheEntry<K, T> {
    fn loading(key: K) -> Self {
        Self {
            key,
            data: None,
            status: FetchStatus::Loading,
            error: None,
            fetched_at: None,
        }
    }
}

/// Permission to run one fetch for `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket<K> {
    key: K,
    generation: u64,
}

impl<K> FetchTicket<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// What a view renders for a slot.
#[derive(Debug)]
pub struct FetchState<'a, K, T> {
    /// Most recently requested key.
    pub key: Option<&'a K>,
    pub status: FetchStatus,
    /// Data for `key`, or the last good data of the previous key while the
    /// new one is loading or failed.
    pub data: Option<&'a T>,
    pub error: Option<&'a ApiError>,
    /// `true` when `data` belongs to the previous key.
    pub is_previous_data: bool,
}

impl<K, T> FetchState<'_, K, T> {
    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }
}

pub struct FetchCoordinator<K, T> {
    label: &'static str,
    current: Option<CacheEntry<K, T>>,
    previous: Option<CacheEntry<K, T>>,
    generation: u64,
    stale_after: Option<TimeDelta>,
}

impl<K, T> fmt::Debug for FetchCoordinator<K, T>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("label", &self.label)
            .field("key", &self.current.as_ref().map(|entry| &entry.key))
            .field("status", &self.current.as_ref().map(|entry| entry.status))
            .field("generation", &self.generation)
            .finish()
    }
}

impl<K, T> FetchCoordinator<K, T>
where
    K: Clone + PartialEq + fmt::Debug,
{
    /// `label` names the slot in logs.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            current: None,
            previous: None,
            generation: 0,
            stale_after: None,
        }
    }

    /// Data older than `window` is refetched the next time its key is observed.
    pub fn with_stale_after(mut self, window: Duration) -> Self {
        self.stale_after = TimeDelta::from_std(window).ok();
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Most recently requested key.
    pub fn key(&self) -> Option<&K> {
        self.current.as_ref().map(|entry| &entry.key)
    }

    pub fn status(&self) -> FetchStatus {
        self.current
            .as_ref()
            .map_or(FetchStatus::Idle, |entry| entry.status)
    }

    pub fn data(&self) -> Option<&T> {
        self.state().data
    }

    pub fn state(&self) -> FetchState<'_, K, T> {
        let Some(entry) = &self.current else {
            return FetchState {
                key: None,
                status: FetchStatus::Idle,
                data: None,
                error: None,
                is_previous_data: false,
            };
        };
        let (data, is_previous_data) = match entry.data.as_ref() {
            Some(data) => (Some(data), false),
            None => {
                let retained = self.previous.as_ref().and_then(|prev| prev.data.as_ref());
                (retained, retained.is_some())
            }
        };
        FetchState {
            key: Some(&entry.key),
            status: entry.status,
            data,
            error: entry.error.as_ref(),
            is_previous_data,
        }
    }

    /// [`observe_at`](Self::observe_at) against the system clock.
    pub fn observe(&mut self, key: K) -> Option<FetchTicket<K>> {
        self.observe_at(key, Utc::now())
    }

    /// Registers interest in `key`.
    ///
    /// Returns a ticket when a fetch must be issued. No ticket means the slot
    /// already serves `key`: either from data, from an in-flight request, or
    /// from an error that waits for a manual [`refetch`](Self::refetch).
    pub fn observe_at(&mut self, key: K, now: DateTime<Utc>) -> Option<FetchTicket<K>> {
        if let Some(entry) = &self.current
            && entry.key == key
        {
            if entry.status == FetchStatus::Success && self.is_stale(entry, now) {
                tracing::debug!(slot = self.label, ?key, "cached data is stale, revalidating");
                return self.refetch();
            }
            return None;
        }

        if let Some(prev) = &self.previous
            && prev.key == key
            && prev.status == FetchStatus::Success
            && !self.is_stale(prev, now)
        {
            // Back to the key whose data is still on screen: swap it in and
            // void whatever the abandoned key had in flight.
            let restored = self.previous.take();
            self.current = restored;
            self.generation += 1;
            tracing::debug!(slot = self.label, ?key, "serving retained data");
            return None;
        }

        if let Some(outgoing) = self.current.take()
            && outgoing.data.is_some()
        {
            self.previous = Some(outgoing);
        }
        self.current = Some(CacheEntry::loading(key.clone()));
        Some(self.issue(key))
    }

    /// Re-runs the fetch for the current key, keeping its data on screen.
    pub fn refetch(&mut self) -> Option<FetchTicket<K>> {
        let entry = self.current.as_mut()?;
        entry.status = FetchStatus::Loading;
        entry.error = None;
        let key = entry.key.clone();
        Some(self.issue(key))
    }

    /// Forces a refetch after a write. Retained data of another key stays
    /// visible but is never promoted back without a new fetch.
    pub fn invalidate(&mut self) -> Option<FetchTicket<K>> {
        let current_has_data = self
            .current
            .as_ref()
            .is_some_and(|entry| entry.data.is_some());
        if current_has_data {
            self.previous = None;
        } else if let Some(prev) = self.previous.as_mut() {
            prev.status = FetchStatus::Idle;
        }
        self.refetch()
    }

    /// [`complete_at`](Self::complete_at) against the system clock.
    pub fn complete(&mut self, ticket: FetchTicket<K>, result: Result<T, ApiError>) -> bool {
        self.complete_at(ticket, result, Utc::now())
    }

    /// Applies a finished fetch. Returns `false` if the ticket was superseded
    /// and the result was dropped.
    pub fn complete_at(
        &mut self,
        ticket: FetchTicket<K>,
        result: Result<T, ApiError>,
        now: DateTime<Utc>,
    ) -> bool {
        if ticket.generation != self.generation {
            tracing::debug!(
                slot = self.label,
                key = ?ticket.key,
                generation = ticket.generation,
                latest = self.generation,
                "dropping superseded response"
            );
            return false;
        }
        let Some(entry) = self.current.as_mut() else {
            return false;
        };
        if entry.key != ticket.key {
            return false;
        }

        match result {
            Ok(data) => {
                entry.data = Some(data);
                entry.status = FetchStatus::Success;
                entry.error = None;
                entry.fetched_at = Some(now);
                self.previous = None;
            }
            Err(err) => {
                tracing::warn!(slot = self.label, key = ?ticket.key, "fetch failed: {err}");
                entry.status = FetchStatus::Error;
                entry.error = Some(err);
            }
        }
        true
    }

    fn issue(&mut self, key: K) -> FetchTicket<K> {
        self.generation += 1;
        tracing::debug!(slot = self.label, ?key, generation = self.generation, "fetch issued");
        FetchTicket {
            key,
            generation: self.generation,
        }
    }

    fn is_stale(&self, entry: &CacheEntry<K, T>, now: DateTime<Utc>) -> bool {
        match (self.stale_after, entry.fetched_at) {
            (Some(window), Some(at)) => now - at >= window,
            _ => false,
        }
    }
}

/// Automatic retry schedule for failed fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt + 1`: `base * 2^attempt`, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay)
    }
}

/// Runs `fetch` until it succeeds, fails with a non-retryable error, or the
/// policy is exhausted.
pub async fn fetch_with_retry<T, F, Fut>(policy: RetryPolicy, mut fetch: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        match fetch().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.retries => {
                let delay = policy.delay(attempt);
                attempt += 1;
                tracing::info!(attempt, ?delay, "retrying fetch: {err}");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    type Slot = FetchCoordinator<&'static str, String>;

    fn loaded(key: &'static str, data: &str) -> Slot {
        let mut slot = Slot::new("test");
        let ticket = slot.observe(key).unwrap();
        assert!(slot.complete(ticket, Ok(data.to_string())));
        slot
    }

    #[test]
    fn first_observe_issues_a_fetch() {
        let mut slot = Slot::new("test");
        assert_eq!(slot.status(), FetchStatus::Idle);
        let ticket = slot.observe("k1").unwrap();
        assert_eq!(ticket.key(), &"k1");
        let state = slot.state();
        assert!(state.is_loading());
        assert!(state.data.is_none());
    }

    #[test]
    fn same_key_is_served_without_fetch() {
        let mut slot = loaded("k1", "d1");
        assert!(slot.observe("k1").is_none());
        let state = slot.state();
        assert_eq!(state.status, FetchStatus::Success);
        assert_eq!(state.data.map(String::as_str), Some("d1"));
    }

    #[test]
    fn pending_same_key_is_not_fetched_twice() {
        let mut slot = Slot::new("test");
        assert!(slot.observe("k1").is_some());
        assert!(slot.observe("k1").is_none());
    }

    #[test]
    fn new_key_keeps_previous_data_while_loading() {
        let mut slot = loaded("k1", "d1");
        let ticket = slot.observe("k2").unwrap();

        let state = slot.state();
        assert_eq!(state.status, FetchStatus::Loading);
        assert_eq!(state.data.map(String::as_str), Some("d1"));
        assert!(state.is_previous_data);

        assert!(slot.complete(ticket, Ok("d2".to_string())));
        let state = slot.state();
        assert_eq!(state.status, FetchStatus::Success);
        assert_eq!(state.data.map(String::as_str), Some("d2"));
        assert!(!state.is_previous_data);
    }

    #[test]
    fn superseded_response_is_dropped() {
        let mut slot = loaded("k1", "d1");
        let t2 = slot.observe("k2").unwrap();
        let t3 = slot.observe("k3").unwrap();

        assert!(slot.complete(t3, Ok("d3".to_string())));
        assert!(!slot.complete(t2, Ok("d2".to_string())));

        assert_eq!(slot.key(), Some(&"k3"));
        assert_eq!(slot.data().map(String::as_str), Some("d3"));
    }

    #[test]
    fn previous_data_survives_a_chain_of_pending_keys() {
        let mut slot = loaded("k1", "d1");
        let _t2 = slot.observe("k2").unwrap();
        let _t3 = slot.observe("k3").unwrap();
        assert_eq!(slot.data().map(String::as_str), Some("d1"));
    }

    #[test]
    fn returning_to_retained_key_needs_no_fetch() {
        let mut slot = loaded("k1", "d1");
        let t2 = slot.observe("k2").unwrap();
        assert!(slot.observe("k1").is_none());
        assert_eq!(slot.status(), FetchStatus::Success);
        assert_eq!(slot.data().map(String::as_str), Some("d1"));
        // The abandoned request can no longer land.
        assert!(!slot.complete(t2, Ok("d2".to_string())));
    }

    #[test]
    fn error_keeps_last_good_data() {
        let mut slot = loaded("k1", "d1");
        let ticket = slot.observe("k2").unwrap();
        slot.complete(ticket, Err(ApiError::Transport("timeout".to_string())));

        let state = slot.state();
        assert_eq!(state.status, FetchStatus::Error);
        assert_eq!(state.data.map(String::as_str), Some("d1"));
        assert!(state.error.is_some());

        // An error is not retried by observing the same key again.
        assert!(slot.observe("k2").is_none());
        let retry = slot.refetch().unwrap();
        assert_eq!(slot.status(), FetchStatus::Loading);
        slot.complete(retry, Ok("d2".to_string()));
        assert_eq!(slot.data().map(String::as_str), Some("d2"));
    }

    #[test]
    fn refetch_keeps_current_data_visible() {
        let mut slot = loaded("k1", "d1");
        let ticket = slot.refetch().unwrap();
        let state = slot.state();
        assert_eq!(state.status, FetchStatus::Loading);
        assert_eq!(state.data.map(String::as_str), Some("d1"));
        assert!(!state.is_previous_data);
        slot.complete(ticket, Ok("d1b".to_string()));
        assert_eq!(slot.data().map(String::as_str), Some("d1b"));
    }

    #[test]
    fn refetch_on_empty_slot_is_a_no_op() {
        let mut slot = Slot::new("test");
        assert!(slot.refetch().is_none());
    }

    #[test]
    fn invalidated_retained_data_is_not_restored() {
        let mut slot = loaded("k1", "d1");
        let _t2 = slot.observe("k2").unwrap();
        let _t2b = slot.invalidate().unwrap();
        assert_eq!(slot.data().map(String::as_str), Some("d1"));
        assert!(slot.observe("k1").is_some());
    }

    #[test]
    fn stale_data_is_revalidated_on_observe() {
        let start = Utc::now();
        let mut slot = Slot::new("test").with_stale_after(Duration::from_secs(30));
        let ticket = slot.observe_at("k1", start).unwrap();
        slot.complete_at(ticket, Ok("d1".to_string()), start);

        assert!(slot.observe_at("k1", start + TimeDelta::seconds(10)).is_none());
        assert!(slot.observe_at("k1", start + TimeDelta::seconds(31)).is_some());
        assert_eq!(slot.data().map(String::as_str), Some("d1"));
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(10), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_twice() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<u32, ApiError> = fetch_with_retry(RetryPolicy::default(), || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ApiError::Server("busy".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), ApiError> = fetch_with_retry(RetryPolicy::default(), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Transport("down".to_string()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn validation_failures_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), ApiError> = fetch_with_retry(RetryPolicy::default(), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Validation("Invalid category format".to_string()))
            }
        })
        .await;
        assert_eq!(
            result,
            Err(ApiError::Validation("Invalid category format".to_string()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
