//! Errors raised by the dashboard core.
//!
//! - [`ValidationError`]: a candidate date range was rejected locally and
//!   never reached the network.
//! - [`PaginationError`]: a page move was rejected without touching state.
//! - [`ApiError`]: a backend call failed. Used for fetches and mutations.
//! - [`MutationError`]: a mutation could not be issued or was rejected.
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please pick a valid date.")]
    InvalidDate,
    #[error("Start date must be on or before end date.")]
    RangeInverted,
    #[error("Start date cannot be more than a year in the future.")]
    TooFarFuture,
}

impl ValidationError {
    /// Stable code used by callers that key feedback on the failure kind.
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidDate => "INVALID_DATE",
            Self::RangeInverted => "RANGE_INVERTED",
            Self::TooFarFuture => "TOO_FAR_FUTURE",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationError {
    #[error("invalid page {0}: pages start at 1")]
    InvalidPage(i64),
    #[error("page size must be > 0")]
    InvalidLimit,
}

/// Failure of a single backend call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rejected: {0}")]
    Validation(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether an automatic retry can change the outcome.
    ///
    /// Requests the backend refused as malformed, or whose response could
    /// not be decoded, fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Server(_) | Self::Transport(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("transaction {0} already has a pending update")]
    InFlight(Uuid),
    #[error("a rule change for \"{0}\" is already pending")]
    RuleInFlight(String),
    #[error(transparent)]
    Rejected(#[from] ApiError),
}
