//! Draft and applied date ranges.
//!
//! The date pickers write into the *draft* freely. Only a validated commit
//! moves the draft into the *applied* range, which is the one queries are
//! built from, so a half-edited range never reaches the network.
use chrono::{
    DateTime, Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Day of month on which a statement period starts.
pub const STATEMENT_DAY: u32 = 25;

/// Inclusive range of calendar days.
///
/// Always normalized: `start <= end`, no time of day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Current statement period: from the 25th of the previous month (or of
    /// this month, once the 25th has passed) through `today`.
    pub fn statement_period(today: NaiveDate) -> Self {
        let (year, month) = if today.day() >= STATEMENT_DAY {
            (today.year(), today.month())
        } else if today.month() == 1 {
            (today.year() - 1, 12)
        } else {
            (today.year(), today.month() - 1)
        };
        let start = NaiveDate::from_ymd_opt(year, month, STATEMENT_DAY).unwrap_or(today);
        Self { start, end: today }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Wire bounds in `tz`: the first instant of `start` and the last
    /// millisecond of `end`.
    pub fn to_instants<Tz: TimeZone>(&self, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = local_instant(tz, self.start.and_time(NaiveTime::MIN), true);
        let last = self
            .end
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap_or_else(|| self.end.and_time(NaiveTime::MIN));
        let to = local_instant(tz, last, false);
        (from, to)
    }
}

fn local_instant<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime, earliest: bool) -> DateTime<Utc> {
    let resolved = tz.from_local_datetime(&local);
    let picked = if earliest {
        resolved.earliest()
    } else {
        resolved.latest()
    };
    // Local times inside a DST gap do not exist; read them as UTC.
    picked
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| local.and_utc())
}

/// What the date pickers currently hold. Either side may be cleared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DraftRange {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl DraftRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Parses two `YYYY-MM-DD` inputs. Unparseable sides are left empty, so
    /// validation reports them as invalid dates.
    pub fn parse(start: &str, end: &str) -> Self {
        Self {
            start: parse_day(start),
            end: parse_day(end),
        }
    }
}

impl From<DateRange> for DraftRange {
    fn from(range: DateRange) -> Self {
        Self::new(
            range.start.and_time(NaiveTime::MIN),
            range.end.and_time(NaiveTime::MIN),
        )
    }
}

fn parse_day(raw: &str) -> Option<NaiveDateTime> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .map(|day| day.and_time(NaiveTime::MIN))
}

/// Checks a candidate range against `now`.
///
/// Order of checks: missing dates, inverted bounds, then a start more than one
/// year past `now`.
pub fn validate_at(
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> Result<(), ValidationError> {
    let (Some(start), Some(end)) = (start, end) else {
        return Err(ValidationError::InvalidDate);
    };
    if start > end {
        return Err(ValidationError::RangeInverted);
    }
    let horizon = now
        .checked_add_months(Months::new(12))
        .ok_or(ValidationError::InvalidDate)?;
    if start > horizon {
        return Err(ValidationError::TooFarFuture);
    }
    Ok(())
}

/// [`validate_at`] against the local wall clock.
pub fn validate(
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<(), ValidationError> {
    validate_at(start, end, chrono::Local::now().naive_local())
}

#[derive(Debug, Clone)]
pub struct DateRangeStore {
    draft: DraftRange,
    applied: DateRange,
    last_error: Option<ValidationError>,
}

impl DateRangeStore {
    /// Both draft and applied start at the statement period ending `today`.
    pub fn new(today: NaiveDate) -> Self {
        let applied = DateRange::statement_period(today);
        Self {
            draft: applied.into(),
            applied,
            last_error: None,
        }
    }

    pub fn draft(&self) -> DraftRange {
        self.draft
    }

    pub fn applied(&self) -> DateRange {
        self.applied
    }

    pub fn last_error(&self) -> Option<ValidationError> {
        self.last_error
    }

    pub fn set_draft(&mut self, range: DraftRange) {
        self.draft = range;
        self.last_error = None;
    }

    /// Validates `range` and, on success, replaces the applied range with its
    /// calendar days.
    ///
    /// Returns whether the applied range actually changed. On failure the
    /// applied range is untouched and the error is kept for inline feedback.
    pub fn commit(&mut self, range: DraftRange, now: NaiveDateTime) -> Result<bool, ValidationError> {
        if let Err(err) = validate_at(range.start, range.end, now) {
            self.last_error = Some(err);
            return Err(err);
        }
        let (Some(start), Some(end)) = (range.start, range.end) else {
            self.last_error = Some(ValidationError::InvalidDate);
            return Err(ValidationError::InvalidDate);
        };
        let normalized = DateRange {
            start: start.date(),
            end: end.date(),
        };
        self.last_error = None;
        let changed = normalized != self.applied;
        self.applied = normalized;
        Ok(changed)
    }

    /// Commits the current draft.
    pub fn commit_draft(&mut self, now: NaiveDateTime) -> Result<bool, ValidationError> {
        self.commit(self.draft, now)
    }
}
