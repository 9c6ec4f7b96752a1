use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc, Weekday};

use crate::engine::EngineError;
use crate::model::Day;

/// The facility's fixed closed days.
pub fn is_bookable_weekday(weekday: Weekday) -> bool {
    !matches!(weekday, Weekday::Sun | Weekday::Mon)
}

pub fn day_of(date: NaiveDate) -> Day {
    let weekday = date.weekday();
    Day {
        date,
        weekday: weekday.num_days_from_sunday() as u8,
        bookable: is_bookable_weekday(weekday),
    }
}

/// Expand `[start, end]` (inclusive) into one `Day` per calendar date, ascending.
pub fn build_range(start: NaiveDate, end: NaiveDate) -> Result<Vec<Day>, EngineError> {
    if start > end {
        return Err(EngineError::InvalidRange(format!(
            "start {start} is after end {end}"
        )));
    }
    Ok(start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(day_of)
        .collect())
}

/// Parse an ISO calendar date (`YYYY-MM-DD`).
pub fn parse_date(s: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| EngineError::InvalidRange(format!("bad date {s:?}: {e}")))
}

/// Both ends of a query range, as received from a caller. Either may be absent.
pub fn parse_date_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(NaiveDate, NaiveDate), EngineError> {
    let start = start.ok_or(EngineError::MissingField("start"))?;
    let end = end.ok_or(EngineError::MissingField("end"))?;
    Ok((parse_date(start)?, parse_date(end)?))
}

/// Parse a wall-clock time (`HH:MM`).
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Whole days from `today` to `date`; negative for the past.
pub fn days_ahead(today: NaiveDate, date: NaiveDate) -> i64 {
    (date - today).num_days()
}

/// Source of "now" in the single operating timezone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn offset(&self) -> FixedOffset;

    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.offset()).date_naive()
    }
}

pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// Offsets outside ±24h fall back to UTC.
    pub fn new(utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix());
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// A clock that only moves when told to. For tests and replay tooling.
pub struct FixedClock {
    millis: AtomicI64,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(now.timestamp_millis()),
            offset: Utc.fix(),
        }
    }

    /// Noon UTC on the given date.
    pub fn on(date: NaiveDate) -> Self {
        let noon = date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc();
        Self::at(noon)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}
