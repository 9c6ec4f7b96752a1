use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identity handed to us by the auth collaborator.
pub type UserId = u64;

/// Half-open interval `[start, end)` within one operating day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    /// `NOT(self.end <= other.start OR self.start >= other.end)`
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// The three fixed daily delivery windows, identified by start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    TenToOne,
    ElevenToTwo,
    NoonToThree,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::TenToOne, Window::ElevenToTwo, Window::NoonToThree];

    pub const LENGTH_HOURS: u32 = 3;

    pub fn start_hour(self) -> u32 {
        match self {
            Window::TenToOne => 10,
            Window::ElevenToTwo => 11,
            Window::NoonToThree => 12,
        }
    }

    pub fn start(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.start_hour(), 0, 0).unwrap_or_default()
    }

    pub fn end(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.start_hour() + Self::LENGTH_HOURS, 0, 0).unwrap_or_default()
    }

    pub fn range(self) -> TimeRange {
        TimeRange::new(self.start(), self.end())
    }

    pub fn from_start(start: NaiveTime) -> Option<Window> {
        Self::ALL.into_iter().find(|w| w.start() == start)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.range().fmt(f)
    }
}

/// One calendar day of an overview request. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Day {
    pub date: NaiveDate,
    /// 0 = Sunday .. 6 = Saturday.
    pub weekday: u8,
    pub bookable: bool,
}

/// Opaque key returned by the file store for an uploaded packing list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredRef(pub String);

impl StoredRef {
    /// Every reference we hand out lives under this prefix.
    pub const NAMESPACE: &'static str = "uploads/packing-lists/";

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rooted under the upload namespace, a single plain file name, no traversal.
    pub fn is_in_namespace(&self) -> bool {
        match self.0.strip_prefix(Self::NAMESPACE) {
            Some(name) => {
                !name.is_empty()
                    && name != "."
                    && name != ".."
                    && !name.contains(['/', '\\'])
                    && !name.contains('\0')
            }
            None => false,
        }
    }

    /// File name portion of the reference.
    pub fn file_name(&self) -> &str {
        self.0.rsplit(['/', '\\']).next().unwrap_or(&self.0)
    }
}

impl fmt::Display for StoredRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Booked,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    /// `YYYYMMDD-NNN`, sequential per date.
    pub reservation_no: String,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: ReservationStatus,
    pub container_no: String,
    pub packing_list: StoredRef,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    pub fn is_booked(&self) -> bool {
        self.status == ReservationStatus::Booked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosureStatus {
    Closed,
    Opened,
}

/// Admin-declared unavailability. Both times `None` means the whole day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedSlot {
    pub id: Ulid,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: String,
    pub status: ClosureStatus,
    pub created_by: UserId,
    pub opened_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
}

impl ClosedSlot {
    pub fn is_active(&self) -> bool {
        self.status == ClosureStatus::Closed
    }

    pub fn is_full_day(&self) -> bool {
        self.start_time.is_none() && self.end_time.is_none()
    }

    /// The partial range, if both ends are set and ordered.
    pub fn range(&self) -> Option<TimeRange> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if start < end => Some(TimeRange::new(start, end)),
            _ => None,
        }
    }

    /// Whether this closure, while active, makes `window` closed.
    /// Full-day covers everything; partial covers only windows it fully contains.
    pub fn covers(&self, window: &TimeRange) -> bool {
        if !self.is_active() {
            return false;
        }
        if self.is_full_day() {
            return true;
        }
        self.range().is_some_and(|r| r.contains(window))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Booked,
    Closed,
    Cancelled,
    Unavailable,
}

impl SlotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Booked => "booked",
            SlotStatus::Closed => "closed",
            SlotStatus::Cancelled => "cancelled",
            SlotStatus::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: SlotStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayOverview {
    pub date: NaiveDate,
    pub weekday: u8,
    pub slots: Vec<Slot>,
}

impl DayOverview {
    pub fn status_of(&self, window: Window) -> Option<SlotStatus> {
        self.slots
            .iter()
            .find(|s| s.start_time == window.start())
            .map(|s| s.status)
    }
}

// ── Append-only logs ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    OpenClosedSlot,
}

/// State of a closure just before it was reopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureSnapshot {
    pub id: Ulid,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: String,
    pub status_before: ClosureStatus,
    pub created_at: DateTime<Utc>,
    pub opened_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Ulid,
    pub actor_id: UserId,
    pub operation: AuditOperation,
    pub target_id: Ulid,
    pub snapshot: ClosureSnapshot,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// The snapshot rendered as a JSON document for export.
    pub fn detail_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelLogEntry {
    pub reservation_id: Ulid,
    pub user_id: UserId,
    pub reason: Option<String>,
    /// The date the reservation was for, not the day it was cancelled.
    pub reservation_date: NaiveDate,
    pub cancelled_at: DateTime<Utc>,
}

/// Flat event records. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationBooked {
        reservation: Reservation,
    },
    ReservationCancelled {
        id: Ulid,
        date: NaiveDate,
        user_id: UserId,
        reason: Option<String>,
        cancelled_at: DateTime<Utc>,
    },
    SlotClosed {
        closure: ClosedSlot,
    },
    SlotOpened {
        id: Ulid,
        date: NaiveDate,
        opened_by: UserId,
        opened_reason: String,
        opened_at: DateTime<Utc>,
        audit_id: Ulid,
    },
}

impl Event {
    /// Every event belongs to exactly one date partition.
    pub fn date(&self) -> NaiveDate {
        match self {
            Event::ReservationBooked { reservation } => reservation.date,
            Event::SlotClosed { closure } => closure.date,
            Event::ReservationCancelled { date, .. } | Event::SlotOpened { date, .. } => *date,
        }
    }
}
