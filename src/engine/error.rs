use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::TimeRange;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("{date} is outside the booking window")]
    OutOfWindow { date: NaiveDate },
    #[error("{date} is not a bookable day")]
    NotBookable { date: NaiveDate },
    #[error("invalid window start: {0}")]
    InvalidWindow(String),
    #[error("invalid attachment: {0}")]
    InvalidAttachment(&'static str),
    #[error("{date} {range} is closed")]
    SlotClosed { date: NaiveDate, range: TimeRange },
    #[error("{date} {range} is already booked")]
    SlotTaken { date: NaiveDate, range: TimeRange },
    #[error("{date} has bookings in the requested range")]
    HasBookings { date: NaiveDate },
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("reservation on {date} can no longer be cancelled")]
    TooLateToCancel { date: NaiveDate },
    #[error("a reason is required")]
    MissingReason,
    #[error("unauthorized")]
    Unauthorized,
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Stable machine-readable code, for callers rendering messages and for metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidRange(_) => "invalid_range",
            EngineError::OutOfWindow { .. } => "out_of_window",
            EngineError::NotBookable { .. } => "not_bookable",
            EngineError::InvalidWindow(_) => "invalid_window",
            EngineError::InvalidAttachment(_) => "invalid_attachment",
            EngineError::SlotClosed { .. } => "slot_closed",
            EngineError::SlotTaken { .. } => "slot_taken",
            EngineError::HasBookings { .. } => "has_bookings",
            EngineError::NotFound(_) => "not_found",
            EngineError::TooLateToCancel { .. } => "too_late_to_cancel",
            EngineError::MissingReason => "missing_reason",
            EngineError::Unauthorized => "unauthorized",
            EngineError::MissingField(_) => "missing_field",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Storage(_) => "storage",
        }
    }

    /// Business-rule rejections the caller can recover from by changing input.
    /// Storage failures are the only kind that is not.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, EngineError::Storage(_))
    }
}
