use std::path::Path;

use chrono::{Datelike, NaiveDate};

use crate::calendar::{days_ahead, is_bookable_weekday, parse_time};
use crate::limits::*;
use crate::model::*;

use super::mutations::{ClosureMode, PackingList};
use super::{DayState, EngineError};

pub(crate) fn check_booking_horizon(date: NaiveDate, today: NaiveDate) -> Result<(), EngineError> {
    let ahead = days_ahead(today, date);
    if !(MIN_LEAD_DAYS..=BOOKING_HORIZON_DAYS).contains(&ahead) {
        return Err(EngineError::OutOfWindow { date });
    }
    Ok(())
}

pub(crate) fn check_bookable_day(date: NaiveDate) -> Result<(), EngineError> {
    if !is_bookable_weekday(date.weekday()) {
        return Err(EngineError::NotBookable { date });
    }
    Ok(())
}

/// Only the three fixed starts are accepted; the end is always start + 3h.
pub(crate) fn parse_window(start_time: &str) -> Result<Window, EngineError> {
    parse_time(start_time)
        .and_then(Window::from_start)
        .ok_or_else(|| EngineError::InvalidWindow(start_time.to_string()))
}

pub(crate) fn check_not_closed(ds: &DayState, range: &TimeRange) -> Result<(), EngineError> {
    if ds.closure_covering(range).is_some() {
        return Err(EngineError::SlotClosed {
            date: ds.date,
            range: *range,
        });
    }
    Ok(())
}

pub(crate) fn check_no_booked_overlap(ds: &DayState, range: &TimeRange) -> Result<(), EngineError> {
    if ds.booked_overlapping(range).next().is_some() {
        return Err(EngineError::SlotTaken {
            date: ds.date,
            range: *range,
        });
    }
    Ok(())
}

/// Accepts the stored packing list or says why not. Extension check is case-insensitive.
pub(crate) fn validate_packing_list(list: Option<PackingList>) -> Result<StoredRef, EngineError> {
    let list = list.ok_or(EngineError::InvalidAttachment("packing list is required"))?;
    if list.size == 0 {
        return Err(EngineError::InvalidAttachment("packing list is empty"));
    }
    if list.size > MAX_ATTACHMENT_BYTES {
        return Err(EngineError::InvalidAttachment("packing list exceeds 10 MiB"));
    }
    if list.file_name.len() > MAX_FILE_NAME_LEN {
        return Err(EngineError::InvalidAttachment("file name too long"));
    }
    if !has_allowed_extension(&list.file_name) {
        return Err(EngineError::InvalidAttachment("packing list must be pdf, doc or docx"));
    }
    if !list.reference.is_in_namespace() {
        return Err(EngineError::InvalidAttachment("stored reference outside upload area"));
    }
    Ok(list.reference)
}

pub(crate) fn has_allowed_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            ATTACHMENT_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

pub(crate) fn validate_container_no(container_no: &str) -> Result<String, EngineError> {
    let trimmed = container_no.trim();
    if trimmed.is_empty() {
        return Err(EngineError::MissingField("container_no"));
    }
    if trimmed.len() > MAX_CONTAINER_NO_LEN {
        return Err(EngineError::LimitExceeded("container number too long"));
    }
    Ok(trimmed.to_string())
}

/// A reason that must be present. Whitespace-only counts as missing.
pub(crate) fn required_reason(reason: &str) -> Result<String, EngineError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(EngineError::MissingReason);
    }
    if trimmed.len() > MAX_REASON_LEN {
        return Err(EngineError::LimitExceeded("reason too long"));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn optional_reason(reason: Option<String>) -> Result<Option<String>, EngineError> {
    match reason.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(r) if r.len() > MAX_REASON_LEN => Err(EngineError::LimitExceeded("reason too long")),
        Some(r) => Ok(Some(r.to_string())),
    }
}

/// `None` for a full-day closure, the ordered range for a partial one.
pub(crate) fn closure_range(
    mode: ClosureMode,
    start_time: Option<&str>,
    end_time: Option<&str>,
) -> Result<Option<TimeRange>, EngineError> {
    match mode {
        ClosureMode::Full => Ok(None),
        ClosureMode::Partial => {
            let (Some(start), Some(end)) = (start_time, end_time) else {
                return Err(EngineError::InvalidRange(
                    "partial closure needs both start and end".into(),
                ));
            };
            let start_t = parse_time(start)
                .ok_or_else(|| EngineError::InvalidRange(format!("bad start time {start:?}")))?;
            let end_t = parse_time(end)
                .ok_or_else(|| EngineError::InvalidRange(format!("bad end time {end:?}")))?;
            if start_t >= end_t {
                return Err(EngineError::InvalidRange(format!(
                    "start {start} must be before end {end}"
                )));
            }
            Ok(Some(TimeRange::new(start_t, end_t)))
        }
    }
}

/// Full-day: any booked reservation that day blocks. Partial: any booked overlap blocks.
pub(crate) fn check_closure_clear(ds: &DayState, range: Option<&TimeRange>) -> Result<(), EngineError> {
    let blocked = match range {
        None => ds.reservations.iter().any(Reservation::is_booked),
        Some(range) => ds.booked_overlapping(range).next().is_some(),
    };
    if blocked {
        return Err(EngineError::HasBookings { date: ds.date });
    }
    Ok(())
}

pub(crate) fn check_cancel_cutoff(date: NaiveDate, today: NaiveDate) -> Result<(), EngineError> {
    if days_ahead(today, date) < MIN_LEAD_DAYS {
        return Err(EngineError::TooLateToCancel { date });
    }
    Ok(())
}
