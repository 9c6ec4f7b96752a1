use std::collections::HashMap;

use chrono::NaiveDate;

use crate::model::*;

/// Which audience the overview is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveOptions {
    /// Surface `cancelled` for a window whose only exact-match reservation was cancelled.
    pub include_cancelled_status: bool,
}

impl ResolveOptions {
    pub const CLIENT: Self = Self {
        include_cancelled_status: false,
    };
    pub const ADMIN: Self = Self {
        include_cancelled_status: true,
    };
}

/// Status grid for every (day, window) pair. Pure: same input, same output.
///
/// `reservations` and `closures` may span more dates than `days`; records for
/// dates outside `days` are ignored.
pub fn resolve(
    days: &[Day],
    reservations: &[Reservation],
    closures: &[ClosedSlot],
    opts: ResolveOptions,
) -> Vec<DayOverview> {
    let mut reservations_by_date: HashMap<NaiveDate, Vec<&Reservation>> = HashMap::new();
    for r in reservations {
        reservations_by_date.entry(r.date).or_default().push(r);
    }
    let mut closures_by_date: HashMap<NaiveDate, Vec<&ClosedSlot>> = HashMap::new();
    for c in closures {
        closures_by_date.entry(c.date).or_default().push(c);
    }

    days.iter()
        .map(|day| {
            let day_reservations = reservations_by_date
                .get(&day.date)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let day_closures = closures_by_date
                .get(&day.date)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let slots = Window::ALL
                .into_iter()
                .map(|w| Slot {
                    date: day.date,
                    start_time: w.start(),
                    end_time: w.end(),
                    status: resolve_window(day, &w.range(), day_reservations, day_closures, opts),
                })
                .collect();
            DayOverview {
                date: day.date,
                weekday: day.weekday,
                slots,
            }
        })
        .collect()
}

/// Status of one window on one day.
///
/// Precedence, highest first:
/// 1. non-bookable weekday → unavailable
/// 2. booked exact match → booked
/// 3. cancelled exact match → cancelled (only with `include_cancelled_status`)
/// 4. active closure covering the window → closed
/// 5. booked reservation overlapping the window → unavailable
/// 6. available
pub fn resolve_window(
    day: &Day,
    window: &TimeRange,
    reservations: &[&Reservation],
    closures: &[&ClosedSlot],
    opts: ResolveOptions,
) -> SlotStatus {
    if !day.bookable {
        return SlotStatus::Unavailable;
    }

    let mut exact_booked = false;
    let mut exact_cancelled = false;
    let mut overlap_booked = false;
    for r in reservations {
        let range = r.range();
        if range == *window {
            match r.status {
                ReservationStatus::Booked => exact_booked = true,
                ReservationStatus::Cancelled => exact_cancelled = true,
            }
        } else if r.is_booked() && range.overlaps(window) {
            overlap_booked = true;
        }
    }

    if exact_booked {
        SlotStatus::Booked
    } else if exact_cancelled && opts.include_cancelled_status {
        SlotStatus::Cancelled
    } else if closures.iter().any(|c| c.covers(window)) {
        SlotStatus::Closed
    } else if overlap_booked {
        SlotStatus::Unavailable
    } else {
        SlotStatus::Available
    }
}
