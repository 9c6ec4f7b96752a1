use chrono::NaiveDate;
use ulid::Ulid;

use crate::calendar::build_range;
use crate::limits::MAX_QUERY_DAYS;
use crate::model::*;

use super::resolver::{resolve, ResolveOptions};
use super::{Engine, EngineError};

/// Runs before any day is materialised. A reversed range passes here and is
/// left to `build_range`.
fn check_query_span(start: NaiveDate, end: NaiveDate) -> Result<(), EngineError> {
    if (end - start).num_days() + 1 > MAX_QUERY_DAYS {
        return Err(EngineError::LimitExceeded("date range too wide"));
    }
    Ok(())
}

impl Engine {
    /// Resolved status grid for `[start, end]`, inclusive.
    pub async fn overview(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        opts: ResolveOptions,
    ) -> Result<Vec<DayOverview>, EngineError> {
        check_query_span(start, end)?;
        let days = build_range(start, end)?;
        let (reservations, closures) = self.snapshot_range(start, end).await;
        Ok(resolve(&days, &reservations, &closures, opts))
    }

    /// Clone every reservation and closure dated within `[start, end]`.
    /// Each day is read under its own lock; days are not read atomically together.
    async fn snapshot_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> (Vec<Reservation>, Vec<ClosedSlot>) {
        let mut reservations = Vec::new();
        let mut closures = Vec::new();
        for date in start.iter_days().take_while(|d| *d <= end) {
            let Some(day) = self.get_day(&date) else {
                continue;
            };
            let guard = day.read().await;
            reservations.extend(guard.reservations.iter().cloned());
            closures.extend(guard.closures.iter().cloned());
        }
        (reservations, closures)
    }

    /// Reservations of any status in `[start, end]`, by date then start time.
    pub async fn reservations_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError> {
        check_query_span(start, end)?;
        build_range(start, end)?;
        let (mut reservations, _) = self.snapshot_range(start, end).await;
        reservations.sort_by(|a, b| (a.date, a.start_time).cmp(&(b.date, b.start_time)));
        Ok(reservations)
    }

    /// One user's reservations of any status, newest date first.
    pub async fn reservations_for_user(&self, user_id: UserId) -> Vec<Reservation> {
        let mut out = Vec::new();
        for (_, day) in self.day_handles() {
            let guard = day.read().await;
            out.extend(guard.reservations.iter().filter(|r| r.user_id == user_id).cloned());
        }
        out.sort_by(|a, b| b.date.cmp(&a.date).then(a.start_time.cmp(&b.start_time)));
        out
    }

    pub async fn get_reservation(&self, id: &Ulid) -> Option<Reservation> {
        let date = self.date_of_entity(id)?;
        let day = self.get_day(&date)?;
        let guard = day.read().await;
        guard.reservations.iter().find(|r| r.id == *id).cloned()
    }

    pub async fn get_closure(&self, id: &Ulid) -> Option<ClosedSlot> {
        let date = self.date_of_entity(id)?;
        let day = self.get_day(&date)?;
        let guard = day.read().await;
        guard.closures.iter().find(|c| c.id == *id).cloned()
    }

    /// Every closure, active or reopened, newest date first then newest created.
    pub async fn closures(&self) -> Vec<ClosedSlot> {
        let mut out = Vec::new();
        for (_, day) in self.day_handles() {
            let guard = day.read().await;
            out.extend(guard.closures.iter().cloned());
        }
        out.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        out
    }

    /// Reopen audit trail, oldest first.
    pub async fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit_log.read().await.clone()
    }

    /// Cancellation history, oldest first.
    pub async fn cancel_log(&self) -> Vec<CancelLogEntry> {
        self.cancel_log.read().await.clone()
    }
}
