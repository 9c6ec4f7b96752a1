use chrono::NaiveDate;
use tokio::sync::oneshot;
use tracing::info;
use ulid::Ulid;

use crate::model::*;

use super::conflict::*;
use super::{Engine, EngineError, WalCommand};

/// A packing list already placed in the file store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackingList {
    pub reference: StoredRef,
    /// Name as uploaded; carries the extension that is validated.
    pub file_name: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub date: NaiveDate,
    /// `HH:MM`; must be one of the fixed window starts.
    pub start_time: String,
    pub container_no: String,
    pub packing_list: Option<PackingList>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureMode {
    Full,
    Partial,
}

#[derive(Debug, Clone)]
pub struct ClosureRequest {
    pub date: NaiveDate,
    pub mode: ClosureMode,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub reason: String,
}

impl Engine {
    /// The checks a booking passes before any lock: horizon, weekday, window.
    /// Callers holding an upload run these before storing it.
    pub fn bookable_window(&self, date: NaiveDate, start_time: &str) -> Result<Window, EngineError> {
        check_booking_horizon(date, self.today())?;
        check_bookable_day(date)?;
        parse_window(start_time)
    }

    /// Book one fixed window. Check order: horizon, weekday, window, closure,
    /// overlap, attachment, container number. Everything from the closure check
    /// to apply runs under the date's write lock.
    pub async fn attempt_book(
        &self,
        request: BookingRequest,
        user_id: UserId,
    ) -> Result<Reservation, EngineError> {
        let BookingRequest {
            date,
            start_time,
            container_no,
            packing_list,
        } = request;
        let window = self.bookable_window(date, &start_time)?;
        let range = window.range();

        let gate = self.enter_gate().await;
        let day = self.day_or_insert(date);
        let guard = day.write_owned().await;

        check_not_closed(&guard, &range)?;
        check_no_booked_overlap(&guard, &range)?;
        let packing_list = validate_packing_list(packing_list)?;
        let container_no = validate_container_no(&container_no)?;

        let reservation = Reservation {
            id: Ulid::new(),
            reservation_no: guard.next_reservation_no(),
            user_id,
            date,
            start_time: range.start,
            end_time: range.end,
            status: ReservationStatus::Booked,
            container_no,
            packing_list,
            cancel_reason: None,
            created_at: self.now(),
            cancelled_at: None,
        };
        let event = Event::ReservationBooked {
            reservation: reservation.clone(),
        };
        self.commit(guard, gate, event).await?;
        info!(
            "booked {} for user {user_id} on {date} {window}",
            reservation.reservation_no
        );
        Ok(reservation)
    }

    /// Cancel the caller's own booked reservation, at least one day ahead.
    /// Unknown, foreign, and already-cancelled ids are all `NotFound`.
    pub async fn attempt_cancel(
        &self,
        id: Ulid,
        reason: Option<String>,
        user_id: UserId,
    ) -> Result<Reservation, EngineError> {
        let reason = optional_reason(reason)?;
        let gate = self.enter_gate().await;
        let guard = self.resolve_entity_write(&id).await?;

        let date = match guard
            .reservations
            .iter()
            .find(|r| r.id == id && r.user_id == user_id && r.is_booked())
        {
            Some(r) => r.date,
            None => return Err(EngineError::NotFound(id)),
        };
        check_cancel_cutoff(date, self.today())?;

        let event = Event::ReservationCancelled {
            id,
            date,
            user_id,
            reason,
            cancelled_at: self.now(),
        };
        let guard = self.commit(guard, gate, event).await?;
        info!("cancelled reservation {id} for user {user_id} on {date}");

        guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    /// Close a whole day or a time range. Refused while any booked reservation
    /// sits in the affected range.
    pub async fn attempt_close(
        &self,
        request: ClosureRequest,
        admin_id: UserId,
    ) -> Result<ClosedSlot, EngineError> {
        let reason = required_reason(&request.reason)?;
        let range = closure_range(
            request.mode,
            request.start_time.as_deref(),
            request.end_time.as_deref(),
        )?;

        let gate = self.enter_gate().await;
        let day = self.day_or_insert(request.date);
        let guard = day.write_owned().await;
        check_closure_clear(&guard, range.as_ref())?;

        let closure = ClosedSlot {
            id: Ulid::new(),
            date: request.date,
            start_time: range.map(|r| r.start),
            end_time: range.map(|r| r.end),
            reason,
            status: ClosureStatus::Closed,
            created_by: admin_id,
            opened_reason: None,
            created_at: self.now(),
            opened_at: None,
        };
        let event = Event::SlotClosed {
            closure: closure.clone(),
        };
        self.commit(guard, gate, event).await?;
        match range {
            Some(r) => info!("closed {} {r} by admin {admin_id}", closure.date),
            None => info!("closed all of {} by admin {admin_id}", closure.date),
        }
        Ok(closure)
    }

    /// Reopen an active closure. Writes one audit entry with the pre-open state.
    pub async fn attempt_open(
        &self,
        id: Ulid,
        opened_reason: String,
        admin_id: UserId,
    ) -> Result<ClosedSlot, EngineError> {
        let opened_reason = required_reason(&opened_reason)?;
        let gate = self.enter_gate().await;
        let guard = self.resolve_entity_write(&id).await?;

        let date = match guard.closures.iter().find(|c| c.id == id && c.is_active()) {
            Some(c) => c.date,
            None => return Err(EngineError::NotFound(id)),
        };

        let event = Event::SlotOpened {
            id,
            date,
            opened_by: admin_id,
            opened_reason,
            opened_at: self.now(),
            audit_id: Ulid::new(),
        };
        let guard = self.commit(guard, gate, event).await?;
        info!("reopened closure {id} on {date} by admin {admin_id}");

        guard
            .closures
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    /// Rewrite the WAL with the minimal event sequence that rebuilds current
    /// state and both logs. Writers are held off for the duration.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::new();

        for (_, day) in self.day_handles() {
            let guard = day.read().await;
            for r in &guard.reservations {
                let mut original = r.clone();
                original.status = ReservationStatus::Booked;
                original.cancel_reason = None;
                original.cancelled_at = None;
                events.push(Event::ReservationBooked {
                    reservation: original,
                });
            }
            for c in &guard.closures {
                let mut original = c.clone();
                original.status = ClosureStatus::Closed;
                original.opened_reason = None;
                original.opened_at = None;
                events.push(Event::SlotClosed { closure: original });
            }
        }

        // Transitions follow in log order so replay rebuilds both logs as they were.
        for entry in self.cancel_log.read().await.iter() {
            events.push(Event::ReservationCancelled {
                id: entry.reservation_id,
                date: entry.reservation_date,
                user_id: entry.user_id,
                reason: entry.reason.clone(),
                cancelled_at: entry.cancelled_at,
            });
        }
        for entry in self.audit_log.read().await.iter() {
            events.push(Event::SlotOpened {
                id: entry.target_id,
                date: entry.snapshot.date,
                opened_by: entry.actor_id,
                opened_reason: entry.snapshot.opened_reason.clone(),
                opened_at: entry.created_at,
                audit_id: entry.id,
            });
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        info!("wal compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
