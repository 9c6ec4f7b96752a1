mod conflict;
mod error;
mod mutations;
mod queries;
mod resolver;

pub use error::EngineError;
pub use mutations::{BookingRequest, ClosureMode, ClosureRequest, PackingList};
pub use resolver::{resolve, resolve_window, ResolveOptions};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::calendar::Clock;
use crate::model::*;
use crate::wal::Wal;

pub type SharedDayState = Arc<RwLock<DayState>>;

/// Everything recorded for one calendar date. Holding its write lock is the
/// critical section for every guarded write on that date.
#[derive(Debug, Clone)]
pub struct DayState {
    pub date: NaiveDate,
    /// In creation order.
    pub reservations: Vec<Reservation>,
    /// In creation order.
    pub closures: Vec<ClosedSlot>,
    /// Reservation numbers issued for this date, any status. Never decreases.
    pub issued: u32,
}

impl DayState {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            reservations: Vec::new(),
            closures: Vec::new(),
            issued: 0,
        }
    }

    /// Booked reservations whose range intersects `range`.
    pub fn booked_overlapping<'a>(
        &'a self,
        range: &'a TimeRange,
    ) -> impl Iterator<Item = &'a Reservation> + 'a {
        self.reservations
            .iter()
            .filter(move |r| r.is_booked() && r.range().overlaps(range))
    }

    /// First active closure that makes `range` closed.
    pub fn closure_covering(&self, range: &TimeRange) -> Option<&ClosedSlot> {
        self.closures.iter().find(|c| c.covers(range))
    }

    /// `YYYYMMDD-NNN` for the next reservation on this date.
    pub fn next_reservation_no(&self) -> String {
        format!("{}-{:03}", self.date.format("%Y%m%d"), self.issued + 1)
    }
}

/// Append-only side records produced while applying an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LogEntry {
    Cancel(CancelLogEntry),
    Audit(AuditEntry),
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit:
/// block for one append, drain whatever else is already queued, then a single
/// flush + fsync answers every sender in the batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append { event, response } => vec![(event, response)],
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("wal flush failed for batch of {}: {e}", batch.len());
            // Every sender in the batch sees the error, so none of it may survive on disk.
            if let Err(e) = wal.truncate_to_durable() {
                tracing::error!("wal could not drop failed batch: {e}");
            }
        }
        respond_batch(batch, &result);

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
    tracing::debug!("wal writer stopped");
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    match append_err {
        Some(e) => Err(e),
        None => wal.flush_sync(),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => {}
    }
}

/// Write event to WAL via the background group-commit writer.
async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::Storage(e.to_string()))
}

/// The storage handle: built once at start-up, shared by `Arc`.
pub struct Engine {
    days: DashMap<NaiveDate, SharedDayState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: reservation / closure id → date partition.
    entity_to_date: Arc<DashMap<Ulid, NaiveDate>>,
    audit_log: Arc<RwLock<Vec<AuditEntry>>>,
    cancel_log: Arc<RwLock<Vec<CancelLogEntry>>>,
    /// Mutations hold it shared; compaction holds it exclusively.
    compaction_gate: Arc<RwLock<()>>,
    clock: Arc<dyn Clock>,
}

/// Apply an event to its day. The caller holds the day lock.
fn apply_to_day(
    ds: &mut DayState,
    event: &Event,
    entity_map: &DashMap<Ulid, NaiveDate>,
) -> Option<LogEntry> {
    match event {
        Event::ReservationBooked { reservation } => {
            entity_map.insert(reservation.id, reservation.date);
            ds.reservations.push(reservation.clone());
            ds.issued += 1;
            None
        }
        Event::ReservationCancelled {
            id,
            date,
            user_id,
            reason,
            cancelled_at,
        } => {
            let r = ds.reservations.iter_mut().find(|r| r.id == *id)?;
            r.status = ReservationStatus::Cancelled;
            r.cancel_reason = reason.clone();
            r.cancelled_at = Some(*cancelled_at);
            Some(LogEntry::Cancel(CancelLogEntry {
                reservation_id: *id,
                user_id: *user_id,
                reason: reason.clone(),
                reservation_date: *date,
                cancelled_at: *cancelled_at,
            }))
        }
        Event::SlotClosed { closure } => {
            entity_map.insert(closure.id, closure.date);
            ds.closures.push(closure.clone());
            None
        }
        Event::SlotOpened {
            id,
            opened_by,
            opened_reason,
            opened_at,
            audit_id,
            ..
        } => {
            let c = ds
                .closures
                .iter_mut()
                .find(|c| c.id == *id && c.is_active())?;
            let snapshot = ClosureSnapshot {
                id: c.id,
                date: c.date,
                start_time: c.start_time,
                end_time: c.end_time,
                reason: c.reason.clone(),
                status_before: c.status,
                created_at: c.created_at,
                opened_reason: opened_reason.clone(),
            };
            c.status = ClosureStatus::Opened;
            c.opened_reason = Some(opened_reason.clone());
            c.opened_at = Some(*opened_at);
            Some(LogEntry::Audit(AuditEntry {
                id: *audit_id,
                actor_id: *opened_by,
                operation: AuditOperation::OpenClosedSlot,
                target_id: *id,
                snapshot,
                created_at: *opened_at,
            }))
        }
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let entity_to_date = DashMap::new();
        let mut days: HashMap<NaiveDate, DayState> = HashMap::new();
        let mut audit_log = Vec::new();
        let mut cancel_log = Vec::new();

        for event in &events {
            let date = event.date();
            let ds = days.entry(date).or_insert_with(|| DayState::new(date));
            match apply_to_day(ds, event, &entity_to_date) {
                Some(LogEntry::Audit(entry)) => audit_log.push(entry),
                Some(LogEntry::Cancel(entry)) => cancel_log.push(entry),
                None => {}
            }
        }
        tracing::info!(
            "replayed {} events across {} days from {}",
            events.len(),
            days.len(),
            wal_path.display()
        );

        let day_map = DashMap::new();
        for (date, ds) in days {
            day_map.insert(date, Arc::new(RwLock::new(ds)));
        }
        metrics::gauge!(crate::observability::DAYS_LOADED).set(day_map.len() as f64);

        Ok(Self {
            days: day_map,
            wal_tx,
            entity_to_date: Arc::new(entity_to_date),
            audit_log: Arc::new(RwLock::new(audit_log)),
            cancel_log: Arc::new(RwLock::new(cancel_log)),
            compaction_gate: Arc::new(RwLock::new(())),
            clock,
        })
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Shared hold on the compaction gate, owned so it can travel with a commit.
    pub(super) async fn enter_gate(&self) -> OwnedRwLockReadGuard<()> {
        self.compaction_gate.clone().read_owned().await
    }

    pub fn get_day(&self, date: &NaiveDate) -> Option<SharedDayState> {
        self.days.get(date).map(|e| e.value().clone())
    }

    pub(super) fn day_or_insert(&self, date: NaiveDate) -> SharedDayState {
        let day = self
            .days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(date))))
            .value()
            .clone();
        metrics::gauge!(crate::observability::DAYS_LOADED).set(self.days.len() as f64);
        day
    }

    /// All loaded day partitions, ascending by date. Clones the handles so no
    /// map guard is held across an await.
    pub(super) fn day_handles(&self) -> Vec<(NaiveDate, SharedDayState)> {
        let mut handles: Vec<_> = self
            .days
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        handles.sort_by_key(|(date, _)| *date);
        handles
    }

    pub fn date_of_entity(&self, entity_id: &Ulid) -> Option<NaiveDate> {
        self.entity_to_date.get(entity_id).map(|e| *e.value())
    }

    /// Lookup entity → date, acquire that day's write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<DayState>, EngineError> {
        let date = self
            .date_of_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let day = self
            .get_day(&date)
            .ok_or(EngineError::NotFound(*entity_id))?;
        Ok(day.write_owned().await)
    }

    /// WAL-append then apply, recording any derived log entry.
    ///
    /// Runs on its own task that owns the day lock and the gate, so a caller
    /// dropped mid-commit cannot leave an event durable but unapplied. The
    /// guard comes back for reading the result.
    pub(super) async fn commit(
        &self,
        mut guard: OwnedRwLockWriteGuard<DayState>,
        gate: OwnedRwLockReadGuard<()>,
        event: Event,
    ) -> Result<OwnedRwLockWriteGuard<DayState>, EngineError> {
        let wal_tx = self.wal_tx.clone();
        let entity_map = self.entity_to_date.clone();
        let audit_log = self.audit_log.clone();
        let cancel_log = self.cancel_log.clone();
        let task = tokio::spawn(async move {
            let _gate = gate;
            wal_append(&wal_tx, &event).await?;
            match apply_to_day(&mut guard, &event, &entity_map) {
                Some(LogEntry::Audit(entry)) => audit_log.write().await.push(entry),
                Some(LogEntry::Cancel(entry)) => cancel_log.write().await.push(entry),
                None => {}
            }
            Ok::<_, EngineError>(guard)
        });
        task.await
            .map_err(|e| EngineError::Storage(format!("commit task failed: {e}")))?
    }

    pub(super) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(super) fn today(&self) -> NaiveDate {
        self.clock.today()
    }
}
