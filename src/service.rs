use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::auth::{authorize, Capability, ClientProfile, Directory, Principal};
use crate::calendar::SystemClock;
use crate::compactor;
use crate::config::Config;
use crate::engine::{
    BookingRequest, ClosureRequest, Engine, EngineError, PackingList, ResolveOptions,
};
use crate::files::{FileStore, LocalFileStore, StoredFile};
use crate::model::*;
use crate::notify::{self, NoopNotifier, Notifier, NotifyError, WebhookNotifier};
use crate::observability::{OPERATIONS_TOTAL, OPERATION_DURATION_SECONDS, REJECTIONS_TOTAL};

/// A packing list as received from the client, not yet stored.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct BookingForm {
    pub date: NaiveDate,
    pub start_time: String,
    pub container_no: String,
    pub upload: Option<Upload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientDashboard {
    pub overview: Vec<DayOverview>,
    /// Every status, newest date first.
    pub my_reservations: Vec<Reservation>,
}

/// A reservation next to its owner's contact details, for staff views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationListing {
    pub reservation: Reservation,
    /// `None` when the directory no longer knows the owner.
    pub client: Option<ClientProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminOverview {
    pub overview: Vec<DayOverview>,
    pub reservations: Vec<ReservationListing>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("storage: {0}")]
    Io(#[from] io::Error),
    #[error("notifier: {0}")]
    Notifier(#[from] NotifyError),
}

/// Record outcome and latency of one service operation.
async fn observe<T>(
    operation: &'static str,
    fut: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    let start = Instant::now();
    let result = fut.await;
    let status = match &result {
        Ok(_) => "ok",
        Err(e) if e.is_rejection() => "rejected",
        Err(_) => "error",
    };
    metrics::counter!(OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        if e.is_rejection() {
            metrics::counter!(REJECTIONS_TOTAL, "code" => e.code()).increment(1);
            debug!("{operation} rejected: {e}");
        } else {
            tracing::error!("{operation} failed: {e}");
        }
    }
    result
}

fn storage_error(e: io::Error) -> EngineError {
    EngineError::Storage(e.to_string())
}

/// The role-checked entry point for every caller. Each operation authorizes
/// once, then delegates to the engine and collaborators.
pub struct BookingService {
    engine: Arc<Engine>,
    files: Arc<dyn FileStore>,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn Directory>,
    notify_timeout: Duration,
}

impl BookingService {
    pub fn new(
        engine: Arc<Engine>,
        files: Arc<dyn FileStore>,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            engine,
            files,
            notifier,
            directory,
            notify_timeout: Config::default().webhook_timeout,
        }
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Build the whole stack from configuration: replay the WAL, start the
    /// compactor, pick the notifier. Must run inside a Tokio runtime.
    pub fn from_config(config: &Config, directory: Arc<dyn Directory>) -> Result<Self, StartupError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let clock = Arc::new(SystemClock::new(config.utc_offset_minutes));
        let engine = Arc::new(Engine::new(config.wal_path(), clock)?);

        let compactor_engine = engine.clone();
        let threshold = config.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        let notifier: Arc<dyn Notifier> = match &config.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone(), config.webhook_timeout)?),
            None => Arc::new(NoopNotifier),
        };
        let files = Arc::new(LocalFileStore::new(config.upload_root.clone()));
        tracing::info!(
            "dockslot ready: wal {}, uploads under {}, notifications {}",
            config.wal_path().display(),
            config.upload_root.display(),
            if config.webhook_url.is_some() { "enabled" } else { "disabled" }
        );
        Ok(Self::new(engine, files, notifier, directory).with_notify_timeout(config.webhook_timeout))
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn grid_options(principal: &Principal) -> ResolveOptions {
        if principal.role.allows(Capability::ViewCancelledSlots) {
            ResolveOptions::ADMIN
        } else {
            ResolveOptions::CLIENT
        }
    }

    async fn with_profiles(&self, reservations: Vec<Reservation>) -> Vec<ReservationListing> {
        let mut out = Vec::with_capacity(reservations.len());
        for reservation in reservations {
            let client = self.directory.profile(reservation.user_id).await;
            out.push(ReservationListing { reservation, client });
        }
        out
    }

    // ── Reads ────────────────────────────────────────────

    /// The slot grid, rendered for the caller's role.
    pub async fn slot_overview(
        &self,
        session: Option<&Principal>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DayOverview>, EngineError> {
        observe("slot_overview", async {
            let principal = authorize(session, Capability::ViewSlots)?;
            self.engine.overview(start, end, Self::grid_options(principal)).await
        })
        .await
    }

    pub async fn client_dashboard(
        &self,
        session: Option<&Principal>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ClientDashboard, EngineError> {
        observe("client_dashboard", async {
            let principal = authorize(session, Capability::ViewOwnReservations)?;
            let overview = self.engine.overview(start, end, ResolveOptions::CLIENT).await?;
            let my_reservations = self.engine.reservations_for_user(principal.user_id).await;
            Ok(ClientDashboard {
                overview,
                my_reservations,
            })
        })
        .await
    }

    pub async fn admin_overview(
        &self,
        session: Option<&Principal>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AdminOverview, EngineError> {
        observe("admin_overview", async {
            authorize(session, Capability::ViewCancelledSlots)?;
            let overview = self.engine.overview(start, end, ResolveOptions::ADMIN).await?;
            let reservations = self.engine.reservations_in_range(start, end).await?;
            Ok(AdminOverview {
                overview,
                reservations: self.with_profiles(reservations).await,
            })
        })
        .await
    }

    /// Every reservation in the range with its owner, for operators and admins.
    pub async fn reservations(
        &self,
        session: Option<&Principal>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ReservationListing>, EngineError> {
        observe("reservations", async {
            authorize(session, Capability::ViewAllReservations)?;
            let reservations = self.engine.reservations_in_range(start, end).await?;
            Ok(self.with_profiles(reservations).await)
        })
        .await
    }

    /// The client roster, newest account first.
    pub async fn clients(
        &self,
        session: Option<&Principal>,
    ) -> Result<Vec<ClientProfile>, EngineError> {
        observe("clients", async {
            authorize(session, Capability::ViewClients)?;
            Ok(self.directory.clients().await)
        })
        .await
    }

    pub async fn closures(&self, session: Option<&Principal>) -> Result<Vec<ClosedSlot>, EngineError> {
        observe("closures", async {
            authorize(session, Capability::ViewClosures)?;
            Ok(self.engine.closures().await)
        })
        .await
    }

    /// Clients may only fetch their own; a foreign id looks missing.
    pub async fn packing_list(
        &self,
        session: Option<&Principal>,
        reservation_id: Ulid,
    ) -> Result<StoredFile, EngineError> {
        observe("packing_list", async {
            let principal = authorize(session, Capability::ViewPackingLists)?;
            let reservation = self
                .engine
                .get_reservation(&reservation_id)
                .await
                .ok_or(EngineError::NotFound(reservation_id))?;
            let sees_all = principal.role.allows(Capability::ViewAllReservations);
            if !sees_all && reservation.user_id != principal.user_id {
                return Err(EngineError::NotFound(reservation_id));
            }
            self.files
                .fetch(&reservation.packing_list)
                .await
                .map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => EngineError::NotFound(reservation_id),
                    io::ErrorKind::InvalidInput => {
                        warn!(
                            "reservation {reservation_id} has an unusable packing list reference"
                        );
                        EngineError::NotFound(reservation_id)
                    }
                    _ => storage_error(e),
                })
        })
        .await
    }

    pub async fn audit_log(&self, session: Option<&Principal>) -> Result<Vec<AuditEntry>, EngineError> {
        observe("audit_log", async {
            authorize(session, Capability::ViewLogs)?;
            Ok(self.engine.audit_log().await)
        })
        .await
    }

    pub async fn cancel_log(
        &self,
        session: Option<&Principal>,
    ) -> Result<Vec<CancelLogEntry>, EngineError> {
        observe("cancel_log", async {
            authorize(session, Capability::ViewLogs)?;
            Ok(self.engine.cancel_log().await)
        })
        .await
    }

    // ── Writes ───────────────────────────────────────────

    /// Check date and window, store the upload, run the booking guard, then
    /// notify staff without waiting. A rejected booking removes the file it stored.
    pub async fn book(
        &self,
        session: Option<&Principal>,
        form: BookingForm,
    ) -> Result<Reservation, EngineError> {
        observe("book", async {
            let user_id = authorize(session, Capability::Book)?.user_id;
            let BookingForm {
                date,
                start_time,
                container_no,
                upload,
            } = form;
            self.engine.bookable_window(date, &start_time)?;

            let packing_list = match upload {
                Some(upload) => Some(self.store_upload(user_id, upload).await?),
                None => None,
            };
            let stored = packing_list.as_ref().map(|p| p.reference.clone());
            let request = BookingRequest {
                date,
                start_time,
                container_no,
                packing_list,
            };

            match self.engine.attempt_book(request, user_id).await {
                Ok(reservation) => {
                    self.announce(&reservation).await;
                    Ok(reservation)
                }
                Err(e) => {
                    if let Some(reference) = stored {
                        self.discard_upload(&reference).await;
                    }
                    Err(e)
                }
            }
        })
        .await
    }

    async fn store_upload(&self, user_id: UserId, upload: Upload) -> Result<PackingList, EngineError> {
        let size = upload.bytes.len() as u64;
        let reference = self
            .files
            .store(user_id, &upload.file_name, upload.bytes)
            .await
            .map_err(storage_error)?;
        Ok(PackingList {
            reference,
            file_name: upload.file_name,
            size,
        })
    }

    async fn discard_upload(&self, reference: &StoredRef) {
        match self.files.remove(reference).await {
            Ok(()) => debug!("removed orphaned upload {reference}"),
            Err(e) => warn!("could not remove orphaned upload {reference}: {e}"),
        }
    }

    async fn announce(&self, reservation: &Reservation) {
        match self.directory.profile(reservation.user_id).await {
            Some(profile) => {
                let message = notify::booking_message(&profile, reservation);
                let _ = notify::dispatch(self.notifier.clone(), message, self.notify_timeout);
            }
            None => debug!(
                "no profile for user {}, skipping booking notification",
                reservation.user_id
            ),
        }
    }

    pub async fn cancel(
        &self,
        session: Option<&Principal>,
        reservation_id: Ulid,
        reason: Option<String>,
    ) -> Result<Reservation, EngineError> {
        observe("cancel", async {
            let user_id = authorize(session, Capability::Cancel)?.user_id;
            self.engine.attempt_cancel(reservation_id, reason, user_id).await
        })
        .await
    }

    pub async fn close_slot(
        &self,
        session: Option<&Principal>,
        request: ClosureRequest,
    ) -> Result<ClosedSlot, EngineError> {
        observe("close_slot", async {
            let admin_id = authorize(session, Capability::ManageClosures)?.user_id;
            self.engine.attempt_close(request, admin_id).await
        })
        .await
    }

    pub async fn open_slot(
        &self,
        session: Option<&Principal>,
        closure_id: Ulid,
        opened_reason: String,
    ) -> Result<ClosedSlot, EngineError> {
        observe("open_slot", async {
            let admin_id = authorize(session, Capability::ManageClosures)?.user_id;
            self.engine.attempt_open(closure_id, opened_reason, admin_id).await
        })
        .await
    }
}
