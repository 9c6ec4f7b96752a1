use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::model::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
    Operator,
}

/// The acting identity, as established by whoever authenticated the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Everything a caller can ask the service to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ViewSlots,
    /// See `cancelled` on the slot grid.
    ViewCancelledSlots,
    ViewOwnReservations,
    Book,
    Cancel,
    ViewAllReservations,
    ViewClosures,
    ManageClosures,
    ViewPackingLists,
    ViewLogs,
    /// The client roster with contact details.
    ViewClients,
}

impl Capability {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ViewSlots => "view_slots",
            Capability::ViewCancelledSlots => "view_cancelled_slots",
            Capability::ViewOwnReservations => "view_own_reservations",
            Capability::Book => "book",
            Capability::Cancel => "cancel",
            Capability::ViewAllReservations => "view_all_reservations",
            Capability::ViewClosures => "view_closures",
            Capability::ManageClosures => "manage_closures",
            Capability::ViewPackingLists => "view_packing_lists",
            Capability::ViewLogs => "view_logs",
            Capability::ViewClients => "view_clients",
        }
    }
}

impl Role {
    pub fn allows(self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::Client => matches!(
                capability,
                ViewSlots | ViewOwnReservations | Book | Cancel | ViewPackingLists
            ),
            Role::Operator => matches!(
                capability,
                ViewSlots | ViewAllReservations | ViewClosures | ViewPackingLists | ViewClients
            ),
            Role::Admin => matches!(
                capability,
                ViewSlots
                    | ViewCancelledSlots
                    | ViewAllReservations
                    | ViewClosures
                    | ManageClosures
                    | ViewPackingLists
                    | ViewLogs
            ),
        }
    }
}

/// Single authorization check at the service boundary. No session, or a role
/// without the capability, is `Unauthorized`.
pub fn authorize(
    session: Option<&Principal>,
    capability: Capability,
) -> Result<&Principal, EngineError> {
    match session {
        Some(p) if p.role.allows(capability) => Ok(p),
        Some(p) => {
            tracing::debug!(
                "user {} ({:?}) denied {}",
                p.user_id,
                p.role,
                capability.as_str()
            );
            Err(EngineError::Unauthorized)
        }
        None => Err(EngineError::Unauthorized),
    }
}

/// Contact details shown next to a client's reservations and in notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub user_id: UserId,
    /// Login name.
    pub username: String,
    pub display_name: String,
    pub company_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lookup of client profiles, owned by the account system.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn profile(&self, user_id: UserId) -> Option<ClientProfile>;

    /// Every client, most recently created first.
    async fn clients(&self) -> Vec<ClientProfile>;
}

/// In-memory directory, for embedding hosts with a fixed client list and for tests.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    profiles: HashMap<UserId, ClientProfile>,
}

impl StaticDirectory {
    pub fn new(profiles: impl IntoIterator<Item = ClientProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.user_id, p)).collect(),
        }
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn profile(&self, user_id: UserId) -> Option<ClientProfile> {
        self.profiles.get(&user_id).cloned()
    }

    async fn clients(&self) -> Vec<ClientProfile> {
        let mut all: Vec<ClientProfile> = self.profiles.values().cloned().collect();
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.user_id.cmp(&a.user_id))
        });
        all
    }
}
