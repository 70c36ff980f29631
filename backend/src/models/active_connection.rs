//! Models for tracking currently-live provider connections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::provider::Provider;
use crate::types::{ActiveConnectionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
/// Stored lifecycle states. Expiry and force-close are not stored states:
/// expired rows are derived from `expires_at` and then reaped, force-closed
/// rows are simply deleted.
pub enum ConnectionStatus {
    /// OAuth grant completed, no gateway action performed yet.
    Pending,
    /// At least one gateway action succeeded on this connection.
    Active,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Active => "active",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
/// Database representation of a live, non-auto-disconnect connection. One
/// row per (user, provider).
pub struct ActiveConnection {
    /// Unique identifier for the connection record.
    pub id: ActiveConnectionId,
    /// Owning user.
    pub user_id: UserId,
    /// Connected provider.
    pub provider: Provider,
    /// Current lifecycle state.
    pub status: ConnectionStatus,
    /// When the OAuth grant completed.
    pub connected_at: DateTime<Utc>,
    /// When the gateway last acted on this connection.
    pub last_used_at: Option<DateTime<Utc>>,
    /// When the lease runs out. NULL for persistent connections.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ActiveConnection {
    /// A row past its expiry is dead even if the sweep has not reaped it yet.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

#[derive(Debug, Clone)]
/// Upsert payload keyed (user, provider); re-connecting replaces the prior
/// row's status and expiry.
pub struct NewActiveConnection {
    pub user_id: UserId,
    pub provider: Provider,
    pub status: ConnectionStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Connection listing entry with the policy-derived duration label attached.
pub struct ActiveConnectionView {
    pub id: ActiveConnectionId,
    pub user_id: UserId,
    pub provider: Provider,
    pub status: ConnectionStatus,
    pub connected_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// "24h", "permanent", etc. from the governing policy.
    pub duration_label: String,
}

impl ActiveConnectionView {
    pub fn new(conn: ActiveConnection, duration_label: String) -> Self {
        ActiveConnectionView {
            id: conn.id,
            user_id: conn.user_id,
            provider: conn.provider,
            status: conn.status,
            connected_at: conn.connected_at,
            last_used_at: conn.last_used_at,
            expires_at: conn.expires_at,
            duration_label,
        }
    }
}
