//! Connection policy rows and the lease value derived from them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::provider::Provider;
use crate::models::user::UserRole;

/// Hour count that marks a connection as never-expiring. Stored as-is in the
/// policy row; resolution maps it to [`ConnectionLease::Persistent`], not to a
/// one-year lease.
pub const PERSISTENT_HOURS: i32 = 8760;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
/// One (role, provider) policy row. Missing rows deny by default; these rows
/// only ever widen access.
pub struct ConnectionPolicy {
    /// Role the policy applies to.
    pub role: UserRole,
    /// Provider the policy applies to.
    pub provider: Provider,
    /// Whether the pair may use the gateway at all.
    pub allowed: bool,
    /// When set, every use requires a fresh OAuth grant and the credential is
    /// discarded after one action.
    pub auto_disconnect: bool,
    /// Lease length in hours. 0 pairs with auto_disconnect; 8760 means
    /// persistent.
    pub connection_duration_hours: i32,
    /// Timestamp of the last admin edit.
    pub updated_at: DateTime<Utc>,
}

impl ConnectionPolicy {
    /// Lease implied by this row's hour count, anchored at `now` for timed
    /// leases.
    pub fn lease(&self, now: DateTime<Utc>) -> ConnectionLease {
        ConnectionLease::from_hours(self.connection_duration_hours, now)
    }

    /// Short human label for connection listings ("24h", "permanent", ...).
    pub fn duration_label(&self) -> String {
        if self.auto_disconnect || self.connection_duration_hours == 0 {
            "single use".to_string()
        } else if self.connection_duration_hours >= PERSISTENT_HOURS {
            "permanent".to_string()
        } else {
            format!("{}h", self.connection_duration_hours)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How long a successfully used connection stays live.
pub enum ConnectionLease {
    /// No persistence at all; the credential is single-use.
    Ephemeral,
    /// Live until the given instant.
    Timed(DateTime<Utc>),
    /// Live until disconnected or cleared.
    Persistent,
}

impl ConnectionLease {
    /// Maps a policy hour count to a lease. 0 is ephemeral, 8760 and above is
    /// persistent (validation rejects >8760 before rows are written, so the
    /// `>=` here only matters for pre-validation data).
    pub fn from_hours(hours: i32, now: DateTime<Utc>) -> Self {
        if hours <= 0 {
            ConnectionLease::Ephemeral
        } else if hours >= PERSISTENT_HOURS {
            ConnectionLease::Persistent
        } else {
            ConnectionLease::Timed(now + Duration::hours(i64::from(hours)))
        }
    }

    /// Expiry column value for an active-connection row. `None` for both
    /// persistent (never expires) and ephemeral (never written).
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ConnectionLease::Timed(at) => Some(*at),
            ConnectionLease::Ephemeral | ConnectionLease::Persistent => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
/// Admin request body for `PUT /api/policies/{role}/{provider}`.
pub struct UpdatePolicyRequest {
    /// Whether the pair may use the gateway.
    pub allowed: bool,
    /// Require a fresh grant per use.
    pub auto_disconnect: bool,
    /// Lease hours; 0 = none, 8760 = persistent. Values above 8760 are
    /// rejected rather than clamped.
    #[validate(range(min = 0, max = 8760, message = "must be between 0 and 8760"))]
    pub connection_duration_hours: i32,
}
