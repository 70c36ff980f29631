//! Single-row application settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
/// Gateway-wide knobs an admin can flip at runtime.
pub struct AppSettings {
    /// When true, every resolved policy behaves as auto-disconnect regardless
    /// of its row value.
    pub global_ephemeral: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            global_ephemeral: false,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
/// Admin request body for `PUT /api/admin/settings`.
pub struct UpdateSettingsRequest {
    pub global_ephemeral: bool,
}
