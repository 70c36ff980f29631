use axum::{
    extract::{Extension, Query, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::{
    error::AppError,
    models::{
        active_connection::ActiveConnectionView,
        activity::{ActivityFilter, IntegrationActivity},
        settings::{AppSettings, UpdateSettingsRequest},
        user::User,
        PaginatedResponse, PaginationQuery,
    },
    state::AppState,
    utils::csv::append_csv_row,
};

/// GET /api/admin/settings
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(_admin): Extension<User>,
) -> Result<Json<AppSettings>, AppError> {
    let settings = state.store.get_settings().await?;
    Ok(Json(settings))
}

/// PUT /api/admin/settings
///
/// Flipping `global_ephemeral` on makes every policy behave as
/// auto-disconnect from the next gateway call onward. Existing leases are
/// not revoked here; they simply stop mattering.
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
    Json(body): Json<UpdateSettingsRequest>,
) -> Result<Json<AppSettings>, AppError> {
    let settings = state.store.update_settings(body.global_ephemeral).await?;
    tracing::info!(
        admin = %admin.id,
        global_ephemeral = settings.global_ephemeral,
        "gateway settings updated"
    );
    Ok(Json(settings))
}

/// GET /api/admin/activities
///
/// The whole ledger, filterable by user, provider and outcome. Filters and
/// pagination arrive as separate query structs; serde's flatten does not
/// survive the urlencoded deserializer.
pub async fn list_all_activities(
    State(state): State<AppState>,
    Extension(_admin): Extension<User>,
    Query(filter): Query<ActivityFilter>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PaginatedResponse<IntegrationActivity>>, AppError> {
    let (activities, total) = state.store.list_all_activities(&filter, &page).await?;
    Ok(Json(PaginatedResponse::new(
        activities,
        total,
        page.limit(),
        page.offset(),
    )))
}

/// GET /api/admin/activities/export
///
/// Same filters as the listing, but the whole result set as CSV. The store
/// caps a page at 500 rows, so the handler pages through and stitches.
pub async fn export_activities(
    State(state): State<AppState>,
    Extension(_admin): Extension<User>,
    Query(filter): Query<ActivityFilter>,
) -> Result<Json<Value>, AppError> {
    let mut rows: Vec<IntegrationActivity> = Vec::new();
    let mut page = PaginationQuery {
        limit: 500,
        offset: 0,
    };
    loop {
        let (batch, _total) = state.store.list_all_activities(&filter, &page).await?;
        let batch_len = batch.len() as i64;
        rows.extend(batch);
        if batch_len < page.limit() {
            break;
        }
        page.offset += page.limit();
    }

    let csv_data = tokio::task::spawn_blocking(move || {
        let mut csv = String::new();
        append_csv_row(
            &mut csv,
            &[
                "Id".to_string(),
                "User Id".to_string(),
                "Provider".to_string(),
                "Action".to_string(),
                "Outcome".to_string(),
                "Content Preview".to_string(),
                "Target Ref".to_string(),
                "External URL".to_string(),
                "Error".to_string(),
                "Occurred At".to_string(),
            ],
        );

        for row in rows {
            append_csv_row(
                &mut csv,
                &[
                    row.id.to_string(),
                    row.user_id.to_string(),
                    row.provider.as_str().to_string(),
                    row.action.as_str().to_string(),
                    row.outcome.as_str().to_string(),
                    row.content_preview.unwrap_or_default(),
                    row.target_ref.unwrap_or_default(),
                    row.external_url.unwrap_or_default(),
                    row.error.unwrap_or_default(),
                    row.occurred_at.to_rfc3339(),
                ],
            );
        }
        csv
    })
    .await
    .map_err(|e| AppError::InternalServerError(e.into()))?;

    Ok(Json(json!({
        "csv_data": csv_data,
        "filename": format!("activity_export_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"))
    })))
}

/// GET /api/admin/connections
///
/// Active connections across all users. Each row is labelled with the
/// duration its user's current policy grants; rows orphaned by a deleted
/// user or policy say "unknown".
pub async fn list_all_connections(
    State(state): State<AppState>,
    Extension(_admin): Extension<User>,
) -> Result<Json<Vec<ActiveConnectionView>>, AppError> {
    let rows = state.store.list_active_connections().await?;
    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let label = match state.store.get_user(row.user_id).await? {
            Some(owner) => state
                .store
                .get_policy(owner.role, row.provider)
                .await?
                .map(|policy| policy.duration_label())
                .unwrap_or_else(|| "unknown".to_string()),
            None => "unknown".to_string(),
        };
        views.push(ActiveConnectionView::new(row, label));
    }
    Ok(Json(views))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearConnectionsResponse {
    /// Number of rows removed.
    pub cleared: u64,
}

/// DELETE /api/admin/connections
///
/// Emergency lever: drops every active-connection row at once. Vault
/// entries survive; the next gateway call re-evaluates policy from scratch.
pub async fn clear_all_connections(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
) -> Result<Json<ClearConnectionsResponse>, AppError> {
    let cleared = state.store.clear_active_connections().await?;
    tracing::warn!(admin = %admin.id, cleared, "all active connections cleared");
    Ok(Json(ClearConnectionsResponse { cleared }))
}
