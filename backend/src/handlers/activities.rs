use axum::{
    extract::{Extension, Query, State},
    Json,
};

use crate::{
    error::AppError,
    models::{activity::IntegrationActivity, user::User, PaginatedResponse, PaginationQuery},
    state::AppState,
};

/// GET /api/activities
///
/// The caller's slice of the ledger, newest first. Denied and failed
/// attempts are in here too; the ledger records attempts, not successes.
pub async fn list_activities(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PaginatedResponse<IntegrationActivity>>, AppError> {
    let (activities, total) = state.store.list_activities_for_user(user.id, &page).await?;
    Ok(Json(PaginatedResponse::new(
        activities,
        total,
        page.limit(),
        page.offset(),
    )))
}
