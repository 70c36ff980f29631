use axum::{
    extract::{Extension, Path, State},
    Json,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        policy::{ConnectionPolicy, UpdatePolicyRequest},
        provider::Provider,
        user::{User, UserRole},
    },
    state::AppState,
};

/// GET /api/policies
///
/// The full role/provider matrix. Readable by any authenticated user so
/// clients can explain a denial before the gateway has to.
pub async fn list_policies(
    State(state): State<AppState>,
    Extension(_user): Extension<User>,
) -> Result<Json<Vec<ConnectionPolicy>>, AppError> {
    let policies = state.store.list_policies().await?;
    Ok(Json(policies))
}

/// PUT /api/policies/{role}/{provider}
///
/// Creates or replaces one cell of the matrix. Unknown role or provider
/// names are a 400: the editor is writing a rule, not addressing a row
/// that could exist.
pub async fn update_policy(
    State(state): State<AppState>,
    Extension(_admin): Extension<User>,
    Path((role, provider)): Path<(String, String)>,
    Json(body): Json<UpdatePolicyRequest>,
) -> Result<Json<ConnectionPolicy>, AppError> {
    let role = role
        .parse::<UserRole>()
        .map_err(|_| AppError::BadRequest(format!("Unknown role '{role}'")))?;
    let provider = provider
        .parse::<Provider>()
        .map_err(|_| AppError::BadRequest(format!("Unknown provider '{provider}'")))?;
    body.validate()?;

    let policy = state.store.upsert_policy(role, provider, &body).await?;
    tracing::info!(
        role = role.as_str(),
        provider = provider.as_str(),
        allowed = policy.allowed,
        auto_disconnect = policy.auto_disconnect,
        duration_hours = policy.connection_duration_hours,
        "connection policy updated"
    );
    Ok(Json(policy))
}
