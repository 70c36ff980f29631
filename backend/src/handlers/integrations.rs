use axum::{
    extract::{Extension, Path, Query, State},
    response::Html,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::{AppError, GatewayError},
    models::{
        active_connection::ActiveConnectionView,
        oauth_connection::ConnectionSummary,
        provider::{ActionKind, Provider},
        user::User,
    },
    providers::{ProviderIdentity, ProviderInfo},
    services::{ActionOutcome, ActionRequest, AuthorizationOutcome, AuthorizationStart},
    state::AppState,
};

/// Resolves a `{provider}` path segment. Unknown names are a 404, not a 400:
/// the segment addresses a resource in the catalog.
pub(crate) fn parse_provider(raw: &str) -> Result<Provider, AppError> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("Provider '{raw}' not found")))
}

/// GET /api/integrations/providers
pub async fn list_providers(
    State(state): State<AppState>,
    Extension(_user): Extension<User>,
) -> Json<Vec<ProviderInfo>> {
    Json(state.registry.catalog())
}

/// GET /api/integrations/{provider}/authorize
///
/// Starts an interactive grant. The caller opens `auth_url` in a browser and
/// then either polls `/authorize/wait` with the returned state or exchanges
/// the code directly via `/token`.
pub async fn authorize(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(provider): Path<String>,
) -> Result<Json<AuthorizationStart>, AppError> {
    let provider = parse_provider(&provider)?;
    let start = state.mediator.begin_authorization(user.id, provider)?;
    Ok(Json(start))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WaitQuery {
    /// State token returned by the authorize call.
    pub state: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WaitResponse {
    pub status: String,
    pub connection: ConnectionSummary,
}

/// GET /api/integrations/{provider}/authorize/wait
///
/// Blocks until the browser lands on the callback or the wait window
/// elapses. A cancelled or abandoned grant surfaces as 408.
pub async fn authorize_wait(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(provider): Path<String>,
    Query(query): Query<WaitQuery>,
) -> Result<Json<WaitResponse>, AppError> {
    let provider = parse_provider(&provider)?;
    match state
        .mediator
        .await_authorization(user.id, provider, &query.state)
        .await?
    {
        AuthorizationOutcome::Completed(connection) => Ok(Json(WaitResponse {
            status: "completed".to_string(),
            connection,
        })),
        AuthorizationOutcome::Cancelled => Err(GatewayError::Cancelled.into()),
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub state: String,
    pub code: Option<String>,
    /// Set by the provider when the user declines the consent screen.
    pub error: Option<String>,
}

/// GET /api/integrations/{provider}/callback
///
/// Landing page for the provider redirect. Unauthenticated: the browser
/// session completing the consent screen carries no bearer token. The state
/// token is the only thing tying the redirect to a pending authorization.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Html<String>, AppError> {
    let provider = parse_provider(&provider)?;
    let outcome = state
        .mediator
        .resolve_callback(
            provider,
            &query.state,
            query.code.as_deref(),
            query.error.as_deref(),
        )
        .await?;

    let message = match outcome {
        AuthorizationOutcome::Completed(_) => "Authorization complete. You can close this window.",
        AuthorizationOutcome::Cancelled => {
            "Authorization was cancelled. You can close this window."
        }
    };
    Ok(Html(callback_page(provider, message)))
}

fn callback_page(provider: Provider, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{} — authorization</title></head>\n\
         <body>\n<p>{}</p>\n<script>window.close();</script>\n</body>\n</html>\n",
        provider.display_name(),
        message
    )
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TokenExchangeRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub code: String,
    /// Must match the redirect URI the provider saw during authorization.
    /// Defaults to the gateway's own callback URL.
    pub redirect_uri: Option<String>,
}

/// POST /api/integrations/{provider}/token
///
/// Exchanges an authorization code for a stored connection. Used by callers
/// that drive the browser themselves instead of going through the callback.
pub async fn exchange_token(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(provider): Path<String>,
    Json(body): Json<TokenExchangeRequest>,
) -> Result<Json<ConnectionSummary>, AppError> {
    let provider = parse_provider(&provider)?;
    body.validate()?;
    let redirect_uri = body
        .redirect_uri
        .clone()
        .unwrap_or_else(|| state.config.callback_url(provider.as_str()));
    let connection = state
        .mediator
        .complete_authorization(user.id, provider, &body.code, &redirect_uri)
        .await?;
    Ok(Json(ConnectionSummary::from(&connection)))
}

/// POST /api/integrations/{provider}/content
///
/// The policy-gated write path. Everything here runs through the gateway:
/// policy resolution, token lookup, the provider call and the ledger write.
pub async fn perform_content_action(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(provider): Path<String>,
    Json(body): Json<ActionRequest>,
) -> Result<Json<ActionOutcome>, AppError> {
    let provider = parse_provider(&provider)?;
    body.validate()?;
    if !body.action.is_content_action() {
        return Err(AppError::BadRequest(
            "action must be one of create, update, append".to_string(),
        ));
    }
    if matches!(body.action, ActionKind::Update | ActionKind::Append)
        && body.target_ref.as_deref().map_or(true, str::is_empty)
    {
        return Err(AppError::BadRequest(format!(
            "{} requires target_ref",
            body.action.as_str()
        )));
    }
    let outcome = state.gateway.perform_action(user.id, provider, &body).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WhoamiQuery {
    /// Validate this token instead of the stored credential.
    pub access_token: Option<String>,
}

/// GET /api/integrations/{provider}/whoami
pub async fn whoami(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(provider): Path<String>,
    Query(query): Query<WhoamiQuery>,
) -> Result<Json<ProviderIdentity>, AppError> {
    let provider = parse_provider(&provider)?;
    let identity = state
        .gateway
        .whoami(user.id, provider, query.access_token.as_deref())
        .await?;
    Ok(Json(identity))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DisconnectResponse {
    /// False when there was nothing to remove.
    pub disconnected: bool,
}

/// DELETE /api/integrations/{provider}/connection
pub async fn disconnect(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(provider): Path<String>,
) -> Result<Json<DisconnectResponse>, AppError> {
    let provider = parse_provider(&provider)?;
    let disconnected = state.mediator.disconnect(user.id, provider).await?;
    Ok(Json(DisconnectResponse { disconnected }))
}

/// GET /api/integrations/connections
///
/// The caller's own active connections, labelled with the duration the
/// governing policy grants. Rows whose policy has since been deleted get
/// an "unknown" label rather than a guess.
pub async fn list_connections(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<ActiveConnectionView>>, AppError> {
    let rows = state.store.list_active_connections_for_user(user.id).await?;
    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let label = state
            .store
            .get_policy(user.role, row.provider)
            .await?
            .map(|policy| policy.duration_label())
            .unwrap_or_else(|| "unknown".to_string());
        views.push(ActiveConnectionView::new(row, label));
    }
    Ok(Json(views))
}
