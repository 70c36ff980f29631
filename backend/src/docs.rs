#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    handlers::{
        admin::ClearConnectionsResponse,
        integrations::{
            CallbackQuery, DisconnectResponse, TokenExchangeRequest, WaitQuery, WaitResponse,
            WhoamiQuery,
        },
    },
    models::{
        active_connection::{ActiveConnectionView, ConnectionStatus},
        activity::{ActivityFilter, ActivityOutcome, IntegrationActivity},
        oauth_connection::ConnectionSummary,
        policy::{ConnectionPolicy, UpdatePolicyRequest},
        provider::{ActionKind, Provider},
        settings::{AppSettings, UpdateSettingsRequest},
        user::UserRole,
        PaginatedResponse, PaginationQuery,
    },
    providers::{ProviderIdentity, ProviderInfo},
    services::{ActionOutcome, ActionRequest, AuthorizationStart},
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_doc,
        list_providers_doc,
        authorize_doc,
        authorize_wait_doc,
        oauth_callback_doc,
        exchange_token_doc,
        content_action_doc,
        whoami_doc,
        disconnect_doc,
        my_connections_doc,
        my_activities_doc,
        list_policies_doc,
        update_policy_doc,
        admin_get_settings_doc,
        admin_update_settings_doc,
        admin_activities_doc,
        admin_export_doc,
        admin_connections_doc,
        admin_clear_connections_doc
    ),
    components(
        schemas(
            // provider vocabulary
            Provider,
            ActionKind,
            ProviderInfo,
            ProviderIdentity,
            // oauth flow
            AuthorizationStart,
            WaitResponse,
            TokenExchangeRequest,
            ConnectionSummary,
            DisconnectResponse,
            // gateway
            ActionRequest,
            ActionOutcome,
            // ledger
            ActivityOutcome,
            IntegrationActivity,
            PaginatedResponse<IntegrationActivity>,
            // policies
            UserRole,
            ConnectionPolicy,
            UpdatePolicyRequest,
            // connections & admin
            ConnectionStatus,
            ActiveConnectionView,
            AppSettings,
            UpdateSettingsRequest,
            ClearConnectionsResponse
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Integrations", description = "Provider catalog, OAuth flow and the gated content path"),
        (name = "Activities", description = "Append-only ledger of gateway attempts"),
        (name = "Policies", description = "Role/provider connection policy matrix"),
        (name = "Admin", description = "Settings, ledger audit and connection bookkeeping")
    ),
    security(("BearerAuth" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();

        let mut bearer = Http::new(HttpAuthScheme::Bearer);
        bearer.bearer_format = Some("JWT".to_string());

        components.add_security_scheme("BearerAuth", SecurityScheme::Http(bearer));
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = serde_json::Value)),
    tag = "Integrations",
    security(())
)]
fn health_doc() {}

#[utoipa::path(
    get,
    path = "/api/integrations/providers",
    responses((status = 200, description = "Provider catalog", body = [ProviderInfo])),
    tag = "Integrations"
)]
fn list_providers_doc() {}

#[utoipa::path(
    get,
    path = "/api/integrations/{provider}/authorize",
    params(("provider" = String, Path, description = "Provider name, e.g. notion")),
    responses(
        (status = 200, description = "Consent URL and state token", body = AuthorizationStart),
        (status = 404, description = "Unknown provider")
    ),
    tag = "Integrations"
)]
fn authorize_doc() {}

#[utoipa::path(
    get,
    path = "/api/integrations/{provider}/authorize/wait",
    params(
        ("provider" = String, Path, description = "Provider name"),
        WaitQuery
    ),
    responses(
        (status = 200, description = "Grant completed", body = WaitResponse),
        (status = 408, description = "Grant cancelled or wait window elapsed")
    ),
    tag = "Integrations"
)]
fn authorize_wait_doc() {}

#[utoipa::path(
    get,
    path = "/api/integrations/{provider}/callback",
    params(
        ("provider" = String, Path, description = "Provider name"),
        CallbackQuery
    ),
    responses(
        (status = 200, description = "HTML landing page", body = String, content_type = "text/html"),
        (status = 404, description = "Unknown or expired state token")
    ),
    tag = "Integrations",
    security(())
)]
fn oauth_callback_doc() {}

#[utoipa::path(
    post,
    path = "/api/integrations/{provider}/token",
    params(("provider" = String, Path, description = "Provider name")),
    request_body = TokenExchangeRequest,
    responses(
        (status = 200, description = "Stored connection summary", body = ConnectionSummary),
        (status = 502, description = "Provider rejected the code exchange")
    ),
    tag = "Integrations"
)]
fn exchange_token_doc() {}

#[utoipa::path(
    post,
    path = "/api/integrations/{provider}/content",
    params(("provider" = String, Path, description = "Provider name")),
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Action performed", body = ActionOutcome),
        (status = 403, description = "Policy denied, or a fresh grant is required"),
        (status = 502, description = "Provider call failed")
    ),
    tag = "Integrations"
)]
fn content_action_doc() {}

#[utoipa::path(
    get,
    path = "/api/integrations/{provider}/whoami",
    params(
        ("provider" = String, Path, description = "Provider name"),
        WhoamiQuery
    ),
    responses(
        (status = 200, description = "Identity behind the token", body = ProviderIdentity),
        (status = 401, description = "No usable token")
    ),
    tag = "Integrations"
)]
fn whoami_doc() {}

#[utoipa::path(
    delete,
    path = "/api/integrations/{provider}/connection",
    params(("provider" = String, Path, description = "Provider name")),
    responses((status = 200, description = "Vault entry and active row removed", body = DisconnectResponse)),
    tag = "Integrations"
)]
fn disconnect_doc() {}

#[utoipa::path(
    get,
    path = "/api/integrations/connections",
    responses((status = 200, description = "Caller's active connections", body = [ActiveConnectionView])),
    tag = "Integrations"
)]
fn my_connections_doc() {}

#[utoipa::path(
    get,
    path = "/api/activities",
    params(PaginationQuery),
    responses((status = 200, description = "Caller's ledger slice", body = PaginatedResponse<IntegrationActivity>)),
    tag = "Activities"
)]
fn my_activities_doc() {}

#[utoipa::path(
    get,
    path = "/api/policies",
    responses((status = 200, description = "Full policy matrix", body = [ConnectionPolicy])),
    tag = "Policies"
)]
fn list_policies_doc() {}

#[utoipa::path(
    put,
    path = "/api/policies/{role}/{provider}",
    params(
        ("role" = String, Path, description = "Role name, e.g. sales"),
        ("provider" = String, Path, description = "Provider name")
    ),
    request_body = UpdatePolicyRequest,
    responses(
        (status = 200, description = "Stored policy row", body = ConnectionPolicy),
        (status = 400, description = "Unknown role/provider or out-of-range duration")
    ),
    tag = "Policies"
)]
fn update_policy_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/settings",
    responses((status = 200, description = "Current gateway settings", body = AppSettings)),
    tag = "Admin"
)]
fn admin_get_settings_doc() {}

#[utoipa::path(
    put,
    path = "/api/admin/settings",
    request_body = UpdateSettingsRequest,
    responses((status = 200, description = "Updated settings", body = AppSettings)),
    tag = "Admin"
)]
fn admin_update_settings_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/activities",
    params(ActivityFilter, PaginationQuery),
    responses((status = 200, description = "Filtered ledger page", body = PaginatedResponse<IntegrationActivity>)),
    tag = "Admin"
)]
fn admin_activities_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/activities/export",
    params(ActivityFilter),
    responses((status = 200, description = "CSV data wrapped in JSON", body = serde_json::Value)),
    tag = "Admin"
)]
fn admin_export_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/connections",
    responses((status = 200, description = "Active connections across all users", body = [ActiveConnectionView])),
    tag = "Admin"
)]
fn admin_connections_doc() {}

#[utoipa::path(
    delete,
    path = "/api/admin/connections",
    responses((status = 200, description = "Row count removed", body = ClearConnectionsResponse)),
    tag = "Admin"
)]
fn admin_clear_connections_doc() {}
