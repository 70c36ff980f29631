//! Policy-gated gateway in front of external content providers.
//!
//! Every write to a provider goes through one enforcement path: resolve the
//! caller's role/provider policy, fetch a usable token from the vault, make
//! the provider call, and append the attempt to the activity ledger.

use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod services;
pub mod state;
pub mod store;
pub mod types;
pub mod utils;

pub use state::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Builds a CORS layer from the configured origin list. `"*"` anywhere in the
/// list means any origin.
fn cors_layer(state: &AppState) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(24 * 60 * 60));

    if state.config.cors_allow_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = state
        .config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(origins)
}

/// Assembles the full application router. Tests build the same router the
/// binary serves.
pub fn build_router(state: AppState) -> Router {
    let oauth_limiter = middleware::create_oauth_rate_limiter(&state.config);

    // The browser lands here straight from the provider; no bearer token.
    let public_routes = Router::new()
        .route(
            "/api/integrations/{provider}/callback",
            get(handlers::integrations::oauth_callback),
        )
        .layer(oauth_limiter.clone());

    // Grant initiation and code exchange share the per-IP limiter with the
    // callback. The limiter sits outside auth so unauthenticated bursts are
    // cut off before any token verification work.
    let oauth_routes = Router::new()
        .route(
            "/api/integrations/{provider}/authorize",
            get(handlers::integrations::authorize),
        )
        .route(
            "/api/integrations/{provider}/token",
            post(handlers::integrations::exchange_token),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth,
        ))
        .layer(oauth_limiter);

    // The gated write path additionally carries the per-user window.
    let content_routes = Router::new()
        .route(
            "/api/integrations/{provider}/content",
            post(handlers::integrations::perform_content_action),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::user_rate_limit,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth,
        ));

    let user_routes = Router::new()
        .route(
            "/api/integrations/providers",
            get(handlers::integrations::list_providers),
        )
        .route(
            "/api/integrations/connections",
            get(handlers::integrations::list_connections),
        )
        .route(
            "/api/integrations/{provider}/authorize/wait",
            get(handlers::integrations::authorize_wait),
        )
        .route(
            "/api/integrations/{provider}/whoami",
            get(handlers::integrations::whoami),
        )
        .route(
            "/api/integrations/{provider}/connection",
            delete(handlers::integrations::disconnect),
        )
        .route("/api/activities", get(handlers::activities::list_activities))
        .route("/api/policies", get(handlers::policies::list_policies))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth,
        ));

    let admin_routes = Router::new()
        .route(
            "/api/policies/{role}/{provider}",
            put(handlers::policies::update_policy),
        )
        .route(
            "/api/admin/settings",
            get(handlers::admin::get_settings).put(handlers::admin::update_settings),
        )
        .route(
            "/api/admin/activities",
            get(handlers::admin::list_all_activities),
        )
        .route(
            "/api/admin/activities/export",
            get(handlers::admin::export_activities),
        )
        .route(
            "/api/admin/connections",
            get(handlers::admin::list_all_connections)
                .delete(handlers::admin::clear_all_connections),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_admin,
        ));

    let cors = cors_layer(&state);

    Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        .merge(public_routes)
        .merge(oauth_routes)
        .merge(content_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(middleware::request_id))
                .layer(axum_middleware::from_fn(middleware::log_error_responses))
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
