#![allow(dead_code)]
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Extension, Router,
};
use ctor::ctor;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use tether_backend::{
    build_router,
    config::{Config, ProviderCredentials, StoreDriver},
    models::{
        policy::UpdatePolicyRequest,
        provider::Provider,
        user::{User, UserRole},
    },
    state::AppState,
    store::{MemoryStore, Store},
    utils::jwt::create_access_token,
};

#[ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tether_backend=debug")
        .with_test_writer()
        .try_init();
}

/// Memory-store config with unconfigured provider credentials, so the
/// registry falls back to demo adapters and the whole OAuth flow runs
/// without network I/O. Rate limits are set high enough to never trip.
pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/test".to_string(),
        jwt_secret: "a_secure_token_that_is_long_enough_123".to_string(),
        jwt_expiration_hours: 1,
        port: 3001,
        app_base_url: "http://localhost:3001".to_string(),
        store_driver: StoreDriver::Memory,
        notion: ProviderCredentials::default(),
        google: ProviderCredentials::default(),
        auth_wait_secs: 2,
        provider_timeout_secs: 5,
        cors_allow_origins: vec!["*".into()],
        rate_limit_user_max_requests: 1000,
        rate_limit_user_window_seconds: 3600,
        rate_limit_ip_max_requests: 1000,
        rate_limit_ip_window_seconds: 60,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub router: Router,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with_config(test_config())
}

/// Builds the production router over a fresh `MemoryStore`. The ConnectInfo
/// extension stands in for the socket address the per-IP limiter keys on,
/// matching what `into_make_service_with_connect_info` inserts in production.
pub fn spawn_app_with_config(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::build(store.clone(), config);
    let router = build_router(state.clone()).layer(Extension(ConnectInfo(SocketAddr::from((
        [127, 0, 0, 1],
        41000,
    )))));
    TestApp {
        state,
        store,
        router,
    }
}

pub async fn seed_user(store: &dyn Store, role: UserRole) -> User {
    let user = User::new(
        format!("user_{}@example.com", uuid::Uuid::new_v4()),
        "Test User".to_string(),
        role,
    );
    store.create_user(&user).await.expect("insert user");
    user
}

pub async fn seed_policy(
    store: &dyn Store,
    role: UserRole,
    provider: Provider,
    allowed: bool,
    auto_disconnect: bool,
    hours: i32,
) {
    store
        .upsert_policy(
            role,
            provider,
            &UpdatePolicyRequest {
                allowed,
                auto_disconnect,
                connection_duration_hours: hours,
            },
        )
        .await
        .expect("seed policy");
}

pub fn bearer_for(user: &User, config: &Config) -> String {
    create_access_token(user, &config.jwt_secret, config.jwt_expiration_hours)
        .expect("mint token")
}

pub fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.expect("router call")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json body")
}

/// One round trip: send, split status and parsed JSON body. Auth middleware
/// rejections have empty bodies and come back as `Value::Null`.
pub async fn api(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = send(&app.router, json_request(method, uri, token, body)).await;
    let status = response.status();
    let json = response_json(response).await;
    (status, json)
}

/// Runs the demo-adapter grant end to end: authorize, lift the code off the
/// short-circuited redirect, exchange it. Returns the connection summary.
pub async fn connect_demo(app: &TestApp, token: &str, provider: Provider) -> Value {
    let (status, started) = api(
        app,
        Method::GET,
        &format!("/api/integrations/{}/authorize", provider.as_str()),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "authorize failed: {started}");

    let auth_url = started["auth_url"].as_str().expect("auth_url");
    let parsed = url::Url::parse(auth_url).expect("parse auth url");
    let code = parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
        .expect("demo code in redirect");

    let (status, summary) = api(
        app,
        Method::POST,
        &format!("/api/integrations/{}/token", provider.as_str()),
        Some(token),
        Some(serde_json::json!({ "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "token exchange failed: {summary}");
    summary
}
