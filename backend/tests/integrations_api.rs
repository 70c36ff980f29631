//! Interactive authorization surface: catalog, authorize/callback/wait,
//! token exchange, whoami and disconnect, driven through the router with
//! demo adapters standing in for the providers.

mod support;

use axum::http::{header, Method, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};

use support::{api, bearer_for, connect_demo, json_request, seed_policy, seed_user, send,
    spawn_app, spawn_app_with_config, test_config};
use tether_backend::models::provider::Provider;
use tether_backend::models::user::UserRole;
use tether_backend::store::Store;

#[tokio::test]
async fn catalog_lists_demo_adapters_when_unconfigured() {
    let app = spawn_app();
    let user = seed_user(app.store.as_ref(), UserRole::Sales).await;
    let token = bearer_for(&user, &app.state.config);

    let (status, body) = api(
        &app,
        Method::GET,
        "/api/integrations/providers",
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            { "provider": "google", "display_name": "Google Drive", "demo_mode": true },
            { "provider": "notion", "display_name": "Notion", "demo_mode": true },
        ])
    );
}

#[tokio::test]
async fn unknown_provider_is_a_404() {
    let app = spawn_app();
    let user = seed_user(app.store.as_ref(), UserRole::Sales).await;
    let token = bearer_for(&user, &app.state.config);

    let (status, body) = api(
        &app,
        Method::GET,
        "/api/integrations/slack/authorize",
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("NOT_FOUND"));
    assert_eq!(body["error"], json!("Provider 'slack' not found"));
}

#[tokio::test]
async fn interactive_grant_resolves_the_waiting_poll() {
    let app = spawn_app();
    let user = seed_user(app.store.as_ref(), UserRole::Sales).await;
    let token = bearer_for(&user, &app.state.config);

    let (status, started) = api(
        &app,
        Method::GET,
        "/api/integrations/notion/authorize",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let state = started["state"].as_str().unwrap().to_string();

    // the demo adapter redirects straight back to our callback with a code
    let auth_url = url::Url::parse(started["auth_url"].as_str().unwrap()).unwrap();
    assert!(auth_url.path().ends_with("/api/integrations/notion/callback"));
    let code = auth_url
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
        .unwrap();

    // poll first so the waiter is registered, then land the redirect; join!
    // polls in order, so the ordering is deterministic
    let wait_uri = format!("/api/integrations/notion/authorize/wait?state={state}");
    let wait_fut = api(&app, Method::GET, &wait_uri, Some(&token), None);
    let callback_uri = format!("/api/integrations/notion/callback?code={code}&state={state}");
    let callback_fut = send(&app.router, json_request(Method::GET, &callback_uri, None, None));
    let ((wait_status, wait_body), callback_response) = tokio::join!(wait_fut, callback_fut);

    assert_eq!(callback_response.status(), StatusCode::OK);
    let content_type = callback_response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/html"));
    let page = String::from_utf8(
        callback_response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec(),
    )
    .unwrap();
    assert!(page.contains("Authorization complete. You can close this window."));
    assert!(page.contains("window.close()"));

    assert_eq!(wait_status, StatusCode::OK, "wait failed: {wait_body}");
    assert_eq!(wait_body["status"], json!("completed"));
    assert_eq!(wait_body["connection"]["provider"], json!("notion"));
    assert_eq!(
        wait_body["connection"]["provider_email"],
        json!("demo@example.com")
    );

    // the vault holds the credential; the response never does
    let stored = app
        .store
        .get_oauth_connection(user.id, Provider::Notion)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.access_token.starts_with("demo-token-"));
    assert!(wait_body["connection"].get("access_token").is_none());
}

#[tokio::test]
async fn declined_grant_cancels_the_wait() {
    let app = spawn_app();
    let user = seed_user(app.store.as_ref(), UserRole::Marketing).await;
    let token = bearer_for(&user, &app.state.config);

    let (_, started) = api(
        &app,
        Method::GET,
        "/api/integrations/google/authorize",
        Some(&token),
        None,
    )
    .await;
    let state = started["state"].as_str().unwrap().to_string();

    let wait_uri = format!("/api/integrations/google/authorize/wait?state={state}");
    let wait_fut = api(&app, Method::GET, &wait_uri, Some(&token), None);
    let callback_uri =
        format!("/api/integrations/google/callback?state={state}&error=access_denied");
    let callback_fut = send(&app.router, json_request(Method::GET, &callback_uri, None, None));
    let ((wait_status, wait_body), callback_response) = tokio::join!(wait_fut, callback_fut);

    assert_eq!(callback_response.status(), StatusCode::OK);
    let page = String::from_utf8(
        callback_response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec(),
    )
    .unwrap();
    assert!(page.contains("Authorization was cancelled. You can close this window."));

    assert_eq!(wait_status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(wait_body["code"], json!("CANCELLED"));

    assert!(app
        .store
        .get_oauth_connection(user.id, Provider::Google)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn abandoned_grant_times_out_as_cancelled() {
    let mut config = test_config();
    config.auth_wait_secs = 1;
    let app = spawn_app_with_config(config);
    let user = seed_user(app.store.as_ref(), UserRole::Sales).await;
    let token = bearer_for(&user, &app.state.config);

    let (_, started) = api(
        &app,
        Method::GET,
        "/api/integrations/notion/authorize",
        Some(&token),
        None,
    )
    .await;
    let state = started["state"].as_str().unwrap();

    let wait_uri = format!("/api/integrations/notion/authorize/wait?state={state}");
    let (status, body) = api(&app, Method::GET, &wait_uri, Some(&token), None).await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body["code"], json!("CANCELLED"));
}

#[tokio::test]
async fn wait_with_unknown_state_is_a_404() {
    let app = spawn_app();
    let user = seed_user(app.store.as_ref(), UserRole::Sales).await;
    let token = bearer_for(&user, &app.state.config);

    let (status, body) = api(
        &app,
        Method::GET,
        "/api/integrations/notion/authorize/wait?state=no-such-state",
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("pending authorization not found"));
}

#[tokio::test]
async fn callback_with_unknown_state_is_a_404() {
    let app = spawn_app();

    let (status, body) = api(
        &app,
        Method::GET,
        "/api/integrations/notion/callback?state=no-such-state&code=x",
        None,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn whoami_reports_the_provider_identity() {
    let app = spawn_app();
    let user = seed_user(app.store.as_ref(), UserRole::Sales).await;
    let token = bearer_for(&user, &app.state.config);

    // nothing stored and nothing presented: the caller must authorize first
    let (status, body) = api(
        &app,
        Method::GET,
        "/api/integrations/notion/whoami",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], json!("AUTH_REQUIRED"));

    connect_demo(&app, &token, Provider::Notion).await;

    let (status, body) = api(
        &app,
        Method::GET,
        "/api/integrations/notion/whoami",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "id": "demo-user",
            "name": "Demo User",
            "email": "demo@example.com",
        })
    );
}

#[tokio::test]
async fn disconnect_removes_the_grant_but_keeps_the_ledger() {
    let app = spawn_app();
    let user = seed_user(app.store.as_ref(), UserRole::Sales).await;
    seed_policy(app.store.as_ref(), UserRole::Sales, Provider::Notion, true, false, 24).await;
    let token = bearer_for(&user, &app.state.config);
    connect_demo(&app, &token, Provider::Notion).await;

    let (status, body) = api(
        &app,
        Method::DELETE,
        "/api/integrations/notion/connection",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "disconnected": true }));

    assert!(app
        .store
        .get_oauth_connection(user.id, Provider::Notion)
        .await
        .unwrap()
        .is_none());
    let (_, listing) = api(
        &app,
        Method::GET,
        "/api/integrations/connections",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(listing, json!([]));

    // history survives the disconnect
    let (_, ledger) = api(&app, Method::GET, "/api/activities", Some(&token), None).await;
    assert_eq!(ledger["total"], json!(1));
    assert_eq!(ledger["data"][0]["action"], json!("connect"));

    // a second disconnect has nothing left to remove
    let (status, body) = api(
        &app,
        Method::DELETE,
        "/api/integrations/notion/connection",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "disconnected": false }));
}

#[tokio::test]
async fn token_exchange_rejects_an_empty_code() {
    let app = spawn_app();
    let user = seed_user(app.store.as_ref(), UserRole::Sales).await;
    let token = bearer_for(&user, &app.state.config);

    let (status, body) = api(
        &app,
        Method::POST,
        "/api/integrations/notion/token",
        Some(&token),
        Some(json!({ "code": "" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn user_routes_reject_missing_bearer() {
    let app = spawn_app();

    for uri in [
        "/api/integrations/providers",
        "/api/integrations/connections",
        "/api/integrations/notion/authorize",
        "/api/activities",
    ] {
        let (status, body) = api(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body, Value::Null, "{uri}");
    }
}
