use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, HeaderValue, Response, StatusCode};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response as AxumResponse,
};
use governor::middleware::StateInformationMiddleware;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::PeerIpKeyExtractor, GovernorError,
    GovernorLayer,
};

use crate::config::Config;
use crate::models::user::User;
use crate::state::AppState;
use crate::utils::jwt::Claims;

#[derive(Debug, Clone)]
struct UserRateLimitWindow {
    requests: VecDeque<Instant>,
}

const USER_RATE_LIMIT_PERIODIC_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
const USER_STORE_CLEANUP_THRESHOLD: usize = 10_000;

fn user_rate_limit_store() -> &'static Mutex<HashMap<String, UserRateLimitWindow>> {
    static USER_RATE_LIMIT_STORE: OnceLock<Mutex<HashMap<String, UserRateLimitWindow>>> =
        OnceLock::new();
    USER_RATE_LIMIT_STORE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn user_rate_limit_last_cleanup() -> &'static Mutex<Instant> {
    static LAST_CLEANUP: OnceLock<Mutex<Instant>> = OnceLock::new();
    // Start at "now" so periodic cleanup does not fire immediately during startup.
    LAST_CLEANUP.get_or_init(|| Mutex::new(Instant::now()))
}

fn should_cleanup_user_rate_limit_store(
    store_len: usize,
    threshold: usize,
    now: Instant,
    last_cleanup_at: Instant,
    interval: Duration,
) -> bool {
    store_len > threshold || now.duration_since(last_cleanup_at) >= interval
}

/// Per-user sliding window for the content route. Keyed by the authenticated
/// user id, so one noisy caller cannot starve the rest.
pub async fn user_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> AxumResponse {
    let key = request
        .extensions()
        .get::<User>()
        .map(|user| user.id.to_string())
        .or_else(|| {
            request
                .extensions()
                .get::<Claims>()
                .map(|claims| claims.sub.clone())
        });

    let Some(key) = key else {
        return json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Unable to determine request identity.",
            None,
        );
    };

    let max_requests = state.config.rate_limit_user_max_requests.max(1);
    let window = Duration::from_secs(state.config.rate_limit_user_window_seconds.max(1));
    let now = Instant::now();
    let last_cleanup_at = *user_rate_limit_last_cleanup()
        .lock()
        .unwrap_or_else(|e| e.into_inner());

    let (retry_after, did_cleanup) = {
        let mut store = user_rate_limit_store()
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let mut did_cleanup = false;
        if should_cleanup_user_rate_limit_store(
            store.len(),
            USER_STORE_CLEANUP_THRESHOLD,
            now,
            last_cleanup_at,
            USER_RATE_LIMIT_PERIODIC_CLEANUP_INTERVAL,
        ) {
            store.retain(|_, entry| {
                prune_expired_requests(entry, now, window);
                !entry.requests.is_empty()
            });
            did_cleanup = true;
        }

        (
            evaluate_user_rate_limit(&mut store, key, max_requests, window, now).err(),
            did_cleanup,
        )
    };

    if did_cleanup {
        let mut last_cleanup = user_rate_limit_last_cleanup()
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *last_cleanup = now;
    }

    if let Some(retry_after) = retry_after {
        return json_error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Too many requests. Please try again later.",
            Some(retry_after),
        );
    }

    next.run(request).await
}

fn evaluate_user_rate_limit(
    store: &mut HashMap<String, UserRateLimitWindow>,
    key: String,
    max_requests: u32,
    window: Duration,
    now: Instant,
) -> Result<(), u64> {
    let entry = store.entry(key).or_insert(UserRateLimitWindow {
        requests: VecDeque::new(),
    });
    prune_expired_requests(entry, now, window);

    if entry.requests.len() >= max_requests as usize {
        let retry_after = entry
            .requests
            .front()
            .map(|oldest| {
                window
                    .saturating_sub(now.duration_since(*oldest))
                    .as_secs()
                    .max(1)
            })
            .unwrap_or(1);
        return Err(retry_after);
    }

    entry.requests.push_back(now);
    Ok(())
}

fn prune_expired_requests(entry: &mut UserRateLimitWindow, now: Instant, window: Duration) {
    while let Some(oldest) = entry.requests.front() {
        if now.duration_since(*oldest) >= window {
            entry.requests.pop_front();
        } else {
            break;
        }
    }
}

/// Per-IP limiter for the OAuth surface. The callback route is public, so
/// this is keyed on the peer address rather than a user id.
pub fn create_oauth_rate_limiter(
    config: &Config,
) -> GovernorLayer<PeerIpKeyExtractor, StateInformationMiddleware, Body> {
    let burst_size = config.rate_limit_ip_max_requests.max(1);
    let window_seconds = config.rate_limit_ip_window_seconds.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .period(Duration::from_secs(window_seconds))
            .burst_size(burst_size)
            .key_extractor(PeerIpKeyExtractor)
            .use_headers()
            .finish()
            .expect("rate limiter config should be valid"),
    );

    GovernorLayer::new(governor_conf).error_handler(rate_limit_error_handler)
}

fn rate_limit_error_handler(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            tracing::warn!(wait_time, "Rate limit exceeded");
            let mut response = json_error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests. Please try again later.",
                Some(wait_time),
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
        GovernorError::UnableToExtractKey => json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Unable to determine request identity.",
            None,
        ),
        GovernorError::Other { code, msg, headers } => {
            let mut response = json_error_response(
                code,
                "RATE_LIMIT_ERROR",
                &msg.unwrap_or_else(|| "Rate limit error".to_string()),
                None,
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
    }
}

fn json_error_response(
    status: StatusCode,
    code: &str,
    message: &str,
    retry_after: Option<u64>,
) -> Response<Body> {
    let mut body = serde_json::json!({
        "error": message,
        "code": code,
    });
    if let Some(retry_after) = retry_after {
        body["details"] = serde_json::json!({ "retry_after": retry_after });
    }

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(retry_after) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderCredentials, StoreDriver};
    use crate::store::MemoryStore;
    use axum::{middleware, routing::get, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[test]
    fn create_oauth_rate_limiter_uses_config_values() {
        let config = test_config(10, 60, 20, 3600);
        let _limiter = create_oauth_rate_limiter(&config);
    }

    #[test]
    fn create_oauth_rate_limiter_handles_zero_values() {
        let config = test_config(0, 0, 20, 3600);
        let _limiter = create_oauth_rate_limiter(&config);
    }

    #[test]
    fn should_cleanup_periodically_even_below_threshold() {
        let now = Instant::now();
        let last_cleanup = now - USER_RATE_LIMIT_PERIODIC_CLEANUP_INTERVAL - Duration::from_secs(1);

        assert!(should_cleanup_user_rate_limit_store(
            1,
            USER_STORE_CLEANUP_THRESHOLD,
            now,
            last_cleanup,
            USER_RATE_LIMIT_PERIODIC_CLEANUP_INTERVAL,
        ));
    }

    #[test]
    fn should_not_cleanup_when_below_threshold_and_interval_not_elapsed() {
        let now = Instant::now();

        assert!(!should_cleanup_user_rate_limit_store(
            5,
            USER_STORE_CLEANUP_THRESHOLD,
            now,
            now - Duration::from_secs(60),
            USER_RATE_LIMIT_PERIODIC_CLEANUP_INTERVAL,
        ));
    }

    #[test]
    fn user_rate_limit_rejects_burst_at_window_boundary() {
        let mut store = HashMap::new();
        let key = "boundary-user".to_string();
        let max_requests = 5u32;
        let window = Duration::from_secs(60);
        let base = Instant::now();

        assert!(
            evaluate_user_rate_limit(&mut store, key.clone(), max_requests, window, base).is_ok()
        );

        for _ in 0..(max_requests - 1) {
            assert!(evaluate_user_rate_limit(
                &mut store,
                key.clone(),
                max_requests,
                window,
                base + Duration::from_millis(59_900)
            )
            .is_ok());
        }

        assert!(evaluate_user_rate_limit(
            &mut store,
            key.clone(),
            max_requests,
            window,
            base + Duration::from_millis(60_100)
        )
        .is_ok());

        let rejected = evaluate_user_rate_limit(
            &mut store,
            key,
            max_requests,
            window,
            base + Duration::from_millis(60_100),
        );
        assert!(rejected.is_err());
    }

    #[test]
    fn rate_limit_error_handler_too_many_requests() {
        let error = GovernorError::TooManyRequests {
            wait_time: Duration::from_secs(5).as_secs(),
            headers: None,
        };

        let response = rate_limit_error_handler(error);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(CONTENT_TYPE).is_some());
        assert!(response.headers().get("retry-after").is_some());
    }

    #[test]
    fn rate_limit_error_handler_unable_to_extract_key() {
        let error = GovernorError::UnableToExtractKey;

        let response = rate_limit_error_handler(error);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(CONTENT_TYPE).is_some());
    }

    #[test]
    fn rate_limit_error_handler_other_error_with_headers() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-custom", "value".parse().unwrap());

        let error = GovernorError::Other {
            code: StatusCode::BAD_REQUEST,
            msg: Some("error with headers".to_string()),
            headers: Some(headers),
        };

        let response = rate_limit_error_handler(error);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get("x-custom").is_some());
    }

    #[tokio::test]
    async fn user_rate_limit_rejects_excess_requests_for_same_user() {
        clear_user_rate_limit_store();
        let state = test_state(1, 60);
        let app = Router::new()
            .route("/limited", get(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                user_rate_limit,
            ))
            .route_layer(middleware::from_fn(inject_claims))
            .with_state(state);

        let response_1 = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/limited")
                    .body(Body::empty())
                    .expect("build request 1"),
            )
            .await
            .expect("call request 1");
        assert_eq!(response_1.status(), StatusCode::OK);

        let response_2 = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/limited")
                    .body(Body::empty())
                    .expect("build request 2"),
            )
            .await
            .expect("call request 2");
        assert_eq!(response_2.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response_2.headers().get("retry-after").is_some());

        let body = response_2
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        let body_json: serde_json::Value =
            serde_json::from_slice(&body).expect("parse rate limit body");
        assert_eq!(body_json["code"], "RATE_LIMITED");
        assert!(body_json["details"]["retry_after"].as_u64().is_some_and(|s| s >= 1));
    }

    async fn inject_claims(mut request: Request, next: Next) -> AxumResponse {
        request.extensions_mut().insert(Claims {
            sub: "rate-limit-test-user".to_string(),
            email: "tester@example.com".to_string(),
            role: "sales".to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
            iat: chrono::Utc::now().timestamp(),
            jti: "test-jti".to_string(),
        });
        next.run(request).await
    }

    fn clear_user_rate_limit_store() {
        let mut store = user_rate_limit_store()
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        store.clear();
        let mut last_cleanup = user_rate_limit_last_cleanup()
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *last_cleanup = Instant::now();
    }

    fn test_state(user_max_requests: u32, user_window_seconds: u64) -> AppState {
        let config = test_config(10, 60, user_max_requests, user_window_seconds);
        AppState::build(Arc::new(MemoryStore::new()), config)
    }

    fn test_config(
        ip_max_requests: u32,
        ip_window_seconds: u64,
        user_max_requests: u32,
        user_window_seconds: u64,
    ) -> Config {
        Config {
            database_url: "postgres://localhost/test".to_string(),
            jwt_secret: "test-secret-key".to_string(),
            jwt_expiration_hours: 1,
            port: 3001,
            app_base_url: "http://localhost:3001".to_string(),
            store_driver: StoreDriver::Memory,
            notion: ProviderCredentials::default(),
            google: ProviderCredentials::default(),
            auth_wait_secs: 1,
            provider_timeout_secs: 5,
            cors_allow_origins: vec!["*".into()],
            rate_limit_user_max_requests: user_max_requests,
            rate_limit_user_window_seconds: user_window_seconds,
            rate_limit_ip_max_requests: ip_max_requests,
            rate_limit_ip_window_seconds: ip_window_seconds,
        }
    }
}
