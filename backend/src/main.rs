use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_backend::{build_router, config::Config, state::AppState, store::build_store};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        store_driver = ?config.store_driver,
        port = config.port,
        app_base_url = %config.app_base_url,
        jwt_secret = %mask_secret(&config.jwt_secret),
        auth_wait_secs = config.auth_wait_secs,
        notion_configured = config.notion.configured(),
        google_configured = config.google.configured(),
        "Loaded configuration from environment/.env"
    );

    let store = build_store(&config).await?;
    let state = AppState::build(store, config);
    let app = build_router(state.clone());

    // Start server. ConnectInfo feeds the per-IP limiter on the OAuth routes.
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
