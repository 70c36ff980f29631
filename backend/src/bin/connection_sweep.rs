use chrono::{Duration, Utc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_backend::{config::Config, store::build_store};

/// Pending rows older than this never saw their first action and get reaped.
const STALE_PENDING_AGE_HOURS: i64 = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let store = build_store(&config).await?;

    let expired = store.delete_expired_active_connections().await?;
    if expired > 0 {
        tracing::info!("Deleted {} expired active connections", expired);
    }

    let cutoff = Utc::now() - Duration::hours(STALE_PENDING_AGE_HOURS);
    let stale = store.delete_stale_pending_connections(cutoff).await?;
    if stale > 0 {
        tracing::info!("Deleted {} stale pending connections", stale);
    }

    Ok(())
}
