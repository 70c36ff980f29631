//! Persistence boundary: one trait, two drivers.
//!
//! `PgStore` is the production driver; `MemoryStore` backs tests and the
//! no-database demo profile. Handlers and services only ever see `dyn Store`,
//! so the drivers must agree on semantics, not just signatures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::{Config, StoreDriver};
use crate::db::connection::create_pool;
use crate::models::active_connection::{ActiveConnection, NewActiveConnection};
use crate::models::activity::{ActivityFilter, IntegrationActivity, NewActivity};
use crate::models::oauth_connection::{NewOAuthConnection, OAuthConnection};
use crate::models::policy::{ConnectionPolicy, UpdatePolicyRequest, PERSISTENT_HOURS};
use crate::models::provider::Provider;
use crate::models::settings::AppSettings;
use crate::models::user::{User, UserRole};
use crate::models::PaginationQuery;
use crate::types::UserId;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Everything the gateway persists. Upserts are keyed so that concurrent
/// writers converge on a single row instead of diverging.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    // --- users ---

    async fn get_user(&self, id: UserId) -> Result<Option<User>, sqlx::Error>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error>;

    /// Inserts an identity row. Used by seeds and the memory driver's
    /// startup provisioning; the API has no user-creation surface.
    async fn create_user(&self, user: &User) -> Result<(), sqlx::Error>;

    // --- connection policies ---

    async fn list_policies(&self) -> Result<Vec<ConnectionPolicy>, sqlx::Error>;

    async fn get_policy(
        &self,
        role: UserRole,
        provider: Provider,
    ) -> Result<Option<ConnectionPolicy>, sqlx::Error>;

    async fn upsert_policy(
        &self,
        role: UserRole,
        provider: Provider,
        update: &UpdatePolicyRequest,
    ) -> Result<ConnectionPolicy, sqlx::Error>;

    // --- token vault ---

    async fn get_oauth_connection(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<Option<OAuthConnection>, sqlx::Error>;

    /// Single-statement upsert keyed (user_id, provider); two concurrent
    /// refreshes converge on whichever wrote last.
    async fn upsert_oauth_connection(
        &self,
        new: &NewOAuthConnection,
    ) -> Result<OAuthConnection, sqlx::Error>;

    /// Returns whether a row existed.
    async fn delete_oauth_connection(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<bool, sqlx::Error>;

    // --- activity ledger (append-only) ---

    async fn record_activity(&self, new: &NewActivity) -> Result<IntegrationActivity, sqlx::Error>;

    async fn list_activities_for_user(
        &self,
        user_id: UserId,
        page: &PaginationQuery,
    ) -> Result<(Vec<IntegrationActivity>, i64), sqlx::Error>;

    async fn list_all_activities(
        &self,
        filter: &ActivityFilter,
        page: &PaginationQuery,
    ) -> Result<(Vec<IntegrationActivity>, i64), sqlx::Error>;

    // --- active connections ---

    async fn upsert_active_connection(
        &self,
        new: &NewActiveConnection,
    ) -> Result<ActiveConnection, sqlx::Error>;

    async fn get_active_connection(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<Option<ActiveConnection>, sqlx::Error>;

    /// Live (non-expired) connections for one user.
    async fn list_active_connections_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ActiveConnection>, sqlx::Error>;

    /// Live (non-expired) connections across all users.
    async fn list_active_connections(&self) -> Result<Vec<ActiveConnection>, sqlx::Error>;

    async fn delete_active_connection(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<bool, sqlx::Error>;

    /// Emergency clear: removes every row, returns how many. Ledger history
    /// and vault rows are untouched.
    async fn clear_active_connections(&self) -> Result<u64, sqlx::Error>;

    async fn delete_expired_active_connections(&self) -> Result<u64, sqlx::Error>;

    /// Reaps `pending` rows that never saw a first action.
    async fn delete_stale_pending_connections(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>;

    // --- app settings ---

    async fn get_settings(&self) -> Result<AppSettings, sqlx::Error>;

    async fn update_settings(&self, global_ephemeral: bool) -> Result<AppSettings, sqlx::Error>;
}

/// Builds the store named by `STORE_DRIVER`. The postgres driver connects
/// and runs migrations; the memory driver starts from the same policy
/// defaults the migrations seed, plus one demo user per role.
pub async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match config.store_driver {
        StoreDriver::Postgres => {
            let pool = create_pool(&config.database_url, 10).await?;
            sqlx::migrate!("./migrations").run(pool.as_ref()).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        StoreDriver::Memory => {
            tracing::warn!("STORE_DRIVER=memory: state will not survive a restart");
            let store = MemoryStore::new();
            provision_memory_store(&store).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Mirrors the migration-seeded policy matrix and creates a demo user per
/// role, logging each id so callers can mint tokens against them.
async fn provision_memory_store(store: &MemoryStore) -> Result<(), sqlx::Error> {
    let defaults = [
        (UserRole::Sales, Provider::Notion, true, false, 24),
        (UserRole::Sales, Provider::Google, true, false, 24),
        (UserRole::Marketing, Provider::Notion, true, true, 0),
        (UserRole::Marketing, Provider::Google, true, true, 0),
        (
            UserRole::CustomerSuccess,
            Provider::Notion,
            true,
            false,
            PERSISTENT_HOURS,
        ),
        (UserRole::CustomerSuccess, Provider::Google, false, false, 0),
        (UserRole::Admin, Provider::Notion, true, false, PERSISTENT_HOURS),
        (UserRole::Admin, Provider::Google, true, false, PERSISTENT_HOURS),
    ];
    for (role, provider, allowed, auto_disconnect, connection_duration_hours) in defaults {
        store
            .upsert_policy(
                role,
                provider,
                &UpdatePolicyRequest {
                    allowed,
                    auto_disconnect,
                    connection_duration_hours,
                },
            )
            .await?;
    }

    let demo_users = [
        ("sales@example.com", "Demo Sales", UserRole::Sales),
        ("marketing@example.com", "Demo Marketing", UserRole::Marketing),
        ("cs@example.com", "Demo CS", UserRole::CustomerSuccess),
        ("admin@example.com", "Demo Admin", UserRole::Admin),
    ];
    for (email, name, role) in demo_users {
        let user = User::new(email.to_string(), name.to_string(), role);
        tracing::info!(email, user_id = %user.id, "provisioned demo user");
        store.create_user(&user).await?;
    }
    Ok(())
}
