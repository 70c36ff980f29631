//! Postgres store driver.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use crate::db::connection::DbPool;
use crate::models::active_connection::{ActiveConnection, NewActiveConnection};
use crate::models::activity::{ActivityFilter, IntegrationActivity, NewActivity};
use crate::models::oauth_connection::{NewOAuthConnection, OAuthConnection};
use crate::models::policy::{ConnectionPolicy, UpdatePolicyRequest};
use crate::models::provider::Provider;
use crate::models::settings::AppSettings;
use crate::models::user::{User, UserRole};
use crate::models::PaginationQuery;
use crate::store::Store;
use crate::types::{ActiveConnectionId, ActivityId, ConnectionId, UserId};

const ACTIVITY_COLUMNS: &str = "id, user_id, provider, action, content_preview, target_ref, \
     external_url, outcome, error, occurred_at";

const CONNECTION_COLUMNS: &str = "id, user_id, provider, access_token, refresh_token, expires_at, \
     scopes, provider_user_id, provider_email, created_at, updated_at";

const ACTIVE_COLUMNS: &str = "id, user_id, provider, status, connected_at, last_used_at, expires_at";

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        PgStore { pool }
    }

    async fn query_activities(
        &self,
        filter: &ActivityFilter,
        pagination: Option<(i64, i64)>,
    ) -> Result<Vec<IntegrationActivity>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {ACTIVITY_COLUMNS} FROM integration_activities"
        ));
        let mut has_clause = false;
        apply_activity_filters(&mut builder, &mut has_clause, filter);
        builder.push(" ORDER BY occurred_at DESC, id DESC");

        if let Some((limit, offset)) = pagination {
            builder
                .push(" LIMIT ")
                .push_bind(limit)
                .push(" OFFSET ")
                .push_bind(offset);
        }

        builder
            .build_query_as::<IntegrationActivity>()
            .fetch_all(self.pool.as_ref())
            .await
    }

    async fn count_activities(&self, filter: &ActivityFilter) -> Result<i64, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM integration_activities");
        let mut has_clause = false;
        apply_activity_filters(&mut builder, &mut has_clause, filter);
        builder
            .build_query_scalar::<i64>()
            .fetch_one(self.pool.as_ref())
            .await
    }
}

fn apply_activity_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    has_clause: &mut bool,
    filter: &ActivityFilter,
) {
    if let Some(user_id) = filter.user_id {
        push_clause(builder, has_clause);
        builder.push("user_id = ").push_bind(user_id);
    }
    if let Some(provider) = filter.provider {
        push_clause(builder, has_clause);
        builder.push("provider = ").push_bind(provider);
    }
    if let Some(outcome) = filter.outcome {
        push_clause(builder, has_clause);
        builder.push("outcome = ").push_bind(outcome);
    }
}

fn push_clause(builder: &mut QueryBuilder<'_, Postgres>, has_clause: &mut bool) {
    if *has_clause {
        builder.push(" AND ");
    } else {
        builder.push(" WHERE ");
        *has_clause = true;
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, name, role, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, name, role, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await
    }

    async fn create_user(&self, user: &User) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (id, email, name, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(self.pool.as_ref())
        .await
        .map(|_| ())
    }

    async fn list_policies(&self) -> Result<Vec<ConnectionPolicy>, sqlx::Error> {
        sqlx::query_as::<_, ConnectionPolicy>(
            "SELECT role, provider, allowed, auto_disconnect, connection_duration_hours, \
             updated_at FROM connection_policies ORDER BY role, provider",
        )
        .fetch_all(self.pool.as_ref())
        .await
    }

    async fn get_policy(
        &self,
        role: UserRole,
        provider: Provider,
    ) -> Result<Option<ConnectionPolicy>, sqlx::Error> {
        sqlx::query_as::<_, ConnectionPolicy>(
            "SELECT role, provider, allowed, auto_disconnect, connection_duration_hours, \
             updated_at FROM connection_policies WHERE role = $1 AND provider = $2",
        )
        .bind(role)
        .bind(provider)
        .fetch_optional(self.pool.as_ref())
        .await
    }

    async fn upsert_policy(
        &self,
        role: UserRole,
        provider: Provider,
        update: &UpdatePolicyRequest,
    ) -> Result<ConnectionPolicy, sqlx::Error> {
        sqlx::query_as::<_, ConnectionPolicy>(
            "INSERT INTO connection_policies \
             (role, provider, allowed, auto_disconnect, connection_duration_hours, updated_at) \
             VALUES ($1, $2, $3, $4, $5, now()) \
             ON CONFLICT (role, provider) DO UPDATE SET \
             allowed = EXCLUDED.allowed, \
             auto_disconnect = EXCLUDED.auto_disconnect, \
             connection_duration_hours = EXCLUDED.connection_duration_hours, \
             updated_at = now() \
             RETURNING role, provider, allowed, auto_disconnect, connection_duration_hours, \
             updated_at",
        )
        .bind(role)
        .bind(provider)
        .bind(update.allowed)
        .bind(update.auto_disconnect)
        .bind(update.connection_duration_hours)
        .fetch_one(self.pool.as_ref())
        .await
    }

    async fn get_oauth_connection(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<Option<OAuthConnection>, sqlx::Error> {
        sqlx::query_as::<_, OAuthConnection>(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM oauth_connections \
             WHERE user_id = $1 AND provider = $2"
        ))
        .bind(user_id)
        .bind(provider)
        .fetch_optional(self.pool.as_ref())
        .await
    }

    async fn upsert_oauth_connection(
        &self,
        new: &NewOAuthConnection,
    ) -> Result<OAuthConnection, sqlx::Error> {
        sqlx::query_as::<_, OAuthConnection>(&format!(
            "INSERT INTO oauth_connections \
             (id, user_id, provider, access_token, refresh_token, expires_at, scopes, \
             provider_user_id, provider_email, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now()) \
             ON CONFLICT (user_id, provider) DO UPDATE SET \
             access_token = EXCLUDED.access_token, \
             refresh_token = EXCLUDED.refresh_token, \
             expires_at = EXCLUDED.expires_at, \
             scopes = EXCLUDED.scopes, \
             provider_user_id = EXCLUDED.provider_user_id, \
             provider_email = EXCLUDED.provider_email, \
             updated_at = now() \
             RETURNING {CONNECTION_COLUMNS}"
        ))
        .bind(ConnectionId::new())
        .bind(new.user_id)
        .bind(new.provider)
        .bind(&new.access_token)
        .bind(&new.refresh_token)
        .bind(new.expires_at)
        .bind(&new.scopes)
        .bind(&new.provider_user_id)
        .bind(&new.provider_email)
        .fetch_one(self.pool.as_ref())
        .await
    }

    async fn delete_oauth_connection(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM oauth_connections WHERE user_id = $1 AND provider = $2")
            .bind(user_id)
            .bind(provider)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_activity(&self, new: &NewActivity) -> Result<IntegrationActivity, sqlx::Error> {
        sqlx::query_as::<_, IntegrationActivity>(&format!(
            "INSERT INTO integration_activities \
             (id, user_id, provider, action, content_preview, target_ref, external_url, \
             outcome, error, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now()) \
             RETURNING {ACTIVITY_COLUMNS}"
        ))
        .bind(ActivityId::new())
        .bind(new.user_id)
        .bind(new.provider)
        .bind(new.action)
        .bind(&new.content_preview)
        .bind(&new.target_ref)
        .bind(&new.external_url)
        .bind(new.outcome)
        .bind(&new.error)
        .fetch_one(self.pool.as_ref())
        .await
    }

    async fn list_activities_for_user(
        &self,
        user_id: UserId,
        page: &PaginationQuery,
    ) -> Result<(Vec<IntegrationActivity>, i64), sqlx::Error> {
        let filter = ActivityFilter {
            user_id: Some(user_id),
            ..Default::default()
        };
        let items = self
            .query_activities(&filter, Some((page.limit(), page.offset())))
            .await?;
        let total = self.count_activities(&filter).await?;
        Ok((items, total))
    }

    async fn list_all_activities(
        &self,
        filter: &ActivityFilter,
        page: &PaginationQuery,
    ) -> Result<(Vec<IntegrationActivity>, i64), sqlx::Error> {
        let items = self
            .query_activities(filter, Some((page.limit(), page.offset())))
            .await?;
        let total = self.count_activities(filter).await?;
        Ok((items, total))
    }

    async fn upsert_active_connection(
        &self,
        new: &NewActiveConnection,
    ) -> Result<ActiveConnection, sqlx::Error> {
        // A pending upsert is a fresh grant: restart connected_at and forget
        // last use. An active upsert marks a use on the existing grant.
        sqlx::query_as::<_, ActiveConnection>(&format!(
            "INSERT INTO active_connections \
             (id, user_id, provider, status, connected_at, last_used_at, expires_at) \
             VALUES ($1, $2, $3, $4, now(), CASE WHEN $4 = 'active' THEN now() END, $5) \
             ON CONFLICT (user_id, provider) DO UPDATE SET \
             status = EXCLUDED.status, \
             expires_at = EXCLUDED.expires_at, \
             connected_at = CASE WHEN EXCLUDED.status = 'pending' THEN now() \
                 ELSE active_connections.connected_at END, \
             last_used_at = CASE WHEN EXCLUDED.status = 'active' THEN now() END \
             RETURNING {ACTIVE_COLUMNS}"
        ))
        .bind(ActiveConnectionId::new())
        .bind(new.user_id)
        .bind(new.provider)
        .bind(new.status)
        .bind(new.expires_at)
        .fetch_one(self.pool.as_ref())
        .await
    }

    async fn get_active_connection(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<Option<ActiveConnection>, sqlx::Error> {
        sqlx::query_as::<_, ActiveConnection>(&format!(
            "SELECT {ACTIVE_COLUMNS} FROM active_connections \
             WHERE user_id = $1 AND provider = $2"
        ))
        .bind(user_id)
        .bind(provider)
        .fetch_optional(self.pool.as_ref())
        .await
    }

    async fn list_active_connections_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ActiveConnection>, sqlx::Error> {
        sqlx::query_as::<_, ActiveConnection>(&format!(
            "SELECT {ACTIVE_COLUMNS} FROM active_connections \
             WHERE user_id = $1 AND (expires_at IS NULL OR expires_at > now()) \
             ORDER BY connected_at DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await
    }

    async fn list_active_connections(&self) -> Result<Vec<ActiveConnection>, sqlx::Error> {
        sqlx::query_as::<_, ActiveConnection>(&format!(
            "SELECT {ACTIVE_COLUMNS} FROM active_connections \
             WHERE expires_at IS NULL OR expires_at > now() \
             ORDER BY connected_at DESC"
        ))
        .fetch_all(self.pool.as_ref())
        .await
    }

    async fn delete_active_connection(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM active_connections WHERE user_id = $1 AND provider = $2")
            .bind(user_id)
            .bind(provider)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_active_connections(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM active_connections")
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_active_connections(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM active_connections WHERE expires_at IS NOT NULL AND expires_at <= now()",
        )
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_stale_pending_connections(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM active_connections WHERE status = 'pending' AND connected_at < $1",
        )
        .bind(older_than)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_settings(&self) -> Result<AppSettings, sqlx::Error> {
        let settings = sqlx::query_as::<_, AppSettings>(
            "SELECT global_ephemeral, updated_at FROM app_settings WHERE id = 1",
        )
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(settings.unwrap_or_default())
    }

    async fn update_settings(&self, global_ephemeral: bool) -> Result<AppSettings, sqlx::Error> {
        sqlx::query_as::<_, AppSettings>(
            "INSERT INTO app_settings (id, global_ephemeral, updated_at) VALUES (1, $1, now()) \
             ON CONFLICT (id) DO UPDATE SET \
             global_ephemeral = EXCLUDED.global_ephemeral, updated_at = now() \
             RETURNING global_ephemeral, updated_at",
        )
        .bind(global_ephemeral)
        .fetch_one(self.pool.as_ref())
        .await
    }
}
