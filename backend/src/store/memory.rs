//! In-memory store driver. Backs the test harness and the no-database demo
//! profile; must match `PgStore` semantics exactly, including upsert keys,
//! expiry filtering, and pagination totals.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::active_connection::{ActiveConnection, ConnectionStatus, NewActiveConnection};
use crate::models::activity::{ActivityFilter, IntegrationActivity, NewActivity};
use crate::models::oauth_connection::{NewOAuthConnection, OAuthConnection};
use crate::models::policy::{ConnectionPolicy, UpdatePolicyRequest};
use crate::models::provider::Provider;
use crate::models::settings::AppSettings;
use crate::models::user::{User, UserRole};
use crate::models::PaginationQuery;
use crate::store::Store;
use crate::types::{ActiveConnectionId, ActivityId, ConnectionId, UserId};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    policies: HashMap<(UserRole, Provider), ConnectionPolicy>,
    vault: HashMap<(UserId, Provider), OAuthConnection>,
    activities: Vec<IntegrationActivity>,
    active: HashMap<(UserId, Provider), ActiveConnection>,
    settings: Option<AppSettings>,
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    fn paginate(
        rows: Vec<IntegrationActivity>,
        page: &PaginationQuery,
    ) -> (Vec<IntegrationActivity>, i64) {
        let total = rows.len() as i64;
        let page_rows = rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        (page_rows, total)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, sqlx::Error> {
        Ok(self.read().users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        Ok(self
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create_user(&self, user: &User) -> Result<(), sqlx::Error> {
        self.write().users.insert(user.id, user.clone());
        Ok(())
    }

    async fn list_policies(&self) -> Result<Vec<ConnectionPolicy>, sqlx::Error> {
        let mut policies: Vec<ConnectionPolicy> = self.read().policies.values().cloned().collect();
        policies.sort_by(|a, b| {
            a.role
                .as_str()
                .cmp(b.role.as_str())
                .then(a.provider.as_str().cmp(b.provider.as_str()))
        });
        Ok(policies)
    }

    async fn get_policy(
        &self,
        role: UserRole,
        provider: Provider,
    ) -> Result<Option<ConnectionPolicy>, sqlx::Error> {
        Ok(self.read().policies.get(&(role, provider)).cloned())
    }

    async fn upsert_policy(
        &self,
        role: UserRole,
        provider: Provider,
        update: &UpdatePolicyRequest,
    ) -> Result<ConnectionPolicy, sqlx::Error> {
        let policy = ConnectionPolicy {
            role,
            provider,
            allowed: update.allowed,
            auto_disconnect: update.auto_disconnect,
            connection_duration_hours: update.connection_duration_hours,
            updated_at: Utc::now(),
        };
        self.write().policies.insert((role, provider), policy.clone());
        Ok(policy)
    }

    async fn get_oauth_connection(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<Option<OAuthConnection>, sqlx::Error> {
        Ok(self.read().vault.get(&(user_id, provider)).cloned())
    }

    async fn upsert_oauth_connection(
        &self,
        new: &NewOAuthConnection,
    ) -> Result<OAuthConnection, sqlx::Error> {
        let now = Utc::now();
        let mut tables = self.write();
        let key = (new.user_id, new.provider);
        let (id, created_at) = match tables.vault.get(&key) {
            Some(existing) => (existing.id, existing.created_at),
            None => (ConnectionId::new(), now),
        };
        let row = OAuthConnection {
            id,
            user_id: new.user_id,
            provider: new.provider,
            access_token: new.access_token.clone(),
            refresh_token: new.refresh_token.clone(),
            expires_at: new.expires_at,
            scopes: new.scopes.clone(),
            provider_user_id: new.provider_user_id.clone(),
            provider_email: new.provider_email.clone(),
            created_at,
            updated_at: now,
        };
        tables.vault.insert(key, row.clone());
        Ok(row)
    }

    async fn delete_oauth_connection(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<bool, sqlx::Error> {
        Ok(self.write().vault.remove(&(user_id, provider)).is_some())
    }

    async fn record_activity(&self, new: &NewActivity) -> Result<IntegrationActivity, sqlx::Error> {
        let row = IntegrationActivity {
            id: ActivityId::new(),
            user_id: new.user_id,
            provider: new.provider,
            action: new.action,
            content_preview: new.content_preview.clone(),
            target_ref: new.target_ref.clone(),
            external_url: new.external_url.clone(),
            outcome: new.outcome,
            error: new.error.clone(),
            occurred_at: Utc::now(),
        };
        self.write().activities.push(row.clone());
        Ok(row)
    }

    async fn list_activities_for_user(
        &self,
        user_id: UserId,
        page: &PaginationQuery,
    ) -> Result<(Vec<IntegrationActivity>, i64), sqlx::Error> {
        let mut rows: Vec<IntegrationActivity> = self
            .read()
            .activities
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(Self::paginate(rows, page))
    }

    async fn list_all_activities(
        &self,
        filter: &ActivityFilter,
        page: &PaginationQuery,
    ) -> Result<(Vec<IntegrationActivity>, i64), sqlx::Error> {
        let mut rows: Vec<IntegrationActivity> = self
            .read()
            .activities
            .iter()
            .filter(|a| filter.user_id.map_or(true, |u| a.user_id == u))
            .filter(|a| filter.provider.map_or(true, |p| a.provider == p))
            .filter(|a| filter.outcome.map_or(true, |o| a.outcome == o))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(Self::paginate(rows, page))
    }

    async fn upsert_active_connection(
        &self,
        new: &NewActiveConnection,
    ) -> Result<ActiveConnection, sqlx::Error> {
        let now = Utc::now();
        let mut tables = self.write();
        let key = (new.user_id, new.provider);
        let row = match tables.active.get(&key) {
            Some(existing) => ActiveConnection {
                id: existing.id,
                user_id: new.user_id,
                provider: new.provider,
                status: new.status,
                // a fresh grant restarts the connection; a use keeps it
                connected_at: if new.status == ConnectionStatus::Pending {
                    now
                } else {
                    existing.connected_at
                },
                last_used_at: (new.status == ConnectionStatus::Active).then_some(now),
                expires_at: new.expires_at,
            },
            None => ActiveConnection {
                id: ActiveConnectionId::new(),
                user_id: new.user_id,
                provider: new.provider,
                status: new.status,
                connected_at: now,
                last_used_at: (new.status == ConnectionStatus::Active).then_some(now),
                expires_at: new.expires_at,
            },
        };
        tables.active.insert(key, row.clone());
        Ok(row)
    }

    async fn get_active_connection(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<Option<ActiveConnection>, sqlx::Error> {
        Ok(self.read().active.get(&(user_id, provider)).cloned())
    }

    async fn list_active_connections_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ActiveConnection>, sqlx::Error> {
        let now = Utc::now();
        let mut rows: Vec<ActiveConnection> = self
            .read()
            .active
            .values()
            .filter(|c| c.user_id == user_id && !c.is_expired(now))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.connected_at.cmp(&a.connected_at));
        Ok(rows)
    }

    async fn list_active_connections(&self) -> Result<Vec<ActiveConnection>, sqlx::Error> {
        let now = Utc::now();
        let mut rows: Vec<ActiveConnection> = self
            .read()
            .active
            .values()
            .filter(|c| !c.is_expired(now))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.connected_at.cmp(&a.connected_at));
        Ok(rows)
    }

    async fn delete_active_connection(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<bool, sqlx::Error> {
        Ok(self.write().active.remove(&(user_id, provider)).is_some())
    }

    async fn clear_active_connections(&self) -> Result<u64, sqlx::Error> {
        let mut tables = self.write();
        let cleared = tables.active.len() as u64;
        tables.active.clear();
        Ok(cleared)
    }

    async fn delete_expired_active_connections(&self) -> Result<u64, sqlx::Error> {
        let now = Utc::now();
        let mut tables = self.write();
        let before = tables.active.len();
        tables.active.retain(|_, c| !c.is_expired(now));
        Ok((before - tables.active.len()) as u64)
    }

    async fn delete_stale_pending_connections(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let mut tables = self.write();
        let before = tables.active.len();
        tables.active.retain(|_, c| {
            !(c.status == ConnectionStatus::Pending && c.connected_at < older_than)
        });
        Ok((before - tables.active.len()) as u64)
    }

    async fn get_settings(&self) -> Result<AppSettings, sqlx::Error> {
        Ok(self.read().settings.clone().unwrap_or_default())
    }

    async fn update_settings(&self, global_ephemeral: bool) -> Result<AppSettings, sqlx::Error> {
        let settings = AppSettings {
            global_ephemeral,
            updated_at: Utc::now(),
        };
        self.write().settings = Some(settings.clone());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::activity::ActivityOutcome;
    use crate::models::provider::ActionKind;
    use chrono::Duration;

    fn store() -> MemoryStore {
        MemoryStore::new()
    }

    fn vault_row(user_id: UserId, provider: Provider, token: &str) -> NewOAuthConnection {
        NewOAuthConnection {
            user_id,
            provider,
            access_token: token.to_string(),
            refresh_token: None,
            expires_at: None,
            scopes: vec![],
            provider_user_id: None,
            provider_email: None,
        }
    }

    fn activity(user_id: UserId, provider: Provider, outcome: ActivityOutcome) -> NewActivity {
        NewActivity {
            user_id,
            provider,
            action: ActionKind::Create,
            content_preview: Some("hello".into()),
            target_ref: Some("page-1".into()),
            external_url: None,
            outcome,
            error: None,
        }
    }

    #[tokio::test]
    async fn vault_upsert_converges_on_one_row_and_keeps_created_at() {
        let store = store();
        let user = UserId::new();

        let first = store
            .upsert_oauth_connection(&vault_row(user, Provider::Notion, "t1"))
            .await
            .unwrap();
        let second = store
            .upsert_oauth_connection(&vault_row(user, Provider::Notion, "t2"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.access_token, "t2");

        let stored = store
            .get_oauth_connection(user, Provider::Notion)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "t2");
    }

    #[tokio::test]
    async fn delete_oauth_connection_reports_presence() {
        let store = store();
        let user = UserId::new();
        store
            .upsert_oauth_connection(&vault_row(user, Provider::Google, "t"))
            .await
            .unwrap();

        assert!(store
            .delete_oauth_connection(user, Provider::Google)
            .await
            .unwrap());
        assert!(!store
            .delete_oauth_connection(user, Provider::Google)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn activities_are_newest_first_with_totals() {
        let store = store();
        let user = UserId::new();
        for _ in 0..3 {
            store
                .record_activity(&activity(user, Provider::Notion, ActivityOutcome::Success))
                .await
                .unwrap();
        }
        store
            .record_activity(&activity(
                UserId::new(),
                Provider::Notion,
                ActivityOutcome::Success,
            ))
            .await
            .unwrap();

        let page = PaginationQuery {
            limit: 2,
            offset: 0,
        };
        let (rows, total) = store.list_activities_for_user(user, &page).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].occurred_at >= rows[1].occurred_at);
    }

    #[tokio::test]
    async fn admin_listing_applies_filters() {
        let store = store();
        let user = UserId::new();
        store
            .record_activity(&activity(user, Provider::Notion, ActivityOutcome::Success))
            .await
            .unwrap();
        store
            .record_activity(&activity(user, Provider::Google, ActivityOutcome::Denied))
            .await
            .unwrap();
        store
            .record_activity(&activity(
                UserId::new(),
                Provider::Google,
                ActivityOutcome::Failure,
            ))
            .await
            .unwrap();

        let filter = ActivityFilter {
            provider: Some(Provider::Google),
            outcome: Some(ActivityOutcome::Denied),
            user_id: None,
        };
        let (rows, total) = store
            .list_all_activities(&filter, &PaginationQuery::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].provider, Provider::Google);
        assert_eq!(rows[0].outcome, ActivityOutcome::Denied);
    }

    #[tokio::test]
    async fn expired_connections_are_hidden_and_reaped() {
        let store = store();
        let user = UserId::new();
        store
            .upsert_active_connection(&NewActiveConnection {
                user_id: user,
                provider: Provider::Notion,
                status: ConnectionStatus::Active,
                expires_at: Some(Utc::now() - Duration::hours(1)),
            })
            .await
            .unwrap();
        store
            .upsert_active_connection(&NewActiveConnection {
                user_id: user,
                provider: Provider::Google,
                status: ConnectionStatus::Active,
                expires_at: None,
            })
            .await
            .unwrap();

        let live = store.list_active_connections().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].provider, Provider::Google);

        let reaped = store.delete_expired_active_connections().await.unwrap();
        assert_eq!(reaped, 1);
        assert_eq!(store.read().active.len(), 1);
    }

    #[tokio::test]
    async fn fresh_grant_resets_connection_use_marks_it() {
        let store = store();
        let user = UserId::new();
        let pending = store
            .upsert_active_connection(&NewActiveConnection {
                user_id: user,
                provider: Provider::Notion,
                status: ConnectionStatus::Pending,
                expires_at: None,
            })
            .await
            .unwrap();
        assert_eq!(pending.status, ConnectionStatus::Pending);
        assert!(pending.last_used_at.is_none());

        let used = store
            .upsert_active_connection(&NewActiveConnection {
                user_id: user,
                provider: Provider::Notion,
                status: ConnectionStatus::Active,
                expires_at: Some(Utc::now() + Duration::hours(24)),
            })
            .await
            .unwrap();
        assert_eq!(used.id, pending.id);
        assert_eq!(used.status, ConnectionStatus::Active);
        assert!(used.last_used_at.is_some());
        assert_eq!(used.connected_at, pending.connected_at);
    }

    #[tokio::test]
    async fn clear_returns_count_and_leaves_ledger_alone() {
        let store = store();
        let user = UserId::new();
        store
            .record_activity(&activity(user, Provider::Notion, ActivityOutcome::Success))
            .await
            .unwrap();
        store
            .upsert_active_connection(&NewActiveConnection {
                user_id: user,
                provider: Provider::Notion,
                status: ConnectionStatus::Active,
                expires_at: None,
            })
            .await
            .unwrap();

        assert_eq!(store.clear_active_connections().await.unwrap(), 1);
        assert!(store.list_active_connections().await.unwrap().is_empty());

        let (_, total) = store
            .list_activities_for_user(user, &PaginationQuery::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn stale_pending_rows_are_pruned_active_rows_are_not() {
        let store = store();
        let user = UserId::new();
        store
            .upsert_active_connection(&NewActiveConnection {
                user_id: user,
                provider: Provider::Notion,
                status: ConnectionStatus::Pending,
                expires_at: None,
            })
            .await
            .unwrap();
        store
            .upsert_active_connection(&NewActiveConnection {
                user_id: user,
                provider: Provider::Google,
                status: ConnectionStatus::Active,
                expires_at: None,
            })
            .await
            .unwrap();

        let pruned = store
            .delete_stale_pending_connections(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
        let remaining = store.list_active_connections().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].provider, Provider::Google);
    }

    #[tokio::test]
    async fn settings_default_off_and_persist_updates() {
        let store = store();
        assert!(!store.get_settings().await.unwrap().global_ephemeral);

        store.update_settings(true).await.unwrap();
        assert!(store.get_settings().await.unwrap().global_ephemeral);
    }
}
