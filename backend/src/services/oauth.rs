//! OAuth mediation: browser-facing authorization, code exchange, the Token
//! Vault lifecycle, and transparent refresh.
//!
//! Tokens never leave this layer except as opaque strings handed to provider
//! adapters. The only shared in-memory structure is the pending-authorization
//! map; it carries wakeups for `/authorize/wait`, never authority — the vault
//! row in the store is the source of truth for a completed grant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tokio::sync::oneshot;
use utoipa::ToSchema;

use crate::config::Config;
use crate::error::GatewayError;
use crate::models::active_connection::{ConnectionStatus, NewActiveConnection};
use crate::models::activity::{ActivityOutcome, NewActivity};
use crate::models::oauth_connection::{ConnectionSummary, NewOAuthConnection, OAuthConnection};
use crate::models::provider::{ActionKind, Provider};
use crate::providers::{split_scopes, ProviderRegistry};
use crate::services::policy::resolve_policy;
use crate::services::with_provider_timeout;
use crate::store::Store;
use crate::types::UserId;

/// Length of the anti-forgery `state` parameter.
const STATE_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Response for `GET /api/integrations/{provider}/authorize`.
pub struct AuthorizationStart {
    /// Provider consent URL the browser should open.
    pub auth_url: String,
    /// Anti-forgery token; also the key for `/authorize/wait`.
    pub state: String,
}

#[derive(Debug, Clone)]
/// How one interactive authorization ended.
pub enum AuthorizationOutcome {
    Completed(ConnectionSummary),
    /// The user denied or abandoned the grant, or the wait elapsed.
    Cancelled,
}

/// One in-flight interactive authorization, keyed by `state`.
struct PendingAuthorization {
    user_id: UserId,
    provider: Provider,
    deadline: DateTime<Utc>,
    /// Attached by `/authorize/wait`; absent when nobody is waiting.
    waiter: Option<oneshot::Sender<AuthorizationOutcome>>,
}

impl PendingAuthorization {
    fn resolve(self, outcome: AuthorizationOutcome) {
        if let Some(tx) = self.waiter {
            // waiter may have timed out and gone away
            let _ = tx.send(outcome);
        }
    }
}

pub struct OauthMediator {
    store: Arc<dyn Store>,
    registry: ProviderRegistry,
    config: Arc<Config>,
    pending: Mutex<HashMap<String, PendingAuthorization>>,
}

impl OauthMediator {
    pub fn new(store: Arc<dyn Store>, registry: ProviderRegistry, config: Arc<Config>) -> Self {
        OauthMediator {
            store,
            registry,
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Starts an interactive authorization: mints the anti-forgery state,
    /// registers it with a deadline, and returns the provider consent URL.
    pub fn begin_authorization(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<AuthorizationStart, GatewayError> {
        let adapter = self.registry.get(provider)?;
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LEN)
            .map(char::from)
            .collect();
        let redirect_uri = self.config.callback_url(provider.as_str());
        let auth_url = adapter.authorize_url(&state, &redirect_uri)?;

        let now = Utc::now();
        let deadline = now + Duration::seconds(self.config.auth_wait_secs as i64);
        {
            let mut pending = self.guard();
            prune_expired(&mut pending, now);
            pending.insert(
                state.clone(),
                PendingAuthorization {
                    user_id,
                    provider,
                    deadline,
                    waiter: None,
                },
            );
        }

        tracing::info!(%user_id, %provider, "authorization started");
        Ok(AuthorizationStart { auth_url, state })
    }

    /// Exchanges an authorization code, stores the credential, records the
    /// grant in the ledger, and books a `pending` connection for policies
    /// that keep connections alive.
    pub async fn complete_authorization(
        &self,
        user_id: UserId,
        provider: Provider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthConnection, GatewayError> {
        let adapter = self.registry.get(provider)?;
        let token = with_provider_timeout(
            provider,
            self.provider_timeout(),
            adapter.exchange_code(code, redirect_uri),
        )
        .await?;

        let expires_at = token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));

        // Notion bundles identity with the exchange; Google needs a followup
        // call. Identity is cosmetic, so a failed lookup does not fail the
        // grant.
        let mut provider_user_id = token.provider_user_id.clone();
        let mut provider_email = token.provider_email.clone();
        if provider_user_id.is_none() && provider_email.is_none() {
            match with_provider_timeout(
                provider,
                self.provider_timeout(),
                adapter.whoami(&token.access_token),
            )
            .await
            {
                Ok(identity) => {
                    provider_user_id = identity.id;
                    provider_email = identity.email;
                }
                Err(err) => {
                    tracing::warn!(%provider, error = %err, "provider identity lookup failed");
                }
            }
        }

        let stored = self
            .store
            .upsert_oauth_connection(&NewOAuthConnection {
                user_id,
                provider,
                access_token: token.access_token,
                refresh_token: token.refresh_token,
                expires_at,
                scopes: split_scopes(token.scope.as_deref()),
                provider_user_id,
                provider_email,
            })
            .await?;

        self.store
            .record_activity(&NewActivity {
                user_id,
                provider,
                action: ActionKind::Connect,
                content_preview: None,
                target_ref: None,
                external_url: None,
                outcome: ActivityOutcome::Success,
                error: None,
            })
            .await?;

        let policy = resolve_policy(self.store.as_ref(), user_id, provider).await?;
        if policy.allowed && !policy.auto_disconnect {
            self.store
                .upsert_active_connection(&NewActiveConnection {
                    user_id,
                    provider,
                    status: ConnectionStatus::Pending,
                    expires_at: policy.lease.expires_at(),
                })
                .await?;
        }

        tracing::info!(%user_id, %provider, "authorization completed");
        Ok(stored)
    }

    /// Removes any stored credential for the pair so the next begin/complete
    /// cycle cannot be satisfied by a stale grant.
    pub async fn force_fresh_authorization(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<(), GatewayError> {
        if self
            .store
            .delete_oauth_connection(user_id, provider)
            .await?
        {
            tracing::info!(%user_id, %provider, "stored credential discarded for fresh grant");
        }
        Ok(())
    }

    /// Returns an access token safe to present right now, refreshing and
    /// persisting transparently when the stored one is stale. `None` means
    /// the user has to go through authorization.
    pub async fn get_usable_token(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<Option<String>, GatewayError> {
        let Some(stored) = self.store.get_oauth_connection(user_id, provider).await? else {
            return Ok(None);
        };
        if stored.is_fresh(Utc::now()) {
            return Ok(Some(stored.access_token));
        }
        let Some(refresh) = stored.refresh_token.clone() else {
            return Ok(None);
        };

        let adapter = self.registry.get(provider)?;
        let refreshed = with_provider_timeout(
            provider,
            self.provider_timeout(),
            adapter.refresh_token(&refresh),
        )
        .await?;

        let expires_at = refreshed
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        let scopes = if refreshed.scope.is_some() {
            split_scopes(refreshed.scope.as_deref())
        } else {
            stored.scopes.clone()
        };

        // refresh responses usually omit the refresh token; keep the old one
        let updated = self
            .store
            .upsert_oauth_connection(&NewOAuthConnection {
                user_id,
                provider,
                access_token: refreshed.access_token,
                refresh_token: refreshed.refresh_token.or(stored.refresh_token),
                expires_at,
                scopes,
                provider_user_id: stored.provider_user_id,
                provider_email: stored.provider_email,
            })
            .await?;

        tracing::debug!(%user_id, %provider, "access token refreshed");
        Ok(Some(updated.access_token))
    }

    /// Suspends until the callback resolves `state` or the bounded wait
    /// elapses. Elapsing is a `Cancelled` outcome, not an error.
    pub async fn await_authorization(
        &self,
        user_id: UserId,
        provider: Provider,
        state: &str,
    ) -> Result<AuthorizationOutcome, GatewayError> {
        let rx = {
            let mut pending = self.guard();
            let entry = pending
                .get_mut(state)
                .filter(|e| e.user_id == user_id && e.provider == provider)
                .ok_or_else(|| GatewayError::NotFound("pending authorization".to_string()))?;
            let (tx, rx) = oneshot::channel();
            entry.waiter = Some(tx);
            rx
        };

        let wait = StdDuration::from_secs(self.config.auth_wait_secs);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            // sender dropped: the entry was pruned without resolution
            Ok(Err(_)) => Ok(AuthorizationOutcome::Cancelled),
            Err(_) => Ok(AuthorizationOutcome::Cancelled),
        }
    }

    /// Resolves a provider redirect. Consumes the pending entry, completes
    /// the exchange when a code is present, and wakes any waiter.
    pub async fn resolve_callback(
        &self,
        provider: Provider,
        state: &str,
        code: Option<&str>,
        error: Option<&str>,
    ) -> Result<AuthorizationOutcome, GatewayError> {
        let entry = self.guard().remove(state);
        let Some(entry) = entry else {
            return Err(GatewayError::NotFound("pending authorization".to_string()));
        };
        if entry.provider != provider || Utc::now() > entry.deadline {
            entry.resolve(AuthorizationOutcome::Cancelled);
            return Ok(AuthorizationOutcome::Cancelled);
        }

        if let Some(reason) = error {
            tracing::info!(%provider, reason, "authorization declined at the provider");
            entry.resolve(AuthorizationOutcome::Cancelled);
            return Ok(AuthorizationOutcome::Cancelled);
        }
        let Some(code) = code else {
            entry.resolve(AuthorizationOutcome::Cancelled);
            return Ok(AuthorizationOutcome::Cancelled);
        };

        let redirect_uri = self.config.callback_url(provider.as_str());
        match self
            .complete_authorization(entry.user_id, provider, code, &redirect_uri)
            .await
        {
            Ok(connection) => {
                let outcome = AuthorizationOutcome::Completed(ConnectionSummary::from(&connection));
                entry.resolve(outcome.clone());
                Ok(outcome)
            }
            Err(err) => {
                entry.resolve(AuthorizationOutcome::Cancelled);
                Err(err)
            }
        }
    }

    /// User-initiated disconnect: removes the stored credential and the
    /// active-connection row. Ledger history stays. Returns whether anything
    /// was removed.
    pub async fn disconnect(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<bool, GatewayError> {
        let vault = self.store.delete_oauth_connection(user_id, provider).await?;
        let active = self.store.delete_active_connection(user_id, provider).await?;
        if vault || active {
            tracing::info!(%user_id, %provider, "disconnected");
        }
        Ok(vault || active)
    }

    fn provider_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.config.provider_timeout_secs)
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, PendingAuthorization>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.guard().len()
    }
}

fn prune_expired(pending: &mut HashMap<String, PendingAuthorization>, now: DateTime<Utc>) {
    let expired: Vec<String> = pending
        .iter()
        .filter(|(_, entry)| now > entry.deadline)
        .map(|(state, _)| state.clone())
        .collect();
    for state in expired {
        if let Some(entry) = pending.remove(&state) {
            entry.resolve(AuthorizationOutcome::Cancelled);
        }
    }
}
