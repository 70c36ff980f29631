//! The policy-gated gateway: every provider write funnels through
//! [`Gateway::perform_action`].
//!
//! One invocation runs policy → token → provider → ledger, in that order,
//! with no automatic retry. Retries are caller-initiated and must re-present
//! `is_reauth_attempt`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::config::Config;
use crate::error::GatewayError;
use crate::models::active_connection::{ConnectionStatus, NewActiveConnection};
use crate::models::activity::{content_preview, ActivityOutcome, NewActivity};
use crate::models::provider::{ActionKind, Provider};
use crate::providers::{ProviderAdapter, ProviderItem, ProviderIdentity, ProviderRegistry};
use crate::services::oauth::OauthMediator;
use crate::services::policy::{resolve_policy, ResolvedPolicy};
use crate::services::with_provider_timeout;
use crate::store::Store;
use crate::types::UserId;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
/// Body of `POST /api/integrations/{provider}/content`.
pub struct ActionRequest {
    /// What to do: create, update or append.
    pub action: ActionKind,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub content: String,
    /// Item to update/append to, or the parent to create under.
    pub target_ref: Option<String>,
    /// Set by callers retrying after `REAUTH_REQUIRED` with a fresh grant.
    #[serde(default)]
    pub is_reauth_attempt: bool,
    /// Token straight from an OAuth completion; bypasses the vault lookup.
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// What a successful gateway invocation tells the caller.
pub struct ActionOutcome {
    pub success: bool,
    /// Provider-side id of the touched item.
    pub external_id: String,
    /// Link a human can open.
    pub external_url: String,
}

pub struct Gateway {
    store: Arc<dyn Store>,
    registry: ProviderRegistry,
    mediator: Arc<OauthMediator>,
    provider_timeout: StdDuration,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn Store>,
        registry: ProviderRegistry,
        mediator: Arc<OauthMediator>,
        config: &Config,
    ) -> Self {
        Gateway {
            store,
            registry,
            mediator,
            provider_timeout: StdDuration::from_secs(config.provider_timeout_secs),
        }
    }

    /// Runs one gated provider action.
    ///
    /// Enforcement rejects (`PolicyDenied`, `ReauthRequired`) write a
    /// `denied` ledger row and never touch the provider. Once both gates
    /// clear, any failure writes exactly one `failure` row and every success
    /// exactly one `success` row.
    pub async fn perform_action(
        &self,
        user_id: UserId,
        provider: Provider,
        request: &ActionRequest,
    ) -> Result<ActionOutcome, GatewayError> {
        let policy = resolve_policy(self.store.as_ref(), user_id, provider).await?;

        if !policy.allowed {
            let err = GatewayError::PolicyDenied {
                role: policy.role,
                provider,
            };
            self.record_denial(user_id, provider, request.action, &err)
                .await?;
            tracing::warn!(%user_id, %provider, role = %policy.role, "action denied by policy");
            return Err(err);
        }

        if policy.auto_disconnect && !request.is_reauth_attempt {
            let err = GatewayError::ReauthRequired { provider };
            self.record_denial(user_id, provider, request.action, &err)
                .await?;
            tracing::info!(%user_id, %provider, "fresh grant required before this action");
            return Err(err);
        }

        match self.attempt(user_id, provider, &policy, request).await {
            Ok(outcome) => {
                tracing::info!(
                    %user_id,
                    %provider,
                    action = request.action.as_str(),
                    target = %outcome.external_id,
                    "action completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                let failure = NewActivity {
                    user_id,
                    provider,
                    action: request.action,
                    content_preview: Some(content_preview(&request.content)),
                    target_ref: request.target_ref.clone(),
                    external_url: None,
                    outcome: ActivityOutcome::Failure,
                    error: Some(err.to_string()),
                };
                // surface the original failure even if the ledger write dies
                if let Err(ledger_err) = self.store.record_activity(&failure).await {
                    tracing::error!(error = %ledger_err, "failure row could not be recorded");
                }
                tracing::warn!(%user_id, %provider, error = %err, "action failed");
                Err(err)
            }
        }
    }

    /// Validates a token against the provider: the presented one when given,
    /// otherwise whatever the vault can produce.
    pub async fn whoami(
        &self,
        user_id: UserId,
        provider: Provider,
        presented: Option<&str>,
    ) -> Result<ProviderIdentity, GatewayError> {
        let token = match presented.filter(|t| !t.is_empty()) {
            Some(token) => token.to_string(),
            None => self
                .mediator
                .get_usable_token(user_id, provider)
                .await?
                .ok_or(GatewayError::AuthRequired { provider })?,
        };
        let adapter = self.registry.get(provider)?;
        with_provider_timeout(provider, self.provider_timeout, adapter.whoami(&token)).await
    }

    async fn record_denial(
        &self,
        user_id: UserId,
        provider: Provider,
        action: ActionKind,
        err: &GatewayError,
    ) -> Result<(), GatewayError> {
        self.store
            .record_activity(&NewActivity::denied(
                user_id,
                provider,
                action,
                &err.to_string(),
            ))
            .await?;
        Ok(())
    }

    /// Steps 3-5: token, provider call, success bookkeeping.
    async fn attempt(
        &self,
        user_id: UserId,
        provider: Provider,
        policy: &ResolvedPolicy,
        request: &ActionRequest,
    ) -> Result<ActionOutcome, GatewayError> {
        let token = match request.access_token.as_deref().filter(|t| !t.is_empty()) {
            Some(presented) => presented.to_string(),
            None => self
                .mediator
                .get_usable_token(user_id, provider)
                .await?
                .ok_or(GatewayError::AuthRequired { provider })?,
        };

        let adapter = self.registry.get(provider)?;
        let item = self
            .dispatch(provider, adapter.as_ref(), &token, request)
            .await?;

        self.store
            .record_activity(&NewActivity {
                user_id,
                provider,
                action: request.action,
                content_preview: Some(content_preview(&request.content)),
                target_ref: Some(item.external_id.clone()),
                external_url: Some(item.external_url.clone()),
                outcome: ActivityOutcome::Success,
                error: None,
            })
            .await?;

        if policy.auto_disconnect {
            // the grant was single-use; discard it so the next action needs
            // a fresh one
            self.store.delete_oauth_connection(user_id, provider).await?;
        } else {
            self.store
                .upsert_active_connection(&NewActiveConnection {
                    user_id,
                    provider,
                    status: ConnectionStatus::Active,
                    expires_at: policy.lease.expires_at(),
                })
                .await?;
        }

        Ok(ActionOutcome {
            success: true,
            external_id: item.external_id,
            external_url: item.external_url,
        })
    }

    /// Exactly one provider call per invocation, bounded by the provider
    /// timeout.
    async fn dispatch(
        &self,
        provider: Provider,
        adapter: &dyn ProviderAdapter,
        token: &str,
        request: &ActionRequest,
    ) -> Result<ProviderItem, GatewayError> {
        let call = async {
            match request.action {
                ActionKind::Create => {
                    adapter
                        .create_item(token, &request.content, request.target_ref.clone())
                        .await
                }
                ActionKind::Update => {
                    let item_ref = request.target_ref.as_deref().ok_or_else(|| {
                        GatewayError::Internal(anyhow::anyhow!("update requires a target reference"))
                    })?;
                    adapter.update_item(token, item_ref, &request.content).await
                }
                ActionKind::Append => {
                    let item_ref = request.target_ref.as_deref().ok_or_else(|| {
                        GatewayError::Internal(anyhow::anyhow!("append requires a target reference"))
                    })?;
                    adapter.append_item(token, item_ref, &request.content).await
                }
                ActionKind::Connect => Err(GatewayError::Internal(anyhow::anyhow!(
                    "connect is not a content action"
                ))),
            }
        };
        with_provider_timeout(provider, self.provider_timeout, call).await
    }
}
