//! Provider adapters: the only place provider-specific wire formats live.
//!
//! Everything above this layer speaks generic intent (create / update /
//! append, exchange / refresh / whoami). Supporting a new provider means one
//! adapter plus one registry entry.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::config::Config;
use crate::error::GatewayError;
use crate::models::provider::Provider;

pub mod demo;
pub mod google;
pub mod notion;

pub use demo::DemoAdapter;
pub use google::GoogleAdapter;
pub use notion::NotionAdapter;

#[derive(Debug, Clone, PartialEq, Eq)]
/// What a successful content call produced.
pub struct ProviderItem {
    /// Provider-side id of the page/file.
    pub external_id: String,
    /// Link a human can open.
    pub external_url: String,
}

#[derive(Debug, Clone)]
/// Parsed token-endpoint response, shared across exchange and refresh.
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds; absent when the provider issues non-expiring
    /// tokens (Notion).
    pub expires_in: Option<i64>,
    /// Space-separated scope string as the provider reported it.
    pub scope: Option<String>,
    /// Identity details some providers bundle with the exchange (Notion
    /// does, Google does not).
    pub provider_user_id: Option<String>,
    pub provider_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Identity the provider reports for a token.
pub struct ProviderIdentity {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Whether this adapter fabricates results instead of calling the
    /// provider. Surfaced in the provider catalog so clients can label the
    /// mode.
    fn is_demo(&self) -> bool {
        false
    }

    /// Authorization URL the user's browser is sent to.
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, GatewayError>;

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, GatewayError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, GatewayError>;

    async fn whoami(&self, token: &str) -> Result<ProviderIdentity, GatewayError>;

    async fn create_item(
        &self,
        token: &str,
        content: &str,
        parent_ref: Option<String>,
    ) -> Result<ProviderItem, GatewayError>;

    async fn update_item(
        &self,
        token: &str,
        item_ref: &str,
        content: &str,
    ) -> Result<ProviderItem, GatewayError>;

    async fn append_item(
        &self,
        token: &str,
        item_ref: &str,
        content: &str,
    ) -> Result<ProviderItem, GatewayError>;
}

/// Maps the provider enum to its adapter. Built once at startup and shared.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            adapters: HashMap::new(),
        }
    }

    /// Real adapter per provider with configured credentials, labeled demo
    /// adapter otherwise. Misconfiguration degrades a provider, never the
    /// process.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = ProviderRegistry::new();

        if config.notion.configured() {
            registry.register(Arc::new(NotionAdapter::new(config.notion.clone())));
        } else {
            tracing::warn!(provider = "notion", "credentials missing, running in demo mode");
            registry.register(Arc::new(DemoAdapter::new(Provider::Notion)));
        }

        if config.google.configured() {
            registry.register(Arc::new(GoogleAdapter::new(config.google.clone())));
        } else {
            tracing::warn!(provider = "google", "credentials missing, running in demo mode");
            registry.register(Arc::new(DemoAdapter::new(Provider::Google)));
        }

        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ProviderAdapter>, GatewayError> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("{provider} adapter")))
    }

    /// Catalog entries for `GET /api/integrations/providers`.
    pub fn catalog(&self) -> Vec<ProviderInfo> {
        let mut entries: Vec<ProviderInfo> = Provider::all()
            .into_iter()
            .filter_map(|provider| {
                self.adapters.get(&provider).map(|adapter| ProviderInfo {
                    provider,
                    display_name: provider.display_name().to_string(),
                    demo_mode: adapter.is_demo(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.provider.as_str().cmp(b.provider.as_str()));
        entries
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// One row of the provider catalog.
pub struct ProviderInfo {
    pub provider: Provider,
    pub display_name: String,
    pub demo_mode: bool,
}

/// Turns a non-success response into the audit-preserving provider error.
pub(crate) async fn provider_error(provider: Provider, resp: reqwest::Response) -> GatewayError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    GatewayError::Provider {
        provider,
        status,
        body,
    }
}

/// Transport-level failure (refused connection, DNS, TLS). No upstream status
/// exists, so the gateway reports its own 502.
pub(crate) fn transport_error(provider: Provider, err: reqwest::Error) -> GatewayError {
    GatewayError::Provider {
        provider,
        status: 502,
        body: format!("request failed: {err}"),
    }
}

/// Splits a provider's space-separated scope string.
pub(crate) fn split_scopes(scope: Option<&str>) -> Vec<String> {
    scope
        .map(|s| s.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}
