//! Demo adapter: stands in for a provider whose OAuth credentials are not
//! configured. Fabricates plausible results, performs no network I/O, and
//! reports itself in the catalog so the mode is visible.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use url::Url;

use crate::error::GatewayError;
use crate::models::provider::Provider;
use crate::providers::google::{file_url, DRIVE_SCOPE};
use crate::providers::notion::page_url;
use crate::providers::{ProviderAdapter, ProviderIdentity, ProviderItem, TokenResponse};

pub struct DemoAdapter {
    provider: Provider,
}

impl DemoAdapter {
    pub fn new(provider: Provider) -> Self {
        DemoAdapter { provider }
    }

    fn suffix(len: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(|c| (c as char).to_ascii_lowercase())
            .collect()
    }

    fn item_id(&self) -> String {
        match self.provider {
            Provider::Notion => format!("demo-page-{}", Self::suffix(9)),
            Provider::Google => format!("demo-file-{}", Self::suffix(9)),
        }
    }

    fn item_url(&self, id: &str) -> String {
        match self.provider {
            Provider::Notion => page_url(id),
            Provider::Google => file_url(id),
        }
    }

    fn item(&self, id: String) -> ProviderItem {
        let external_url = self.item_url(&id);
        ProviderItem {
            external_id: id,
            external_url,
        }
    }
}

#[async_trait]
impl ProviderAdapter for DemoAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn is_demo(&self) -> bool {
        true
    }

    /// Sends the browser straight back to the callback with a demo code, so
    /// the normal begin/callback/complete flow runs without a provider.
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, GatewayError> {
        let mut url = Url::parse(redirect_uri)
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("redirect uri: {e}")))?;
        url.query_pairs_mut()
            .append_pair("code", &format!("demo-{}", Self::suffix(12)))
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenResponse, GatewayError> {
        let (refresh_token, expires_in, scope) = match self.provider {
            // mirror the real providers' token shapes
            Provider::Notion => (None, None, None),
            Provider::Google => (
                Some(format!("demo-refresh-{}", Self::suffix(16))),
                Some(3600),
                Some(DRIVE_SCOPE.to_string()),
            ),
        };
        Ok(TokenResponse {
            access_token: format!("demo-token-{}", Self::suffix(16)),
            refresh_token,
            expires_in,
            scope,
            provider_user_id: Some("demo-user".to_string()),
            provider_email: Some("demo@example.com".to_string()),
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, GatewayError> {
        match self.provider {
            Provider::Notion => Err(GatewayError::RefreshFailed {
                provider: self.provider,
                detail: "refresh is not supported".to_string(),
            }),
            Provider::Google => Ok(TokenResponse {
                access_token: format!("demo-token-{}", Self::suffix(16)),
                refresh_token: None,
                expires_in: Some(3600),
                scope: Some(DRIVE_SCOPE.to_string()),
                provider_user_id: None,
                provider_email: None,
            }),
        }
    }

    async fn whoami(&self, _token: &str) -> Result<ProviderIdentity, GatewayError> {
        Ok(ProviderIdentity {
            id: Some("demo-user".to_string()),
            name: Some("Demo User".to_string()),
            email: Some("demo@example.com".to_string()),
        })
    }

    async fn create_item(
        &self,
        _token: &str,
        _content: &str,
        _parent_ref: Option<String>,
    ) -> Result<ProviderItem, GatewayError> {
        Ok(self.item(self.item_id()))
    }

    async fn update_item(
        &self,
        _token: &str,
        item_ref: &str,
        _content: &str,
    ) -> Result<ProviderItem, GatewayError> {
        Ok(self.item(item_ref.to_string()))
    }

    async fn append_item(
        &self,
        _token: &str,
        item_ref: &str,
        _content: &str,
    ) -> Result<ProviderItem, GatewayError> {
        Ok(self.item(item_ref.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_ids_carry_the_provider_prefix() {
        let notion = DemoAdapter::new(Provider::Notion);
        let page = notion.create_item("t", "content", None).await.unwrap();
        assert!(page.external_id.starts_with("demo-page-"));
        assert!(page.external_url.starts_with("https://notion.so/"));

        let google = DemoAdapter::new(Provider::Google);
        let file = google.create_item("t", "content", None).await.unwrap();
        assert!(file.external_id.starts_with("demo-file-"));
        assert!(file
            .external_url
            .starts_with("https://drive.google.com/file/d/"));
    }

    #[test]
    fn demo_authorize_url_short_circuits_to_the_callback() {
        let adapter = DemoAdapter::new(Provider::Google);
        let url = adapter
            .authorize_url("st4te", "http://localhost:3001/api/integrations/google/callback")
            .unwrap();
        assert!(url.starts_with("http://localhost:3001/api/integrations/google/callback?"));
        assert!(url.contains("code=demo-"));
        assert!(url.contains("state=st4te"));
    }

    #[tokio::test]
    async fn demo_token_shapes_mirror_real_providers() {
        let notion = DemoAdapter::new(Provider::Notion);
        let token = notion.exchange_code("demo-code", "uri").await.unwrap();
        assert!(token.refresh_token.is_none());
        assert!(token.expires_in.is_none());

        let google = DemoAdapter::new(Provider::Google);
        let token = google.exchange_code("demo-code", "uri").await.unwrap();
        assert!(token.refresh_token.is_some());
        assert_eq!(token.expires_in, Some(3600));
        assert!(notion.refresh_token("x").await.is_err());
        assert!(google.refresh_token("x").await.is_ok());
    }
}
