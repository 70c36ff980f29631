//! Notion adapter: pages API plus its OAuth token endpoint.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::config::ProviderCredentials;
use crate::error::GatewayError;
use crate::models::provider::Provider;
use crate::providers::{
    provider_error, transport_error, ProviderAdapter, ProviderIdentity, ProviderItem,
    TokenResponse,
};

const NOTION_API_BASE: &str = "https://api.notion.com";
const NOTION_VERSION: &str = "2022-06-28";
const PAGE_TITLE: &str = "Content from HubSpot AI Integration";

pub struct NotionAdapter {
    http: reqwest::Client,
    api_base: String,
    credentials: ProviderCredentials,
}

impl NotionAdapter {
    pub fn new(credentials: ProviderCredentials) -> Self {
        NotionAdapter {
            http: reqwest::Client::new(),
            api_base: NOTION_API_BASE.to_string(),
            credentials,
        }
    }

    /// Override the API base (for testing with wiremock).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.api_base = url.trim_end_matches('/').to_string();
        self
    }

    fn basic_auth(&self) -> String {
        let raw = format!(
            "{}:{}",
            self.credentials.client_id, self.credentials.client_secret
        );
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }

    fn paragraph_block(content: &str) -> serde_json::Value {
        json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": {
                "rich_text": [{ "type": "text", "text": { "content": content } }]
            }
        })
    }

    /// Writes a paragraph block onto an existing page via the block children
    /// endpoint. Update and append are both expressed this way; Notion has
    /// no in-place content overwrite for blocks we did not track.
    async fn patch_children(
        &self,
        token: &str,
        item_ref: &str,
        content: &str,
    ) -> Result<ProviderItem, GatewayError> {
        let page_id = format_page_id(item_ref);
        let resp = self
            .http
            .patch(format!("{}/v1/blocks/{}/children", self.api_base, page_id))
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&json!({ "children": [Self::paragraph_block(content)] }))
            .send()
            .await
            .map_err(|e| transport_error(Provider::Notion, e))?;

        if !resp.status().is_success() {
            return Err(provider_error(Provider::Notion, resp).await);
        }

        Ok(ProviderItem {
            external_id: page_id.clone(),
            external_url: page_url(&page_id),
        })
    }
}

/// Notion page ids travel both as raw 32-hex strings and as dashed UUIDs;
/// the API only accepts the dashed form.
pub fn format_page_id(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if cleaned.len() == 32 {
        format!(
            "{}-{}-{}-{}-{}",
            &cleaned[0..8],
            &cleaned[8..12],
            &cleaned[12..16],
            &cleaned[16..20],
            &cleaned[20..32]
        )
    } else {
        raw.to_string()
    }
}

/// Shared-page URL; notion.so wants the id without dashes.
pub fn page_url(page_id: &str) -> String {
    format!("https://notion.so/{}", page_id.replace('-', ""))
}

#[derive(Debug, Deserialize)]
struct NotionTokenResponse {
    access_token: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    owner: Option<NotionOwner>,
}

#[derive(Debug, Deserialize)]
struct NotionOwner {
    #[serde(default)]
    user: Option<NotionUser>,
}

#[derive(Debug, Deserialize)]
struct NotionUser {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    person: Option<NotionPerson>,
}

#[derive(Debug, Deserialize)]
struct NotionPerson {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotionMe {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    person: Option<NotionPerson>,
    #[serde(default)]
    bot: Option<NotionBot>,
}

#[derive(Debug, Deserialize)]
struct NotionBot {
    #[serde(default)]
    owner: Option<NotionOwner>,
}

#[derive(Debug, Deserialize)]
struct NotionPage {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

fn identity_from_user(user: Option<NotionUser>) -> ProviderIdentity {
    match user {
        Some(user) => ProviderIdentity {
            id: user.id,
            name: user.name,
            email: user.person.and_then(|p| p.email),
        },
        None => ProviderIdentity {
            id: None,
            name: None,
            email: None,
        },
    }
}

#[async_trait]
impl ProviderAdapter for NotionAdapter {
    fn provider(&self) -> Provider {
        Provider::Notion
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, GatewayError> {
        let mut url = Url::parse(&format!("{}/v1/oauth/authorize", self.api_base))
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("authorize url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("response_type", "code")
            .append_pair("owner", "user")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, GatewayError> {
        let resp = self
            .http
            .post(format!("{}/v1/oauth/token", self.api_base))
            .header("Authorization", self.basic_auth())
            .json(&json!({
                "grant_type": "authorization_code",
                "code": code,
                "redirect_uri": redirect_uri,
            }))
            .send()
            .await
            .map_err(|e| GatewayError::ExchangeFailed {
                provider: Provider::Notion,
                detail: format!("request failed: {e}"),
            })?;

        if !resp.status().is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GatewayError::ExchangeFailed {
                provider: Provider::Notion,
                detail,
            });
        }

        let token: NotionTokenResponse = resp.json().await.map_err(|e| {
            GatewayError::ExchangeFailed {
                provider: Provider::Notion,
                detail: format!("unreadable token response: {e}"),
            }
        })?;

        let owner = token.owner.and_then(|o| o.user);
        let (provider_user_id, provider_email) = match owner {
            Some(user) => (user.id, user.person.and_then(|p| p.email)),
            None => (None, None),
        };

        Ok(TokenResponse {
            access_token: token.access_token,
            // Notion integration tokens do not expire and cannot be refreshed
            refresh_token: None,
            expires_in: None,
            scope: token.scope,
            provider_user_id,
            provider_email,
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, GatewayError> {
        Err(GatewayError::RefreshFailed {
            provider: Provider::Notion,
            detail: "refresh is not supported".to_string(),
        })
    }

    async fn whoami(&self, token: &str) -> Result<ProviderIdentity, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/v1/users/me", self.api_base))
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Notion, e))?;

        if !resp.status().is_success() {
            return Err(provider_error(Provider::Notion, resp).await);
        }

        let me: NotionMe = resp
            .json()
            .await
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("whoami parse failed: {e}")))?;

        // A bot token's /users/me is the bot itself; the human is nested
        // under bot.owner.user.
        if let Some(user) = me.bot.and_then(|b| b.owner).and_then(|o| o.user) {
            return Ok(identity_from_user(Some(user)));
        }
        Ok(ProviderIdentity {
            id: me.id,
            name: me.name,
            email: me.person.and_then(|p| p.email),
        })
    }

    async fn create_item(
        &self,
        token: &str,
        content: &str,
        parent_ref: Option<String>,
    ) -> Result<ProviderItem, GatewayError> {
        let parent = match parent_ref.as_deref() {
            Some(page_id) => json!({ "page_id": format_page_id(page_id) }),
            None => json!({ "workspace": true }),
        };
        let body = json!({
            "parent": parent,
            "properties": {
                "title": {
                    "title": [{ "text": { "content": PAGE_TITLE } }]
                }
            },
            "children": [Self::paragraph_block(content)],
        });

        let resp = self
            .http
            .post(format!("{}/v1/pages", self.api_base))
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Notion, e))?;

        if !resp.status().is_success() {
            return Err(provider_error(Provider::Notion, resp).await);
        }

        let page: NotionPage = resp
            .json()
            .await
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("page parse failed: {e}")))?;

        let external_url = page.url.unwrap_or_else(|| page_url(&page.id));
        Ok(ProviderItem {
            external_id: page.id,
            external_url,
        })
    }

    async fn update_item(
        &self,
        token: &str,
        item_ref: &str,
        content: &str,
    ) -> Result<ProviderItem, GatewayError> {
        self.patch_children(token, item_ref, content).await
    }

    async fn append_item(
        &self,
        token: &str,
        item_ref: &str,
        content: &str,
    ) -> Result<ProviderItem, GatewayError> {
        self.patch_children(token, item_ref, content).await
    }
}
