//! Google Drive adapter: Drive v3 files API plus Google's OAuth endpoints.

use async_trait::async_trait;
use chrono::Utc;
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

const GOOGLE_AUTH_BASE: &str = "https://accounts.google.com";
const GOOGLE_TOKEN_BASE: &str = "https://oauth2.googleapis.com";
const GOOGLE_API_BASE: &str = "https://www.googleapis.com";

/// Only file-scoped Drive access; the gateway never asks for whole-Drive
/// scope.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

const MULTIPART_BOUNDARY: &str = "tether_upload";

pub struct GoogleAdapter {
    http: reqwest::Client,
    auth_base: String,
    token_base: String,
    api_base: String,
    credentials: ProviderCredentials,
}

impl GoogleAdapter {
    pub fn new(credentials: ProviderCredentials) -> Self {
        GoogleAdapter {
            http: reqwest::Client::new(),
            auth_base: GOOGLE_AUTH_BASE.to_string(),
            token_base: GOOGLE_TOKEN_BASE.to_string(),
            api_base: GOOGLE_API_BASE.to_string(),
            credentials,
        }
    }

    /// Point every Google endpoint at one base (for testing with wiremock).
    pub fn with_base_url(mut self, url: &str) -> Self {
        let base = url.trim_end_matches('/').to_string();
        self.auth_base = base.clone();
        self.token_base = base.clone();
        self.api_base = base;
        self
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
    ) -> Result<Result<GoogleTokenResponse, String>, reqwest::Error> {
        let resp = self
            .http
            .post(format!("{}/token", self.token_base))
            .form(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Ok(Err(resp.text().await.unwrap_or_default()));
        }
        Ok(Ok(resp.json::<GoogleTokenResponse>().await?))
    }
}

/// Drive has no media-convert endpoint for plain links; the canonical viewer
/// URL is enough for the audit trail.
pub fn file_url(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{file_id}/view")
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default, rename = "webViewLink")]
    web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveAbout {
    #[serde(default)]
    user: Option<DriveUser>,
}

#[derive(Debug, Deserialize)]
struct DriveUser {
    #[serde(default, rename = "displayName")]
    display_name: Option<String>,
    #[serde(default, rename = "emailAddress")]
    email_address: Option<String>,
    #[serde(default, rename = "permissionId")]
    permission_id: Option<String>,
}

impl From<GoogleTokenResponse> for TokenResponse {
    fn from(resp: GoogleTokenResponse) -> Self {
        TokenResponse {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_in: resp.expires_in,
            scope: resp.scope,
            // identity is a separate Drive about call
            provider_user_id: None,
            provider_email: None,
        }
    }
}

/// multipart/related body for the Drive upload endpoint. Built by hand: the
/// endpoint predates multipart/form-data conventions and reqwest's multipart
/// support emits the wrong content type.
fn multipart_body(metadata: &serde_json::Value, content: &str) -> String {
    format!(
        "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
         --{boundary}\r\nContent-Type: text/plain\r\n\r\n{content}\r\n--{boundary}--",
        boundary = MULTIPART_BOUNDARY,
    )
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, GatewayError> {
        let mut url = Url::parse(&format!("{}/o/oauth2/v2/auth", self.auth_base))
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("authorize url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", DRIVE_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, GatewayError> {
        let form = [
            ("code", code),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];
        match self.token_request(&form).await {
            Ok(Ok(token)) => Ok(token.into()),
            Ok(Err(detail)) => Err(GatewayError::ExchangeFailed {
                provider: Provider::Google,
                detail,
            }),
            Err(e) => Err(GatewayError::ExchangeFailed {
                provider: Provider::Google,
                detail: format!("request failed: {e}"),
            }),
        }
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, GatewayError> {
        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        match self.token_request(&form).await {
            Ok(Ok(token)) => Ok(token.into()),
            Ok(Err(detail)) => Err(GatewayError::RefreshFailed {
                provider: Provider::Google,
                detail,
            }),
            Err(e) => Err(GatewayError::RefreshFailed {
                provider: Provider::Google,
                detail: format!("request failed: {e}"),
            }),
        }
    }

    async fn whoami(&self, token: &str) -> Result<ProviderIdentity, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/drive/v3/about", self.api_base))
            .query(&[("fields", "user")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Google, e))?;

        if !resp.status().is_success() {
            return Err(provider_error(Provider::Google, resp).await);
        }

        let about: DriveAbout = resp
            .json()
            .await
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("about parse failed: {e}")))?;

        let user = about.user.unwrap_or(DriveUser {
            display_name: None,
            email_address: None,
            permission_id: None,
        });
        Ok(ProviderIdentity {
            id: user.permission_id,
            name: user.display_name,
            email: user.email_address,
        })
    }

    async fn create_item(
        &self,
        token: &str,
        content: &str,
        parent_ref: Option<String>,
    ) -> Result<ProviderItem, GatewayError> {
        let name = format!(
            "Content from HubSpot AI Integration - {}",
            Utc::now().format("%Y-%m-%d %H:%M")
        );
        let mut metadata = json!({ "name": name, "mimeType": "text/plain" });
        if let Some(parent) = parent_ref {
            metadata["parents"] = json!([parent]);
        }

        let resp = self
            .http
            .post(format!(
                "{}/upload/drive/v3/files?uploadType=multipart",
                self.api_base
            ))
            .bearer_auth(token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(multipart_body(&metadata, content))
            .send()
            .await
            .map_err(|e| transport_error(Provider::Google, e))?;

        if !resp.status().is_success() {
            return Err(provider_error(Provider::Google, resp).await);
        }

        let file: DriveFile = resp
            .json()
            .await
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("file parse failed: {e}")))?;

        let external_url = file.web_view_link.unwrap_or_else(|| file_url(&file.id));
        Ok(ProviderItem {
            external_id: file.id,
            external_url,
        })
    }

    async fn update_item(
        &self,
        token: &str,
        item_ref: &str,
        content: &str,
    ) -> Result<ProviderItem, GatewayError> {
        let resp = self
            .http
            .patch(format!(
                "{}/upload/drive/v3/files/{}?uploadType=media",
                self.api_base, item_ref
            ))
            .bearer_auth(token)
            .header("Content-Type", "text/plain")
            .body(content.to_string())
            .send()
            .await
            .map_err(|e| transport_error(Provider::Google, e))?;

        if !resp.status().is_success() {
            return Err(provider_error(Provider::Google, resp).await);
        }

        Ok(ProviderItem {
            external_id: item_ref.to_string(),
            external_url: file_url(item_ref),
        })
    }

    /// Drive has no append primitive; appended content is written as a media
    /// update on the same file.
    async fn append_item(
        &self,
        token: &str,
        item_ref: &str,
        content: &str,
    ) -> Result<ProviderItem, GatewayError> {
        self.update_item(token, item_ref, content).await
    }
}
