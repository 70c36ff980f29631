//! Token Vault rows: stored OAuth credentials, one per (user, provider).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::provider::Provider;
use crate::types::{ConnectionId, UserId};

/// Clock skew allowed when deciding whether a stored token is still fresh.
pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// A stored OAuth credential. Tokens never leave the backend; API responses
/// use [`ConnectionSummary`] instead.
pub struct OAuthConnection {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// NULL when the provider did not report an expiry; treated as
    /// non-expiring.
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub provider_user_id: Option<String>,
    pub provider_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OAuthConnection {
    /// Whether the access token can be presented right now, with a safety
    /// skew so a token about to expire is not sent upstream.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => at - Duration::seconds(TOKEN_EXPIRY_SKEW_SECS) > now,
        }
    }

    /// Expired with no refresh token means the row cannot produce a usable
    /// credential and the user must re-authenticate.
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.is_some()
    }
}

#[derive(Debug, Clone)]
/// Insert/upsert payload for the vault. The store generates id/timestamps.
pub struct NewOAuthConnection {
    pub user_id: UserId,
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub provider_user_id: Option<String>,
    pub provider_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// What the API discloses about a stored connection. No token material.
pub struct ConnectionSummary {
    pub provider: Provider,
    pub provider_email: Option<String>,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub connected_at: DateTime<Utc>,
}

impl From<&OAuthConnection> for ConnectionSummary {
    fn from(conn: &OAuthConnection) -> Self {
        ConnectionSummary {
            provider: conn.provider,
            provider_email: conn.provider_email.clone(),
            scopes: conn.scopes.clone(),
            expires_at: conn.expires_at,
            connected_at: conn.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(expires_at: Option<DateTime<Utc>>, refresh: Option<&str>) -> OAuthConnection {
        OAuthConnection {
            id: ConnectionId::new(),
            user_id: UserId::new(),
            provider: Provider::Google,
            access_token: "at".into(),
            refresh_token: refresh.map(String::from),
            expires_at,
            scopes: vec!["https://www.googleapis.com/auth/drive.file".into()],
            provider_user_id: None,
            provider_email: Some("user@example.com".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn no_expiry_is_always_fresh() {
        let conn = connection(None, None);
        assert!(conn.is_fresh(Utc::now()));
    }

    #[test]
    fn expiry_within_skew_counts_as_stale() {
        let now = Utc::now();
        let conn = connection(Some(now + Duration::seconds(30)), Some("rt"));
        assert!(!conn.is_fresh(now));
        assert!(conn.is_refreshable());
    }

    #[test]
    fn expiry_beyond_skew_is_fresh() {
        let now = Utc::now();
        let conn = connection(Some(now + Duration::seconds(3600)), None);
        assert!(conn.is_fresh(now));
    }

    #[test]
    fn summary_never_carries_tokens() {
        let conn = connection(None, Some("rt"));
        let summary = ConnectionSummary::from(&conn);
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("access_token").is_none());
        assert!(json.get("refresh_token").is_none());
        assert_eq!(json["provider"], "google");
    }
}
