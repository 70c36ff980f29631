//! Domain error taxonomy for policy enforcement, OAuth mediation, and
//! provider calls.

use thiserror::Error;

use crate::models::provider::Provider;
use crate::models::user::UserRole;

#[derive(Debug, Error)]
/// Everything that can go wrong between "request accepted" and "ledger row
/// written". The first four variants are expected control flow, not faults:
/// handlers surface them verbatim and nothing retries them.
pub enum GatewayError {
    /// The caller's user record does not exist.
    #[error("user identity could not be established")]
    Identity,

    /// No policy row, or an explicit `allowed = false` row. The two cases are
    /// deliberately indistinguishable to the caller.
    #[error("policy denies {role} access to {provider}")]
    PolicyDenied { role: UserRole, provider: Provider },

    /// Auto-disconnect policy and the caller did not flag a fresh grant.
    #[error("{provider} requires fresh authorization before each use")]
    ReauthRequired { provider: Provider },

    /// No stored or presented credential can be used.
    #[error("no usable {provider} credential; authorization required")]
    AuthRequired { provider: Provider },

    /// The user denied the consent screen, abandoned it, or the bounded wait
    /// elapsed. A distinct outcome rather than a fault.
    #[error("authorization was cancelled")]
    Cancelled,

    /// The provider's token endpoint rejected the code exchange.
    #[error("{provider} rejected the authorization code: {detail}")]
    ExchangeFailed { provider: Provider, detail: String },

    /// A refresh attempt failed; the caller must run a full authorization.
    #[error("{provider} token refresh failed: {detail}")]
    RefreshFailed { provider: Provider, detail: String },

    /// Non-2xx from a provider API call. Status and body are preserved
    /// verbatim for the audit trail.
    #[error("{provider} returned status {status}")]
    Provider {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Machine-readable code surfaced in the error envelope. Clients branch
    /// on these, so they are part of the API contract.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Identity => "IDENTITY_ERROR",
            GatewayError::PolicyDenied { .. } => "POLICY_DENIED",
            GatewayError::ReauthRequired { .. } => "REAUTH_REQUIRED",
            GatewayError::AuthRequired { .. } => "AUTH_REQUIRED",
            GatewayError::Cancelled => "CANCELLED",
            GatewayError::ExchangeFailed { .. } => "EXCHANGE_FAILED",
            GatewayError::RefreshFailed { .. } => "REFRESH_FAILED",
            GatewayError::Provider { .. } => "PROVIDER_ERROR",
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::Store(_) | GatewayError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Whether this outcome belongs in a `denied` ledger row (gate reject,
    /// provider untouched) as opposed to a `failure` row.
    pub fn is_enforcement_reject(&self) -> bool {
        matches!(
            self,
            GatewayError::PolicyDenied { .. } | GatewayError::ReauthRequired { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_distinguish_the_403_family() {
        let denied = GatewayError::PolicyDenied {
            role: UserRole::Marketing,
            provider: Provider::Notion,
        };
        let reauth = GatewayError::ReauthRequired {
            provider: Provider::Notion,
        };
        assert_eq!(denied.code(), "POLICY_DENIED");
        assert_eq!(reauth.code(), "REAUTH_REQUIRED");
        assert_ne!(denied.code(), reauth.code());
    }

    #[test]
    fn enforcement_rejects_are_the_denial_rows() {
        assert!(GatewayError::PolicyDenied {
            role: UserRole::Sales,
            provider: Provider::Google,
        }
        .is_enforcement_reject());
        assert!(GatewayError::ReauthRequired {
            provider: Provider::Google,
        }
        .is_enforcement_reject());
        assert!(!GatewayError::Provider {
            provider: Provider::Google,
            status: 502,
            body: "bad".into(),
        }
        .is_enforcement_reject());
        assert!(!GatewayError::AuthRequired {
            provider: Provider::Google,
        }
        .is_enforcement_reject());
    }

    #[test]
    fn provider_error_preserves_status_in_message() {
        let err = GatewayError::Provider {
            provider: Provider::Notion,
            status: 404,
            body: "{\"object\":\"error\"}".into(),
        };
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("notion"));
    }
}
