//! Append-only ledger rows describing every gateway attempt and its outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::models::provider::{ActionKind, Provider};
use crate::types::{ActivityId, UserId};

/// Ledger previews keep the first 100 characters of the submitted content.
pub const PREVIEW_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
/// How an attempt ended. `denied` rows come from the enforcement gate and
/// never reached a provider; `failure` rows did.
pub enum ActivityOutcome {
    Success,
    Failure,
    Denied,
}

impl ActivityOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityOutcome::Success => "success",
            ActivityOutcome::Failure => "failure",
            ActivityOutcome::Denied => "denied",
        }
    }
}

impl std::str::FromStr for ActivityOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ActivityOutcome::Success),
            "failure" => Ok(ActivityOutcome::Failure),
            "denied" => Ok(ActivityOutcome::Denied),
            other => Err(format!("unknown outcome: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
/// One immutable ledger row. Rows are inserted once and never updated.
pub struct IntegrationActivity {
    pub id: ActivityId,
    pub user_id: UserId,
    pub provider: Provider,
    pub action: ActionKind,
    /// First 100 chars of the submitted content; absent on denial rows.
    pub content_preview: Option<String>,
    /// Provider-side identifier of the touched item, when one exists.
    pub target_ref: Option<String>,
    /// Link a human can open to see the result.
    pub external_url: Option<String>,
    pub outcome: ActivityOutcome,
    pub error: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
/// Insert payload for the ledger. The store assigns id and timestamp.
pub struct NewActivity {
    pub user_id: UserId,
    pub provider: Provider,
    pub action: ActionKind,
    pub content_preview: Option<String>,
    pub target_ref: Option<String>,
    pub external_url: Option<String>,
    pub outcome: ActivityOutcome,
    pub error: Option<String>,
}

impl NewActivity {
    /// A denial row: the gate rejected before any provider traffic, so no
    /// content preview is kept.
    pub fn denied(user_id: UserId, provider: Provider, action: ActionKind, error: &str) -> Self {
        NewActivity {
            user_id,
            provider,
            action,
            content_preview: None,
            target_ref: None,
            external_url: None,
            outcome: ActivityOutcome::Denied,
            error: Some(error.to_string()),
        }
    }
}

/// Truncates ledger preview text to [`PREVIEW_MAX_CHARS`] characters plus an
/// ellipsis marker. Operates on characters, not bytes, so multi-byte content
/// cannot be split mid-codepoint.
pub fn content_preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_MAX_CHARS {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{truncated}...")
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
/// Admin-side ledger filters; all optional and combinable.
pub struct ActivityFilter {
    /// Restrict to one user.
    pub user_id: Option<UserId>,
    /// Restrict to one provider.
    pub provider: Option<Provider>,
    /// Restrict to one outcome.
    pub outcome: Option<ActivityOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_kept_verbatim() {
        assert_eq!(content_preview("hello"), "hello");
        let exactly = "x".repeat(PREVIEW_MAX_CHARS);
        assert_eq!(content_preview(&exactly), exactly);
    }

    #[test]
    fn long_content_is_truncated_with_ellipsis() {
        let long = "a".repeat(250);
        let preview = content_preview(&long);
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let long: String = "あ".repeat(150);
        let preview = content_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 3);
    }

    #[test]
    fn denial_rows_carry_no_preview() {
        let row = NewActivity::denied(
            UserId::new(),
            Provider::Notion,
            ActionKind::Create,
            "connection not allowed",
        );
        assert_eq!(row.outcome, ActivityOutcome::Denied);
        assert!(row.content_preview.is_none());
        assert!(row.error.is_some());
    }

    #[test]
    fn outcome_serde_is_snake_case() {
        let o: ActivityOutcome = serde_json::from_str("\"denied\"").unwrap();
        assert_eq!(o, ActivityOutcome::Denied);
        assert_eq!(
            serde_json::to_string(&ActivityOutcome::Success).unwrap(),
            "\"success\""
        );
    }
}
