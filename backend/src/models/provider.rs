//! Provider vocabulary: which integration targets exist and what can be done
//! against them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, ToSchema)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
/// An external integration target. Adding a variant here plus a registered
/// adapter is the whole cost of supporting a new provider.
pub enum Provider {
    /// Notion workspace pages.
    Notion,
    /// Google Drive files.
    Google,
}

impl Provider {
    /// Returns the canonical snake_case representation of the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Notion => "notion",
            Provider::Google => "google",
        }
    }

    /// Human-readable provider name for catalog and audit output.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Notion => "Notion",
            Provider::Google => "Google Drive",
        }
    }

    /// Every provider, in display order.
    pub fn all() -> [Provider; 2] {
        [Provider::Notion, Provider::Google]
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notion" => Ok(Provider::Notion),
            "google" => Ok(Provider::Google),
            // older clients sent the Drive product name
            "google-drive" | "google_drive" => Ok(Provider::Google),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

impl Serialize for Provider {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Provider {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| serde::de::Error::unknown_variant(&s, &["notion", "google"]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
/// What a gateway invocation (or OAuth grant) did against a provider.
pub enum ActionKind {
    /// Create a new page/file.
    Create,
    /// Overwrite content of an existing item.
    Update,
    /// Append content to an existing item.
    Append,
    /// OAuth grant completed; no content involved.
    Connect,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Append => "append",
            ActionKind::Connect => "connect",
        }
    }

    /// Content actions are the ones a caller may request through the gateway;
    /// `connect` rows are written only by the OAuth mediator.
    pub fn is_content_action(&self) -> bool {
        !matches!(self, ActionKind::Connect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_serde_round_trip() {
        let p: Provider = serde_json::from_str("\"notion\"").unwrap();
        assert_eq!(p, Provider::Notion);
        assert_eq!(serde_json::to_string(&Provider::Google).unwrap(), "\"google\"");
    }

    #[test]
    fn provider_accepts_legacy_drive_name() {
        let p: Provider = serde_json::from_str("\"google-drive\"").unwrap();
        assert_eq!(p, Provider::Google);
        let p2: Provider = "google_drive".parse().unwrap();
        assert_eq!(p2, Provider::Google);
    }

    #[test]
    fn provider_rejects_unknown() {
        assert!(serde_json::from_str::<Provider>("\"slack\"").is_err());
    }

    #[test]
    fn action_kind_uses_snake_case() {
        let a: ActionKind = serde_json::from_str("\"append\"").unwrap();
        assert_eq!(a, ActionKind::Append);
        assert_eq!(serde_json::to_string(&ActionKind::Create).unwrap(), "\"create\"");
    }

    #[test]
    fn connect_is_not_a_content_action() {
        assert!(!ActionKind::Connect.is_content_action());
        assert!(ActionKind::Create.is_content_action());
        assert!(ActionKind::Update.is_content_action());
        assert!(ActionKind::Append.is_content_action());
    }
}
