//! Models that represent users and role metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::types::UserId;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
/// Database representation of a gateway user account.
pub struct User {
    /// Unique identifier for the user.
    pub id: UserId,
    /// Email the identity provider authenticated.
    pub email: String,
    /// Human-readable full name.
    pub name: String,
    /// Group the user belongs to; policy lookups key on this.
    pub role: UserRole,
    /// Creation timestamp for auditing.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp for auditing.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, ToSchema, Default)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
/// Supported user roles stored in the database.
pub enum UserRole {
    /// Sales team member.
    #[default]
    Sales,
    /// Marketing team member.
    Marketing,
    /// Customer success team member.
    CustomerSuccess,
    /// Administrator with access to policies and the audit surface.
    Admin,
}

impl UserRole {
    /// Returns the canonical snake_case representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Sales => "sales",
            UserRole::Marketing => "marketing",
            UserRole::CustomerSuccess => "customer_success",
            UserRole::Admin => "admin",
        }
    }

    /// Every role, in display order. Used for policy table dumps and seeds.
    pub fn all() -> [UserRole; 4] {
        [
            UserRole::Sales,
            UserRole::Marketing,
            UserRole::CustomerSuccess,
            UserRole::Admin,
        ]
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // primary canonical values (snake_case)
            "sales" => Ok(UserRole::Sales),
            "marketing" => Ok(UserRole::Marketing),
            "customer_success" => Ok(UserRole::CustomerSuccess),
            "admin" => Ok(UserRole::Admin),
            // tolerate common legacy casings
            "Sales" | "SALES" => Ok(UserRole::Sales),
            "Marketing" | "MARKETING" => Ok(UserRole::Marketing),
            "customerSuccess" | "customer-success" => Ok(UserRole::CustomerSuccess),
            "Admin" | "ADMIN" => Ok(UserRole::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl Serialize for UserRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            serde::de::Error::unknown_variant(
                &s,
                &["sales", "marketing", "customer_success", "admin"],
            )
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Public-facing representation of a user returned by the API.
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role.as_str().to_string(),
        }
    }
}

impl User {
    /// Constructs a new user with freshly generated identifiers.
    pub fn new(email: String, name: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            email,
            name,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` when the user holds the `Admin` role.
    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn user_role_serde_accepts_and_emits_snake_case() {
        // Accept snake_case
        let s: UserRole = serde_json::from_str("\"sales\"").unwrap();
        let cs: UserRole = serde_json::from_str("\"customer_success\"").unwrap();
        assert!(matches!(s, UserRole::Sales));
        assert!(matches!(cs, UserRole::CustomerSuccess));

        // Tolerate legacy casings
        let cs2: UserRole = serde_json::from_str("\"customerSuccess\"").unwrap();
        let a2: UserRole = serde_json::from_str("\"ADMIN\"").unwrap();
        assert!(matches!(cs2, UserRole::CustomerSuccess));
        assert!(matches!(a2, UserRole::Admin));

        // Emit snake_case
        let sv = serde_json::to_value(UserRole::CustomerSuccess).unwrap();
        assert_eq!(sv, Value::String("customer_success".into()));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = serde_json::from_str::<UserRole>("\"contractor\"");
        assert!(err.is_err());
    }

    #[test]
    fn user_response_role_is_snake_case_string() {
        let user = User::new(
            "alice@example.com".to_string(),
            "Alice Example".to_string(),
            UserRole::Admin,
        );
        let resp: UserResponse = user.into();
        assert_eq!(resp.role, "admin");
    }

    #[test]
    fn only_admin_is_admin() {
        for role in UserRole::all() {
            let user = User::new("u@example.com".into(), "U".into(), role);
            assert_eq!(user.is_admin(), matches!(role, UserRole::Admin));
        }
    }
}
