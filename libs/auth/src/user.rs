use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Stable identifier of an authenticatable user.
///
/// Numeric and string keys are both common for user tables, so the identifier
/// keeps whichever representation the host model exposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Int(i64),
    Str(String),
}

impl UserId {
    pub fn is_empty(&self) -> bool {
        matches!(self, UserId::Str(value) if value.trim().is_empty())
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UserId::Int(id) => write!(f, "{id}"),
            UserId::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        UserId::Int(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId::Str(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId::Str(value)
    }
}

/// Capability required to issue a ticket for a user.
pub trait Authenticatable: Send + Sync {
    fn auth_identifier(&self) -> UserId;

    /// Returns the bearer-token capability when the user model supports it.
    fn token_issuer(&self) -> Option<&dyn TokenIssuer> {
        None
    }
}

/// Capability for user models that can mint bearer tokens.
pub trait TokenIssuer: Send + Sync {
    fn create_token(&self, name: &str) -> anyhow::Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_serializes_untagged() {
        assert_eq!(serde_json::to_string(&UserId::Int(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&UserId::from("abc")).unwrap(),
            "\"abc\""
        );
        let parsed: UserId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, UserId::Int(42));
    }

    #[test]
    fn blank_string_ids_are_empty() {
        assert!(UserId::from("  ").is_empty());
        assert!(!UserId::Int(0).is_empty());
    }
}
