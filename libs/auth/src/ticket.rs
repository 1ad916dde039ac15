use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::user::UserId;

/// Record stored behind an opaque ticket string.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthTicket {
    pub user_id: UserId,
    pub guard: String,
    pub meta: Map<String, Value>,
    pub expires_at: OffsetDateTime,
}

impl AuthTicket {
    pub fn new(
        user_id: UserId,
        guard: impl Into<String>,
        meta: Map<String, Value>,
        expires_at: OffsetDateTime,
    ) -> Self {
        Self {
            user_id,
            guard: guard.into(),
            meta,
            expires_at,
        }
    }

    /// A ticket stays redeemable up to and including its expiry instant.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    pub fn is_well_formed(&self) -> bool {
        !self.user_id.is_empty() && !self.guard.trim().is_empty()
    }
}

/// How the external runner wants to be authenticated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Stateful login on the guard; the response carries a session cookie.
    #[default]
    Session,
    /// Bearer token minted by the user model.
    Sanctum,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Session => "session",
            AuthMode::Sanctum => "sanctum",
        }
    }
}

impl Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported auth mode `{0}` (expected session or sanctum)")]
pub struct ParseAuthModeError(pub String);

impl FromStr for AuthMode {
    type Err = ParseAuthModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(AuthMode::Session),
            "sanctum" => Ok(AuthMode::Sanctum),
            other => Err(ParseAuthModeError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn expiry_is_inclusive() {
        let now = OffsetDateTime::now_utc();
        let ticket = AuthTicket::new(UserId::Int(1), "web", Map::new(), now);
        assert!(!ticket.is_expired_at(now));
        assert!(ticket.is_expired_at(now + Duration::milliseconds(1)));
    }

    #[test]
    fn mode_parses_closed_set() {
        assert_eq!("session".parse::<AuthMode>().unwrap(), AuthMode::Session);
        assert_eq!("sanctum".parse::<AuthMode>().unwrap(), AuthMode::Sanctum);
        assert!("cookie".parse::<AuthMode>().is_err());
        assert_eq!(AuthMode::default(), AuthMode::Session);
    }
}
