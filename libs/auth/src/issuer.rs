use std::sync::Arc;

use rand::RngCore;
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};
use tracing::{debug, instrument};

use crate::{
    store::SharedAuthTicketStore,
    ticket::AuthTicket,
    user::Authenticatable,
};

pub const DEFAULT_GUARD: &str = "web";
pub const DEFAULT_TTL_SECONDS: u64 = 60;

const TICKET_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum AuthTicketError {
    #[error(
        "no auth ticket issuer configured; acting_as()/login_as() needs an issuer on the bridge"
    )]
    NotConfigured,
    #[error("user has an invalid auth identifier")]
    InvalidIdentifier,
    #[error("failed to persist auth ticket under {path}: {error}")]
    Storage {
        path: std::path::PathBuf,
        error: std::io::Error,
    },
}

/// Ticket issuing settings derived at runtime.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(raw) = std::env::var("PEST_E2E_AUTH_TTL_SECONDS") {
            cfg = cfg.with_ttl_seconds(raw.trim().parse::<i64>().unwrap_or(0));
        }
        cfg
    }

    /// Non-positive TTLs fall back to the default.
    pub fn with_ttl_seconds(mut self, ttl_seconds: i64) -> Self {
        self.ttl_seconds = if ttl_seconds > 0 {
            ttl_seconds as u64
        } else {
            DEFAULT_TTL_SECONDS
        };
        self
    }
}

/// Mints single-use tickets for a user.
pub trait AuthTicketIssuer: Send + Sync {
    /// `meta` may carry `guard` (string) and either a nested `meta` object or
    /// free-form keys that become the ticket metadata.
    fn issue_for_user(
        &self,
        user: &dyn Authenticatable,
        meta: &Map<String, Value>,
    ) -> Result<String, AuthTicketError>;
}

pub type SharedAuthTicketIssuer = Arc<dyn AuthTicketIssuer>;

/// Issuer used until a real one is configured; always refuses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuthTicketIssuer;

impl AuthTicketIssuer for NullAuthTicketIssuer {
    fn issue_for_user(
        &self,
        _user: &dyn Authenticatable,
        _meta: &Map<String, Value>,
    ) -> Result<String, AuthTicketError> {
        Err(AuthTicketError::NotConfigured)
    }
}

/// Issuer persisting tickets into an [`AuthTicketStore`](crate::AuthTicketStore).
#[derive(Clone)]
pub struct StoreAuthTicketIssuer {
    store: SharedAuthTicketStore,
    config: AuthConfig,
}

impl StoreAuthTicketIssuer {
    pub fn new(store: SharedAuthTicketStore, config: AuthConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

impl AuthTicketIssuer for StoreAuthTicketIssuer {
    #[instrument(name = "auth_ticket.issue", skip_all)]
    fn issue_for_user(
        &self,
        user: &dyn Authenticatable,
        meta: &Map<String, Value>,
    ) -> Result<String, AuthTicketError> {
        let user_id = user.auth_identifier();
        if user_id.is_empty() {
            return Err(AuthTicketError::InvalidIdentifier);
        }
        let (guard, payload) = split_guard_and_meta(meta);
        let ttl = Duration::seconds(self.config.ttl_seconds as i64);
        let expires_at = OffsetDateTime::now_utc() + ttl;
        let ticket = random_ticket();

        debug!(user = %user_id, guard = %guard, ttl_seconds = self.config.ttl_seconds, "issued auth ticket");
        self.store
            .store(&ticket, AuthTicket::new(user_id, guard, payload, expires_at))?;
        Ok(ticket)
    }
}

fn random_ticket() -> String {
    let mut buf = [0u8; TICKET_BYTES];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

fn split_guard_and_meta(meta: &Map<String, Value>) -> (String, Map<String, Value>) {
    let guard = meta
        .get("guard")
        .and_then(Value::as_str)
        .filter(|g| !g.is_empty())
        .unwrap_or(DEFAULT_GUARD)
        .to_string();

    if let Some(Value::Object(nested)) = meta.get("meta") {
        return (guard, nested.clone());
    }

    let payload = meta
        .iter()
        .filter(|(key, _)| key.as_str() != "guard" && key.as_str() != "mode")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    (guard, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AuthTicketStore, InMemoryAuthTicketStore};
    use crate::user::UserId;
    use serde_json::json;

    struct User(i64);

    impl Authenticatable for User {
        fn auth_identifier(&self) -> UserId {
            UserId::Int(self.0)
        }
    }

    struct Blank;

    impl Authenticatable for Blank {
        fn auth_identifier(&self) -> UserId {
            UserId::from("")
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn issues_long_random_tickets() {
        let store = Arc::new(InMemoryAuthTicketStore::new());
        let issuer = StoreAuthTicketIssuer::new(store.clone(), AuthConfig::default());
        let a = issuer.issue_for_user(&User(1), &Map::new()).unwrap();
        let b = issuer.issue_for_user(&User(1), &Map::new()).unwrap();
        assert_eq!(a.len(), TICKET_BYTES * 2);
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn stores_guard_meta_and_expiry() {
        let store = Arc::new(InMemoryAuthTicketStore::new());
        let issuer = StoreAuthTicketIssuer::new(
            store.clone(),
            AuthConfig::default().with_ttl_seconds(120),
        );
        let before = OffsetDateTime::now_utc();
        let ticket = issuer
            .issue_for_user(
                &User(9),
                &object(json!({"guard": "admin", "mode": "sanctum", "role": "owner"})),
            )
            .unwrap();
        let record = store.consume(&ticket).unwrap();
        assert_eq!(record.user_id, UserId::Int(9));
        assert_eq!(record.guard, "admin");
        assert_eq!(record.meta, object(json!({"role": "owner"})));
        assert!(record.expires_at >= before + Duration::seconds(120));
    }

    #[test]
    fn nested_meta_object_wins() {
        let (guard, meta) =
            split_guard_and_meta(&object(json!({"meta": {"team": "qa"}, "ignored": true})));
        assert_eq!(guard, DEFAULT_GUARD);
        assert_eq!(meta, object(json!({"team": "qa"})));
    }

    #[test]
    fn rejects_blank_identifier() {
        let issuer =
            StoreAuthTicketIssuer::new(InMemoryAuthTicketStore::shared(), AuthConfig::default());
        assert!(matches!(
            issuer.issue_for_user(&Blank, &Map::new()),
            Err(AuthTicketError::InvalidIdentifier)
        ));
    }

    #[test]
    fn null_issuer_refuses() {
        let err = NullAuthTicketIssuer
            .issue_for_user(&User(1), &Map::new())
            .unwrap_err();
        assert!(err.to_string().contains("no auth ticket issuer configured"));
    }

    #[test]
    fn non_positive_ttl_falls_back() {
        assert_eq!(
            AuthConfig::default().with_ttl_seconds(0).ttl_seconds,
            DEFAULT_TTL_SECONDS
        );
        assert_eq!(AuthConfig::default().with_ttl_seconds(5).ttl_seconds, 5);
    }
}
