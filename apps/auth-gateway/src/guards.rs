use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use e2e_auth::{Authenticatable, DEFAULT_GUARD, TokenIssuer, UserId};
use rand::RngCore;
use serde::Deserialize;
use tracing::debug;

/// Looks up users by the identifier stored on a ticket.
pub trait UserProvider: Send + Sync {
    fn retrieve_by_id(&self, id: &UserId) -> Option<Arc<dyn Authenticatable>>;
}

pub type SharedUserProvider = Arc<dyn UserProvider>;

/// A named authentication guard backed by a user provider.
#[derive(Clone)]
pub struct Guard {
    pub name: String,
    provider: SharedUserProvider,
    stateful: bool,
}

impl Guard {
    /// Guard able to log users into a server-side session.
    pub fn session(name: impl Into<String>, provider: SharedUserProvider) -> Self {
        Self {
            name: name.into(),
            provider,
            stateful: true,
        }
    }

    /// Token-only guard; session logins against it answer 501.
    pub fn stateless(name: impl Into<String>, provider: SharedUserProvider) -> Self {
        Self {
            name: name.into(),
            provider,
            stateful: false,
        }
    }

    pub fn supports_sessions(&self) -> bool {
        self.stateful
    }

    pub fn provider(&self) -> &SharedUserProvider {
        &self.provider
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("name", &self.name)
            .field("stateful", &self.stateful)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GuardRegistry {
    guards: BTreeMap<String, Guard>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single stateful `web` guard over `provider`.
    pub fn web(provider: SharedUserProvider) -> Self {
        Self::new().with_guard(Guard::session(DEFAULT_GUARD, provider))
    }

    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guards.insert(guard.name.clone(), guard);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Guard> {
        self.guards.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.guards.keys().cloned().collect()
    }
}

/// User record as listed in a users file.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayUser {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the user can mint bearer tokens.
    #[serde(default)]
    pub tokens: bool,
}

impl GatewayUser {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            tokens: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tokens(mut self) -> Self {
        self.tokens = true;
        self
    }
}

impl Authenticatable for GatewayUser {
    fn auth_identifier(&self) -> UserId {
        self.id.clone()
    }

    fn token_issuer(&self) -> Option<&dyn TokenIssuer> {
        self.tokens.then_some(self as &dyn TokenIssuer)
    }
}

impl TokenIssuer for GatewayUser {
    fn create_token(&self, name: &str) -> anyhow::Result<String> {
        let mut secret = [0u8; 20];
        rand::rng().fill_bytes(&mut secret);
        debug!(user = %self.id, token_name = name, "minted bearer token");
        Ok(format!("{}|{}", self.id, hex::encode(secret)))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserProvider {
    users: HashMap<UserId, Arc<GatewayUser>>,
}

impl InMemoryUserProvider {
    pub fn new(users: impl IntoIterator<Item = GatewayUser>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|user| (user.id.clone(), Arc::new(user)))
                .collect(),
        }
    }

    /// Reads a JSON array of `{id, name?, tokens?}` records.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading users file {}", path.display()))?;
        let users: Vec<GatewayUser> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing users file {}", path.display()))?;
        Ok(Self::new(users))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserProvider for InMemoryUserProvider {
    fn retrieve_by_id(&self, id: &UserId) -> Option<Arc<dyn Authenticatable>> {
        let user = self.users.get(id).or_else(|| {
            // "7" and 7 name the same row
            let wanted = id.to_string();
            self.users
                .iter()
                .find(|(key, _)| key.to_string() == wanted)
                .map(|(_, user)| user)
        })?;
        Some(user.clone() as Arc<dyn Authenticatable>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_tolerates_numeric_string_ids() {
        let provider = InMemoryUserProvider::new([GatewayUser::new(7), GatewayUser::new("abc")]);
        assert!(provider.retrieve_by_id(&UserId::Int(7)).is_some());
        assert!(provider.retrieve_by_id(&UserId::from("7")).is_some());
        assert!(provider.retrieve_by_id(&UserId::from("abc")).is_some());
        assert!(provider.retrieve_by_id(&UserId::Int(8)).is_none());
    }

    #[test]
    fn only_token_users_expose_an_issuer() {
        let plain = GatewayUser::new(1);
        let tokens = GatewayUser::new(2).with_tokens();
        assert!(plain.token_issuer().is_none());
        let token = tokens
            .token_issuer()
            .unwrap()
            .create_token("pest-e2e")
            .unwrap();
        assert!(token.starts_with("2|"));
        assert_eq!(token.len(), 2 + 40);
    }

    #[test]
    fn users_file_parses_optional_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("users.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "name": "Ada"}, {"id": "svc", "tokens": true}]"#,
        )
        .unwrap();
        let provider = InMemoryUserProvider::from_json_file(&path).unwrap();
        assert_eq!(provider.len(), 2);
        let svc = provider.retrieve_by_id(&UserId::from("svc")).unwrap();
        assert!(svc.token_issuer().is_some());
    }

    #[test]
    fn registry_reports_guard_capabilities() {
        let provider: SharedUserProvider = Arc::new(InMemoryUserProvider::default());
        let guards = GuardRegistry::web(provider.clone())
            .with_guard(Guard::stateless("api", provider));
        assert!(guards.get("web").unwrap().supports_sessions());
        assert!(!guards.get("api").unwrap().supports_sessions());
        assert_eq!(guards.names(), vec!["api".to_string(), "web".to_string()]);
        assert!(guards.get("admin").is_none());
    }
}
