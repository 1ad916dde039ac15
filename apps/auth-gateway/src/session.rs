use axum::http::{HeaderMap, header::COOKIE};
use dashmap::DashMap;
use e2e_auth::UserId;
use rand::RngCore;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::config::DEFAULT_SESSION_IDLE_SECONDS;

const SESSION_ID_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: UserId,
    pub guard: String,
    pub last_seen: OffsetDateTime,
}

/// Server-side sessions keyed by an opaque cookie value.
///
/// A session idle for longer than `idle_ttl` is gone: lookups refuse it and
/// every login sweeps such entries out.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, SessionRecord>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_SESSION_IDLE_SECONDS))
    }
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_ttl,
        }
    }

    /// Starts a fresh session and returns its id.
    pub fn login(&self, guard: &str, user_id: UserId) -> String {
        self.login_at(guard, user_id, OffsetDateTime::now_utc())
    }

    pub fn login_at(&self, guard: &str, user_id: UserId, now: OffsetDateTime) -> String {
        self.purge_idle(now);
        let mut buf = [0u8; SESSION_ID_BYTES];
        rand::rng().fill_bytes(&mut buf);
        let id = hex::encode(buf);
        self.sessions.insert(
            id.clone(),
            SessionRecord {
                user_id,
                guard: guard.to_string(),
                last_seen: now,
            },
        );
        id
    }

    pub fn get(&self, id: &str) -> Option<SessionRecord> {
        self.get_at(id, OffsetDateTime::now_utc())
    }

    /// Returns the live session and marks it as seen at `now`.
    pub fn get_at(&self, id: &str, now: OffsetDateTime) -> Option<SessionRecord> {
        let mut entry = self.sessions.get_mut(id)?;
        if self.is_idle(&entry, now) {
            drop(entry);
            self.sessions.remove_if(id, |_, record| self.is_idle(record, now));
            debug!("session expired after idling");
            return None;
        }
        entry.last_seen = now;
        Some(entry.value().clone())
    }

    pub fn purge_idle(&self, now: OffsetDateTime) {
        self.sessions.retain(|_, record| !self.is_idle(record, now));
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_idle(&self, record: &SessionRecord, now: OffsetDateTime) -> bool {
        now - record.last_seen > self.idle_ttl
    }
}

pub fn set_cookie_value(cookie: &str, session_id: &str) -> String {
    format!("{cookie}={session_id}; Path=/; HttpOnly; SameSite=Lax")
}

/// Extracts `name` from the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn login_creates_distinct_sessions() {
        let store = SessionStore::default();
        let a = store.login("web", UserId::Int(1));
        let b = store.login("web", UserId::Int(1));
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&a).unwrap().user_id, UserId::Int(1));
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn idle_sessions_expire_and_active_ones_stay() {
        let store = SessionStore::new(Duration::minutes(10));
        let t0 = OffsetDateTime::now_utc();
        let active = store.login_at("web", UserId::Int(1), t0);
        let idle = store.login_at("web", UserId::Int(2), t0);

        assert!(store.get_at(&active, t0 + Duration::minutes(8)).is_some());
        assert!(store.get_at(&active, t0 + Duration::minutes(16)).is_some());
        assert!(store.get_at(&idle, t0 + Duration::minutes(16)).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn logins_sweep_abandoned_sessions() {
        let store = SessionStore::new(Duration::minutes(10));
        let t0 = OffsetDateTime::now_utc();
        for user in 0..50 {
            store.login_at("web", UserId::Int(user), t0);
        }
        assert_eq!(store.len(), 50);
        store.login_at("web", UserId::Int(99), t0 + Duration::hours(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn finds_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; pest_e2e_session=abc123"),
        );
        assert_eq!(
            cookie_value(&headers, "pest_e2e_session").as_deref(),
            Some("abc123")
        );
        assert!(cookie_value(&headers, "missing").is_none());
    }
}
