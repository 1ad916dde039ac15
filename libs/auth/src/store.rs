use std::sync::Arc;

use dashmap::DashMap;
use time::{Duration, OffsetDateTime};
use tracing::{debug, instrument};

use crate::{issuer::AuthTicketError, ticket::AuthTicket};

const KEY_PREFIX: &str = "pest-e2e:auth-ticket:";

/// Contract implemented by ticket stores.
///
/// `consume` is the authorization primitive: it must fetch and delete in one
/// step so that two concurrent redemptions of the same ticket can never both
/// observe the record.
pub trait AuthTicketStore: Send + Sync {
    /// Persists `ticket` until it is consumed or its expiry passes.
    fn store(&self, ticket: &str, record: AuthTicket) -> Result<(), AuthTicketError>;

    /// Removes and returns the record for `ticket`. Missing, malformed and
    /// expired tickets all yield `None`.
    fn consume(&self, ticket: &str) -> Option<AuthTicket>;
}

/// Shared trait object wrapper.
pub type SharedAuthTicketStore = Arc<dyn AuthTicketStore>;

#[derive(Debug, Clone)]
struct Entry {
    record: AuthTicket,
    evict_at: OffsetDateTime,
}

/// In-process store backed by a concurrent map with TTL eviction.
#[derive(Debug, Default)]
pub struct InMemoryAuthTicketStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryAuthTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedAuthTicketStore {
        Arc::new(Self::new())
    }

    /// Drops every entry whose eviction deadline has passed.
    pub fn purge_expired(&self, now: OffsetDateTime) {
        self.entries.retain(|_, entry| entry.evict_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(ticket: &str) -> String {
        format!("{KEY_PREFIX}{ticket}")
    }

    /// Entries outlive their expiry by at least a second, so eviction only
    /// garbage-collects and never decides validity.
    fn eviction_deadline(expires_at: OffsetDateTime, now: OffsetDateTime) -> OffsetDateTime {
        expires_at.max(now + Duration::seconds(1))
    }
}

impl AuthTicketStore for InMemoryAuthTicketStore {
    #[instrument(name = "auth_ticket.store", skip_all, fields(guard = %record.guard))]
    fn store(&self, ticket: &str, record: AuthTicket) -> Result<(), AuthTicketError> {
        let now = OffsetDateTime::now_utc();
        self.purge_expired(now);
        let evict_at = Self::eviction_deadline(record.expires_at, now);
        self.entries
            .insert(Self::key(ticket), Entry { record, evict_at });
        Ok(())
    }

    #[instrument(name = "auth_ticket.consume", skip_all)]
    fn consume(&self, ticket: &str) -> Option<AuthTicket> {
        if ticket.is_empty() {
            return None;
        }
        let (_, entry) = self.entries.remove(&Self::key(ticket))?;
        let now = OffsetDateTime::now_utc();
        if entry.record.is_expired_at(now) {
            debug!("auth ticket expired before redemption");
            return None;
        }
        if !entry.record.is_well_formed() {
            debug!("auth ticket record malformed");
            return None;
        }
        Some(entry.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::UserId;
    use serde_json::Map;

    fn record(expires_in: Duration) -> AuthTicket {
        AuthTicket::new(
            UserId::Int(1),
            "web",
            Map::new(),
            OffsetDateTime::now_utc() + expires_in,
        )
    }

    #[test]
    fn consume_is_exactly_once() {
        let store = InMemoryAuthTicketStore::new();
        store.store("abc", record(Duration::seconds(60))).unwrap();
        let first = store.consume("abc").expect("first redemption");
        assert_eq!(first.user_id, UserId::Int(1));
        assert!(store.consume("abc").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn expired_but_not_evicted_ticket_is_rejected() {
        let store = InMemoryAuthTicketStore::new();
        // expiry already passed; eviction still keeps the entry for >= 1s
        store.store("stale", record(Duration::seconds(-5))).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.consume("stale").is_none());
        assert!(store.is_empty(), "rejected ticket is still burnt");
    }

    #[test]
    fn malformed_records_are_rejected() {
        let store = InMemoryAuthTicketStore::new();
        let mut bad = record(Duration::seconds(60));
        bad.guard = String::new();
        store.store("bad", bad).unwrap();
        assert!(store.consume("bad").is_none());
        assert!(store.consume("").is_none());
        assert!(store.consume("missing").is_none());
    }

    #[test]
    fn eviction_never_precedes_expiry() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            InMemoryAuthTicketStore::eviction_deadline(now - Duration::seconds(10), now),
            now + Duration::seconds(1)
        );
        let expires_at = now + Duration::milliseconds(59_999);
        assert_eq!(
            InMemoryAuthTicketStore::eviction_deadline(expires_at, now),
            expires_at
        );
    }

    #[test]
    fn purge_drops_evicted_entries() {
        let store = InMemoryAuthTicketStore::new();
        store.store("a", record(Duration::seconds(60))).unwrap();
        store.purge_expired(OffsetDateTime::now_utc() + Duration::seconds(120));
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_consumers_succeed_once() {
        let store = Arc::new(InMemoryAuthTicketStore::new());
        store.store("race", record(Duration::seconds(60))).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.consume("race").is_some())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
