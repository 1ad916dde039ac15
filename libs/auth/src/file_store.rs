use std::{
    fs,
    path::{Path, PathBuf},
};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::{issuer::AuthTicketError, store::AuthTicketStore, ticket::AuthTicket, user::UserId};

pub const TICKET_DIR_ENV: &str = "PEST_E2E_TICKET_DIR";

const TICKET_SUBDIR: &str = "pest-e2e/tickets";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTicket {
    user_id: UserId,
    guard: String,
    #[serde(default)]
    meta: Map<String, Value>,
    expires_at_ms: i64,
}

/// Ticket store shared between processes through a directory.
///
/// Each ticket is one JSON file. `consume` claims the file with a rename,
/// which the filesystem performs atomically, so only one redeemer across
/// all processes can read a given record.
#[derive(Debug, Clone)]
pub struct FileAuthTicketStore {
    dir: PathBuf,
}

impl FileAuthTicketStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Uses `PEST_E2E_TICKET_DIR`, else `<temp>/pest-e2e/tickets`.
    pub fn from_env() -> Self {
        match std::env::var(TICKET_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => Self::new(dir.trim()),
            _ => Self::new(std::env::temp_dir().join(TICKET_SUBDIR)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Removes records whose expiry has passed. Unreadable files are left alone.
    pub fn purge_expired(&self, now: OffsetDateTime) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let expired = read_record(&path).is_some_and(|record| record.is_expired_at(now));
            if expired && let Err(error) = fs::remove_file(&path) {
                debug!(path = %path.display(), %error, "could not purge expired ticket");
            }
        }
    }

    fn path_for(&self, ticket: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(ticket)))
    }

    fn scratch_path(&self, base: &Path, suffix: &str) -> PathBuf {
        let mut nonce = [0u8; 8];
        rand::rng().fill_bytes(&mut nonce);
        let name = base
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.dir
            .join(format!(".{name}.{}.{suffix}", hex::encode(nonce)))
    }
}

impl AuthTicketStore for FileAuthTicketStore {
    #[instrument(name = "auth_ticket.store", skip_all, fields(guard = %record.guard))]
    fn store(&self, ticket: &str, record: AuthTicket) -> Result<(), AuthTicketError> {
        let storage = |error| AuthTicketError::Storage {
            path: self.dir.clone(),
            error,
        };
        fs::create_dir_all(&self.dir).map_err(storage)?;
        self.purge_expired(OffsetDateTime::now_utc());

        let stored = StoredTicket {
            user_id: record.user_id,
            guard: record.guard,
            meta: record.meta,
            expires_at_ms: to_unix_ms(record.expires_at),
        };
        let json = serde_json::to_vec(&stored).map_err(|error| storage(error.into()))?;

        // publish complete files only
        let path = self.path_for(ticket);
        let staging = self.scratch_path(&path, "tmp");
        fs::write(&staging, json).map_err(storage)?;
        fs::rename(&staging, &path).map_err(|error| {
            let _ = fs::remove_file(&staging);
            storage(error)
        })
    }

    #[instrument(name = "auth_ticket.consume", skip_all)]
    fn consume(&self, ticket: &str) -> Option<AuthTicket> {
        if ticket.is_empty() {
            return None;
        }
        let path = self.path_for(ticket);
        let claimed = self.scratch_path(&path, "claim");
        fs::rename(&path, &claimed).ok()?;

        let record = read_record(&claimed);
        if let Err(error) = fs::remove_file(&claimed) {
            warn!(path = %claimed.display(), %error, "failed to remove claimed ticket");
        }
        let Some(record) = record else {
            debug!("auth ticket record malformed");
            return None;
        };
        if record.is_expired_at(OffsetDateTime::now_utc()) {
            debug!("auth ticket expired before redemption");
            return None;
        }
        if !record.is_well_formed() {
            debug!("auth ticket record malformed");
            return None;
        }
        Some(record)
    }
}

fn read_record(path: &Path) -> Option<AuthTicket> {
    let raw = fs::read(path).ok()?;
    let stored: StoredTicket = serde_json::from_slice(&raw).ok()?;
    Some(AuthTicket::new(
        stored.user_id,
        stored.guard,
        stored.meta,
        from_unix_ms(stored.expires_at_ms)?,
    ))
}

/// Rounds up so a stored ticket never expires earlier than issued.
fn to_unix_ms(at: OffsetDateTime) -> i64 {
    let nanos = at.unix_timestamp_nanos();
    let ms = nanos / 1_000_000 + i128::from(nanos % 1_000_000 > 0);
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn from_unix_ms(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}
