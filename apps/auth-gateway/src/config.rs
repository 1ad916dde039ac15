use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEFAULT_AUTH_ROUTE: &str = "/.well-known/pest-e2e/auth/login";
pub const DEFAULT_HEADER_NAME: &str = "X-Pest-E2E";
pub const DEFAULT_HEADER_VALUE: &str = "1";
pub const DEFAULT_SESSION_COOKIE: &str = "pest_e2e_session";
pub const TESTING_ENV: &str = "testing";
pub const DEFAULT_SESSION_IDLE_SECONDS: i64 = 2 * 60 * 60;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Application environment name; the endpoint only answers in `testing`.
    pub app_env: String,
    pub addr: SocketAddr,
    pub auth_route: String,
    pub header_name: String,
    pub header_value: String,
    pub session_cookie: String,
    pub users_file: Option<PathBuf>,
    /// Directory shared with the issuing process; see `e2e_auth::FileAuthTicketStore`.
    pub ticket_dir: Option<PathBuf>,
    /// Sessions unused for this long are dropped.
    pub session_idle_seconds: i64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            app_env: "production".into(),
            addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            auth_route: DEFAULT_AUTH_ROUTE.into(),
            header_name: DEFAULT_HEADER_NAME.into(),
            header_value: DEFAULT_HEADER_VALUE.into(),
            session_cookie: DEFAULT_SESSION_COOKIE.into(),
            users_file: None,
            ticket_dir: None,
            session_idle_seconds: DEFAULT_SESSION_IDLE_SECONDS,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let addr = match non_empty_env("PEST_E2E_GATEWAY_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid PEST_E2E_GATEWAY_ADDR `{raw}`"))?,
            None => defaults.addr,
        };
        let auth_route = non_empty_env("PEST_E2E_AUTH_ROUTE")
            .map(|route| normalize_route(&route))
            .unwrap_or(defaults.auth_route);
        let session_idle_seconds = match non_empty_env("PEST_E2E_SESSION_TTL_SECONDS") {
            Some(raw) => parse_idle_seconds(&raw)?,
            None => defaults.session_idle_seconds,
        };

        Ok(Self {
            app_env: non_empty_env("APP_ENV").unwrap_or(defaults.app_env),
            addr,
            auth_route,
            header_name: non_empty_env("PEST_E2E_AUTH_HEADER_NAME")
                .unwrap_or(defaults.header_name),
            header_value: non_empty_env("PEST_E2E_AUTH_HEADER_VALUE")
                .unwrap_or(defaults.header_value),
            session_cookie: non_empty_env("PEST_E2E_AUTH_SESSION_COOKIE")
                .unwrap_or(defaults.session_cookie),
            users_file: non_empty_env("PEST_E2E_USERS_FILE").map(PathBuf::from),
            ticket_dir: non_empty_env(e2e_auth::TICKET_DIR_ENV).map(PathBuf::from),
            session_idle_seconds,
        })
    }

    pub fn testing() -> Self {
        Self {
            app_env: TESTING_ENV.into(),
            ..Self::default()
        }
    }

    pub fn is_testing(&self) -> bool {
        self.app_env == TESTING_ENV
    }

    /// The cross-process ticket store this gateway redeems from.
    pub fn ticket_store(&self) -> e2e_auth::FileAuthTicketStore {
        match &self.ticket_dir {
            Some(dir) => e2e_auth::FileAuthTicketStore::new(dir),
            None => e2e_auth::FileAuthTicketStore::from_env(),
        }
    }
}

fn parse_idle_seconds(raw: &str) -> Result<i64> {
    let seconds: i64 = raw
        .parse()
        .with_context(|| format!("invalid PEST_E2E_SESSION_TTL_SECONDS `{raw}`"))?;
    anyhow::ensure!(seconds > 0, "PEST_E2E_SESSION_TTL_SECONDS must be positive, got {seconds}");
    Ok(seconds)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_route(route: &str) -> String {
    if route.starts_with('/') {
        route.to_string()
    } else {
        format!("/{route}")
    }
}
