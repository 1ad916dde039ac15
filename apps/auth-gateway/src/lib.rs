//! Test-only login endpoint redeeming single-use E2E auth tickets.
//!
//! A ticket minted by the host test process is consumed on the first request
//! and exchanged either for a server-side session cookie or a bearer token.

pub mod config;
pub mod guards;
pub mod http;
pub mod session;

use std::sync::Arc;

use anyhow::Result;
use e2e_auth::SharedAuthTicketStore;
use tracing::info;

pub use config::GatewayConfig;
pub use guards::{
    GatewayUser, Guard, GuardRegistry, InMemoryUserProvider, SharedUserProvider, UserProvider,
};
pub use http::{ApiError, GatewayState, LoginError, build_router};

/// Builds the standalone router with a `web` guard over the configured users file.
pub fn router_from_config(
    config: GatewayConfig,
    tickets: SharedAuthTicketStore,
) -> Result<axum::Router> {
    let provider = match &config.users_file {
        Some(path) => InMemoryUserProvider::from_json_file(path)?,
        None => InMemoryUserProvider::default(),
    };
    let users = provider.len();
    let guards = GuardRegistry::web(Arc::new(provider));
    info!(
        users,
        guards = ?guards.names(),
        route = %config.auth_route,
        "auth gateway configured"
    );
    Ok(build_router(GatewayState::new(config, tickets, guards)))
}
