use std::sync::Arc;

use anyhow::Result;
use axum::serve;
use e2e_auth_gateway::{GatewayConfig, router_from_config};
use e2e_telemetry::install as init_telemetry;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry("e2e-auth-gateway")?;

    let config = GatewayConfig::from_env()?;
    if !config.is_testing() {
        warn!(app_env = %config.app_env, "APP_ENV is not `testing`; every login will be refused");
    }
    let tickets = config.ticket_store();
    info!(dir = %tickets.dir().display(), "redeeming tickets from shared directory");
    let router = router_from_config(config.clone(), Arc::new(tickets))?;
    let listener = TcpListener::bind(config.addr).await?;
    info!("e2e-auth-gateway listening on {}", config.addr);

    serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
