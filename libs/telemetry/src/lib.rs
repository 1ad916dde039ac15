//! Logging bootstrap for the e2e-bridge binaries.

use anyhow::Result;

mod config;
mod tracing_init;

pub use config::{LogFormat, TelemetryConfig};
pub use tracing_init::init_tracing;

/// Installs the process-wide subscriber configured from `LOG_FORMAT` and `RUST_LOG`.
pub fn install(service_name: &str) -> Result<()> {
    init_tracing(&TelemetryConfig::from_env(service_name))
}
