//! Logging setup for binaries built on this crate.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the program that owns `main`.

use crate::error::{FleetError, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a stdout subscriber filtered at `level`.
///
/// `RUST_LOG` takes precedence over `level` when it is set. Fails if a global
/// subscriber has already been installed.
pub fn init_logging(level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .with_thread_names(true),
        )
        .try_init()
        .map_err(|e| FleetError::Config(format!("failed to initialize logging: {e}")))?;

    Ok(())
}
