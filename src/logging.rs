// src/logging.rs

//! Log setup for test binaries.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "warn,nutcracker_compat=info";

/// Installs a compact subscriber that writes through the test harness's
/// captured output. Safe to call from every test; only the first call wins.
pub fn init_test_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_test_writer())
        .try_init();
}
