//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Per-target log levels, e.g. `ROLL_SYNC_LOG=roll_sync=debug`
pub const LOG_ENV: &str = "ROLL_SYNC_LOG";

static INIT: Once = Once::new();

/// Install the global subscriber. Safe to call more than once.
///
/// Falls back to `roll_sync=info` when `ROLL_SYNC_LOG` is unset or invalid.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("roll_sync=info"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    });
}
