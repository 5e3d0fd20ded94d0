// src/logging.rs
//! Console logging setup
//!
//! `RUST_LOG` wins when set; otherwise the level follows the `-v` count.

use tracing_subscriber::EnvFilter;

/// Default filter directive for a given `-v` count
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
