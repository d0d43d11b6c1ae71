//! Structured logging initialization via `tracing`.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

/// Initialize the global tracing subscriber for a tool or daemon.
///
/// Respects the `RUST_LOG` environment variable for filtering and falls back
/// to `info`. Calling this more than once is harmless: later calls leave the
/// first subscriber in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Route tracing output through the test harness's captured writer.
///
/// Test binaries call this at the top of a test that wants to see engine
/// logs (`cargo test -- --nocapture`).
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
