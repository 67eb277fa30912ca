//! Tracing subscriber setup for tests.
//!
//! Log levels used by the endpoint:
//! - WARN: rejected handshakes, aborted inbound messages
//! - DEBUG: sends, receives, handshake and plugin events (with `debug` config)
//! - TRACE: classification drops, deferred sends

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber writing through the test harness.
///
/// `RUST_LOG` controls the filter, defaulting to `debug`. Safe to call from
/// every test; only the first call installs.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}
