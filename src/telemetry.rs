// 15.0 telemetry.rs: tracing subscriber setup for binaries. the library itself only emits events.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. RUST_LOG overrides `default_level`.
/// Returns false if a subscriber was already installed (tests, embedding hosts).
pub fn init(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .try_init()
        .is_ok()
}
