//! Subscriber setup for binaries and tests that want log output.
//!
//! Library code only emits `tracing` events; nothing in `gatelab-core` installs
//! a subscriber. Both initialisers read `RUST_LOG` and default to `INFO`.

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}

/// Install a human-readable subscriber. Panics if one is already set.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init()
}

/// Install a JSON subscriber with flattened event fields.
pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init()
}

/// Like [`init_logging`], but returns `false` instead of panicking when a
/// subscriber is already installed. Suited to tests.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init()
        .is_ok()
}
