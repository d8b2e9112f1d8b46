//! One-shot tracing subscriber setup: a single global logger configured
//! once per process, rather than ad hoc `eprintln!` scattered through the
//! kernel.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a global `tracing` subscriber, honoring `RUST_LOG` if set and
/// otherwise falling back to `default_level`.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
