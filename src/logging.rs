//! Subscriber setup for the binary. Library code only emits `tracing`
//! events; nothing is printed unless a subscriber is installed here.

use tracing_subscriber::EnvFilter;

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Installs a stderr fmt subscriber. `RUST_LOG` wins over `verbose`.
/// Calling it twice is harmless; the second call is ignored.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
