//! Logging setup.
//!
//! Library code only emits `tracing` events. Binaries call
//! [`init_tracing`] once at startup to install a subscriber.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Output goes to stderr; with
/// `json` set, as one JSON object per line. Calling this more than once is
/// harmless; later calls are ignored.
pub fn init_tracing(json: bool, level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false, DEFAULT_LOG_LEVEL);
        init_tracing(true, "debug");
        tracing::info!("still logging");
    }
}
