//! Logging setup.
//!
//! Logs go to **stderr**: stdout carries only the handshake line the host
//! reads. Filtering follows `RUST_LOG`, e.g.
//!
//! ```bash
//! RUST_LOG=skytap_provider=debug ./skytap-provider
//! RUST_LOG=info,skytap_provider::client=trace ./skytap-provider
//! ```

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn stderr_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Install the stderr subscriber, filtered by `RUST_LOG` or `info`.
///
/// # Panics
///
/// Panics if a global subscriber is already set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_FILTER);
}

/// [`init_logging`] with a different fallback filter.
///
/// # Panics
///
/// Panics if a global subscriber is already set.
pub fn init_logging_with_default(default_filter: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(stderr_layer())
        .init();
}

/// Like [`init_logging`], but returns `false` instead of panicking when a
/// subscriber is already installed.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_FILTER))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_parse() {
        for directive in [
            DEFAULT_FILTER,
            "skytap_provider=debug",
            "warn,skytap_provider::client=trace",
        ] {
            assert!(EnvFilter::try_new(directive).is_ok(), "{}", directive);
        }
    }

    #[test]
    fn test_try_init_is_idempotent() {
        let _ = try_init_logging();
        assert!(!try_init_logging());
    }
}
