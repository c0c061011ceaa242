//! Tracing subscriber setup for the `hospdb` binary.
use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_LEVEL: &str = "info";

/// Builds the filter: `RUST_LOG` wins, then `configured`, then `DEFAULT_LEVEL`.
pub fn filter(configured: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or(DEFAULT_LEVEL)))
}

/// Installs a fmt subscriber writing to stderr. Safe to call more than once.
pub fn init(configured: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(configured))
        .with_writer(std::io::stderr)
        .try_init();
}
