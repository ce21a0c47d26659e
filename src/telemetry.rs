//! Tracing setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "taskboard=info";

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
/// Returns `false` if a subscriber was already installed, in which case the
/// existing one is kept.
pub fn init(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_second_init_is_a_no_op() {
        let _ = init(LogFormat::Json);
        assert!(!init(LogFormat::Pretty));
    }
}
