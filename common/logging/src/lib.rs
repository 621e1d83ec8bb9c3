use metrics::{IntCounter, Result as MetricsResult, try_create_int_counter};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub mod macros;
mod tracing_metrics_layer;

pub use tracing_metrics_layer::MetricsLayer;

pub static INFOS_TOTAL: LazyLock<MetricsResult<IntCounter>> =
    LazyLock::new(|| try_create_int_counter("info_total", "Count of infos logged"));
pub static WARNS_TOTAL: LazyLock<MetricsResult<IntCounter>> =
    LazyLock::new(|| try_create_int_counter("warn_total", "Count of warns logged"));
pub static ERRORS_TOTAL: LazyLock<MetricsResult<IntCounter>> =
    LazyLock::new(|| try_create_int_counter("error_total", "Count of errors logged"));
pub static CRITS_TOTAL: LazyLock<MetricsResult<IntCounter>> =
    LazyLock::new(|| try_create_int_counter("crit_total", "Count of crits logged"));

/// Configuration for the stderr logger of a binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// An `EnvFilter` directive, e.g. `info` or `fork_choice=debug,info`.
    pub debug_level: String,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            debug_level: String::from("info"),
            json: false,
        }
    }
}

/// Install the global tracing subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.debug_level` when set. Events are counted by
/// [`MetricsLayer`] regardless of the filter.
pub fn init_tracing(config: &LoggerConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.debug_level))
        .map_err(|e| format!("Invalid log level {}: {:?}", config.debug_level, e))?;

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(MetricsLayer)
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .map_err(|e| format!("Failed to initialize logger: {:?}", e))
}

/// Return a tracing subscriber suitable for test usage.
///
/// By default no logs will be printed, but they can be enabled via
/// the `test_logger` feature.  This feature can be enabled for any
/// dependent crate by passing `--features logging/test_logger`, e.g.
/// ```bash
/// cargo test -p fork_choice --features logging/test_logger
/// ```
pub fn create_test_tracing_subscriber() {
    if !cfg!(feature = "test_logger") {
        return;
    }
    if let Ok(filter) = EnvFilter::try_new("debug") {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crit_events_are_counted() {
        let subscriber = tracing_subscriber::registry().with(MetricsLayer);
        let before_errors = metrics::get_counter(&ERRORS_TOTAL).unwrap_or_default();
        let before_crits = metrics::get_counter(&CRITS_TOTAL).unwrap_or_default();

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(reason = "plain", "An error");
            crate::crit!(reason = "sticky", "A critical error");
        });

        assert_eq!(
            metrics::get_counter(&ERRORS_TOTAL),
            Some(before_errors + 2),
            "both events are errors"
        );
        assert_eq!(
            metrics::get_counter(&CRITS_TOTAL),
            Some(before_crits + 1),
            "only the tagged event is a crit"
        );
    }

    #[test]
    fn global_subscriber_installs_once() {
        let config = LoggerConfig {
            debug_level: String::from("fork_choice=debug,info"),
            json: true,
        };
        assert_eq!(init_tracing(&config), Ok(()));
        assert!(
            init_tracing(&config).is_err(),
            "a second global subscriber is refused"
        );
    }

    #[test]
    fn default_config() {
        let config = LoggerConfig::default();
        assert_eq!(config.debug_level, "info");
        assert!(!config.json);
    }
}
