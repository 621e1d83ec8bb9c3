/// Log an unrecoverable condition.
///
/// Emitted at `ERROR` level and tagged with `error_type = "crit"` so that `MetricsLayer` counts it
/// in `crit_total` as well as `error_total`.
#[macro_export]
macro_rules! crit {
    ($($arg:tt)+) => {
        tracing::error!(error_type = "crit", $($arg)+);
    };
}
