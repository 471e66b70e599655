use crate::logger::severity::LogSeverity;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` overrides the default `info` filter.
/// Calling it more than once is harmless.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}

pub fn log(msg: String, log_severity: LogSeverity) {
    match log_severity {
        LogSeverity::Debug => tracing::debug!("{}", msg),
        LogSeverity::Info => tracing::info!("{}", msg),
        LogSeverity::Warning => tracing::warn!("{}", msg),
        LogSeverity::Error => tracing::error!("{}", msg),
        LogSeverity::Fatal => tracing::error!(severity = %log_severity, "{}", msg),
    }
}
