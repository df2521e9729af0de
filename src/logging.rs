//! Process-wide log subscriber with a runtime-adjustable level.

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use crate::wallet::WalletError;

/// Map a client-supplied level name to a filter directive.
///
/// Names are case-insensitive; `critical` is treated as `error`.
pub fn parse_level(level: &str) -> Result<&'static str, WalletError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" => Ok("warn"),
        "error" | "critical" => Ok("error"),
        "off" => Ok("off"),
        _ => Err(WalletError::InvalidArgument(format!(
            "unknown log level {:?}",
            level
        ))),
    }
}

/// Handle for changing the level of the installed subscriber.
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Change the log level. An unknown level is rejected and the current level is kept.
    pub fn set_log_level(&self, level: &str) -> Result<(), WalletError> {
        let directive = parse_level(level)?;
        self.filter
            .reload(EnvFilter::new(directive))
            .map_err(|e| WalletError::InvalidArgument(format!("failed to set log level: {}", e)))?;
        info!("Log level set to {}", directive);
        Ok(())
    }

    /// The active filter, rendered as directives.
    pub fn current_level(&self) -> Option<String> {
        self.filter.with_current(|filter| filter.to_string()).ok()
    }
}

/// Install the global subscriber at `level`.
///
/// # Errors
/// `InvalidArgument` for an unknown level or when a global subscriber is already installed.
pub fn init(level: &str) -> Result<LogHandle, WalletError> {
    let directive = parse_level(level)?;
    let (filter, handle) = reload::Layer::new(EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .with_timer(fmt::time::time()),
        )
        .try_init()
        .map_err(|e| WalletError::InvalidArgument(format!("logging already initialized: {}", e)))?;

    Ok(LogHandle { filter: handle })
}
