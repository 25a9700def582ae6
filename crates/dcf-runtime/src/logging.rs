#![forbid(unsafe_code)]

//! Global `tracing` subscriber installation (feature `logging`).
//!
//! Library code only emits through the `tracing` facade. Applications that do
//! not install their own subscriber can call [`init`] once at startup.
//!
//! Filtering follows the `DCF_LOG` environment variable using `EnvFilter`
//! syntax (`DCF_LOG=dcf_runtime=debug`), defaulting to `info`.

use std::fmt;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the filter directive.
pub const LOG_ENV: &str = "DCF_LOG";

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Plain,
    /// One JSON object per event.
    Json,
}

/// Failure installing the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    /// A global subscriber is already installed.
    AlreadyInitialized,
    /// The `DCF_LOG` directive could not be parsed.
    InvalidFilter(String),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => f.write_str("a global tracing subscriber is already installed"),
            Self::InvalidFilter(msg) => write!(f, "invalid {LOG_ENV} directive: {msg}"),
        }
    }
}

impl std::error::Error for LoggingError {}

/// Build the filter from `DCF_LOG`, or `info` when unset.
///
/// # Errors
///
/// [`LoggingError::InvalidFilter`] for a malformed directive.
pub fn env_filter() -> Result<EnvFilter, LoggingError> {
    match std::env::var(LOG_ENV) {
        Ok(directive) => {
            EnvFilter::try_new(directive).map_err(|e| LoggingError::InvalidFilter(e.to_string()))
        }
        Err(_) => Ok(EnvFilter::new("info")),
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// [`LoggingError::AlreadyInitialized`] on any call after a subscriber has
/// been installed, [`LoggingError::InvalidFilter`] for a bad `DCF_LOG`.
pub fn init(format: LogFormat) -> Result<(), LoggingError> {
    let filter = env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Plain => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
    };
    installed.map_err(|_| LoggingError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_already_initialized() {
        let first = init(LogFormat::Plain);
        assert!(matches!(first, Ok(()) | Err(LoggingError::AlreadyInitialized)));
        assert_eq!(init(LogFormat::Json), Err(LoggingError::AlreadyInitialized));
    }

    #[test]
    fn error_display() {
        assert!(
            LoggingError::InvalidFilter("bad".into())
                .to_string()
                .contains("DCF_LOG")
        );
    }
}
