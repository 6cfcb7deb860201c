//! # parley-logging
//!
//! Installs the global `tracing` subscriber.
//!
//! The filter comes from `RUST_LOG` when set, otherwise from the configured
//! level plus any per-module overrides. Output is either human-readable or
//! JSON lines (one object per event, with the span list attached).

#![deny(unsafe_code)]

use parley_settings::LoggingSettings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format for log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, one line per event.
    #[default]
    Pretty,
    /// Structured JSON, one object per event.
    Json,
}

/// Logging configuration.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Default level directive, e.g. `info`.
    pub level: String,
    /// Per-module overrides, e.g. `("parley_server", "debug")`.
    pub module_levels: Vec<(String, String)>,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            module_levels: Vec::new(),
            format: LogFormat::Pretty,
        }
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            module_levels: Vec::new(),
            format: if settings.json { LogFormat::Json } else { LogFormat::Pretty },
        }
    }
}

impl LoggingConfig {
    /// Add a per-module level override.
    #[must_use]
    pub fn with_module_level(mut self, module: impl Into<String>, level: impl Into<String>) -> Self {
        self.module_levels.push((module.into(), level.into()));
        self
    }

    /// Filter directive string built from the configured levels.
    pub fn directives(&self) -> String {
        let mut filter = self.level.to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push(',');
            filter.push_str(module);
            filter.push('=');
            filter.push_str(&level.to_lowercase());
        }
        filter
    }
}

/// Failure to install the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The configured directives did not parse.
    #[error("invalid log filter '{directives}': {source}")]
    Filter {
        /// Directive string that failed.
        directives: String,
        /// Parser error.
        source: tracing_subscriber::filter::ParseError,
    },
    /// A global subscriber was already installed.
    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the filter: `RUST_LOG` if present and valid, otherwise the config.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = config.directives();
    EnvFilter::try_new(&directives).map_err(|source| LoggingError::Filter { directives, source })
}

/// Initialize the global subscriber. Call once at startup. Events go to
/// stderr so stdout stays free for the chat screen.
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(fmt_layer).try_init()?;
    Ok(())
}

/// Install a test-friendly subscriber that writes through the libtest
/// capture. Safe to call from every test.
pub fn init_test_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
