//! Logging initialization for Minima applications
//!
//! The framework itself only emits `tracing` events; this module wires a
//! `tracing-subscriber` backend with JSON output by default and
//! human-readable formats for development.
//!
//! # Examples
//!
//! ```no_run
//! use minima_core::logging::{LogConfig, LogFormat, LogLevel};
//!
//! // Default: JSON to stdout at info level
//! LogConfig::default().init();
//!
//! // Development: pretty output at debug level
//! LogConfig::new()
//!     .level(LogLevel::Debug)
//!     .format(LogFormat::Pretty)
//!     .init();
//! ```
//!
//! The `MINIMA_LOG` environment variable overrides the configured level with
//! a full `EnvFilter` directive (e.g. `MINIMA_LOG=minima_core=trace`).

use tracing_subscriber::EnvFilter;

/// Minimum level for emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Structured JSON, machine-readable (default).
    #[default]
    Json,
    /// Colored multi-line output for development.
    Pretty,
    /// Single-line minimal output.
    Compact,
}

/// Subscriber configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    level: LogLevel,
    format: LogFormat,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Install the global subscriber.
    ///
    /// Subsequent calls are no-ops, so tests and embedded apps may call this
    /// freely.
    pub fn init(self) {
        let filter = EnvFilter::try_from_env("MINIMA_LOG")
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let result = match self.format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
            LogFormat::Compact => builder.compact().try_init(),
        };
        let _ = result;
    }
}
