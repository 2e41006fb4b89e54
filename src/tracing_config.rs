//! Tracing subscriber setup for the command-line binary
//!
//! The library only emits events; the binary decides where they go. All log
//! output is written to stderr so stdout carries nothing but prompts and the
//! final status line.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable whose filter directives override the verbosity flag
pub const LOG_ENV: &str = "RUST_LOG";

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Colored compact output for terminals
    #[default]
    Console,
    /// Compact output without colors for CI logs and pipes
    Compact,
}

/// Tracing configuration builder
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    /// Output format
    pub format: TracingFormat,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set custom environment filter
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Take the filter from `RUST_LOG` when it is set and non-empty
    #[must_use]
    pub fn with_env_filter_from_env(self) -> Self {
        match std::env::var(LOG_ENV) {
            Ok(filter) if !filter.trim().is_empty() => self.with_env_filter(filter),
            _ => self,
        }
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Filter directives in effect: the explicit filter, else the verbosity
    #[must_use]
    pub fn filter_directives(&self) -> &str {
        self.env_filter
            .as_deref()
            .unwrap_or_else(|| self.verbosity_to_filter())
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use anyhow::Context;
        use tracing_subscriber::fmt;

        let directives = self.filter_directives();
        let filter = EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid log filter '{directives}'"))?;

        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_level(true)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },
        }

        Ok(())
    }
}
