//! Logging and tracing utilities for xrlevel
//!
//! Structured logging uses the `tracing` crate. Decoders emit `debug!` per
//! chunk and `warn!` for anything left unconsumed; binaries install a
//! subscriber once through [`init_default`] or [`init_with_config`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use xrlevel_core::{Error, Result};

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the default tracing subscriber
///
/// Multiple calls are safe and will be ignored.
pub fn init_default() {
    init_with_config(TracingConfig::default());
}

/// Initialize tracing with a custom configuration
pub fn init_with_config(config: TracingConfig) {
    if TRACING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    // Another subscriber may already be installed by an embedding application
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init();
}

/// Subscriber settings; `RUST_LOG` overrides `default_level`
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `EnvFilter` directives
    pub default_level: String,
    pub show_target: bool,
    /// Worth turning on for batch decodes
    pub show_thread_ids: bool,
    pub show_file: bool,
    pub show_line_number: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: "warn,xrlevel=info,xrlevel_parsers=info".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
        }
    }
}

impl TracingConfig {
    /// Filter for a verbosity count as given by repeated `-v` flags
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        self.default_level = match verbose {
            0 => return self,
            1 => "warn,xrlevel=debug,xrlevel_parsers=debug",
            _ => "trace",
        }
        .to_string();
        self
    }
}

/// Run a decode inside a `parse` span and log how it ended.
///
/// Format errors are logged at `warn` since they describe the input;
/// anything else (I/O, companions missing on disk) at `error`.
pub fn instrument_parse<T>(name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let span = tracing::info_span!("parse", parser = %name);
    let _guard = span.enter();

    let start = Instant::now();
    let result = f();
    let elapsed_ms = start.elapsed().as_millis();

    match &result {
        Ok(_) => tracing::debug!(elapsed_ms, "decode finished"),
        Err(err) if err.is_format_error() => tracing::warn!(elapsed_ms, error = %err, "rejected malformed input"),
        Err(err) => tracing::error!(elapsed_ms, error = %err, "decode failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert!(config.default_level.contains("xrlevel_parsers=info"));
        assert!(config.show_target);
        assert!(!config.show_thread_ids);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(TracingConfig::default().with_verbosity(0).default_level, TracingConfig::default().default_level);
        assert!(TracingConfig::default().with_verbosity(1).default_level.contains("debug"));
        assert_eq!(TracingConfig::default().with_verbosity(3).default_level, "trace");
    }

    #[test]
    fn test_instrument_parse_passes_result_through() {
        assert_eq!(instrument_parse("test", || Ok(42)).unwrap(), 42);

        let err = instrument_parse::<()>("test", || Err(Error::BufferUnderrun { offset: 4, requested: 2, available: 1 }));
        assert!(matches!(err, Err(Error::BufferUnderrun { .. })));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_default();
        init_default();
        assert!(TRACING_INITIALIZED.load(Ordering::SeqCst));
    }
}
