//! Logging setup and event macros.
//!
//! Timestamped logging with per-target level configuration. Supports the
//! `RUST_LOG` environment variable for runtime overrides.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "info"
//! output = "stdout"   # or "stderr", or a file path
//!
//! [logging.modules]
//! "cache_prune::watcher" = "debug"
//! ```
//!
//! # Environment Variable
//!
//! `RUST_LOG` takes precedence over config:
//! ```bash
//! RUST_LOG=debug cache-prune
//! RUST_LOG=cache_prune::cache=trace cache-prune --only-mod-cache
//! ```

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// RFC 3339 timestamps with nanosecond precision.
struct Rfc3339Nanos;

impl FormatTime for Rfc3339Nanos {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
        )
    }
}

/// Build the filter directive string from config.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.default.clone();
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();
    for (module, level) in modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    filter_str
}

fn make_writer(output: &str) -> io::Result<(BoxMakeWriter, bool)> {
    match output {
        "stdout" | "" => Ok((BoxMakeWriter::new(io::stdout), true)),
        "stderr" => Ok((BoxMakeWriter::new(io::stderr), true)),
        path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(path))?;
            Ok((BoxMakeWriter::new(Mutex::new(file)), false))
        }
    }
}

/// Initialize logging with configuration.
///
/// Call once at startup. Safe to call multiple times (only first call takes effect).
/// Fails only if a log file was requested and cannot be opened.
///
/// The `RUST_LOG` environment variable takes precedence over config settings.
pub fn init_with_config(config: &LoggingConfig) -> io::Result<()> {
    let (writer, ansi) = make_writer(&config.output)?;

    INIT.call_once(|| {
        // RUST_LOG env var takes precedence over config
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .with_timer(Rfc3339Nanos)
            .with_level(true)
            .with_filter(filter);

        // A subscriber installed elsewhere (e.g. by a test harness) wins.
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });

    Ok(())
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("prune", "finished");
/// log_event!("watch", "watching", "{} directories", count);
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("watch", "added watch", "{}", path.display());
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_filter_directives_include_modules() {
        let config = LoggingConfig {
            default: "warn".to_string(),
            output: "stdout".to_string(),
            modules: HashMap::from([
                ("cache_prune::watcher".to_string(), "debug".to_string()),
                ("cache_prune::cache".to_string(), "trace".to_string()),
            ]),
        };

        assert_eq!(
            filter_directives(&config),
            "warn,cache_prune::cache=trace,cache_prune::watcher=debug"
        );
    }

    #[test]
    fn test_unopenable_log_file_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = LoggingConfig {
            output: temp.path().join("missing/dir/log.txt").display().to_string(),
            ..LoggingConfig::default()
        };

        assert!(init_with_config(&config).is_err());
    }
}
