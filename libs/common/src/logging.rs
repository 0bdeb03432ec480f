//! Unified logging module for the ticketing services
//!
//! Console output always goes to stderr. A daily-rolling log file can be
//! added on top; both share the same `RUST_LOG`-aware filter.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

// Keeps the non-blocking file writer alive for the whole process
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Logging bootstrap errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("log file path has no file name: {0}")]
    InvalidLogFile(PathBuf),

    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] target: message`
///
/// Example output: `2026-10-17T08:00:01.000000Z [INFO] ticketsrv::poller: Poll tick done`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        write!(writer, "{}: ", event.metadata().target())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as the default file name prefix
    pub service_name: String,
    /// Level used when `RUST_LOG` is not set
    pub level: Level,
    /// Optional log file; rotated daily next to the given path
    pub log_file: Option<PathBuf>,
    /// Emit JSON lines instead of the bracketed text format
    pub enable_json: bool,
    /// Colorize console output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            level: Level::WARN,
            log_file: None,
            enable_json: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Create a config for `service_name` with the default level
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Pick the level from the classic `--debug` / `--verbose` switches
    ///
    /// Debug wins over verbose; with neither set only warnings and errors are shown.
    pub fn with_flags(mut self, debug: bool, verbose: bool) -> Self {
        self.level = level_from_flags(debug, verbose);
        self
    }

    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }

    pub fn with_json(mut self, enable_json: bool) -> Self {
        self.enable_json = enable_json;
        self
    }
}

/// Map `--debug` / `--verbose` switches to a level
pub fn level_from_flags(debug: bool, verbose: bool) -> Level {
    if debug {
        Level::DEBUG
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    }
}

/// Build the filter: `RUST_LOG` wins over the configured level
fn build_filter(level: Level) -> Result<EnvFilter, LoggingError> {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(&directives).map_err(|e| LoggingError::InvalidFilter {
                filter: directives.clone(),
                reason: e.to_string(),
            })
        },
        _ => Ok(EnvFilter::new(level.to_string().to_lowercase())),
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, String), LoggingError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LoggingError::InvalidLogFile(path.to_path_buf()))?
        .to_string();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name))
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config.level)?;
    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);

    let console_layer: BoxedLayer = if config.enable_json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_ansi(config.ansi)
            .with_writer(std::io::stderr)
            .event_format(BracketedLevelFormat)
            .boxed()
    };
    layers.push(console_layer);

    if let Some(path) = &config.log_file {
        let (dir, file_name) = split_log_path(path)?;
        let appender = tracing_appender::rolling::daily(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);

        let file_layer: BoxedLayer = if config.enable_json {
            fmt::layer().json().with_writer(non_blocking).boxed()
        } else {
            fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .event_format(BracketedLevelFormat)
                .boxed()
        };
        layers.push(file_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        "Logging: {} @ {} (file: {:?})",
        config.service_name,
        config.level,
        config.log_file
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_flags() {
        assert_eq!(level_from_flags(true, true), Level::DEBUG);
        assert_eq!(level_from_flags(false, true), Level::INFO);
        assert_eq!(level_from_flags(false, false), Level::WARN);
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("/var/log/ticketsrv.log")).unwrap();
        assert_eq!(dir, PathBuf::from("/var/log"));
        assert_eq!(name, "ticketsrv.log");

        let (dir, name) = split_log_path(Path::new("ticketsrv.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "ticketsrv.log");

        assert!(split_log_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_builder_flags() {
        let config = LogConfig::new("ticketsrv")
            .with_flags(false, true)
            .with_json(true)
            .with_log_file(Some(PathBuf::from("/tmp/t.log")));
        assert_eq!(config.service_name, "ticketsrv");
        assert_eq!(config.level, Level::INFO);
        assert!(config.enable_json);
        assert!(config.log_file.is_some());
    }
}
