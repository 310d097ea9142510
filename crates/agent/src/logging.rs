use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives, or one of the short level aliases.
pub const LOG_LEVEL_VAR: &str = "NETCHECK_LOG";
/// `stderr` (default), `stdout` or `file`.
pub const LOG_STREAM_VAR: &str = "NETCHECK_LOG_STREAM";
const DEFAULT_LEVEL: &str = "warn";

/// Where diagnostics are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stderr,
    Stdout,
    File,
}

impl LogStream {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "stdout" | "out" => LogStream::Stdout,
            "file" => LogStream::File,
            _ => LogStream::Stderr,
        }
    }
}

/// Expands the short level aliases accepted in [`LOG_LEVEL_VAR`]; anything
/// else is passed through as filter directives.
pub fn normalise_level(value: &str) -> String {
    let value = value.trim();
    match value.to_ascii_lowercase().as_str() {
        "" => DEFAULT_LEVEL.to_string(),
        "trace" | "t" => "trace".to_string(),
        "debug" | "dbg" | "d" => "debug".to_string(),
        "info" | "inf" | "i" => "info".to_string(),
        "warn" | "warning" | "w" => "warn".to_string(),
        "error" | "err" | "e" => "error".to_string(),
        "off" | "none" => "off".to_string(),
        _ => value.to_string(),
    }
}

/// Installs the global subscriber. Safe to call once per process.
pub fn init_logging() {
    let level = std::env::var(LOG_LEVEL_VAR).unwrap_or_default();
    let env_filter = EnvFilter::try_new(normalise_level(&level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));
    let stream = std::env::var(LOG_STREAM_VAR)
        .map(|name| LogStream::from_name(&name))
        .unwrap_or(LogStream::Stderr);

    let stderr_layer = (stream == LogStream::Stderr).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });
    let stdout_layer = (stream == LogStream::Stdout).then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(false)
    });
    let file_layer = (stream == LogStream::File).then(|| {
        fmt::layer()
            .with_writer(rolling::daily("logs", "netcheck.log"))
            .with_ansi(false)
            .json()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}
