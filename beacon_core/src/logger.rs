/**
 * Injected logging capability.
 *
 * Every component receives an `Arc<dyn Logger>` at construction instead
 * of reaching for a process-wide logger. The default `TracingLogger`
 * forwards to the `tracing` macros; tests plug in a recording logger.
 */
use std::fmt;

/**
 * Severity levels, from chattiest to most severe.
 *
 * Serialized in log lines as lowercase strings: `"verbose"`, `"debug"`, ...
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/**
 * Sink for diagnostic messages.
 *
 * Implementors only provide `log`; the per-level helpers are conveniences.
 * Must be callable from any worker thread.
 */
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn verbose(&self, message: &str) {
        self.log(LogLevel::Verbose, message);
    }

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Forwards to `tracing` under the `beacon` target. `Verbose` maps to `trace`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Verbose => tracing::trace!(target: "beacon", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "beacon", "{message}"),
            LogLevel::Info => tracing::info!(target: "beacon", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "beacon", "{message}"),
            LogLevel::Error => tracing::error!(target: "beacon", "{message}"),
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}
