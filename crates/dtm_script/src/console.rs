//! Diagnostic output of smart functions
//!
//! Scripts see a `console` global. Each call becomes a [`ConsoleLog`]; the
//! sandbox either keeps it (capture mode) or hands it to a [`ConsoleSink`]
//! (pass-through mode). The mode is chosen when the sandbox is built.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    /// Informational output (`console.log` / `console.info`).
    Log,
    Debug,
    Verbose,
    Trace,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Log,
        LogLevel::Debug,
        LogLevel::Verbose,
        LogLevel::Trace,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Log => "log",
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
            LogLevel::Trace => "trace",
        }
    }

    /// `console` methods that emit at this level.
    pub(crate) fn methods(self) -> &'static [&'static str] {
        match self {
            LogLevel::Error => &["error"],
            LogLevel::Warn => &["warn"],
            LogLevel::Log => &["log", "info"],
            LogLevel::Debug => &["debug"],
            LogLevel::Verbose => &["verbose"],
            LogLevel::Trace => &["trace"],
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured console call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleLog {
    pub level: LogLevel,
    pub args: Vec<Value>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl ConsoleLog {
    pub fn new(level: LogLevel, args: Vec<Value>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            level,
            args,
            timestamp,
        }
    }

    /// Arguments joined the way a terminal console prints them.
    pub fn message(&self) -> String {
        render_args(&self.args)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.args
            .iter()
            .any(|arg| arg.as_str().is_some_and(|s| s.contains(needle)))
    }
}

pub(crate) fn render_args(args: &[Value]) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Receiver of console output in pass-through mode.
///
/// Called from the sandbox worker thread.
pub trait ConsoleSink: Send + Sync {
    fn emit(&self, level: LogLevel, args: &[Value]);
}

/// Forwards script output to `tracing` under the `dtm::console` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsole;

impl ConsoleSink for TracingConsole {
    fn emit(&self, level: LogLevel, args: &[Value]) {
        let message = render_args(args);
        match level {
            LogLevel::Error => tracing::error!(target: "dtm::console", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "dtm::console", "{message}"),
            LogLevel::Log => tracing::info!(target: "dtm::console", "{message}"),
            LogLevel::Debug | LogLevel::Verbose => {
                tracing::debug!(target: "dtm::console", severity = level.as_str(), "{message}")
            }
            LogLevel::Trace => tracing::trace!(target: "dtm::console", "{message}"),
        }
    }
}

/// Where console calls go.
#[derive(Clone)]
pub enum ConsoleMode {
    Capture,
    PassThrough(Arc<dyn ConsoleSink>),
}

impl fmt::Debug for ConsoleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleMode::Capture => f.write_str("Capture"),
            ConsoleMode::PassThrough(_) => f.write_str("PassThrough(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn levels_serialize_lowercase() {
        assert_eq!(serde_json::to_value(LogLevel::Verbose).unwrap(), json!("verbose"));
        let log: ConsoleLog =
            serde_json::from_value(json!({ "level": "debug", "args": ["x"], "timestamp": 1 }))
                .unwrap();
        assert_eq!(log.level, LogLevel::Debug);
    }

    #[test]
    fn message_joins_args() {
        let log = ConsoleLog::new(LogLevel::Log, vec![json!("value"), json!(3), json!({ "a": 1 })]);
        assert_eq!(log.message(), r#"value 3 {"a":1}"#);
        assert!(log.contains("val"));
        assert!(!log.contains("3"));
        assert!(log.timestamp > 0);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(LogLevel, String)>>);

    impl ConsoleSink for Recorder {
        fn emit(&self, level: LogLevel, args: &[Value]) {
            self.0.lock().unwrap().push((level, render_args(args)));
        }
    }

    #[test]
    fn sink_is_object_safe() {
        let recorder = Arc::new(Recorder::default());
        let mode = ConsoleMode::PassThrough(recorder.clone());
        if let ConsoleMode::PassThrough(sink) = &mode {
            sink.emit(LogLevel::Warn, &[json!("careful")]);
        }
        assert_eq!(recorder.0.lock().unwrap()[0], (LogLevel::Warn, "careful".to_string()));
        assert_eq!(format!("{mode:?}"), "PassThrough(..)");
    }
}
