//! User-visible diagnostics for an execution.
//!
//! The [`Diagnostics`] sink is the execution's build log: the owner decides
//! where lines go. Messages must only ever contain identifiers (template,
//! server and credential ids, file paths), never secret values.

use parking_lot::Mutex;
use std::fmt;

/// Severity of a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Warn => "WARNING",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Sink for diagnostics produced while supplying settings.
pub trait Diagnostics: Send + Sync {
    /// Emit a single line.
    fn emit(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.emit(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.emit(Level::Error, message);
    }
}

/// Forwards diagnostics to `tracing`, tagged with the execution label.
#[derive(Debug, Clone)]
pub struct TracingDiagnostics {
    execution: String,
}

impl TracingDiagnostics {
    pub fn new(execution: impl Into<String>) -> Self {
        Self {
            execution: execution.into(),
        }
    }
}

impl Diagnostics for TracingDiagnostics {
    fn emit(&self, level: Level, message: &str) {
        match level {
            Level::Info => tracing::info!(execution = %self.execution, "{}", message),
            Level::Warn => tracing::warn!(execution = %self.execution, "{}", message),
            Level::Error => tracing::error!(execution = %self.execution, "{}", message),
        }
    }
}

/// Keeps every line in memory.
///
/// Used by tests and by hosts that attach the lines to a build record.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    lines: Mutex<Vec<(Level, String)>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded lines.
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().clone()
    }

    /// Messages recorded at exactly `level`.
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Whether any recorded line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|(_, m)| m.contains(needle))
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn emit(&self, level: Level, message: &str) {
        tracing::debug!(%level, "{}", message);
        self.lines.lock().push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_diagnostics_by_level() {
        let diagnostics = RecordingDiagnostics::new();
        diagnostics.info("one");
        diagnostics.warn("two");
        diagnostics.error("three");
        diagnostics.warn("four");

        assert_eq!(diagnostics.lines().len(), 4);
        assert_eq!(diagnostics.messages_at(Level::Warn), vec!["two", "four"]);
        assert!(diagnostics.contains("thr"));
        assert!(!diagnostics.contains("five"));
    }

    #[test]
    fn test_level_display() {
        assert_eq!(Level::Warn.to_string(), "WARNING");
        assert!(Level::Error > Level::Info);
    }
}
