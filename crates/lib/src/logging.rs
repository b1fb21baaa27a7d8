//! Per-pipeline logging façade.
//!
//! Every line goes to the `log` crate (printed by env_logger in the binary) and, at WARN and above,
//! to the attached escalation sink so the administrator receives it as a chat message.

use crate::escalation::EscalationSink;
use chrono::{DateTime, Local};
use std::fmt;

/// Log target used for pipeline records.
pub const TARGET: &str = "relay::bot";

/// Render a log line as `<PREFIX> <timestamp> <LEVEL>: <message>`.
pub fn render_line(
    prefix: &str,
    timestamp: &DateTime<Local>,
    level: log::Level,
    message: &dyn fmt::Display,
) -> String {
    format!(
        "{} {} {}: {}",
        prefix,
        timestamp.format("%Y-%m-%d %H:%M:%S,%3f"),
        level,
        message
    )
}

/// A log record captured for escalation.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: log::Level,
    pub message: String,
}

impl LogEntry {
    pub fn now(level: log::Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    pub fn render(&self, prefix: &str) -> String {
        render_line(prefix, &self.timestamp, self.level, &self.message)
    }
}

/// Named logger for one pipeline, with an optional escalation sink attached.
pub struct BotLogger {
    prefix: String,
    escalation: Option<EscalationSink>,
}

impl BotLogger {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            escalation: None,
        }
    }

    /// Attach the escalation sink; it receives every record at or above its threshold from now on.
    pub fn attach(mut self, sink: EscalationSink) -> Self {
        self.escalation = Some(sink);
        self
    }

    pub async fn log(&self, level: log::Level, message: impl Into<String>) {
        let message = message.into();
        log::log!(target: TARGET, level, "{}", message);
        if let Some(sink) = &self.escalation {
            if sink.accepts(level) {
                let entry = LogEntry::now(level, message);
                sink.emit(&self.prefix, &entry).await;
            }
        }
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(log::Level::Info, message).await
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.log(log::Level::Warn, message).await
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(log::Level::Error, message).await
    }
}
