//! Escalation of warning/error log records to an administrator over the chat transport.
//!
//! Delivery is best-effort: one send attempt per record, failures are dropped. Failures are logged at
//! debug level straight to the `log` crate and never go back through `BotLogger`, so an escalation
//! can not trigger another escalation.

use crate::channels::ChatTransport;
use crate::event::SenderId;
use crate::logging::LogEntry;
use std::sync::Arc;

/// Severities that can be escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn from_level(level: log::Level) -> Option<Self> {
        match level {
            log::Level::Error => Some(Severity::Error),
            log::Level::Warn => Some(Severity::Warning),
            log::Level::Info | log::Level::Debug | log::Level::Trace => None,
        }
    }
}

/// One escalation message, alive only for its send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEscalation {
    pub severity: Severity,
    pub rendered_text: String,
    pub admin_chat_id: SenderId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOutcome {
    Sent,
    /// The send failed and the notification was dropped.
    Suppressed,
    /// Below threshold; nothing was sent.
    Skipped,
}

/// Sends log records to the administrator chat.
pub struct EscalationSink {
    transport: Arc<dyn ChatTransport>,
    admin: SenderId,
    threshold: log::LevelFilter,
}

impl EscalationSink {
    /// Sink for WARN and above, delivered to `admin_id` on the transport's platform.
    pub fn new(transport: Arc<dyn ChatTransport>, admin_id: impl Into<String>) -> Self {
        let admin = SenderId::new(transport.platform(), admin_id);
        Self {
            transport,
            admin,
            threshold: log::LevelFilter::Warn,
        }
    }

    /// Raise the threshold (e.g. to `Error`). Levels below WARN are never escalated.
    pub fn with_threshold(mut self, threshold: log::LevelFilter) -> Self {
        self.threshold = threshold.min(log::LevelFilter::Warn);
        self
    }

    pub fn accepts(&self, level: log::Level) -> bool {
        level <= self.threshold
    }

    /// Build the escalation for an entry, or None when the entry is below threshold.
    pub fn escalation(&self, prefix: &str, entry: &LogEntry) -> Option<LogEscalation> {
        if !self.accepts(entry.level) {
            return None;
        }
        let severity = Severity::from_level(entry.level)?;
        Some(LogEscalation {
            severity,
            rendered_text: truncate_chars(&entry.render(prefix), self.transport.max_message_chars()),
            admin_chat_id: self.admin.clone(),
        })
    }

    /// Attempt exactly one send of the rendered entry. Never returns an error.
    pub async fn emit(&self, prefix: &str, entry: &LogEntry) -> EscalationOutcome {
        let Some(escalation) = self.escalation(prefix, entry) else {
            return EscalationOutcome::Skipped;
        };
        match self
            .transport
            .send(&escalation.admin_chat_id, &escalation.rendered_text)
            .await
        {
            Ok(()) => EscalationOutcome::Sent,
            Err(e) => {
                log::debug!(
                    "escalation: dropped {:?} notification for {}: {}",
                    escalation.severity,
                    escalation.admin_chat_id,
                    e
                );
                EscalationOutcome::Suppressed
            }
        }
    }
}

/// Cut `text` to at most `max` characters, ending with an ellipsis when shortened.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Platform;
    use crate::testing::RecordingTransport;

    fn sink(transport: &Arc<RecordingTransport>) -> EscalationSink {
        EscalationSink::new(transport.clone(), "admin-1")
    }

    #[tokio::test]
    async fn warning_is_sent_to_admin() {
        let transport = Arc::new(RecordingTransport::new(Platform::Telegram));
        let outcome = sink(&transport)
            .emit("TELEGRAM_BOT", &LogEntry::now(log::Level::Warn, "low disk"))
            .await;
        assert_eq!(outcome, EscalationOutcome::Sent);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, SenderId::new(Platform::Telegram, "admin-1"));
        assert!(sent[0].1.starts_with("TELEGRAM_BOT "));
        assert!(sent[0].1.ends_with("WARN: low disk"));
    }

    #[tokio::test]
    async fn info_and_debug_are_not_escalated() {
        let transport = Arc::new(RecordingTransport::new(Platform::Vk));
        let sink = sink(&transport);
        for level in [log::Level::Info, log::Level::Debug] {
            let outcome = sink.emit("VKONTAKTE_BOT", &LogEntry::now(level, "noise")).await;
            assert_eq!(outcome, EscalationOutcome::Skipped);
        }
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn error_threshold_skips_warnings() {
        let transport = Arc::new(RecordingTransport::new(Platform::Vk));
        let sink = sink(&transport).with_threshold(log::LevelFilter::Error);
        assert_eq!(
            sink.emit("P", &LogEntry::now(log::Level::Warn, "w")).await,
            EscalationOutcome::Skipped
        );
        assert_eq!(
            sink.emit("P", &LogEntry::now(log::Level::Error, "e")).await,
            EscalationOutcome::Sent
        );
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn send_failure_is_suppressed_without_retry() {
        let transport = Arc::new(RecordingTransport::new(Platform::Telegram));
        transport.fail_sends(true);
        let outcome = sink(&transport)
            .emit("TELEGRAM_BOT", &LogEntry::now(log::Level::Error, "resolver down"))
            .await;
        assert_eq!(outcome, EscalationOutcome::Suppressed);
        assert_eq!(transport.send_attempts(), 1);
    }

    #[test]
    fn long_text_is_truncated_to_platform_limit() {
        let transport = Arc::new(RecordingTransport::new(Platform::Telegram).with_max_chars(20));
        let entry = LogEntry::now(log::Level::Warn, "x".repeat(100));
        let escalation = sink(&transport).escalation("TELEGRAM_BOT", &entry).unwrap();
        assert_eq!(escalation.rendered_text.chars().count(), 20);
        assert!(escalation.rendered_text.ends_with('…'));
        assert_eq!(escalation.severity, Severity::Warning);
    }

    #[test]
    fn short_text_is_kept() {
        assert_eq!(truncate_chars("привет", 6), "привет");
        assert_eq!(truncate_chars("привет", 4), "при…");
    }
}
