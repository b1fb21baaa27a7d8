//! One dispatch cycle: filter an inbound event, resolve its intent, deliver the reply or warn.

use crate::channels::{ChatTransport, TransportError};
use crate::event::{self, InboundEvent, SenderId, SessionKey};
use crate::logging::BotLogger;
use crate::nlu::{IntentResolver, ResolveError};
use std::sync::Arc;

const START_COMMAND: &str = "start";

fn unrecognised_message_warning(text: &str, sender: &SenderId) -> String {
    format!(
        "Got unrecognised message \"{}\" from user with id {}.",
        text, sender
    )
}

fn greeting(first_name: Option<&str>) -> String {
    match first_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Hello, {}!", name),
        None => "Hello!".to_string(),
    }
}

/// What the resolver made of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentVerdict {
    Recognized { reply_text: String },
    Fallback,
}

impl IntentVerdict {
    pub fn recognized(&self) -> bool {
        matches!(self, IntentVerdict::Recognized { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("inbound message has empty text")]
    EmptyText,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// How a dispatch cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Rejected by the filter.
    Ignored,
    /// Answered a `/start` command.
    Greeted,
    Replied,
    /// Fallback verdict: no reply, one warning.
    Unrecognized,
}

/// Calls the resolver once per message. No caching, no retries. A match without reply text
/// counts as unrecognised.
pub struct Dispatcher {
    resolver: Arc<dyn IntentResolver>,
}

impl Dispatcher {
    pub fn new(resolver: Arc<dyn IntentResolver>) -> Self {
        Self { resolver }
    }

    pub async fn resolve(
        &self,
        session: &SessionKey,
        text: &str,
    ) -> Result<IntentVerdict, DispatchError> {
        if text.trim().is_empty() {
            return Err(DispatchError::EmptyText);
        }
        let detection = self.resolver.detect(session, text).await?;
        if detection.is_fallback {
            Ok(IntentVerdict::Fallback)
        } else if detection.reply_text.trim().is_empty() {
            log::debug!("dispatch: session {} matched an intent with no reply text", session);
            Ok(IntentVerdict::Fallback)
        } else {
            Ok(IntentVerdict::Recognized {
                reply_text: detection.reply_text,
            })
        }
    }
}

/// Delivers verdicts: recognized replies go to the sender, fallbacks become a warning.
pub struct ReplySink {
    transport: Arc<dyn ChatTransport>,
}

impl ReplySink {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    pub async fn deliver(
        &self,
        sender: &SenderId,
        text: &str,
        verdict: IntentVerdict,
        logger: &BotLogger,
    ) -> Result<Outcome, DispatchError> {
        match verdict {
            IntentVerdict::Recognized { reply_text } => {
                self.transport.send(sender, &reply_text).await?;
                Ok(Outcome::Replied)
            }
            IntentVerdict::Fallback => {
                logger.warn(unrecognised_message_warning(text, sender)).await;
                Ok(Outcome::Unrecognized)
            }
        }
    }
}

/// Filter → Dispatcher → ReplySink for one platform.
pub struct Pipeline {
    transport: Arc<dyn ChatTransport>,
    dispatcher: Dispatcher,
    sink: ReplySink,
    logger: BotLogger,
}

impl Pipeline {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        resolver: Arc<dyn IntentResolver>,
        logger: BotLogger,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(resolver),
            sink: ReplySink::new(transport.clone()),
            transport,
            logger,
        }
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    pub fn logger(&self) -> &BotLogger {
        &self.logger
    }

    /// Run one event through the pipeline. Errors are left to the supervisor.
    pub async fn handle(&self, event: InboundEvent) -> Result<Outcome, DispatchError> {
        if !event::accepts(&event) {
            return self.handle_rejected(event).await;
        }
        let InboundEvent::NewMessage {
            sender_id, text, ..
        } = event
        else {
            return Ok(Outcome::Ignored);
        };
        let verdict = self
            .dispatcher
            .resolve(&sender_id.session_key(), &text)
            .await?;
        self.sink
            .deliver(&sender_id, &text, verdict, &self.logger)
            .await
    }

    async fn handle_rejected(&self, event: InboundEvent) -> Result<Outcome, DispatchError> {
        match event {
            InboundEvent::Command {
                sender_id,
                name,
                first_name,
            } if name == START_COMMAND => {
                self.transport
                    .send(&sender_id, &greeting(first_name.as_deref()))
                    .await?;
                Ok(Outcome::Greeted)
            }
            InboundEvent::Command { name, .. } => {
                log::debug!("dispatch: ignoring command /{}", name);
                Ok(Outcome::Ignored)
            }
            InboundEvent::Other { kind } => {
                log::trace!("dispatch: ignoring {} event", kind);
                Ok(Outcome::Ignored)
            }
            InboundEvent::NewMessage { sender_id, .. } => {
                log::trace!("dispatch: ignoring outgoing message to {}", sender_id);
                Ok(Outcome::Ignored)
            }
        }
    }
}
