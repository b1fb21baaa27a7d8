//! Inbound events from a chat platform and the filter that decides which of them reach the NLU backend.

use std::fmt;

/// Chat platform a pipeline runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Telegram,
    Vk,
}

impl Platform {
    /// Short tag used in session keys and log output.
    pub fn tag(self) -> &'static str {
        match self {
            Platform::Telegram => "tg",
            Platform::Vk => "vk",
        }
    }
}

/// Platform-scoped sender identifier (Telegram chat id, VK user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SenderId {
    pub platform: Platform,
    pub id: String,
}

impl SenderId {
    pub fn new(platform: Platform, id: impl Into<String>) -> Self {
        Self {
            platform,
            id: id.into(),
        }
    }

    /// Session key for the NLU backend. Same sender always yields the same key.
    pub fn session_key(&self) -> SessionKey {
        SessionKey(format!("{}-{}", self.platform.tag(), self.id))
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Opaque conversational-context id passed to the NLU backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One wire event, as decoded by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A text message. `directed_at_bot` is false for outgoing echoes of our own sends.
    NewMessage {
        sender_id: SenderId,
        text: String,
        directed_at_bot: bool,
    },
    /// A bot command such as `/start` (Telegram). Never forwarded to the NLU backend.
    Command {
        sender_id: SenderId,
        name: String,
        first_name: Option<String>,
    },
    /// Anything else the transport reports (edits, read receipts, typing, messages without text).
    Other { kind: String },
}

/// True iff the event is a new message directed at the bot.
pub fn accepts(event: &InboundEvent) -> bool {
    match event {
        InboundEvent::NewMessage {
            directed_at_bot, ..
        } => *directed_at_bot,
        InboundEvent::Command { .. } | InboundEvent::Other { .. } => false,
    }
}
