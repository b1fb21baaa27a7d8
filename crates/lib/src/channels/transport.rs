//! Transport capability shared by every chat platform.

use crate::event::{InboundEvent, Platform, SenderId};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Lazy, infinite sequence of inbound events. Not restartable: call `listen` again for a fresh one.
pub type EventStream = BoxStream<'static, Result<InboundEvent, TransportError>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("transport api error: {0}")]
    Api(String),
    #[error("transport returned malformed data: {0}")]
    Decode(String),
    #[error("transport not configured: {0}")]
    Config(&'static str),
    #[error("random id generation failed: {0}")]
    Random(String),
}

/// Handle to a chat platform: long-poll for events, send text messages.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn platform(&self) -> Platform;

    /// Subscribe to inbound events.
    fn listen(&self) -> EventStream;

    /// Send a text message to a user or chat.
    async fn send(&self, recipient: &SenderId, text: &str) -> Result<(), TransportError>;

    /// Longest text the platform accepts in one message, in characters.
    fn max_message_chars(&self) -> usize {
        4096
    }
}
