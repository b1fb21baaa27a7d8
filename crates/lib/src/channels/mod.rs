//! Chat transports (Telegram, VK).
//!
//! A transport yields a stream of inbound events and sends plain text messages.
//! The dispatch pipeline and the escalation sink only see the `ChatTransport` trait.

mod telegram;
mod transport;
mod vk;

pub use transport::{ChatTransport, EventStream, TransportError};
pub use telegram::{TelegramChannel, TelegramUpdate};
pub use vk::VkChannel;
