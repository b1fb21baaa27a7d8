//! Telegram channel: long-poll getUpdates and sendMessage via Bot API.

use crate::channels::transport::{ChatTransport, EventStream, TransportError};
use crate::event::{InboundEvent, Platform, SenderId};
use async_trait::async_trait;
use futures_util::stream;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
const NO_OFFSET: i64 = 0;

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    #[serde(default)]
    pub first_name: Option<String>,
}

impl TelegramUpdate {
    /// Map the wire update to an event. Texts starting with `/` are commands; text-less messages are `Other`.
    pub fn into_event(self) -> InboundEvent {
        let Some(msg) = self.message else {
            return InboundEvent::Other {
                kind: "update".to_string(),
            };
        };
        let sender_id = SenderId::new(Platform::Telegram, msg.chat.id.to_string());
        let text = match msg.text {
            Some(t) if !t.trim().is_empty() => t,
            _ => {
                return InboundEvent::Other {
                    kind: "message_without_text".to_string(),
                }
            }
        };
        if let Some(command) = text.strip_prefix('/') {
            let name = command
                .split_whitespace()
                .next()
                .unwrap_or("")
                .split('@')
                .next()
                .unwrap_or("")
                .to_string();
            return InboundEvent::Command {
                sender_id,
                name,
                first_name: msg.from.and_then(|u| u.first_name),
            };
        }
        InboundEvent::NewMessage {
            sender_id,
            text,
            directed_at_bot: true,
        }
    }
}

/// Telegram channel connector: long-polls for updates and sends replies via sendMessage.
#[derive(Clone)]
pub struct TelegramChannel {
    token: Option<String>,
    api_base: String,
    /// Next getUpdates offset; shared by every stream so a resubscription skips updates already pulled.
    offset: Arc<AtomicI64>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self::with_api_base(token, telegram_api_base())
    }

    pub fn with_api_base(token: Option<String>, api_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_TIMEOUT + 10))
            .build()
            .unwrap_or_default();
        Self {
            token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            offset: Arc::new(AtomicI64::new(NO_OFFSET)),
            client,
        }
    }

    fn method_url(&self, method: &str) -> Result<String, TransportError> {
        let token = self
            .token
            .as_ref()
            .ok_or(TransportError::Config("telegram bot token not configured"))?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// Call Telegram getUpdates (long poll) from the current offset.
    async fn get_updates(&self) -> Result<Vec<TelegramUpdate>, TransportError> {
        let mut url = format!(
            "{}?timeout={}",
            self.method_url("getUpdates")?,
            LONG_POLL_TIMEOUT
        );
        let offset = self.offset.load(Ordering::SeqCst);
        if offset != NO_OFFSET {
            url = format!("{}&offset={}", url, offset);
        }
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!(
                "getUpdates failed: {} {}",
                status, body
            )));
        }
        let data: GetUpdatesResponse = res
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        if !data.ok {
            return Err(TransportError::Api(format!(
                "getUpdates returned ok: false ({})",
                data.description.unwrap_or_default()
            )));
        }
        Ok(data.result)
    }

    /// Remove webhook so the bot can use getUpdates.
    pub async fn delete_webhook(&self) -> Result<(), TransportError> {
        let url = self.method_url("deleteWebhook")?;
        let res = self.client.post(&url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!(
                "deleteWebhook failed: {} {}",
                status, body
            )));
        }
        Ok(())
    }

    /// Send a text message to a chat via sendMessage API.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        let url = self.method_url("sendMessage")?;
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!(
                "sendMessage failed: {} {}",
                status, body
            )));
        }
        let data: ApiResponse = res
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        if !data.ok {
            return Err(TransportError::Api(format!(
                "sendMessage returned ok: false ({})",
                data.description.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

struct PollState {
    channel: TelegramChannel,
    pending: VecDeque<TelegramUpdate>,
    webhook_cleared: bool,
}

#[async_trait]
impl ChatTransport for TelegramChannel {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    fn listen(&self) -> EventStream {
        log::debug!("telegram channel: starting getUpdates long-poll stream");
        let state = PollState {
            channel: self.clone(),
            pending: VecDeque::new(),
            webhook_cleared: false,
        };
        Box::pin(stream::unfold(state, |mut state| async move {
            if !state.webhook_cleared {
                if let Err(e) = state.channel.delete_webhook().await {
                    return Some((Err(e), state));
                }
                state.webhook_cleared = true;
            }
            loop {
                if let Some(update) = state.pending.pop_front() {
                    state
                        .channel
                        .offset
                        .fetch_max(update.update_id + 1, Ordering::SeqCst);
                    return Some((Ok(update.into_event()), state));
                }
                match state.channel.get_updates().await {
                    Ok(updates) => state.pending.extend(updates),
                    Err(e) => return Some((Err(e), state)),
                }
            }
        }))
    }

    async fn send(&self, recipient: &SenderId, text: &str) -> Result<(), TransportError> {
        self.send_message(&recipient.id, text).await
    }
}

/// Resolve Telegram bot API base URL (for tests or custom endpoints).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| TELEGRAM_API_BASE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: serde_json::Value) -> TelegramUpdate {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn text_message_becomes_new_message() {
        let event = update(serde_json::json!({
            "update_id": 1,
            "message": { "chat": { "id": 99 }, "text": "how do I apply?" }
        }))
        .into_event();
        assert_eq!(
            event,
            InboundEvent::NewMessage {
                sender_id: SenderId::new(Platform::Telegram, "99"),
                text: "how do I apply?".to_string(),
                directed_at_bot: true,
            }
        );
    }

    #[test]
    fn slash_text_becomes_command() {
        let event = update(serde_json::json!({
            "update_id": 2,
            "message": {
                "chat": { "id": 5 },
                "from": { "first_name": "Ann" },
                "text": "/start@relay_bot"
            }
        }))
        .into_event();
        assert_eq!(
            event,
            InboundEvent::Command {
                sender_id: SenderId::new(Platform::Telegram, "5"),
                name: "start".to_string(),
                first_name: Some("Ann".to_string()),
            }
        );
    }

    #[test]
    fn sticker_and_non_message_updates_are_other() {
        let sticker = update(serde_json::json!({
            "update_id": 3,
            "message": { "chat": { "id": 5 } }
        }));
        let edited = update(serde_json::json!({ "update_id": 4, "edited_message": {} }));
        assert!(matches!(sticker.into_event(), InboundEvent::Other { .. }));
        assert!(matches!(edited.into_event(), InboundEvent::Other { .. }));
    }
}
