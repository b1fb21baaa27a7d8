//! VK channel: user long poll (messages.getLongPollServer + a_check) and messages.send.

use crate::channels::transport::{ChatTransport, EventStream, TransportError};
use crate::event::{InboundEvent, Platform, SenderId};
use async_trait::async_trait;
use futures_util::stream;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const VK_API_BASE: &str = "https://api.vk.com";
const VK_API_VERSION: &str = "5.131";
const LONG_POLL_WAIT: u64 = 25;
const LONG_POLL_VERSION: u32 = 3;
/// Long-poll event code for a new message.
const EVENT_MESSAGE_NEW: i64 = 4;
/// Message flag set on messages sent by this account.
const FLAG_OUTBOX: i64 = 2;
/// Peer ids from this value up are group chats (`2000000000 + chat_id`).
const CHAT_PEER_BASE: i64 = 2_000_000_000;

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    response: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LongPollServer {
    key: String,
    server: String,
    ts: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct LongPollResponse {
    #[serde(default)]
    ts: Option<serde_json::Value>,
    #[serde(default)]
    updates: Vec<serde_json::Value>,
    #[serde(default)]
    failed: Option<i64>,
}

/// Long-poll position of one channel: server key and ts, plus the updates of the last batch that
/// were not yielded yet.
#[derive(Debug, Default)]
struct PollCursor {
    server: Option<LongPollServer>,
    /// ts to keep when the next server is fetched (the key expired but the history is intact).
    resume_ts: Option<serde_json::Value>,
    pending: VecDeque<serde_json::Value>,
}

/// VK channel connector for a user or community access token.
#[derive(Clone)]
pub struct VkChannel {
    access_token: Option<String>,
    api_base: String,
    client: reqwest::Client,
    /// Shared by every stream so a resubscription resumes the same batch and ts.
    cursor: Arc<Mutex<PollCursor>>,
}

impl VkChannel {
    pub fn new(access_token: Option<String>) -> Self {
        Self::with_api_base(access_token, VK_API_BASE)
    }

    pub fn with_api_base(access_token: Option<String>, api_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_WAIT + 10))
            .build()
            .unwrap_or_default();
        Self {
            access_token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
            cursor: Arc::new(Mutex::new(PollCursor::default())),
        }
    }

    fn cursor(&self) -> MutexGuard<'_, PollCursor> {
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn token(&self) -> Result<&str, TransportError> {
        self.access_token
            .as_deref()
            .ok_or(TransportError::Config("vk access token not configured"))
    }

    /// Call a VK API method with the given parameters; access token and version are added here.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let url = format!("{}/method/{}", self.api_base, method);
        let token = self.token()?;
        let res = self
            .client
            .post(&url)
            .query(params)
            .query(&[("access_token", token), ("v", VK_API_VERSION)])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!(
                "{} failed: {} {}",
                method, status, body
            )));
        }
        let envelope: ApiEnvelope<T> = res
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        if let Some(err) = envelope.error {
            return Err(TransportError::Api(format!(
                "{} error {}: {}",
                method, err.error_code, err.error_msg
            )));
        }
        envelope
            .response
            .ok_or_else(|| TransportError::Decode(format!("{}: missing response", method)))
    }

    async fn long_poll_server(&self) -> Result<LongPollServer, TransportError> {
        self.call(
            "messages.getLongPollServer",
            &[("lp_version", LONG_POLL_VERSION.to_string())],
        )
        .await
    }

    /// Cached long-poll server, or a fresh one (keeping the ts of an expired key).
    async fn current_server(&self) -> Result<LongPollServer, TransportError> {
        let cached = self.cursor().server.clone();
        if let Some(server) = cached {
            return Ok(server);
        }
        let mut fresh = self.long_poll_server().await?;
        let mut cursor = self.cursor();
        if let Some(ts) = cursor.resume_ts.take() {
            fresh.ts = ts;
        }
        cursor.server = Some(fresh.clone());
        Ok(fresh)
    }

    async fn check(&self, server: &LongPollServer) -> Result<LongPollResponse, TransportError> {
        let url = if server.server.starts_with("http") {
            server.server.clone()
        } else {
            format!("https://{}", server.server)
        };
        let res = self
            .client
            .get(&url)
            .query(&[
                ("act", "a_check".to_string()),
                ("key", server.key.clone()),
                ("ts", ts_string(&server.ts)),
                ("wait", LONG_POLL_WAIT.to_string()),
                ("mode", "2".to_string()),
                ("version", LONG_POLL_VERSION.to_string()),
            ])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!(
                "long poll failed: {} {}",
                status, body
            )));
        }
        res.json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// One a_check round: queue the batch and advance ts, or recover from a `failed` reply.
    async fn poll_once(&self) -> Result<(), TransportError> {
        let server = self.current_server().await?;
        let res = self.check(&server).await?;
        let mut cursor = self.cursor();
        match res.failed {
            None => {
                if let (Some(ts), Some(s)) = (res.ts, cursor.server.as_mut()) {
                    s.ts = ts;
                }
                cursor.pending.extend(res.updates);
            }
            Some(1) => {
                log::debug!("vk long poll: history outdated, advancing ts");
                if let (Some(ts), Some(s)) = (res.ts, cursor.server.as_mut()) {
                    s.ts = ts;
                }
            }
            Some(2) => {
                log::debug!("vk long poll: key expired, requesting new key");
                cursor.server = None;
                cursor.resume_ts = Some(server.ts);
            }
            Some(code) => {
                log::debug!("vk long poll: failed {}, requesting new server", code);
                cursor.server = None;
                cursor.resume_ts = None;
            }
        }
        Ok(())
    }

    /// messages.send with a fresh random_id per call.
    pub async fn send_message(&self, user_id: &str, text: &str) -> Result<(), TransportError> {
        let random_id = random_id()?;
        let _message_id: serde_json::Value = self
            .call(
                "messages.send",
                &[
                    ("user_id", user_id.to_string()),
                    ("message", text.to_string()),
                    ("random_id", random_id.to_string()),
                ],
            )
            .await?;
        Ok(())
    }
}

fn ts_string(ts: &serde_json::Value) -> String {
    match ts {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Per-send correlation token for messages.send. Independent for every call.
fn random_id() -> Result<i32, TransportError> {
    let mut buf = [0u8; 4];
    getrandom::getrandom(&mut buf).map_err(|e| TransportError::Random(e.to_string()))?;
    Ok(i32::from_le_bytes(buf) & i32::MAX)
}

fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode one long-poll update array (`[code, message_id, flags, peer_id, timestamp, text, extra]`).
/// In group chats the sender is the author from `extra.from`, not the chat peer.
fn parse_update(update: &serde_json::Value) -> InboundEvent {
    let Some(fields) = update.as_array() else {
        return InboundEvent::Other {
            kind: "malformed".to_string(),
        };
    };
    let code = fields.first().and_then(|v| v.as_i64()).unwrap_or(-1);
    if code != EVENT_MESSAGE_NEW {
        return InboundEvent::Other {
            kind: format!("code_{}", code),
        };
    }
    let flags = fields.get(2).and_then(|v| v.as_i64()).unwrap_or(0);
    let author = match fields.get(3).and_then(|v| v.as_i64()) {
        Some(peer_id) if peer_id >= CHAT_PEER_BASE => fields
            .get(6)
            .and_then(|extra| extra.get("from"))
            .and_then(id_string),
        peer_id => peer_id.map(|p| p.to_string()),
    };
    let text = fields
        .get(5)
        .and_then(|v| v.as_str())
        .map(unescape_text)
        .unwrap_or_default();
    match author {
        Some(author) if !text.trim().is_empty() => InboundEvent::NewMessage {
            sender_id: SenderId::new(Platform::Vk, author),
            text,
            directed_at_bot: flags & FLAG_OUTBOX == 0,
        },
        _ => InboundEvent::Other {
            kind: "message_without_text".to_string(),
        },
    }
}

/// Long-poll texts arrive HTML-escaped with `<br>` for newlines.
fn unescape_text(raw: &str) -> String {
    raw.replace("<br>", "\n")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[async_trait]
impl ChatTransport for VkChannel {
    fn platform(&self) -> Platform {
        Platform::Vk
    }

    fn listen(&self) -> EventStream {
        log::debug!("vk channel: starting long-poll stream");
        Box::pin(stream::unfold(self.clone(), |channel| async move {
            loop {
                let next = channel.cursor().pending.pop_front();
                if let Some(update) = next {
                    return Some((Ok(parse_update(&update)), channel));
                }
                if let Err(e) = channel.poll_once().await {
                    return Some((Err(e), channel));
                }
            }
        }))
    }

    async fn send(&self, recipient: &SenderId, text: &str) -> Result<(), TransportError> {
        self.send_message(&recipient.id, text).await
    }
}
