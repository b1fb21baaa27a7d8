//! In-crate fakes for the transport and resolver capabilities.

use crate::channels::{ChatTransport, EventStream, TransportError};
use crate::event::{InboundEvent, Platform, SenderId, SessionKey};
use crate::nlu::{Detection, IntentResolver, ResolveError};
use async_trait::async_trait;
use futures_util::stream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type EventQueue = Arc<Mutex<VecDeque<Result<InboundEvent, TransportError>>>>;

/// Transport fed from a shared script. Every `listen` continues where the previous stream stopped;
/// once the script is drained the stream stays pending, like an idle long poll.
pub struct RecordingTransport {
    platform: Platform,
    script: EventQueue,
    listens: AtomicUsize,
    sent: Mutex<Vec<(SenderId, String)>>,
    sent_at: Mutex<Vec<tokio::time::Instant>>,
    send_attempts: AtomicUsize,
    fail_sends: AtomicBool,
    max_chars: usize,
}

impl RecordingTransport {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            script: Arc::new(Mutex::new(VecDeque::new())),
            listens: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            sent_at: Mutex::new(Vec::new()),
            send_attempts: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            max_chars: 4096,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn push_event(&self, event: InboundEvent) {
        self.script.lock().unwrap().push_back(Ok(event));
    }

    pub fn push_error(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Api(message.to_string())));
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(SenderId, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Clock readings of successful sends, index-aligned with `sent`.
    pub fn sent_at(&self) -> Vec<tokio::time::Instant> {
        self.sent_at.lock().unwrap().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn listens(&self) -> usize {
        self.listens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn listen(&self) -> EventStream {
        self.listens.fetch_add(1, Ordering::SeqCst);
        Box::pin(stream::unfold(self.script.clone(), |script| async move {
            let next = script.lock().unwrap().pop_front();
            match next {
                Some(item) => Some((item, script)),
                None => futures_util::future::pending().await,
            }
        }))
    }

    async fn send(&self, recipient: &SenderId, text: &str) -> Result<(), TransportError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Api("connection reset by peer".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.clone(), text.to_string()));
        self.sent_at
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        Ok(())
    }

    fn max_message_chars(&self) -> usize {
        self.max_chars
    }
}

/// Resolver answering from a script, falling back to echoing the text as a recognized reply.
#[derive(Default)]
pub struct ScriptedResolver {
    replies: Mutex<VecDeque<Result<Detection, ResolveError>>>,
    calls: Mutex<Vec<(SessionKey, String)>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply_text: &str) {
        self.replies.lock().unwrap().push_back(Ok(Detection {
            reply_text: reply_text.to_string(),
            is_fallback: false,
        }));
    }

    pub fn push_fallback(&self) {
        self.replies.lock().unwrap().push_back(Ok(Detection {
            reply_text: "Sorry, I didn't get that.".to_string(),
            is_fallback: true,
        }));
    }

    pub fn push_unavailable(&self) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(ResolveError::Unavailable("timed out".to_string())));
    }

    pub fn calls(&self) -> Vec<(SessionKey, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntentResolver for ScriptedResolver {
    async fn detect(&self, session: &SessionKey, text: &str) -> Result<Detection, ResolveError> {
        self.calls
            .lock()
            .unwrap()
            .push((session.clone(), text.to_string()));
        let scripted = self.replies.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(Detection {
                reply_text: format!("echo: {}", text),
                is_fallback: false,
            })
        })
    }
}

pub fn message(platform: Platform, sender: &str, text: &str) -> InboundEvent {
    InboundEvent::NewMessage {
        sender_id: SenderId::new(platform, sender),
        text: text.to_string(),
        directed_at_bot: true,
    }
}
