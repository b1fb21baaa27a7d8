//! NLU abstraction and Dialogflow client.
//!
//! The dispatcher only needs one operation: detect the intent for a text within a session,
//! and learn whether the match was the agent's fallback intent.

mod dialogflow;

pub use dialogflow::{
    AccessTokenSource, DialogflowClient, DialogflowError, GoogleCredentials, StaticToken,
};

use crate::event::SessionKey;
use async_trait::async_trait;

/// Result of one detect-intent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub reply_text: String,
    /// True when the backend matched its designated "I don't understand" intent.
    pub is_fallback: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("nlu backend unavailable: {0}")]
    Unavailable(String),
    #[error("nlu backend error: {0}")]
    Backend(String),
}

/// Intent detection backend.
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn detect(&self, session: &SessionKey, text: &str) -> Result<Detection, ResolveError>;
}

/// Language code for a query: `"ru"` if the text contains any Cyrillic code point (U+0400–U+04FF), else `"en"`.
pub fn detect_language(text: &str) -> &'static str {
    if text.chars().any(|c| ('\u{0400}'..='\u{04FF}').contains(&c)) {
        "ru"
    } else {
        "en"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyrillic_text_is_russian() {
        assert_eq!(detect_language("Привет"), "ru");
        assert_eq!(detect_language("hello, Мир"), "ru");
        assert_eq!(detect_language("Ёж"), "ru");
    }

    #[test]
    fn other_text_is_english() {
        assert_eq!(detect_language("Hello"), "en");
        assert_eq!(detect_language(""), "en");
        assert_eq!(detect_language("Grüß Gott 123"), "en");
    }
}
