//! Dialogflow ES v2 client (detectIntent over REST).

use crate::event::SessionKey;
use crate::nlu::{detect_language, Detection, IntentResolver, ResolveError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://dialogflow.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DIALOGFLOW_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Client for the Dialogflow sessions API of one agent (project).
#[derive(Clone)]
pub struct DialogflowClient {
    base_url: String,
    project_id: String,
    tokens: Arc<dyn AccessTokenSource>,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum DialogflowError {
    #[error("dialogflow request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("dialogflow api error: {0}")]
    Api(String),
    #[error("dialogflow credentials unavailable: {0}")]
    Auth(String),
}

impl From<DialogflowError> for ResolveError {
    fn from(e: DialogflowError) -> Self {
        match &e {
            DialogflowError::Request(_) | DialogflowError::Auth(_) => {
                ResolveError::Unavailable(e.to_string())
            }
            DialogflowError::Api(_) => ResolveError::Backend(e.to_string()),
        }
    }
}

/// Source of bearer tokens for the Dialogflow API. Asked once per request.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, DialogflowError>;
}

/// Fixed access token from config or env. Never refreshed.
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, DialogflowError> {
        Ok(self.0.clone())
    }
}

/// Google application default credentials (service account key file, gcloud login or the
/// metadata server). The provider caches each token and fetches a new one before it expires.
pub struct GoogleCredentials {
    provider: Arc<dyn gcp_auth::TokenProvider>,
}

impl GoogleCredentials {
    pub async fn discover() -> Result<Self, DialogflowError> {
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| DialogflowError::Auth(e.to_string()))?;
        Ok(Self { provider })
    }

    /// Project the credentials belong to; used when no project id is configured.
    pub async fn project_id(&self) -> Result<String, DialogflowError> {
        let project = self
            .provider
            .project_id()
            .await
            .map_err(|e| DialogflowError::Auth(e.to_string()))?;
        Ok(project.to_string())
    }
}

#[async_trait]
impl AccessTokenSource for GoogleCredentials {
    async fn access_token(&self) -> Result<String, DialogflowError> {
        let token = self
            .provider
            .token(&[DIALOGFLOW_SCOPE])
            .await
            .map_err(|e| DialogflowError::Auth(e.to_string()))?;
        Ok(token.as_str().to_string())
    }
}

impl DialogflowClient {
    /// Client with a fixed access token.
    pub fn new(
        base_url: Option<String>,
        project_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self::with_token_source(
            base_url,
            project_id,
            Arc::new(StaticToken(access_token.into())),
        )
    }

    pub fn with_token_source(
        base_url: Option<String>,
        project_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            project_id: project_id.into(),
            tokens,
            client,
        }
    }

    fn session_url(&self, session: &SessionKey) -> String {
        format!(
            "{}/v2/projects/{}/agent/sessions/{}:detectIntent",
            self.base_url, self.project_id, session
        )
    }

    /// POST …/sessions/{session}:detectIntent: one text query in the given language.
    pub async fn detect_intent(
        &self,
        session: &SessionKey,
        text: &str,
        language_code: &str,
    ) -> Result<DetectIntentResponse, DialogflowError> {
        let body = DetectIntentRequest {
            query_input: QueryInput {
                text: TextInput {
                    text: text.to_string(),
                    language_code: language_code.to_string(),
                },
            },
        };
        let access_token = self.tokens.access_token().await?;
        let res = self
            .client
            .post(self.session_url(session))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(DialogflowError::Api(format!("{} {}", status, body)));
        }
        let data: DetectIntentResponse = res.json().await?;
        Ok(data)
    }
}

#[async_trait]
impl IntentResolver for DialogflowClient {
    async fn detect(&self, session: &SessionKey, text: &str) -> Result<Detection, ResolveError> {
        let language = detect_language(text);
        let res = self.detect_intent(session, text, language).await?;
        log::debug!(
            "dialogflow: session {} matched intent {:?} (fallback: {})",
            session,
            res.query_result.intent.display_name,
            res.is_fallback()
        );
        Ok(Detection {
            is_fallback: res.is_fallback(),
            reply_text: res.query_result.fulfillment_text,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectIntentRequest {
    query_input: QueryInput,
}

#[derive(Debug, Serialize)]
struct QueryInput {
    text: TextInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextInput {
    text: String,
    language_code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectIntentResponse {
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub query_result: QueryResult,
}

impl DetectIntentResponse {
    /// No matched intent counts as fallback too.
    pub fn is_fallback(&self) -> bool {
        self.query_result.intent.is_fallback || self.query_result.intent.name.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub query_text: String,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub fulfillment_text: String,
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub intent_detection_confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_fallback: bool,
}
