//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.intent-relay/config.json`) and environment.
//! Environment variables override file values; empty values count as unset.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub vk: VkConfig,

    #[serde(default)]
    pub dialogflow: DialogflowConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub escalation: EscalationConfig,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_TOKEN env when set.
    pub bot_token: Option<String>,
    /// Chat id that receives escalated warnings and errors. Overridden by TELEGRAM_ADMIN_ID.
    pub admin_chat_id: Option<String>,
}

/// VK bot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VkConfig {
    /// Access token with messages scope. Overridden by VKONTAKTE_TOKEN env when set.
    pub access_token: Option<String>,
    /// User id that receives escalated warnings and errors. Overridden by VKONTAKTE_ADMIN_ID.
    pub admin_user_id: Option<String>,
}

/// Dialogflow agent settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogflowConfig {
    /// Google Cloud project of the agent. Overridden by DIALOGFLOW_PROJECT_ID.
    pub project_id: Option<String>,
    /// Fixed OAuth access token, overriding the Google application default credentials.
    /// Overridden by DIALOGFLOW_ACCESS_TOKEN.
    pub access_token: Option<String>,
    /// API root (default https://dialogflow.googleapis.com).
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Fixed pause after a failed dispatch before listening again (default 100).
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

fn default_backoff_secs() -> u64 {
    100
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            backoff_secs: default_backoff_secs(),
        }
    }
}

impl SupervisorConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationLevel {
    /// Warnings and errors reach the admin.
    #[default]
    Warn,
    /// Only errors reach the admin.
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationConfig {
    #[serde(default)]
    pub level: EscalationLevel,
}

impl EscalationConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.level {
            EscalationLevel::Warn => log::LevelFilter::Warn,
            EscalationLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// Env var `key` if set and non-empty, else the trimmed configured value if non-empty.
fn resolve_value(key: &str, configured: Option<&String>) -> Option<String> {
    std::env::var(key)
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            configured
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the Telegram bot token: env TELEGRAM_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    resolve_value("TELEGRAM_TOKEN", config.telegram.bot_token.as_ref())
}

pub fn resolve_telegram_admin(config: &Config) -> Option<String> {
    resolve_value("TELEGRAM_ADMIN_ID", config.telegram.admin_chat_id.as_ref())
}

/// Resolve the VK access token: env VKONTAKTE_TOKEN overrides config.
pub fn resolve_vk_token(config: &Config) -> Option<String> {
    resolve_value("VKONTAKTE_TOKEN", config.vk.access_token.as_ref())
}

pub fn resolve_vk_admin(config: &Config) -> Option<String> {
    resolve_value("VKONTAKTE_ADMIN_ID", config.vk.admin_user_id.as_ref())
}

pub fn resolve_dialogflow_project(config: &Config) -> Option<String> {
    resolve_value("DIALOGFLOW_PROJECT_ID", config.dialogflow.project_id.as_ref())
}

pub fn resolve_dialogflow_token(config: &Config) -> Option<String> {
    resolve_value(
        "DIALOGFLOW_ACCESS_TOKEN",
        config.dialogflow.access_token.as_ref(),
    )
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("INTENT_RELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".intent-relay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
