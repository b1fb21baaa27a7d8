//! Wire config into a supervised pipeline per platform and run it until Ctrl+C.

use crate::channels::{ChatTransport, TelegramChannel, VkChannel};
use crate::config::{self, Config};
use crate::dispatch::Pipeline;
use crate::escalation::EscalationSink;
use crate::logging::BotLogger;
use crate::nlu::{
    AccessTokenSource, DialogflowClient, GoogleCredentials, IntentResolver, StaticToken,
};
use crate::supervisor::Supervisor;
use anyhow::{bail, Context, Result};
use std::sync::Arc;

pub const TELEGRAM_PREFIX: &str = "TELEGRAM_BOT";
pub const VK_PREFIX: &str = "VKONTAKTE_BOT";

/// Dialogflow resolver. A configured access token is used as is; otherwise tokens come from the
/// Google application default credentials, which also supply the project id when none is set.
async fn dialogflow_client(config: &Config) -> Result<DialogflowClient> {
    let configured_project = config::resolve_dialogflow_project(config);
    let (tokens, project_id): (Arc<dyn AccessTokenSource>, String) =
        match config::resolve_dialogflow_token(config) {
            Some(token) => {
                let Some(project_id) = configured_project else {
                    bail!("dialogflow project id not configured (dialogflow.projectId or DIALOGFLOW_PROJECT_ID)");
                };
                (Arc::new(StaticToken(token)), project_id)
            }
            None => {
                let credentials = GoogleCredentials::discover().await.context(
                    "no dialogflow credentials (set GOOGLE_APPLICATION_CREDENTIALS, dialogflow.accessToken or DIALOGFLOW_ACCESS_TOKEN)",
                )?;
                let project_id = match configured_project {
                    Some(p) => p,
                    None => credentials
                        .project_id()
                        .await
                        .context("dialogflow project id not configured and not found in credentials")?,
                };
                (Arc::new(credentials), project_id)
            }
        };
    Ok(DialogflowClient::with_token_source(
        config.dialogflow.base_url.clone(),
        project_id,
        tokens,
    ))
}

/// Build the supervisor for one transport: logger with escalation to `admin_id`, Dialogflow resolver.
pub fn build_supervisor(
    config: &Config,
    transport: Arc<dyn ChatTransport>,
    resolver: Arc<dyn IntentResolver>,
    prefix: &str,
    admin_id: String,
) -> Supervisor {
    let sink = EscalationSink::new(transport.clone(), admin_id)
        .with_threshold(config.escalation.level_filter());
    let logger = BotLogger::new(prefix).attach(sink);
    Supervisor::new(Pipeline::new(transport, resolver, logger))
        .with_backoff(config.supervisor.backoff())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("listening for ctrl-c failed: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Run the Telegram bot. Fails fast when the token, admin id or Dialogflow settings are missing.
pub async fn run_telegram(config: Config) -> Result<()> {
    let token = config::resolve_telegram_token(&config)
        .context("telegram bot token not configured (telegram.botToken or TELEGRAM_TOKEN)")?;
    let admin = config::resolve_telegram_admin(&config)
        .context("telegram admin chat id not configured (telegram.adminChatId or TELEGRAM_ADMIN_ID)")?;
    let resolver = Arc::new(dialogflow_client(&config).await?);
    let transport = Arc::new(TelegramChannel::new(Some(token)));
    build_supervisor(&config, transport, resolver, TELEGRAM_PREFIX, admin)
        .run(shutdown_signal())
        .await;
    Ok(())
}

/// Run the VK bot. Fails fast when the token, admin id or Dialogflow settings are missing.
pub async fn run_vk(config: Config) -> Result<()> {
    let token = config::resolve_vk_token(&config)
        .context("vk access token not configured (vk.accessToken or VKONTAKTE_TOKEN)")?;
    let admin = config::resolve_vk_admin(&config)
        .context("vk admin user id not configured (vk.adminUserId or VKONTAKTE_ADMIN_ID)")?;
    let resolver = Arc::new(dialogflow_client(&config).await?);
    let transport = Arc::new(VkChannel::new(Some(token)));
    build_supervisor(&config, transport, resolver, VK_PREFIX, admin)
        .run(shutdown_signal())
        .await;
    Ok(())
}
