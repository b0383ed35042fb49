use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use anyhow::Result;
use log::{error, info, warn};
use serde_json::Value;

use crate::error::{BotError, BotResult};
use crate::github::ContentClient;
use crate::models::{Severity, TransferReport};
use crate::playlist::extract_items;
use crate::relay::RelayClient;
use crate::state::AppState;
use crate::telegram::{inline_button, Notifier, TelegramClient, Update};
use crate::transfer::{transfer_client, TransferWorker};
use crate::update::{classify, Envelope, Intent, CONFIRM_CALLBACK};

const USER_AGENT: &str = concat!("m3u-relay-bot/", env!("CARGO_PKG_VERSION"));

/// Webhook dispatcher and the clients it talks to.
pub struct Bot {
    state: Arc<AppState>,
    telegram: TelegramClient,
    content: ContentClient,
    worker: TransferWorker,
    username: OnceLock<String>,
}

impl Bot {
    pub fn new(state: Arc<AppState>) -> Result<Arc<Self>> {
        let config = &state.config;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;
        let transfer_http = transfer_client(USER_AGENT, config.transfer_timeout)?;

        let telegram = TelegramClient::new(
            http.clone(),
            &config.telegram_api_url,
            &config.bot_token,
            config.api_timeout,
            config.transfer_timeout,
        );
        let content = ContentClient::new(
            http.clone(),
            &config.github_api_url,
            &config.github_token,
            &config.github_repo,
            &config.github_branch,
            config.api_timeout,
            transfer_http.clone(),
        );
        let relay = RelayClient::new(transfer_http.clone(), &config.upload_url, &config.upload_key);
        let worker = TransferWorker::new(transfer_http, relay);

        Ok(Arc::new(Self {
            state,
            telegram,
            content,
            worker,
            username: OnceLock::new(),
        }))
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn telegram(&self) -> &TelegramClient {
        &self.telegram
    }

    /// The bot's own username, known once [`Bot::verify`] has run.
    pub fn username(&self) -> Option<&str> {
        self.username.get().map(String::as_str)
    }

    /// Startup checks: both tokens must be accepted, and the webhook is
    /// registered when a URL is configured.
    pub async fn verify(&self) -> BotResult<()> {
        let me = self.telegram.get_me().await.map_err(credentials("Telegram"))?;
        match me.username {
            Some(username) => {
                info!("Authorized as @{}", username);
                let _ = self.username.set(username);
            }
            None => warn!("getMe returned no username, addressed commands are accepted as-is"),
        }
        self.content
            .verify_access()
            .await
            .map_err(credentials("GitHub"))?;

        if let Some(url) = &self.state.config.webhook_url {
            self.telegram.set_webhook(url).await?;
            info!("Webhook registered at {}", url);
        }
        Ok(())
    }

    /// Handles one webhook update to completion. The returned string is a
    /// short diagnostic for the HTTP response.
    pub async fn handle_update(&self, raw: Value) -> String {
        let update: Update = match serde_json::from_value(raw.clone()) {
            Ok(update) => update,
            Err(err) => {
                self.state.record(
                    Severity::Warn,
                    format!("Malformed update: {err}"),
                    Some(raw),
                );
                return "Malformed update".to_string();
            }
        };

        let envelope = match classify(&update, self.username()) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.state.record(Severity::Warn, err.to_string(), Some(raw));
                return err.to_string();
            }
        };

        if !self.state.config.is_allowed(&envelope.requester) {
            let err = BotError::Unauthorized(envelope.requester.clone());
            self.state.record(Severity::Warn, err.to_string(), Some(raw));
            self.reply(envelope.chat_id, &err.user_message()).await;
            return "Unauthorized user".to_string();
        }

        match self.dispatch(&envelope).await {
            Ok(()) => "OK".to_string(),
            Err(err) => {
                let severity = if err.is_fatal() {
                    Severity::Error
                } else {
                    Severity::Warn
                };
                self.state.record(
                    severity,
                    format!("Handling {:?} failed: {}", envelope.intent, err),
                    Some(raw),
                );
                self.reply(envelope.chat_id, &err.user_message()).await;
                err.to_string()
            }
        }
    }

    async fn dispatch(&self, envelope: &Envelope) -> BotResult<()> {
        match &envelope.intent {
            Intent::Greeting => self.handle_start(envelope).await,
            Intent::ListRequest => self.handle_list(envelope).await,
            Intent::Confirmation { callback_id } => {
                self.handle_confirm(envelope, callback_id.as_deref())
                    .await
            }
            Intent::FileUpload { file_id, file_name } => {
                self.handle_document(envelope, file_id, file_name).await
            }
            Intent::Unhandled => Ok(()),
        }
    }

    async fn handle_start(&self, envelope: &Envelope) -> BotResult<()> {
        let text = format!(
            "👋 Send me an {} file.\nOr use /uploadserver to upload videos.",
            self.state.config.playlist_extension
        );
        self.telegram.notify(envelope.chat_id, &text).await
    }

    /// Reads the committed playlist and queues its media links.
    async fn handle_list(&self, envelope: &Envelope) -> BotResult<()> {
        let path = &self.state.config.playlist_path;
        self.telegram
            .notify(envelope.chat_id, &format!("📂 Reading {path}..."))
            .await?;

        let Some(file) = self.content.get(path).await? else {
            return self
                .telegram
                .notify(
                    envelope.chat_id,
                    &format!("⚠️ {path} does not exist yet. Send me a playlist first."),
                )
                .await;
        };

        let items = extract_items(&String::from_utf8_lossy(&file.content));
        if items.is_empty() {
            return self
                .telegram
                .notify(
                    envelope.chat_id,
                    &format!("⚠️ No video links found in {path}."),
                )
                .await;
        }

        let mut text = format!("🎬 Found {} videos:\n\n", items.len());
        for (index, item) in items.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", index + 1, item.name));
        }
        text.push_str("\nReply YES to start uploading.");

        // Queue only once the requester has seen what they are confirming.
        self.telegram
            .send_message(
                envelope.chat_id,
                &text,
                Some(inline_button("✅ Upload all", CONFIRM_CALLBACK)),
            )
            .await?;

        self.state.info(format!(
            "Queued {} items for user {}",
            items.len(),
            envelope.requester
        ));
        self.state.queue.put(&envelope.requester, items);
        Ok(())
    }

    /// Takes the pending batch and transfers it item by item.
    async fn handle_confirm(&self, envelope: &Envelope, callback_id: Option<&str>) -> BotResult<()> {
        if let Some(callback_id) = callback_id {
            if let Err(err) = self.telegram.answer_callback_query(callback_id).await {
                warn!("Could not answer callback {}: {}", callback_id, err);
            }
        }

        let Some(items) = self.state.queue.take(&envelope.requester) else {
            return self
                .telegram
                .notify(
                    envelope.chat_id,
                    "🤷 Nothing queued. Use /uploadserver to list videos first.",
                )
                .await;
        };

        info!(
            "Starting transfer of {} items for user {}",
            items.len(),
            envelope.requester
        );
        let report = self
            .worker
            .run(&self.state, &self.telegram, envelope.chat_id, items)
            .await;
        self.log_report(&envelope.requester, &report);
        Ok(())
    }

    /// Commits an uploaded playlist to the repository.
    async fn handle_document(
        &self,
        envelope: &Envelope,
        file_id: &str,
        file_name: &str,
    ) -> BotResult<()> {
        let config = &self.state.config;
        let extension = config.playlist_extension.to_lowercase();
        if !file_name.to_lowercase().ends_with(&extension) {
            return Err(BotError::Validation(format!(
                "Only {} files allowed.",
                config.playlist_extension
            )));
        }

        let file_path = self.telegram.get_file(file_id).await?;
        let bytes = self.telegram.download_file(&file_path).await?;
        info!("Downloaded {} ({} bytes)", file_name, bytes.len());

        let path = &config.playlist_path;
        let sha = self.content.sha(path).await?;
        let new_sha = self
            .content
            .put(
                path,
                &bytes,
                sha.as_deref(),
                &format!("Update {path} via Telegram bot"),
            )
            .await?;
        self.state.info(format!(
            "Committed {} from user {} as {} ({})",
            file_name, envelope.requester, path, new_sha
        ));

        self.telegram
            .notify(
                envelope.chat_id,
                &format!(
                    "✅ Updated {path} on GitHub.\n{}",
                    config.playlist_raw_url()
                ),
            )
            .await
    }

    fn log_report(&self, requester: &str, report: &TransferReport) {
        self.state.info(format!(
            "Transfer for user {} finished: {} succeeded, {} failed",
            requester,
            report.succeeded(),
            report.failed()
        ));
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(err) = self.telegram.notify(chat_id, text).await {
            error!("Could not reply to chat {}: {}", chat_id, err);
        }
    }
}

fn credentials(service: &'static str) -> impl Fn(BotError) -> BotError {
    move |err| match err {
        BotError::Upstream {
            status: Some(status),
            ..
        } if status == reqwest::StatusCode::NOT_FOUND => {
            BotError::Configuration(format!("{service} rejected the configured token ({status})"))
        }
        other => other,
    }
}
