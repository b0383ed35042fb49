//! Sequential download-and-relay of a confirmed batch.

use std::time::Duration;

use chrono::Utc;
use log::info;
use scopeguard::defer;

use crate::error::{BotError, BotResult};
use crate::models::{TransferOutcome, TransferReport};
use crate::playlist::TransferItem;
use crate::relay::RelayClient;
use crate::state::AppState;
use crate::telegram::Notifier;

/// Client for media downloads and relay uploads. `idle` bounds connecting and
/// each wait for more bytes, not the whole transfer, so large files are fine
/// as long as data keeps flowing.
pub fn transfer_client(user_agent: &str, idle: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(idle)
        .read_timeout(idle)
        .user_agent(user_agent)
        .build()
}

#[derive(Debug, Clone)]
pub struct TransferWorker {
    http: reqwest::Client,
    relay: RelayClient,
}

impl TransferWorker {
    /// `http` should come from [`transfer_client`].
    pub fn new(http: reqwest::Client, relay: RelayClient) -> Self {
        Self { http, relay }
    }

    /// Transfers `items` one after another. A failed item is reported and the
    /// loop moves on; nothing is retried.
    pub async fn run(
        &self,
        state: &AppState,
        notifier: &dyn Notifier,
        chat_id: i64,
        items: Vec<TransferItem>,
    ) -> TransferReport {
        let mut report = TransferReport::default();
        if items.is_empty() {
            return report;
        }

        let batch = state.progress.begin(items.len());
        defer! {
            state.progress.end(batch);
        };

        send(state, notifier, chat_id, &format!("📤 Uploading {} videos...", items.len())).await;

        for (index, item) in items.iter().enumerate() {
            info!("Transferring {}/{}: {}", index + 1, items.len(), item.url);
            state.progress.start_item(batch, &item.name);

            let started = Utc::now();
            let outcome = match self.transfer(item).await {
                Ok(size) => {
                    let elapsed = Utc::now() - started;
                    state.info(format!(
                        "Uploaded {} ({} bytes) in {:.2} secs",
                        item.name,
                        size,
                        elapsed.num_milliseconds() as f64 / 1000.0
                    ));
                    send(
                        state,
                        notifier,
                        chat_id,
                        &format!(
                            "✅ Uploaded: {} ({})",
                            item.name,
                            bytesize::to_string(size as u64, true)
                        ),
                    )
                    .await;
                    TransferOutcome::Success
                }
                Err(err) => {
                    let reason = failure_reason(&err);
                    state.warn(format!("Transfer of {} failed: {}", item.url, err));
                    send(
                        state,
                        notifier,
                        chat_id,
                        &format!("❌ Failed: {} ({})", item.name, reason),
                    )
                    .await;
                    TransferOutcome::Failure(reason)
                }
            };

            state.progress.finish_item(batch);
            report.outcomes.push((item.name.clone(), outcome));
        }

        send(
            state,
            notifier,
            chat_id,
            &format!(
                "🎉 Upload complete: {} succeeded, {} failed.",
                report.succeeded(),
                report.failed()
            ),
        )
        .await;
        report
    }

    async fn transfer(&self, item: &TransferItem) -> BotResult<usize> {
        let payload = self.download(&item.url).await?;
        let size = payload.len();
        self.relay.upload(&item.name, payload).await?;
        Ok(size)
    }

    async fn download(&self, url: &str) -> BotResult<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BotError::Upstream {
                service: "download",
                status: Some(status),
                message: format!("Download {}", status.as_u16()),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

fn failure_reason(err: &BotError) -> String {
    match err {
        BotError::Upstream { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

// A lost progress message must not stop the batch.
async fn send(state: &AppState, notifier: &dyn Notifier, chat_id: i64, text: &str) {
    if let Err(err) = notifier.notify(chat_id, text).await {
        state.warn(format!("Notification to chat {chat_id} failed: {err}"));
    }
}
