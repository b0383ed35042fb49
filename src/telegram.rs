//! Telegram Bot API: inbound update shapes and the outbound client.

use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{BotError, BotResult};

const SERVICE: &str = "telegram";

/// Telegram rejects messages longer than this many characters.
pub const MESSAGE_LIMIT: usize = 4096;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<CallbackMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMessage {
    pub chat: Chat,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pending_update_count: u64,
    #[serde(default)]
    pub last_error_message: Option<String>,
}

/// Destination for the text notifications sent while handling an update.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, chat_id: i64, text: &str) -> BotResult<()>;
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    api_timeout: Duration,
    transfer_timeout: Duration,
}

impl TelegramClient {
    pub fn new(
        http: reqwest::Client,
        api_url: &str,
        token: &str,
        api_timeout: Duration,
        transfer_timeout: Duration,
    ) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            api_timeout,
            transfer_timeout,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> BotResult<T> {
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(self.api_timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(BotError::from_status(SERVICE, status, &text));
        }

        let parsed: ApiResponse<T> = serde_json::from_str(&text)
            .map_err(|err| BotError::upstream(SERVICE, format!("{method}: bad response: {err}")))?;
        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(BotError::upstream(
                SERVICE,
                description.unwrap_or_else(|| format!("{method} failed")),
            )),
        }
    }

    pub async fn get_me(&self) -> BotResult<User> {
        self.call("getMe", json!({})).await
    }

    /// Sends `text`, split into several messages when it is too long. The
    /// reply markup goes on the last one.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> BotResult<()> {
        let chunks = split_message(text, MESSAGE_LIMIT);
        let last = chunks.len().saturating_sub(1);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut body = json!({ "chat_id": chat_id, "text": chunk });
            if index == last {
                if let Some(markup) = &reply_markup {
                    body["reply_markup"] = markup.clone();
                }
            }
            let _: Value = self.call("sendMessage", body).await?;
        }
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_id: &str) -> BotResult<()> {
        let _: Value = self
            .call("answerCallbackQuery", json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }

    /// Resolves a `file_id` to the path used by the file download endpoint.
    pub async fn get_file(&self, file_id: &str) -> BotResult<String> {
        let file: File = self.call("getFile", json!({ "file_id": file_id })).await?;
        file.file_path
            .ok_or_else(|| BotError::upstream(SERVICE, "getFile returned no file_path"))
    }

    pub async fn download_file(&self, file_path: &str) -> BotResult<Vec<u8>> {
        let url = format!("{}/file/bot{}/{}", self.api_url, self.token, file_path);
        let response = self
            .http
            .get(url)
            .timeout(self.transfer_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::from_status(SERVICE, status, &body));
        }
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn set_webhook(&self, url: &str) -> BotResult<()> {
        let _: Value = self
            .call(
                "setWebhook",
                json!({ "url": url, "allowed_updates": ["message", "callback_query"] }),
            )
            .await?;
        Ok(())
    }

    pub async fn get_webhook_info(&self) -> BotResult<WebhookInfo> {
        self.call("getWebhookInfo", json!({})).await
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn notify(&self, chat_id: i64, text: &str) -> BotResult<()> {
        self.send_message(chat_id, text, None).await
    }
}

/// Inline keyboard with a single button.
pub fn inline_button(text: &str, callback_data: &str) -> Value {
    json!({
        "inline_keyboard": [[{ "text": text, "callback_data": callback_data }]]
    })
}

/// Splits `text` into chunks of at most `limit` characters, preferring line
/// boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            warn!("Splitting a {} character line across messages", line_len);
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_not_split() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
    }

    #[test]
    fn long_message_splits_on_lines() {
        let text = "aaaa\nbbbb\ncccc\n";
        let chunks = split_message(text, 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc\n"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn oversized_line_is_cut() {
        let chunks = split_message("abcdefgh", 3);
        assert_eq!(chunks, vec!["abc", "def", "gh"]);
    }

    #[test]
    fn parses_document_update() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 1,
            "message": {
                "chat": { "id": 5 },
                "from": { "id": 7 },
                "document": { "file_id": "F", "file_name": "1.m3u" }
            }
        }))
        .unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 5);
        assert_eq!(message.document.unwrap().file_name.as_deref(), Some("1.m3u"));
    }
}
