use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::{BotError, BotResult};

const SERVICE: &str = "relay";

#[derive(Debug, Deserialize)]
struct RelayResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the endpoint that receives re-uploaded media.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    url: String,
    key: String,
}

impl RelayClient {
    pub fn new(http: reqwest::Client, url: &str, key: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
            key: key.to_string(),
        }
    }

    /// Posts `payload` as the `file` field of a multipart form. The bytes are
    /// sent as-is.
    pub async fn upload(&self, name: &str, payload: Vec<u8>) -> BotResult<()> {
        let mime = mime_guess::from_path(name).first_or_octet_stream();
        let part = Part::bytes(payload)
            .file_name(name.to_string())
            .mime_str(mime.essence_str())?;
        let form = Form::new().text("key", self.key.clone()).part("file", part);

        let response = self
            .http
            .post(&self.url)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BotError::from_status(SERVICE, status, &body));
        }

        match serde_json::from_str::<RelayResponse>(&body) {
            Ok(RelayResponse { ok: true, .. }) => Ok(()),
            Ok(RelayResponse { error, .. }) => Err(BotError::upstream(
                SERVICE,
                error.unwrap_or_else(|| "upload rejected".to_string()),
            )),
            Err(_) => Err(BotError::upstream(SERVICE, "upload failed: unreadable response")),
        }
    }
}
