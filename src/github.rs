//! GitHub contents API: read a file and commit a new version of it.

use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{BotError, BotResult};

const SERVICE: &str = "github";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

/// A file as returned by `GET contents/{path}`.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub sha: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

#[derive(Debug, Clone)]
pub struct ContentClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    repo: String,
    branch: String,
    timeout: Duration,
    transfer_http: reqwest::Client,
}

impl ContentClient {
    pub fn new(
        http: reqwest::Client,
        api_url: &str,
        token: &str,
        repo: &str,
        branch: &str,
        timeout: Duration,
        transfer_http: reqwest::Client,
    ) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            timeout,
            transfer_http,
        }
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_url,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    fn authorized(&self, request: RequestBuilder, accept: &str) -> RequestBuilder {
        request
            .header(AUTHORIZATION, format!("token {}", self.token))
            .header(ACCEPT, accept)
            .header(USER_AGENT, concat!("m3u-relay-bot/", env!("CARGO_PKG_VERSION")))
    }

    /// Checks that the token can see the repository.
    pub async fn verify_access(&self) -> BotResult<()> {
        let url = format!("{}/repos/{}", self.api_url, self.repo);
        let response = self
            .authorized(self.http.get(url), JSON_MEDIA_TYPE)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BotError::Configuration(format!(
                "repository {} not found or not visible to the token",
                self.repo
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::from_status(SERVICE, status, &body));
        }
        Ok(())
    }

    /// Raw `GET contents/{path}` body, or `None` for a missing file.
    async fn contents(&self, path: &str) -> BotResult<Option<String>> {
        let response = self
            .authorized(self.http.get(self.contents_url(path)), JSON_MEDIA_TYPE)
            .timeout(self.timeout)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BotError::from_status(SERVICE, status, &body));
        }
        Ok(Some(body))
    }

    /// Reads `path`. A missing file is `Ok(None)`.
    ///
    /// Files over 1 MB come back with encoding `none` and no content; those
    /// are downloaded again through the raw media type.
    pub async fn get(&self, path: &str) -> BotResult<Option<RemoteFile>> {
        let Some(body) = self.contents(path).await? else {
            return Ok(None);
        };
        let parsed: ContentsResponse = serde_json::from_str(&body)
            .map_err(|err| BotError::upstream(SERVICE, format!("bad contents response: {err}")))?;
        let content = match (parsed.content, parsed.encoding.as_deref()) {
            (_, Some("none")) => self.raw(path).await?,
            (Some(encoded), Some("base64") | None) => decode_content(&encoded)?,
            (Some(_), Some(other)) => {
                return Err(BotError::upstream(
                    SERVICE,
                    format!("unsupported content encoding {other}"),
                ))
            }
            (None, _) => Vec::new(),
        };
        Ok(Some(RemoteFile {
            sha: parsed.sha,
            content,
        }))
    }

    async fn raw(&self, path: &str) -> BotResult<Vec<u8>> {
        let response = self
            .authorized(self.transfer_http.get(self.contents_url(path)), RAW_MEDIA_TYPE)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::from_status(SERVICE, status, &body));
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Current content hash of `path`, or `None` if it does not exist yet.
    /// Only the metadata is read, so file size does not matter.
    pub async fn sha(&self, path: &str) -> BotResult<Option<String>> {
        let Some(body) = self.contents(path).await? else {
            return Ok(None);
        };
        let parsed: ShaResponse = serde_json::from_str(&body)
            .map_err(|err| BotError::upstream(SERVICE, format!("bad contents response: {err}")))?;
        Ok(Some(parsed.sha))
    }

    /// Commits `content` to `path`. `sha` must be the current hash when the
    /// file exists and `None` when it is being created. Returns the new hash.
    pub async fn put(
        &self,
        path: &str,
        content: &[u8],
        sha: Option<&str>,
        message: &str,
    ) -> BotResult<String> {
        let request = PutRequest {
            message,
            content: general_purpose::STANDARD.encode(content),
            branch: &self.branch,
            sha,
        };
        let response = self
            .authorized(self.http.put(self.contents_url(path)), JSON_MEDIA_TYPE)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BotError::from_status(SERVICE, status, &body));
        }
        let parsed: PutResponse = serde_json::from_str(&body)
            .map_err(|err| BotError::upstream(SERVICE, format!("bad commit response: {err}")))?;
        Ok(parsed.content.sha)
    }
}

// GitHub wraps base64 content at 60 columns.
fn decode_content(encoded: &str) -> BotResult<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    general_purpose::STANDARD
        .decode(compact)
        .map_err(|err| BotError::upstream(SERVICE, format!("invalid base64 content: {err}")))
}
