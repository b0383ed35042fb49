use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::BotError;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_RAW_URL: &str = "https://raw.githubusercontent.com";

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub github_token: String,
    pub github_repo: String,
    pub github_branch: String,
    pub playlist_path: String,
    pub playlist_extension: String,
    pub allowed_user_ids: Vec<String>,
    pub upload_url: String,
    pub upload_key: String,
    pub webhook_url: Option<String>,
    pub port: u16,
    pub telegram_api_url: String,
    pub github_api_url: String,
    pub github_raw_url: String,
    pub api_timeout: Duration,
    pub transfer_timeout: Duration,
    pub log_capacity: usize,
    pub log_tail: usize,
}

impl Config {
    /// Reads the process environment. Any failure is a
    /// [`BotError::Configuration`] and must stop startup.
    pub fn from_env() -> Result<Self, BotError> {
        Self::from_lookup(|key| std::env::var(key).ok())
            .map_err(|err| BotError::Configuration(format!("{err:#}")))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{key} env is not set"))
        };
        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let number = |key: &str, default: u64| -> Result<u64> {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a number, got {raw:?}")),
                None => Ok(default),
            }
        };

        let bot_token = required("BOT_TOKEN")?;
        let github_token = required("GITHUB_TOKEN")?;
        let github_repo = required("GITHUB_REPO")?;
        let allowed_user_ids = parse_allow_list(&required("MY_ID")?);
        if allowed_user_ids.is_empty() {
            anyhow::bail!("MY_ID does not contain any user id");
        }
        let upload_url = required("UPLOAD_URL")?;
        let upload_key = required("UPLOAD_KEY")?;

        let port = u16::try_from(number("PORT", 8080)?).context("PORT is out of range")?;

        Ok(Self {
            bot_token,
            github_token,
            github_repo,
            github_branch: optional("GITHUB_BRANCH", "main"),
            playlist_path: optional("PLAYLIST_PATH", "1.m3u"),
            playlist_extension: optional("PLAYLIST_EXTENSION", ".m3u"),
            allowed_user_ids,
            upload_url,
            upload_key,
            webhook_url: lookup("WEBHOOK_URL").filter(|v| !v.trim().is_empty()),
            port,
            telegram_api_url: trim_base(optional("TELEGRAM_API_URL", TELEGRAM_API_URL)),
            github_api_url: trim_base(optional("GITHUB_API_URL", GITHUB_API_URL)),
            github_raw_url: trim_base(optional("GITHUB_RAW_URL", GITHUB_RAW_URL)),
            api_timeout: Duration::from_secs(number("API_TIMEOUT_SECS", 5)?),
            transfer_timeout: Duration::from_secs(number("TRANSFER_TIMEOUT_SECS", 10)?),
            log_capacity: number("LOG_CAPACITY", 200)? as usize,
            log_tail: number("LOG_TAIL", 20)? as usize,
        })
    }

    pub fn is_allowed(&self, requester: &str) -> bool {
        self.allowed_user_ids.iter().any(|id| id == requester)
    }

    /// Public URL of the committed playlist.
    pub fn playlist_raw_url(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.github_raw_url, self.github_repo, self.github_branch, self.playlist_path
        )
    }
}

fn parse_allow_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
