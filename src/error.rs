use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced while handling an update or starting the service.
#[derive(Debug, Error)]
pub enum BotError {
    /// Requester is not on the allow-list.
    #[error("user {0} is not allowed")]
    Unauthorized(String),

    /// The update is well-formed JSON but cannot be acted on.
    #[error("{0}")]
    Validation(String),

    /// A call to Telegram, GitHub or the relay failed.
    #[error("{service}: {message}")]
    Upstream {
        service: &'static str,
        status: Option<StatusCode>,
        message: String,
    },

    /// Missing settings or credentials rejected by an upstream API.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BotError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            status: None,
            message: message.into(),
        }
    }

    /// Maps a non-success response status to an error. 401/403 mean the
    /// credentials are wrong, which no retry will fix.
    pub fn from_status(service: &'static str, status: StatusCode, body: &str) -> Self {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Self::Configuration(format!("{service} rejected credentials ({status})"));
        }
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("description"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("HTTP {status}"));
        Self::Upstream {
            service,
            status: Some(status),
            message,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Short text suitable for a chat reply.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized(_) => "❌ Not allowed.".to_string(),
            Self::Validation(reason) => format!("❌ {reason}"),
            Self::Upstream { service, message, .. } => format!("❌ {service} error: {message}"),
            Self::Configuration(_) => {
                "⚠️ The bot is misconfigured, ask the owner to check its credentials.".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        let service = "http";
        Self::Upstream {
            service,
            status: err.status(),
            message: if err.is_timeout() {
                "request timed out".to_string()
            } else {
                err.to_string()
            },
        }
    }
}

pub type BotResult<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_rejection_is_fatal() {
        let err = BotError::from_status("github", StatusCode::FORBIDDEN, "");
        assert!(err.is_fatal());
        let err = BotError::from_status("github", StatusCode::UNAUTHORIZED, "{}");
        assert!(matches!(err, BotError::Configuration(_)));
    }

    #[test]
    fn upstream_message_is_taken_from_body() {
        let err = BotError::from_status(
            "github",
            StatusCode::CONFLICT,
            r#"{"message":"sha does not match"}"#,
        );
        assert!(!err.is_fatal());
        assert_eq!(err.user_message(), "❌ github error: sha does not match");

        let err = BotError::from_status("relay", StatusCode::BAD_GATEWAY, "<html>");
        assert_eq!(err.to_string(), "relay: HTTP 502 Bad Gateway");
    }
}
