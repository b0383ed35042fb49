//! Turns a raw webhook update into a typed intent before any handler runs.

use log::warn;

use crate::command::parse_command;
use crate::error::{BotError, BotResult};
use crate::telegram::Update;

/// Reply that confirms a pending batch; compared case-insensitively.
pub const AFFIRMATIVE: &str = "yes";

/// Callback data carried by the "Upload all" button.
pub const CONFIRM_CALLBACK: &str = "confirm_upload";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    ListRequest,
    Confirmation { callback_id: Option<String> },
    FileUpload { file_id: String, file_name: String },
    Unhandled,
}

/// A classified update with the identity it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub requester: String,
    pub chat_id: i64,
    pub intent: Intent,
}

/// Classifies `update`. When `bot_username` is known, a command addressed to
/// another bot (`/list@other_bot`) is `Unhandled`.
pub fn classify(update: &Update, bot_username: Option<&str>) -> BotResult<Envelope> {
    if let Some(message) = &update.message {
        let from = message
            .from
            .as_ref()
            .ok_or_else(|| BotError::Validation("message has no sender".into()))?;
        let text = message.text.as_deref().unwrap_or_default();

        let command = parse_command(text);
        let foreign = match (&command, bot_username) {
            (Some(command), Some(username)) if !command.is_addressed_to(username) => {
                warn!(
                    "Ignoring command for another bot: {}",
                    command.via.as_deref().unwrap_or_default()
                );
                true
            }
            _ => false,
        };

        let intent = match command.map(|c| c.name) {
            _ if foreign => Intent::Unhandled,
            Some(name) if name == "start" => Intent::Greeting,
            Some(name) if name == "uploadserver" || name == "list" => Intent::ListRequest,
            _ if is_affirmative(text) => Intent::Confirmation { callback_id: None },
            _ => match &message.document {
                Some(document) => Intent::FileUpload {
                    file_id: document.file_id.clone(),
                    file_name: document.file_name.clone().unwrap_or_default(),
                },
                None => Intent::Unhandled,
            },
        };

        return Ok(Envelope {
            requester: from.id.to_string(),
            chat_id: message.chat.id,
            intent,
        });
    }

    if let Some(query) = &update.callback_query {
        let chat_id = query
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .ok_or_else(|| BotError::Validation("callback query has no message".into()))?;
        let intent = match query.data.as_deref() {
            Some(CONFIRM_CALLBACK) => Intent::Confirmation {
                callback_id: Some(query.id.clone()),
            },
            _ => Intent::Unhandled,
        };
        return Ok(Envelope {
            requester: query.from.id.to_string(),
            chat_id,
            intent,
        });
    }

    Err(BotError::Validation("update has no message".into()))
}

fn is_affirmative(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(AFFIRMATIVE)
}
