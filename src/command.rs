use std::sync::LazyLock;

use regex::Regex;

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^/([A-Za-z0-9_]+)(?:@([A-Za-z0-9_]+))?(?:\s.*)?$").unwrap()
});

/// A `/name@via` bot command. Anything after the command word is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub via: Option<String>,
}

impl Command {
    /// Whether the command is meant for the bot called `username`. Commands
    /// without an `@via` suffix are addressed to every bot in the chat.
    pub fn is_addressed_to(&self, username: &str) -> bool {
        self.via
            .as_deref()
            .map_or(true, |via| via.eq_ignore_ascii_case(username))
    }
}

pub fn parse_command(text: &str) -> Option<Command> {
    let captures = COMMAND_RE.captures(text.trim())?;
    Some(Command {
        name: captures.get(1)?.as_str().to_lowercase(),
        via: captures.get(2).map(|m| m.as_str().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_command() {
        assert_eq!(
            parse_command("/start"),
            Some(Command {
                name: "start".into(),
                via: None,
            })
        );
    }

    #[test]
    fn parses_addressed_command_with_trailing_text() {
        let command = parse_command("/UploadServer@relay_bot  now\nplease ").unwrap();
        assert_eq!(command.name, "uploadserver");
        assert_eq!(command.via.as_deref(), Some("relay_bot"));
    }

    #[test]
    fn addressing_is_case_insensitive() {
        let command = parse_command("/list@Relay_Bot").unwrap();
        assert!(command.is_addressed_to("relay_bot"));
        assert!(!command.is_addressed_to("other_bot"));
        assert!(parse_command("/list").unwrap().is_addressed_to("other_bot"));
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_command("yes"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/start-now"), None);
    }
}
